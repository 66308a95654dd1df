// ABOUTME: Rust models for feeds produced from scraped pages.
// ABOUTME: Feed and FeedItem are plain serde values handed to an external wire-format writer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single item within a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub pub_date: DateTime<Utc>,
    /// Content-derived identifier; stable across fetches of unchanged content.
    pub guid: String,
    pub description: String,
}

/// A feed with its items in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub title: String,
    pub link: String,
    pub items: Vec<FeedItem>,
    /// Suggested polling interval for consumers, in minutes.
    pub ttl: Option<u32>,
    pub allow_empty: bool,
}

impl Feed {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

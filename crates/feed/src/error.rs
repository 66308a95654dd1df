// ABOUTME: Error types for feed building operations.
// ABOUTME: Provides FeedError enum with Scrape, Invalid, Empty, and Route variants.

use sitefeed_scrape::ScrapeError;
use thiserror::Error;

/// Errors that can occur while building a feed.
#[derive(Debug, Clone, Error)]
pub enum FeedError {
    /// Fetching or parsing the source page failed.
    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    /// The feed metadata is unusable (missing title or link).
    #[error("invalid feed: {0}")]
    Invalid(String),

    /// The page yielded no items and the route does not allow empty feeds.
    #[error("feed is empty: no items found")]
    Empty,

    /// A route definition could not be loaded or failed validation.
    #[error("invalid route {name}: {}", .problems.join("; "))]
    Route { name: String, problems: Vec<String> },
}

impl FeedError {
    /// Creates an Invalid error with a custom message.
    pub fn invalid(msg: impl Into<String>) -> Self {
        FeedError::Invalid(msg.into())
    }

    /// Creates a Route error with a single problem.
    pub fn route(name: impl Into<String>, problem: impl Into<String>) -> Self {
        FeedError::Route {
            name: name.into(),
            problems: vec![problem.into()],
        }
    }

    /// Returns true if the source could not be fetched.
    pub fn is_network(&self) -> bool {
        matches!(self, FeedError::Scrape(e) if e.is_network())
    }

    /// Returns true if the source could not be parsed.
    pub fn is_parse(&self) -> bool {
        matches!(self, FeedError::Scrape(e) if e.is_parse())
    }

    /// Returns true if the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FeedError::Scrape(e) if e.is_cancelled())
    }
}

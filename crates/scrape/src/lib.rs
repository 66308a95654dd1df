// ABOUTME: Main library entry point for the sitefeed scrape layer.
// ABOUTME: Re-exports the public API: Fetcher, Document, LocatorSet, Record, ScrapeError, ErrorCode.

//! Fetching and record extraction for HTML-sourced feeds.
//!
//! This crate fetches a source page, parses it into a queryable tree and pulls
//! an ordered list of records out of it using declarative locators.
//!
//! # Example
//!
//! ```no_run
//! use sitefeed_scrape::{extract_records, Document, Fetcher, LocatorSet, ScrapeError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ScrapeError> {
//!     let fetcher = Fetcher::builder().build()?;
//!     let body = fetcher.fetch_text("https://www.sge.com.cn/sjzx/yshqbg").await?;
//!     let doc = Document::parse(&body)?;
//!     let locators = LocatorSet::table(".memberName table", ["contract", "latest"]);
//!     for record in extract_records(&doc, &locators) {
//!         println!("{:?}", record);
//!     }
//!     Ok(())
//! }
//! ```

pub mod document;
pub mod error;
pub mod extractors;
pub mod fetcher;
pub mod options;
pub mod resource;

pub use crate::document::{Document, Node, Select};
pub use crate::error::{ErrorCode, ScrapeError};
pub use crate::extractors::compiled::{get_or_compile, is_valid_selector, precompile_selectors};
pub use crate::extractors::locators::{FieldLocator, LocatorSet, SelectorSpec};
pub use crate::extractors::records::{
    extract_records, extract_text, resolve_row, validate_row, Record, RecordField,
};
pub use crate::fetcher::Fetcher;
pub use crate::options::{FetcherBuilder, Options, RetryPolicy};
pub use crate::resource::{FetchResult, MAX_CONTENT_LENGTH};

/// Re-exported so callers can cancel fetches without depending on tokio-util directly.
pub use tokio_util::sync::CancellationToken;

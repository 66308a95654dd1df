// ABOUTME: Feed layer for sitefeed: turns extracted page records into cached, assembled feeds.
// ABOUTME: Provides normalization, the get-or-compute cache, route definitions, and the pipeline.

pub mod assemble;
pub mod cache;
pub mod error;
pub mod html_utils;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod route;
pub mod time_parse;

pub use assemble::assemble;
pub use cache::CacheStore;
pub use error::FeedError;
pub use html_utils::{collapse_whitespace, escape_html, strip_whitespace};
pub use models::{Feed, FeedItem};
pub use normalize::{compute_guid, normalize, resolve_link, ItemTemplate, NormalizeContext};
pub use pipeline::{build_items, FeedPipeline, FeedPipelineBuilder, ItemCache};
pub use route::{load_builtin_routes, DateSource, RouteRegistry, RouteSpec};
pub use time_parse::{parse_date, parse_date_or_now, parse_flexible_time, Clock, FixedClock, SystemClock};

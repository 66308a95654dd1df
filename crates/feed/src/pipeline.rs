// ABOUTME: The feed pipeline: fetch, parse, extract, normalize, cache, and assemble for one route.
// ABOUTME: FeedPipeline owns the fetcher, shared cache, and clock; build_items is the synchronous stage.

use std::sync::Arc;

use sitefeed_scrape::{
    extract_records, extract_text, CancellationToken, Document, Fetcher, ScrapeError,
};
use tracing::{debug, info_span, Instrument};

use crate::assemble::assemble;
use crate::cache::CacheStore;
use crate::error::FeedError;
use crate::models::{Feed, FeedItem};
use crate::normalize::{normalize, NormalizeContext};
use crate::route::RouteSpec;
use crate::time_parse::{parse_date_or_now, Clock, SystemClock};

/// Cache of extracted items, keyed by source URL.
pub type ItemCache = CacheStore<Vec<FeedItem>, FeedError>;

/// Runs routes end to end.
pub struct FeedPipeline {
    fetcher: Fetcher,
    cache: Arc<ItemCache>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for FeedPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedPipeline")
            .field("fetcher", &self.fetcher)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Builder for [`FeedPipeline`].
#[derive(Default)]
pub struct FeedPipelineBuilder {
    fetcher: Option<Fetcher>,
    cache: Option<Arc<ItemCache>>,
    clock: Option<Arc<dyn Clock>>,
}

impl FeedPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a configured fetcher instead of the default one.
    pub fn fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Share an existing cache, e.g. between pipelines with different fetchers.
    pub fn cache(mut self, cache: Arc<ItemCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<FeedPipeline, FeedError> {
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Fetcher::builder().build()?,
        };
        Ok(FeedPipeline {
            fetcher,
            cache: self.cache.unwrap_or_default(),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    }
}

impl FeedPipeline {
    pub fn builder() -> FeedPipelineBuilder {
        FeedPipelineBuilder::new()
    }

    /// The item cache shared by every run of this pipeline.
    pub fn cache(&self) -> &Arc<ItemCache> {
        &self.cache
    }

    /// Produces the feed for `route`.
    ///
    /// Items come from the cache while fresh; otherwise the source page is fetched
    /// and extracted once, even under concurrent calls for the same route.
    pub async fn run(&self, route: &RouteSpec) -> Result<Feed, FeedError> {
        self.run_inner(route, None)
            .instrument(info_span!("route", name = %route.name))
            .await
    }

    /// Like [`FeedPipeline::run`], but gives up as soon as `cancel` fires.
    ///
    /// A cancelled run leaves the cache as it was.
    pub async fn run_cancellable(
        &self,
        route: &RouteSpec,
        cancel: &CancellationToken,
    ) -> Result<Feed, FeedError> {
        let run = self
            .run_inner(route, Some(cancel))
            .instrument(info_span!("route", name = %route.name));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Err(ScrapeError::cancelled(route.source_url(), "Run").into())
            }
            result = run => result,
        }
    }

    async fn run_inner(
        &self,
        route: &RouteSpec,
        cancel: Option<&CancellationToken>,
    ) -> Result<Feed, FeedError> {
        let items = self
            .cache
            .get_or_compute(route.source_url(), route.cache_ttl(), || {
                self.compute_items(route, cancel)
            })
            .await?;

        debug!(items = items.len(), "assembling feed");
        assemble(
            &route.title,
            &route.link,
            items.as_ref().clone(),
            route.ttl,
            route.allow_empty,
        )
    }

    async fn compute_items(
        &self,
        route: &RouteSpec,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<FeedItem>, FeedError> {
        let url = route.source_url();
        let fetched = match cancel {
            Some(token) => self.fetcher.fetch_cancellable(url, token).await?,
            None => self.fetcher.fetch(url).await?,
        };
        build_items(&fetched.text(), route, self.clock.as_ref())
    }
}

/// Parses `html` and turns it into feed items for `route`.
///
/// This is every stage after the fetch. It never suspends, and the parsed
/// document does not outlive the call.
pub fn build_items(
    html: &str,
    route: &RouteSpec,
    clock: &dyn Clock,
) -> Result<Vec<FeedItem>, FeedError> {
    let doc = Document::parse(html).map_err(|mut e| {
        e.url = route.source_url().to_string();
        e
    })?;

    let records = extract_records(&doc, &route.locators);

    // One date for the whole run so undated items agree with each other.
    let page_text = route
        .page_date_selector()
        .and_then(|selector| extract_text(&doc, selector))
        .unwrap_or_default();
    let default_date = parse_date_or_now(&page_text, clock);

    let ctx = NormalizeContext {
        source_link: route.source_url(),
        template: &route.template,
        link_field: route.link_field.as_deref(),
        date_field: route.date_field(),
        default_date,
    };
    let items: Vec<FeedItem> = records.iter().map(|r| normalize(r, &ctx)).collect();

    debug!(
        records = records.len(),
        items = items.len(),
        %default_date,
        "normalized records"
    );
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_parse::FixedClock;
    use chrono::{TimeZone, Utc};

    const PAGE: &str = r#"<html><body>
        <div class="jzk_newsCenter_meeting"><div class="title"><h1>2024年03月15日 延时行情</h1></div></div>
        <div class="memberName"><table>
          <tr><td>合约</td><td>最新价</td><td>最高价</td><td>最低价</td><td>今开盘</td></tr>
          <tr><td>AU9999</td><td>512.30</td><td>515.00</td><td>510.00</td><td>511.00</td></tr>
        </table></div>
    </body></html>"#;

    fn route() -> RouteSpec {
        crate::route::load_builtin_routes()
            .unwrap()
            .get("sge/yshq")
            .cloned()
            .unwrap()
    }

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap())
    }

    #[test]
    fn build_items_uses_page_date() {
        let items = build_items(PAGE, &route(), &clock()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "AU9999 最新价 512.30");
        assert_eq!(
            items[0].pub_date,
            Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap()
        );
        assert!(items[0].description.contains("<b>今开盘:</b> 511.00"));
    }

    #[test]
    fn build_items_falls_back_to_clock() {
        let page = PAGE.replace("2024年03月15日 ", "");
        let items = build_items(&page, &route(), &clock()).unwrap();
        assert_eq!(items[0].pub_date, clock().now());
    }

    #[test]
    fn build_items_is_deterministic() {
        let a = build_items(PAGE, &route(), &clock()).unwrap();
        let b = build_items(PAGE, &route(), &clock()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn build_items_reports_unparsable_body_with_url() {
        let err = build_items("", &route(), &clock()).unwrap_err();
        assert!(err.is_parse());
        match err {
            FeedError::Scrape(e) => assert_eq!(e.url, "https://www.sge.com.cn/sjzx/yshqbg"),
            other => panic!("unexpected error {other:?}"),
        }
    }
}

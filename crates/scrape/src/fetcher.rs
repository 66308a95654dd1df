// ABOUTME: The Fetcher that performs HTTP GETs against source pages with an optional retry policy.
// ABOUTME: Provides fetch(), fetch_text(), and a cancellable variant driven by a CancellationToken.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ScrapeError;
use crate::options::{FetcherBuilder, Options};
use crate::resource::{fetch_once, validate_url, FetchResult};

/// HTTP fetcher for source documents.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    opts: Options,
    http_client: reqwest::Client,
}

impl Fetcher {
    /// Create a new FetcherBuilder for configuring the fetcher.
    pub fn builder() -> FetcherBuilder {
        FetcherBuilder::new()
    }

    /// Create a new Fetcher with the given options.
    pub fn new(opts: Options) -> Result<Self, ScrapeError> {
        let http_client = match opts.http_client.clone() {
            Some(client) => client,
            None => reqwest::Client::builder()
                .user_agent(&opts.user_agent)
                .timeout(opts.timeout)
                .cookie_store(true)
                .gzip(true)
                .brotli(true)
                .deflate(true)
                .build()
                .map_err(|e| {
                    ScrapeError::network(
                        "",
                        "Build",
                        Some(anyhow::anyhow!("failed to build HTTP client: {}", e)),
                    )
                })?,
        };

        Ok(Self { opts, http_client })
    }

    /// Options this fetcher was built with.
    pub fn options(&self) -> &Options {
        &self.opts
    }

    /// Fetch the document at `url`, retrying transient failures per the retry policy.
    pub async fn fetch(&self, url: &str) -> Result<FetchResult, ScrapeError> {
        validate_url(url)?;

        let policy = &self.opts.retry;
        let attempts = policy.attempts();
        let mut attempt = 1;
        loop {
            debug!(url, attempt, "fetching");
            match fetch_once(&self.http_client, url, &self.opts.headers).await {
                Ok(result) => {
                    debug!(url, status = result.status, bytes = result.body.len(), "fetched");
                    return Ok(result);
                }
                Err(failed) if failed.retryable && attempt < attempts => {
                    let delay = policy.backoff(attempt);
                    warn!(
                        url,
                        attempt,
                        max_attempts = attempts,
                        backoff_ms = delay.as_millis() as u64,
                        error = %failed.error,
                        "transient fetch failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failed) => return Err(failed.error),
            }
        }
    }

    /// Fetch and decode the document at `url` to text.
    pub async fn fetch_text(&self, url: &str) -> Result<String, ScrapeError> {
        Ok(self.fetch(url).await?.text())
    }

    /// Like [`Fetcher::fetch`], but abandons the request as soon as `cancel` fires.
    pub async fn fetch_cancellable(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchResult, ScrapeError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(url, "fetch cancelled");
                Err(ScrapeError::cancelled(url, "Fetch"))
            }
            result = self.fetch(url) => result,
        }
    }
}

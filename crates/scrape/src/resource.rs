// ABOUTME: Resource handling module for a single HTTP GET of a source document.
// ABOUTME: Handles status checks, content-length limits, transient-failure classification, and charset decoding.

use std::collections::HashMap;

use bytes::Bytes;
use reqwest::StatusCode;

use crate::error::ScrapeError;

/// Maximum allowed content length (10 MB).
pub const MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

/// Result of a successful fetch operation.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: u16,
    pub url: String,
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchResult {
    /// Decode the body to text, using the charset from the content-type header when present.
    pub fn text(&self) -> String {
        decode_body(&self.body, self.content_type.as_deref())
    }
}

/// A failed attempt, tagged with whether trying again could help.
#[derive(Debug)]
pub(crate) struct AttemptError {
    pub error: ScrapeError,
    pub retryable: bool,
}

impl AttemptError {
    fn fatal(error: ScrapeError) -> Self {
        Self {
            error,
            retryable: false,
        }
    }

    fn transient(error: ScrapeError) -> Self {
        Self {
            error,
            retryable: true,
        }
    }
}

/// Statuses worth another attempt.
pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 502 | 503 | 504)
}

fn classify_send_error(url: &str, err: reqwest::Error) -> AttemptError {
    if err.is_timeout() {
        return AttemptError::transient(ScrapeError::timeout(
            url,
            "Fetch",
            Some(anyhow::anyhow!("request timed out: {}", err)),
        ));
    }
    let retryable = err.is_connect();
    AttemptError {
        error: ScrapeError::network(
            url,
            "Fetch",
            Some(anyhow::anyhow!("request failed: {}", err)),
        ),
        retryable,
    }
}

/// Decode body bytes to a String using charset from content-type header or detection.
fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    if let Some(ct) = content_type {
        if let Some(charset) = extract_charset(ct) {
            if let Some(encoding) = encoding_rs::Encoding::for_label(charset.as_bytes()) {
                let (decoded, _, _) = encoding.decode(body);
                return decoded.into_owned();
            }
        }
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(body, true);
    let encoding = detector.guess(None, true);
    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}

/// Extract charset value from Content-Type header.
fn extract_charset(content_type: &str) -> Option<String> {
    let lower = content_type.to_lowercase();
    lower.split(';').find_map(|part| {
        part.trim()
            .strip_prefix("charset=")
            .map(|charset| charset.trim_matches('"').trim_matches('\'').to_string())
    })
}

/// Validate that `url` is an absolute http(s) URL.
pub(crate) fn validate_url(url: &str) -> Result<url::Url, ScrapeError> {
    if url.is_empty() {
        return Err(ScrapeError::invalid_url(url, "Fetch", None));
    }

    let parsed = url::Url::parse(url).map_err(|e| {
        ScrapeError::invalid_url(url, "Fetch", Some(anyhow::anyhow!("invalid URL: {}", e)))
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(ScrapeError::invalid_url(
            url,
            "Fetch",
            Some(anyhow::anyhow!("scheme must be http or https")),
        )),
    }
}

/// Perform one GET request against `url`.
pub(crate) async fn fetch_once(
    client: &reqwest::Client,
    url: &str,
    headers: &HashMap<String, String>,
) -> Result<FetchResult, AttemptError> {
    let mut request = client.get(url);
    for (key, value) in headers {
        request = request.header(key, value);
    }

    let response = request
        .send()
        .await
        .map_err(|e| classify_send_error(url, e))?;

    let status = response.status();
    if !status.is_success() {
        let error = ScrapeError::network(
            url,
            "Fetch",
            Some(anyhow::anyhow!("HTTP status {}", status.as_u16())),
        );
        return Err(if is_retryable_status(status) {
            AttemptError::transient(error)
        } else {
            AttemptError::fatal(error)
        });
    }

    if let Some(len) = response.content_length() {
        if len as usize > MAX_CONTENT_LENGTH {
            return Err(AttemptError::fatal(ScrapeError::network(
                url,
                "Fetch",
                Some(anyhow::anyhow!("content too large")),
            )));
        }
    }

    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_lowercase());

    let body = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            AttemptError::transient(ScrapeError::timeout(
                url,
                "Fetch",
                Some(anyhow::anyhow!("timed out reading body: {}", e)),
            ))
        } else {
            AttemptError::fatal(ScrapeError::network(
                url,
                "Fetch",
                Some(anyhow::anyhow!("failed to read body: {}", e)),
            ))
        }
    })?;

    if body.len() > MAX_CONTENT_LENGTH {
        return Err(AttemptError::fatal(ScrapeError::network(
            url,
            "Fetch",
            Some(anyhow::anyhow!("content too large")),
        )));
    }

    Ok(FetchResult {
        status: status.as_u16(),
        url: url.to_string(),
        final_url,
        content_type,
        body,
    })
}

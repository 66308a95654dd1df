// ABOUTME: Error types for the scrape layer including ErrorCode enum and ScrapeError struct.
// ABOUTME: Separates network failures from parse failures so callers can tell them apart.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Error codes representing different categories of scrape failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidUrl,
    Network,
    Timeout,
    Parse,
    Cancelled,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::InvalidUrl => "invalid URL",
            ErrorCode::Network => "network error",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Parse => "parse error",
            ErrorCode::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// The main error type for fetch and parse operations.
///
/// Cloneable so one failed fetch can be reported to every caller waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub struct ScrapeError {
    pub code: ErrorCode,
    pub url: String,
    pub op: String,
    #[source]
    pub source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl fmt::Display for ScrapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scrape: {}", self.op)?;
        if !self.url.is_empty() {
            write!(f, " {}", self.url)?;
        }
        write!(f, ": {}", self.code)?;
        if let Some(ref src) = self.source {
            write!(f, ": {}", src)?;
        }
        Ok(())
    }
}

impl ScrapeError {
    fn with_code(
        code: ErrorCode,
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self {
            code,
            url: url.into(),
            op: op.into(),
            source: source.map(|e| Arc::from(Box::<dyn StdError + Send + Sync>::from(e))),
        }
    }

    /// Create an InvalidUrl error.
    pub fn invalid_url(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::InvalidUrl, url, op, source)
    }

    /// Create a Network error.
    pub fn network(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Network, url, op, source)
    }

    /// Create a Timeout error.
    pub fn timeout(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Timeout, url, op, source)
    }

    /// Create a Parse error.
    pub fn parse(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Parse, url, op, source)
    }

    /// Create a Cancelled error.
    pub fn cancelled(url: impl Into<String>, op: impl Into<String>) -> Self {
        Self::with_code(ErrorCode::Cancelled, url, op, None)
    }

    /// Returns true for any failure of the network exchange, timeouts included.
    pub fn is_network(&self) -> bool {
        matches!(self.code, ErrorCode::Network | ErrorCode::Timeout)
    }

    /// Returns true if this is a Timeout error.
    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::Timeout
    }

    /// Returns true if this is a Parse error.
    pub fn is_parse(&self) -> bool {
        self.code == ErrorCode::Parse
    }

    /// Returns true if this is an InvalidUrl error.
    pub fn is_invalid_url(&self) -> bool {
        self.code == ErrorCode::InvalidUrl
    }

    /// Returns true if this is a Cancelled error.
    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::Cancelled
    }
}

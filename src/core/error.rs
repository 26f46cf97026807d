//! Error types for rate resolution and tax computation

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

/// Provider error codes known to be transient (rate limiting, internal
/// errors, timeouts, service restarts).
pub const TRANSIENT_PROVIDER_CODES: [i64; 6] = [-1000, -1001, -1003, -1006, -1007, -1016];

#[derive(Error, Debug)]
pub enum Error {
    #[error("{provider} unavailable: {message}")]
    SourceUnavailable {
        provider: String,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("{provider} rejected the request with HTTP {status}: {message}")]
    Rejected {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("{provider} error {code}: {message}")]
    Provider {
        provider: String,
        code: i64,
        message: String,
    },

    #[error("Failed to parse {provider} response: {message}")]
    Malformed { provider: String, message: String },

    #[error("{last} (gave up after {attempts} attempts)")]
    RetriesExhausted { attempts: u32, last: Box<Error> },

    #[error("No {pair} rate found for {date}")]
    RateNotFound { pair: String, date: NaiveDate },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Exchange rate must be positive, got {0}")]
    InvalidRate(Decimal),

    #[error("{pair} rate {rate} for {date} deviates from the recent average {average}")]
    ImplausibleRate {
        pair: String,
        date: NaiveDate,
        rate: Decimal,
        average: Decimal,
    },

    #[error("Operation at {timestamp} precedes the last processed operation at {last}")]
    OutOfOrder { timestamp: i64, last: i64 },

    #[error("Rate cache I/O failed: {0}")]
    CacheIo(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether retrying the failed call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::SourceUnavailable { .. } => true,
            Error::Provider { code, .. } => TRANSIENT_PROVIDER_CODES.contains(code),
            _ => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::SourceUnavailable { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Rejected { status: 404, .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::CacheIo(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::CacheIo(e.to_string())
    }
}

/// Result type alias for library operations
pub type Result<T> = std::result::Result<T, Error>;

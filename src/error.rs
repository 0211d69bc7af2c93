//! Error types for chat-export
//!
//! This module provides the error taxonomy used throughout the export engine:
//! - Rate limiting (recoverable inside the backoff controller, terminal after the ceiling)
//! - Channel-scoped network failures
//! - Record-scoped message processing failures
//! - Attachment-scoped download failures
//! - Run-scoped packaging failures
//!
//! Every error can be turned into a user-facing status string via
//! [`Error::user_message`], so raw transport errors never reach the caller unclassified.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for chat-export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for chat-export
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "api.page_size")
        key: Option<String>,
    },

    /// The remote API answered "too many requests"
    #[error("rate limited by remote API")]
    RateLimited {
        /// Server-supplied delay before the next attempt, if any
        retry_after: Option<Duration>,
    },

    /// Rate limiting persisted past the retry ceiling
    #[error("rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded {
        /// Number of attempts made before giving up
        attempts: u32,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Remote API returned a non-success status other than 429
    #[error("HTTP {status} from {url}")]
    Http {
        /// Response status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// A raw record could not be normalized
    #[error("malformed message record: {0}")]
    MessageProcessing(String),

    /// Attachment acquisition error
    #[error("attachment error: {0}")]
    Attachment(#[from] AttachmentError),

    /// Archive or document packaging failed
    #[error("packaging error: {0}")]
    Packaging(String),

    /// Channel, guild or user not found in the directory
    #[error("not found: {0}")]
    NotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Attachment acquisition errors
///
/// These never abort a batch; they are recorded per attachment and counted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttachmentError {
    /// The CDN kept answering 429 past the per-attachment retry budget
    #[error("rate limited downloading {filename} after {attempts} attempts")]
    RateLimited {
        /// Attachment filename
        filename: String,
        /// Attempts made
        attempts: u32,
    },

    /// Direct fetch was refused for cross-origin reasons and the fallback failed
    #[error("cross-origin fetch refused for {filename}: {reason}")]
    CrossOrigin {
        /// Attachment filename
        filename: String,
        /// Reason reported by the fallback
        reason: String,
    },

    /// Video attachments have no fallback path once the direct fetch is refused
    #[error("no fallback available for video attachment {filename}")]
    VideoUnsupported {
        /// Attachment filename
        filename: String,
    },

    /// The server returned an unexpected status
    #[error("HTTP {status} downloading {filename}")]
    Http {
        /// Attachment filename
        filename: String,
        /// Response status code
        status: u16,
    },

    /// Transport failure
    #[error("network failure downloading {filename}: {reason}")]
    Network {
        /// Attachment filename
        filename: String,
        /// Transport error text
        reason: String,
    },

    /// The attachment URL could not be parsed
    #[error("invalid attachment URL {url}")]
    InvalidUrl {
        /// Offending URL
        url: String,
    },
}

impl Error {
    /// Create a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Whether this error belongs to the rate-limit family
    pub fn is_rate_limit(&self) -> bool {
        matches!(
            self,
            Error::RateLimited { .. } | Error::RateLimitExceeded { .. }
        )
    }

    /// Terminal status string shown to the user
    ///
    /// Rate-limit failures get a dedicated hint; everything else collapses
    /// into a generic message carrying the error text.
    pub fn user_message(&self) -> String {
        if self.is_rate_limit() {
            "Export failed: rate limited — try a smaller export".to_string()
        } else {
            format!("Export failed: {}", self)
        }
    }
}

/// Classification of errors for the backoff controller
///
/// `Some(hint)` means the error is a rate-limit response and should be retried,
/// optionally after the server-supplied delay. `None` means the error must be
/// propagated immediately.
pub trait RateLimitSignal {
    /// Returns the rate-limit hint carried by this error, if it is one
    fn rate_limit_hint(&self) -> Option<Option<Duration>>;
}

impl RateLimitSignal for Error {
    fn rate_limit_hint(&self) -> Option<Option<Duration>> {
        match self {
            Error::RateLimited { retry_after } => Some(*retry_after),
            Error::Network(e) if e.status().map(|s| s.as_u16()) == Some(429) => Some(None),
            _ => None,
        }
    }
}

/// Parse a retry hint expressed in (possibly fractional) seconds
///
/// Accepts header values like `"2"` or `"1.5"`. Negative or non-numeric values yield `None`.
pub fn parse_retry_after_secs(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::from_millis((secs * 1000.0).round() as u64))
}

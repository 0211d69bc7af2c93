//! Binary fetch primitives
//!
//! [`BlobFetcher`] performs the direct download; [`MediaFallback`] is consulted
//! when the direct download is refused for cross-origin reasons.

use crate::error::{AttachmentError, parse_retry_after_secs};
use crate::types::{AttachmentDescriptor, MediaKind};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Failure of a single direct fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// 429 with an optional server hint
    RateLimited {
        /// Server-supplied wait
        retry_after: Option<Duration>,
    },
    /// The host refused to serve the resource to this origin
    CrossOrigin(String),
    /// Any other non-success status
    Status(u16),
    /// Transport failure
    Transport(String),
}

/// Downloads a URL into memory
#[async_trait]
pub trait BlobFetcher: Send + Sync {
    /// Fetch the full body of `url`
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// reqwest-backed [`BlobFetcher`]
///
/// 401/403 responses are treated as cross-origin refusals.
pub struct HttpBlobFetcher {
    http_client: reqwest::Client,
}

impl HttpBlobFetcher {
    /// Wrap an existing client
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl BlobFetcher for HttpBlobFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after_secs);
            return Err(FetchError::RateLimited { retry_after });
        }
        if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::UNAUTHORIZED
        {
            return Err(FetchError::CrossOrigin(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Recovery path used after a cross-origin refusal
#[async_trait]
pub trait MediaFallback: Send + Sync {
    /// Try to obtain the attachment's bytes some other way
    async fn recover(
        &self,
        attachment: &AttachmentDescriptor,
        kind: MediaKind,
    ) -> Result<Vec<u8>, AttachmentError>;
}

/// Re-fetches images from their origin URL
///
/// Videos and other files have no alternative path and fail explicitly.
pub struct OriginFallback {
    fetcher: Arc<dyn BlobFetcher>,
}

impl OriginFallback {
    /// Create a fallback that uses `fetcher` for the origin request
    pub fn new(fetcher: Arc<dyn BlobFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl MediaFallback for OriginFallback {
    async fn recover(
        &self,
        attachment: &AttachmentDescriptor,
        kind: MediaKind,
    ) -> Result<Vec<u8>, AttachmentError> {
        match kind {
            MediaKind::Image => {
                self.fetcher
                    .fetch(&attachment.url)
                    .await
                    .map_err(|e| AttachmentError::CrossOrigin {
                        filename: attachment.filename.clone(),
                        reason: format!("origin fallback failed: {:?}", e),
                    })
            }
            MediaKind::Video => Err(AttachmentError::VideoUnsupported {
                filename: attachment.filename.clone(),
            }),
            MediaKind::Other => Err(AttachmentError::CrossOrigin {
                filename: attachment.filename.clone(),
                reason: "no fallback for non-media attachments".to_string(),
            }),
        }
    }
}

//! Remote chat API access
//!
//! [`ChatApi`] is the seam between the retrieval pipeline and the transport.
//! [`HttpChatApi`] implements it over the platform's REST endpoint with reqwest.

use crate::config::ApiConfig;
use crate::error::{Error, Result, parse_retry_after_secs};
use crate::types::Snowflake;
use async_trait::async_trait;
use std::time::Duration;

/// Raw record normalization
pub mod raw;

pub use raw::normalize;

/// Paged access to a channel's message history
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Fetch up to `limit` messages older than `before` (newest first)
    ///
    /// `before = None` starts from the newest message. A rate-limit response must
    /// surface as [`Error::RateLimited`] so the backoff controller can absorb it.
    async fn fetch_page(
        &self,
        channel_id: Snowflake,
        limit: u32,
        before: Option<Snowflake>,
    ) -> Result<Vec<serde_json::Value>>;
}

/// REST implementation of [`ChatApi`]
pub struct HttpChatApi {
    http_client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpChatApi {
    /// Create a client from API settings
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn fetch_page(
        &self,
        channel_id: Snowflake,
        limit: u32,
        before: Option<Snowflake>,
    ) -> Result<Vec<serde_json::Value>> {
        let url = format!("{}/channels/{}/messages", self.base_url, channel_id);
        let mut query = vec![("limit", limit.to_string())];
        if let Some(cursor) = before {
            query.push(("before", cursor.to_string()));
        }

        let mut request = self.http_client.get(&url).query(&query);
        if let Some(token) = &self.token {
            request = request.header("Authorization", token);
        }

        tracing::debug!(channel_id = %channel_id, before = ?before, limit, "Requesting message page");
        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let header_hint = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after_secs);
            let retry_after = match header_hint {
                Some(hint) => Some(hint),
                None => body_retry_after(response).await,
            };
            return Err(Error::RateLimited { retry_after });
        }

        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                url,
            });
        }

        Ok(response.json::<Vec<serde_json::Value>>().await?)
    }
}

/// Retry hint from a JSON 429 body (`{"retry_after": 1.25}`)
async fn body_retry_after(response: reqwest::Response) -> Option<Duration> {
    let body: serde_json::Value = response.json().await.ok()?;
    let secs = body.get("retry_after")?.as_f64()?;
    parse_retry_after_secs(&secs.to_string())
}

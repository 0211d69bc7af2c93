//! Configuration types for chat-export

use crate::error::{Error, Result};
use crate::types::ExportFormat;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound accepted for the message cap setting
pub const MAX_MESSAGE_CAP: usize = 100_000;

/// Remote chat API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the REST API (default: "https://discord.com/api/v9")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Value sent in the `Authorization` header
    #[serde(default)]
    pub token: Option<String>,

    /// User agent for API and CDN requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Messages requested per page (default: 100, the API maximum)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Fixed pause between successful page requests (default: 1000ms)
    #[serde(default = "default_courtesy_delay", with = "duration_millis")]
    pub courtesy_delay: Duration,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_millis")]
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            user_agent: default_user_agent(),
            page_size: default_page_size(),
            courtesy_delay: default_courtesy_delay(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Rate-limit backoff settings
///
/// Delay for retry `n` (1-based) without a server hint is
/// `min(base_delay * 2^(n-1) + uniform(0, jitter_max), max_delay)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Base delay for the first retry (default: 1000ms)
    #[serde(default = "default_base_delay", with = "duration_millis")]
    pub base_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_millis")]
    pub max_delay: Duration,

    /// Upper bound of the uniform random jitter (default: 1000ms)
    #[serde(default = "default_jitter_max", with = "duration_millis")]
    pub jitter_max: Duration,

    /// Retry ceiling before the call is treated as permanently rate limited (default: 10)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            jitter_max: default_jitter_max(),
            max_retries: default_max_retries(),
        }
    }
}

/// Attachment acquisition settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttachmentConfig {
    /// Simultaneous downloads in the sliding window (default: 5)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Attempts per attachment when the CDN rate limits (default: 3)
    #[serde(default = "default_attachment_attempts")]
    pub max_attempts: u32,

    /// Fallback wait when a 429 carries no retry hint (default: 1000ms)
    #[serde(default = "default_base_delay", with = "duration_millis")]
    pub retry_delay: Duration,

    /// Longest wait honored from a server retry hint (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_millis")]
    pub max_retry_delay: Duration,

    /// Primary content-delivery host
    #[serde(default = "default_cdn_host")]
    pub cdn_host: String,

    /// Media proxy host that serves CDN content without cross-origin restrictions
    #[serde(default = "default_media_proxy_host")]
    pub media_proxy_host: String,

    /// Query parameters removed when rewriting to the proxy
    #[serde(default = "default_stripped_params")]
    pub stripped_params: Vec<String>,

    /// Extensions of animated images the platform serves as video
    #[serde(default = "default_video_gif_extensions")]
    pub video_gif_extensions: Vec<String>,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_attachment_attempts(),
            retry_delay: default_base_delay(),
            max_retry_delay: default_max_delay(),
            cdn_host: default_cdn_host(),
            media_proxy_host: default_media_proxy_host(),
            stripped_params: default_stripped_params(),
            video_gif_extensions: default_video_gif_extensions(),
        }
    }
}

/// Main configuration for the export engine
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Rate-limit backoff settings
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Attachment download settings
    #[serde(default)]
    pub attachments: AttachmentConfig,
}

impl Config {
    /// Check that every setting is within its accepted range
    pub fn validate(&self) -> Result<()> {
        if self.api.page_size == 0 || self.api.page_size > 100 {
            return Err(Error::config(
                "api.page_size",
                format!("must be between 1 and 100, got {}", self.api.page_size),
            ));
        }
        if url::Url::parse(&self.api.base_url).is_err() {
            return Err(Error::config(
                "api.base_url",
                format!("not a valid URL: {}", self.api.base_url),
            ));
        }
        if self.backoff.max_retries == 0 {
            return Err(Error::config("backoff.max_retries", "must be at least 1"));
        }
        if self.backoff.base_delay > self.backoff.max_delay {
            return Err(Error::config(
                "backoff.base_delay",
                "must not exceed backoff.max_delay",
            ));
        }
        if self.attachments.concurrency == 0 {
            return Err(Error::config(
                "attachments.concurrency",
                "must be at least 1",
            ));
        }
        if self.attachments.max_attempts == 0 {
            return Err(Error::config(
                "attachments.max_attempts",
                "must be at least 1",
            ));
        }
        if self.attachments.retry_delay > self.attachments.max_retry_delay {
            return Err(Error::config(
                "attachments.retry_delay",
                "must not exceed attachments.max_retry_delay",
            ));
        }
        Ok(())
    }
}

/// Key/value settings owned by the host application
///
/// The engine reads it once at job start through [`ExportSettings::load`].
pub trait SettingsSource {
    /// Raw value for a key, if set
    fn get(&self, key: &str) -> Option<String>;
}

impl SettingsSource for std::collections::HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        std::collections::HashMap::get(self, key).cloned()
    }
}

/// User-facing defaults for a new export
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Default output format
    pub format: ExportFormat,
    /// Default message cap (0 = unbounded)
    pub message_cap: usize,
    /// Whether attachments are bundled by default
    pub include_attachments: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            format: ExportFormat::Html,
            message_cap: 0,
            include_attachments: false,
        }
    }
}

impl ExportSettings {
    /// Settings key for the default format
    pub const FORMAT_KEY: &'static str = "exportFormat";
    /// Settings key for the default message cap
    pub const MESSAGE_CAP_KEY: &'static str = "messageLimit";
    /// Settings key for the default attachment flag
    pub const ATTACHMENTS_KEY: &'static str = "includeAttachments";

    /// Read settings, falling back to defaults for missing or unparseable values
    ///
    /// The message cap is clamped to [`MAX_MESSAGE_CAP`].
    pub fn load(source: &dyn SettingsSource) -> Self {
        let defaults = Self::default();

        let format = source
            .get(Self::FORMAT_KEY)
            .and_then(|v| {
                let parsed = v.parse::<ExportFormat>();
                if parsed.is_err() {
                    tracing::warn!(value = %v, "ignoring unknown export format setting");
                }
                parsed.ok()
            })
            .unwrap_or(defaults.format);

        let message_cap = source
            .get(Self::MESSAGE_CAP_KEY)
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map(|cap| cap.min(MAX_MESSAGE_CAP))
            .unwrap_or(defaults.message_cap);

        let include_attachments = source
            .get(Self::ATTACHMENTS_KEY)
            .and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            })
            .unwrap_or(defaults.include_attachments);

        Self {
            format,
            message_cap,
            include_attachments,
        }
    }
}

fn default_base_url() -> String {
    "https://discord.com/api/v9".to_string()
}

fn default_user_agent() -> String {
    concat!("chat-export/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_courtesy_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_base_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_jitter_max() -> Duration {
    Duration::from_millis(1000)
}

fn default_max_retries() -> u32 {
    10
}

fn default_concurrency() -> usize {
    5
}

fn default_attachment_attempts() -> u32 {
    3
}

fn default_cdn_host() -> String {
    "cdn.discordapp.com".to_string()
}

fn default_media_proxy_host() -> String {
    "media.discordapp.net".to_string()
}

fn default_stripped_params() -> Vec<String> {
    ["size", "width", "height", "quality", "format"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_video_gif_extensions() -> Vec<String> {
    vec!["gifv".to_string()]
}

// Duration serialization helper (integer milliseconds)
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn empty_json_yields_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.api.page_size, 100);
        assert_eq!(config.backoff.max_retries, 10);
        assert_eq!(config.attachments.concurrency, 5);
        assert_eq!(config.api.courtesy_delay, Duration::from_millis(1000));
    }

    #[test]
    fn durations_serialize_as_milliseconds() {
        let config = BackoffConfig {
            base_delay: Duration::from_millis(250),
            ..Default::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["base_delay"], 250);

        let back: BackoffConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn validate_rejects_oversized_page() {
        let mut config = Config::default();
        config.api.page_size = 500;
        match config.validate() {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("api.page_size")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_retry_delay_above_hint_cap() {
        let mut config = Config::default();
        config.attachments.max_retry_delay = Duration::from_millis(10);
        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("attachments.retry_delay"))
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.attachments.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn settings_load_parses_and_clamps() {
        let mut source = HashMap::new();
        source.insert("exportFormat".to_string(), "csv".to_string());
        source.insert("messageLimit".to_string(), "999999999".to_string());
        source.insert("includeAttachments".to_string(), "true".to_string());

        let settings = ExportSettings::load(&source);
        assert_eq!(settings.format, ExportFormat::Csv);
        assert_eq!(settings.message_cap, MAX_MESSAGE_CAP);
        assert!(settings.include_attachments);
    }

    #[test]
    fn settings_load_falls_back_on_garbage() {
        let mut source = HashMap::new();
        source.insert("exportFormat".to_string(), "docx".to_string());
        source.insert("messageLimit".to_string(), "lots".to_string());
        source.insert("includeAttachments".to_string(), "maybe".to_string());

        assert_eq!(ExportSettings::load(&source), ExportSettings::default());
    }
}

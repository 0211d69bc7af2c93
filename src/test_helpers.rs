//! In-memory collaborators shared by the unit tests

use crate::attachments::{BlobFetcher, FetchError};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::remote::ChatApi;
use crate::types::{AttachmentDescriptor, ChannelKind, ChannelSnapshot, Snowflake};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type ErrorFactory = Box<dyn Fn() -> Error + Send + Sync>;

/// Scripted [`ChatApi`] serving pages from per-channel record lists
#[derive(Default)]
pub(crate) struct FakeChatApi {
    channels: HashMap<Snowflake, Vec<Value>>,
    overlap: bool,
    failures: HashMap<usize, ErrorFactory>,
    calls: AtomicUsize,
}

impl FakeChatApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Serve `records` for `channel_id`, newest first regardless of input order
    pub(crate) fn with_channel(mut self, channel_id: Snowflake, mut records: Vec<Value>) -> Self {
        records.sort_by_key(|r| std::cmp::Reverse(id_of(r)));
        self.channels.insert(channel_id, records);
        self
    }

    /// Include the cursor record itself in the next page, like a buggy server would
    pub(crate) fn with_overlap(mut self) -> Self {
        self.overlap = true;
        self
    }

    /// Fail the call with the given zero-based index (counting every call)
    pub(crate) fn fail_call(
        mut self,
        index: usize,
        error: impl Fn() -> Error + Send + Sync + 'static,
    ) -> Self {
        self.failures.insert(index, Box::new(error));
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn id_of(record: &Value) -> Option<u64> {
    match record.get("id")? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

#[async_trait]
impl ChatApi for FakeChatApi {
    async fn fetch_page(
        &self,
        channel_id: Snowflake,
        limit: u32,
        before: Option<Snowflake>,
    ) -> Result<Vec<Value>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(make_error) = self.failures.get(&call) {
            return Err(make_error());
        }

        let records = self
            .channels
            .get(&channel_id)
            .ok_or_else(|| Error::Http {
                status: 404,
                url: format!("fake://channels/{channel_id}"),
            })?;

        let page = records
            .iter()
            .filter(|r| match (before, id_of(r)) {
                (None, _) => true,
                (Some(_), None) => false,
                (Some(b), Some(id)) if self.overlap => id <= b.get(),
                (Some(b), Some(id)) => id < b.get(),
            })
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(page)
    }
}

/// Well-formed raw message record
pub(crate) fn raw_message(id: u64, author: u64, timestamp: DateTime<Utc>, content: &str) -> Value {
    json!({
        "id": id.to_string(),
        "channel_id": "10",
        "content": content,
        "timestamp": timestamp.to_rfc3339(),
        "edited_timestamp": null,
        "author": {
            "id": author.to_string(),
            "username": format!("user{author}"),
            "discriminator": "0",
            "global_name": null,
            "avatar": null
        },
        "attachments": [],
        "embeds": [],
        "mentions": [],
        "reactions": []
    })
}

/// Standard channel snapshot labelled `#name`
pub(crate) fn channel_snapshot(id: u64, name: &str) -> ChannelSnapshot {
    ChannelSnapshot {
        id: Snowflake(id),
        name: format!("#{name}"),
        kind: ChannelKind::Standard,
    }
}

/// Attachment hosted off-platform so its URL is used as-is
pub(crate) fn attachment(id: u64, filename: &str, base_url: &str) -> AttachmentDescriptor {
    AttachmentDescriptor {
        id: Snowflake(id),
        filename: filename.to_string(),
        url: format!("{base_url}/{id}/{filename}"),
        size: 2048,
        content_type: None,
    }
}

/// Configuration with every delay shrunk to keep tests fast
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.api.courtesy_delay = Duration::ZERO;
    config.backoff.base_delay = Duration::from_millis(1);
    config.backoff.max_delay = Duration::from_millis(50);
    config.backoff.jitter_max = Duration::ZERO;
    config.backoff.max_retries = 10;
    config.attachments.retry_delay = Duration::from_millis(1);
    config.attachments.max_retry_delay = Duration::from_millis(20);
    config
}

/// Scripted [`BlobFetcher`]
///
/// Each URL answers with its scripted responses in order, repeating the last
/// one; unknown URLs answer 404. Tracks the peak number of concurrent fetches.
#[derive(Default)]
pub(crate) struct FakeBlobFetcher {
    responses: Mutex<HashMap<String, Vec<std::result::Result<Vec<u8>, FetchError>>>>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    requests: Mutex<Vec<String>>,
}

impl FakeBlobFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn respond(
        self,
        url: impl Into<String>,
        script: Vec<std::result::Result<Vec<u8>, FetchError>>,
    ) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.into(), script);
        self
    }

    pub(crate) fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobFetcher for FakeBlobFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.requests.lock().unwrap().push(url.to_string());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let response = {
            let mut responses = self.responses.lock().unwrap();
            match responses.get_mut(url) {
                Some(script) if script.len() > 1 => script.remove(0),
                Some(script) => script
                    .first()
                    .cloned()
                    .unwrap_or(Err(FetchError::Status(404))),
                None => Err(FetchError::Status(404)),
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

//! Message retrieval pipeline
//!
//! Per channel the pipeline cycles `FetchingPage -> ProcessingPage -> (FetchingPage | Done)`.
//! Pages are requested newest-first with a `before` cursor; each record is
//! deduplicated against every id seen in the run, normalized, filtered, and
//! appended until the page runs dry, the cap is reached, or a fetch fails.
//! The accumulated sequence is returned in chronological order.

use crate::backoff::BackoffController;
use crate::config::Config;
use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::remote::{ChatApi, normalize};
use crate::types::{ChannelSnapshot, ExportRequest, NormalizedMessage, Snowflake};
use std::collections::HashSet;

/// How retrieval of one channel ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    /// History exhausted (or the date window start was passed)
    Complete,
    /// Stopped at the message cap
    Capped,
    /// A fetch failed; messages gathered before the failure are kept
    Stopped {
        /// Failure description
        error: String,
        /// Whether the failure was rate-limit exhaustion
        rate_limited: bool,
    },
}

/// Result of retrieving one channel
#[derive(Debug, Clone)]
pub struct ChannelRetrieval {
    /// Channel snapshot
    pub channel: ChannelSnapshot,
    /// Retained messages, oldest first
    pub messages: Vec<NormalizedMessage>,
    /// How retrieval ended
    pub outcome: ChannelOutcome,
    /// Pages fetched
    pub pages: usize,
    /// Records skipped because their id was already seen
    pub duplicates: usize,
    /// Records skipped because they could not be normalized
    pub malformed: usize,
}

enum PipelineState {
    FetchingPage,
    ProcessingPage(Vec<serde_json::Value>),
    Done(ChannelOutcome),
}

/// Id of a raw record, if it has a readable one
fn record_id(record: &serde_json::Value) -> Option<Snowflake> {
    match record.get("id")? {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_u64().map(Snowflake),
        _ => None,
    }
}

/// Paginating retriever bound to one API client and configuration
pub struct MessageRetriever<'a> {
    api: &'a dyn ChatApi,
    config: &'a Config,
    progress: &'a ProgressReporter,
}

impl<'a> MessageRetriever<'a> {
    /// Create a retriever
    pub fn new(api: &'a dyn ChatApi, config: &'a Config, progress: &'a ProgressReporter) -> Self {
        Self {
            api,
            config,
            progress,
        }
    }

    /// Retrieve one channel's messages
    ///
    /// `seen` holds every message id encountered earlier in the run and is
    /// extended with this channel's ids. Never fails: fetch errors end the
    /// channel with [`ChannelOutcome::Stopped`] and the partial result.
    pub async fn retrieve_channel(
        &self,
        channel: &ChannelSnapshot,
        request: &ExportRequest,
        seen: &mut HashSet<Snowflake>,
    ) -> ChannelRetrieval {
        let mut backoff = BackoffController::new(self.config.backoff.clone());
        let page_size = self.config.api.page_size;
        let cap = request.message_cap;
        let run_count_before = self.progress.current().messages_done;

        // Nothing at or after the window end can match, so start the cursor there
        let mut cursor = request.date_window.end.map(Snowflake::from_timestamp);
        let mut messages: Vec<NormalizedMessage> = Vec::new();
        let mut pages = 0usize;
        let mut duplicates = 0usize;
        let mut malformed = 0usize;
        let mut state = PipelineState::FetchingPage;

        let outcome = loop {
            state = match state {
                PipelineState::FetchingPage => {
                    if pages > 0 && !self.config.api.courtesy_delay.is_zero() {
                        tokio::time::sleep(self.config.api.courtesy_delay).await;
                    }

                    let before = cursor;
                    let fetched = backoff
                        .execute_with_retry(
                            || self.api.fetch_page(channel.id, page_size, before),
                            |delay, attempt| {
                                self.progress.status(format!(
                                    "Rate limited on {}, retry {} in {:.1}s",
                                    channel.name,
                                    attempt,
                                    delay.as_secs_f64()
                                ));
                            },
                        )
                        .await;

                    match fetched {
                        Ok(page) if page.is_empty() => PipelineState::Done(ChannelOutcome::Complete),
                        Ok(page) => {
                            pages += 1;
                            tracing::debug!(
                                channel_id = %channel.id,
                                page = pages,
                                records = page.len(),
                                "Fetched message page"
                            );
                            PipelineState::ProcessingPage(page)
                        }
                        Err(e) => {
                            tracing::warn!(
                                channel_id = %channel.id,
                                error = %e,
                                retained = messages.len(),
                                "Stopping channel retrieval early"
                            );
                            PipelineState::Done(ChannelOutcome::stopped(&e))
                        }
                    }
                }

                PipelineState::ProcessingPage(page) => {
                    let mut oldest: Option<Snowflake> = None;
                    let mut passed_window_start = false;
                    let mut capped = false;

                    for record in page {
                        let Some(id) = record_id(&record) else {
                            malformed += 1;
                            tracing::warn!(channel_id = %channel.id, "Skipping record without id");
                            continue;
                        };
                        oldest = Some(oldest.map_or(id, |o| o.min(id)));

                        if !seen.insert(id) {
                            duplicates += 1;
                            continue;
                        }

                        let message = match normalize(record, channel, &request.include) {
                            Ok(m) => m,
                            Err(e) => {
                                malformed += 1;
                                tracing::warn!(
                                    channel_id = %channel.id,
                                    message_id = %id,
                                    error = %e,
                                    "Skipping malformed message"
                                );
                                continue;
                            }
                        };

                        if request.date_window.is_before_start(message.timestamp) {
                            passed_window_start = true;
                        }
                        if !request.admits(&message) {
                            continue;
                        }

                        messages.push(message);
                        if cap > 0 && messages.len() >= cap {
                            capped = true;
                            break;
                        }
                    }

                    let retained = messages.len();
                    self.progress.update(|p| {
                        p.messages_done = run_count_before + retained;
                        p.status = format!("{}: {} messages", channel.name, retained);
                    });

                    if capped {
                        PipelineState::Done(ChannelOutcome::Capped)
                    } else if passed_window_start {
                        PipelineState::Done(ChannelOutcome::Complete)
                    } else {
                        match oldest {
                            Some(next) if cursor.is_none_or(|c| next < c) => {
                                cursor = Some(next);
                                PipelineState::FetchingPage
                            }
                            _ => {
                                tracing::warn!(
                                    channel_id = %channel.id,
                                    "Page did not advance the cursor, ending channel"
                                );
                                PipelineState::Done(ChannelOutcome::Complete)
                            }
                        }
                    }
                }

                PipelineState::Done(outcome) => break outcome,
            };
        };

        // Pages arrive newest first
        messages.reverse();
        messages.sort_by_key(|m| (m.timestamp, m.id));

        tracing::info!(
            channel_id = %channel.id,
            messages = messages.len(),
            pages,
            duplicates,
            malformed,
            outcome = ?outcome,
            "Channel retrieval finished"
        );

        ChannelRetrieval {
            channel: channel.clone(),
            messages,
            outcome,
            pages,
            duplicates,
            malformed,
        }
    }
}

impl ChannelOutcome {
    /// Build a stopped outcome from an error
    pub fn stopped(error: &Error) -> Self {
        ChannelOutcome::Stopped {
            error: error.to_string(),
            rate_limited: error.is_rate_limit(),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FakeChatApi, channel_snapshot, raw_message, test_config};
    use crate::types::{DateWindow, UserFilter};
    use chrono::{TimeZone, Utc};

    /// 250 messages, one minute apart, alternating between authors 1, 2 and 3
    fn busy_channel() -> FakeChatApi {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let records = (0..250u64)
            .map(|i| {
                let ts = base + chrono::Duration::minutes(i as i64);
                raw_message(1000 + i, 1 + i % 3, ts, &format!("message {i}"))
            })
            .collect();
        FakeChatApi::new().with_channel(Snowflake(10), records)
    }

    async fn run(api: &FakeChatApi, request: &ExportRequest) -> ChannelRetrieval {
        let config = test_config();
        let progress = ProgressReporter::new();
        let retriever = MessageRetriever::new(api, &config, &progress);
        let mut seen = HashSet::new();
        retriever
            .retrieve_channel(&channel_snapshot(10, "general"), request, &mut seen)
            .await
    }

    fn assert_chronological(messages: &[NormalizedMessage]) {
        for pair in messages.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn retrieves_everything_in_chronological_order() {
        let api = busy_channel();
        let result = run(&api, &ExportRequest::channel(Snowflake(10))).await;

        assert_eq!(result.outcome, ChannelOutcome::Complete);
        assert_eq!(result.messages.len(), 250);
        assert_eq!(result.pages, 3);
        assert_eq!(api.calls(), 4, "three pages plus the empty one");
        assert_chronological(&result.messages);
        assert_eq!(result.messages[0].content, "message 0");
    }

    #[tokio::test]
    async fn overlapping_pages_are_deduplicated() {
        let api = busy_channel().with_overlap();
        let result = run(&api, &ExportRequest::channel(Snowflake(10))).await;

        let ids: HashSet<_> = result.messages.iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), result.messages.len());
        assert_eq!(result.messages.len(), 250);
        assert!(result.duplicates >= 2);
    }

    #[tokio::test]
    async fn cap_is_a_hard_ceiling_even_mid_page() {
        let api = busy_channel();
        let request = ExportRequest::channel(Snowflake(10)).with_message_cap(130);
        let result = run(&api, &request).await;

        assert_eq!(result.outcome, ChannelOutcome::Capped);
        assert_eq!(result.messages.len(), 130);
        assert_eq!(result.pages, 2, "cap reached inside the second page");
        assert_eq!(api.calls(), 2);
        assert_chronological(&result.messages);
        // Newest-first pagination keeps the most recent 130
        assert_eq!(result.messages.last().unwrap().content, "message 249");
        assert_eq!(result.messages[0].content, "message 120");
    }

    #[tokio::test]
    async fn stalled_cursor_ends_the_channel() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let api = FakeChatApi::new()
            .with_channel(Snowflake(10), vec![raw_message(5, 1, base, "only")])
            .with_overlap();
        let result = run(&api, &ExportRequest::channel(Snowflake(10))).await;

        assert_eq!(result.outcome, ChannelOutcome::Complete);
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.duplicates, 1);
        assert_eq!(api.calls(), 2, "second page repeats the cursor and stops");
    }

    #[tokio::test]
    async fn include_filter_keeps_only_listed_authors() {
        let api = busy_channel();
        let request = ExportRequest::channel(Snowflake(10))
            .with_user_filter(UserFilter::include([Snowflake(1), Snowflake(2)]));
        let result = run(&api, &request).await;

        assert!(!result.messages.is_empty());
        assert!(
            result
                .messages
                .iter()
                .all(|m| m.author.id == Snowflake(1) || m.author.id == Snowflake(2))
        );
    }

    #[tokio::test]
    async fn exclude_filter_drops_listed_authors() {
        let api = busy_channel();
        let request = ExportRequest::channel(Snowflake(10))
            .with_user_filter(UserFilter::exclude([Snowflake(1), Snowflake(2)]));
        let result = run(&api, &request).await;

        assert!(!result.messages.is_empty());
        assert!(result.messages.iter().all(|m| m.author.id == Snowflake(3)));
    }

    #[tokio::test]
    async fn date_window_is_respected_and_stops_early() {
        let api = busy_channel();
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let window = DateWindow {
            start: Some(base + chrono::Duration::minutes(200)),
            end: Some(base + chrono::Duration::minutes(230)),
        };
        let result = run(
            &api,
            &ExportRequest::channel(Snowflake(10)).with_date_window(window),
        )
        .await;

        assert_eq!(result.messages.len(), 30);
        for m in &result.messages {
            assert!(window.contains(m.timestamp));
        }
        assert_eq!(result.pages, 1, "window start passed on the first page");
    }

    #[tokio::test]
    async fn malformed_records_are_skipped() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let records = vec![
            raw_message(1, 1, base, "ok"),
            serde_json::json!({"id": "2", "content": "no author"}),
            serde_json::json!({"content": "no id"}),
            raw_message(3, 1, base + chrono::Duration::minutes(1), "also ok"),
        ];
        let api = FakeChatApi::new().with_channel(Snowflake(10), records);
        let result = run(&api, &ExportRequest::channel(Snowflake(10))).await;

        assert_eq!(result.messages.len(), 2);
        assert_eq!(result.malformed, 2);
        assert_eq!(result.outcome, ChannelOutcome::Complete);
    }

    #[tokio::test]
    async fn fetch_failure_keeps_partial_result() {
        let api = busy_channel().fail_call(1, || Error::Http {
            status: 500,
            url: "https://api.test".into(),
        });
        let result = run(&api, &ExportRequest::channel(Snowflake(10))).await;

        assert_eq!(result.messages.len(), 100, "first page survives");
        assert_eq!(api.calls(), 2, "non-rate-limit failures are not retried");
        assert!(matches!(
            result.outcome,
            ChannelOutcome::Stopped {
                rate_limited: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn transient_rate_limits_are_absorbed() {
        let api = busy_channel()
            .fail_call(0, || Error::RateLimited { retry_after: None })
            .fail_call(1, || Error::RateLimited {
                retry_after: Some(std::time::Duration::from_millis(1)),
            });
        let result = run(&api, &ExportRequest::channel(Snowflake(10))).await;

        assert_eq!(result.outcome, ChannelOutcome::Complete);
        assert_eq!(result.messages.len(), 250);
    }
}

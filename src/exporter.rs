//! Export orchestration
//!
//! [`ChatExporter`] runs one export end to end: resolve the channels, retrieve
//! them one after another, download attachments when bundling, format, and
//! package. Channel, message and attachment failures are contained in the
//! [`ExportReport`]; only configuration errors and a scope that resolves to no
//! channel fail the whole call.

use crate::archive::{ArchivePackager, ExportArtifact};
use crate::attachments::{
    AttachmentBatch, AttachmentDownloader, BlobFetcher, HttpBlobFetcher, MediaFallback,
    OriginFallback,
};
use crate::config::Config;
use crate::directory::{Directory, display_name};
use crate::error::{Error, Result};
use crate::format::{ExportContext, render_document};
use crate::progress::ProgressReporter;
use crate::remote::{ChatApi, HttpChatApi};
use crate::retrieval::{ChannelOutcome, MessageRetriever};
use crate::sink::ArtifactSink;
use crate::types::{
    ChannelKind, ChannelSnapshot, ExportProgress, ExportRequest, ExportScope, NormalizedMessage,
};
use crate::utils::sanitize_scope;
use chrono::{Local, NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;

/// Per-channel line of an [`ExportReport`]
#[derive(Debug, Clone)]
pub struct ChannelSummary {
    /// Channel
    pub channel: ChannelSnapshot,
    /// How retrieval ended
    pub outcome: ChannelOutcome,
    /// Messages retained
    pub messages: usize,
    /// Records skipped as duplicates
    pub duplicates: usize,
    /// Records skipped as malformed
    pub malformed: usize,
}

/// Result of one export run
#[derive(Debug, Clone)]
pub struct ExportReport {
    /// The produced file
    pub artifact: ExportArtifact,
    /// Channels in export order
    pub channels: Vec<ChannelSummary>,
    /// Messages in the artifact
    pub message_count: usize,
    /// Records skipped as malformed across all channels
    pub malformed: usize,
    /// Attachments downloaded
    pub attachments_succeeded: usize,
    /// Attachments that could not be downloaded
    pub attachments_failed: usize,
    /// Bundling failed and the plain document was produced instead
    pub packaging_failed: bool,
    /// Terminal status line for the user
    pub status: String,
}

impl ExportReport {
    /// Every channel was retrieved to completion (or to its cap)
    pub fn is_complete(&self) -> bool {
        self.channels
            .iter()
            .all(|c| !matches!(c.outcome, ChannelOutcome::Stopped { .. }))
    }

    /// Some channel stopped because the rate-limit retries ran out
    pub fn rate_limited(&self) -> bool {
        self.channels.iter().any(|c| {
            matches!(
                c.outcome,
                ChannelOutcome::Stopped {
                    rate_limited: true,
                    ..
                }
            )
        })
    }
}

/// Chat history exporter
pub struct ChatExporter {
    config: Config,
    api: Arc<dyn ChatApi>,
    directory: Arc<dyn Directory>,
    downloader: AttachmentDownloader,
    packager: ArchivePackager,
    progress: ProgressReporter,
}

impl ChatExporter {
    /// Create an exporter from its collaborators
    ///
    /// Images refused cross-origin are re-fetched from their origin URL through
    /// the same `fetcher`.
    pub fn new(
        config: Config,
        api: Arc<dyn ChatApi>,
        directory: Arc<dyn Directory>,
        fetcher: Arc<dyn BlobFetcher>,
    ) -> Result<Self> {
        config.validate()?;
        let fallback: Arc<dyn MediaFallback> = Arc::new(OriginFallback::new(Arc::clone(&fetcher)));
        let downloader = AttachmentDownloader::new(config.attachments.clone(), fetcher, fallback);
        Ok(Self {
            config,
            api,
            directory,
            downloader,
            packager: ArchivePackager::zip(),
            progress: ProgressReporter::new(),
        })
    }

    /// Create an exporter talking HTTP to the configured API
    pub fn connect(config: Config, directory: Arc<dyn Directory>) -> Result<Self> {
        config.validate()?;
        let api = Arc::new(HttpChatApi::new(&config.api)?);
        let http_client = reqwest::Client::builder()
            .user_agent(config.api.user_agent.clone())
            .timeout(config.api.request_timeout)
            .build()?;
        let fetcher = Arc::new(HttpBlobFetcher::new(http_client));
        Self::new(config, api, directory, fetcher)
    }

    /// Replace the cross-origin fallback
    pub fn with_fallback(mut self, fallback: Arc<dyn MediaFallback>) -> Self {
        self.downloader = self.downloader.with_fallback(fallback);
        self
    }

    /// Replace the packager
    pub fn with_packager(mut self, packager: ArchivePackager) -> Self {
        self.packager = packager;
        self
    }

    /// Publish progress through `progress`
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Progress publisher used by this exporter
    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    /// Subscribe to progress snapshots
    pub fn subscribe(&self) -> watch::Receiver<ExportProgress> {
        self.progress.subscribe()
    }

    /// Resolve the request's scope into channel snapshots
    pub fn resolve_channels(&self, request: &ExportRequest) -> Result<Vec<ChannelSnapshot>> {
        let channels: Vec<ChannelSnapshot> = match &request.scope {
            ExportScope::Channels { channel_ids } => channel_ids
                .iter()
                .map(|id| match self.directory.channel(*id) {
                    Some(info) => ChannelSnapshot {
                        id: info.id,
                        name: display_name(&info, self.directory.as_ref()),
                        kind: info.kind,
                    },
                    None => {
                        tracing::warn!(channel_id = %id, "Channel not in directory, exporting by id");
                        ChannelSnapshot {
                            id: *id,
                            name: format!("#{}", id),
                            kind: ChannelKind::Standard,
                        }
                    }
                })
                .collect(),
            ExportScope::Server { guild_id } => {
                let channels: Vec<ChannelSnapshot> = self
                    .directory
                    .guild_channels(*guild_id)
                    .iter()
                    .map(|info| ChannelSnapshot {
                        id: info.id,
                        name: display_name(info, self.directory.as_ref()),
                        kind: info.kind,
                    })
                    .collect();
                if channels.is_empty() {
                    return Err(Error::NotFound(format!("no channels for server {}", guild_id)));
                }
                channels
            }
        };

        if channels.is_empty() {
            return Err(Error::config("scope", "no channels selected"));
        }
        Ok(channels)
    }

    /// Run an export
    pub async fn export(&self, request: &ExportRequest) -> Result<ExportReport> {
        let exported_at = Utc::now();
        let date = export_date();
        let channels = self.resolve_channels(request)?;

        tracing::info!(
            channels = channels.len(),
            format = %request.format,
            message_cap = request.message_cap,
            bundle = request.bundles_attachments(),
            "Starting export"
        );

        let channels_total = channels.len();
        let messages_total = (request.message_cap > 0).then(|| request.message_cap * channels_total);
        self.progress.update(|p| {
            *p = ExportProgress {
                channels_total,
                messages_total,
                status: "Starting export".to_string(),
                ..ExportProgress::default()
            };
        });

        let retriever = MessageRetriever::new(self.api.as_ref(), &self.config, &self.progress);
        let mut seen = HashSet::new();
        let mut summaries = Vec::with_capacity(channels_total);
        let mut messages: Vec<NormalizedMessage> = Vec::new();

        for (index, channel) in channels.iter().enumerate() {
            self.progress.update(|p| {
                p.channel_label = channel.name.clone();
                p.channels_done = index;
                p.status = format!("Fetching {}", channel.name);
            });

            let retrieval = retriever.retrieve_channel(channel, request, &mut seen).await;
            summaries.push(ChannelSummary {
                channel: retrieval.channel,
                outcome: retrieval.outcome,
                messages: retrieval.messages.len(),
                duplicates: retrieval.duplicates,
                malformed: retrieval.malformed,
            });
            messages.extend(retrieval.messages);

            self.progress.update(|p| p.channels_done = index + 1);
        }

        messages.sort_by_key(|m| (m.timestamp, m.id));
        let scope = artifact_scope(&channels);
        let ctx = ExportContext::new(request, &channels).with_exported_at(exported_at);

        let mut batch = AttachmentBatch::default();
        let mut packaging_failed = false;
        let artifact = if request.bundles_attachments() {
            let attachments: Vec<_> = messages
                .iter()
                .flat_map(|m| m.attachments.iter().cloned())
                .collect();
            self.progress.status(format!("Downloading {} attachments", attachments.len()));
            batch = self.downloader.download_all(&attachments, &self.progress).await;

            self.progress.status("Building archive");
            let paths = batch.local_paths();
            let local_ctx = ctx.clone().with_local_paths(&paths);
            let document = render_document(request.format, &messages, &local_ctx)?;
            match self.packager.bundle(&document, &batch, &scope, date).await {
                Ok(artifact) => artifact,
                Err(e) => {
                    tracing::warn!(error = %e, "Packaging failed, falling back to the plain document");
                    packaging_failed = true;
                    let document = render_document(request.format, &messages, &ctx)?;
                    self.packager.single(document, &scope, date)
                }
            }
        } else {
            self.progress.status("Formatting export");
            let document = render_document(request.format, &messages, &ctx)?;
            self.packager.single(document, &scope, date)
        };

        let malformed = summaries.iter().map(|s| s.malformed).sum();
        let mut report = ExportReport {
            artifact,
            channels: summaries,
            message_count: messages.len(),
            malformed,
            attachments_succeeded: batch.succeeded,
            attachments_failed: batch.failed,
            packaging_failed,
            status: String::new(),
        };
        report.status = terminal_status(&report);

        tracing::info!(
            artifact = %report.artifact.filename,
            messages = report.message_count,
            attachments_failed = report.attachments_failed,
            complete = report.is_complete(),
            "Export finished"
        );
        let status = report.status.clone();
        self.progress.update(|p| {
            p.channels_done = channels_total;
            p.status = status;
        });

        Ok(report)
    }

    /// Run an export and hand the artifact to `sink`
    ///
    /// Returns the report and the location reported by the sink.
    pub async fn export_to(
        &self,
        request: &ExportRequest,
        sink: &dyn ArtifactSink,
    ) -> Result<(ExportReport, String)> {
        let report = self.export(request).await?;
        let location = sink.save(&report.artifact).await?;
        Ok((report, location))
    }
}

/// Scope part of the artifact name
fn artifact_scope(channels: &[ChannelSnapshot]) -> String {
    match channels {
        [single] => sanitize_scope(&single.name),
        many => format!("{}-channels", many.len()),
    }
}

fn terminal_status(report: &ExportReport) -> String {
    let stopped: Vec<&ChannelOutcome> = report
        .channels
        .iter()
        .map(|c| &c.outcome)
        .filter(|o| matches!(o, ChannelOutcome::Stopped { .. }))
        .collect();

    if !stopped.is_empty() && report.message_count == 0 {
        if report.rate_limited() {
            return Error::RateLimitExceeded { attempts: 0 }.user_message();
        }
        return match stopped[0] {
            ChannelOutcome::Stopped { error, .. } => format!("Export failed: {}", error),
            _ => "Export failed".to_string(),
        };
    }

    let mut status = if stopped.is_empty() {
        format!(
            "Export complete: {} messages from {} channel(s)",
            report.message_count,
            report.channels.len()
        )
    } else if report.rate_limited() {
        format!(
            "Export incomplete: rate limited — try a smaller export ({} messages saved)",
            report.message_count
        )
    } else {
        format!(
            "Export incomplete: {} channel(s) failed ({} messages saved)",
            stopped.len(),
            report.message_count
        )
    };

    if report.attachments_failed > 0 {
        status.push_str(&format!(
            ", {} attachment(s) could not be downloaded",
            report.attachments_failed
        ));
    }
    if report.packaging_failed {
        status.push_str(", attachments not bundled");
    }
    status
}

/// Local date at which an export starting now is stamped
pub fn export_date() -> NaiveDate {
    Local::now().date_naive()
}

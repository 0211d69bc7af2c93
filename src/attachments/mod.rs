//! Attachment acquisition
//!
//! Downloads every attachment referenced by the retained messages through a
//! sliding window of at most `concurrency` simultaneous fetches. Each
//! attachment gets a collision-free local name, a rewritten download URL, a
//! bounded number of retries on 429, and a fallback after cross-origin
//! refusals. One attachment failing never aborts the batch.

mod fetch;
mod naming;
mod rewrite;

pub use fetch::{BlobFetcher, FetchError, HttpBlobFetcher, MediaFallback, OriginFallback};
pub use naming::FilenameRegistry;
pub use rewrite::{is_video_gif, rewrite_download_url};

use crate::config::AttachmentConfig;
use crate::error::AttachmentError;
use crate::progress::ProgressReporter;
use crate::types::{AttachmentDescriptor, Snowflake};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Folder attachments are stored under inside a bundle
pub const ATTACHMENTS_DIR: &str = "attachments";

/// Outcome of one attachment
#[derive(Debug, Clone)]
pub struct AttachmentResult {
    /// The attachment as referenced by its message
    pub descriptor: AttachmentDescriptor,
    /// Collision-free local filename
    pub local_name: String,
    /// Downloaded bytes or the reason there are none
    pub outcome: Result<Vec<u8>, AttachmentError>,
}

impl AttachmentResult {
    /// Path of the file inside a bundle
    pub fn local_path(&self) -> String {
        format!("{}/{}", ATTACHMENTS_DIR, self.local_name)
    }
}

/// Every attachment outcome of one export, in reference order
#[derive(Debug, Clone, Default)]
pub struct AttachmentBatch {
    /// Per-attachment results
    pub results: Vec<AttachmentResult>,
    /// Successful downloads
    pub succeeded: usize,
    /// Failed downloads
    pub failed: usize,
}

impl AttachmentBatch {
    /// Bundle paths of the successfully downloaded attachments, by attachment id
    pub fn local_paths(&self) -> HashMap<Snowflake, String> {
        self.results
            .iter()
            .filter(|r| r.outcome.is_ok())
            .map(|r| (r.descriptor.id, r.local_path()))
            .collect()
    }

    /// Ids of attachments that could not be downloaded
    pub fn failed_ids(&self) -> HashSet<Snowflake> {
        self.results
            .iter()
            .filter(|r| r.outcome.is_err())
            .map(|r| r.descriptor.id)
            .collect()
    }

    /// `(bundle path, bytes)` of every successful download
    pub fn files(&self) -> impl Iterator<Item = (String, &[u8])> {
        self.results.iter().filter_map(|r| match &r.outcome {
            Ok(bytes) => Some((r.local_path(), bytes.as_slice())),
            Err(_) => None,
        })
    }
}

struct Job {
    index: usize,
    descriptor: AttachmentDescriptor,
    local_name: String,
}

/// Concurrent attachment downloader
pub struct AttachmentDownloader {
    config: AttachmentConfig,
    fetcher: Arc<dyn BlobFetcher>,
    fallback: Arc<dyn MediaFallback>,
}

impl AttachmentDownloader {
    /// Create a downloader
    pub fn new(
        config: AttachmentConfig,
        fetcher: Arc<dyn BlobFetcher>,
        fallback: Arc<dyn MediaFallback>,
    ) -> Self {
        Self {
            config,
            fetcher,
            fallback,
        }
    }

    /// Replace the cross-origin fallback
    pub fn with_fallback(mut self, fallback: Arc<dyn MediaFallback>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Download every distinct attachment in `attachments`
    ///
    /// Attachments are deduplicated by id. Local names are assigned up front in
    /// reference order so they do not depend on completion order.
    pub async fn download_all(
        &self,
        attachments: &[AttachmentDescriptor],
        progress: &ProgressReporter,
    ) -> AttachmentBatch {
        let mut registry = FilenameRegistry::new();
        let mut scheduled = HashSet::new();
        let jobs: Vec<Job> = attachments
            .iter()
            .filter(|a| scheduled.insert(a.id))
            .enumerate()
            .map(|(index, descriptor)| Job {
                index,
                local_name: registry.assign(&descriptor.filename),
                descriptor: descriptor.clone(),
            })
            .collect();

        let total = jobs.len();
        if total == 0 {
            return AttachmentBatch::default();
        }

        tracing::info!(
            attachments = total,
            concurrency = self.config.concurrency,
            "Downloading attachments"
        );

        let succeeded = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));

        let mut results: Vec<(usize, AttachmentResult)> = stream::iter(jobs)
            .map(|job| {
                let succeeded = Arc::clone(&succeeded);
                let failed = Arc::clone(&failed);
                async move {
                    let outcome = self.acquire(&job.descriptor).await;
                    match &outcome {
                        Ok(bytes) => {
                            succeeded.fetch_add(1, Ordering::SeqCst);
                            tracing::debug!(
                                attachment_id = %job.descriptor.id,
                                local_name = %job.local_name,
                                bytes = bytes.len(),
                                "Attachment downloaded"
                            );
                        }
                        Err(e) => {
                            failed.fetch_add(1, Ordering::SeqCst);
                            tracing::warn!(
                                attachment_id = %job.descriptor.id,
                                filename = %job.descriptor.filename,
                                error = %e,
                                "Attachment download failed"
                            );
                        }
                    }

                    let done = succeeded.load(Ordering::SeqCst) + failed.load(Ordering::SeqCst);
                    progress.status(format!("Downloading attachments {done}/{total}"));

                    (
                        job.index,
                        AttachmentResult {
                            descriptor: job.descriptor,
                            local_name: job.local_name,
                            outcome,
                        },
                    )
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        results.sort_by_key(|(index, _)| *index);

        let batch = AttachmentBatch {
            results: results.into_iter().map(|(_, r)| r).collect(),
            succeeded: succeeded.load(Ordering::SeqCst),
            failed: failed.load(Ordering::SeqCst),
        };
        tracing::info!(
            succeeded = batch.succeeded,
            failed = batch.failed,
            "Attachment downloads finished"
        );
        batch
    }

    /// Fetch one attachment: rewrite, direct fetch with 429 retries, then fallback
    async fn acquire(&self, attachment: &AttachmentDescriptor) -> Result<Vec<u8>, AttachmentError> {
        let url = rewrite_download_url(&attachment.url, &attachment.filename, &self.config)?;
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.fetcher.fetch(&url).await {
                Ok(bytes) => return Ok(bytes),
                Err(FetchError::RateLimited { retry_after }) => {
                    if attempt >= max_attempts {
                        return Err(AttachmentError::RateLimited {
                            filename: attachment.filename.clone(),
                            attempts: attempt,
                        });
                    }
                    let delay = retry_after
                        .unwrap_or(self.config.retry_delay)
                        .min(self.config.max_retry_delay);
                    tracing::debug!(
                        filename = %attachment.filename,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Attachment rate limited, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(FetchError::CrossOrigin(reason)) => {
                    tracing::debug!(
                        filename = %attachment.filename,
                        reason = %reason,
                        "Direct fetch refused, trying fallback"
                    );
                    return self
                        .fallback
                        .recover(attachment, attachment.media_kind())
                        .await;
                }
                Err(FetchError::Status(status)) => {
                    return Err(AttachmentError::Http {
                        filename: attachment.filename.clone(),
                        status,
                    });
                }
                Err(FetchError::Transport(reason)) => {
                    return Err(AttachmentError::Network {
                        filename: attachment.filename.clone(),
                        reason,
                    });
                }
            }
        }
    }
}

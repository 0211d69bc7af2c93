//! # chat-export
//!
//! Library for exporting chat channel history to portable files.
//!
//! ## Design Philosophy
//!
//! chat-export is designed to be:
//! - **Library-first** - No CLI or UI, collaborators are injected as traits
//! - **Failure-contained** - One bad message, attachment or channel never loses the rest
//! - **Rate-limit aware** - 429 responses are absorbed with backoff, not surfaced
//! - **Observable** - Progress snapshots are published over a watch channel
//!
//! ## Quick Start
//!
//! ```no_run
//! use chat_export::{ChatExporter, Config, DirectorySink, ExportFormat, ExportRequest, Snowflake};
//! use chat_export::directory::StaticDirectory;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.api.token = Some("token".to_string());
//!
//!     let exporter = ChatExporter::connect(config, Arc::new(StaticDirectory::new()))?;
//!
//!     // Watch progress while the export runs
//!     let mut progress = exporter.subscribe();
//!     tokio::spawn(async move {
//!         while progress.changed().await.is_ok() {
//!             println!("{}", progress.borrow().status);
//!         }
//!     });
//!
//!     let request = ExportRequest::channel(Snowflake(123456789)).with_format(ExportFormat::Json);
//!     let (report, path) = exporter
//!         .export_to(&request, &DirectorySink::new("exports"))
//!         .await?;
//!     println!("{} -> {}", report.status, path);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Artifact packaging and archive writers
pub mod archive;
/// Concurrent attachment downloads
pub mod attachments;
/// Rate-limit backoff controller
pub mod backoff;
/// Configuration types
pub mod config;
/// Channel and user directory
pub mod directory;
/// Error types
pub mod error;
/// Export orchestration
pub mod exporter;
/// Export formatters
pub mod format;
/// Chat markup rendering
pub mod markup;
/// Progress reporting
pub mod progress;
/// Remote chat API access
pub mod remote;
/// Message retrieval pipeline
pub mod retrieval;
/// Artifact sinks
pub mod sink;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test_helpers;

// Re-export commonly used types
pub use archive::{ArchivePackager, ArchiveWriter, ExportArtifact, ZipArchiveWriter};
pub use attachments::{
    AttachmentBatch, AttachmentDownloader, BlobFetcher, HttpBlobFetcher, MediaFallback,
    OriginFallback,
};
pub use backoff::BackoffController;
pub use config::{Config, ExportSettings, SettingsSource};
pub use directory::{Directory, StaticDirectory};
pub use error::{AttachmentError, Error, Result};
pub use exporter::{ChatExporter, ExportReport};
pub use progress::ProgressReporter;
pub use remote::{ChatApi, HttpChatApi};
pub use retrieval::ChannelOutcome;
pub use sink::{ArtifactSink, DirectorySink};
pub use types::{
    DateWindow, ExportFormat, ExportProgress, ExportRequest, ExportScope, IncludeFlags,
    NormalizedMessage, Snowflake, UserFilter,
};

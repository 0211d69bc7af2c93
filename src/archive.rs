//! Artifact packaging
//!
//! Wraps a formatted document into the downloadable artifact. Without
//! bundling the document is the artifact; with bundling the document and every
//! downloaded attachment go into one zip archive, attachments under
//! `attachments/`.

use crate::attachments::AttachmentBatch;
use crate::error::{Error, Result};
use crate::format::ExportDocument;
use chrono::NaiveDate;
use std::io::{Cursor, Write};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Media type of bundled exports
pub const ARCHIVE_MIME: &str = "application/zip";

/// One named buffer inside an archive
#[derive(Debug, Clone, Copy)]
pub struct ArchiveEntry<'a> {
    /// Path inside the archive (`/`-separated)
    pub path: &'a str,
    /// File contents
    pub bytes: &'a [u8],
}

/// Assembles named buffers into one archive
pub trait ArchiveWriter: Send + Sync {
    /// Build an archive from `entries`
    fn write(&self, entries: &[ArchiveEntry<'_>]) -> Result<Vec<u8>>;
}

/// Zip implementation of [`ArchiveWriter`]
#[derive(Debug, Clone, Copy)]
pub struct ZipArchiveWriter {
    compression: zip::CompressionMethod,
}

impl Default for ZipArchiveWriter {
    fn default() -> Self {
        Self {
            compression: zip::CompressionMethod::Deflated,
        }
    }
}

impl ZipArchiveWriter {
    /// Writer using a specific compression method
    pub fn with_compression(compression: zip::CompressionMethod) -> Self {
        Self { compression }
    }
}

impl ArchiveWriter for ZipArchiveWriter {
    fn write(&self, entries: &[ArchiveEntry<'_>]) -> Result<Vec<u8>> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::FileOptions::default().compression_method(self.compression);

        for entry in entries {
            writer
                .start_file(entry.path, options)
                .map_err(|e| Error::Packaging(format!("failed to add {}: {}", entry.path, e)))?;
            writer.write_all(entry.bytes)?;
        }

        let cursor = writer
            .finish()
            .map_err(|e| Error::Packaging(format!("failed to finish archive: {}", e)))?;
        Ok(cursor.into_inner())
    }
}

/// A file ready to be saved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    /// Suggested filename
    pub filename: String,
    /// Media type
    pub mime: String,
    /// Contents
    pub bytes: Vec<u8>,
}

/// `export-<scope>-<YYYY-MM-DD>` (without extension)
pub fn artifact_stem(scope: &str, date: NaiveDate) -> String {
    format!("export-{}-{}", scope, date.format("%Y-%m-%d"))
}

type WriterFactory = Box<dyn Fn() -> Result<Arc<dyn ArchiveWriter>> + Send + Sync>;

/// Produces export artifacts
///
/// The archive writer is created by the injected factory the first time a
/// bundle is built and reused afterwards; exports that never bundle never
/// create it.
pub struct ArchivePackager {
    factory: WriterFactory,
    writer: OnceCell<Arc<dyn ArchiveWriter>>,
}

impl std::fmt::Debug for ArchivePackager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchivePackager")
            .field("writer_initialized", &self.writer.initialized())
            .finish()
    }
}

impl Default for ArchivePackager {
    fn default() -> Self {
        Self::zip()
    }
}

impl ArchivePackager {
    /// Packager creating its writer through `factory`
    pub fn new(
        factory: impl Fn() -> Result<Arc<dyn ArchiveWriter>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            factory: Box::new(factory),
            writer: OnceCell::new(),
        }
    }

    /// Packager producing zip archives
    pub fn zip() -> Self {
        Self::new(|| Ok(Arc::new(ZipArchiveWriter::default()) as Arc<dyn ArchiveWriter>))
    }

    async fn writer(&self) -> Result<&Arc<dyn ArchiveWriter>> {
        self.writer
            .get_or_try_init(|| async {
                tracing::debug!("Initializing archive writer");
                (self.factory)()
            })
            .await
    }

    /// The document itself as the artifact
    pub fn single(&self, document: ExportDocument, scope: &str, date: NaiveDate) -> ExportArtifact {
        ExportArtifact {
            filename: format!("{}.{}", artifact_stem(scope, date), document.extension),
            mime: document.mime.to_string(),
            bytes: document.bytes,
        }
    }

    /// Document plus downloaded attachments in one archive
    ///
    /// Failed attachments are left out. On error nothing is consumed, so the
    /// caller can still fall back to [`ArchivePackager::single`].
    pub async fn bundle(
        &self,
        document: &ExportDocument,
        attachments: &AttachmentBatch,
        scope: &str,
        date: NaiveDate,
    ) -> Result<ExportArtifact> {
        let stem = artifact_stem(scope, date);
        let document_name = format!("{}.{}", stem, document.extension);
        let files: Vec<(String, &[u8])> = attachments.files().collect();

        let mut entries = Vec::with_capacity(files.len() + 1);
        entries.push(ArchiveEntry {
            path: &document_name,
            bytes: &document.bytes,
        });
        entries.extend(files.iter().map(|(path, bytes)| ArchiveEntry { path, bytes }));

        let writer = self.writer().await?;
        let bytes = writer.write(&entries)?;

        tracing::info!(
            entries = entries.len(),
            bytes = bytes.len(),
            "Built export archive"
        );

        Ok(ExportArtifact {
            filename: format!("{}-with-attachments.zip", stem),
            mime: ARCHIVE_MIME.to_string(),
            bytes,
        })
    }
}

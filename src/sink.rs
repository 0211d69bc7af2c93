//! Saving artifacts

use crate::archive::ExportArtifact;
use crate::error::Result;
use crate::utils::get_unique_path;
use async_trait::async_trait;
use std::path::PathBuf;

/// Destination for finished artifacts
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Persist `artifact`, returning where it ended up
    async fn save(&self, artifact: &ExportArtifact) -> Result<String>;
}

/// Writes artifacts into a directory, renaming on collision
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Sink writing into `dir` (created on first save)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ArtifactSink for DirectorySink {
    async fn save(&self, artifact: &ExportArtifact) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = get_unique_path(&self.dir.join(&artifact.filename))?;
        tokio::fs::write(&path, &artifact.bytes).await?;
        tracing::info!(
            path = %path.display(),
            mime = %artifact.mime,
            bytes = artifact.bytes.len(),
            "Saved export"
        );
        Ok(path.display().to_string())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn existing_files_are_not_overwritten() {
        let temp_dir = TempDir::new().unwrap();
        let sink = DirectorySink::new(temp_dir.path().join("exports"));
        let artifact = ExportArtifact {
            filename: "export-general-2024-05-01.txt".into(),
            mime: "text/plain".into(),
            bytes: b"first".to_vec(),
        };

        let first = sink.save(&artifact).await.unwrap();
        let second = sink
            .save(&ExportArtifact {
                bytes: b"second".to_vec(),
                ..artifact.clone()
            })
            .await
            .unwrap();

        assert!(first.ends_with("export-general-2024-05-01.txt"));
        assert!(second.ends_with("export-general-2024-05-01 (1).txt"));
        assert_eq!(std::fs::read(&first).unwrap(), b"first");
        assert_eq!(std::fs::read(&second).unwrap(), b"second");
    }
}

//! Hand-off of exported reports
//!
//! The fill engine passes every written PDF to a `ShareTarget`. Sharing is
//! best-effort: the engine logs failures and keeps the export successful.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// MIME type of exported reports
pub const PDF_MIME: &str = "application/pdf";

/// Receives exported files
#[async_trait]
pub trait ShareTarget: Send + Sync {
    async fn share(&self, path: &Path, mime_type: &str) -> Result<(), ShareError>;
}

/// Share failures
#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    #[error("Share target rejected file: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Logs the export and does nothing else
#[derive(Debug, Default, Clone, Copy)]
pub struct LogShareTarget;

#[async_trait]
impl ShareTarget for LogShareTarget {
    async fn share(&self, path: &Path, mime_type: &str) -> Result<(), ShareError> {
        tracing::info!(file = %path.display(), mime_type, "Report ready to share");
        Ok(())
    }
}

/// Copies exported files into an outbox directory picked up by another
/// process (sync client, mail relay)
#[derive(Debug, Clone)]
pub struct OutboxShareTarget {
    dir: PathBuf,
}

impl OutboxShareTarget {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl ShareTarget for OutboxShareTarget {
    async fn share(&self, path: &Path, mime_type: &str) -> Result<(), ShareError> {
        if mime_type != PDF_MIME {
            return Err(ShareError::Rejected(format!("unsupported type {}", mime_type)));
        }
        let file_name = path
            .file_name()
            .ok_or_else(|| ShareError::Rejected(format!("no file name: {}", path.display())))?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let dest = self.dir.join(file_name);
        tokio::fs::copy(path, &dest).await?;

        tracing::info!(file = %dest.display(), "Copied report to outbox");
        Ok(())
    }
}

use super::resilient::{retry_telegram_operation, retry_telegram_request};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::FileId;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// A downloaded file that is removed from disk when dropped.
#[derive(Debug)]
pub struct TempMedia {
    path: PathBuf,
}

impl TempMedia {
    /// Reserve a unique path in the system temp directory.
    #[must_use]
    pub fn reserve(extension: &str) -> Self {
        Self::reserve_in(&std::env::temp_dir(), extension)
    }

    /// Reserve a unique path inside `dir`.
    #[must_use]
    pub fn reserve_in(dir: &Path, extension: &str) -> Self {
        let name = format!("subgate-{}.{extension}", uuid::Uuid::new_v4());
        Self {
            path: dir.join(name),
        }
    }

    /// Download a Telegram file into a fresh temp file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file metadata or contents cannot be fetched
    /// or written. The partial file is removed either way.
    pub async fn download(bot: &Bot, file_id: &FileId, extension: &str) -> Result<Self> {
        let media = Self::reserve(extension);

        let file = retry_telegram_request(|| async { bot.get_file(file_id.clone()).await })
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get file info: {e}"))?;

        retry_telegram_operation(|| async {
            let mut dst = tokio::fs::File::create(&media.path)
                .await
                .with_context(|| format!("Failed to create {}", media.path.display()))?;
            bot.download_file(&file.path, &mut dst)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to download file: {e}"))?;
            dst.flush().await?;
            Ok(())
        })
        .await?;

        debug!(path = %media.path.display(), size = file.size, "Media downloaded");
        Ok(media)
    }

    /// Location on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn read(&self) -> Result<Vec<u8>> {
        tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))
    }
}

impl Drop for TempMedia {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Temp media removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "Failed to remove temp media: {e}"),
        }
    }
}

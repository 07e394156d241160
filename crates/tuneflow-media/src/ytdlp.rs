//! Audio extraction from video URLs with yt-dlp.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use tuneflow_core::defaults::{AUDIO_EXTENSION, TOOL_TIMEOUT_SECS, YTDLP_PATH};
use tuneflow_core::{AudioDownloader, Result};

use crate::process::run_cmd_with_timeout;

/// [`AudioDownloader`] backed by the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlpDownloader {
    binary: String,
    timeout_secs: u64,
}

impl Default for YtDlpDownloader {
    fn default() -> Self {
        Self {
            binary: YTDLP_PATH.to_string(),
            timeout_secs: TOOL_TIMEOUT_SECS,
        }
    }
}

impl YtDlpDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `YTDLP_PATH` and `TOOL_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let mut downloader = Self::default();
        if let Ok(path) = std::env::var("YTDLP_PATH") {
            downloader.binary = path;
        }
        if let Some(secs) = std::env::var("TOOL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            downloader.timeout_secs = secs;
        }
        downloader
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[async_trait]
impl AudioDownloader for YtDlpDownloader {
    async fn download_audio(
        &self,
        source_url: &str,
        dest_dir: &Path,
        stem: &str,
    ) -> Result<Option<PathBuf>> {
        let template = dest_dir.join(format!("{}.%(ext)s", stem));
        let expected = dest_dir.join(format!("{}.{}", stem, AUDIO_EXTENSION));

        debug!(
            subsystem = "media",
            component = "ytdlp",
            url = source_url,
            "Downloading audio"
        );

        run_cmd_with_timeout(
            Command::new(&self.binary)
                .arg("--extract-audio")
                .arg("--audio-format")
                .arg(AUDIO_EXTENSION)
                .arg("--no-playlist")
                .arg("--quiet")
                .arg("--output")
                .arg(&template)
                .arg(source_url),
            self.timeout_secs,
        )
        .await?;

        if tokio::fs::try_exists(&expected).await? {
            info!(
                subsystem = "media",
                component = "ytdlp",
                path = %expected.display(),
                "Audio downloaded"
            );
            Ok(Some(expected))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_run_without_output_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = YtDlpDownloader::new().with_binary("true");

        let result = downloader
            .download_audio("https://example.com/v", dir.path(), "audio")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_missing_binary_errors() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = YtDlpDownloader::new().with_binary("tuneflow-no-such-ytdlp");

        assert!(downloader
            .download_audio("https://example.com/v", dir.path(), "audio")
            .await
            .is_err());
    }
}

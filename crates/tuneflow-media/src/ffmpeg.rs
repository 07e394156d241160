//! Transcoding to mp3 with ffmpeg.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use tuneflow_core::defaults::{AUDIO_EXTENSION, FFMPEG_PATH, TOOL_TIMEOUT_SECS};
use tuneflow_core::{AudioTranscoder, Result};

use crate::process::run_cmd_with_timeout;

/// [`AudioTranscoder`] backed by the `ffmpeg` executable (libmp3lame, VBR q2).
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: String,
    timeout_secs: u64,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self {
            binary: FFMPEG_PATH.to_string(),
            timeout_secs: TOOL_TIMEOUT_SECS,
        }
    }
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `FFMPEG_PATH` and `TOOL_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let mut transcoder = Self::default();
        if let Ok(path) = std::env::var("FFMPEG_PATH") {
            transcoder.binary = path;
        }
        if let Some(secs) = std::env::var("TOOL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            transcoder.timeout_secs = secs;
        }
        transcoder
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }
}

/// Output path next to `src`; never equal to `src`.
pub(crate) fn output_path(src: &Path) -> PathBuf {
    let candidate = src.with_extension(AUDIO_EXTENSION);
    if candidate == src {
        src.with_file_name(format!("transcoded.{}", AUDIO_EXTENSION))
    } else {
        candidate
    }
}

#[async_trait]
impl AudioTranscoder for FfmpegTranscoder {
    async fn transcode(&self, src: &Path) -> Result<PathBuf> {
        let dst = output_path(src);
        debug!(
            subsystem = "media",
            component = "ffmpeg",
            src = %src.display(),
            dst = %dst.display(),
            "Transcoding audio"
        );

        run_cmd_with_timeout(
            Command::new(&self.binary)
                .arg("-hide_banner")
                .arg("-loglevel")
                .arg("error")
                .arg("-y")
                .arg("-i")
                .arg(src)
                .arg("-vn")
                .arg("-codec:a")
                .arg("libmp3lame")
                .arg("-q:a")
                .arg("2")
                .arg(&dst),
            self.timeout_secs,
        )
        .await?;

        Ok(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_swaps_extension() {
        assert_eq!(
            output_path(Path::new("/tmp/job/source.wav")),
            PathBuf::from("/tmp/job/source.mp3")
        );
    }

    #[test]
    fn test_output_path_never_overwrites_input() {
        assert_eq!(
            output_path(Path::new("/tmp/job/source.mp3")),
            PathBuf::from("/tmp/job/transcoded.mp3")
        );
    }
}

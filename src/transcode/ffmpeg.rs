use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::{TranscodeError, Transcoder};
use crate::utils::find_tool;

/// Transcoder backed by the ffmpeg/ffprobe binaries.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegTranscoder {
    pub fn locate() -> Self {
        let ffmpeg = find_tool("ffmpeg");
        let ffprobe = find_tool("ffprobe");
        tracing::info!(ffmpeg = %ffmpeg.display(), ffprobe = %ffprobe.display(), "transcoder ready");
        Self { ffmpeg, ffprobe }
    }

    #[cfg(test)]
    fn with_binaries(ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        Self { ffmpeg, ffprobe }
    }
}

fn staging_path(file: &Path) -> PathBuf {
    PathBuf::from(format!("{}.tmp.mp4", file.display()))
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn probe_video_codec(&self, file: &Path) -> Option<String> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "quiet",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=codec_name",
                "-of",
                "csv=p=0",
            ])
            .arg(file)
            .stdin(Stdio::null())
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let codec = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if codec.is_empty() {
            None
        } else {
            Some(codec)
        }
    }

    async fn reencode_to_h264(&self, file: &Path) -> Result<(), TranscodeError> {
        let staging = staging_path(file);
        let result = Command::new(&self.ffmpeg)
            .arg("-y")
            .arg("-i")
            .arg(file)
            .args([
                "-c:v",
                "libx264",
                "-preset",
                "medium",
                "-crf",
                "18",
                "-c:a",
                "aac",
                "-b:a",
                "256k",
                "-movflags",
                "+faststart",
                "-pix_fmt",
                "yuv420p",
            ])
            .arg(&staging)
            .stdin(Stdio::null())
            .output()
            .await;

        match result {
            Ok(output) if output.status.success() => {
                tokio::fs::rename(&staging, file)
                    .await
                    .map_err(TranscodeError::Replace)
            }
            Ok(output) => {
                let _ = tokio::fs::remove_file(&staging).await;
                let stderr = String::from_utf8_lossy(&output.stderr);
                let reason = stderr
                    .lines()
                    .rev()
                    .find(|l| !l.trim().is_empty())
                    .unwrap_or("no output")
                    .to_string();
                Err(TranscodeError::Encode(reason))
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                Err(TranscodeError::Launch(e))
            }
        }
    }
}

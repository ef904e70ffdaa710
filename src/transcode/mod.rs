pub mod ffmpeg;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

pub use ffmpeg::FfmpegTranscoder;

/// Codec that needs no re-encoding for Premiere-compatible output.
pub const TARGET_VIDEO_CODEC: &str = "h264";

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Failed to launch ffmpeg: {0}")]
    Launch(std::io::Error),

    #[error("ffmpeg failed: {0}")]
    Encode(String),

    #[error("Failed to replace original file: {0}")]
    Replace(std::io::Error),
}

/// External transcoder: probe a file's video codec and re-encode it to
/// the H.264/AAC baseline in place.
///
/// `reencode_to_h264` must follow the write-to-temp, swap-on-success
/// discipline: the original file is only replaced after a successful
/// encode, and the temporary file is removed on failure.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Codec identifier of the first video stream, `None` when the probe
    /// fails or reports nothing.
    async fn probe_video_codec(&self, file: &Path) -> Option<String>;

    async fn reencode_to_h264(&self, file: &Path) -> Result<(), TranscodeError>;
}

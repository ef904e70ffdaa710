use std::fmt;
use std::path::PathBuf;

/// Quality cap for video downloads. Each variant maps to exactly one
/// yt-dlp format selector, see [`format_selector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Best,
    Uhd4k,
    Qhd1440,
    Fhd1080,
    Hd720,
    Sd480,
}

impl Quality {
    pub const ALL: [Quality; 6] = [
        Quality::Best,
        Quality::Uhd4k,
        Quality::Qhd1440,
        Quality::Fhd1080,
        Quality::Hd720,
        Quality::Sd480,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Quality::Best => "Best",
            Quality::Uhd4k => "4K",
            Quality::Qhd1440 => "1440p",
            Quality::Fhd1080 => "1080p",
            Quality::Hd720 => "720p",
            Quality::Sd480 => "480p",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Pure mapping from (audio_only, quality) to a yt-dlp format selector.
/// Audio-only downloads ignore the quality cap entirely.
pub fn format_selector(audio_only: bool, quality: Quality) -> &'static str {
    if audio_only {
        return "bestaudio/best";
    }
    match quality {
        Quality::Best => "bestvideo+bestaudio/best",
        Quality::Uhd4k => "bestvideo[height<=2160]+bestaudio/best[height<=2160]",
        Quality::Qhd1440 => "bestvideo[height<=1440]+bestaudio/best[height<=1440]",
        Quality::Fhd1080 => "bestvideo[height<=1080]+bestaudio/best[height<=1080]",
        Quality::Hd720 => "bestvideo[height<=720]+bestaudio/best[height<=720]",
        Quality::Sd480 => "bestvideo[height<=480]+bestaudio/best[height<=480]",
    }
}

/// One user-requested download, as submitted to the orchestrator.
#[derive(Debug, Clone)]
pub struct Job {
    pub url: String,
    pub quality: Quality,
    /// Extract best audio to MP3 320kbps; the quality cap is ignored.
    pub audio_only: bool,
    /// Re-encode the merged video to H.264/AAC if the source codec differs.
    /// Inert while `audio_only` is set (the UI disables the toggle).
    pub premiere_compatible: bool,
    pub output_dir: PathBuf,
}

impl Job {
    /// Job with the defaults the quick-action entry point uses.
    pub fn with_defaults(url: String) -> Self {
        Self {
            url,
            quality: Quality::Best,
            audio_only: false,
            premiere_compatible: false,
            output_dir: default_output_dir(),
        }
    }
}

/// The user's downloads folder, or the current directory as a last resort.
pub fn default_output_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Lifecycle of a job as observed by the presentation shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    FetchingInfo,
    Downloading,
    Merging,
    Transcoding,
    Completed,
    Cancelled,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Failed
        )
    }

    /// A job is active from submission until it reaches a terminal state.
    pub fn is_active(&self) -> bool {
        !matches!(self, JobState::Idle) && !self.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_is_unique_per_combination() {
        let mut seen = Vec::new();
        for quality in Quality::ALL {
            let selector = format_selector(false, quality);
            assert!(!seen.contains(&selector), "duplicate selector {selector}");
            seen.push(selector);
        }
        // Audio-only collapses every quality to the same selector.
        for quality in Quality::ALL {
            assert_eq!(format_selector(true, quality), "bestaudio/best");
        }
    }

    #[test]
    fn selector_matches_quality_cap() {
        assert_eq!(format_selector(false, Quality::Best), "bestvideo+bestaudio/best");
        assert_eq!(
            format_selector(false, Quality::Fhd1080),
            "bestvideo[height<=1080]+bestaudio/best[height<=1080]"
        );
        assert_eq!(
            format_selector(false, Quality::Sd480),
            "bestvideo[height<=480]+bestaudio/best[height<=480]"
        );
    }

    #[test]
    fn state_classification() {
        assert!(JobState::Downloading.is_active());
        assert!(JobState::Transcoding.is_active());
        assert!(!JobState::Idle.is_active());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(!JobState::Merging.is_terminal());
    }
}

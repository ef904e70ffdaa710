pub mod progress;
pub mod ytdlp;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use ytdlp::YtDlpBackend;

/// Metadata resolved for a URL before any bytes are transferred.
#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub title: String,
    pub duration: String,
}

/// Audio extraction parameters passed through to the backend.
#[derive(Debug, Clone)]
pub struct AudioExtraction {
    pub codec: &'static str,
    pub quality: &'static str,
}

/// Everything a backend needs to retrieve media to disk.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub format_selector: String,
    pub output_dir: PathBuf,
    /// Container to merge separate video/audio streams into, video jobs only.
    pub merge_container: Option<&'static str>,
    pub audio: Option<AudioExtraction>,
}

/// Progress protocol shared by every transport: a subprocess scraping
/// stdout lines and an in-process stub in tests both map onto this.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    Progress { fraction: f32, status: String },
    /// Streams finished transferring, the backend is muxing them now.
    MergeStarted,
    Finished,
    Failed(String),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Failed to launch {tool}: {source}")]
    Launch {
        tool: String,
        source: std::io::Error,
    },

    #[error("{0}")]
    Metadata(String),
}

/// External media backend: resolves metadata, then retrieves bytes to
/// disk while emitting [`TransferEvent`]s. Implementations must respect
/// the [`CancelScope`] by registering any subprocess they spawn.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn fetch_info(&self, url: &str, cancel: &CancelScope) -> Result<MediaInfo, BackendError>;

    fn download(
        &self,
        request: DownloadRequest,
        cancel: CancelScope,
    ) -> BoxStream<'static, TransferEvent>;
}

/// Cooperative + forceful cancellation for one job.
///
/// The token is the cooperative path, checked at phase boundaries. Once a
/// subprocess is live its process-group id is registered here so `cancel`
/// can tear down the whole group, including any mux helper the backend
/// spawned transitively.
#[derive(Debug, Clone, Default)]
pub struct CancelScope {
    token: CancellationToken,
    group: Arc<Mutex<Option<i32>>>,
}

impl CancelScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Request cancellation and kill the active process group, if any.
    pub fn cancel(&self) {
        self.token.cancel();
        if let Ok(slot) = self.group.lock() {
            if let Some(pgid) = *slot {
                kill_process_group(pgid);
            }
        }
    }

    /// Record the group of a freshly spawned child. The child must have
    /// been placed in its own group, see [`set_process_group`].
    pub fn register_child(&self, pid: u32) {
        if let Ok(mut slot) = self.group.lock() {
            *slot = Some(pid as i32);
        }
        // Lost race: cancel() ran before the child existed.
        if self.token.is_cancelled() {
            kill_process_group(pid as i32);
        }
    }

    pub fn clear_child(&self) {
        if let Ok(mut slot) = self.group.lock() {
            *slot = None;
        }
    }
}

/// Detach the child into its own session so the whole group can be
/// signalled as a unit. No-op on non-unix targets.
pub(crate) fn set_process_group(cmd: &mut tokio::process::Command) {
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }
    #[cfg(not(unix))]
    let _ = cmd;
}

#[cfg(unix)]
fn kill_process_group(pgid: i32) {
    tracing::debug!(pgid, "killing process group");
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(pid: i32) {
    // Windows has no process groups in the POSIX sense; /T walks the tree.
    let _ = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .output();
}

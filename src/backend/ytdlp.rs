use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

use super::{
    progress::{self, LineSignal},
    set_process_group, BackendError, CancelScope, DownloadRequest, MediaBackend, MediaInfo,
};
use crate::utils::find_tool;

/// Media backend that drives the yt-dlp binary as a subprocess and
/// scrapes its stdout for progress.
#[derive(Debug, Clone)]
pub struct YtDlpBackend {
    bin: PathBuf,
    /// Directory holding ffmpeg, forwarded so yt-dlp can merge streams.
    ffmpeg_dir: Option<PathBuf>,
}

/// Subset of `yt-dlp --dump-json` output we care about.
#[derive(Debug, Deserialize)]
struct InfoJson {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration_string: Option<String>,
}

impl YtDlpBackend {
    pub fn locate() -> Self {
        let bin = find_tool("yt-dlp");
        let ffmpeg = find_tool("ffmpeg");
        // A bare command name has no parent directory worth forwarding.
        let ffmpeg_dir = ffmpeg
            .is_absolute()
            .then(|| ffmpeg.parent().map(PathBuf::from))
            .flatten();
        tracing::info!(bin = %bin.display(), ?ffmpeg_dir, "yt-dlp backend ready");
        Self { bin, ffmpeg_dir }
    }

    fn build_download_args(&self, request: &DownloadRequest) -> Vec<String> {
        let template = request.output_dir.join("%(title)s.%(ext)s");
        let mut args = vec![
            "-f".to_string(),
            request.format_selector.clone(),
            "-o".to_string(),
            template.to_string_lossy().into_owned(),
            "--newline".to_string(),
            "--no-playlist".to_string(),
        ];
        if let Some(dir) = &self.ffmpeg_dir {
            args.push("--ffmpeg-location".to_string());
            args.push(dir.to_string_lossy().into_owned());
        }
        if let Some(container) = request.merge_container {
            args.push("--merge-output-format".to_string());
            args.push(container.to_string());
        }
        if let Some(audio) = &request.audio {
            args.push("-x".to_string());
            args.push("--audio-format".to_string());
            args.push(audio.codec.to_string());
            args.push("--audio-quality".to_string());
            args.push(audio.quality.to_string());
        }
        args.push(request.url.clone());
        args
    }
}

#[async_trait]
impl MediaBackend for YtDlpBackend {
    async fn fetch_info(&self, url: &str, cancel: &CancelScope) -> Result<MediaInfo, BackendError> {
        let mut cmd = Command::new(&self.bin);
        cmd.args(["--dump-json", "--no-warnings", "--no-playlist"])
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        set_process_group(&mut cmd);

        let child = cmd.spawn().map_err(|source| BackendError::Launch {
            tool: "yt-dlp".to_string(),
            source,
        })?;
        if let Some(pid) = child.id() {
            cancel.register_child(pid);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| BackendError::Launch {
                tool: "yt-dlp".to_string(),
                source,
            })?;
        cancel.clear_child();

        if !output.status.success() {
            return Err(BackendError::Metadata(stderr_tail(&output.stderr)));
        }

        let info: InfoJson = serde_json::from_slice(&output.stdout)
            .map_err(|e| BackendError::Metadata(format!("Unreadable video info: {e}")))?;
        Ok(MediaInfo {
            title: info.title.unwrap_or_else(|| "Unknown".to_string()),
            duration: info.duration_string.unwrap_or_else(|| "?".to_string()),
        })
    }

    fn download(
        &self,
        request: DownloadRequest,
        cancel: CancelScope,
    ) -> BoxStream<'static, super::TransferEvent> {
        let args = self.build_download_args(&request);
        let bin = self.bin.clone();

        futures::stream::unfold(
            TransferState::Start { bin, args, cancel },
            |state| async move {
                match state {
                    TransferState::Start { bin, args, cancel } => {
                        tracing::info!(?args, "spawning yt-dlp");
                        let mut cmd = Command::new(&bin);
                        cmd.args(&args)
                            .stdin(Stdio::null())
                            .stdout(Stdio::piped())
                            .stderr(Stdio::piped())
                            .kill_on_drop(true);
                        set_process_group(&mut cmd);

                        let mut child = match cmd.spawn() {
                            Ok(child) => child,
                            Err(e) => {
                                return Some((
                                    super::TransferEvent::Failed(format!(
                                        "Failed to launch yt-dlp: {e}"
                                    )),
                                    TransferState::Done,
                                ));
                            }
                        };
                        if let Some(pid) = child.id() {
                            cancel.register_child(pid);
                        }

                        let stdout = child.stdout.take()?;
                        let lines = BufReader::new(stdout).lines();

                        // Drain stderr in the background so the child never
                        // blocks on a full pipe; keep a tail for error text.
                        let errors = Arc::new(Mutex::new(Vec::new()));
                        if let Some(stderr) = child.stderr.take() {
                            let errors = Arc::clone(&errors);
                            tokio::spawn(async move {
                                let mut lines = BufReader::new(stderr).lines();
                                while let Ok(Some(line)) = lines.next_line().await {
                                    if let Ok(mut buf) = errors.lock() {
                                        if buf.len() >= 8 {
                                            buf.remove(0);
                                        }
                                        buf.push(line);
                                    }
                                }
                            });
                        }

                        pump(ReadCtx {
                            child,
                            lines,
                            errors,
                            cancel,
                        })
                        .await
                    }
                    TransferState::Read(ctx) => pump(ctx).await,
                    TransferState::Done => None,
                }
            },
        )
        .boxed()
    }
}

enum TransferState {
    Start {
        bin: PathBuf,
        args: Vec<String>,
        cancel: CancelScope,
    },
    Read(ReadCtx),
    Done,
}

struct ReadCtx {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    errors: Arc<Mutex<Vec<String>>>,
    cancel: CancelScope,
}

/// Read stdout until the next interesting line, then translate it into a
/// transfer event. On EOF, reap the child and emit the terminal event.
async fn pump(mut ctx: ReadCtx) -> Option<(super::TransferEvent, TransferState)> {
    loop {
        match ctx.lines.next_line().await {
            Ok(Some(line)) => match progress::classify_line(&line) {
                Some(LineSignal::Merge) => {
                    return Some((super::TransferEvent::MergeStarted, TransferState::Read(ctx)));
                }
                Some(LineSignal::Progress { fraction, status }) => {
                    return Some((
                        super::TransferEvent::Progress { fraction, status },
                        TransferState::Read(ctx),
                    ));
                }
                None => {
                    tracing::trace!(%line, "yt-dlp");
                }
            },
            Ok(None) | Err(_) => break,
        }
    }

    let status = ctx.child.wait().await;
    ctx.cancel.clear_child();

    let event = match status {
        Ok(status) if status.success() => super::TransferEvent::Finished,
        Ok(status) => {
            let tail = ctx
                .errors
                .lock()
                .ok()
                .and_then(|buf| buf.iter().rev().find(|l| !l.trim().is_empty()).cloned());
            super::TransferEvent::Failed(
                tail.unwrap_or_else(|| format!("yt-dlp exited with {status}")),
            )
        }
        Err(e) => super::TransferEvent::Failed(format!("Failed to wait for yt-dlp: {e}")),
    };
    Some((event, TransferState::Done))
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.trim().to_string())
        .unwrap_or_else(|| "yt-dlp failed without output".to_string())
}

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;

use crate::backend::{
    AudioExtraction, CancelScope, DownloadRequest, MediaBackend, TransferEvent,
};
use crate::domain::{format_selector, Job, SubmitError};
use crate::transcode::{Transcoder, TARGET_VIDEO_CODEC};
use crate::utils::{sanitize_title, truncate_chars};

/// Merge duration is not observable from the backend, so the merging
/// phase reports a fixed placeholder instead of false precision.
pub const MERGE_PROGRESS: f32 = 0.95;
/// Same placeholder rationale for the re-encode phase.
pub const TRANSCODE_PROGRESS: f32 = 0.5;

/// Longest error text surfaced to the presentation shell.
const ERROR_DISPLAY_LIMIT: usize = 200;

/// Progress protocol between the orchestrator and the presentation
/// shell. Events for one job are causally ordered: `InfoFetched` comes
/// before any `Progress`, `Merging` after the last transfer progress,
/// and `Transcoding` only after the transfer finished. Exactly one of
/// `Completed`, `Cancelled` or `Failed` ends the stream.
#[derive(Debug, Clone)]
pub enum JobEvent {
    InfoFetched {
        title: String,
        duration: String,
    },
    Progress {
        fraction: f32,
        status: String,
    },
    Merging,
    Transcoding {
        from_codec: String,
    },
    Completed {
        output_dir: PathBuf,
        /// A requested re-encode did not happen (probe or encode failed);
        /// the job still succeeded with the original file.
        reencode_skipped: bool,
    },
    Cancelled,
    Failed(String),
}

/// Handle for cancelling a submitted job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    scope: CancelScope,
}

impl JobHandle {
    /// Best-effort cancellation: kills the active process group if a
    /// subprocess is live, otherwise the flag is honored at the next
    /// phase boundary.
    pub fn cancel(&self) {
        self.scope.cancel();
    }
}

/// Owns the download-and-postprocess pipeline for a single job at a
/// time. `submit` hands back an event stream; polling the stream drives
/// the work, so it must be consumed off the UI thread (the iced runtime
/// does this for `Task::stream`).
#[derive(Clone)]
pub struct Orchestrator {
    backend: Arc<dyn MediaBackend>,
    transcoder: Arc<dyn Transcoder>,
    active: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn MediaBackend>, transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            backend,
            transcoder,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Accepts a job unless one is already active or the URL is blank.
    /// Returns immediately; no work happens until the stream is polled.
    pub fn submit(
        &self,
        job: Job,
    ) -> Result<(JobHandle, BoxStream<'static, JobEvent>), SubmitError> {
        if job.url.trim().is_empty() {
            return Err(SubmitError::EmptyUrl);
        }
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SubmitError::Busy);
        }

        let scope = CancelScope::new();
        let handle = JobHandle {
            scope: scope.clone(),
        };
        let ctx = Box::new(RunCtx {
            backend: Arc::clone(&self.backend),
            transcoder: Arc::clone(&self.transcoder),
            job,
            scope,
            title: String::new(),
            last_fraction: 0.0,
            _guard: ActiveGuard(Arc::clone(&self.active)),
        });

        Ok((
            handle,
            futures::stream::unfold(RunState::FetchInfo(ctx), run_step).boxed(),
        ))
    }
}

/// Releases the single-active-job slot on every exit path, including
/// the consumer dropping the stream mid-job.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct RunCtx {
    backend: Arc<dyn MediaBackend>,
    transcoder: Arc<dyn Transcoder>,
    job: Job,
    scope: CancelScope,
    title: String,
    last_fraction: f32,
    _guard: ActiveGuard,
}

enum RunState {
    FetchInfo(Box<RunCtx>),
    StartTransfer(Box<RunCtx>),
    Transfer(Box<RunCtx>, BoxStream<'static, TransferEvent>),
    Reencode(Box<RunCtx>, PathBuf),
    Done,
}

async fn run_step(state: RunState) -> Option<(JobEvent, RunState)> {
    match state {
        RunState::FetchInfo(mut ctx) => {
            if ctx.scope.is_cancelled() {
                return Some((JobEvent::Cancelled, RunState::Done));
            }
            tracing::info!(url = %ctx.job.url, "fetching media info");
            match ctx.backend.fetch_info(&ctx.job.url, &ctx.scope).await {
                Ok(info) => {
                    ctx.title = info.title.clone();
                    Some((
                        JobEvent::InfoFetched {
                            title: info.title,
                            duration: info.duration,
                        },
                        RunState::StartTransfer(ctx),
                    ))
                }
                Err(e) => {
                    if ctx.scope.is_cancelled() {
                        return Some((JobEvent::Cancelled, RunState::Done));
                    }
                    tracing::warn!(error = %e, "metadata fetch failed");
                    Some((
                        JobEvent::Failed(truncate_chars(&e.to_string(), ERROR_DISPLAY_LIMIT)),
                        RunState::Done,
                    ))
                }
            }
        }
        RunState::StartTransfer(ctx) => {
            if ctx.scope.is_cancelled() {
                return Some((JobEvent::Cancelled, RunState::Done));
            }
            let request = DownloadRequest {
                url: ctx.job.url.clone(),
                format_selector: format_selector(ctx.job.audio_only, ctx.job.quality).to_string(),
                output_dir: ctx.job.output_dir.clone(),
                merge_container: (!ctx.job.audio_only).then_some("mp4"),
                audio: ctx.job.audio_only.then_some(AudioExtraction {
                    codec: "mp3",
                    quality: "320K",
                }),
            };
            let transfer = ctx.backend.download(request, ctx.scope.clone());
            Some((
                JobEvent::Progress {
                    fraction: 0.0,
                    status: "Downloading...".to_string(),
                },
                RunState::Transfer(ctx, transfer),
            ))
        }
        RunState::Transfer(mut ctx, mut transfer) => {
            // Once cancelled, deliver no further progress for this job.
            if ctx.scope.is_cancelled() {
                return Some((JobEvent::Cancelled, RunState::Done));
            }
            match transfer.next().await {
                Some(TransferEvent::Progress { fraction, status }) => {
                    // Progress never regresses within a job.
                    let fraction = fraction.clamp(0.0, 1.0).max(ctx.last_fraction);
                    ctx.last_fraction = fraction;
                    Some((
                        JobEvent::Progress { fraction, status },
                        RunState::Transfer(ctx, transfer),
                    ))
                }
                Some(TransferEvent::MergeStarted) => {
                    ctx.last_fraction = ctx.last_fraction.max(MERGE_PROGRESS);
                    Some((JobEvent::Merging, RunState::Transfer(ctx, transfer)))
                }
                Some(TransferEvent::Failed(message)) => {
                    if ctx.scope.is_cancelled() {
                        return Some((JobEvent::Cancelled, RunState::Done));
                    }
                    tracing::warn!(%message, "transfer failed");
                    Some((
                        JobEvent::Failed(truncate_chars(&message, ERROR_DISPLAY_LIMIT)),
                        RunState::Done,
                    ))
                }
                Some(TransferEvent::Finished) => finish_transfer(ctx).await,
                None => {
                    if ctx.scope.is_cancelled() {
                        Some((JobEvent::Cancelled, RunState::Done))
                    } else {
                        Some((
                            JobEvent::Failed("Download ended unexpectedly".to_string()),
                            RunState::Done,
                        ))
                    }
                }
            }
        }
        RunState::Reencode(ctx, path) => {
            if ctx.scope.is_cancelled() {
                return Some((JobEvent::Cancelled, RunState::Done));
            }
            match ctx.transcoder.reencode_to_h264(&path).await {
                Ok(()) => Some(completed(&ctx, false)),
                Err(e) => {
                    // Deliberate degrade: keep the original file and still
                    // report success, flagging that no re-encode happened.
                    tracing::warn!(error = %e, "re-encode failed, keeping original file");
                    Some(completed(&ctx, true))
                }
            }
        }
        RunState::Done => None,
    }
}

/// Transfer succeeded; decide whether a Premiere-compat re-encode is
/// needed before declaring the job complete.
async fn finish_transfer(ctx: Box<RunCtx>) -> Option<(JobEvent, RunState)> {
    if ctx.scope.is_cancelled() {
        return Some((JobEvent::Cancelled, RunState::Done));
    }
    if ctx.job.audio_only || !ctx.job.premiere_compatible {
        return Some(completed(&ctx, false));
    }

    let path = ctx
        .job
        .output_dir
        .join(format!("{}.mp4", sanitize_title(&ctx.title)));
    if !path.exists() {
        tracing::warn!(path = %path.display(), "merged file not found, skipping re-encode");
        return Some(completed(&ctx, true));
    }

    match ctx.transcoder.probe_video_codec(&path).await {
        None => {
            tracing::warn!(path = %path.display(), "codec probe failed, skipping re-encode");
            Some(completed(&ctx, true))
        }
        Some(codec) if codec == TARGET_VIDEO_CODEC => {
            tracing::info!("file already {TARGET_VIDEO_CODEC}, no re-encode needed");
            Some(completed(&ctx, false))
        }
        Some(codec) => Some((
            JobEvent::Transcoding { from_codec: codec },
            RunState::Reencode(ctx, path),
        )),
    }
}

fn completed(ctx: &RunCtx, reencode_skipped: bool) -> (JobEvent, RunState) {
    (
        JobEvent::Completed {
            output_dir: ctx.job.output_dir.clone(),
            reencode_skipped,
        },
        RunState::Done,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, MediaInfo};
    use crate::domain::Quality;
    use crate::transcode::TranscodeError;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    struct StubBackend {
        info: Result<MediaInfo, String>,
        events: Vec<TransferEvent>,
        downloads: Arc<AtomicUsize>,
    }

    impl StubBackend {
        fn succeeding(events: Vec<TransferEvent>) -> Self {
            Self {
                info: Ok(MediaInfo {
                    title: "Sample Clip".to_string(),
                    duration: "1:23".to_string(),
                }),
                events,
                downloads: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing_info(message: &str) -> Self {
            Self {
                info: Err(message.to_string()),
                events: Vec::new(),
                downloads: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl MediaBackend for StubBackend {
        async fn fetch_info(
            &self,
            _url: &str,
            _cancel: &CancelScope,
        ) -> Result<MediaInfo, BackendError> {
            self.info.clone().map_err(BackendError::Metadata)
        }

        fn download(
            &self,
            _request: DownloadRequest,
            _cancel: CancelScope,
        ) -> BoxStream<'static, TransferEvent> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            futures::stream::iter(self.events.clone()).boxed()
        }
    }

    struct StubTranscoder {
        codec: Option<String>,
        fail_reencode: bool,
        reencoded: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl StubTranscoder {
        fn with_codec(codec: &str) -> Self {
            Self {
                codec: Some(codec.to_string()),
                fail_reencode: false,
                reencoded: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl Transcoder for StubTranscoder {
        async fn probe_video_codec(&self, _file: &Path) -> Option<String> {
            self.codec.clone()
        }

        async fn reencode_to_h264(&self, file: &Path) -> Result<(), TranscodeError> {
            self.reencoded.lock().unwrap().push(file.to_path_buf());
            if self.fail_reencode {
                Err(TranscodeError::Encode("stub encode failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn orchestrator(backend: StubBackend, transcoder: StubTranscoder) -> Orchestrator {
        Orchestrator::new(Arc::new(backend), Arc::new(transcoder))
    }

    fn job(output_dir: &Path) -> Job {
        Job {
            url: "https://example.test/v1".to_string(),
            quality: Quality::Fhd1080,
            audio_only: false,
            premiere_compatible: false,
            output_dir: output_dir.to_path_buf(),
        }
    }

    fn transfer_ok() -> Vec<TransferEvent> {
        vec![
            TransferEvent::Progress {
                fraction: 0.1,
                status: "[download]  10.0% ETA 00:30".to_string(),
            },
            TransferEvent::Progress {
                fraction: 0.55,
                status: "[download]  55.0% ETA 00:10".to_string(),
            },
            TransferEvent::MergeStarted,
            TransferEvent::Finished,
        ]
    }

    #[tokio::test]
    async fn happy_path_event_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            StubBackend::succeeding(transfer_ok()),
            StubTranscoder::with_codec("h264"),
        );

        let (_handle, stream) = orch.submit(job(dir.path())).unwrap();
        let events: Vec<JobEvent> = stream.collect().await;

        assert_eq!(events.len(), 6);
        assert!(matches!(
            &events[0],
            JobEvent::InfoFetched { title, duration }
                if title == "Sample Clip" && duration == "1:23"
        ));
        assert!(matches!(&events[1], JobEvent::Progress { fraction, .. } if *fraction == 0.0));
        assert!(matches!(&events[2], JobEvent::Progress { fraction, .. } if *fraction < 1.0));
        assert!(matches!(&events[3], JobEvent::Progress { fraction, .. } if *fraction < 1.0));
        assert!(matches!(&events[4], JobEvent::Merging));
        assert!(matches!(
            &events[5],
            JobEvent::Completed { output_dir, reencode_skipped: false }
                if output_dir == dir.path()
        ));
    }

    #[tokio::test]
    async fn premiere_reencode_invoked_once_with_merged_path() {
        let dir = tempfile::tempdir().unwrap();
        let merged = dir.path().join("Sample Clip.mp4");
        std::fs::write(&merged, b"hevc bytes").unwrap();

        let transcoder = StubTranscoder::with_codec("hevc");
        let reencoded = Arc::clone(&transcoder.reencoded);
        let orch = orchestrator(StubBackend::succeeding(transfer_ok()), transcoder);

        let mut submitted = job(dir.path());
        submitted.premiere_compatible = true;
        let (_handle, stream) = orch.submit(submitted).unwrap();
        let events: Vec<JobEvent> = stream.collect().await;

        let transcoding = events
            .iter()
            .position(|e| matches!(e, JobEvent::Transcoding { from_codec } if from_codec == "hevc"));
        assert!(transcoding.is_some(), "missing Transcoding event: {events:?}");
        assert!(matches!(
            events.last(),
            Some(JobEvent::Completed { reencode_skipped: false, .. })
        ));
        assert_eq!(*reencoded.lock().unwrap(), vec![merged]);
    }

    #[tokio::test]
    async fn reencode_failure_degrades_to_completed() {
        let dir = tempfile::tempdir().unwrap();
        let merged = dir.path().join("Sample Clip.mp4");
        std::fs::write(&merged, b"hevc bytes").unwrap();

        let mut transcoder = StubTranscoder::with_codec("hevc");
        transcoder.fail_reencode = true;
        let orch = orchestrator(StubBackend::succeeding(transfer_ok()), transcoder);

        let mut submitted = job(dir.path());
        submitted.premiere_compatible = true;
        let (_handle, stream) = orch.submit(submitted).unwrap();
        let events: Vec<JobEvent> = stream.collect().await;

        assert!(matches!(
            events.last(),
            Some(JobEvent::Completed { reencode_skipped: true, .. })
        ));
        assert!(!events.iter().any(|e| matches!(e, JobEvent::Failed(_))));
        assert_eq!(std::fs::read(&merged).unwrap(), b"hevc bytes");
    }

    #[tokio::test]
    async fn probe_at_target_codec_never_reencodes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Sample Clip.mp4"), b"h264 bytes").unwrap();

        let transcoder = StubTranscoder::with_codec("h264");
        let reencoded = Arc::clone(&transcoder.reencoded);
        let orch = orchestrator(StubBackend::succeeding(transfer_ok()), transcoder);

        let mut submitted = job(dir.path());
        submitted.premiere_compatible = true;
        let (_handle, stream) = orch.submit(submitted).unwrap();
        let events: Vec<JobEvent> = stream.collect().await;

        assert!(!events.iter().any(|e| matches!(e, JobEvent::Transcoding { .. })));
        assert!(matches!(
            events.last(),
            Some(JobEvent::Completed { reencode_skipped: false, .. })
        ));
        assert!(reencoded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn info_failure_skips_download_entirely() {
        let dir = tempfile::tempdir().unwrap();
        let long_error = "ERROR: Video unavailable ".repeat(20);
        let backend = StubBackend::failing_info(&long_error);
        let downloads = Arc::clone(&backend.downloads);
        let orch = orchestrator(backend, StubTranscoder::with_codec("h264"));

        let (_handle, stream) = orch.submit(job(dir.path())).unwrap();
        let events: Vec<JobEvent> = stream.collect().await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            JobEvent::Failed(message) => {
                assert!(!message.is_empty());
                assert!(message.chars().count() <= 200);
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn submit_rejected_while_active_and_accepted_after() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            StubBackend::succeeding(transfer_ok()),
            StubTranscoder::with_codec("h264"),
        );

        let (_handle, stream) = orch.submit(job(dir.path())).unwrap();
        assert_eq!(orch.submit(job(dir.path())).err(), Some(SubmitError::Busy));

        let _events: Vec<JobEvent> = stream.collect().await;
        assert!(orch.submit(job(dir.path())).is_ok());
    }

    #[tokio::test]
    async fn dropping_the_stream_releases_the_active_slot() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            StubBackend::succeeding(transfer_ok()),
            StubTranscoder::with_codec("h264"),
        );

        let (_handle, stream) = orch.submit(job(dir.path())).unwrap();
        drop(stream);
        assert!(orch.submit(job(dir.path())).is_ok());
    }

    #[tokio::test]
    async fn blank_url_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            StubBackend::succeeding(Vec::new()),
            StubTranscoder::with_codec("h264"),
        );
        let mut submitted = job(dir.path());
        submitted.url = "   ".to_string();
        assert_eq!(orch.submit(submitted).err(), Some(SubmitError::EmptyUrl));
    }

    #[tokio::test]
    async fn cancel_before_start_transfers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StubBackend::succeeding(transfer_ok());
        let downloads = Arc::clone(&backend.downloads);
        let orch = orchestrator(backend, StubTranscoder::with_codec("h264"));

        let (handle, stream) = orch.submit(job(dir.path())).unwrap();
        handle.cancel();
        let events: Vec<JobEvent> = stream.collect().await;

        assert!(matches!(events.as_slice(), [JobEvent::Cancelled]));
        assert_eq!(downloads.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn cancel_mid_transfer_ends_cancelled_not_failed() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            StubBackend::succeeding(transfer_ok()),
            StubTranscoder::with_codec("h264"),
        );

        let (handle, mut stream) = orch.submit(job(dir.path())).unwrap();
        assert!(matches!(
            stream.next().await,
            Some(JobEvent::InfoFetched { .. })
        ));
        assert!(matches!(stream.next().await, Some(JobEvent::Progress { .. })));

        handle.cancel();
        assert!(matches!(stream.next().await, Some(JobEvent::Cancelled)));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn progress_never_regresses() {
        let dir = tempfile::tempdir().unwrap();
        let events = vec![
            TransferEvent::Progress {
                fraction: 0.5,
                status: "50%".to_string(),
            },
            // A lower raw value must be clamped up, not reported.
            TransferEvent::Progress {
                fraction: 0.3,
                status: "30%".to_string(),
            },
            TransferEvent::Progress {
                fraction: 0.7,
                status: "70%".to_string(),
            },
            TransferEvent::Finished,
        ];
        let orch = orchestrator(
            StubBackend::succeeding(events),
            StubTranscoder::with_codec("h264"),
        );

        let (_handle, stream) = orch.submit(job(dir.path())).unwrap();
        let observed: Vec<f32> = stream
            .collect::<Vec<_>>()
            .await
            .iter()
            .filter_map(|e| match e {
                JobEvent::Progress { fraction, .. } => Some(*fraction),
                _ => None,
            })
            .collect();

        assert_eq!(observed, vec![0.0, 0.5, 0.5, 0.7]);
    }
}

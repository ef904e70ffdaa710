use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use iced::Task;

use crate::application::{JobEvent, JobHandle, Orchestrator, MERGE_PROGRESS, TRANSCODE_PROGRESS};
use crate::backend::YtDlpBackend;
use crate::domain::{Job, JobState};
use crate::transcode::FfmpegTranscoder;
use crate::ui::{DownloadMessage, DownloadView};

pub struct DownloaderApp {
    view: DownloadView,
    orchestrator: Orchestrator,
    handle: Option<JobHandle>,
}

impl Default for DownloaderApp {
    fn default() -> Self {
        Self::new(Orchestrator::new(
            Arc::new(YtDlpBackend::locate()),
            Arc::new(FfmpegTranscoder::locate()),
        ))
    }
}

impl DownloaderApp {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            view: DownloadView::default(),
            orchestrator,
            handle: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    Ui(DownloadMessage),
    /// Progress/state event from the active job.
    Job(JobEvent),
    FolderPicked(Option<PathBuf>),
}

pub fn update(app: &mut DownloaderApp, message: Message) -> Task<Message> {
    match message {
        Message::Ui(ui_message) => {
            app.view.update(ui_message.clone());

            match ui_message {
                DownloadMessage::DownloadPressed => return start_download(app),
                DownloadMessage::CancelPressed => {
                    if let Some(handle) = &app.handle {
                        handle.cancel();
                    }
                }
                DownloadMessage::NewPressed => app.view.reset(),
                DownloadMessage::BrowsePressed => {
                    let current = app.view.output_dir.clone();
                    return Task::perform(
                        async move {
                            rfd::AsyncFileDialog::new()
                                .set_directory(&current)
                                .pick_folder()
                                .await
                                .map(|handle| handle.path().to_path_buf())
                        },
                        Message::FolderPicked,
                    );
                }
                _ => {}
            }
        }
        Message::FolderPicked(Some(path)) => {
            app.view.output_dir = path.display().to_string();
        }
        Message::FolderPicked(None) => {}
        Message::Job(event) => apply_job_event(app, event),
    }
    Task::none()
}

fn start_download(app: &mut DownloaderApp) -> Task<Message> {
    let job = Job {
        url: app.view.url.trim().to_string(),
        quality: app.view.quality,
        audio_only: app.view.audio_only,
        // Premiere re-encode only applies to video outputs.
        premiere_compatible: app.view.premiere_compatible && !app.view.audio_only,
        output_dir: PathBuf::from(&app.view.output_dir),
    };

    match app.orchestrator.submit(job) {
        Ok((handle, events)) => {
            app.handle = Some(handle);
            app.view.begin_job();
            Task::stream(events.map(Message::Job))
        }
        Err(e) => {
            app.view.status = e.to_string();
            Task::none()
        }
    }
}

fn apply_job_event(app: &mut DownloaderApp, event: JobEvent) {
    match event {
        JobEvent::InfoFetched { title, duration } => {
            app.view.title_line = format!("{title}  ({duration})");
        }
        JobEvent::Progress { fraction, status } => {
            app.view.state = JobState::Downloading;
            app.view.progress = fraction;
            app.view.status = status;
        }
        JobEvent::Merging => {
            app.view.state = JobState::Merging;
            app.view.progress = MERGE_PROGRESS;
            app.view.status = "Merging streams...".to_string();
        }
        JobEvent::Transcoding { from_codec } => {
            app.view.state = JobState::Transcoding;
            app.view.progress = TRANSCODE_PROGRESS;
            app.view.status = format!("Re-encoding to H.264 (was {from_codec})...");
        }
        JobEvent::Completed {
            output_dir,
            reencode_skipped,
        } => {
            app.view.state = JobState::Completed;
            app.view.progress = 1.0;
            app.view.status = if reencode_skipped {
                format!("Done! Saved to {} (re-encode skipped)", output_dir.display())
            } else {
                format!("Done! Saved to {}", output_dir.display())
            };
            app.handle = None;
        }
        JobEvent::Cancelled => {
            app.view.state = JobState::Cancelled;
            app.view.progress = 0.0;
            app.view.status = "Cancelled.".to_string();
            app.handle = None;
        }
        JobEvent::Failed(message) => {
            app.view.state = JobState::Failed;
            app.view.progress = 0.0;
            app.view.status = format!("Error: {message}");
            app.handle = None;
        }
    }
}

pub fn view(app: &DownloaderApp) -> iced::Element<'_, Message> {
    app.view.view().map(Message::Ui)
}

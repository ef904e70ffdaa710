use iced::{
    widget::{button, checkbox, column, pick_list, progress_bar, row, text, text_input},
    Element, Length,
};

use crate::domain::{default_output_dir, JobState, Quality};

/// Main view state
pub struct DownloadView {
    pub url: String,
    pub quality: Quality,
    pub audio_only: bool,
    pub premiere_compatible: bool,
    pub output_dir: String,
    pub state: JobState,
    pub progress: f32,
    pub status: String,
    pub title_line: String,
}

impl Default for DownloadView {
    fn default() -> Self {
        Self {
            url: String::new(),
            quality: Quality::Best,
            audio_only: false,
            premiere_compatible: false,
            output_dir: default_output_dir().display().to_string(),
            state: JobState::Idle,
            progress: 0.0,
            status: "Ready".to_string(),
            title_line: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum DownloadMessage {
    UrlChanged(String),
    QualityPicked(Quality),
    AudioOnlyToggled(bool),
    PremiereToggled(bool),
    OutputDirChanged(String),
    BrowsePressed,
    DownloadPressed,
    CancelPressed,
    NewPressed,
}

impl DownloadView {
    pub fn update(&mut self, message: DownloadMessage) {
        match message {
            DownloadMessage::UrlChanged(url) => {
                self.url = url;
            }
            DownloadMessage::QualityPicked(quality) => {
                // Quality is meaningless for audio-only extraction.
                if !self.audio_only {
                    self.quality = quality;
                }
            }
            DownloadMessage::AudioOnlyToggled(enabled) => {
                self.audio_only = enabled;
            }
            DownloadMessage::PremiereToggled(enabled) => {
                if !self.audio_only {
                    self.premiere_compatible = enabled;
                }
            }
            DownloadMessage::OutputDirChanged(dir) => {
                self.output_dir = dir;
            }
            // Browse/Download/Cancel/New are handled by the app.
            _ => {}
        }
    }

    /// Put the view into its job-started shape.
    pub fn begin_job(&mut self) {
        self.state = JobState::FetchingInfo;
        self.progress = 0.0;
        self.status = "Fetching video info...".to_string();
        self.title_line.clear();
    }

    /// Clear inputs for the next download. Rejected while a job runs.
    pub fn reset(&mut self) {
        if self.state.is_active() {
            return;
        }
        self.url.clear();
        self.state = JobState::Idle;
        self.progress = 0.0;
        self.status = "Ready".to_string();
        self.title_line.clear();
    }

    pub fn view(&self) -> Element<'_, DownloadMessage> {
        let active = self.state.is_active();

        let mut url_input =
            text_input("https://www.youtube.com/watch?v=...", &self.url).padding(10);
        if !active {
            url_input = url_input.on_input(DownloadMessage::UrlChanged);
        }

        let mut premiere_box = checkbox(self.premiere_compatible).label("Premiere Pro compatible");
        if !active && !self.audio_only {
            premiere_box = premiere_box.on_toggle(DownloadMessage::PremiereToggled);
        }
        let mut audio_box = checkbox(self.audio_only).label("Audio only (MP3 320kbps)");
        if !active {
            audio_box = audio_box.on_toggle(DownloadMessage::AudioOnlyToggled);
        }

        let mut folder_input = text_input("Output folder", &self.output_dir).padding(10);
        if !active {
            folder_input = folder_input.on_input(DownloadMessage::OutputDirChanged);
        }

        column![
            text("Video URL").size(16),
            url_input,
            text("Quality").size(16),
            pick_list(
                &Quality::ALL[..],
                Some(self.quality),
                DownloadMessage::QualityPicked
            ),
            row![premiere_box, audio_box].spacing(30),
            text("Output Folder").size(16),
            row![
                folder_input,
                button("Browse").on_press_maybe((!active).then_some(DownloadMessage::BrowsePressed)),
            ]
            .spacing(8),
            row![
                button(text(if active { "Downloading..." } else { "Download" }).size(15))
                    .width(Length::Fill)
                    .on_press_maybe((!active).then_some(DownloadMessage::DownloadPressed)),
                button(text("Cancel").size(15))
                    .on_press_maybe(active.then_some(DownloadMessage::CancelPressed)),
                button(text("New").size(15))
                    .on_press_maybe((!active).then_some(DownloadMessage::NewPressed)),
            ]
            .spacing(5),
            progress_bar(0.0..=1.0, self.progress),
            text(&self.status).size(12),
            text(&self.title_line).size(12),
        ]
        .padding(20)
        .spacing(10)
        .into()
    }
}

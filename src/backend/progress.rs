use std::sync::OnceLock;

use regex::Regex;

use crate::utils::truncate_chars;

/// Longest status line forwarded to the presentation shell.
const STATUS_LINE_LIMIT: usize = 80;

/// Signal scraped from one line of backend output.
#[derive(Debug, Clone, PartialEq)]
pub enum LineSignal {
    /// A transfer progress line; `fraction` is in [0, 1].
    Progress { fraction: f32, status: String },
    /// The backend started merging the downloaded streams.
    Merge,
}

fn percent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+\.?\d*)%").expect("valid percent regex"))
}

/// Classify one stdout line from the download subprocess. Lines that
/// carry neither a percentage nor a merge marker are noise and yield
/// `None`.
pub fn classify_line(line: &str) -> Option<LineSignal> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let lower = line.to_lowercase();
    if lower.contains("merging") || lower.contains("merger") {
        return Some(LineSignal::Merge);
    }

    if let Some(caps) = percent_re().captures(line) {
        if let Ok(pct) = caps[1].parse::<f32>() {
            return Some(LineSignal::Progress {
                fraction: (pct / 100.0).clamp(0.0, 1.0),
                status: truncate_chars(line, STATUS_LINE_LIMIT),
            });
        }
    }

    None
}

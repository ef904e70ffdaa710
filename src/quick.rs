//! Quick-action entry point: submit a URL with default options and
//! report through system notifications instead of live progress. Shares
//! the orchestrator with the GUI shell, so it cannot run concurrently
//! with a shell-submitted job.

use futures::StreamExt;

use crate::application::{JobEvent, Orchestrator};
use crate::domain::Job;
use crate::utils::truncate_chars;

const NOTIFICATION_BODY_LIMIT: usize = 80;

pub async fn run(orchestrator: &Orchestrator, url: &str) {
    notify("TubeDrop", "Starting download...");

    let job = Job::with_defaults(url.trim().to_string());
    let (handle, mut events) = match orchestrator.submit(job) {
        Ok(pair) => pair,
        Err(e) => {
            notify("Download failed", &e.to_string());
            return;
        }
    };
    let _handle = handle;

    let mut title = "Video".to_string();
    while let Some(event) = events.next().await {
        match event {
            JobEvent::InfoFetched { title: t, .. } => title = t,
            JobEvent::Completed { .. } => notify("Download complete!", &title),
            JobEvent::Failed(message) => notify("Download failed", &message),
            JobEvent::Cancelled => notify("Download cancelled", &title),
            _ => {}
        }
    }
}

/// Notification bodies are embedded in a shell-quoted script, so strip
/// quote characters and cap the length.
fn sanitize_body(body: &str) -> String {
    truncate_chars(&body.replace(['\'', '"'], ""), NOTIFICATION_BODY_LIMIT)
}

fn notify(title: &str, body: &str) {
    let body = sanitize_body(body);
    tracing::info!(title, %body, "notification");

    #[cfg(target_os = "macos")]
    {
        let script = format!("display notification \"{body}\" with title \"{title}\"");
        let _ = std::process::Command::new("osascript")
            .arg("-e")
            .arg(script)
            .spawn();
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        let _ = std::process::Command::new("notify-send")
            .arg(title)
            .arg(body)
            .spawn();
    }
}

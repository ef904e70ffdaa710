mod app;
mod application;
mod backend;
mod domain;
mod quick;
mod transcode;
mod ui;
mod utils;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // The status-bar collaborator invokes the binary with `--quick <url>`
    // for one-shot downloads without the full window.
    let mut args = std::env::args().skip(1);
    if args.next().as_deref() == Some("--quick") {
        match args.next() {
            Some(url) => run_quick(&url),
            None => eprintln!("usage: tubedrop [--quick <url>]"),
        }
        return Ok(());
    }

    iced::application(app::DownloaderApp::default, app::update, app::view)
        .title("TubeDrop")
        .run()
}

fn run_quick(url: &str) {
    let orchestrator = application::Orchestrator::new(
        Arc::new(backend::YtDlpBackend::locate()),
        Arc::new(transcode::FfmpegTranscoder::locate()),
    );
    match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime.block_on(quick::run(&orchestrator, url)),
        Err(e) => tracing::error!(error = %e, "failed to start async runtime"),
    }
}

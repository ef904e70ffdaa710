use thiserror::Error;

/// Synchronous rejection returned by `Orchestrator::submit`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("A download is already in progress")]
    Busy,

    #[error("Please enter a video URL")]
    EmptyUrl,
}

pub mod orchestrator;

pub use orchestrator::{JobEvent, JobHandle, Orchestrator, MERGE_PROGRESS, TRANSCODE_PROGRESS};

pub mod error;
pub mod model;

pub use error::SubmitError;
pub use model::{default_output_dir, format_selector, Job, JobState, Quality};

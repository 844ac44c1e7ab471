//! Job records and their persistence.

mod error;
mod store;
mod types;

pub use error::JobError;
pub use store::{FileJobStore, JobStore};
pub use types::{
    Job, JobConfig, JobFile, JobOutputs, JobProgress, JobStatus, LogEntry, LogLevel, Mode,
    generate_job_id,
};

use super::types::JobStatus;

/// Rejections at the job-management boundary. These never reach the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job '{0}' not found")]
    NotFound(String),

    #[error("job '{id}' cannot be started: status is {status}")]
    AlreadyStarted { id: String, status: JobStatus },

    #[error("job '{id}' has no outputs yet: status is {status}")]
    NotCompleted { id: String, status: JobStatus },

    #[error("job '{id}' can only be reset after failing: status is {status}")]
    NotFailed { id: String, status: JobStatus },

    #[error("unsupported {kind} file '{file}' (expected {expected})")]
    UnsupportedUpload {
        kind: &'static str,
        file: String,
        expected: String,
    },
}

use crate::model::JobStatus;

/// Errors from the external AI service clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{service} API error ({status}): {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} returned an unusable response: {reason}")]
    Malformed {
        service: &'static str,
        reason: String,
    },
}

/// Errors from the movie record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("store rejected update ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Unavailable(String),
}

/// Errors the video compositor may report.
#[derive(Debug, thiserror::Error)]
#[error("video composition failed: {0}")]
pub struct ComposeError(pub String);

/// Terminal failures of a job. Anything that reaches the orchestrator's
/// single catch boundary is one of these.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error("video composition timed out after {0}s")]
    ComposeTimeout(u64),

    #[error("invalid status transition {} -> {}", from.as_str(), to.as_str())]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

/// Reasons a submission is refused before any work starts.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("{0}")]
    Validation(String),

    #[error("movie {0} is already being generated")]
    Duplicate(String),
}

use std::time::Duration;

use thiserror::Error;

use crate::error::AppError;
use crate::jobs::types::JobState;

/// Errors raised by the job engine.
///
/// Registration errors are returned synchronously. Dispatch and execution
/// errors are folded into the job record's `error` column and never reach a
/// caller.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("worker \"{0}\" already registered")]
    AlreadyRegistered(String),

    #[error("job name must not be empty")]
    EmptyName,

    #[error("worker \"{0}\" not registered")]
    NotRegistered(String),

    #[error("failed to deserialize job args: {0}")]
    ArgsDeserialization(#[source] serde_json::Error),

    #[error("failed to serialize job args: {0}")]
    ArgsSerialization(#[source] serde_json::Error),

    #[error("invalid job args: {0}")]
    InvalidArgs(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("provider responded {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("polling deadline of {deadline:?} exceeded; last poll error: {last_error}")]
    DeadlineExceeded {
        deadline: Duration,
        last_error: String,
    },

    #[error("job execution failed: {0}")]
    Execution(String),

    #[error("job store error: {0}")]
    Store(#[from] AppError),
}

pub type JobResult<T> = Result<T, JobError>;

impl From<JobError> for AppError {
    fn from(error: JobError) -> Self {
        match error {
            JobError::Store(inner) => inner,
            JobError::EmptyName | JobError::InvalidArgs(_) => AppError::Validation {
                field: "job".to_string(),
                reason: error.to_string(),
            },
            other => AppError::Internal {
                source: anyhow::Error::from(other),
            },
        }
    }
}

use std::str::FromStr;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::jobs::error::{JobError, JobResult};
use crate::jobs::types::JobArgs;

/// Context handed to every task run.
///
/// The cancellation token is never cancelled by the dispatcher; tasks that need
/// a bound enforce their own.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub job_id: i64,
    pub job_name: String,
    pub run_id: Uuid,
    pub cancellation_token: CancellationToken,
}

impl TaskContext {
    pub fn new(job_id: i64, job_name: impl Into<String>) -> Self {
        Self {
            job_id,
            job_name: job_name.into(),
            run_id: Uuid::new_v4(),
            cancellation_token: CancellationToken::new(),
        }
    }
}

/// A named handler that turns raw job arguments into an executable [`Task`].
///
/// `spawn` is the only place untyped arguments become typed; reject anything
/// malformed there with [`JobError::InvalidArgs`].
pub trait Worker: Send + Sync {
    fn spawn(&self, args: JobArgs) -> JobResult<Box<dyn Task>>;
}

/// Closures work as workers, which keeps one-off registrations short.
impl<F> Worker for F
where
    F: Fn(JobArgs) -> JobResult<Box<dyn Task>> + Send + Sync,
{
    fn spawn(&self, args: JobArgs) -> JobResult<Box<dyn Task>> {
        self(args)
    }
}

/// One concrete unit of work produced by a [`Worker`] for a single job.
#[async_trait]
pub trait Task: Send + Sync + std::fmt::Debug {
    async fn run(&self, ctx: TaskContext) -> JobResult<()>;
}

/// Returns the value for `key`, or an `InvalidArgs` error naming it.
pub fn require_arg<'a>(args: &'a JobArgs, key: &str) -> JobResult<&'a str> {
    match args.get(key).map(|v| v.trim()) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(JobError::InvalidArgs(format!("missing required arg \"{}\"", key))),
    }
}

/// Parses the value for `key` into `T`.
pub fn parse_arg<T>(args: &JobArgs, key: &str) -> JobResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = require_arg(args, key)?;
    raw.parse::<T>()
        .map_err(|e| JobError::InvalidArgs(format!("arg \"{}\"={:?}: {}", key, raw, e)))
}

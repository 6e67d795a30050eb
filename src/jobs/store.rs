use async_trait::async_trait;

use crate::error::AppResult;
use crate::jobs::types::{Job, JobFilter, NewJob};

/// Durable storage for job records.
///
/// Implementations must tolerate concurrent `create`/`update` calls on
/// distinct rows; the engine does no locking of its own.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts a new scheduled job and returns it with identity and timestamps.
    async fn create(&self, job: NewJob) -> AppResult<Job>;

    /// Persists `run_at`, `state`, `error` and `tries`, bumping `version`.
    async fn update(&self, job: &Job) -> AppResult<Job>;

    /// Jobs matching `filter`, oldest `run_at` first.
    async fn query(&self, filter: &JobFilter) -> AppResult<Vec<Job>>;

    async fn get(&self, id: i64) -> AppResult<Job>;
}

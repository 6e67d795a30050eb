use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use jiff::Timestamp;

use crate::error::{AppError, AppResult};
use crate::jobs::store::JobStore;
use crate::jobs::types::{Job, JobFilter, JobState, NewJob};

/// Process-local [`JobStore`] backed by a `DashMap`.
///
/// Nothing survives a restart; meant for tests and database-less development runs.
#[derive(Debug)]
pub struct MemoryJobStore {
    jobs: DashMap<i64, Job>,
    next_id: AtomicI64,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    /// Inserts a record verbatim, bypassing `create`. Used to seed rows a
    /// regular enqueue could never produce, such as corrupt args.
    pub fn insert_raw(&self, job: Job) {
        self.next_id.fetch_max(job.id + 1, Ordering::SeqCst);
        self.jobs.insert(job.id, job);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: NewJob) -> AppResult<Job> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Timestamp::now();
        let record = Job {
            id,
            version: 1,
            created_at: now,
            updated_at: now,
            run_at: job.run_at,
            name: job.name,
            state: JobState::Scheduled,
            args: job.args,
            error: None,
            tries: 0,
        };
        self.jobs.insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, job: &Job) -> AppResult<Job> {
        let mut entry = self
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| AppError::job_not_found(job.id))?;

        entry.run_at = job.run_at;
        entry.state = job.state;
        entry.error = job.error.clone();
        entry.tries = job.tries;
        entry.version += 1;
        entry.updated_at = Timestamp::now();

        Ok(entry.clone())
    }

    async fn query(&self, filter: &JobFilter) -> AppResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by(|a, b| a.run_at.cmp(&b.run_at).then(a.id.cmp(&b.id)));
        Ok(jobs)
    }

    async fn get(&self, id: i64) -> AppResult<Job> {
        self.jobs
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::job_not_found(id))
    }
}

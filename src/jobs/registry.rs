use std::collections::HashMap;
use std::sync::Arc;

use crate::jobs::error::{JobError, JobResult};
use crate::jobs::worker::Worker;

/// Maps worker names to implementations.
///
/// Built once at startup and handed to the dispatcher, which freezes it behind
/// an `Arc`; nothing registers after the loop starts.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `worker` under `name`. An existing registration is never replaced.
    pub fn register<W>(&mut self, name: impl Into<String>, worker: W) -> JobResult<()>
    where
        W: Worker + 'static,
    {
        self.register_arc(name, Arc::new(worker))
    }

    pub fn register_arc(&mut self, name: impl Into<String>, worker: Arc<dyn Worker>) -> JobResult<()> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(JobError::EmptyName);
        }
        if self.workers.contains_key(&name) {
            return Err(JobError::AlreadyRegistered(name));
        }

        tracing::debug!(worker = %name, "Worker registered");
        self.workers.insert(name, worker);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Worker>> {
        self.workers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("workers", &self.names())
            .finish()
    }
}

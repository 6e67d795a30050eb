//! Polling dispatch loop.
//!
//! On every tick the dispatcher scans the store for scheduled records, resolves
//! each one's worker, marks it running and hands the task to a tracked tokio
//! task. Outcomes are folded back into the record as `done` or `failed`.

use std::sync::Arc;
use std::time::Duration;

use jiff::Timestamp;
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::jobs::error::{JobError, JobResult};
use crate::jobs::registry::WorkerRegistry;
use crate::jobs::store::JobStore;
use crate::jobs::types::{Job, JobArgs, JobFilter, NewJob, RunAtPolicy};
use crate::jobs::worker::{Task, TaskContext};

/// Lower bound applied to `DispatcherConfig::interval`.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub interval: Duration,
    /// Upper bound on tasks running at once. Records beyond it stay scheduled.
    pub max_concurrent_tasks: usize,
    pub run_at_policy: RunAtPolicy,
    /// How long `run` waits for in-flight tasks after shutdown is requested.
    pub shutdown_grace: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_concurrent_tasks: 32,
            run_at_policy: RunAtPolicy::Immediate,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// Counters for one scan-and-dispatch pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub fetched: usize,
    pub started: usize,
    pub failed: usize,
    pub deferred: usize,
}

enum DispatchOutcome {
    Started,
    Failed,
    Deferred,
    Aborted,
}

/// Create a scheduled record for worker `name`, due now.
///
/// The returned record is the only trace of the request; a store error means
/// nothing was enqueued.
pub async fn enqueue(store: &dyn JobStore, name: &str, args: &JobArgs) -> JobResult<Job> {
    enqueue_at(store, name, args, Timestamp::now()).await
}

/// Like [`enqueue`] with an explicit earliest dispatch time.
pub async fn enqueue_at(
    store: &dyn JobStore,
    name: &str,
    args: &JobArgs,
    run_at: Timestamp,
) -> JobResult<Job> {
    let new_job = NewJob::new(name, args, run_at)?;
    let job = store.create(new_job).await?;
    tracing::debug!(job_id = job.id, job_name = %job.name, run_at = %job.run_at, "Job enqueued");
    Ok(job)
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<WorkerRegistry>,
    store: Arc<dyn JobStore>,
    config: DispatcherConfig,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Dispatcher {
    /// The registry is frozen from here on.
    ///
    /// A zero `interval` is raised to [`MIN_INTERVAL`] and a zero task limit to one.
    pub fn new(registry: WorkerRegistry, store: Arc<dyn JobStore>, mut config: DispatcherConfig) -> Self {
        if config.interval < MIN_INTERVAL {
            tracing::warn!(interval = ?config.interval, min = ?MIN_INTERVAL, "Dispatch interval too small, clamping");
            config.interval = MIN_INTERVAL;
        }
        config.max_concurrent_tasks = config.max_concurrent_tasks.max(1);
        let permits = Arc::new(Semaphore::new(config.max_concurrent_tasks));
        Self {
            registry: Arc::new(registry),
            store,
            config,
            permits,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.store)
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub async fn enqueue(&self, name: &str, args: &JobArgs) -> JobResult<Job> {
        enqueue(self.store.as_ref(), name, args).await
    }

    pub async fn enqueue_at(&self, name: &str, args: &JobArgs, run_at: Timestamp) -> JobResult<Job> {
        enqueue_at(self.store.as_ref(), name, args, run_at).await
    }

    /// Tasks currently executing.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop the loop after its current tick. `run` then drains in-flight tasks.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run ticks on the configured interval until shutdown is requested.
    pub async fn run(&self) {
        tracing::info!(
            interval = ?self.config.interval,
            max_concurrent_tasks = self.config.max_concurrent_tasks,
            run_at_policy = %self.config.run_at_policy,
            workers = ?self.registry.names(),
            "Dispatcher started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(summary) if summary.fetched > 0 => {
                            tracing::debug!(
                                fetched = summary.fetched,
                                started = summary.started,
                                failed = summary.failed,
                                deferred = summary.deferred,
                                "Tick complete"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "Failed to query scheduled jobs"),
                    }
                }
            }
        }

        tracing::info!(in_flight = self.in_flight(), "Dispatcher stopping");
        self.drain().await;
    }

    /// Wait up to the shutdown grace period for in-flight tasks.
    ///
    /// Returns `false` if tasks were still running when the grace period ran out.
    pub async fn drain(&self) -> bool {
        self.tracker.close();
        match tokio::time::timeout(self.config.shutdown_grace, self.tracker.wait()).await {
            Ok(()) => {
                tracing::info!("All in-flight jobs finished");
                true
            }
            Err(_) => {
                tracing::warn!(
                    in_flight = self.in_flight(),
                    grace = ?self.config.shutdown_grace,
                    "Shutdown grace period elapsed with jobs still running"
                );
                false
            }
        }
    }

    /// Wait until every task started so far has recorded its outcome.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// One scan-and-dispatch pass.
    ///
    /// Only a failed query is returned as an error. Per-record problems are
    /// persisted on the record and counted in the summary.
    pub async fn tick(&self) -> JobResult<TickSummary> {
        let filter = match self.config.run_at_policy {
            RunAtPolicy::Immediate => JobFilter::scheduled(),
            RunAtPolicy::Deferred => JobFilter::scheduled().due_before(Timestamp::now()),
        };
        let jobs = self.store.query(&filter).await?;

        let mut summary = TickSummary {
            fetched: jobs.len(),
            ..TickSummary::default()
        };
        for job in jobs {
            match self.dispatch(job).await {
                DispatchOutcome::Started => summary.started += 1,
                DispatchOutcome::Failed => summary.failed += 1,
                DispatchOutcome::Deferred => summary.deferred += 1,
                DispatchOutcome::Aborted => {}
            }
        }
        Ok(summary)
    }

    async fn dispatch(&self, mut job: Job) -> DispatchOutcome {
        let Some(worker) = self.registry.get(&job.name) else {
            let err = JobError::NotRegistered(job.name.clone());
            return self.reject(job, err).await;
        };

        let args = match job.decode_args() {
            Ok(args) => args,
            Err(e) => return self.reject(job, e).await,
        };

        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            tracing::debug!(job_id = job.id, job_name = %job.name, "Concurrency limit reached, deferring");
            return DispatchOutcome::Deferred;
        };

        if let Err(e) = job.mark_running() {
            tracing::error!(job_id = job.id, error = %e, "Refusing to start job");
            return DispatchOutcome::Aborted;
        }
        let job = match self.store.update(&job).await {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(job_id = job.id, job_name = %job.name, error = %e, "Failed to mark job running");
                return DispatchOutcome::Aborted;
            }
        };

        let task = match worker.spawn(args) {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(job_id = job.id, job_name = %job.name, error = %e, "Worker rejected job");
                finish(self.store.as_ref(), job, Err(e)).await;
                return DispatchOutcome::Failed;
            }
        };

        let ctx = TaskContext::new(job.id, job.name.clone());
        let span = tracing::info_span!("job", job_id = job.id, job_name = %job.name, run_id = %ctx.run_id);
        let store = Arc::clone(&self.store);

        self.tracker.spawn(
            async move {
                let _permit = permit;
                tracing::info!("Job started");
                let outcome = run_isolated(task, ctx).await;
                finish(store.as_ref(), job, outcome).await;
            }
            .instrument(span),
        );

        DispatchOutcome::Started
    }

    /// Fail a record that never started.
    async fn reject(&self, mut job: Job, err: JobError) -> DispatchOutcome {
        tracing::warn!(job_id = job.id, job_name = %job.name, error = %err, "Job cannot be dispatched");
        if let Err(e) = job.mark_failed(err.to_string()) {
            tracing::error!(job_id = job.id, error = %e, "Refusing to fail job");
            return DispatchOutcome::Aborted;
        }
        match self.store.update(&job).await {
            Ok(_) => DispatchOutcome::Failed,
            Err(e) => {
                tracing::error!(job_id = job.id, error = %e, "Failed to persist job failure");
                DispatchOutcome::Aborted
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Runs the task on its own tokio task so a panic becomes a failed job.
async fn run_isolated(task: Box<dyn Task>, ctx: TaskContext) -> JobResult<()> {
    match tokio::spawn(async move { task.run(ctx).await }).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(JobError::Execution("task panicked".to_string())),
        Err(e) => Err(JobError::Execution(format!("task aborted: {}", e))),
    }
}

/// Record the terminal state. A persist failure leaves the row lagging reality.
async fn finish(store: &dyn JobStore, mut job: Job, outcome: JobResult<()>) {
    let transition = match &outcome {
        Ok(()) => job.mark_done(),
        Err(e) => job.mark_failed(e.to_string()),
    };
    if let Err(e) = transition {
        tracing::error!(job_id = job.id, error = %e, "Refusing to record job outcome");
        return;
    }

    match store.update(&job).await {
        Ok(stored) => match &outcome {
            Ok(()) => tracing::info!(job_id = stored.id, state = %stored.state, "Job finished"),
            Err(e) => tracing::warn!(job_id = stored.id, state = %stored.state, error = %e, "Job failed"),
        },
        Err(e) => {
            tracing::error!(job_id = job.id, state = %job.state, error = %e, "Failed to persist job outcome")
        }
    }
}

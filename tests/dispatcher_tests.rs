//! End-to-end dispatch against the in-memory store.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{RecordingTask, job_args};
use deferred_rs::error::{AppError, AppResult};
use deferred_rs::jobs::{
    Dispatcher, DispatcherConfig, Job, JobArgs, JobError, JobFilter, JobResult, JobState,
    JobStore, MemoryJobStore, NewJob, RunAtPolicy, Task, TickSummary, WorkerRegistry,
};
use jiff::{SignedDuration, Timestamp};

fn recording_worker(recorder: RecordingTask) -> impl Fn(JobArgs) -> JobResult<Box<dyn Task>> + Send + Sync {
    move |_args: JobArgs| -> JobResult<Box<dyn Task>> { Ok(Box::new(recorder.clone())) }
}

fn dispatcher_with(
    registry: WorkerRegistry,
    store: Arc<dyn JobStore>,
    config: DispatcherConfig,
) -> Dispatcher {
    Dispatcher::new(registry, store, config)
}

async fn state_of(store: &dyn JobStore, id: i64) -> Job {
    store.get(id).await.unwrap()
}

#[tokio::test]
async fn test_enqueued_job_runs_to_done() {
    let recorder = RecordingTask::default();
    let mut registry = WorkerRegistry::new();
    registry.register("echo", recording_worker(recorder.clone())).unwrap();

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let dispatcher = dispatcher_with(registry, Arc::clone(&store), DispatcherConfig::default());

    let job = dispatcher.enqueue("echo", &job_args(&[("a", "1")])).await.unwrap();
    assert_eq!(job.state, JobState::Scheduled);

    let summary = dispatcher.tick().await.unwrap();
    assert_eq!(
        summary,
        TickSummary {
            fetched: 1,
            started: 1,
            ..TickSummary::default()
        }
    );

    dispatcher.wait_idle().await;
    let stored = state_of(store.as_ref(), job.id).await;
    assert_eq!(stored.state, JobState::Done);
    assert!(stored.error.is_none());
    assert!(stored.version > job.version);
    assert_eq!(recorder.runs.load(Ordering::SeqCst), 1);

    // Terminal records are never picked up again.
    assert_eq!(dispatcher.tick().await.unwrap().fetched, 0);
}

#[tokio::test]
async fn test_failing_task_records_error() {
    let recorder = RecordingTask {
        fail_with: Some("disk full".to_string()),
        ..RecordingTask::default()
    };
    let mut registry = WorkerRegistry::new();
    registry.register("echo", recording_worker(recorder)).unwrap();

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let dispatcher = dispatcher_with(registry, Arc::clone(&store), DispatcherConfig::default());

    let job = dispatcher.enqueue("echo", &JobArgs::new()).await.unwrap();
    dispatcher.tick().await.unwrap();
    dispatcher.wait_idle().await;

    let stored = state_of(store.as_ref(), job.id).await;
    assert_eq!(stored.state, JobState::Failed);
    assert!(stored.error.unwrap().contains("disk full"));
}

#[tokio::test]
async fn test_unregistered_worker_fails_job() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let dispatcher = dispatcher_with(
        WorkerRegistry::new(),
        Arc::clone(&store),
        DispatcherConfig::default(),
    );

    let job = dispatcher.enqueue("ghost", &JobArgs::new()).await.unwrap();
    let summary = dispatcher.tick().await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.started, 0);

    let stored = state_of(store.as_ref(), job.id).await;
    assert_eq!(stored.state, JobState::Failed);
    let error = stored.error.unwrap();
    assert!(error.contains("ghost"));
    assert!(error.contains("not registered"));
}

#[tokio::test]
async fn test_malformed_args_fail_only_that_job() {
    let recorder = RecordingTask::default();
    let mut registry = WorkerRegistry::new();
    registry.register("echo", recording_worker(recorder.clone())).unwrap();

    let memory = Arc::new(MemoryJobStore::new());
    let now = Timestamp::now();
    memory.insert_raw(Job {
        id: 1,
        version: 1,
        created_at: now,
        updated_at: now,
        run_at: now,
        name: "echo".to_string(),
        state: JobState::Scheduled,
        args: "{not json".to_string(),
        error: None,
        tries: 0,
    });

    let store: Arc<dyn JobStore> = memory;
    let dispatcher = dispatcher_with(registry, Arc::clone(&store), DispatcherConfig::default());
    let good = dispatcher.enqueue("echo", &JobArgs::new()).await.unwrap();
    assert!(good.id > 1);

    let summary = dispatcher.tick().await.unwrap();
    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.started, 1);
    dispatcher.wait_idle().await;

    let bad = state_of(store.as_ref(), 1).await;
    assert_eq!(bad.state, JobState::Failed);
    assert!(bad.error.unwrap().contains("deserialize"));
    assert_eq!(state_of(store.as_ref(), good.id).await.state, JobState::Done);
    assert_eq!(recorder.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_worker_rejecting_args_fails_job() {
    let mut registry = WorkerRegistry::new();
    registry
        .register("strict", |args: JobArgs| -> JobResult<Box<dyn Task>> {
            deferred_rs::jobs::require_arg(&args, "needed")?;
            Ok(Box::new(RecordingTask::default()))
        })
        .unwrap();

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let dispatcher = dispatcher_with(registry, Arc::clone(&store), DispatcherConfig::default());
    let job = dispatcher.enqueue("strict", &JobArgs::new()).await.unwrap();

    assert_eq!(dispatcher.tick().await.unwrap().failed, 1);
    let stored = state_of(store.as_ref(), job.id).await;
    assert_eq!(stored.state, JobState::Failed);
    assert!(stored.error.unwrap().contains("needed"));
}

#[tokio::test]
async fn test_duplicate_registration_keeps_first_worker() {
    let first = RecordingTask::default();
    let second = RecordingTask::default();

    let mut registry = WorkerRegistry::new();
    registry.register("echo", recording_worker(first.clone())).unwrap();
    let err = registry
        .register("echo", recording_worker(second.clone()))
        .unwrap_err();
    assert!(matches!(err, JobError::AlreadyRegistered(ref name) if name == "echo"));

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let dispatcher = dispatcher_with(registry, store, DispatcherConfig::default());
    dispatcher.enqueue("echo", &JobArgs::new()).await.unwrap();
    dispatcher.tick().await.unwrap();
    dispatcher.wait_idle().await;

    assert_eq!(first.runs.load(Ordering::SeqCst), 1);
    assert_eq!(second.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_run_at_policies() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let later = Timestamp::now() + SignedDuration::from_secs(3600);
    let job = deferred_rs::jobs::enqueue_at(store.as_ref(), "echo", &JobArgs::new(), later)
        .await
        .unwrap();

    let registry = || {
        let mut registry = WorkerRegistry::new();
        registry.register("echo", recording_worker(RecordingTask::default())).unwrap();
        registry
    };

    let deferred = dispatcher_with(
        registry(),
        Arc::clone(&store),
        DispatcherConfig {
            run_at_policy: RunAtPolicy::Deferred,
            ..DispatcherConfig::default()
        },
    );
    assert_eq!(deferred.tick().await.unwrap().fetched, 0);
    assert_eq!(state_of(store.as_ref(), job.id).await.state, JobState::Scheduled);

    let immediate = dispatcher_with(registry(), Arc::clone(&store), DispatcherConfig::default());
    assert_eq!(immediate.tick().await.unwrap().started, 1);
    immediate.wait_idle().await;
    assert_eq!(state_of(store.as_ref(), job.id).await.state, JobState::Done);
}

#[tokio::test]
async fn test_concurrency_cap_defers_excess_jobs() {
    let recorder = RecordingTask {
        sleep: Duration::from_millis(200),
        ..RecordingTask::default()
    };
    let mut registry = WorkerRegistry::new();
    registry.register("slow", recording_worker(recorder.clone())).unwrap();

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let dispatcher = dispatcher_with(
        registry,
        Arc::clone(&store),
        DispatcherConfig {
            max_concurrent_tasks: 2,
            ..DispatcherConfig::default()
        },
    );
    for _ in 0..3 {
        dispatcher.enqueue("slow", &JobArgs::new()).await.unwrap();
    }

    let first = dispatcher.tick().await.unwrap();
    assert_eq!(first.started, 2);
    assert_eq!(first.deferred, 1);

    let scheduled = store.query(&JobFilter::scheduled()).await.unwrap();
    assert_eq!(scheduled.len(), 1);

    dispatcher.wait_idle().await;
    let second = dispatcher.tick().await.unwrap();
    assert_eq!(second.started, 1);
    dispatcher.wait_idle().await;

    assert_eq!(recorder.runs.load(Ordering::SeqCst), 3);
    let done = store
        .query(&JobFilter::with_state(JobState::Done))
        .await
        .unwrap();
    assert_eq!(done.len(), 3);
}

#[tokio::test]
async fn test_panicking_task_fails_without_stopping_dispatcher() {
    let mut registry = WorkerRegistry::new();
    registry
        .register(
            "boom",
            recording_worker(RecordingTask {
                panic: true,
                ..RecordingTask::default()
            }),
        )
        .unwrap();
    registry.register("echo", recording_worker(RecordingTask::default())).unwrap();

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let dispatcher = dispatcher_with(registry, Arc::clone(&store), DispatcherConfig::default());
    let boom = dispatcher.enqueue("boom", &JobArgs::new()).await.unwrap();

    dispatcher.tick().await.unwrap();
    dispatcher.wait_idle().await;

    let stored = state_of(store.as_ref(), boom.id).await;
    assert_eq!(stored.state, JobState::Failed);
    assert!(stored.error.unwrap().contains("panicked"));

    let echo = dispatcher.enqueue("echo", &JobArgs::new()).await.unwrap();
    dispatcher.tick().await.unwrap();
    dispatcher.wait_idle().await;
    assert_eq!(state_of(store.as_ref(), echo.id).await.state, JobState::Done);
}

#[tokio::test]
async fn test_run_loop_dispatches_and_drains_on_shutdown() {
    let recorder = RecordingTask {
        sleep: Duration::from_millis(100),
        ..RecordingTask::default()
    };
    let mut registry = WorkerRegistry::new();
    registry.register("echo", recording_worker(recorder.clone())).unwrap();

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let dispatcher = dispatcher_with(
        registry,
        Arc::clone(&store),
        DispatcherConfig {
            interval: Duration::from_millis(20),
            ..DispatcherConfig::default()
        },
    );
    let job = dispatcher.enqueue("echo", &JobArgs::new()).await.unwrap();

    let runner = dispatcher.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    tokio::time::sleep(Duration::from_millis(60)).await;
    dispatcher.shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("run should return after shutdown")
        .unwrap();

    // Shutdown waited for the in-flight task.
    assert_eq!(state_of(store.as_ref(), job.id).await.state, JobState::Done);
    assert_eq!(recorder.runs.load(Ordering::SeqCst), 1);
}

/// Store whose writes always fail, wrapping a working in-memory store.
struct ReadOnlyStore {
    inner: MemoryJobStore,
    updates: AtomicUsize,
}

#[async_trait]
impl JobStore for ReadOnlyStore {
    async fn create(&self, new_job: NewJob) -> AppResult<Job> {
        self.inner.create(new_job).await
    }

    async fn update(&self, _job: &Job) -> AppResult<Job> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        Err(AppError::Database {
            operation: "update job".to_string(),
            source: anyhow::anyhow!("read-only"),
        })
    }

    async fn query(&self, filter: &JobFilter) -> AppResult<Vec<Job>> {
        self.inner.query(filter).await
    }

    async fn get(&self, id: i64) -> AppResult<Job> {
        self.inner.get(id).await
    }
}

#[tokio::test]
async fn test_failed_running_update_skips_task() {
    let recorder = RecordingTask::default();
    let mut registry = WorkerRegistry::new();
    registry.register("echo", recording_worker(recorder.clone())).unwrap();

    let store = Arc::new(ReadOnlyStore {
        inner: MemoryJobStore::new(),
        updates: AtomicUsize::new(0),
    });
    let dispatcher = dispatcher_with(
        registry,
        Arc::clone(&store) as Arc<dyn JobStore>,
        DispatcherConfig::default(),
    );
    let job = dispatcher.enqueue("echo", &JobArgs::new()).await.unwrap();

    let summary = dispatcher.tick().await.unwrap();
    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.started, 0);
    dispatcher.wait_idle().await;

    assert_eq!(recorder.runs.load(Ordering::SeqCst), 0);
    assert_eq!(store.updates.load(Ordering::SeqCst), 1);
    assert_eq!(store.get(job.id).await.unwrap().state, JobState::Scheduled);
}

//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use deferred_rs::jobs::{JobArgs, JobResult, Task, TaskContext};
use serde_json::{Value, json};

pub const PROVIDER_JOB_ID: &str = "provider-job-7";

/// Completion document served once the fake provider finishes a job.
pub const COMPLETE_BODY: &str = r#"{"results":{"job_id":"provider-job-7","images":[{"image_identifier":"thumb","s3_url":"https://media.example/thumbs/cat.png"}]}}"#;

/// In-process stand-in for the image provider and the callback receiver.
#[derive(Debug, Default)]
pub struct FakeProvider {
    /// Status polls answered with 404 before the job reports complete.
    pub not_ready_polls: usize,
    /// When set, submissions are acknowledged with `results.error`.
    pub submit_error: Option<String>,
    /// When set, submissions are answered with this status and no job.
    pub submit_status: Option<u16>,
    /// Status returned by the callback receiver; 200 when unset.
    pub callback_status: Option<u16>,
    pub submissions: Mutex<Vec<Value>>,
    pub polls: AtomicUsize,
    pub poll_times: Mutex<Vec<Instant>>,
    pub callbacks: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new(not_ready_polls: usize) -> Self {
        Self {
            not_ready_polls,
            ..Self::default()
        }
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<Value> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn poll_times(&self) -> Vec<Instant> {
        self.poll_times.lock().unwrap().clone()
    }

    pub fn callbacks(&self) -> Vec<String> {
        self.callbacks.lock().unwrap().clone()
    }
}

/// Base URL of a running fake provider.
pub struct ProviderServer {
    pub base_url: String,
    pub provider: Arc<FakeProvider>,
}

impl ProviderServer {
    pub fn submit_url(&self) -> String {
        format!("{}/api/job", self.base_url)
    }

    pub fn poll_url(&self) -> String {
        format!("{}/listen", self.base_url)
    }

    pub fn callback_url(&self) -> String {
        format!("{}/callback", self.base_url)
    }
}

pub async fn spawn_provider(provider: FakeProvider) -> ProviderServer {
    let provider = Arc::new(provider);
    let app = Router::new()
        .route("/api/job", post(submit))
        .route("/listen/{job_id}", get(poll))
        .route("/callback", post(callback))
        .with_state(Arc::clone(&provider));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    ProviderServer {
        base_url: format!("http://{}", addr),
        provider,
    }
}

async fn submit(
    State(provider): State<Arc<FakeProvider>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    provider.submissions.lock().unwrap().push(body);
    if let Some(status) = provider.submit_status {
        let status = StatusCode::from_u16(status).unwrap();
        return (status, Json(json!({ "message": "submission refused" })));
    }
    match &provider.submit_error {
        Some(error) => (StatusCode::OK, Json(json!({ "results": { "error": error } }))),
        None => (
            StatusCode::OK,
            Json(json!({ "results": { "job_id": PROVIDER_JOB_ID } })),
        ),
    }
}

async fn poll(
    State(provider): State<Arc<FakeProvider>>,
    Path(job_id): Path<String>,
) -> (StatusCode, String) {
    provider.poll_times.lock().unwrap().push(Instant::now());
    let seen = provider.polls.fetch_add(1, Ordering::SeqCst);
    if job_id != PROVIDER_JOB_ID {
        return (StatusCode::NOT_FOUND, format!("unknown job {}", job_id));
    }
    if seen < provider.not_ready_polls {
        (StatusCode::NOT_FOUND, "job not ready".to_string())
    } else {
        (StatusCode::OK, COMPLETE_BODY.to_string())
    }
}

async fn callback(State(provider): State<Arc<FakeProvider>>, body: String) -> StatusCode {
    provider.callbacks.lock().unwrap().push(body);
    provider
        .callback_status
        .map(|status| StatusCode::from_u16(status).unwrap())
        .unwrap_or(StatusCode::OK)
}

pub fn job_args(pairs: &[(&str, &str)]) -> JobArgs {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Task that records its run and optionally sleeps, fails or panics.
#[derive(Debug, Clone, Default)]
pub struct RecordingTask {
    pub runs: Arc<AtomicUsize>,
    pub sleep: Duration,
    pub fail_with: Option<String>,
    pub panic: bool,
}

#[async_trait]
impl Task for RecordingTask {
    async fn run(&self, _ctx: TaskContext) -> JobResult<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if !self.sleep.is_zero() {
            tokio::time::sleep(self.sleep).await;
        }
        if self.panic {
            panic!("recording task panicked");
        }
        match &self.fail_with {
            Some(reason) => Err(deferred_rs::jobs::JobError::Execution(reason.clone())),
            None => Ok(()),
        }
    }
}

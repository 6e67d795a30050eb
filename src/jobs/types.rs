use std::collections::BTreeMap;

use diesel_derive_enum::DbEnum;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::jobs::error::{JobError, JobResult};

/// Untyped job arguments as handed to [`crate::jobs::Worker::spawn`].
///
/// A `BTreeMap` keeps the serialized payload stable for identical inputs.
pub type JobArgs = BTreeMap<String, String>;

/// Lifecycle state of a persisted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::JobState")]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Scheduled,
    Running,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }

    /// Transition table. Scheduled may fail directly when a job cannot be
    /// dispatched at all (unknown worker, unreadable args).
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Scheduled, JobState::Running)
                | (JobState::Scheduled, JobState::Failed)
                | (JobState::Running, JobState::Done)
                | (JobState::Running, JobState::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Scheduled => "scheduled",
            JobState::Running => "running",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scheduled" => Ok(JobState::Scheduled),
            "running" => Ok(JobState::Running),
            "done" => Ok(JobState::Done),
            "failed" => Ok(JobState::Failed),
            _ => Err(format!("Invalid job state: {}", s)),
        }
    }
}

/// Whether the dispatch query honours `run_at`.
///
/// `Immediate` picks up every scheduled job regardless of `run_at`;
/// `Deferred` only picks up jobs whose `run_at` is not in the future.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunAtPolicy {
    #[default]
    Immediate,
    Deferred,
}

impl std::fmt::Display for RunAtPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunAtPolicy::Immediate => write!(f, "immediate"),
            RunAtPolicy::Deferred => write!(f, "deferred"),
        }
    }
}

/// A persisted job record.
///
/// `id`, `version`, `created_at` and `updated_at` belong to the store and are
/// never written by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: i64,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub run_at: Timestamp,
    pub name: String,
    pub state: JobState,
    pub args: String,
    pub error: Option<String>,
    /// Persisted for schema compatibility; the engine neither reads nor bumps it.
    pub tries: i32,
}

impl Job {
    /// Decodes the opaque argument payload.
    pub fn decode_args(&self) -> JobResult<JobArgs> {
        serde_json::from_str(&self.args).map_err(JobError::ArgsDeserialization)
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        self.run_at <= now
    }

    /// Moves the record to `next`, enforcing the transition table.
    pub fn transition(&mut self, next: JobState) -> JobResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(JobError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        if next != JobState::Failed {
            self.error = None;
        }
        Ok(())
    }

    pub fn mark_running(&mut self) -> JobResult<()> {
        self.transition(JobState::Running)
    }

    pub fn mark_done(&mut self) -> JobResult<()> {
        self.transition(JobState::Done)
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) -> JobResult<()> {
        self.transition(JobState::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }
}

/// A job about to be created. The store fills in identity and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub name: String,
    pub args: String,
    pub run_at: Timestamp,
}

impl NewJob {
    /// Serializes `args` and validates the worker name.
    pub fn new(name: &str, args: &JobArgs, run_at: Timestamp) -> JobResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(JobError::EmptyName);
        }
        let args = serde_json::to_string(args).map_err(JobError::ArgsSerialization)?;
        Ok(Self {
            name: name.to_string(),
            args,
            run_at,
        })
    }
}

/// Filter accepted by [`crate::jobs::JobStore::query`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobFilter {
    pub state: Option<JobState>,
    /// Only jobs with `run_at <= due_before`.
    pub due_before: Option<Timestamp>,
}

impl JobFilter {
    pub fn scheduled() -> Self {
        Self {
            state: Some(JobState::Scheduled),
            due_before: None,
        }
    }

    pub fn with_state(state: JobState) -> Self {
        Self {
            state: Some(state),
            due_before: None,
        }
    }

    pub fn due_before(mut self, at: Timestamp) -> Self {
        self.due_before = Some(at);
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.state.is_none_or(|state| job.state == state)
            && self.due_before.is_none_or(|at| job.is_due(at))
    }
}

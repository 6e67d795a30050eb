//! Durable background job engine.
//!
//! Jobs are rows in the `jobs` table. A [`Dispatcher`] polls for scheduled
//! rows, hands each to the [`Worker`] registered under its name and records
//! the outcome.

pub mod dispatcher;
pub mod error;
pub mod memory_store;
pub mod models;
pub mod registry;
pub mod store;
pub mod tasks;
pub mod types;
pub mod worker;

pub use dispatcher::{Dispatcher, DispatcherConfig, TickSummary, enqueue, enqueue_at};
pub use error::{JobError, JobResult};
pub use memory_store::MemoryJobStore;
pub use registry::WorkerRegistry;
pub use store::JobStore;
pub use types::{Job, JobArgs, JobFilter, JobState, NewJob, RunAtPolicy};
pub use worker::{Task, TaskContext, Worker, parse_arg, require_arg};

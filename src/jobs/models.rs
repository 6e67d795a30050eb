use diesel::prelude::*;
use jiff_diesel::Timestamp as DbTimestamp;

use crate::jobs::types::{Job, JobState, NewJob};
use crate::schema::jobs;

// ============================================================================
// Row models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = jobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct JobRow {
    pub id: i64,
    pub version: i32,
    pub created_at: DbTimestamp,
    pub updated_at: DbTimestamp,
    pub run_at: DbTimestamp,
    pub name: String,
    pub state: JobState,
    pub args: String,
    pub error: Option<String>,
    pub tries: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJobRow {
    pub name: String,
    pub state: JobState,
    pub args: String,
    pub run_at: DbTimestamp,
}

/// Columns the engine is allowed to write after creation.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = jobs)]
#[diesel(treat_none_as_null = true)]
pub struct JobChangeset {
    pub run_at: DbTimestamp,
    pub state: JobState,
    pub error: Option<String>,
    pub tries: i32,
}

// ============================================================================
// Conversions
// ============================================================================

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Self {
            id: row.id,
            version: row.version,
            created_at: row.created_at.to_jiff(),
            updated_at: row.updated_at.to_jiff(),
            run_at: row.run_at.to_jiff(),
            name: row.name,
            state: row.state,
            args: row.args,
            error: row.error,
            tries: row.tries,
        }
    }
}

impl From<NewJob> for NewJobRow {
    fn from(job: NewJob) -> Self {
        Self {
            name: job.name,
            state: JobState::Scheduled,
            args: job.args,
            run_at: DbTimestamp::from(job.run_at),
        }
    }
}

impl From<&Job> for JobChangeset {
    fn from(job: &Job) -> Self {
        Self {
            run_at: DbTimestamp::from(job.run_at),
            state: job.state,
            error: job.error.clone(),
            tries: job.tries,
        }
    }
}

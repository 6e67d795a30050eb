use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::AsyncPgConnection;
use diesel_async::RunQueryDsl;
use diesel_async::pooled_connection::bb8::PooledConnection;
use jiff_diesel::Timestamp as DbTimestamp;

use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::jobs::models::{JobChangeset, JobRow, NewJobRow};
use crate::jobs::store::JobStore;
use crate::jobs::types::{Job, JobFilter, NewJob};
use crate::schema::jobs;

/// PostgreSQL-backed [`JobStore`].
///
/// Cloning is cheap; the pool is reference counted.
#[derive(Clone)]
pub struct JobRepository {
    pool: AsyncDbPool,
}

impl JobRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> AppResult<PooledConnection<'_, AsyncPgConnection>> {
        self.pool.get().await.map_err(|e| AppError::ConnectionPool {
            source: anyhow::Error::from(e),
        })
    }
}

fn not_found_or(id: i64) -> impl FnOnce(diesel::result::Error) -> AppError {
    move |e| match e {
        diesel::result::Error::NotFound => AppError::job_not_found(id),
        _ => AppError::from(e),
    }
}

#[async_trait]
impl JobStore for JobRepository {
    async fn create(&self, job: NewJob) -> AppResult<Job> {
        let mut conn = self.conn().await?;

        diesel::insert_into(jobs::table)
            .values(NewJobRow::from(job))
            .returning(JobRow::as_returning())
            .get_result(&mut conn)
            .await
            .map(Job::from)
            .map_err(AppError::from)
    }

    async fn update(&self, job: &Job) -> AppResult<Job> {
        let mut conn = self.conn().await?;

        diesel::update(jobs::table.find(job.id))
            .set((
                JobChangeset::from(job),
                jobs::version.eq(jobs::version + 1),
                jobs::updated_at.eq(diesel::dsl::now),
            ))
            .returning(JobRow::as_returning())
            .get_result(&mut conn)
            .await
            .map(Job::from)
            .map_err(not_found_or(job.id))
    }

    async fn query(&self, filter: &JobFilter) -> AppResult<Vec<Job>> {
        let mut conn = self.conn().await?;

        let mut query = jobs::table.select(JobRow::as_select()).into_boxed();
        if let Some(state) = filter.state {
            query = query.filter(jobs::state.eq(state));
        }
        if let Some(due_before) = filter.due_before {
            query = query.filter(jobs::run_at.le(DbTimestamp::from(due_before)));
        }

        let rows = query
            .order((jobs::run_at.asc(), jobs::id.asc()))
            .load::<JobRow>(&mut conn)
            .await
            .map_err(AppError::from)?;

        Ok(rows.into_iter().map(Job::from).collect())
    }

    async fn get(&self, id: i64) -> AppResult<Job> {
        let mut conn = self.conn().await?;

        jobs::table
            .find(id)
            .select(JobRow::as_select())
            .first(&mut conn)
            .await
            .map(Job::from)
            .map_err(not_found_or(id))
    }
}

//! Shared runtime state for CLI commands.
//!
//! Builds the job store selected by `[store]` and the worker registry
//! described by the remaining settings.

use std::sync::Arc;

use crate::config::{Settings, StoreBackend};
use crate::db::{AsyncDbPool, establish_async_connection_pool};
use crate::error::AppResult;
use crate::jobs::tasks::ImageResizeWorker;
use crate::jobs::tasks::image_resize::WORKER_NAME as IMAGE_RESIZE;
use crate::jobs::{Dispatcher, JobResult, JobStore, MemoryJobStore, WorkerRegistry};
use crate::repositories::JobRepository;

/// Resources shared by every command.
///
/// Cloning is cheap; the store and the pool are reference counted.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn JobStore>,
    /// Present only for the postgres backend.
    pub db_pool: Option<AsyncDbPool>,
}

impl AppState {
    /// Connects to the configured store.
    ///
    /// # Errors
    /// - `AppError::Validation` - If the database configuration is invalid
    /// - `AppError::ConnectionPool` - If the pool cannot be built
    pub async fn new(settings: Settings) -> AppResult<Self> {
        let (store, db_pool): (Arc<dyn JobStore>, Option<AsyncDbPool>) = match settings.store.backend {
            StoreBackend::Postgres => {
                let pool = establish_async_connection_pool(&settings.database).await?;
                (Arc::new(JobRepository::new(pool.clone())), Some(pool))
            }
            StoreBackend::Memory => {
                tracing::warn!("Using the in-memory job store; jobs are lost on exit");
                (Arc::new(MemoryJobStore::new()), None)
            }
        };

        tracing::debug!(backend = %settings.store.backend, "Job store ready");

        Ok(Self {
            settings: Arc::new(settings),
            store,
            db_pool,
        })
    }

    /// State around an existing store, for tests and embedding.
    pub fn with_store(settings: Settings, store: Arc<dyn JobStore>) -> Self {
        Self {
            settings: Arc::new(settings),
            store,
            db_pool: None,
        }
    }

    /// Registers every worker enabled in the settings.
    pub fn build_registry(&self) -> JobResult<WorkerRegistry> {
        let mut registry = WorkerRegistry::new();

        let image_resize = &self.settings.image_resize;
        if image_resize.enabled {
            let config = image_resize.to_worker_config(self.settings.application.environment);
            tracing::info!(
                poll_mode = config.poll_mode,
                deadline = ?config.deadline,
                "Registering image resize worker"
            );
            registry.register(IMAGE_RESIZE, ImageResizeWorker::new(config))?;
        }

        Ok(registry)
    }

    pub fn dispatcher(&self) -> JobResult<Dispatcher> {
        let registry = self.build_registry()?;
        Ok(Dispatcher::new(
            registry,
            Arc::clone(&self.store),
            self.settings.dispatcher.to_dispatcher_config(),
        ))
    }
}

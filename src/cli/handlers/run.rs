//! Run command handler
//!
//! Starts the dispatch loop and keeps it alive until Ctrl+C or SIGTERM.

use tokio::signal;

use crate::config::StoreBackend;
use crate::config::settings::Settings;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Handler for the run command
pub struct RunCommandHandler {
    config: Settings,
}

impl RunCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    /// Run the dispatcher, or only validate when `dry_run` is set.
    ///
    /// # Errors
    /// - Configuration validation errors
    /// - Store connection or migration errors
    /// - Worker registration errors
    pub async fn execute(&self, dry_run: bool) -> AppResult<()> {
        self.config.validate()?;

        if dry_run {
            return self.validate_only();
        }

        if self.config.store.backend == StoreBackend::Postgres && self.config.database.auto_migrate {
            let applied = db::run_pending_migrations(&self.config.database.url).await?;
            tracing::info!(count = applied.len(), "Applied pending migrations");
        }

        let state = AppState::new(self.config.clone()).await?;
        let dispatcher = state.dispatcher()?;

        let runner = dispatcher.clone();
        let handle = tokio::spawn(async move { runner.run().await });

        let signal_result = shutdown_signal().await;
        dispatcher.shutdown();

        handle.await.map_err(|e| AppError::Internal {
            source: anyhow::Error::from(e),
        })?;

        tracing::info!("Dispatcher shutdown complete");
        signal_result
    }

    /// Print the resolved configuration without touching the store.
    pub fn validate_only(&self) -> AppResult<()> {
        let state = AppState::with_store(
            self.config.clone(),
            std::sync::Arc::new(crate::jobs::MemoryJobStore::new()),
        );
        let registry = state.build_registry()?;
        let dispatcher = &self.config.dispatcher;

        println!("✓ Configuration is valid");
        println!("✓ Environment: {}", self.config.application.environment);
        println!("✓ Job store backend: {}", self.config.store.backend);
        println!(
            "✓ Dispatcher: every {}s, up to {} concurrent tasks, run_at policy {}",
            dispatcher.interval_secs, dispatcher.max_concurrent_tasks, dispatcher.run_at_policy
        );
        if registry.is_empty() {
            println!("! No workers enabled");
        } else {
            println!("✓ Workers: {}", registry.names().join(", "));
        }

        println!("Dry run completed successfully");
        Ok(())
    }

    pub fn config(&self) -> &Settings {
        &self.config
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() -> AppResult<()> {
    let ctrl_c = async {
        signal::ctrl_c().await.map_err(|e| AppError::Internal {
            source: anyhow::anyhow!("Failed to install Ctrl+C handler: {}", e),
        })
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate()).map_err(|e| {
            AppError::Internal {
                source: anyhow::anyhow!("Failed to install SIGTERM handler: {}", e),
            }
        })?;
        sigterm.recv().await;
        Ok::<(), AppError>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<AppResult<()>>();

    tokio::select! {
        result = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            result
        }
        result = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
            result
        }
    }
}

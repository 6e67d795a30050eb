//! Enqueue command handler

use jiff::{SignedDuration, Timestamp};

use crate::config::settings::Settings;
use crate::error::{AppError, AppResult};
use crate::jobs::{self, Job, JobArgs};
use crate::state::AppState;

/// Handler for the enqueue command
pub struct EnqueueCommandHandler {
    config: Settings,
}

impl EnqueueCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    /// Persist a scheduled job and print its id.
    ///
    /// Later `--arg` pairs replace earlier ones with the same key.
    pub async fn execute(
        &self,
        name: &str,
        pairs: &[(String, String)],
        delay_secs: Option<u64>,
    ) -> AppResult<()> {
        let state = AppState::new(self.config.clone()).await?;
        let job = self.enqueue(&state, name, pairs, delay_secs).await?;

        println!("✓ Enqueued job {} ({}) due at {}", job.id, job.name, job.run_at);
        Ok(())
    }

    async fn enqueue(
        &self,
        state: &AppState,
        name: &str,
        pairs: &[(String, String)],
        delay_secs: Option<u64>,
    ) -> AppResult<Job> {
        let args: JobArgs = pairs.iter().cloned().collect();
        let store = state.store.as_ref();

        let job = match delay_secs {
            Some(secs) => jobs::enqueue_at(store, name, &args, run_at_after(secs)?).await?,
            None => jobs::enqueue(store, name, &args).await?,
        };

        tracing::info!(job_id = job.id, job_name = %job.name, "Job enqueued from CLI");
        Ok(job)
    }
}

fn run_at_after(secs: u64) -> AppResult<Timestamp> {
    let invalid = || AppError::Validation {
        field: "delay_secs".to_string(),
        reason: format!("Delay of {} seconds is out of range", secs),
    };
    let secs = i64::try_from(secs).map_err(|_| invalid())?;
    Timestamp::now()
        .checked_add(SignedDuration::from_secs(secs))
        .map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StoreBackend, StoreConfig};
    use crate::jobs::{JobState, MemoryJobStore};
    use std::sync::Arc;

    fn memory_state() -> (EnqueueCommandHandler, AppState) {
        let config = Settings {
            store: StoreConfig {
                backend: StoreBackend::Memory,
            },
            ..Settings::default()
        };
        let state = AppState::with_store(config.clone(), Arc::new(MemoryJobStore::new()));
        (EnqueueCommandHandler::new(config), state)
    }

    #[tokio::test]
    async fn test_enqueue_persists_args() {
        let (handler, state) = memory_state();
        let pairs = vec![
            ("width".to_string(), "400".to_string()),
            ("width".to_string(), "800".to_string()),
        ];

        let job = handler.enqueue(&state, "image_resize", &pairs, None).await.unwrap();
        assert_eq!(job.state, JobState::Scheduled);
        assert_eq!(job.decode_args().unwrap()["width"], "800");
        assert_eq!(state.store.get(job.id).await.unwrap().name, "image_resize");
    }

    #[tokio::test]
    async fn test_enqueue_with_delay_sets_future_run_at() {
        let (handler, state) = memory_state();
        let job = handler.enqueue(&state, "echo", &[], Some(120)).await.unwrap();
        assert!(job.run_at > Timestamp::now() + SignedDuration::from_secs(60));
    }

    #[tokio::test]
    async fn test_enqueue_empty_name_is_validation_error() {
        let (handler, state) = memory_state();
        let err = handler.enqueue(&state, "", &[], None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn test_delay_out_of_range() {
        assert!(run_at_after(u64::MAX).is_err());
    }
}

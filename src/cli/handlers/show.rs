//! Show command handler

use crate::config::settings::Settings;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Handler for the show command
pub struct ShowCommandHandler {
    config: Settings,
}

impl ShowCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    /// Print job `id` as pretty JSON.
    ///
    /// # Errors
    /// `AppError::NotFound` if no such job exists.
    pub async fn execute(&self, id: i64) -> AppResult<()> {
        let state = AppState::new(self.config.clone()).await?;
        println!("{}", render_job(&state, id).await?);
        Ok(())
    }
}

async fn render_job(state: &AppState, id: i64) -> AppResult<String> {
    let job = state.store.get(id).await?;
    serde_json::to_string_pretty(&job).map_err(|e| AppError::Internal {
        source: anyhow::Error::from(e),
    })
}

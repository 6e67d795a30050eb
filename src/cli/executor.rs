//! Command executor for dispatching CLI commands

use super::handlers::{
    EnqueueCommandHandler, MigrateCommandHandler, RunCommandHandler, ShowCommandHandler,
};
use super::parser::{Cli, Commands};
use crate::config::settings::Settings;
use crate::error::{AppError, AppResult};

/// Execute the parsed command. No subcommand means `run`.
///
/// # Errors
/// Returns errors from command handlers or validation failures
pub async fn execute_command(cli: &Cli, settings: Settings) -> AppResult<()> {
    cli.validate().map_err(|reason| AppError::Validation {
        field: "cli_arguments".to_string(),
        reason,
    })?;

    match &cli.command {
        Some(Commands::Run { dry_run, .. }) => RunCommandHandler::new(settings).execute(*dry_run).await,
        None => RunCommandHandler::new(settings).execute(false).await,
        Some(Commands::Enqueue {
            name,
            args,
            delay_secs,
        }) => {
            EnqueueCommandHandler::new(settings)
                .execute(name, args, *delay_secs)
                .await
        }
        Some(Commands::Show { id }) => ShowCommandHandler::new(settings).execute(*id).await,
        Some(Commands::Migrate { dry_run, rollback }) => {
            if let Some(steps) = rollback
                && *steps > 50
            {
                tracing::warn!(steps, "Rolling back a large number of migrations");
            }
            MigrateCommandHandler::new(settings)
                .execute(*dry_run, *rollback)
                .await
        }
    }
}

//! CLI argument parsing with clap
//!
//! Defines the command-line interface: global flags plus the `run`,
//! `enqueue`, `show` and `migrate` commands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::build;

/// Durable background job runner backed by PostgreSQL
#[derive(Parser, Debug)]
#[command(name = "deferred-rs")]
#[command(about = "Durable background job runner backed by PostgreSQL")]
#[command(long_about = "
deferred-rs stores background jobs as rows in a relational database and runs
them from a polling dispatcher. No external broker is required.

EXAMPLES:
    # Run the dispatcher with the default configuration
    deferred-rs run

    # Check configuration without starting the dispatcher
    deferred-rs run --dry-run

    # Scan for jobs every second
    deferred-rs run --interval 1

    # Enqueue an image resize job
    deferred-rs enqueue image_resize --arg src=https://x/img.png --arg key=thumbs/a.png \\
        --arg width=400 --arg height=300

    # Inspect a job
    deferred-rs show 42

    # Run database migrations
    deferred-rs migrate
")]
#[command(version = build::CLAP_LONG_VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    ///
    /// Load a single TOML file instead of the layered `config/` directory.
    ///
    /// Example: --config /etc/deferred-rs/production.toml
    #[arg(short, long, value_name = "FILE", value_parser = super::validation::validate_config_file_path)]
    pub config: Option<PathBuf>,

    /// Override environment detection
    ///
    /// Selects `config/{env}.toml` and the default image resize completion
    /// mode (callbacks in production, polling elsewhere).
    #[arg(short, long, value_enum)]
    pub env: Option<Environment>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the dispatch loop (default)
    ///
    /// Polls the job store on a fixed interval and runs every scheduled job
    /// until Ctrl+C or SIGTERM, then waits for in-flight jobs.
    ///
    /// Examples:
    ///   deferred-rs run                 # Start with defaults
    ///   deferred-rs run --interval 1    # Scan every second
    ///   deferred-rs run --dry-run       # Validate config and list workers
    Run {
        /// Seconds between scans, overriding `dispatcher.interval_secs`
        #[arg(long, value_name = "SECONDS", value_parser = super::validation::validate_interval)]
        interval: Option<u64>,

        /// Log level override
        #[arg(long, value_enum)]
        log_level: Option<LogLevel>,

        /// Validate configuration and exit
        #[arg(long)]
        dry_run: bool,
    },
    /// Create a scheduled job
    ///
    /// Examples:
    ///   deferred-rs enqueue echo --arg a=1
    ///   deferred-rs enqueue image_resize --arg src=https://x/img.png --delay-secs 60
    Enqueue {
        /// Worker name
        #[arg(value_name = "NAME")]
        name: String,

        /// Job argument as KEY=VALUE; repeatable
        #[arg(short, long = "arg", value_name = "KEY=VALUE", value_parser = super::validation::parse_key_value)]
        args: Vec<(String, String)>,

        /// Earliest dispatch time, in seconds from now
        ///
        /// Only honoured when `dispatcher.run_at_policy = "deferred"`.
        #[arg(long, value_name = "SECONDS")]
        delay_secs: Option<u64>,
    },
    /// Print a job record as JSON
    Show {
        /// Job id
        #[arg(value_name = "ID")]
        id: i64,
    },
    /// Database migration operations
    ///
    /// Examples:
    ///   deferred-rs migrate                    # Apply all pending migrations
    ///   deferred-rs migrate --dry-run          # Show pending migrations without applying
    ///   deferred-rs migrate --rollback 1       # Rollback the last migration
    Migrate {
        /// Show pending migrations without applying
        #[arg(long, conflicts_with = "rollback")]
        dry_run: bool,

        /// Number of migrations to rollback (1-100)
        #[arg(long, value_name = "STEPS", conflicts_with = "dry_run", value_parser = super::validation::validate_rollback_steps)]
        rollback: Option<u32>,
    },
}

/// Environment options
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Environment {
    #[value(name = "development", alias = "dev")]
    Development,
    #[value(name = "test")]
    Test,
    #[value(name = "staging", alias = "stage")]
    Staging,
    #[value(name = "production", alias = "prod")]
    Production,
}

/// Log level options
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LogLevel {
    #[value(name = "error")]
    Error,
    #[value(name = "warn", alias = "warning")]
    Warn,
    #[value(name = "info")]
    Info,
    #[value(name = "debug")]
    Debug,
    #[value(name = "trace")]
    Trace,
}

impl Cli {
    /// Validate argument combinations clap cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(Commands::Enqueue { name, .. }) = &self.command
            && name.trim().is_empty()
        {
            return Err("Worker name cannot be empty".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use --verbose and --quiet together".to_string());
        }

        Ok(())
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => "error".to_string(),
            LogLevel::Warn => "warn".to_string(),
            LogLevel::Info => "info".to_string(),
            LogLevel::Debug => "debug".to_string(),
            LogLevel::Trace => "trace".to_string(),
        }
    }
}

impl From<Environment> for crate::config::Environment {
    fn from(env: Environment) -> Self {
        match env {
            Environment::Development => crate::config::Environment::Development,
            Environment::Test => crate::config::Environment::Test,
            Environment::Staging => crate::config::Environment::Staging,
            Environment::Production => crate::config::Environment::Production,
        }
    }
}

//! Command handlers for CLI operations
//!
//! Each handler owns the merged settings and builds whatever runtime state
//! its command needs.

pub mod enqueue;
pub mod migrate;
pub mod run;
pub mod show;

pub use enqueue::EnqueueCommandHandler;
pub use migrate::MigrateCommandHandler;
pub use run::RunCommandHandler;
pub use show::ShowCommandHandler;

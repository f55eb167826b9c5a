//! CLI command handlers, one file per command.

mod config;
mod remove;
mod run;
mod status;

pub use config::run_config;
pub use remove::run_remove;
pub use run::{run_pipeline, RunArgs};
pub use status::run_status;

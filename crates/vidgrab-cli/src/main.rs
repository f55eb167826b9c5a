use vidgrab_core::logging;

mod cli;

use crate::cli::CliCommand;

fn main() {
    if let Err(e) = logging::init_logging() {
        logging::init_logging_stderr();
        tracing::warn!("file logging unavailable, using stderr: {:#}", e);
    }

    if let Err(err) = CliCommand::run_from_args() {
        eprintln!("vidgrab error: {:#}", err);
        std::process::exit(1);
    }
}

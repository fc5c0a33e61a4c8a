//! Subagent CLI entry point.
//!
//! Parses arguments, initializes logging to stderr (stdout belongs to the
//! serve protocol and command output), dispatches to the command handler,
//! and maps errors to exit codes.

use std::process::ExitCode;
use subagent::cli::Cli;
use subagent::error::AgentError;
use subagent::{commands, exit_codes};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(cli.global.verbose);

    match commands::dispatch(cli.global, cli.command).await {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {:#}", err);

            let code = err
                .downcast_ref::<AgentError>()
                .map(AgentError::exit_code)
                .unwrap_or(exit_codes::USER_ERROR);
            ExitCode::from(code as u8)
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "subagent=info",
        1 => "subagent=debug",
        _ => "subagent=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

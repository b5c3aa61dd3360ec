#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::process::ExitCode;

use clap::Parser;
use dotenv::dotenv;
use tracing::error;

use qssh::cli::{self, Cli};

fn main() -> ExitCode {
    dotenv().ok();

    // Logs go to stderr so they never mix with the remote shell's output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(cli::dispatch(cli));
    // A blocked stdin read must not hold the process open after the shell exits
    runtime.shutdown_background();

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(step = e.step(), "{}", e);
            ExitCode::FAILURE
        }
    }
}

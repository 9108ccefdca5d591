//! Bosun CLI - Batch operation runner command-line interface
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::print_stdout,
        clippy::print_stderr,
        reason = "Allow for tests"
    )
)]

use anyhow::Result;

mod cli;
mod demo;
mod handlers;
mod status_line;

use clap::Parser as _;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            ops,
            steps,
            flaky,
            fail,
            cancel_after_ms,
            data_dir,
        } => handlers::handle_run(ops, steps, flaky, fail, cancel_after_ms, data_dir).await,
        Commands::Config { full } => handlers::handle_config(full),
    }
}

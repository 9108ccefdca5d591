use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bosun")]
#[command(about = "Batch operation runner with live status aggregation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run a set of batch operations against the status pipeline")]
    Run {
        #[arg(long, default_value_t = 3, help = "Number of operations to run")]
        ops: u32,

        #[arg(long, default_value_t = 5, help = "Steps per operation")]
        steps: u32,

        #[arg(long, help = "Record a warning partway through each operation")]
        flaky: bool,

        #[arg(long, help = "Abort the last operation with an error partway through")]
        fail: bool,

        #[arg(
            long,
            help = "Request cancellation of every operation after this many milliseconds"
        )]
        cancel_after_ms: Option<u64>,

        #[arg(long, help = "Directory for config and logs instead of ~/.bosun")]
        data_dir: Option<PathBuf>,
    },

    #[command(about = "Show configuration")]
    Config {
        #[arg(long, help = "Show full configuration including defaults")]
        full: bool,
    },
}

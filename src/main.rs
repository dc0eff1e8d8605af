//! Cocaine functional test harness
//!
//! Boots an isolated runtime for every scenario and checks the management
//! tool's exit codes and output against exact expectations.

use clap::Parser;
use harness::commands::{Commands, GlobalOptions};
use harness::{cli, common};

#[derive(Parser)]
#[command(name = "cocaine-harness", about = "Functional tests for the Cocaine management tool")]
#[command(version, long_about = None)]
struct Cli {
    #[command(flatten)]
    options: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    common::logging::init_cli(cli.command.verbose());

    if let Err(e) = cli::dispatch(cli.command, &cli.options).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

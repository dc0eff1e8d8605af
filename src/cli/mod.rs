//! CLI command handling
//!
//! Dispatches harness commands and formats their output.

use colored::Colorize;

use crate::commands::{Commands, GlobalOptions};
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::runtime::ConfigBuilder;
use crate::testing::{self, SuiteReport};

/// Load the configuration named on the command line and apply overrides
pub fn load_config(options: &GlobalOptions) -> Result<Config> {
    let config = match &options.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    Ok(config.with_overrides(options.overrides()?))
}

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, options: &GlobalOptions) -> Result<()> {
    let config = load_config(options)?;

    match command {
        Commands::Run { filter, verbose } => {
            let scenarios = testing::select_builtin(filter.as_deref())?;
            if scenarios.is_empty() {
                return Err(Error::Config(format!(
                    "No built-in scenario matches '{}'",
                    filter.unwrap_or_default()
                )));
            }
            log_binaries(&config);
            let report = testing::run_suite(&config, &scenarios, verbose).await;
            check_report(&report)
        }

        Commands::Test { paths, verbose } => {
            let scenarios = paths
                .iter()
                .map(|path| testing::load_scenario(path))
                .collect::<Result<Vec<_>>>()?;
            log_binaries(&config);
            let report = testing::run_suite(&config, &scenarios, verbose).await;
            check_report(&report)
        }

        Commands::List => {
            for scenario in testing::builtin_scenarios()? {
                match &scenario.description {
                    Some(desc) => println!("{}  {}", scenario.name.bold(), desc.dimmed()),
                    None => println!("{}", scenario.name.bold()),
                }
            }
            Ok(())
        }

        Commands::Config => {
            let layout = config.layout();
            let runtime_config = ConfigBuilder::new(&layout, &config.network).build();
            println!("{}", serde_json::to_string_pretty(&runtime_config)?);
            Ok(())
        }
    }
}

fn log_binaries(config: &Config) {
    tracing::info!(
        runtime = %config.runtime_binary().display(),
        tool = %config.tool_binary().display(),
        root = %config.sandbox.root.display(),
        "Using binaries"
    );
}

fn check_report(report: &SuiteReport) -> Result<()> {
    if report.all_passed() {
        Ok(())
    } else {
        Err(Error::TestAssertion(format!(
            "{} of {} scenarios failed",
            report.failed(),
            report.results.len()
        )))
    }
}

//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::common::config::Overrides;

/// Options shared by every command
#[derive(Args, Debug, Default)]
pub struct GlobalOptions {
    /// Harness configuration file (default: the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the runtime daemon
    #[arg(long, global = true)]
    pub runtime: Option<PathBuf>,

    /// Path to the management tool
    #[arg(long, global = true)]
    pub tool: Option<PathBuf>,

    /// Sandbox root; deleted and recreated for every scenario
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Locator port written into the runtime config
    #[arg(long, global = true)]
    pub port: Option<u16>,
}

impl GlobalOptions {
    /// Overrides to apply on top of the configuration file
    ///
    /// A relative sandbox root is anchored at the current directory.
    pub fn overrides(&self) -> std::io::Result<Overrides> {
        let root = match &self.root {
            Some(root) if root.is_relative() => Some(std::env::current_dir()?.join(root)),
            other => other.clone(),
        };
        Ok(Overrides {
            runtime: self.runtime.clone(),
            tool: self.tool.clone(),
            root,
            locator_port: self.port,
        })
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the built-in functional suite
    Run {
        /// Only run scenarios whose name contains this text
        #[arg(long, short)]
        filter: Option<String>,

        /// Verbose output
        #[arg(long, short)]
        verbose: bool,
    },

    /// Execute test scenarios defined in YAML files
    Test {
        /// Paths to YAML test scenario files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Verbose output
        #[arg(long, short)]
        verbose: bool,
    },

    /// List the built-in scenarios
    List,

    /// Print the runtime configuration a scenario would start with
    Config,
}

impl Commands {
    pub fn verbose(&self) -> bool {
        match self {
            Commands::Run { verbose, .. } | Commands::Test { verbose, .. } => *verbose,
            Commands::List | Commands::Config => false,
        }
    }
}

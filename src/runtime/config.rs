//! Runtime configuration document
//!
//! Builds the JSON configuration the runtime daemon reads at startup. The
//! document always carries both logging schemas: `logging` for current
//! daemons and `loggers` for older ones.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::common::config::NetworkConfig;
use crate::common::paths::SandboxLayout;
use crate::common::Result;

/// Configuration schema version understood by the runtime
pub const CONFIG_VERSION: u32 = 2;

/// Sink every logger writes to
pub const LOG_SINK: &str = "/dev/stdout";

/// Log verbosity for the runtime
pub const LOG_VERBOSITY: &str = "info";

/// Log line format of the string formatter
pub const LOG_FORMAT: &str = "[%(time)s] [%(level)s] %(source)s: %(message)s";

/// The runtime configuration document
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RuntimeConfig {
    pub version: u32,
    pub paths: RuntimePaths,
    pub locator: Locator,
    pub services: BTreeMap<String, Component>,
    pub storages: BTreeMap<String, Component>,
    pub logging: BTreeMap<String, Logger>,
    /// Old style logging config
    pub loggers: BTreeMap<String, Component>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RuntimePaths {
    pub plugins: PathBuf,
    pub runtime: PathBuf,
    pub spool: PathBuf,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Locator {
    pub port: u16,
}

/// A named service, storage or legacy logger: `{type, args}`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Component {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

impl Component {
    fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            args: None,
        }
    }

    fn with_args(kind: &str, args: Value) -> Self {
        Self {
            kind: kind.to_string(),
            args: Some(args),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Logger {
    pub formatter: Formatter,
    pub handler: Handler,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Formatter {
    #[serde(rename = "type")]
    pub kind: String,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Handler {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    pub verbosity: String,
}

/// Builds a [`RuntimeConfig`] rooted in one sandbox
pub struct ConfigBuilder<'a> {
    layout: &'a SandboxLayout,
    network: &'a NetworkConfig,
}

impl<'a> ConfigBuilder<'a> {
    pub fn new(layout: &'a SandboxLayout, network: &'a NetworkConfig) -> Self {
        Self { layout, network }
    }

    pub fn build(&self) -> RuntimeConfig {
        let mut services = BTreeMap::new();
        services.insert("logging".to_string(), Component::new("logging"));
        services.insert("storage".to_string(), Component::new("storage"));
        services.insert(
            "node".to_string(),
            Component::with_args(
                "node",
                json!({
                    "announce": [format!("tcp://*:{}", self.network.announce_port)],
                    "announce-interval": self.network.announce_interval_secs,
                    "runlist": self.network.default_runlist,
                }),
            ),
        );

        let mut storages = BTreeMap::new();
        storages.insert(
            "core".to_string(),
            Component::with_args(
                "files",
                json!({ "path": self.layout.storage.display().to_string() }),
            ),
        );

        let mut logging = BTreeMap::new();
        logging.insert(
            "core".to_string(),
            Logger {
                formatter: Formatter {
                    kind: "string".to_string(),
                    format: LOG_FORMAT.to_string(),
                },
                handler: Handler {
                    kind: "files".to_string(),
                    path: LOG_SINK.to_string(),
                    verbosity: LOG_VERBOSITY.to_string(),
                },
            },
        );

        let mut loggers = BTreeMap::new();
        loggers.insert(
            "core".to_string(),
            Component::with_args(
                "files",
                json!({ "path": LOG_SINK, "verbosity": LOG_VERBOSITY }),
            ),
        );

        RuntimeConfig {
            version: CONFIG_VERSION,
            paths: RuntimePaths {
                plugins: self.layout.plugins.clone(),
                runtime: self.layout.runtime.clone(),
                spool: self.layout.spool.clone(),
            },
            locator: Locator {
                port: self.network.locator_port,
            },
            services,
            storages,
            logging,
            loggers,
        }
    }
}

impl RuntimeConfig {
    /// Serialize the document to `path`
    pub fn write(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

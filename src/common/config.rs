//! Configuration file handling

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::{config_path, default_sandbox_root, SandboxLayout};
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Locations of the runtime daemon and the management tool
    #[serde(default)]
    pub binaries: Binaries,

    /// Sandbox settings
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Ports announced in the runtime configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Management tool invocation settings
    #[serde(default)]
    pub tool: ToolConfig,
}

/// Runtime and tool executables
#[derive(Debug, Deserialize, Clone)]
pub struct Binaries {
    /// Path to the runtime daemon (bare names are looked up in PATH)
    #[serde(default = "default_runtime")]
    pub runtime: PathBuf,

    /// Path to the management tool (bare names are looked up in PATH)
    #[serde(default = "default_tool")]
    pub tool: PathBuf,
}

impl Default for Binaries {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            tool: default_tool(),
        }
    }
}

fn default_runtime() -> PathBuf {
    PathBuf::from("cocaine-runtime")
}

fn default_tool() -> PathBuf {
    PathBuf::from("cocaine-tool")
}

/// Sandbox settings
#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    /// Root directory; removed and recreated for every scenario
    #[serde(default = "default_sandbox_root")]
    pub root: PathBuf,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            root: default_sandbox_root(),
        }
    }
}

/// Network settings written into the runtime configuration
#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Locator (service discovery) port
    #[serde(default = "default_locator_port")]
    pub locator_port: u16,

    /// TCP port the node service announces on
    #[serde(default = "default_announce_port")]
    pub announce_port: u16,

    /// Announce interval in seconds
    #[serde(default = "default_announce_interval")]
    pub announce_interval_secs: u64,

    /// Runlist the node service loads at startup
    #[serde(default = "default_runlist")]
    pub default_runlist: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            locator_port: default_locator_port(),
            announce_port: default_announce_port(),
            announce_interval_secs: default_announce_interval(),
            default_runlist: default_runlist(),
        }
    }
}

fn default_locator_port() -> u16 {
    10053
}
fn default_announce_port() -> u16 {
    5001
}
fn default_announce_interval() -> u64 {
    1
}
fn default_runlist() -> String {
    "default".to_string()
}

/// Timeout settings
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// How long to wait for the runtime to answer the readiness probe
    #[serde(default = "default_readiness")]
    pub readiness_secs: u64,

    /// Delay between readiness probes
    #[serde(default = "default_probe_interval")]
    pub probe_interval_ms: u64,

    /// Upper bound for a single management tool invocation
    #[serde(default = "default_command")]
    pub command_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            readiness_secs: default_readiness(),
            probe_interval_ms: default_probe_interval(),
            command_secs: default_command(),
        }
    }
}

fn default_readiness() -> u64 {
    10
}
fn default_probe_interval() -> u64 {
    100
}
fn default_command() -> u64 {
    30
}

impl Timeouts {
    pub fn readiness(&self) -> Duration {
        Duration::from_secs(self.readiness_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }
}

/// Management tool settings
#[derive(Debug, Deserialize, Clone)]
pub struct ToolConfig {
    /// Extra environment variables for every tool invocation
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Arguments of the no-op call used as the readiness probe
    #[serde(default = "default_probe")]
    pub probe: Vec<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            env: HashMap::new(),
            probe: default_probe(),
        }
    }
}

fn default_probe() -> Vec<String> {
    vec!["app".to_string(), "list".to_string()]
}

/// Command-line overrides applied on top of the file configuration
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub runtime: Option<PathBuf>,
    pub tool: Option<PathBuf>,
    pub root: Option<PathBuf>,
    pub locator_port: Option<u16>,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Apply command-line overrides
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(runtime) = overrides.runtime {
            self.binaries.runtime = runtime;
        }
        if let Some(tool) = overrides.tool {
            self.binaries.tool = tool;
        }
        if let Some(root) = overrides.root {
            self.sandbox.root = root;
        }
        if let Some(port) = overrides.locator_port {
            self.network.locator_port = port;
        }
        self
    }

    /// Sandbox layout derived from the configured root
    pub fn layout(&self) -> SandboxLayout {
        SandboxLayout::new(&self.sandbox.root)
    }

    /// Resolved path to the runtime daemon
    pub fn runtime_binary(&self) -> PathBuf {
        resolve_binary(&self.binaries.runtime)
    }

    /// Resolved path to the management tool
    pub fn tool_binary(&self) -> PathBuf {
        resolve_binary(&self.binaries.tool)
    }
}

/// Resolve a bare program name through PATH
///
/// Paths with a directory component are returned unchanged; so is a bare
/// name that PATH does not know, leaving the failure to the spawn.
pub fn resolve_binary(program: &Path) -> PathBuf {
    if program.components().count() > 1 || program.is_absolute() {
        return program.to_path_buf();
    }
    which::which(program).unwrap_or_else(|_| program.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.network.locator_port, 10053);
        assert_eq!(config.network.announce_port, 5001);
        assert_eq!(config.network.default_runlist, "default");
        assert_eq!(config.timeouts.readiness_secs, 10);
        assert_eq!(config.tool.probe, vec!["app", "list"]);
        assert_eq!(config.binaries.tool, PathBuf::from("cocaine-tool"));
    }

    #[test]
    fn test_parse_partial_file() {
        let config = Config::parse(
            r#"
[binaries]
runtime = "/opt/cocaine/bin/cocaine-runtime"

[network]
locator_port = 20053

[tool.env]
COCAINE_TOOL_PORT = "20053"
"#,
        )
        .unwrap();

        assert_eq!(
            config.binaries.runtime,
            PathBuf::from("/opt/cocaine/bin/cocaine-runtime")
        );
        assert_eq!(config.binaries.tool, PathBuf::from("cocaine-tool"));
        assert_eq!(config.network.locator_port, 20053);
        assert_eq!(config.network.announce_port, 5001);
        assert_eq!(config.tool.env.get("COCAINE_TOOL_PORT").unwrap(), "20053");
    }

    #[test]
    fn test_parse_invalid() {
        let err = Config::parse("[network]\nlocator_port = \"not a port\"").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_overrides_win() {
        let config = Config::default().with_overrides(Overrides {
            tool: Some(PathBuf::from("/usr/local/bin/cocaine-tool")),
            root: Some(PathBuf::from("/var/tmp/sandbox")),
            locator_port: Some(12345),
            ..Default::default()
        });
        assert_eq!(config.binaries.tool, PathBuf::from("/usr/local/bin/cocaine-tool"));
        assert_eq!(config.binaries.runtime, PathBuf::from("cocaine-runtime"));
        assert_eq!(config.layout().root, PathBuf::from("/var/tmp/sandbox"));
        assert_eq!(config.network.locator_port, 12345);
    }

    #[test]
    fn test_resolve_binary_keeps_paths() {
        assert_eq!(
            resolve_binary(Path::new("/opt/tool")),
            PathBuf::from("/opt/tool")
        );
        assert_eq!(
            resolve_binary(Path::new("./bin/tool")),
            PathBuf::from("./bin/tool")
        );
        assert_eq!(
            resolve_binary(Path::new("surely-not-installed-anywhere")),
            PathBuf::from("surely-not-installed-anywhere")
        );
    }
}

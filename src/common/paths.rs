//! Configuration paths and the sandbox directory layout
//!
//! All per-test filesystem state lives under a single sandbox root so that
//! teardown is one recursive removal.

use std::path::{Path, PathBuf};

/// Name used for the configuration directory
const APP_NAME: &str = "cocaine-harness";

/// Directory layout of one sandbox, mirroring an installed runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLayout {
    pub root: PathBuf,
    pub plugins: PathBuf,
    pub runtime: PathBuf,
    pub spool: PathBuf,
    pub storage: PathBuf,
    pub config_file: PathBuf,
    pub log_file: PathBuf,
}

impl SandboxLayout {
    /// Derive the layout for the given root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            plugins: root.join("usr/lib/cocaine"),
            runtime: root.join("var/run/cocaine"),
            spool: root.join("var/spool/cocaine"),
            storage: root.join("var/lib/cocaine"),
            config_file: root.join("config.json"),
            log_file: root.join("runtime.log"),
            root,
        }
    }

    /// Directories that must exist before the runtime starts
    pub fn directories(&self) -> [&Path; 5] {
        [
            &self.root,
            &self.plugins,
            &self.runtime,
            &self.spool,
            &self.storage,
        ]
    }

    /// Create every directory of the layout
    pub fn create(&self) -> std::io::Result<()> {
        for dir in self.directories() {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Default sandbox root: `<tmp>/cocaine-harness`
pub fn default_sandbox_root() -> PathBuf {
    std::env::temp_dir().join(APP_NAME)
}

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/cocaine-harness/`
/// - macOS: `~/Library/Application Support/cocaine-harness/`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_rooted() {
        let layout = SandboxLayout::new("/tmp/sandbox");
        for dir in layout.directories() {
            assert!(dir.starts_with("/tmp/sandbox"));
        }
        assert_eq!(layout.spool, PathBuf::from("/tmp/sandbox/var/spool/cocaine"));
        assert_eq!(layout.config_file, PathBuf::from("/tmp/sandbox/config.json"));
    }

    #[test]
    fn test_layout_create() {
        let dir = tempfile::tempdir().unwrap();
        let layout = SandboxLayout::new(dir.path().join("root"));
        layout.create().unwrap();
        for dir in layout.directories() {
            assert!(dir.is_dir(), "{} missing", dir.display());
        }
    }

    #[test]
    fn test_config_dir_is_valid() {
        let dir = config_dir();
        assert!(dir.is_some());
    }
}

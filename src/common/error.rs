//! Error types for the harness
//!
//! Only harness-level failures live here. A management CLI call that exits
//! nonzero is a recorded outcome, never an `Error`.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Sandbox/Runtime Errors ===
    #[error("Invalid sandbox root '{0}': refusing to manage it")]
    Sandbox(String),

    #[error("Failed to prepare sandbox '{}': {source}", path.display())]
    SandboxIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Runtime did not become ready within {0} seconds")]
    RuntimeNotReady(u64),

    #[error("Runtime exited during startup with code {0:?}")]
    RuntimeExited(Option<i32>),

    // === Fixture Errors ===
    #[error("Failed to write fixture '{}': {source}", path.display())]
    FixtureIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to build package: {0}")]
    Archive(String),

    // === Timeout Errors ===
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Test Errors ===
    #[error("Test assertion failed: {0}")]
    TestAssertion(String),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a launch error for the given program
    pub fn launch(program: impl Into<String>, source: io::Error) -> Self {
        Self::Launch {
            program: program.into(),
            source,
        }
    }

    /// Create a sandbox preparation error for the given path
    pub fn sandbox_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::SandboxIo {
            path: path.into(),
            source,
        }
    }

    /// Create a fixture IO error for the given path
    pub fn fixture_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FixtureIo {
            path: path.into(),
            source,
        }
    }

    /// Whether this error happened before any assertion could run
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Error::Sandbox(_)
                | Error::SandboxIo { .. }
                | Error::Launch { .. }
                | Error::RuntimeNotReady(_)
                | Error::RuntimeExited(_)
                | Error::FixtureIo { .. }
                | Error::Archive(_)
        )
    }
}

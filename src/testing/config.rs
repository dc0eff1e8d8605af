//! Test scenario configuration types
//!
//! Defines the data structures for deserializing YAML test scenarios.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::common::canonicalize;
use crate::tool::CommandInvocation;

/// Placeholders that require the scenario fixture
const FIXTURE_PLACEHOLDERS: [&str; 3] = ["{manifest}", "{package}", "{executable}"];

/// A complete test scenario loaded from a YAML file
#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    /// Name of the test scenario
    pub name: String,
    /// Optional description of what the test verifies
    pub description: Option<String>,
    /// Objects registered before the steps run; their output is not checked
    #[serde(default)]
    pub setup: Vec<SetupStep>,
    /// The sequence of tool invocations to execute and check
    pub steps: Vec<TestStep>,
}

impl TestScenario {
    /// Whether the scenario uses the application package fixture
    pub fn needs_fixture(&self) -> bool {
        self.setup
            .iter()
            .any(|s| matches!(s, SetupStep::UploadApp { .. }))
            || self.steps.iter().any(|step| {
                step.args
                    .iter()
                    .any(|arg| FIXTURE_PLACEHOLDERS.iter().any(|p| arg.contains(p)))
            })
    }
}

/// A setup action that runs before the test steps
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SetupStep {
    /// Upload the scenario fixture as an application
    UploadApp { name: String },
    /// Upload a profile isolating into the sandbox spool
    UploadProfile { name: String },
    /// Upload a runlist
    UploadRunlist {
        name: String,
        #[serde(default = "default_runlist")]
        runlist: String,
    },
}

fn default_runlist() -> String {
    "{}".to_string()
}

/// A single tool invocation and what it must produce
#[derive(Deserialize, Debug, Clone)]
pub struct TestStep {
    /// Tool arguments; may contain `{manifest}`, `{package}`, `{executable}`,
    /// `{spool}` and `{root}`
    pub args: Vec<String>,
    /// Expectations for the invocation
    #[serde(default)]
    pub expect: Expectation,
}

/// Expectations for an invocation
///
/// `stdout`/`stderr` are compared byte for byte. The `_canonical` variants
/// strip all whitespace from both the expected and the actual text first.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Expectation {
    /// Expected exit code
    pub code: Option<i32>,
    /// Expected exact stdout
    pub stdout: Option<String>,
    /// Expected exact stderr
    pub stderr: Option<String>,
    /// Expected stdout, whitespace-insensitive
    pub stdout_canonical: Option<String>,
    /// Expected stderr, whitespace-insensitive
    pub stderr_canonical: Option<String>,
}

impl Expectation {
    /// Check an invocation, describing the first mismatch
    pub fn verify(&self, invocation: &CommandInvocation) -> Result<(), String> {
        if let Some(code) = self.code {
            if invocation.code != code {
                return Err(format!(
                    "expected exit code {}, got {}",
                    code, invocation.code
                ));
            }
        }

        check_exact("stdout", self.stdout.as_deref(), &invocation.stdout)?;
        check_exact("stderr", self.stderr.as_deref(), &invocation.stderr)?;
        check_canonical(
            "stdout",
            self.stdout_canonical.as_deref(),
            &invocation.stdout,
        )?;
        check_canonical(
            "stderr",
            self.stderr_canonical.as_deref(),
            &invocation.stderr,
        )?;

        Ok(())
    }
}

fn check_exact(stream: &str, expected: Option<&str>, actual: &str) -> Result<(), String> {
    match expected {
        Some(expected) if expected != actual => Err(format!(
            "{} mismatch. Expected: {:?}, got: {:?}",
            stream, expected, actual
        )),
        _ => Ok(()),
    }
}

fn check_canonical(stream: &str, expected: Option<&str>, actual: &str) -> Result<(), String> {
    match expected {
        Some(expected) if canonicalize(expected) != canonicalize(actual) => Err(format!(
            "{} mismatch (ignoring whitespace). Expected: {:?}, got: {:?}",
            stream,
            canonicalize(expected),
            canonicalize(actual)
        )),
        _ => Ok(()),
    }
}

/// Values substituted into step arguments
#[derive(Debug, Clone, Default)]
pub struct Placeholders {
    pub manifest: Option<PathBuf>,
    pub package: Option<PathBuf>,
    pub executable: Option<PathBuf>,
    pub spool: PathBuf,
    pub root: PathBuf,
}

impl Placeholders {
    pub fn substitute(&self, arg: &str) -> String {
        let mut out = arg.to_string();
        let pairs: [(&str, Option<&Path>); 5] = [
            ("{manifest}", self.manifest.as_deref()),
            ("{package}", self.package.as_deref()),
            ("{executable}", self.executable.as_deref()),
            ("{spool}", Some(self.spool.as_path())),
            ("{root}", Some(self.root.as_path())),
        ];
        for (placeholder, value) in pairs {
            if let Some(value) = value {
                out = out.replace(placeholder, &value.display().to_string());
            }
        }
        out
    }
}

//! Management tool invocation
//!
//! Runs the management CLI as a short-lived child process and records its
//! exit code and both output streams. A nonzero exit is a normal,
//! assertable outcome; only a failure to spawn the binary is an error.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command as TokioCommand;

use crate::common::config::Config;
use crate::common::{canonicalize, Error, Result};

/// One completed management tool execution
///
/// Output is decoded as UTF-8 with invalid sequences replaced by U+FFFD,
/// so exact comparisons are byte-exact only for UTF-8 output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub argv: Vec<String>,
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandInvocation {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// stdout with all whitespace removed
    pub fn stdout_canonical(&self) -> String {
        canonicalize(&self.stdout)
    }

    /// stderr with all whitespace removed
    pub fn stderr_canonical(&self) -> String {
        canonicalize(&self.stderr)
    }
}

impl fmt::Display for CommandInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "`{}` exited with {}\nstdout: {:?}\nstderr: {:?}",
            self.argv.join(" "),
            self.code,
            self.stdout,
            self.stderr
        )
    }
}

/// Spawns the management tool
#[derive(Debug, Clone)]
pub struct ToolRunner {
    program: PathBuf,
    env: HashMap<String, String>,
    timeout: Duration,
}

impl ToolRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            env: HashMap::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Runner configured from the harness configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.tool_binary())
            .with_env(config.tool.env.clone())
            .with_timeout(config.timeouts.command())
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run the tool with `argv` and wait for it to exit
    pub async fn run<S: AsRef<str>>(&self, argv: &[S]) -> Result<CommandInvocation> {
        let argv: Vec<String> = argv.iter().map(|a| a.as_ref().to_string()).collect();
        tracing::debug!(program = %self.program.display(), ?argv, "Running tool");

        let child = TokioCommand::new(&self.program)
            .args(&argv)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::launch(self.program.display().to_string(), e))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                tracing::warn!(?argv, "Tool did not exit in time, killed");
                return Err(Error::Timeout(self.timeout));
            }
        };

        let invocation = CommandInvocation {
            argv,
            code: exit_code(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(code = invocation.code, "Tool exited");

        Ok(invocation)
    }
}

/// Exit code of a finished child; `128 + signal` when it was killed
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell() -> ToolRunner {
        ToolRunner::new("/bin/sh")
    }

    #[tokio::test]
    async fn test_captures_streams_verbatim() {
        let invocation = shell()
            .run(&["-c", "printf 'out\\n'; printf 'Uploading \"x\"... OK\\n' >&2"])
            .await
            .unwrap();

        assert_eq!(invocation.code, 0);
        assert!(invocation.success());
        assert_eq!(invocation.stdout, "out\n");
        assert_eq!(invocation.stderr, "Uploading \"x\"... OK\n");
        assert_eq!(invocation.argv[0], "-c");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let invocation = shell()
            .run(&["-c", "echo 'Error occurred' >&2; exit 1"])
            .await
            .unwrap();

        assert_eq!(invocation.code, 1);
        assert!(!invocation.success());
        assert_eq!(invocation.stdout, "");
        assert_eq!(invocation.stderr, "Error occurred\n");
    }

    #[tokio::test]
    async fn test_signal_exit_code() {
        let invocation = shell().run(&["-c", "kill -9 $$"]).await.unwrap();
        assert_eq!(invocation.code, 128 + libc::SIGKILL);
    }

    #[tokio::test]
    async fn test_env_is_passed() {
        let mut env = HashMap::new();
        env.insert("COCAINE_TOOL_PORT".to_string(), "20053".to_string());
        let invocation = shell()
            .with_env(env)
            .run(&["-c", "printf %s \"$COCAINE_TOOL_PORT\""])
            .await
            .unwrap();
        assert_eq!(invocation.stdout, "20053");
    }

    #[tokio::test]
    async fn test_missing_binary_is_launch_error() {
        let err = ToolRunner::new("/nonexistent/cocaine-tool")
            .run(&["app", "list"])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Launch { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_timeout() {
        let err = shell()
            .with_timeout(Duration::from_millis(200))
            .run(&["-c", "sleep 5"])
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::Timeout(d) if d == Duration::from_millis(200)),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let invocation = shell().run(&["-c", "printf 'ok\\377'"]).await.unwrap();
        assert_eq!(invocation.stdout, "ok\u{FFFD}");
    }

    #[test]
    fn test_canonical_views() {
        let invocation = CommandInvocation {
            argv: vec!["app".into(), "list".into()],
            code: 0,
            stdout: "[\n    \"test_app\"\n]\n".into(),
            stderr: String::new(),
        };
        assert_eq!(invocation.stdout_canonical(), "[\"test_app\"]");
        assert_eq!(invocation.stderr_canonical(), "");
    }
}

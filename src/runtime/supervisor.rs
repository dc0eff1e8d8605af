//! Runtime daemon supervision
//!
//! One supervisor brackets one scenario: `setup` builds a fresh sandbox,
//! launches the daemon against it and waits until the daemon answers a
//! no-op tool call; `teardown` kills the daemon and removes the sandbox.
//! Teardown also runs on drop, so it happens however the scenario ends.

use std::path::{Component, Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::common::config::{Config, NetworkConfig};
use crate::common::logging::tail_file;
use crate::common::paths::SandboxLayout;
use crate::common::{Error, Result};
use crate::tool::ToolRunner;

use super::config::ConfigBuilder;

/// Lines of the runtime log reported when startup fails
const LOG_TAIL_LINES: usize = 20;

/// Lifecycle of a supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Starting,
    Ready,
    Terminating,
    Stopped,
}

/// The live runtime child process
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Exit code if the process has already exited
    fn exited(&mut self) -> Option<Option<i32>> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.code()),
            _ => None,
        }
    }

    /// Forcefully terminate and reap the process
    fn kill(&mut self) {
        if self.exited().is_some() {
            return;
        }

        match send_kill(self.pid()) {
            Ok(()) => {
                if let Err(e) = self.child.wait() {
                    tracing::debug!(pid = self.pid(), error = %e, "Failed to reap runtime");
                }
            }
            Err(e) => {
                tracing::warn!(pid = self.pid(), error = %e, "Failed to kill runtime");
            }
        }
    }
}

#[cfg(unix)]
fn send_kill(pid: u32) -> std::io::Result<()> {
    // SAFETY: kill(2) is safe to call with any pid and valid signal number.
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        // Already gone.
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn send_kill(_pid: u32) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "forced termination is only supported on unix",
    ))
}

/// Supervises one runtime daemon inside one sandbox
#[derive(Debug)]
pub struct RuntimeSupervisor {
    layout: SandboxLayout,
    network: NetworkConfig,
    runtime: PathBuf,
    probe: ToolRunner,
    probe_args: Vec<String>,
    readiness: Duration,
    probe_interval: Duration,
    state: SupervisorState,
    process: Option<ProcessHandle>,
}

impl RuntimeSupervisor {
    pub fn new(config: &Config) -> Self {
        Self {
            layout: config.layout(),
            network: config.network.clone(),
            runtime: config.runtime_binary(),
            probe: ToolRunner::from_config(config),
            probe_args: config.tool.probe.clone(),
            readiness: config.timeouts.readiness(),
            probe_interval: config.timeouts.probe_interval(),
            state: SupervisorState::Idle,
            process: None,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn layout(&self) -> &SandboxLayout {
        &self.layout
    }

    /// Pid of the live runtime, if any
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().map(ProcessHandle::pid)
    }

    /// Prepare the sandbox, start the runtime and wait until it is ready
    pub async fn setup(&mut self) -> Result<()> {
        if matches!(
            self.state,
            SupervisorState::Starting | SupervisorState::Ready
        ) {
            return Err(Error::Internal(
                "runtime supervisor is already running".to_string(),
            ));
        }
        check_root(&self.layout.root)?;
        self.state = SupervisorState::Starting;

        tracing::info!(root = %self.layout.root.display(), "Cleaning up sandbox");
        remove_sandbox(&self.layout.root)
            .map_err(|e| Error::sandbox_io(&self.layout.root, e))?;

        tracing::info!(root = %self.layout.root.display(), "Preparing sandbox");
        self.layout
            .create()
            .map_err(|e| Error::sandbox_io(&self.layout.root, e))?;

        let config = ConfigBuilder::new(&self.layout, &self.network).build();
        tracing::info!(path = %self.layout.config_file.display(), "Writing runtime config");
        config.write(&self.layout.config_file).map_err(|e| match e {
            Error::Io(source) => Error::sandbox_io(&self.layout.config_file, source),
            other => other,
        })?;

        self.process = Some(self.spawn()?);
        tracing::info!(
            pid = self.pid().unwrap_or_default(),
            runtime = %self.runtime.display(),
            "Started runtime"
        );

        if let Err(e) = self.wait_ready().await {
            if let Some(tail) = tail_file(&self.layout.log_file, LOG_TAIL_LINES) {
                tracing::warn!("Runtime log tail:\n{}", tail);
            }
            return Err(e);
        }

        self.state = SupervisorState::Ready;
        tracing::info!(pid = self.pid().unwrap_or_default(), "Runtime is ready");
        Ok(())
    }

    fn spawn(&self) -> Result<ProcessHandle> {
        let log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.layout.log_file)?;

        let child = Command::new(&self.runtime)
            .arg("-c")
            .arg(&self.layout.config_file)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log))
            .spawn()
            .map_err(|e| Error::launch(self.runtime.display().to_string(), e))?;

        Ok(ProcessHandle { child })
    }

    /// Poll the readiness probe until it succeeds or the deadline passes
    async fn wait_ready(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.readiness;

        loop {
            if let Some(code) = self.process.as_mut().and_then(ProcessHandle::exited) {
                return Err(Error::RuntimeExited(code));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, self.probe.run(&self.probe_args)).await {
                Ok(Ok(invocation)) if invocation.success() => return Ok(()),
                Ok(Ok(invocation)) => {
                    tracing::debug!(code = invocation.code, "Readiness probe failed");
                }
                Ok(Err(e @ Error::Launch { .. })) => return Err(e),
                Ok(Err(e)) => tracing::debug!(error = %e, "Readiness probe failed"),
                Err(_) => {}
            }

            if Instant::now() >= deadline {
                return Err(Error::RuntimeNotReady(self.readiness.as_secs()));
            }
            tokio::time::sleep(self.probe_interval).await;
        }
    }

    /// Kill the runtime and remove the sandbox
    ///
    /// Safe to call in any state and more than once. Failures are logged,
    /// never returned: they cannot change already recorded results.
    pub fn teardown(&mut self) {
        if matches!(self.state, SupervisorState::Idle | SupervisorState::Stopped) {
            return;
        }
        self.state = SupervisorState::Terminating;

        if let Some(mut process) = self.process.take() {
            tracing::info!(pid = process.pid(), "Killing runtime");
            process.kill();
        }

        tracing::info!(root = %self.layout.root.display(), "Removing sandbox");
        if let Err(e) = remove_sandbox(&self.layout.root) {
            tracing::warn!(root = %self.layout.root.display(), error = %e, "Failed to remove sandbox");
        }

        self.state = SupervisorState::Stopped;
    }
}

impl Drop for RuntimeSupervisor {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Refuse sandbox roots that must never be deleted recursively
///
/// `.` and `..` components are rejected outright: `/tmp/..` names the
/// filesystem root even though it has a parent.
fn check_root(root: &Path) -> Result<()> {
    let dotted = root
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::CurDir));
    if !root.is_absolute() || dotted || root.parent().is_none() {
        return Err(Error::Sandbox(root.display().to_string()));
    }
    Ok(())
}

fn remove_sandbox(root: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(root) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::common::config::Overrides;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn config(bin_dir: &Path, root: &Path, runtime: &str, tool: &str) -> Config {
        let mut config = Config::default().with_overrides(Overrides {
            runtime: Some(write_script(bin_dir, "runtime", runtime)),
            tool: Some(write_script(bin_dir, "tool", tool)),
            root: Some(root.to_path_buf()),
            locator_port: None,
        });
        config.timeouts.readiness_secs = 1;
        config.timeouts.probe_interval_ms = 20;
        config
    }

    fn alive(pid: u32) -> bool {
        unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
    }

    #[tokio::test]
    async fn test_setup_and_teardown() {
        let bins = tempfile::tempdir().unwrap();
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("sandbox");
        let config = config(bins.path(), &root, "exec sleep 30", "exit 0");

        let mut supervisor = RuntimeSupervisor::new(&config);
        assert_eq!(supervisor.state(), SupervisorState::Idle);
        supervisor.setup().await.unwrap();
        assert_eq!(supervisor.state(), SupervisorState::Ready);

        let layout = supervisor.layout().clone();
        for dir in layout.directories() {
            assert!(dir.is_dir());
        }
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&layout.config_file).unwrap()).unwrap();
        assert_eq!(written["locator"]["port"], 10053);

        let pid = supervisor.pid().unwrap();
        assert!(alive(pid));

        supervisor.teardown();
        assert_eq!(supervisor.state(), SupervisorState::Stopped);
        assert!(supervisor.pid().is_none());
        assert!(!alive(pid));
        assert!(!root.exists());

        // Second teardown is a no-op.
        supervisor.teardown();
    }

    #[tokio::test]
    async fn test_runtime_receives_config_flag() {
        let bins = tempfile::tempdir().unwrap();
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("sandbox");
        let config = config(
            bins.path(),
            &root,
            "echo \"$1 $2\"; exec sleep 30",
            "exit 0",
        );

        let mut supervisor = RuntimeSupervisor::new(&config);
        supervisor.setup().await.unwrap();

        let expected = format!("-c {}", supervisor.layout().config_file.display());
        let log = std::fs::read_to_string(&supervisor.layout().log_file).unwrap();
        assert_eq!(log.trim(), expected);
    }

    #[tokio::test]
    async fn test_setup_clears_stale_sandbox() {
        let bins = tempfile::tempdir().unwrap();
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("sandbox");
        std::fs::create_dir_all(root.join("var/lib/cocaine/manifests")).unwrap();
        std::fs::write(root.join("var/lib/cocaine/manifests/stale"), "{}").unwrap();

        let config = config(bins.path(), &root, "exec sleep 30", "exit 0");
        let mut supervisor = RuntimeSupervisor::new(&config);
        supervisor.setup().await.unwrap();

        assert!(!root.join("var/lib/cocaine/manifests/stale").exists());
    }

    #[tokio::test]
    async fn test_not_ready_times_out() {
        let bins = tempfile::tempdir().unwrap();
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("sandbox");
        let config = config(bins.path(), &root, "exec sleep 30", "exit 1");

        let mut supervisor = RuntimeSupervisor::new(&config);
        let err = supervisor.setup().await.unwrap_err();
        assert!(matches!(err, Error::RuntimeNotReady(1)), "got {err:?}");

        let pid = supervisor.pid().unwrap();
        drop(supervisor);
        assert!(!alive(pid));
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_runtime_exits_during_startup() {
        let bins = tempfile::tempdir().unwrap();
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("sandbox");
        let config = config(bins.path(), &root, "exit 3", "exit 1");

        let mut supervisor = RuntimeSupervisor::new(&config);
        let err = supervisor.setup().await.unwrap_err();
        assert!(matches!(err, Error::RuntimeExited(Some(3))), "got {err:?}");
        assert!(err.is_setup_failure());
        drop(supervisor);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_unusable_sandbox_is_setup_failure() {
        let bins = tempfile::tempdir().unwrap();
        let base = tempfile::tempdir().unwrap();
        // A regular file where the sandbox's parent directory should be.
        let blocker = base.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let root = blocker.join("sandbox");
        let config = config(bins.path(), &root, "exec sleep 30", "exit 0");

        let mut supervisor = RuntimeSupervisor::new(&config);
        let err = supervisor.setup().await.unwrap_err();
        assert!(matches!(err, Error::SandboxIo { .. }), "got {err:?}");
        assert!(err.is_setup_failure());
        assert!(supervisor.pid().is_none());
        assert!(blocker.is_file());
    }

    #[tokio::test]
    async fn test_missing_runtime_is_launch_error() {
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("sandbox");
        let config = Config::default().with_overrides(Overrides {
            runtime: Some(PathBuf::from("/nonexistent/cocaine-runtime")),
            root: Some(root.clone()),
            ..Default::default()
        });

        let mut supervisor = RuntimeSupervisor::new(&config);
        let err = supervisor.setup().await.unwrap_err();
        assert!(matches!(err, Error::Launch { .. }), "got {err:?}");
        drop(supervisor);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_rejects_dangerous_roots() {
        for root in ["/", "relative/sandbox", "/tmp/..", "/tmp/../", "/tmp/sandbox/.."] {
            let config = Config::default().with_overrides(Overrides {
                root: Some(PathBuf::from(root)),
                ..Default::default()
            });
            let mut supervisor = RuntimeSupervisor::new(&config);
            let err = supervisor.setup().await.unwrap_err();
            assert!(matches!(err, Error::Sandbox(_)), "got {err:?}");
            assert_eq!(supervisor.state(), SupervisorState::Idle);
        }
    }

    #[test]
    fn test_check_root() {
        assert!(check_root(Path::new("/tmp/..")).is_err());
        assert!(check_root(Path::new("/tmp/a/../..")).is_err());
        assert!(check_root(Path::new("/")).is_err());
        assert!(check_root(Path::new("/tmp/cocaine-harness")).is_ok());
        // Interior `.` components are dropped by `Path::components`.
        assert!(check_root(Path::new("/tmp/./cocaine-harness")).is_ok());
    }

    #[test]
    fn test_teardown_without_setup_is_noop() {
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("untouched");
        std::fs::create_dir_all(&root).unwrap();

        let config = Config::default().with_overrides(Overrides {
            root: Some(root.clone()),
            ..Default::default()
        });
        let mut supervisor = RuntimeSupervisor::new(&config);
        supervisor.teardown();
        drop(supervisor);
        assert!(root.exists());
    }
}

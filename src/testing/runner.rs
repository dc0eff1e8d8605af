//! Test runner implementation
//!
//! Executes test scenarios against a freshly booted runtime: every scenario
//! gets its own sandbox, daemon and fixture, all of which are gone before
//! the next scenario starts.

use std::path::Path;

use colored::Colorize;
use serde_json::json;

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::fixture::Fixture;
use crate::runtime::RuntimeSupervisor;
use crate::tool::{CommandInvocation, ToolRunner};

use super::config::{Placeholders, SetupStep, TestScenario, TestStep};

/// Result of a test run
#[derive(Debug)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub steps_run: usize,
    pub steps_total: usize,
    pub error: Option<String>,
}

/// Results of a sequence of scenarios
#[derive(Debug, Default)]
pub struct SuiteReport {
    pub results: Vec<TestResult>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }
}

/// Load a scenario from a YAML file
pub fn load_scenario(path: &Path) -> Result<TestScenario> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read test scenario '{}': {}",
            path.display(),
            e
        ))
    })?;

    parse_scenario(&content)
}

/// Parse a scenario from YAML text
pub fn parse_scenario(content: &str) -> Result<TestScenario> {
    serde_yaml::from_str(content)
        .map_err(|e| Error::Config(format!("Failed to parse test scenario: {}", e)))
}

/// Run scenarios one after another
///
/// A scenario whose setup fails is recorded as failed and the suite moves on.
pub async fn run_suite(config: &Config, scenarios: &[TestScenario], verbose: bool) -> SuiteReport {
    let mut report = SuiteReport::default();

    for scenario in scenarios {
        let result = match run_scenario(config, scenario, verbose).await {
            Ok(result) => result,
            Err(e) => {
                let kind = if e.is_setup_failure() {
                    "setup failed"
                } else {
                    "harness error"
                };
                println!("  {} {}: {}", "✗".red(), kind, e);
                TestResult {
                    name: scenario.name.clone(),
                    passed: false,
                    steps_run: 0,
                    steps_total: scenario.steps.len(),
                    error: Some(format!("{}: {}", kind, e)),
                }
            }
        };
        report.results.push(result);
    }

    print_summary(&report);
    report
}

/// Run a single scenario
///
/// Harness failures (sandbox, runtime launch, readiness, fixture) are
/// returned as `Err`; assertion failures are reported in the `TestResult`.
/// The runtime is torn down in both cases.
pub async fn run_scenario(
    config: &Config,
    scenario: &TestScenario,
    verbose: bool,
) -> Result<TestResult> {
    let steps_total = scenario.steps.len();

    println!(
        "\n{} {}",
        "Running Test:".blue().bold(),
        scenario.name.white().bold()
    );

    if let Some(desc) = &scenario.description {
        println!("  {}", desc.dimmed());
    }

    let mut supervisor = RuntimeSupervisor::new(config);
    supervisor.setup().await?;

    let tool = ToolRunner::from_config(config);
    let layout = supervisor.layout().clone();

    // Declared after the supervisor so it is dropped first.
    let fixture = if scenario.needs_fixture() {
        Some(Fixture::create(&layout.root)?)
    } else {
        None
    };

    let placeholders = Placeholders {
        manifest: fixture.as_ref().map(|f| f.manifest.clone()),
        package: fixture.as_ref().map(|f| f.package.clone()),
        executable: fixture.as_ref().map(|f| f.executable.clone()),
        spool: layout.spool.clone(),
        root: layout.root.clone(),
    };

    // Run setup steps
    if !scenario.setup.is_empty() {
        println!("\n{}", "Setup:".cyan());
        for step in &scenario.setup {
            let invocation = run_setup_step(&tool, step, &placeholders).await?;
            let label = setup_label(step);
            if invocation.success() {
                println!("  {} {}", "✓".green(), label.dimmed());
            } else {
                println!(
                    "  {} {} (exit {})",
                    "!".yellow(),
                    label.dimmed(),
                    invocation.code
                );
            }
            if verbose {
                print_invocation(&invocation);
            }
        }
    }

    // Execute test steps
    println!("\n{}", "Steps:".cyan());

    let mut failure = None;
    for (i, step) in scenario.steps.iter().enumerate() {
        let step_num = i + 1;

        match execute_step(&tool, step, &placeholders, step_num, verbose).await? {
            Ok(()) => {}
            Err(message) => {
                println!("  {} Step {}: {}", "✗".red(), step_num, message);
                failure = Some((step_num, message));
                break;
            }
        }
    }

    // Assertions are done; release the fixture, then the runtime.
    drop(fixture);
    supervisor.teardown();

    if let Some((steps_run, message)) = failure {
        return Ok(TestResult {
            name: scenario.name.clone(),
            passed: false,
            steps_run,
            steps_total,
            error: Some(message),
        });
    }

    println!(
        "\n{} {}\n",
        "✓".green().bold(),
        "Test Passed".green().bold()
    );

    Ok(TestResult {
        name: scenario.name.clone(),
        passed: true,
        steps_run: steps_total,
        steps_total,
        error: None,
    })
}

/// Execute a single test step
///
/// The outer `Result` carries harness failures, the inner one the
/// assertion outcome.
async fn execute_step(
    tool: &ToolRunner,
    step: &TestStep,
    placeholders: &Placeholders,
    step_num: usize,
    verbose: bool,
) -> Result<std::result::Result<(), String>> {
    let args: Vec<String> = step
        .args
        .iter()
        .map(|arg| placeholders.substitute(arg))
        .collect();

    let invocation = tool.run(&args).await?;
    if verbose {
        print_invocation(&invocation);
    }

    let command = step.args.join(" ");
    if let Err(message) = step.expect.verify(&invocation) {
        return Ok(Err(format!("{}: {}", command, message)));
    }

    println!(
        "  {} Step {}: {}",
        "✓".green(),
        step_num,
        command.dimmed()
    );

    Ok(Ok(()))
}

async fn run_setup_step(
    tool: &ToolRunner,
    step: &SetupStep,
    placeholders: &Placeholders,
) -> Result<CommandInvocation> {
    let args: Vec<String> = match step {
        SetupStep::UploadApp { name } => {
            let (Some(manifest), Some(package)) = (&placeholders.manifest, &placeholders.package)
            else {
                return Err(Error::Internal(format!(
                    "no fixture available to upload '{}'",
                    name
                )));
            };
            vec![
                "app".into(),
                "upload".into(),
                "--name".into(),
                name.clone(),
                "--manifest".into(),
                manifest.display().to_string(),
                "--package".into(),
                package.display().to_string(),
            ]
        }
        SetupStep::UploadProfile { name } => vec![
            "profile".into(),
            "upload".into(),
            "--name".into(),
            name.clone(),
            "--profile".into(),
            spool_profile(&placeholders.spool),
        ],
        SetupStep::UploadRunlist { name, runlist } => vec![
            "runlist".into(),
            "upload".into(),
            "--name".into(),
            name.clone(),
            "--runlist".into(),
            runlist.clone(),
        ],
    };

    let invocation = tool.run(&args).await?;
    tracing::debug!(
        code = invocation.code,
        stderr = %invocation.stderr.trim_end(),
        "Setup step finished"
    );
    Ok(invocation)
}

/// Profile isolating applications into the sandbox spool
pub fn spool_profile(spool: &Path) -> String {
    json!({
        "isolate": {
            "args": {
                "spool": spool.display().to_string()
            }
        }
    })
    .to_string()
}

fn setup_label(step: &SetupStep) -> String {
    match step {
        SetupStep::UploadApp { name } => format!("upload app {}", name),
        SetupStep::UploadProfile { name } => format!("upload profile {}", name),
        SetupStep::UploadRunlist { name, .. } => format!("upload runlist {}", name),
    }
}

fn print_invocation(invocation: &CommandInvocation) {
    println!("    $ {}", invocation.argv.join(" ").dimmed());
    println!("    exit: {}", invocation.code);
    if !invocation.stdout.is_empty() {
        println!("    stdout: {}", format!("{:?}", invocation.stdout).dimmed());
    }
    if !invocation.stderr.is_empty() {
        println!("    stderr: {}", format!("{:?}", invocation.stderr).dimmed());
    }
}

fn print_summary(report: &SuiteReport) {
    println!("{}", "Summary:".cyan().bold());
    for result in &report.results {
        if result.passed {
            println!("  {} {}", "✓".green(), result.name);
        } else {
            println!(
                "  {} {} ({}/{} steps): {}",
                "✗".red(),
                result.name,
                result.steps_run,
                result.steps_total,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    println!(
        "\n{} passed, {} failed\n",
        report.passed().to_string().green(),
        report.failed().to_string().red()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spool_profile() {
        let profile: serde_json::Value =
            serde_json::from_str(&spool_profile(Path::new("/s/var/spool/cocaine"))).unwrap();
        assert_eq!(
            profile,
            json!({"isolate": {"args": {"spool": "/s/var/spool/cocaine"}}})
        );
    }

    #[test]
    fn test_parse_scenario_error() {
        let err = parse_scenario("name: [unterminated").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_missing_scenario() {
        let err = load_scenario(Path::new("/nonexistent/scenario.yml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read test scenario"));
    }

    #[test]
    fn test_report_counts() {
        let report = SuiteReport {
            results: vec![
                TestResult {
                    name: "a".into(),
                    passed: true,
                    steps_run: 2,
                    steps_total: 2,
                    error: None,
                },
                TestResult {
                    name: "b".into(),
                    passed: false,
                    steps_run: 1,
                    steps_total: 3,
                    error: Some("stdout mismatch".into()),
                },
            ],
        };
        assert_eq!(report.passed(), 1);
        assert_eq!(report.failed(), 1);
        assert!(!report.all_passed());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scenario_against_scripted_tool() {
        use crate::common::config::Overrides;
        use std::os::unix::fs::PermissionsExt;

        let bins = tempfile::tempdir().unwrap();
        let base = tempfile::tempdir().unwrap();
        let write = |name: &str, body: &str| {
            let path = bins.path().join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        };
        let runtime = write("runtime", "exec sleep 30");
        let tool = write(
            "tool",
            r#"case "$1 $2" in
  "app list") printf '[\n    "test_app"\n]\n' ;;
  "app upload") [ -f "$8" ] && printf 'Uploading "%s"... OK\n' "$4" >&2 ;;
  *) echo "unexpected $*" >&2; exit 2 ;;
esac"#,
        );

        let mut config = Config::default().with_overrides(Overrides {
            runtime: Some(runtime),
            tool: Some(tool),
            root: Some(base.path().join("sandbox")),
            locator_port: None,
        });
        config.timeouts.readiness_secs = 2;
        config.timeouts.probe_interval_ms = 20;

        let scenario = parse_scenario(
            r#"
name: scripted
steps:
  - args: [app, upload, --name, test_app, --manifest, "{manifest}", --package, "{package}"]
    expect:
      code: 0
      stdout: ""
      stderr: "Uploading \"test_app\"... OK\n"
  - args: [app, list]
    expect:
      stdout_canonical: '["test_app"]'
"#,
        )
        .unwrap();

        let result = run_scenario(&config, &scenario, false).await.unwrap();
        assert!(result.passed, "{:?}", result.error);
        assert_eq!(result.steps_run, 2);
        assert!(!base.path().join("sandbox").exists());

        let failing = parse_scenario(
            r#"
name: scripted_failure
steps:
  - args: [app, list]
    expect:
      code: 0
  - args: [profile, list]
    expect:
      code: 0
  - args: [app, list]
"#,
        )
        .unwrap();

        let result = run_scenario(&config, &failing, false).await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.steps_run, 2);
        assert_eq!(
            result.error.as_deref(),
            Some("profile list: expected exit code 0, got 2")
        );
        assert!(!base.path().join("sandbox").exists());
    }
}

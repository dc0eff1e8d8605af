//! Scenario runner
//!
//! Scenarios are YAML documents: a few setup uploads followed by tool
//! invocations with exact expectations on exit code, stdout and stderr.
//! The built-in suite covers the application, profile and runlist
//! lifecycles and both failure paths of `app start`.

mod config;
mod runner;

pub use config::*;
pub use runner::{
    load_scenario, parse_scenario, run_scenario, run_suite, spool_profile, SuiteReport, TestResult,
};

use crate::common::Result;

/// Built-in scenario sources, in execution order
const BUILTIN: [&str; 6] = [
    include_str!("../../scenarios/app_upload_cycle.yml"),
    include_str!("../../scenarios/profile_cycle.yml"),
    include_str!("../../scenarios/runlist_cycle.yml"),
    include_str!("../../scenarios/app_start.yml"),
    include_str!("../../scenarios/app_start_fails_without_app.yml"),
    include_str!("../../scenarios/app_start_fails_without_profile.yml"),
];

/// The built-in suite
pub fn builtin_scenarios() -> Result<Vec<TestScenario>> {
    BUILTIN.iter().map(|source| parse_scenario(source)).collect()
}

/// Built-in scenarios whose name contains `filter`
pub fn select_builtin(filter: Option<&str>) -> Result<Vec<TestScenario>> {
    let scenarios = builtin_scenarios()?;
    Ok(match filter {
        Some(filter) => scenarios
            .into_iter()
            .filter(|s| s.name.contains(filter))
            .collect(),
        None => scenarios,
    })
}

//! Cocaine functional test harness
//!
//! This library boots an isolated runtime daemon, builds application
//! package fixtures and drives the management tool through lifecycle
//! scenarios, asserting exact exit codes and output.

pub mod cli;
pub mod commands;
pub mod common;
pub mod fixture;
pub mod runtime;
pub mod testing;
pub mod tool;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use runtime::{RuntimeSupervisor, SupervisorState};
pub use tool::{CommandInvocation, ToolRunner};

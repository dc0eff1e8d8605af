//! Runtime daemon configuration and supervision

pub mod config;
mod supervisor;

pub use config::{ConfigBuilder, RuntimeConfig};
pub use supervisor::{ProcessHandle, RuntimeSupervisor, SupervisorState};

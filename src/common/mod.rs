//! Common utilities shared by the harness components

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

/// Strip every whitespace character
///
/// Applied to both sides of a canonical comparison so that list output is
/// judged independent of JSON pretty-printing.
pub fn canonicalize(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

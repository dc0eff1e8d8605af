//! Logging and tracing configuration
//!
//! The harness logs its own progress (sandbox preparation, runtime launch,
//! teardown) to stderr so that it never mixes with scenario reports on stdout.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing for the harness CLI
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate (DEBUG with `verbose`), WARN for
/// dependencies.
pub fn init_cli(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("harness=debug,cocaine_harness=debug,warn")
        } else {
            EnvFilter::new("harness=info,cocaine_harness=info,warn")
        }
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();
}

/// Read the last `lines` lines of a log file, if it exists
///
/// Used to surface the runtime's own output when it fails to start.
pub fn tail_file(path: &std::path::Path, lines: usize) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    Some(all[start..].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_file_keeps_last_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.log");
        std::fs::write(&path, "one\ntwo\nthree\nfour\n").unwrap();

        assert_eq!(tail_file(&path, 2).as_deref(), Some("three\nfour"));
        assert_eq!(tail_file(&path, 10).as_deref(), Some("one\ntwo\nthree\nfour"));
    }

    #[test]
    fn test_tail_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(tail_file(&dir.path().join("absent.log"), 5).is_none());
    }
}

//! Tracing setup shared by the dashboard and the command-line tools.
//!
//! Events go to stdout and to the file named by `INSIGHTMED_LOG_FILE`, or
//! `logs/insightmed.log` when it is unset.
use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    sync::OnceLock,
};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_VAR: &str = "INSIGHTMED_LOG_FILE";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "insightmed.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Configure tracing with an `info` default level.
pub fn init_tracing() {
    init_tracing_with_default("info");
}

/// Install the stdout and file layers, filtering by `RUST_LOG` or else `default_level`.
///
/// Calling it again once a subscriber is installed does nothing.
pub fn init_tracing_with_default(default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let file_layer = file_writer().map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact()
    });

    // Err means a global subscriber is already set.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).compact())
        .with(file_layer)
        .try_init();
}

fn log_path(configured: Option<String>) -> PathBuf {
    configured
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(DEFAULT_LOG_DIR).join(DEFAULT_LOG_FILE))
}

fn open_log_file(path: &Path) -> Option<File> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty())
        && let Err(err) = std::fs::create_dir_all(dir)
    {
        eprintln!("Failed to create log directory {}: {err}", dir.display());
        return None;
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}

fn file_writer() -> Option<NonBlocking> {
    let file = open_log_file(&log_path(std::env::var(LOG_FILE_VAR).ok()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    let _ = LOG_GUARD.set(guard);
    Some(writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_or_blank_variable_uses_default_file() {
        let default = Path::new("logs").join("insightmed.log");
        assert_eq!(log_path(None), default);
        assert_eq!(log_path(Some("  ".into())), default);
        assert_eq!(
            log_path(Some("/var/log/insightmed/dashboard.log".into())),
            PathBuf::from("/var/log/insightmed/dashboard.log")
        );
    }

    #[test]
    fn log_file_is_created_with_missing_directories_and_appended() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("run.log");
        std::fs::create_dir_all(path.parent().expect("parent")).expect("dir");
        std::fs::write(&path, "earlier\n").expect("seed");

        assert!(open_log_file(&path).is_some());
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "earlier\n");

        let fresh = dir.path().join("a").join("b").join("new.log");
        assert!(open_log_file(&fresh).is_some());
        assert!(fresh.exists());
    }

    #[test]
    fn unwritable_location_is_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("occupied");
        std::fs::write(&blocker, "not a directory").expect("write");

        assert!(open_log_file(&blocker.join("run.log")).is_none());
    }
}

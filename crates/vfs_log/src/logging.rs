//! Structured logging setup with tracing
//!
//! stdout is reserved for command output, so the console layer writes to
//! stderr.

use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable that overrides the configured filter
pub const LOG_ENV: &str = "EXTVFS_LOG";

/// Flushes the file writer when dropped
#[must_use = "dropping the guard stops the log file writer"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize the logging system
///
/// Falls back to console-only logging when the log directory is not usable.
pub fn init_logging(level: &str) -> anyhow::Result<LogGuard> {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let log_dir = super::log_dir();
    let (writer, guard, file_error) = match std::fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "extvfs.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (Some(non_blocking), Some(guard), None)
        }
        Err(e) => (None, None, Some(e)),
    };
    let file_layer = writer.map(|w| fmt::layer().json().with_writer(w));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file_layer)
        .try_init()?;

    if let Some(e) = file_error {
        tracing::warn!("Log file disabled, cannot create {}: {}", log_dir.display(), e);
    }

    tracing::debug!("Logging initialized");
    Ok(LogGuard { _file: guard })
}

/// Clean up log files older than specified days
pub fn cleanup_old_logs(days: u32) -> anyhow::Result<usize> {
    cleanup_logs_in(&super::log_dir(), days)
}

fn cleanup_logs_in(log_dir: &Path, days: u32) -> anyhow::Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let threshold = SystemTime::now() - Duration::from_secs(days as u64 * 24 * 60 * 60);
    let mut deleted = 0;

    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();

        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("extvfs.log"));
        if !is_log {
            continue;
        }

        let expired = entry
            .metadata()
            .and_then(|m| m.modified())
            .is_ok_and(|modified| modified < threshold);

        if expired && std::fs::remove_file(&path).is_ok() {
            deleted += 1;
            tracing::debug!("Deleted old log: {:?}", path);
        }
    }

    if deleted > 0 {
        tracing::info!("Cleaned up {} old log files", deleted);
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cleanup_missing_dir() {
        assert_eq!(cleanup_logs_in(Path::new("/nonexistent/extvfs/logs"), 7).unwrap(), 0);
    }

    #[test]
    fn test_cleanup_keeps_recent_and_foreign_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("extvfs.log.2026-10-01"), b"{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep").unwrap();

        assert_eq!(cleanup_logs_in(dir.path(), 30).unwrap(), 0);
        assert!(dir.path().join("extvfs.log.2026-10-01").exists());
        assert!(dir.path().join("notes.txt").exists());
    }
}

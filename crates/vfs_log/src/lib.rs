//! extvfs Logging & Observability Module
//!
//! Console logging on stderr, a JSON log file, panic reports and deadlock
//! detection for debug builds.

mod logging;
mod panic_hook;

pub use logging::{cleanup_old_logs, init_logging, LogGuard};
pub use panic_hook::init_panic_hook;

use directories::ProjectDirs;
use std::path::PathBuf;

/// Get the log directory
pub fn log_dir() -> PathBuf {
    ProjectDirs::from("io", "extvfs", "extvfs")
        .map(|dirs| dirs.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("./logs"))
}

/// Initialize all observability features
///
/// `level` is the fallback filter when `EXTVFS_LOG` is unset.
pub fn init(level: &str) -> anyhow::Result<LogGuard> {
    let guard = init_logging(level)?;
    init_panic_hook();

    #[cfg(debug_assertions)]
    init_deadlock_detector();

    Ok(guard)
}

#[cfg(debug_assertions)]
fn init_deadlock_detector() {
    use std::thread;
    use std::time::Duration;

    thread::spawn(|| loop {
        thread::sleep(Duration::from_secs(10));
        let deadlocks = parking_lot::deadlock::check_deadlock();
        if deadlocks.is_empty() {
            continue;
        }

        tracing::error!("Deadlock detected!");
        for (i, threads) in deadlocks.iter().enumerate() {
            tracing::error!("Deadlock #{}", i);
            for t in threads {
                tracing::error!("Thread Id {:#?}", t.thread_id());
                tracing::error!("{:#?}", t.backtrace());
            }
        }
    });
}

//! Panic hook for crash reporting

use backtrace::Backtrace;
use chrono::Local;
use std::panic::PanicHookInfo;

/// Initialize the panic hook for crash reporting
pub fn init_panic_hook() {
    std::panic::set_hook(Box::new(panic_handler));
    tracing::debug!("Panic hook initialized");
}

fn panic_handler(info: &PanicHookInfo) {
    let backtrace = Backtrace::new();
    let thread = std::thread::current();
    let thread_name = thread.name().unwrap_or("<unnamed>");

    let payload = info
        .payload()
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| info.payload().downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<unknown>");

    let report = format!(
        "=== extvfs PANIC ===\n\
         Timestamp: {}\n\
         Thread: {}\n\
         Location: {:?}\n\
         Payload: {}\n\n\
         Stack Trace:\n{:?}",
        Local::now().to_rfc3339(),
        thread_name,
        info.location(),
        payload,
        backtrace
    );

    // stderr first; the subscriber may already be gone
    eprintln!("{}", report);
    tracing::error!("{}", report);

    let dump_filename = format!("extvfs_crash_{}.txt", Local::now().format("%Y%m%d_%H%M%S"));
    let dump_path = std::env::temp_dir().join(&dump_filename);

    match std::fs::write(&dump_path, &report) {
        Ok(()) => eprintln!("Crash report written to {}", dump_path.display()),
        Err(e) => eprintln!("Failed to write crash dump: {}", e),
    }
}

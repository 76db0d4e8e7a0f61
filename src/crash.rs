//! Crash diagnostics
//!
//! Installs a panic hook that writes a timestamped report with a full
//! backtrace to a dedicated crash log, flushed synchronously so it survives
//! process termination.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Global crash log file path, set during initialization
static CRASH_LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

const CRASH_LOG_FILENAME: &str = "crash.log";

/// Initialize crash handling. Call this early in main().
///
/// Returns the path to the crash log file.
pub fn init_crash_handler(log_dir: &std::path::Path) -> std::io::Result<PathBuf> {
    let crash_log_path = log_dir.join(CRASH_LOG_FILENAME);

    // Store path globally for the panic hook
    let _ = CRASH_LOG_PATH.set(crash_log_path.clone());

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic payload".to_string()
        };

        let location = if let Some(loc) = panic_info.location() {
            format!("{}:{}:{}", loc.file(), loc.line(), loc.column())
        } else {
            "unknown location".to_string()
        };

        let backtrace = std::backtrace::Backtrace::force_capture();

        let separator = "=".repeat(80);
        let report = format!(
            "\n{sep}\n\
             PANIC at {ts}\n\
             {sep}\n\
             Location: {loc}\n\
             Message: {msg}\n\
             \n\
             Backtrace:\n\
             {bt}\n\
             {sep}\n",
            sep = separator,
            ts = timestamp,
            loc = location,
            msg = message,
            bt = backtrace
        );

        // Write to the crash log synchronously
        if let Some(path) = CRASH_LOG_PATH.get() {
            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
                let _ = file.write_all(report.as_bytes());
                let _ = file.flush();
                let _ = file.sync_all();
            }
        }

        default_hook(panic_info);
    }));

    Ok(crash_log_path)
}

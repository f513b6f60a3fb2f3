//! Logging sink initialization.
//!
//! Thin wrapper over `env_logger`, driven by the `log_level` / `log_file`
//! configuration keys. SIGUSR1/SIGUSR2 (spec.md §4.10) call [`reset`] to
//! re-read the level and re-open the log file.

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use log::LevelFilter;

use crate::config::Config;

fn level_from(log_level: u8) -> LevelFilter {
    match log_level {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        _ => LevelFilter::Trace,
    }
}

static LOG_FILE: Mutex<Option<std::fs::File>> = Mutex::new(None);

/// Initializes the global logger from the configuration. Idempotent-ish:
/// calling twice will only have an effect the first time `env_logger`'s
/// global logger is installed, matching `log`'s own one-shot contract.
pub fn init(config: &Config) {
    open_log_file(config);
    let level = level_from(config.log_level);
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    let _ = builder.try_init();
}

/// Re-reads `log_level`/`log_file` without reinstalling the logger (the
/// `log` facade only allows a single global logger). Used on SIGUSR1/2.
pub fn reset(config: &Config) {
    open_log_file(config);
    log::set_max_level(level_from(config.log_level));
}

fn open_log_file(config: &Config) {
    let mut guard = LOG_FILE.lock().unwrap();
    *guard = config.log_file.as_ref().and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
}

/// Writes a line directly to the configured log file, bypassing `log`, for
/// startup messages emitted before the logger is initialized.
pub fn write_startup_line(line: &str) {
    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(file) = guard.as_mut() {
            let _ = writeln!(file, "{line}");
            return;
        }
    }
    eprintln!("{line}");
}

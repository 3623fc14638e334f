//! This module contains the global logger instance used by the `log` crate.
//!
//! Records are written to stderr, so that they never mix with command output.

use std::io::Write as _;

/// Environment variable holding the maximum level to log.
pub const LEVEL_ENV_VAR: &str = "FATIMG_LOG";

const DEFAULT_LEVEL: log::LevelFilter = log::LevelFilter::Warn;

/// The logger instance used for the `log` crate.
pub static LOGGER: StderrLogger = StderrLogger;

pub struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            // Nowhere left to report a failing stderr.
            let _ = writeln!(std::io::stderr().lock(), "{}", format_record(record));
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Formats a record as `[LEVEL] target: message`.
fn format_record(record: &log::Record) -> String {
    format!(
        "[{:5}] {}: {}",
        record.level(),
        record.target(),
        record.args()
    )
}

/// Parses a level name such as `debug` or `off`, falling back to `warn`.
fn parse_level(value: Option<&str>) -> log::LevelFilter {
    value
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(DEFAULT_LEVEL)
}

pub fn init() {
    let level = parse_level(std::env::var(LEVEL_ENV_VAR).ok().as_deref());
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

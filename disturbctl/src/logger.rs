use flexi_logger::{DeferredNow, FlexiLoggerError, Logger, LoggerHandle};
use log::Record;
use std::io::Write;

/// Initializes the logger. Output goes to stderr so the JSON reports on
/// stdout stay machine readable.
pub fn init_logger() -> Result<LoggerHandle, FlexiLoggerError> {
    Logger::try_with_env_or_str("disturbctl=info")?
        .format(log_format)
        .start()
}

/// One line per record: time, level, source location, message. The binary
/// runs everything on the main thread, so no thread field.
fn log_format(w: &mut dyn Write, now: &mut DeferredNow, record: &Record) -> std::io::Result<()> {
    write!(
        w,
        "{} {:<5} {}:{}: {}",
        now.format("%H:%M:%S%.3f"),
        record.level(),
        record.file().unwrap_or("?"),
        record.line().unwrap_or(0),
        record.args()
    )
}

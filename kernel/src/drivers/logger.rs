//! Kernel logger: `log` facade over the serial diagnostic channel.

use log::{Level, LevelFilter, Metadata, Record};

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl log::Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = match record.level() {
            Level::Error => "ERR ",
            Level::Warn => "WARN",
            Level::Info => "OK  ",
            Level::Debug => "DBG ",
            Level::Trace => "TRC ",
        };
        crate::serial_println!("[{}] {}", tag, record.args());
    }

    fn flush(&self) {}
}

fn max_level() -> Level {
    if cfg!(feature = "debug_verbose") {
        Level::Debug
    } else {
        Level::Info
    }
}

/// Install the logger. Called once during early boot; a second call is a
/// no-op (set_logger fails harmlessly).
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(if cfg!(feature = "debug_verbose") {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        });
    }
}

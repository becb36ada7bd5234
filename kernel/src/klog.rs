//! Логгер ядра: бэкенд `log` поверх UART
//! Kernel logger: `log` backend on top of the UART
//!
//! Формат строки / Line format:
//!   [INFO] blipos_kernel::sched: message
//!
//! Уровень режется при компиляции фичами `log_*` крейта ядра; `set_max_level`
//! только повторяет его для рантайм-проверок.
//! The level is cut at compile time by the kernel's `log_*` features;
//! `set_max_level` just mirrors it for runtime checks.

use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::kprintln;

// Цветные префиксы для serial-консоли QEMU / Colored prefixes for the QEMU serial console
const P_ERROR: &str = "\x1b[1;31m[ERROR]\x1b[0m";
const P_WARN:  &str = "\x1b[1;33m[WARN]\x1b[0m ";
const P_INFO:  &str = "\x1b[32m[INFO]\x1b[0m ";
const P_DEBUG: &str = "\x1b[36m[DEBUG]\x1b[0m";
const P_TRACE: &str = "\x1b[35m[TRACE]\x1b[0m";

const fn prefix(level: Level) -> &'static str {
    match level {
        Level::Error => P_ERROR,
        Level::Warn  => P_WARN,
        Level::Info  => P_INFO,
        Level::Debug => P_DEBUG,
        Level::Trace => P_TRACE,
    }
}

struct UartLogger;

impl Log for UartLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            kprintln!("{} {}: {}", prefix(record.level()), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: UartLogger = UartLogger;

/// Установить логгер. Повторный вызов: no-op.
/// Install the logger. A second call is a no-op.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Trace.min(log::STATIC_MAX_LEVEL));
    }
}

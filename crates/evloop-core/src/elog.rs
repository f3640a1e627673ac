//! Leveled logging to stderr.
//!
//! The reactor runs callbacks on its own threads, so logging must be safe to
//! call from anywhere without holding library locks. Each line is written
//! under the stderr lock and nothing else.
//!
//! Runtime control:
//! - `EVLOOP_LOG` selects the level by name (`error`, `warn`, `info`,
//!   `debug`, `trace`) or number (0-5). Default is `info`.
//! - `EVLOOP_LOG_FLUSH=1` flushes stderr after every line, useful when
//!   stderr is redirected to a file.

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Log severity, ordered from most to least severe.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

impl LogLevel {
    pub fn from_u8(v: u8) -> LogLevel {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Parse a level from a name or a number. Returns `None` for garbage.
    pub fn parse(s: &str) -> Option<LogLevel> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Some(LogLevel::Off),
            "error" | "err" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            other => other.parse::<u8>().ok().map(LogLevel::from_u8),
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR] ",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG] ",
            LogLevel::Trace => "[TRACE] ",
        }
    }
}

/// Read `EVLOOP_LOG` and `EVLOOP_LOG_FLUSH`. Runs at most once; later calls
/// (and calls after `set_level`) are no-ops.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }
    if let Ok(val) = std::env::var("EVLOOP_LOG") {
        if let Some(level) = LogLevel::parse(&val) {
            LOG_LEVEL.store(level as u8, Ordering::SeqCst);
        }
    }
    let flush = crate::env::env_get_bool("EVLOOP_LOG_FLUSH", false);
    FLUSH_ENABLED.store(flush, Ordering::SeqCst);
}

/// Override the level programmatically, bypassing the environment.
pub fn set_level(level: LogLevel) {
    INITIALIZED.store(true, Ordering::SeqCst);
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
}

pub fn level() -> LogLevel {
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// True when a message at `level` would be emitted.
pub fn enabled(level: LogLevel) -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    level != LogLevel::Off && (level as u8) <= LOG_LEVEL.load(Ordering::Relaxed)
}

#[doc(hidden)]
pub fn log(level: LogLevel, args: fmt::Arguments<'_>) {
    if !enabled(level) {
        return;
    }
    let stderr = std::io::stderr();
    let mut out = stderr.lock();
    let _ = out.write_fmt(format_args!("{}{}\n", level.prefix(), args));
    if FLUSH_ENABLED.load(Ordering::Relaxed) {
        let _ = out.flush();
    }
}

#[macro_export]
macro_rules! eerror {
    ($($arg:tt)*) => {
        $crate::elog::log($crate::elog::LogLevel::Error, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! ewarn {
    ($($arg:tt)*) => {
        $crate::elog::log($crate::elog::LogLevel::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! einfo {
    ($($arg:tt)*) => {
        $crate::elog::log($crate::elog::LogLevel::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! edebug {
    ($($arg:tt)*) => {
        $crate::elog::log($crate::elog::LogLevel::Debug, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! etrace {
    ($($arg:tt)*) => {
        $crate::elog::log($crate::elog::LogLevel::Trace, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Error < LogLevel::Trace);
        assert!((LogLevel::Warn as u8) < (LogLevel::Info as u8));
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(LogLevel::parse("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("WARN"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse(" 3 "), Some(LogLevel::Info));
        assert_eq!(LogLevel::parse("99"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::parse("loud"), None);
    }

    #[test]
    fn test_from_u8_round_trip() {
        for v in 0..=5u8 {
            assert_eq!(LogLevel::from_u8(v) as u8, v);
        }
    }

    #[test]
    fn test_macros_compile() {
        set_level(LogLevel::Off);
        eerror!("e {}", 1);
        ewarn!("w {}", 2);
        einfo!("i {}", 3);
        edebug!("d {}", 4);
        etrace!("t {}", 5);
        set_level(LogLevel::Info);
    }
}

//! Simple logging implementation for Ferrovisor
//!
//! This module provides a minimal logging implementation suitable
//! for a no_std hypervisor environment.

use core::fmt;

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Error level
    Error = 0,
    /// Warning level
    Warn = 1,
    /// Info level
    Info = 2,
    /// Debug level
    Debug = 3,
    /// Trace level
    Trace = 4,
}

impl Level {
    /// Convert level to string
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }
}

/// Get the current log level
pub fn level() -> Level {
    #[cfg(feature = "debug")]
    {
        #[cfg(feature = "verbose")]
        return Level::Trace;

        Level::Debug
    }

    #[cfg(not(feature = "debug"))]
    Level::Info
}

/// Set the log level
pub fn set_level(level: Level) {
    // TODO: Implement log level setting
    // For now, compile-time only
}

/// The sink a log line is handed to once it passes the level filter.
///
/// There is no UART driver in this crate; wiring this to one is the
/// embedding kernel's job. The default sink discards the line, which keeps
/// the macros usable (and their formatting exercised by tests) without
/// pulling in a console implementation.
pub type Sink = fn(Level, fmt::Arguments<'_>, u64);

fn discard_sink(_level: Level, _args: fmt::Arguments<'_>, _timestamp: u64) {}

static mut SINK: Sink = discard_sink;

/// Install a log sink. Not synchronized: call once, during early boot,
/// before any other hart is running.
///
/// # Safety
/// Must not be called concurrently with logging from another hart.
pub unsafe fn set_sink(sink: Sink) {
    SINK = sink;
}

/// Log a message
pub fn log(level: Level, args: fmt::Arguments<'_>) {
    if level <= level() {
        let timestamp = crate::utils::get_timestamp();
        let sink = unsafe { SINK };
        sink(level, args, timestamp);
    }
}

/// Log an error message
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::utils::log::log(
            $crate::utils::log::Level::Error,
            format_args!($($arg)*)
        );
    };
}

/// Log a warning message
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::utils::log::log(
            $crate::utils::log::Level::Warn,
            format_args!($($arg)*)
        );
    };
}

/// Log an info message
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::utils::log::log(
            $crate::utils::log::Level::Info,
            format_args!($($arg)*)
        );
    };
}

/// Log a debug message
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::utils::log::log(
            $crate::utils::log::Level::Debug,
            format_args!($($arg)*)
        );
    };
}

/// Log a trace message
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::utils::log::log(
            $crate::utils::log::Level::Trace,
            format_args!($($arg)*)
        );
    };
}
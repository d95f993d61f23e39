// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Ember Systems Inc.

//! Boot log infrastructure
//!
//! A lightweight, no_std log sink for the boot pipeline. Entries land in a
//! fixed-capacity circular buffer owned by the boot environment; the outer
//! EFI binary drains it to the serial console after the decision core
//! returns (or on the fatal path, before halting).
//!
//! Keys, digests of user data, and anything else sensitive must never be
//! logged.

use core::fmt::{self, Write};
use heapless::String;

/// Maximum log message length
pub const MAX_LOG_MESSAGE_LEN: usize = 96;

/// Log buffer capacity (number of entries)
pub const LOG_BUFFER_CAPACITY: usize = 64;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Errors that abort or degrade the current boot path
    Error = 0,
    /// Unexpected but recoverable conditions
    Warn = 1,
    /// Boot-logic decision points
    Info = 2,
    /// Verbose diagnostics (engineering builds)
    Debug = 3,
}

impl LogLevel {
    /// Single-character prefix used when draining to the console
    #[must_use]
    pub const fn prefix(&self) -> char {
        match self {
            Self::Error => 'E',
            Self::Warn => 'W',
            Self::Info => 'I',
            Self::Debug => 'D',
        }
    }
}

/// One recorded log entry
#[derive(Clone)]
pub struct LogEntry {
    /// Severity of the entry
    pub level: LogLevel,
    /// Milliseconds since bootloader entry
    pub uptime_ms: u64,
    /// Originating module
    pub module: &'static str,
    /// Formatted message, truncated to [`MAX_LOG_MESSAGE_LEN`]
    pub message: String<MAX_LOG_MESSAGE_LEN>,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:6}.{:03}] {} {}: {}",
            self.uptime_ms / 1000,
            self.uptime_ms % 1000,
            self.level.prefix(),
            self.module,
            self.message
        )
    }
}

/// Circular boot log buffer
///
/// When full, the oldest entry is overwritten; the boot that matters most
/// is always the one in progress.
pub struct LogBuffer {
    entries: [Option<LogEntry>; LOG_BUFFER_CAPACITY],
    write_index: usize,
    count: usize,
    min_level: LogLevel,
}

impl LogBuffer {
    /// Create a new empty log buffer recording up to `Info`
    #[must_use]
    pub const fn new() -> Self {
        const NONE: Option<LogEntry> = None;
        Self {
            entries: [NONE; LOG_BUFFER_CAPACITY],
            write_index: 0,
            count: 0,
            min_level: LogLevel::Info,
        }
    }

    /// Set the minimum recorded level
    pub fn set_min_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    /// Check whether a level would be recorded
    #[must_use]
    pub const fn should_log(&self, level: LogLevel) -> bool {
        (level as u8) <= (self.min_level as u8)
    }

    /// Record a formatted message
    pub fn log(
        &mut self,
        level: LogLevel,
        uptime_ms: u64,
        module: &'static str,
        args: fmt::Arguments<'_>,
    ) {
        if !self.should_log(level) {
            return;
        }

        let mut message = String::new();
        // Truncation on overflow is acceptable for diagnostics
        let _ = message.write_fmt(args);

        self.entries[self.write_index] = Some(LogEntry {
            level,
            uptime_ms,
            module,
            message,
        });
        self.write_index = (self.write_index + 1) % LOG_BUFFER_CAPACITY;
        if self.count < LOG_BUFFER_CAPACITY {
            self.count += 1;
        }
    }

    /// Number of recorded entries
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Check whether the buffer is empty
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Iterate over entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        let start = if self.count < LOG_BUFFER_CAPACITY {
            0
        } else {
            self.write_index
        };
        (0..self.count).filter_map(move |i| {
            self.entries[(start + i) % LOG_BUFFER_CAPACITY].as_ref()
        })
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($buffer:expr, $ts:expr, $module:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Error, $ts, $module, format_args!($($arg)*))
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($buffer:expr, $ts:expr, $module:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Warn, $ts, $module, format_args!($($arg)*))
    };
}

/// Log an informational message
#[macro_export]
macro_rules! log_info {
    ($buffer:expr, $ts:expr, $module:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Info, $ts, $module, format_args!($($arg)*))
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($buffer:expr, $ts:expr, $module:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Debug, $ts, $module, format_args!($($arg)*))
    };
}

// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Ember Systems Inc.

//! Integration tests for ember-common

use core::fmt::Write as _;

use ember_common::log::{LogBuffer, LogLevel, LOG_BUFFER_CAPACITY, MAX_LOG_MESSAGE_LEN};
use ember_common::{Error, Millis, WallTime};

mod error_tests {
    use super::*;

    #[test]
    fn every_error_has_distinct_code() {
        let errors = [
            Error::VariableNotFound,
            Error::DiskReadFailed,
            Error::MalformedBcb,
            Error::NoBootableSlot,
            Error::VerificationFailed,
            Error::RollbackRejected,
            Error::BadImageMagic,
            Error::KernelStartFailed,
            Error::CmdlineOverflow,
            Error::Timeout,
            Error::InternalError,
        ];
        for (i, a) in errors.iter().enumerate() {
            for b in &errors[i + 1..] {
                assert_ne!(a.code(), b.code(), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn display_carries_code_and_description() {
        let mut s = String::new();
        write!(s, "{}", Error::RollbackRejected).unwrap();
        assert_eq!(s, "[0x0302] rollback index regression");
    }
}

mod log_tests {
    use super::*;

    #[test]
    fn long_messages_truncate_instead_of_failing() {
        let mut buf = LogBuffer::new();
        let long = "x".repeat(3 * MAX_LOG_MESSAGE_LEN);
        buf.log(LogLevel::Error, 5, "test", format_args!("{long}"));

        let entry = buf.iter().next().unwrap();
        assert_eq!(entry.message.len(), MAX_LOG_MESSAGE_LEN);
    }

    #[test]
    fn sustained_logging_keeps_most_recent() {
        let mut buf = LogBuffer::new();
        for i in 0..10 * LOG_BUFFER_CAPACITY {
            buf.log(LogLevel::Info, i as u64, "m", format_args!("msg {i}"));
        }
        let last = buf.iter().last().unwrap();
        assert_eq!(
            last.message.as_str(),
            format!("msg {}", 10 * LOG_BUFFER_CAPACITY - 1)
        );
    }

    #[test]
    fn display_format_is_stable() {
        let mut buf = LogBuffer::new();
        buf.log(LogLevel::Warn, 12_345, "slot", format_args!("no bootable slot"));
        let rendered = format!("{}", buf.iter().next().unwrap());
        assert_eq!(rendered, "[    12.345] W slot: no bootable slot");
    }
}

mod time_tests {
    use super::*;

    #[test]
    fn millis_conversions() {
        assert_eq!(Millis::from_secs(3).as_u32(), 3000);
        assert_eq!(Millis::new(250) + Millis::new(250), Millis::new(500));
    }

    #[test]
    fn walltime_window_checks() {
        let reference = WallTime::from_secs(10_000);
        let now = WallTime::from_secs(10_599);
        assert_eq!(now.checked_since(reference), Some(599));

        // Clock rollback is represented, not panicked on
        assert_eq!(reference.checked_since(now), None);
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Ember Systems Inc.

//! Ember Bootloader Common Library
//!
//! Shared foundation for the Ember bootloader crates:
//!
//! - **Errors**: the unified error type used across the boot pipeline
//! - **Log**: fixed-capacity boot log with level filtering
//! - **Time**: millisecond and wall-clock newtypes for timeouts and windows
//!
//! # Features
//!
//! - `std`: enable standard library support (host tests only)
//! - `defmt`: emit errors over defmt for embedded probes
//!
//! No heap allocations are performed in this crate; all buffers are
//! fixed-size arrays or heapless collections.

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod errors;
pub mod log;
pub mod time;

pub use errors::{Error, Result};
pub use log::{LogBuffer, LogEntry, LogLevel};
pub use time::{Millis, WallTime};

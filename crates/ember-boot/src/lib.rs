// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Ember Systems Inc.

//! Ember Verified Boot Core
//!
//! This crate decides *what* to boot, verifies whether the chosen image is
//! authentic, computes the resulting trust state, enforces rollback
//! protection, and prepares the kernel handoff:
//!
//! - **Select**: prioritized reduction of boot signals to one target
//! - **Load**: locate and read a boot image, routing through A/B slots
//! - **Verify**: drive the external verifier and interpret its result
//! - **Trust**: map verification outcome and lock state to a boot color
//! - **Rollback**: monotonically advance per-location indices
//! - **Flow**: the single orchestrator tying the pipeline together
//!
//! Firmware services (variable store, disk, key input, UX, the verifier
//! itself) are reached exclusively through the traits in [`env`]; the
//! outermost EFI binary implements them over boot services and maps the
//! returned [`flow::BootOutcome`] onto actual firmware calls. Nothing in
//! this crate performs a reset, so the entire pipeline runs under host
//! tests.

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod bcb;
pub mod capsule;
pub mod cmdline;
pub mod env;
pub mod fastboot;
pub mod flow;
pub mod loader;
pub mod oemvars;
pub mod rollback;
pub mod select;
pub mod selftest;
pub mod slot;
pub mod target;
pub mod trust;
pub mod ux;
pub mod vars;
pub mod verify;
pub mod watchdog;

pub use env::BootEnv;
pub use flow::{run_boot_flow, BootOutcome};
pub use select::{choose_boot_target, Selection};
pub use target::BootTarget;
pub use trust::{LockState, TrustState};

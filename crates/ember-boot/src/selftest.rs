// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Ember Systems Inc.

//! In-situ self-tests
//!
//! Engineering builds accept `-U [name]` on the image command line and
//! run these consistency checks on the device itself, where the real
//! compiler and libraries are in play. They cover the pure decision
//! components; anything needing firmware services is exercised by host
//! tests instead.

use crate::bcb::{Bcb, BcbCommand, BCB_SIZE};
use crate::cmdline::build_kernel_cmdline;
use crate::target::BootTarget;
use crate::trust::TrustState;

type Check = fn() -> Result<(), &'static str>;

const CHECKS: [(&str, Check); 3] = [
    ("bcb", check_bcb_roundtrip),
    ("trust", check_trust_ordering),
    ("cmdline", check_cmdline_assembly),
];

/// Run the named check, or all of them
///
/// Returns the number of checks that ran, or the name of the first
/// failing check.
pub fn run(name: Option<&str>) -> Result<usize, &'static str> {
    let mut passed = 0;
    for (check_name, check) in CHECKS {
        if name.is_some_and(|n| n != check_name) {
            continue;
        }
        check()?;
        passed += 1;
    }
    if passed == 0 {
        return Err("no such self-test");
    }
    Ok(passed)
}

fn check_bcb_roundtrip() -> Result<(), &'static str> {
    let mut raw = [0u8; BCB_SIZE];
    raw[..13].copy_from_slice(b"boot-recovery");
    raw[32] = b'!';

    let mut bcb = Bcb::parse(&raw).map_err(|_| "bcb parse")?;
    if bcb.command() != BcbCommand::Boot("recovery") {
        return Err("bcb command");
    }
    bcb.clear_status();
    bcb.write_to(&mut raw).map_err(|_| "bcb write")?;

    let reparsed = Bcb::parse(&raw).map_err(|_| "bcb reparse")?;
    if reparsed.status_dirty() || reparsed.command() != BcbCommand::Boot("recovery") {
        return Err("bcb roundtrip");
    }
    Ok(())
}

fn check_trust_ordering() -> Result<(), &'static str> {
    if TrustState::Green >= TrustState::Yellow
        || TrustState::Yellow >= TrustState::Orange
        || TrustState::Orange >= TrustState::Red
    {
        return Err("trust order");
    }
    if TrustState::Red.raise_to(TrustState::Green) != TrustState::Red {
        return Err("trust raise");
    }
    if TrustState::Orange.reconcile(TrustState::Red) != TrustState::Orange {
        return Err("orange latch");
    }
    Ok(())
}

fn check_cmdline_assembly() -> Result<(), &'static str> {
    let uuid = [0u8; 16];
    let line = build_kernel_cmdline(
        BootTarget::NormalBoot,
        true,
        Some("_a"),
        Some("quiet"),
        Some(&uuid),
        None,
    )
    .map_err(|_| "cmdline build")?;

    if !line.starts_with("skip_initramfs") || !line.ends_with("quiet") {
        return Err("cmdline order");
    }
    Ok(())
}

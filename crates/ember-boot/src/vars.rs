// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Ember Systems Inc.

//! Firmware variable names and typed accessors
//!
//! All policy bits the OS or factory tooling can flip at runtime live in
//! firmware variables; this module is the single place their names and
//! encodings are known. Read failures fall back to the documented
//! default: a missing policy variable must never abort a boot.

use alloc::string::String;
use alloc::vec::Vec;

use ember_common::{Error, Result};

use crate::env::{VarScope, VarStore};
use crate::trust::{LockState, TrustState};

/// Trust color for this boot, read by kernel and trusted OS (u8)
pub const BOOT_STATE_VAR: &str = "BootState";

/// Magic-key poll timeout in ms, ASCII decimal, capped at 1000
pub const MAGIC_KEY_TIMEOUT_VAR: &str = "MagicKeyTimeout";

/// One-shot boot target, consumed and deleted every boot
///
/// Stored UTF-16 in the firmware; the [`VarStore`] implementation hands
/// it to the core transcoded to UTF-8.
pub const LOADER_ENTRY_ONE_SHOT_VAR: &str = "LoaderEntryOneShot";

/// Device lock state (u8)
pub const OEM_LOCK_VAR: &str = "OemLock";

/// Off-mode-charge policy bit (u8, default enabled)
pub const OFF_MODE_CHARGE_VAR: &str = "OffModeCharge";

/// Crash-event menu policy bit (u8, default enabled)
pub const CRASH_EVENT_MENU_VAR: &str = "CrashEventMenu";

/// Watchdog escalation threshold (u8, default 2)
pub const WATCHDOG_COUNTER_MAX_VAR: &str = "WatchdogCounterMax";

/// Consecutive watchdog reset counter (u8)
pub const WATCHDOG_COUNTER_VAR: &str = "WatchdogCounter";

/// Wall-time reference of the first watchdog reset (u64 LE seconds)
pub const WATCHDOG_TIME_REF_VAR: &str = "WatchdogTimeRef";

/// OEM variable refresh flag (u8)
pub const OEMVARS_UPDATE_VAR: &str = "OemVarsUpdate";

/// Default magic-key poll timeout in milliseconds
pub const DEFAULT_MAGIC_KEY_TIMEOUT_MS: u32 = 200;

/// Hard ceiling for the magic-key poll timeout
pub const MAX_MAGIC_KEY_TIMEOUT_MS: u32 = 1000;

/// Default watchdog escalation threshold
pub const DEFAULT_WATCHDOG_COUNTER_MAX: u8 = 2;

/// Read a u8 variable, falling back to `default` when missing or
/// malformed
#[must_use]
pub fn get_u8(vars: &dyn VarStore, scope: VarScope, name: &str, default: u8) -> u8 {
    match vars.get_var(scope, name) {
        Ok(v) if v.len() == 1 => v[0],
        _ => default,
    }
}

/// Read a boolean policy bit (any nonzero first byte is true)
#[must_use]
pub fn get_flag(vars: &dyn VarStore, scope: VarScope, name: &str, default: bool) -> bool {
    match vars.get_var(scope, name) {
        Ok(v) if !v.is_empty() => v[0] != 0,
        _ => default,
    }
}

/// Read an ASCII-decimal u32 variable
pub fn get_ascii_u32(vars: &dyn VarStore, scope: VarScope, name: &str) -> Result<u32> {
    let raw = vars.get_var(scope, name)?;
    let s = core::str::from_utf8(&raw).map_err(|_| Error::InvalidParameter)?;
    s.trim_end_matches('\0')
        .trim()
        .parse::<u32>()
        .map_err(|_| Error::InvalidParameter)
}

/// Read a string variable, stripping NUL padding
pub fn get_string(vars: &dyn VarStore, scope: VarScope, name: &str) -> Result<String> {
    let raw = vars.get_var(scope, name)?;
    let s = core::str::from_utf8(&raw).map_err(|_| Error::InvalidParameter)?;
    Ok(String::from(s.trim_end_matches('\0')))
}

/// Current device lock state; a missing variable reads as locked
#[must_use]
pub fn lock_state(vars: &dyn VarStore) -> LockState {
    LockState::from_u8(get_u8(vars, VarScope::Device, OEM_LOCK_VAR, 0))
}

/// Whether off-mode charging is enabled
#[must_use]
pub fn off_mode_charge(vars: &dyn VarStore) -> bool {
    get_flag(vars, VarScope::Device, OFF_MODE_CHARGE_VAR, true)
}

/// Whether the crash-event menu is enabled
#[must_use]
pub fn crash_event_menu(vars: &dyn VarStore) -> bool {
    get_flag(vars, VarScope::Device, CRASH_EVENT_MENU_VAR, true)
}

/// Watchdog escalation threshold
#[must_use]
pub fn watchdog_counter_max(vars: &dyn VarStore) -> u8 {
    get_u8(
        vars,
        VarScope::Device,
        WATCHDOG_COUNTER_MAX_VAR,
        DEFAULT_WATCHDOG_COUNTER_MAX,
    )
}

/// Whether OEM variables should be re-flashed from the boot image
#[must_use]
pub fn oemvars_update(vars: &dyn VarStore) -> bool {
    get_flag(vars, VarScope::Device, OEMVARS_UPDATE_VAR, true)
}

/// Arm or disarm the OEM variable refresh flag
pub fn set_oemvars_update(vars: &mut dyn VarStore, update: bool) -> Result<()> {
    vars.set_var(VarScope::Device, OEMVARS_UPDATE_VAR, &[u8::from(update)])
}

/// Persist the trust color for the kernel and trusted OS to read
pub fn set_boot_state(vars: &mut dyn VarStore, state: TrustState) -> Result<()> {
    vars.set_var(VarScope::Device, BOOT_STATE_VAR, &[state.as_u8()])
}

/// Magic-key poll timeout, clamped to the documented range
///
/// Values above the 1000 ms ceiling are pathological (they would stall
/// every boot) and fall back to the default rather than the ceiling.
#[must_use]
pub fn magic_key_timeout_ms(vars: &dyn VarStore) -> u32 {
    match get_ascii_u32(vars, VarScope::Loader, MAGIC_KEY_TIMEOUT_VAR) {
        Ok(ms) if ms <= MAX_MAGIC_KEY_TIMEOUT_MS => ms,
        Ok(_) => DEFAULT_MAGIC_KEY_TIMEOUT_MS,
        Err(_) => DEFAULT_MAGIC_KEY_TIMEOUT_MS,
    }
}

/// Read and delete the one-shot loader entry
///
/// Deletion happens even when the value is unreadable; a stale one-shot
/// must never replay on the next boot.
pub fn take_loader_entry_one_shot(vars: &mut dyn VarStore) -> Option<String> {
    let value = get_string(vars, VarScope::Loader, LOADER_ENTRY_ONE_SHOT_VAR).ok();
    let _ = vars.delete_var(VarScope::Loader, LOADER_ENTRY_ONE_SHOT_VAR);
    value
}

/// Watchdog persistent state: consecutive counter and first-reset time
pub fn watchdog_status(vars: &dyn VarStore) -> (u8, WallTimeRef) {
    let counter = get_u8(vars, VarScope::Device, WATCHDOG_COUNTER_VAR, 0);
    let time_ref = match vars.get_var(VarScope::Device, WATCHDOG_TIME_REF_VAR) {
        Ok(v) if v.len() == 8 => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&v);
            Some(u64::from_le_bytes(bytes))
        }
        _ => None,
    };
    (counter, time_ref)
}

/// Optional wall-time seconds, `None` when never recorded
pub type WallTimeRef = Option<u64>;

/// Persist the watchdog counter
pub fn set_watchdog_counter(vars: &mut dyn VarStore, counter: u8) -> Result<()> {
    vars.set_var(VarScope::Device, WATCHDOG_COUNTER_VAR, &[counter])
}

/// Persist the watchdog time reference
pub fn set_watchdog_time_ref(vars: &mut dyn VarStore, secs: u64) -> Result<()> {
    vars.set_var(
        VarScope::Device,
        WATCHDOG_TIME_REF_VAR,
        &secs.to_le_bytes(),
    )
}

/// Clear the watchdog state entirely
pub fn reset_watchdog_status(vars: &mut dyn VarStore) -> Result<()> {
    vars.delete_var(VarScope::Device, WATCHDOG_COUNTER_VAR)?;
    vars.delete_var(VarScope::Device, WATCHDOG_TIME_REF_VAR)
}

/// Raw variable write helper for OEM variable injection
pub fn set_raw(vars: &mut dyn VarStore, scope: VarScope, name: &str, value: &[u8]) -> Result<()> {
    vars.set_var(scope, name, value)
}

/// Raw variable read helper
pub fn get_raw(vars: &dyn VarStore, scope: VarScope, name: &str) -> Result<Vec<u8>> {
    vars.get_var(scope, name)
}

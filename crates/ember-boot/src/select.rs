// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Ember Systems Inc.

//! Boot target selection
//!
//! Reduces the boot signals to exactly one target, in strict priority
//! order:
//!
//! 1. Command-line flags from the firmware (`-f`, `-a`, `-U`)
//! 2. Fastboot sentinel file on the ESP
//! 3. Magic key held at power-on
//! 4. Watchdog/panic loop detection
//! 5. Battery-insert wake
//! 6. BCB command on `misc`
//! 7. `LoaderEntryOneShot` firmware variable
//! 8. Battery level
//! 9. Charger-insert wake
//! 10. Normal boot
//!
//! The first rule producing anything other than a normal boot wins; the
//! order is contractual. Failures reading the BCB or firmware variables
//! degrade to a normal boot and never surface as errors.

use alloc::string::{String, ToString};

use ember_common::Millis;

use crate::bcb::{Bcb, BcbCommand, BCB_SIZE};
use crate::env::{BootEnv, BuildVariant, Key, WakeSource};
use crate::selftest;
use crate::slot::MISC_LABEL;
use crate::target::BootTarget;
use crate::ux::UxErrorCode;
use crate::vars;
use crate::watchdog::{check_crash_loop, CrashLoopVerdict};

/// Sentinel file forcing fastboot mode, usually placed on bootable media
pub const FASTBOOT_SENTINEL: &str = "\\force_fastboot";

/// One-shot variable value written by the dm-verity error handler
pub const VERITY_CORRUPTED_ONESHOT: &str = "dm-verity device corrupted";

/// How long the magic key must stay held to force fastboot
const FASTBOOT_HOLD_MS: u32 = 2 * 1000;

/// Interval between key polls while waiting for the initial press
const DETECT_KEY_STALL_MS: u32 = 1;

/// Interval between key polls while checking the hold
const KEY_HELD_POLL_MS: u32 = 50;

/// Result of target selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// The chosen target
    pub target: BootTarget,
    /// ESP image path, for [`BootTarget::EspBootimage`] /
    /// [`BootTarget::EspEfiBinary`]
    pub esp_path: Option<String>,
    /// Whether the ESP image must be deleted before it is honored
    pub oneshot: bool,
}

impl Selection {
    fn plain(target: BootTarget) -> Self {
        Self {
            target,
            esp_path: None,
            oneshot: false,
        }
    }
}

/// Choose the boot target for this cycle
pub fn choose_boot_target(env: &mut BootEnv<'_>) -> Selection {
    env.info("select", format_args!("choosing boot target"));

    let target = check_command_line(env);
    if target != BootTarget::NormalBoot {
        return finish(env, Selection::plain(target));
    }

    if env.esp.file_exists(FASTBOOT_SENTINEL) {
        return finish(env, Selection::plain(BootTarget::Fastboot));
    }

    let target = check_magic_key(env);
    if target != BootTarget::NormalBoot {
        return finish(env, Selection::plain(target));
    }

    match check_crash_loop(&mut *env.vars, &mut *env.platform, env.config.build) {
        CrashLoopVerdict::Normal => {}
        CrashLoopVerdict::PowerOff => {
            return finish(env, Selection::plain(BootTarget::PowerOff));
        }
        CrashLoopVerdict::Escalate => {
            let target = env.ux.prompt_boot_target(UxErrorCode::CrashEvent);
            return finish(env, Selection::plain(target));
        }
    }

    if vars::off_mode_charge(&*env.vars)
        && env.platform.wake_source() == WakeSource::BatteryInserted
    {
        return finish(env, Selection::plain(BootTarget::PowerOff));
    }

    let selection = check_bcb(env);
    if selection.target != BootTarget::NormalBoot {
        return finish(env, selection);
    }

    let target = check_loader_entry_one_shot(env);
    if target != BootTarget::NormalBoot {
        return finish(env, Selection::plain(target));
    }

    let target = check_battery(env);
    if target != BootTarget::NormalBoot {
        return finish(env, Selection::plain(target));
    }

    let target = check_charge_mode(env);
    finish(env, Selection::plain(target))
}

fn finish(env: &mut BootEnv<'_>, selection: Selection) -> Selection {
    env.info(
        "select",
        format_args!("selected '{}'", selection.target.describe()),
    );
    selection
}

/// Rule 1: arguments passed by the firmware to the loaded image
fn check_command_line(env: &mut BootEnv<'_>) -> BootTarget {
    let mut target = BootTarget::NormalBoot;
    let mut i = 0;

    while i < env.args.len() {
        let arg = env.args[i];
        match arg {
            "-f" => target = BootTarget::Fastboot,
            "-U" if env.config.build == BuildVariant::Engineering => {
                i += 1;
                let name = env.args.get(i).copied();
                match selftest::run(name) {
                    Ok(passed) => {
                        env.info("select", format_args!("self-test: {passed} checks passed"));
                    }
                    Err(failure) => {
                        env.error("select", format_args!("self-test failed: {failure}"));
                    }
                }
                return BootTarget::ExitShell;
            }
            "-a" => {
                i += 1;
                if i >= env.args.len() {
                    env.error("select", format_args!("-a requires a memory address"));
                    return target;
                }
                // Historic RAM-boot flag; the address is ignored and the
                // device drops to fastboot for compatibility
                target = BootTarget::Fastboot;
            }
            _ => {
                if i == 0 {
                    // Shells populate argv[0] with the image name; ignore it
                } else {
                    env.error("select", format_args!("unexpected argument {arg}"));
                    return target;
                }
            }
        }
        i += 1;
    }

    target
}

/// Rule 3: magic key held at power-on
///
/// Polls up to the configured timeout for an initial press. A short press
/// of the magic key selects recovery; holding it for two seconds selects
/// fastboot.
fn check_magic_key(env: &mut BootEnv<'_>) -> BootTarget {
    let timeout_ms = vars::magic_key_timeout_ms(&*env.vars);

    let mut waited = 0;
    let key = loop {
        if let Some(key) = env.keys.read_key() {
            break Some(key);
        }
        if waited >= timeout_ms {
            break None;
        }
        env.platform.stall(Millis::new(DETECT_KEY_STALL_MS));
        waited += DETECT_KEY_STALL_MS;
    };

    if key != Some(Key::ArrowDown) {
        return BootTarget::NormalBoot;
    }

    let mut held_ms = 0;
    while held_ms < FASTBOOT_HOLD_MS {
        if !env.keys.key_held(Key::ArrowDown) {
            return BootTarget::Recovery;
        }
        env.platform.stall(Millis::new(KEY_HELD_POLL_MS));
        held_ms += KEY_HELD_POLL_MS;
    }

    BootTarget::Fastboot
}

/// Rule 6: BCB command
fn check_bcb(env: &mut BootEnv<'_>) -> Selection {
    let raw = match env.disk.read_range(MISC_LABEL, 0, BCB_SIZE) {
        Ok(raw) => raw,
        Err(e) => {
            env.error("select", format_args!("unable to read BCB: {e}"));
            return Selection::plain(BootTarget::NormalBoot);
        }
    };

    let mut bcb = match Bcb::parse(&raw) {
        Ok(bcb) => bcb,
        Err(_) => {
            env.error("select", format_args!("malformed BCB"));
            return Selection::plain(BootTarget::NormalBoot);
        }
    };

    // We own the status field; clear any stale data
    let mut dirty = bcb.status_dirty();
    bcb.clear_status();

    let mut oneshot = false;
    let name: Option<String> = match bcb.command() {
        BcbCommand::Empty | BcbCommand::Other(_) => None,
        BcbCommand::Boot(name) => {
            env.info("select", format_args!("BCB boot target '{name}'"));
            Some(name.to_string())
        }
        BcbCommand::BootOnce(name) => {
            env.info("select", format_args!("BCB oneshot boot target '{name}'"));
            let name = name.to_string();
            bcb.clear_command();
            dirty = true;
            oneshot = true;
            Some(name)
        }
    };

    // The write-back must land before the target is honored; a one-shot
    // that survives a reset is a replay
    if dirty {
        let mut out = raw;
        if bcb.write_to(&mut out).is_err()
            || env.disk.write_range(MISC_LABEL, 0, &out).is_err()
        {
            env.error("select", format_args!("unable to update BCB contents"));
        }
    }

    let Some(name) = name else {
        return Selection::plain(BootTarget::NormalBoot);
    };

    if name.starts_with('\\') {
        if !env.esp.file_exists(&name) {
            env.error(
                "select",
                format_args!("specified BCB file '{name}' doesn't exist"),
            );
            return Selection::plain(BootTarget::NormalBoot);
        }
        if name.len() > 4 {
            let target = if name.ends_with(".efi") || name.ends_with(".EFI") {
                BootTarget::EspEfiBinary
            } else {
                BootTarget::EspBootimage
            };
            return Selection {
                target,
                esp_path: Some(name),
                oneshot,
            };
        }
        env.error("select", format_args!("BCB file '{name}' appears malformed"));
        return Selection::plain(BootTarget::NormalBoot);
    }

    match BootTarget::from_name(&name) {
        BootTarget::UnknownTarget => {
            env.error("select", format_args!("unknown boot target in BCB: '{name}'"));
            Selection::plain(BootTarget::NormalBoot)
        }
        target => Selection {
            target,
            esp_path: None,
            oneshot,
        },
    }
}

/// Rule 7: one-shot loader variable
fn check_loader_entry_one_shot(env: &mut BootEnv<'_>) -> BootTarget {
    let Some(value) = vars::take_loader_entry_one_shot(&mut *env.vars) else {
        return BootTarget::NormalBoot;
    };

    if value == VERITY_CORRUPTED_ONESHOT {
        env.info(
            "select",
            format_args!("reboot was triggered by dm-verity corruption"),
        );
        if let Err(e) = env.slots.set_verity_corrupted(&mut *env.disk, true) {
            env.error(
                "select",
                format_args!("failed to set the verity corrupted flag: {e}"),
            );
        }
        return BootTarget::NormalBoot;
    }

    match BootTarget::from_name(&value) {
        BootTarget::UnknownTarget => {
            env.error(
                "select",
                format_args!("unknown oneshot boot target: '{value}'"),
            );
            BootTarget::NormalBoot
        }
        BootTarget::Dnx => {
            // A stale DNX request in the one-shot variable is spurious
            // (nothing legitimate writes it there); DNX stays reachable
            // through the BCB
            env.warn("select", format_args!("ignoring spurious DNX oneshot"));
            BootTarget::NormalBoot
        }
        BootTarget::Charger if !vars::off_mode_charge(&*env.vars) => {
            env.info(
                "select",
                format_args!("off mode charge is not set, powering off"),
            );
            BootTarget::PowerOff
        }
        target => target,
    }
}

/// Rule 8: battery level
fn check_battery(env: &mut BootEnv<'_>) -> BootTarget {
    if !vars::off_mode_charge(&*env.vars) {
        return BootTarget::NormalBoot;
    }

    if env.platform.battery_below_boot_threshold() {
        let plugged = env.platform.charger_plugged();
        env.info(
            "select",
            format_args!(
                "battery below boot threshold, charger {}plugged",
                if plugged { "" } else { "not " }
            ),
        );
        if plugged {
            return BootTarget::Charger;
        }
        env.ux.display_low_battery(3);
        return BootTarget::PowerOff;
    }

    BootTarget::NormalBoot
}

/// Rule 9: charger-insert wake
fn check_charge_mode(env: &mut BootEnv<'_>) -> BootTarget {
    if !vars::off_mode_charge(&*env.vars) {
        return BootTarget::NormalBoot;
    }

    match env.platform.wake_source() {
        WakeSource::UsbChargerInserted | WakeSource::AcChargerInserted => BootTarget::Charger,
        _ => BootTarget::NormalBoot,
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Ember Systems Inc.

//! Boot flow orchestration
//!
//! The single place where a failed step turns into a trust-state
//! downgrade plus a UX call. Terminal firmware actions are *returned* as
//! a [`BootOutcome`], never performed: the EFI binary maps `Reset` and
//! `RebootToTarget` onto `ResetSystem`, `Halt` onto a power off, and
//! `ExitShell` onto a clean `EFI_SUCCESS` return. That keeps every path
//! through this module, including the fatal ones, observable under host
//! tests.

use alloc::string::String;

use ember_common::{Error, Millis, Result};

use crate::capsule;
use crate::cmdline::build_kernel_cmdline;
use crate::env::{BootEnv, BuildVariant, ResetType, RotData};
use crate::fastboot::{classify_event, SessionStep};
use crate::loader::{self, SYSTEM_LABEL};
use crate::oemvars;
use crate::rollback;
use crate::select::choose_boot_target;
use crate::target::BootTarget;
use crate::trust::{LockState, TrustState};
use crate::ux::UxErrorCode;
use crate::vars;
use crate::verify::SlotVerifyData;

/// Version string logged at entry
pub const BOOTLOADER_VERSION: &str = "ember-boot-0.4.2";

/// How long a fatal failure stays on screen before the halt
const DIE_PAUSE_SECS: u32 = 30;

/// Pause after an abnormal chainload exit
const CHAINLOAD_FAIL_PAUSE_SECS: u32 = 3;

/// Terminal action the firmware binary must perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// The kernel was started (only observable under test mocks)
    Handoff {
        /// Target that was booted
        target: BootTarget,
        /// Final trust color
        state: TrustState,
    },
    /// Reboot with the given target armed as the next one-shot
    RebootToTarget(BootTarget),
    /// Reset the platform (capsule application, chainload return)
    Reset(ResetType),
    /// Halt / power off
    Halt,
    /// Return `EFI_SUCCESS` to the firmware shell
    ExitShell,
}

/// Run the verified-boot pipeline
pub fn run_boot_flow(env: &mut BootEnv<'_>) -> BootOutcome {
    env.ux.display_splash();
    env.info("boot", format_args!("{BOOTLOADER_VERSION}"));

    match capsule::check_and_push_capsule(env) {
        Ok(Some(reset)) => return BootOutcome::Reset(reset),
        Ok(None) => {}
        Err(e) => env.error("boot", format_args!("capsule update failed: {e}")),
    }

    if let Err(e) = env.slots.init(&mut *env.disk) {
        env.error(
            "boot",
            format_args!("slot management initialization failed: {e}"),
        );
        return die(env);
    }

    // No UX prompts before this point: they would interfere with magic
    // key detection
    let selection = choose_boot_target(env);
    let mut target = selection.target;

    if target == BootTarget::ExitShell {
        return BootOutcome::ExitShell;
    }
    if target == BootTarget::Crashmode {
        target = env.ux.prompt_boot_target(UxErrorCode::None);
        match target {
            BootTarget::Fastboot => {}
            BootTarget::PowerOff => return BootOutcome::Halt,
            other => return BootOutcome::RebootToTarget(other),
        }
    }
    if target == BootTarget::PowerOff {
        return BootOutcome::Halt;
    }
    if target == BootTarget::Dnx {
        return BootOutcome::RebootToTarget(BootTarget::Dnx);
    }
    if target == BootTarget::Charger {
        env.ux.display_empty_battery();
    }

    let mut state = TrustState::Green;
    let mut lock_prompted = false;

    if !env.config.secure_boot_enabled && !env.config.provisioning {
        env.info("boot", format_args!("platform secure boot is disabled"));
        state = TrustState::Orange;
        lock_prompted = true;

        // Warn early, before fastboot or EFI binaries run, so the prompt
        // is not repeated later
        if let Some(outcome) = boot_error(env, UxErrorCode::SecureBootOff, state, None) {
            return outcome;
        }
    } else if vars::lock_state(&*env.vars) == LockState::Unlocked {
        env.info("boot", format_args!("device is unlocked"));
        state = TrustState::Orange;
    }

    if env.config.build == BuildVariant::Production && env.config.provisioning {
        env.info(
            "boot",
            format_args!("device is provisioning, force fastboot mode"),
        );
        return enter_fastboot_mode(env, state);
    }

    // EFI binaries are validated by the platform's secure boot
    if target == BootTarget::EspEfiBinary {
        let path = selection.esp_path.as_deref().unwrap_or("");
        return chainload_esp_binary(env, path, selection.oneshot);
    }

    if target == BootTarget::Fastboot {
        return enter_fastboot_mode(env, state);
    }

    // The only way to re-lock an unlocked device is fastboot; skip this
    // warning when the secure-boot prompt already ran
    if state == TrustState::Orange && !lock_prompted {
        if let Some(outcome) = boot_error(env, UxErrorCode::DeviceUnlocked, state, None) {
            return outcome;
        }
    }

    env.info("boot", format_args!("loading boot image"));
    let loaded = loader::load_boot_image(
        env,
        target,
        selection.esp_path.as_deref(),
        selection.oneshot,
        state,
    );
    let data = match loaded {
        Ok((verdict, data)) => {
            state = state.reconcile(verdict);
            Some(data)
        }
        Err(e) => {
            env.error("boot", format_args!("issue loading boot image: {e}"));
            state = TrustState::Red;
            None
        }
    };

    if state == TrustState::Yellow {
        let digest = data
            .as_ref()
            .and_then(|d| d.cert_public_key.as_deref())
            .map(sha256_digest);
        if let Some(outcome) =
            boot_error(env, UxErrorCode::UntrustedImage, state, digest.as_ref())
        {
            return outcome;
        }
    }

    if state == TrustState::Red {
        let code = if target == BootTarget::Recovery {
            UxErrorCode::BadRecoveryImage
        } else {
            UxErrorCode::RedState
        };
        if let Some(outcome) = boot_error(env, code, state, None) {
            return outcome;
        }
    }

    if let Some(data) = &data {
        match target {
            BootTarget::Recovery | BootTarget::EspBootimage => {
                // OTA or one-shot image: flash its OEM vars now, and
                // re-read our own on the next normal boot
                flash_image_oemvars(env, data);
                let _ = vars::set_oemvars_update(&mut *env.vars, true);
            }
            BootTarget::NormalBoot | BootTarget::Charger => {
                if vars::oemvars_update(&*env.vars) {
                    let _ = vars::set_oemvars_update(&mut *env.vars, false);
                    flash_image_oemvars(env, data);
                }
            }
            _ => {}
        }
    }

    match handoff(env, target, state, data) {
        Ok(outcome) => return outcome,
        Err(e) => env.error("boot", format_args!("failed to start boot image: {e}")),
    }

    // Handoff failed; burn the failure into slot state and retry while
    // anything remains bootable
    match target {
        BootTarget::NormalBoot | BootTarget::Charger => {
            if env.slots.get_active().is_some() {
                return BootOutcome::RebootToTarget(target);
            }
        }
        BootTarget::Recovery => {
            let retry = if env.config.recovery_in_boot_partition {
                env.slots.get_active().is_some()
            } else {
                env.slots.recovery_tries_remaining() > 0
            };
            if retry {
                return BootOutcome::RebootToTarget(BootTarget::Recovery);
            }
        }
        _ => {}
    }

    recover_mode(env, state)
}

/// Last stop before handoff: persist state, start the trusted OS, record
/// the boot attempt, assemble the command line, start the kernel
fn handoff(
    env: &mut BootEnv<'_>,
    target: BootTarget,
    state: TrustState,
    data: Option<SlotVerifyData>,
) -> Result<BootOutcome> {
    let data = data.ok_or(Error::NoVerifiedPayload)?;

    if let Err(e) = vars::set_boot_state(&mut *env.vars, state) {
        env.warn("boot", format_args!("failed to persist BootState: {e}"));
    }

    if env.config.trusted_os && target.boots_android_image() && target != BootTarget::EspBootimage
    {
        if state == TrustState::Red {
            match env.config.build {
                BuildVariant::Engineering => env.warn(
                    "boot",
                    format_args!("red state: starting trusted OS anyway on engineering build"),
                ),
                BuildVariant::Production => {
                    env.error(
                        "boot",
                        format_args!("red state: refusing to start trusted OS"),
                    );
                    return Ok(die(env));
                }
            }
        }

        let key_digest = data
            .cert_public_key
            .as_deref()
            .map_or([0u8; 32], sha256_digest);
        let rot = RotData {
            state,
            unlocked: vars::lock_state(&*env.vars) == LockState::Unlocked,
            key_digest,
        };
        let started = match env.trusted_os.as_mut() {
            Some(tos) => tos.start(&rot),
            None => Err(Error::TrustedOsStartFailed),
        };
        if let Err(e) = started {
            env.error("boot", format_args!("unable to start the trusted OS: {e}"));
            return Ok(die(env));
        }
    }

    // Stored rollback indexes advance only for verified boots; an
    // unlocked device must not burn the other slot's downgrade path
    if state <= TrustState::Yellow {
        if let Err(e) = rollback::update_rollback_for_slot(&mut *env.verifier, &data) {
            env.warn(
                "boot",
                format_args!("rollback index update failed, will reconcile next boot: {e}"),
            );
        }
    }

    env.slots.boot_ok(&mut *env.disk, target)?;

    let suffix = env.slots.get_active();
    let system_uuid = if env.config.use_slots {
        let mut label = String::from(SYSTEM_LABEL);
        label.push_str(suffix.unwrap_or(""));
        env.disk.partition_uuid(&label).ok()
    } else {
        None
    };
    let cmdline = build_kernel_cmdline(
        target,
        env.config.use_slots,
        suffix,
        data.cmdline.as_deref(),
        system_uuid.as_ref(),
        None,
    )?;

    let payload = data.boot_payload().ok_or(Error::NoVerifiedPayload)?;
    env.info(
        "boot",
        format_args!("chainloading boot image, boot state is {}", state.describe()),
    );

    match env.chain.start_kernel(payload, &cmdline, target, state) {
        Ok(()) => Ok(BootOutcome::Handoff { target, state }),
        Err(e) => {
            if let Err(slot_err) = env.slots.boot_failed(&mut *env.disk, target) {
                env.error(
                    "boot",
                    format_args!("failed to record slot failure: {slot_err}"),
                );
            }
            Err(e)
        }
    }
}

/// The fastboot re-entry loop
///
/// Each serviced event is classified by [`classify_event`]; RAM images go
/// through the same verify/handoff pipeline as disk boots, always at
/// Orange. Nothing survives an iteration except the `BootState`
/// variable.
fn enter_fastboot_mode(env: &mut BootEnv<'_>, state: TrustState) -> BootOutcome {
    let _ = vars::set_boot_state(&mut *env.vars, state);
    let _ = vars::set_oemvars_update(&mut *env.vars, true);

    loop {
        let event = env.fastboot.next_event();
        let unlocked = vars::lock_state(&*env.vars) == LockState::Unlocked;

        match classify_event(event, unlocked) {
            SessionStep::RamBoot(image) => {
                match loader::verify_ram_image(env, &image, BootTarget::Memory, TrustState::Orange)
                {
                    Ok((_, data)) => {
                        flash_image_oemvars(env, &data);
                        match handoff(env, BootTarget::Memory, TrustState::Orange, Some(data)) {
                            Ok(outcome) => return outcome,
                            Err(e) => {
                                env.error("fastboot", format_args!("RAM boot failed: {e}"));
                            }
                        }
                    }
                    Err(e) => {
                        env.error("fastboot", format_args!("rejecting RAM image: {e}"));
                    }
                }
            }
            SessionStep::Chainload(image) => {
                if let Err(e) = env.chain.start_efi_image(&image) {
                    env.error(
                        "fastboot",
                        format_args!("unable to start the received EFI image: {e}"),
                    );
                }
            }
            SessionStep::PromptCrashmode => {
                // Fast path between crashmode and fastboot keeps RAM state
                match env.ux.prompt_boot_target(UxErrorCode::None) {
                    BootTarget::Fastboot => {}
                    BootTarget::PowerOff => return BootOutcome::Halt,
                    choice => return BootOutcome::RebootToTarget(choice),
                }
            }
            SessionStep::Reboot(next) => return BootOutcome::RebootToTarget(next),
            SessionStep::Continue => {}
            SessionStep::Die => return die(env),
        }
    }
}

/// Degraded-state error screen
///
/// Returns `Some` when the flow must end (power off, crashmode menu,
/// fastboot re-entry), `None` to continue booting.
fn boot_error(
    env: &mut BootEnv<'_>,
    code: UxErrorCode,
    state: TrustState,
    key_digest: Option<&[u8; 32]>,
) -> Option<BootOutcome> {
    let force_power_off = state > env.config.min_boot_state;
    let choice = env.ux.prompt_user(code, force_power_off, state, key_digest);

    if choice == BootTarget::Crashmode {
        env.info("boot", format_args!("rebooting to bootloader recover mode"));
        return Some(recover_mode(env, state));
    }
    if force_power_off || choice == BootTarget::PowerOff {
        return Some(BootOutcome::Halt);
    }
    if choice == BootTarget::Fastboot
        && vars::lock_state(&*env.vars) == LockState::Unlocked
    {
        return Some(enter_fastboot_mode(env, state));
    }
    None
}

/// Not-bootable menu: the user picks the way out
fn recover_mode(env: &mut BootEnv<'_>, state: TrustState) -> BootOutcome {
    match env.ux.prompt_boot_target(UxErrorCode::NotBootable) {
        BootTarget::Fastboot => enter_fastboot_mode(env, state),
        BootTarget::PowerOff => BootOutcome::Halt,
        target => BootOutcome::RebootToTarget(target),
    }
}

fn chainload_esp_binary(env: &mut BootEnv<'_>, path: &str, oneshot: bool) -> BootOutcome {
    env.info("boot", format_args!("entering EFI binary {path}"));
    match env.esp.read_file(path) {
        Ok(image) => {
            if oneshot {
                if let Err(e) = env.esp.delete_file(path) {
                    env.warn("boot", format_args!("couldn't delete {path}: {e}"));
                }
            }
            if let Err(e) = env.chain.start_efi_image(&image) {
                env.error(
                    "boot",
                    format_args!("EFI application exited abnormally: {e}"),
                );
                env.platform
                    .stall(Millis::from_secs(CHAINLOAD_FAIL_PAUSE_SECS));
            }
        }
        Err(e) => {
            env.error("boot", format_args!("couldn't read {path}: {e}"));
            env.platform
                .stall(Millis::from_secs(CHAINLOAD_FAIL_PAUSE_SECS));
        }
    }
    BootOutcome::Reset(ResetType::Cold)
}

fn flash_image_oemvars(env: &mut BootEnv<'_>, data: &SlotVerifyData) {
    let Some(blob) = data.second_stage() else {
        return;
    };
    if !oemvars::is_oemvars_blob(blob) {
        return;
    }
    match oemvars::flash_oemvars(&mut *env.vars, blob) {
        Ok(count) => env.info("boot", format_args!("flashed {count} OEM variables")),
        Err(e) => env.warn("boot", format_args!("OEM variable flash failed: {e}")),
    }
}

/// Leave the failure visible, then stop
fn die(env: &mut BootEnv<'_>) -> BootOutcome {
    env.platform.stall(Millis::from_secs(DIE_PAUSE_SECS));
    BootOutcome::Halt
}

fn sha256_digest(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

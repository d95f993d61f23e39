// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Ember Systems Inc.

//! Boot image loading
//!
//! Locates the image for a boot target and drives the verifier over it.
//! The slot failover loop lives here: when the verifier cannot produce a
//! payload for the active slot, the slot is marked failed, the next one is
//! selected and the load retries until a payload appears or no slot
//! remains.
//!
//! Load errors feed the trust reducer in `flow` (they pin Red); nothing
//! here is fatal on its own.

use ember_common::{Error, Result};

use crate::env::BootEnv;
use crate::target::BootTarget;
use crate::trust::TrustState;
use crate::verify::{
    apply_flow_outcome, apply_verify_outcome, evaluate_payload, SlotVerifyData,
};

/// Boot partition label, slot suffix applied by the verifier
pub const BOOT_LABEL: &str = "boot";

/// Dedicated recovery partition label
pub const RECOVERY_LABEL: &str = "recovery";

/// System partition label, used for the rootfs PARTUUID lookup
pub const SYSTEM_LABEL: &str = "system";

/// Load and verify the image for `target`
///
/// Returns the trust verdict and the verifier's slot data. The verdict
/// already accounts for the boot-image magic (hard error), the
/// certificate origin (Yellow) and the declared target name (Red); the
/// caller reconciles it with the incoming state.
pub fn load_boot_image(
    env: &mut BootEnv<'_>,
    target: BootTarget,
    esp_path: Option<&str>,
    oneshot: bool,
    state: TrustState,
) -> Result<(TrustState, SlotVerifyData)> {
    let allow = state != TrustState::Green;

    match target {
        BootTarget::NormalBoot | BootTarget::Charger => {
            load_partition_with_failover(env, target, allow, state)
        }
        BootTarget::Recovery => {
            if env.config.recovery_in_boot_partition {
                return load_partition_with_failover(env, target, allow, state);
            }
            if env.config.use_slots && env.slots.recovery_tries_remaining() == 0 {
                return Err(Error::RecoveryExhausted);
            }
            let (outcome, data) = env.verifier.verify(&[RECOVERY_LABEL], "", allow);
            let verdict = apply_verify_outcome(outcome, allow, state);
            let data = data.ok_or(Error::PartitionNotFound)?;
            let verdict = evaluate_payload(
                &data,
                verdict,
                target,
                env.config.recovery_in_boot_partition,
            )?;
            Ok((verdict, data))
        }
        BootTarget::EspBootimage => {
            let path = esp_path.ok_or(Error::InvalidParameter)?;
            let image = env.esp.read_file(path)?;
            if oneshot {
                // Delete before verification so an unexpected reset cannot
                // replay the one-shot image
                if let Err(e) = env.esp.delete_file(path) {
                    env.warn("loader", format_args!("couldn't delete {path}: {e}"));
                }
            }
            verify_ram_image(env, &image, target, state)
        }
        _ => Err(Error::UnsupportedTarget),
    }
}

/// Verify an image already in memory (ESP file, fastboot `boot`)
pub fn verify_ram_image(
    env: &mut BootEnv<'_>,
    image: &[u8],
    target: BootTarget,
    state: TrustState,
) -> Result<(TrustState, SlotVerifyData)> {
    let allow = state != TrustState::Green;
    let (outcome, data) = env.verifier.verify_payload(image, allow);
    let verdict = apply_verify_outcome(outcome, allow, state);
    let data = data.ok_or(Error::NoVerifiedPayload)?;
    let verdict = evaluate_payload(
        &data,
        verdict,
        target,
        env.config.recovery_in_boot_partition,
    )?;
    Ok((verdict, data))
}

fn load_partition_with_failover(
    env: &mut BootEnv<'_>,
    target: BootTarget,
    allow: bool,
    state: TrustState,
) -> Result<(TrustState, SlotVerifyData)> {
    if env.config.use_slots && env.slots.get_active().is_none() {
        return Err(Error::NoBootableSlot);
    }

    loop {
        let (verdict, data) = if env.config.use_slots {
            let (outcome, data) = env.verifier.ab_flow(&[BOOT_LABEL], allow);
            (apply_flow_outcome(outcome, allow, state), data)
        } else {
            let (outcome, data) = env.verifier.verify(&[BOOT_LABEL], "", allow);
            (apply_verify_outcome(outcome, allow, state), data)
        };

        match data {
            Some(data) => {
                if env.config.use_slots && !data.slot_suffix.is_empty() {
                    if let Err(e) = env.slots.set_active_cached(&data.slot_suffix) {
                        env.warn(
                            "loader",
                            format_args!("verifier resolved unknown slot: {e:?}"),
                        );
                    }
                }
                let verdict = evaluate_payload(
                    &data,
                    verdict,
                    target,
                    env.config.recovery_in_boot_partition,
                )?;
                return Ok((verdict, data));
            }
            None => {
                env.warn(
                    "loader",
                    format_args!("failed to load boot image for {}", target.describe()),
                );
                if env.config.use_slots {
                    env.slots.boot_failed(&mut *env.disk, target)?;
                    if env.slots.get_active().is_some() {
                        continue;
                    }
                }
                return Err(Error::PartitionNotFound);
            }
        }
    }
}

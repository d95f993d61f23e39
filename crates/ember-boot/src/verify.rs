// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Ember Systems Inc.

//! Verifier adapter
//!
//! The cryptographic verified-boot library (signature math, hash-tree
//! walking, vbmeta parsing) is an external collaborator behind the
//! [`Verifier`] trait. This module owns the policy around it:
//!
//! - translating verifier outcomes into trust-state transitions, honoring
//!   the `allow_verification_error` contract (`allow = state != Green`: a
//!   device that is already not green cannot lose more trust by
//!   tolerating a verification failure, and the error UX downstream warns
//!   the user either way)
//! - rejecting payloads whose boot-image magic is wrong, before anything
//!   downstream can touch them
//! - checking the image's declared target name against the label the
//!   chosen boot target expects

use alloc::string::String;
use alloc::vec::Vec;

use ember_common::{Error, Result};

use crate::target::BootTarget;
use crate::trust::TrustState;

/// Boot image magic, first eight bytes of every Android-style boot image
pub const BOOT_MAGIC: [u8; 8] = *b"ANDROID!";

/// Rollback index locations the verifier tracks
pub const MAX_ROLLBACK_LOCATIONS: usize = 32;

/// Single-slot verification outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// All verified
    Ok,
    /// Signature or hash-tree verification failed
    Verification,
    /// Image rollback index below the stored minimum
    RollbackIndex,
    /// Signing key not accepted by the stored policy
    PublicKeyRejected,
    /// Verifier ran out of memory
    Oom,
    /// Disk I/O failed inside the verifier
    Io,
    /// Malformed verifier metadata
    InvalidMetadata,
    /// Arguments rejected by the verifier
    InvalidArgument,
}

/// A/B flow outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
    /// Chosen slot verified
    Ok,
    /// A slot was chosen but carries verification errors
    OkWithVerificationError,
    /// No slot is bootable
    NoBootableSlots,
    /// Verifier ran out of memory
    Oom,
    /// Disk I/O failed inside the verifier
    Io,
    /// Arguments rejected by the verifier
    InvalidArgument,
}

/// One partition the verifier loaded
#[derive(Debug, Clone)]
pub struct VerifiedPartition {
    /// Partition label without slot suffix
    pub name: String,
    /// Partition contents
    pub data: Vec<u8>,
}

/// Everything the verifier returns for one verification pass
///
/// Owned by the orchestrator from verifier return until kernel handoff
/// (or until the fastboot loop iteration ends); downstream components
/// borrow it.
#[derive(Debug, Clone)]
pub struct SlotVerifyData {
    /// Loaded partitions; index 0 is the boot payload
    pub partitions: Vec<VerifiedPartition>,
    /// Rollback indexes the verified image asserts, by location
    pub rollback_indexes: [u64; MAX_ROLLBACK_LOCATIONS],
    /// Slot suffix the A/B flow resolved; empty in single-slot mode
    pub slot_suffix: String,
    /// Verified kernel command-line fragment, if the image carries one
    pub cmdline: Option<String>,
    /// Target name the image signature declares (`/boot`, `/recovery`)
    pub target_name: String,
    /// Whether the image verified against the OEM key
    pub verified_by_oem_key: bool,
    /// Public key of the certificate that verified the image, when it was
    /// not the OEM key
    pub cert_public_key: Option<Vec<u8>>,
}

impl SlotVerifyData {
    /// The boot payload bytes, when the verifier loaded any partition
    #[must_use]
    pub fn boot_payload(&self) -> Option<&[u8]> {
        self.partitions.first().map(|p| p.data.as_slice())
    }

    /// The second-stage region of the boot payload, for OEM variable
    /// injection
    #[must_use]
    pub fn second_stage(&self) -> Option<&[u8]> {
        let payload = self.boot_payload()?;
        crate::oemvars::second_stage_region(payload)
    }
}

/// External verified-boot library
///
/// `verify` and `ab_flow` load the requested partitions themselves (the
/// library owns vbmeta discovery); a `None` slot-data return is a load
/// failure and feeds the slot failover loop, not the trust reducer.
pub trait Verifier {
    /// Verify the named partitions for one explicit slot
    fn verify(
        &mut self,
        partitions: &[&str],
        slot_suffix: &str,
        allow_verification_error: bool,
    ) -> (VerifyOutcome, Option<SlotVerifyData>);

    /// Run the A/B flow: choose a slot, verify it
    fn ab_flow(
        &mut self,
        partitions: &[&str],
        allow_verification_error: bool,
    ) -> (FlowOutcome, Option<SlotVerifyData>);

    /// Verify an image already resident in memory (fastboot `boot`, ESP
    /// image files)
    fn verify_payload(
        &mut self,
        image: &[u8],
        allow_verification_error: bool,
    ) -> (VerifyOutcome, Option<SlotVerifyData>);

    /// Read a stored rollback index
    fn read_rollback_index(&mut self, location: usize) -> Result<u64>;

    /// Store a rollback index; the store itself must be monotone
    fn write_rollback_index(&mut self, location: usize, value: u64) -> Result<()>;
}

/// Map a single-slot verification outcome onto the trust state
///
/// The incoming state only ever raises. With verification errors allowed,
/// every failure lands on Orange as long as the state is at most Orange;
/// a state already Red stays Red.
#[must_use]
pub fn apply_verify_outcome(
    outcome: VerifyOutcome,
    allow_verification_error: bool,
    state: TrustState,
) -> TrustState {
    match outcome {
        VerifyOutcome::Ok => {
            if allow_verification_error {
                state.raise_to(TrustState::Orange)
            } else {
                state
            }
        }
        _ => {
            if allow_verification_error && state <= TrustState::Orange {
                TrustState::Orange
            } else {
                TrustState::Red
            }
        }
    }
}

/// Map an A/B flow outcome onto the trust state
#[must_use]
pub fn apply_flow_outcome(
    outcome: FlowOutcome,
    allow_verification_error: bool,
    state: TrustState,
) -> TrustState {
    match outcome {
        FlowOutcome::Ok => {
            if allow_verification_error {
                state.raise_to(TrustState::Orange)
            } else {
                state
            }
        }
        _ => {
            if allow_verification_error && state <= TrustState::Orange {
                TrustState::Orange
            } else {
                TrustState::Red
            }
        }
    }
}

/// Expected image target names for a boot target
///
/// Returns the primary label and an optional secondary one (normal boots
/// also accept `/recovery` to support multistage OTA).
#[must_use]
pub fn expected_target_names(
    target: BootTarget,
    recovery_in_boot_partition: bool,
) -> (&'static str, Option<&'static str>) {
    match target {
        BootTarget::NormalBoot | BootTarget::Memory => ("/boot", Some("/recovery")),
        BootTarget::Charger | BootTarget::EspBootimage => ("/boot", None),
        BootTarget::Recovery => {
            if recovery_in_boot_partition {
                ("/boot", None)
            } else {
                ("/recovery", None)
            }
        }
        _ => ("", None),
    }
}

/// Post-verification checks on the loaded payload
///
/// Order matters: the magic check comes first and is a hard error. A
/// payload that is not a boot image never reaches the command-line
/// builder or the handoff, regardless of `allow_verification_error`. The
/// target-name check only degrades the trust state.
pub fn evaluate_payload(
    data: &SlotVerifyData,
    verdict: TrustState,
    target: BootTarget,
    recovery_in_boot_partition: bool,
) -> Result<TrustState> {
    let payload = data.boot_payload().ok_or(Error::NoVerifiedPayload)?;
    if payload.len() < BOOT_MAGIC.len() || payload[..BOOT_MAGIC.len()] != BOOT_MAGIC {
        return Err(Error::BadImageMagic);
    }

    let mut state = verdict;
    if !data.verified_by_oem_key {
        state = state.raise_to(TrustState::Yellow);
    }

    let (expected, expected2) = expected_target_names(target, recovery_in_boot_partition);
    let name = data.target_name.as_str();
    let matches = (!expected.is_empty() && name == expected)
        || expected2.is_some_and(|e| name == e);
    if !matches {
        state = TrustState::Red;
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    fn data_with(target_name: &str, payload: &[u8]) -> SlotVerifyData {
        SlotVerifyData {
            partitions: vec![VerifiedPartition {
                name: "boot".to_string(),
                data: payload.to_vec(),
            }],
            rollback_indexes: [0; MAX_ROLLBACK_LOCATIONS],
            slot_suffix: "_a".to_string(),
            cmdline: None,
            target_name: target_name.to_string(),
            verified_by_oem_key: true,
            cert_public_key: None,
        }
    }

    fn boot_image() -> Vec<u8> {
        let mut img = BOOT_MAGIC.to_vec();
        img.extend_from_slice(&[0u8; 64]);
        img
    }

    #[test]
    fn outcome_ok_keeps_green_when_strict() {
        assert_eq!(
            apply_verify_outcome(VerifyOutcome::Ok, false, TrustState::Green),
            TrustState::Green
        );
    }

    #[test]
    fn outcome_ok_with_allowance_raises_to_orange() {
        assert_eq!(
            apply_verify_outcome(VerifyOutcome::Ok, true, TrustState::Green),
            TrustState::Orange
        );
        assert_eq!(
            apply_verify_outcome(VerifyOutcome::Ok, true, TrustState::Red),
            TrustState::Red
        );
    }

    #[test]
    fn verification_failures_are_red_when_strict() {
        for outcome in [
            VerifyOutcome::Verification,
            VerifyOutcome::RollbackIndex,
            VerifyOutcome::PublicKeyRejected,
            VerifyOutcome::Oom,
            VerifyOutcome::Io,
            VerifyOutcome::InvalidMetadata,
        ] {
            assert_eq!(
                apply_verify_outcome(outcome, false, TrustState::Green),
                TrustState::Red
            );
        }
    }

    #[test]
    fn verification_failures_tolerated_at_orange() {
        assert_eq!(
            apply_verify_outcome(VerifyOutcome::Verification, true, TrustState::Orange),
            TrustState::Orange
        );
        // Already-red state is never lowered by the allowance
        assert_eq!(
            apply_verify_outcome(VerifyOutcome::Verification, true, TrustState::Red),
            TrustState::Red
        );
    }

    #[test]
    fn flow_outcomes_follow_same_table() {
        assert_eq!(
            apply_flow_outcome(FlowOutcome::Ok, false, TrustState::Green),
            TrustState::Green
        );
        assert_eq!(
            apply_flow_outcome(FlowOutcome::NoBootableSlots, false, TrustState::Green),
            TrustState::Red
        );
        assert_eq!(
            apply_flow_outcome(FlowOutcome::OkWithVerificationError, true, TrustState::Orange),
            TrustState::Orange
        );
    }

    #[test]
    fn bad_magic_is_a_hard_error() {
        let data = data_with("/boot", b"NOTANDRD-payload");
        assert_eq!(
            evaluate_payload(&data, TrustState::Green, BootTarget::NormalBoot, false),
            Err(Error::BadImageMagic)
        );
        // Even with an Orange verdict (allowance active), magic wins
        assert_eq!(
            evaluate_payload(&data, TrustState::Orange, BootTarget::NormalBoot, false),
            Err(Error::BadImageMagic)
        );
    }

    #[test]
    fn target_name_mismatch_goes_red() {
        let data = data_with("/vendor", &boot_image());
        assert_eq!(
            evaluate_payload(&data, TrustState::Green, BootTarget::NormalBoot, false),
            Ok(TrustState::Red)
        );
    }

    #[test]
    fn normal_boot_accepts_recovery_name_for_multistage_ota() {
        let data = data_with("/recovery", &boot_image());
        assert_eq!(
            evaluate_payload(&data, TrustState::Green, BootTarget::NormalBoot, false),
            Ok(TrustState::Green)
        );
        // Charger does not
        assert_eq!(
            evaluate_payload(&data, TrustState::Green, BootTarget::Charger, false),
            Ok(TrustState::Red)
        );
    }

    #[test]
    fn recovery_expectation_depends_on_partition_layout() {
        let data = data_with("/recovery", &boot_image());
        assert_eq!(
            evaluate_payload(&data, TrustState::Green, BootTarget::Recovery, false),
            Ok(TrustState::Green)
        );
        assert_eq!(
            evaluate_payload(&data, TrustState::Green, BootTarget::Recovery, true),
            Ok(TrustState::Red)
        );

        let boot_named = data_with("/boot", &boot_image());
        assert_eq!(
            evaluate_payload(&boot_named, TrustState::Green, BootTarget::Recovery, true),
            Ok(TrustState::Green)
        );
    }

    #[test]
    fn non_oem_key_raises_yellow() {
        let mut data = data_with("/boot", &boot_image());
        data.verified_by_oem_key = false;
        data.cert_public_key = Some(vec![1, 2, 3]);
        assert_eq!(
            evaluate_payload(&data, TrustState::Green, BootTarget::NormalBoot, false),
            Ok(TrustState::Yellow)
        );
        // Does not lower an Orange verdict
        assert_eq!(
            evaluate_payload(&data, TrustState::Orange, BootTarget::NormalBoot, false),
            Ok(TrustState::Orange)
        );
    }
}

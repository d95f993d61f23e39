// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Ember Systems Inc.

//! Trust state and device lock state
//!
//! The trust state is the four-color verdict the bootloader computes for
//! every boot and communicates to the kernel and the trusted OS:
//!
//! - **Green**: locked device, image verified against the OEM key
//! - **Yellow**: image verified against an embedded (non-OEM) certificate
//! - **Orange**: device unlocked or platform secure boot disabled;
//!   verification failures are tolerated but surfaced to the user
//! - **Red**: verification failed on a device that required it
//!
//! The ordering is a deliberate total order, not a lattice: pipeline
//! stages may only keep or raise the state, never lower it. The one
//! exception (Orange latched by the device-state check surviving a Red
//! verification verdict) is an orchestrator rule, see
//! [`TrustState::reconcile`].

use ember_common::Error;

/// Boot trust color, ordered from most to least trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TrustState {
    /// Verified against the OEM key on a locked device
    Green = 0,
    /// Verified against an embedded certificate
    Yellow = 1,
    /// Unlocked device or platform secure boot disabled
    Orange = 2,
    /// Verification failed under a policy that required it
    Red = 3,
}

impl TrustState {
    /// Raise the state to at least `floor`; never lowers
    #[must_use]
    pub fn raise_to(self, floor: TrustState) -> TrustState {
        if floor > self {
            floor
        } else {
            self
        }
    }

    /// Reconcile the pre-verification state with the verifier's verdict
    ///
    /// An Orange pinned by the device-state check (unlocked device or
    /// platform secure boot off) is preserved across re-verification: the
    /// user was already warned and the verifier ran with verification
    /// errors allowed. Any other incoming state adopts the verdict.
    #[must_use]
    pub fn reconcile(self, verdict: TrustState) -> TrustState {
        if self == TrustState::Orange {
            self
        } else {
            verdict
        }
    }

    /// Raw value persisted in the `BootState` firmware variable
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a persisted state value
    pub fn from_u8(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::Green),
            1 => Ok(Self::Yellow),
            2 => Ok(Self::Orange),
            3 => Ok(Self::Red),
            _ => Err(Error::InvalidParameter),
        }
    }

    /// Human-readable name for logs
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Orange => "orange",
            Self::Red => "red",
        }
    }
}

/// Device lock state, persisted in the `OemLock` firmware variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LockState {
    /// Only OEM-signed images boot
    Locked = 0,
    /// Any image boots; trust state is pinned at Orange
    Unlocked = 1,
    /// Locked to a user-supplied key
    Verified = 2,
}

impl LockState {
    /// Raw value as stored in the firmware variable
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a persisted lock state; unknown values are treated as locked,
    /// the conservative default
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Unlocked,
            2 => Self::Verified,
            _ => Self::Locked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_total() {
        assert!(TrustState::Green < TrustState::Yellow);
        assert!(TrustState::Yellow < TrustState::Orange);
        assert!(TrustState::Orange < TrustState::Red);
    }

    #[test]
    fn raise_never_lowers() {
        assert_eq!(TrustState::Red.raise_to(TrustState::Green), TrustState::Red);
        assert_eq!(TrustState::Green.raise_to(TrustState::Orange), TrustState::Orange);
        assert_eq!(TrustState::Yellow.raise_to(TrustState::Yellow), TrustState::Yellow);
    }

    #[test]
    fn orange_latch_survives_verdict() {
        assert_eq!(
            TrustState::Orange.reconcile(TrustState::Red),
            TrustState::Orange
        );
        assert_eq!(
            TrustState::Green.reconcile(TrustState::Red),
            TrustState::Red
        );
        assert_eq!(
            TrustState::Green.reconcile(TrustState::Yellow),
            TrustState::Yellow
        );
    }

    #[test]
    fn state_roundtrips_through_variable_encoding() {
        for state in [
            TrustState::Green,
            TrustState::Yellow,
            TrustState::Orange,
            TrustState::Red,
        ] {
            assert_eq!(TrustState::from_u8(state.as_u8()).unwrap(), state);
        }
        assert!(TrustState::from_u8(9).is_err());
    }

    #[test]
    fn unknown_lock_state_defaults_to_locked() {
        assert_eq!(LockState::from_u8(0), LockState::Locked);
        assert_eq!(LockState::from_u8(1), LockState::Unlocked);
        assert_eq!(LockState::from_u8(2), LockState::Verified);
        assert_eq!(LockState::from_u8(0xFF), LockState::Locked);
    }
}

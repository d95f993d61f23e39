// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Ember Systems Inc.

//! Error UX surface
//!
//! The renderer itself (fonts, menus, pixels) lives outside the core; this
//! module defines the contract. Two prompts exist:
//!
//! - [`Ux::prompt_user`]: the error screen for a degraded trust state. The
//!   returned target is authoritative; the orchestrator only constrains it
//!   when the policy demands a power off.
//! - [`Ux::prompt_boot_target`]: the crash-event / not-bootable menu
//!   letting the user pick the next boot target directly.

use crate::target::BootTarget;
use crate::trust::TrustState;

/// Why the user is being interrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UxErrorCode {
    /// No error; menu entered voluntarily (crashmode fast path)
    None,
    /// Platform secure boot is disabled
    SecureBootOff,
    /// Device is unlocked
    DeviceUnlocked,
    /// Image verified against a non-OEM certificate
    UntrustedImage,
    /// Image failed verification
    RedState,
    /// Recovery image failed verification
    BadRecoveryImage,
    /// No bootable slot or image remains
    NotBootable,
    /// Repeated watchdog/panic resets detected
    CrashEvent,
}

/// UX renderer contract
pub trait Ux {
    /// Show the vendor splash
    fn display_splash(&mut self);

    /// Show the low-battery screen for `seconds`, then return
    fn display_low_battery(&mut self, seconds: u32);

    /// Show the empty-battery/charging screen
    fn display_empty_battery(&mut self);

    /// Warn the user about a degraded trust state and let them choose how
    /// to continue
    ///
    /// `key_digest` carries the SHA-256 of the verifying certificate's
    /// public key for the untrusted-image warning, so the user can match
    /// it against a known value. When `force_power_off` is set the only
    /// honored choices are power off and crashmode.
    fn prompt_user(
        &mut self,
        code: UxErrorCode,
        force_power_off: bool,
        state: TrustState,
        key_digest: Option<&[u8; 32]>,
    ) -> BootTarget;

    /// Let the user pick the next boot target (crash-event menu,
    /// not-bootable menu)
    fn prompt_boot_target(&mut self, code: UxErrorCode) -> BootTarget;
}

// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Ember Systems Inc.

//! Boot environment
//!
//! Every firmware service the decision core touches is reached through a
//! trait defined here (or next to its consumer: [`crate::verify::Verifier`],
//! [`crate::ux::Ux`], [`crate::fastboot::FastbootTransport`]). The
//! outermost EFI binary implements them over UEFI boot services and
//! constructs one [`BootEnv`] at entry; tests implement them in memory.
//!
//! The environment is threaded by mutable reference through the whole
//! pipeline. There is no global state: the UEFI application model is
//! single-threaded and the bootloader assumes exclusive access to the
//! variable store and the disk for its entire execution.

use alloc::vec::Vec;
use core::fmt;

use ember_common::log::{LogBuffer, LogLevel};
use ember_common::{Millis, Result, WallTime};

use crate::fastboot::FastbootTransport;
use crate::slot::SlotManager;
use crate::trust::TrustState;
use crate::ux::Ux;
use crate::verify::Verifier;

// ============================================================================
// Platform Facts
// ============================================================================

/// What woke the platform for this boot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeSource {
    /// Unknown or ordinary wake (power button, reboot)
    Unknown,
    /// Battery was physically inserted
    BatteryInserted,
    /// USB charger plugged in
    UsbChargerInserted,
    /// AC/DC charger plugged in
    AcChargerInserted,
}

/// What reset the platform before this boot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetSource {
    /// Ordinary boot or OS-initiated reboot
    NotApplicable,
    /// Kernel watchdog fired
    KernelWatchdog,
    /// Security watchdog fired
    SecurityWatchdog,
    /// PMIC watchdog fired
    PmicWatchdog,
    /// Embedded-controller watchdog fired
    EcWatchdog,
}

impl ResetSource {
    /// Whether this reset source counts toward the crash-loop detector
    #[must_use]
    pub const fn is_watchdog(self) -> bool {
        matches!(
            self,
            Self::KernelWatchdog | Self::SecurityWatchdog | Self::PmicWatchdog | Self::EcWatchdog
        )
    }
}

/// Reboot reason recorded by the previous OS instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootReason {
    /// User-requested shutdown
    Shutdown,
    /// Kernel panic
    KernelPanic,
    /// Software watchdog expiry
    Watchdog,
    /// Anything else
    Other,
}

/// Reset type requested from the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetType {
    /// Full power cycle
    Cold,
    /// Warm reset preserving RAM
    Warm,
    /// Power off
    Shutdown,
}

/// Build variant of this bootloader image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildVariant {
    /// Shipping build: strict trust policy
    Production,
    /// Engineering build: self-tests available, red-state backdoors logged
    Engineering,
}

/// Keys the selector cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Down arrow / volume-down: the magic key
    ArrowDown,
    /// Up arrow / volume-up
    ArrowUp,
    /// Enter / power
    Enter,
    /// Escape
    Escape,
}

// ============================================================================
// Firmware Service Traits
// ============================================================================

/// GUID scope for firmware variables
///
/// The binary maps each scope to the vendor GUID the variable lives
/// under; the core only distinguishes the loader protocol namespace from
/// the device-state namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarScope {
    /// Boot-loader protocol variables (`LoaderEntryOneShot`, timeouts)
    Loader,
    /// Device state (`BootState`, `OemLock`, policy bits)
    Device,
}

/// Firmware variable store
pub trait VarStore {
    /// Read a variable's raw value
    ///
    /// Missing variables are `Error::VariableNotFound`; the selector
    /// treats them as "use the default", never as a failure.
    fn get_var(&self, scope: VarScope, name: &str) -> Result<Vec<u8>>;

    /// Write a variable, creating it if needed
    fn set_var(&mut self, scope: VarScope, name: &str, value: &[u8]) -> Result<()>;

    /// Delete a variable; deleting a missing variable is not an error
    fn delete_var(&mut self, scope: VarScope, name: &str) -> Result<()>;
}

/// GPT partition access by logical label
///
/// Labels are un-suffixed (`boot`, `misc`, `system`); slot routing is the
/// caller's job.
pub trait BlockStore {
    /// Read a whole partition
    fn read_partition(&mut self, label: &str) -> Result<Vec<u8>>;

    /// Read a byte range of a partition
    fn read_range(&mut self, label: &str, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Write a byte range of a partition
    fn write_range(&mut self, label: &str, offset: u64, data: &[u8]) -> Result<()>;

    /// The partition's GPT unique GUID, mixed-endian on-disk layout
    fn partition_uuid(&self, label: &str) -> Result<[u8; 16]>;
}

/// EFI System Partition file access
pub trait EspVolume {
    /// Whether a file exists (path uses `\` separators, rooted at the ESP)
    fn file_exists(&self, path: &str) -> bool;

    /// Read a file's contents
    fn read_file(&mut self, path: &str) -> Result<Vec<u8>>;

    /// Delete a file
    fn delete_file(&mut self, path: &str) -> Result<()>;
}

/// Console key input
pub trait KeyInput {
    /// Non-blocking read of a pending keystroke
    fn read_key(&mut self) -> Option<Key>;

    /// Whether the key is currently held down
    fn key_held(&mut self, key: Key) -> bool;
}

/// Platform power, reset and clock facts
pub trait Platform {
    /// Wake source for this boot
    fn wake_source(&self) -> WakeSource;

    /// Reset source for this boot
    fn reset_source(&self) -> ResetSource;

    /// Reboot reason left by the previous OS instance, if any
    fn reboot_reason(&self) -> Option<RebootReason>;

    /// Clear the recorded reboot reason
    fn clear_reboot_reason(&mut self);

    /// Whether the battery is below the boot-OS threshold
    fn battery_below_boot_threshold(&self) -> bool;

    /// Whether a charger is currently attached
    fn charger_plugged(&self) -> bool;

    /// Current RTC time
    fn now(&self) -> WallTime;

    /// Milliseconds since bootloader entry
    fn uptime_ms(&self) -> u64;

    /// Busy-wait for the given duration
    fn stall(&mut self, duration: Millis);
}

/// Image and binary startup services
///
/// `start_kernel` and the chainload entries only return on failure; in the
/// real firmware a successful start never comes back. Tests exploit the
/// `Ok` return to observe the handoff.
pub trait Chainloader {
    /// Start an EFI binary already resident in memory
    fn start_efi_image(&mut self, image: &[u8]) -> Result<()>;

    /// Hand off to the verified kernel image
    fn start_kernel(
        &mut self,
        image: &[u8],
        cmdline: &str,
        target: crate::target::BootTarget,
        state: TrustState,
    ) -> Result<()>;
}

/// Trusted-OS startup
pub trait TrustedOs {
    /// Derive root-of-trust data and start the trusted OS
    fn start(&mut self, rot: &RotData) -> Result<()>;
}

/// Root-of-trust data handed to the trusted OS before kernel start
#[derive(Debug, Clone, Copy)]
pub struct RotData {
    /// Final trust color for this boot
    pub state: TrustState,
    /// Whether the device is unlocked
    pub unlocked: bool,
    /// SHA-256 of the verifier certificate's public key, all zero when
    /// the image verified against the OEM key
    pub key_digest: [u8; 32],
}

/// Firmware capsule update
pub trait CapsuleOps {
    /// Push a capsule to the firmware; returns the reset type the
    /// firmware requires to apply it
    fn apply_capsule(&mut self, data: &[u8]) -> Result<ResetType>;
}

// ============================================================================
// Boot Configuration
// ============================================================================

/// Build- and board-level capability flags
///
/// Each flag mirrors a compile-time option of the firmware image; the
/// pipeline always takes the same shape and no-ops disabled stages.
#[derive(Debug, Clone, Copy)]
pub struct BootConfig {
    /// Build variant of this image
    pub build: BuildVariant,
    /// A/B slot management enabled
    pub use_slots: bool,
    /// Recovery lives inside the boot partition (no dedicated partition)
    pub recovery_in_boot_partition: bool,
    /// Trusted OS is started before kernel handoff
    pub trusted_os: bool,
    /// Platform (UEFI) secure boot is enabled
    pub secure_boot_enabled: bool,
    /// Device is still in factory provisioning
    pub provisioning: bool,
    /// Worst trust state allowed to proceed past the error UX without a
    /// forced power off
    pub min_boot_state: TrustState,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            build: BuildVariant::Production,
            use_slots: true,
            recovery_in_boot_partition: false,
            trusted_os: false,
            secure_boot_enabled: true,
            provisioning: false,
            min_boot_state: TrustState::Red,
        }
    }
}

// ============================================================================
// Boot Environment
// ============================================================================

/// Everything the decision core needs, constructed once at entry
pub struct BootEnv<'a> {
    /// Firmware variable store
    pub vars: &'a mut dyn VarStore,
    /// GPT partition access
    pub disk: &'a mut dyn BlockStore,
    /// ESP file access
    pub esp: &'a mut dyn EspVolume,
    /// Console key input
    pub keys: &'a mut dyn KeyInput,
    /// Power/reset/clock facts
    pub platform: &'a mut dyn Platform,
    /// Error and menu UX
    pub ux: &'a mut dyn Ux,
    /// External verified-boot library
    pub verifier: &'a mut dyn Verifier,
    /// Image startup services
    pub chain: &'a mut dyn Chainloader,
    /// Capsule update service
    pub capsules: &'a mut dyn CapsuleOps,
    /// Fastboot protocol service
    pub fastboot: &'a mut dyn FastbootTransport,
    /// Trusted-OS startup, present when [`BootConfig::trusted_os`]
    pub trusted_os: Option<&'a mut dyn TrustedOs>,
    /// Capability flags
    pub config: BootConfig,
    /// Arguments passed to the loaded image by the firmware
    pub args: &'a [&'a str],
    /// Slot controller state (loaded by `flow` from `misc`)
    pub slots: SlotManager,
    /// Boot log, drained by the binary after the core returns
    pub log: LogBuffer,
}

impl BootEnv<'_> {
    /// Record an informational log entry
    pub fn info(&mut self, module: &'static str, args: fmt::Arguments<'_>) {
        let ts = self.platform.uptime_ms();
        self.log.log(LogLevel::Info, ts, module, args);
    }

    /// Record a warning log entry
    pub fn warn(&mut self, module: &'static str, args: fmt::Arguments<'_>) {
        let ts = self.platform.uptime_ms();
        self.log.log(LogLevel::Warn, ts, module, args);
    }

    /// Record an error log entry
    pub fn error(&mut self, module: &'static str, args: fmt::Arguments<'_>) {
        let ts = self.platform.uptime_ms();
        self.log.log(LogLevel::Error, ts, module, args);
    }
}

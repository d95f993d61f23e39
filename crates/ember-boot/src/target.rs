// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Ember Systems Inc.

//! Boot targets
//!
//! A boot target is the single action the bootloader will perform this
//! cycle. Exactly one is chosen per boot by the selector; the fastboot
//! loop is the only place a second derivation can happen.

/// The action the bootloader will perform this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootTarget {
    /// Boot the main OS from the boot partition
    NormalBoot,
    /// Boot the recovery image
    Recovery,
    /// Enter the fastboot service loop
    Fastboot,
    /// Display the charging UI instead of booting the OS
    Charger,
    /// Power the device off
    PowerOff,
    /// Boot an image supplied over fastboot, resident in RAM
    Memory,
    /// Boot an image file from the EFI System Partition
    EspBootimage,
    /// Chainload another EFI binary from the ESP
    EspEfiBinary,
    /// Reboot into the SoC download-and-execute mode
    Dnx,
    /// Enter the crash-recovery menu
    Crashmode,
    /// Return control to the firmware shell
    ExitShell,
    /// Name did not resolve to a known target
    UnknownTarget,
}

impl BootTarget {
    /// Resolve a BCB or one-shot variable name to a target
    ///
    /// The table accepts the names recovery and the OS write into `misc`
    /// and `LoaderEntryOneShot`. Unknown names map to
    /// [`BootTarget::UnknownTarget`] so the caller can decide whether to
    /// log and fall through.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "boot" | "normal" => Self::NormalBoot,
            "recovery" => Self::Recovery,
            "fastboot" | "bootloader" => Self::Fastboot,
            "charging" => Self::Charger,
            "shutdown" => Self::PowerOff,
            "dnx" => Self::Dnx,
            "crashmode" => Self::Crashmode,
            _ => Self::UnknownTarget,
        }
    }

    /// Human-readable name for logs
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::NormalBoot => "normal boot",
            Self::Recovery => "recovery",
            Self::Fastboot => "fastboot",
            Self::Charger => "charger",
            Self::PowerOff => "power off",
            Self::Memory => "ram image",
            Self::EspBootimage => "esp boot image",
            Self::EspEfiBinary => "esp efi binary",
            Self::Dnx => "dnx",
            Self::Crashmode => "crashmode",
            Self::ExitShell => "exit shell",
            Self::UnknownTarget => "unknown",
        }
    }

    /// Targets that boot an Android-style image and therefore go through
    /// the load/verify/handoff pipeline
    #[must_use]
    pub const fn boots_android_image(self) -> bool {
        matches!(
            self,
            Self::NormalBoot | Self::Recovery | Self::Charger | Self::Memory | Self::EspBootimage
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_table_resolves_known_targets() {
        assert_eq!(BootTarget::from_name("recovery"), BootTarget::Recovery);
        assert_eq!(BootTarget::from_name("bootloader"), BootTarget::Fastboot);
        assert_eq!(BootTarget::from_name("fastboot"), BootTarget::Fastboot);
        assert_eq!(BootTarget::from_name("charging"), BootTarget::Charger);
        assert_eq!(BootTarget::from_name("dnx"), BootTarget::Dnx);
        assert_eq!(BootTarget::from_name("boot"), BootTarget::NormalBoot);
    }

    #[test]
    fn unknown_names_do_not_panic() {
        assert_eq!(BootTarget::from_name(""), BootTarget::UnknownTarget);
        assert_eq!(BootTarget::from_name("Recovery"), BootTarget::UnknownTarget);
        assert_eq!(BootTarget::from_name("sideload"), BootTarget::UnknownTarget);
    }

    #[test]
    fn android_image_targets() {
        assert!(BootTarget::NormalBoot.boots_android_image());
        assert!(BootTarget::Memory.boots_android_image());
        assert!(!BootTarget::Fastboot.boots_android_image());
        assert!(!BootTarget::EspEfiBinary.boots_android_image());
    }
}

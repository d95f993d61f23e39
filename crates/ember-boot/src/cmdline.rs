// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Ember Systems Inc.

//! Kernel command-line builder
//!
//! Fragments are prepended, so the kernel's last-wins parsing keeps the
//! later (verified) parts authoritative over the defaults the bootloader
//! injects. With every fragment active the final line reads:
//!
//! ```text
//! skip_initramfs rootwait ro init=/init root=PARTUUID=<uuid>
//!     androidboot.slot_suffix=<sfx> <verified cmdline> <caller extra>
//! ```
//!
//! The rootfs descriptor is omitted for recovery and RAM boots (their
//! ramdisk is the root), and whenever the verified command line already
//! carries a `root=` of its own.

use core::fmt::Write;

use ember_common::{Error, Result};

use crate::target::BootTarget;

/// Kernel command-line assembly capacity
pub const CMDLINE_CAPACITY: usize = 1024;

/// Assembled kernel command line
pub type Cmdline = heapless::String<CMDLINE_CAPACITY>;

/// Rootfs fragment injected for slot-managed system partitions
pub const ROOTFS_PREFIX: &str = "skip_initramfs rootwait ro init=/init";

/// Build the kernel command line for handoff
///
/// `system_uuid` is the GPT unique GUID of the (slot-suffixed) system
/// partition; it is only required when the rootfs descriptor applies.
pub fn build_kernel_cmdline(
    target: BootTarget,
    use_slots: bool,
    slot_suffix: Option<&str>,
    verified_cmdline: Option<&str>,
    system_uuid: Option<&[u8; 16]>,
    extra: Option<&str>,
) -> Result<Cmdline> {
    let verified = verified_cmdline.unwrap_or("");
    let mut line = Cmdline::new();
    line.push_str(verified).map_err(|()| Error::CmdlineOverflow)?;

    if use_slots {
        if let Some(suffix) = slot_suffix {
            let mut frag = heapless::String::<64>::new();
            write!(frag, "androidboot.slot_suffix={suffix}")
                .map_err(|_| Error::CmdlineOverflow)?;
            prepend(&mut line, &frag)?;
        }

        let wants_rootfs = !matches!(target, BootTarget::Recovery | BootTarget::Memory);
        if wants_rootfs && !verified.contains("root=") {
            let uuid = system_uuid.ok_or(Error::PartitionNotFound)?;
            let mut frag = heapless::String::<96>::new();
            write!(frag, "{ROOTFS_PREFIX} root=PARTUUID={}", PartUuid(uuid))
                .map_err(|_| Error::CmdlineOverflow)?;
            prepend(&mut line, &frag)?;
        }
    }

    if let Some(extra) = extra {
        append(&mut line, extra)?;
    }

    Ok(line)
}

fn prepend(line: &mut Cmdline, fragment: &str) -> Result<()> {
    let mut out = Cmdline::new();
    out.push_str(fragment).map_err(|()| Error::CmdlineOverflow)?;
    if !line.is_empty() {
        out.push(' ').map_err(|()| Error::CmdlineOverflow)?;
        out.push_str(line).map_err(|()| Error::CmdlineOverflow)?;
    }
    *line = out;
    Ok(())
}

fn append(line: &mut Cmdline, fragment: &str) -> Result<()> {
    if fragment.is_empty() {
        return Ok(());
    }
    if !line.is_empty() {
        line.push(' ').map_err(|()| Error::CmdlineOverflow)?;
    }
    line.push_str(fragment).map_err(|()| Error::CmdlineOverflow)?;
    Ok(())
}

/// GPT unique partition GUID in its canonical text form
///
/// The first three fields are stored little-endian on disk; the text form
/// follows RFC 4122 ordering, which is what the kernel's PARTUUID
/// matching expects.
struct PartUuid<'a>(&'a [u8; 16]);

impl core::fmt::Display for PartUuid<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let u = self.0;
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            u[3], u[2], u[1], u[0],
            u[5], u[4],
            u[7], u[6],
            u[8], u[9],
            u[10], u[11], u[12], u[13], u[14], u[15]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UUID: [u8; 16] = [
        0x78, 0x56, 0x34, 0x12, 0xbc, 0x9a, 0xf0, 0xde, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab,
        0xcd, 0xef,
    ];

    #[test]
    fn partuuid_mixed_endian_text_form() {
        let mut s = heapless::String::<36>::new();
        write!(s, "{}", PartUuid(&UUID)).unwrap();
        assert_eq!(s.as_str(), "12345678-9abc-def0-0123-456789abcdef");
    }

    #[test]
    fn full_normal_boot_line() {
        let line = build_kernel_cmdline(
            BootTarget::NormalBoot,
            true,
            Some("_a"),
            Some("androidboot.hardware=ember"),
            Some(&UUID),
            None,
        )
        .unwrap();

        assert!(line.starts_with("skip_initramfs rootwait ro init=/init root=PARTUUID="));
        assert!(line.contains("androidboot.slot_suffix=_a"));
        assert!(line.ends_with("androidboot.hardware=ember"));
    }

    #[test]
    fn verified_root_suppresses_descriptor() {
        let line = build_kernel_cmdline(
            BootTarget::NormalBoot,
            true,
            Some("_b"),
            Some("root=/dev/dm-0 dm=1"),
            Some(&UUID),
            None,
        )
        .unwrap();

        assert!(!line.contains(ROOTFS_PREFIX));
        assert!(line.starts_with("androidboot.slot_suffix=_b"));
    }

    #[test]
    fn recovery_and_memory_omit_rootfs() {
        for target in [BootTarget::Recovery, BootTarget::Memory] {
            let line =
                build_kernel_cmdline(target, true, Some("_a"), None, Some(&UUID), None).unwrap();
            assert!(!line.contains(ROOTFS_PREFIX));
            assert!(line.contains("androidboot.slot_suffix=_a"));
        }
    }

    #[test]
    fn slots_disabled_passes_verified_through() {
        let line = build_kernel_cmdline(
            BootTarget::NormalBoot,
            false,
            None,
            Some("console=ttyS0"),
            None,
            None,
        )
        .unwrap();
        assert_eq!(line.as_str(), "console=ttyS0");
    }

    #[test]
    fn extra_fragment_is_appended_last() {
        let line = build_kernel_cmdline(
            BootTarget::NormalBoot,
            true,
            Some("_a"),
            Some("a=1"),
            Some(&UUID),
            Some("androidboot.bootreason=watchdog"),
        )
        .unwrap();
        assert!(line.ends_with("androidboot.bootreason=watchdog"));
    }

    #[test]
    fn missing_system_uuid_is_an_error() {
        let err = build_kernel_cmdline(
            BootTarget::NormalBoot,
            true,
            Some("_a"),
            None,
            None,
            None,
        )
        .unwrap_err();
        assert_eq!(err, Error::PartitionNotFound);
    }

    #[test]
    fn overflow_is_detected() {
        let long = [b'x'; CMDLINE_CAPACITY];
        let long = core::str::from_utf8(&long).unwrap();
        let err = build_kernel_cmdline(
            BootTarget::NormalBoot,
            true,
            Some("_a"),
            Some(long),
            Some(&UUID),
            None,
        )
        .unwrap_err();
        assert_eq!(err, Error::CmdlineOverflow);
    }
}

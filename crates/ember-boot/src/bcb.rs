// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Ember Systems Inc.

//! Bootloader Control Block
//!
//! The BCB is a fixed-layout record at offset 0 of the `misc` partition,
//! used by the OS and recovery to hand a boot request to the bootloader:
//!
//! ```text
//! Offset  Size  Field
//! 0x000   32    command   ("boot-<target>" / "bootonce-<target>")
//! 0x020   32    status    (owned by the bootloader, always cleared)
//! 0x040   768   recovery  (opaque to the bootloader)
//! 0x340   32    stage     (opaque to the bootloader)
//! ```
//!
//! All fields are ASCII, NUL-padded. The bootloader owns `status` and
//! clears it whenever it is non-empty; `command` is erased before honoring
//! a `bootonce-*` request so an unexpected reset cannot replay it.

use ember_common::Error;

/// Bytes of the `misc` partition consumed by the BCB
pub const BCB_SIZE: usize = 864;

const COMMAND_LEN: usize = 32;
const STATUS_LEN: usize = 32;
const RECOVERY_LEN: usize = 768;
const STAGE_LEN: usize = 32;

const COMMAND_OFFSET: usize = 0;
const STATUS_OFFSET: usize = COMMAND_OFFSET + COMMAND_LEN;
const RECOVERY_OFFSET: usize = STATUS_OFFSET + STATUS_LEN;
const STAGE_OFFSET: usize = RECOVERY_OFFSET + RECOVERY_LEN;

/// BCB parsing/serialization error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BcbError {
    /// Source buffer shorter than [`BCB_SIZE`]
    TooShort,
    /// Replacement field value does not fit
    FieldTooLong,
}

impl From<BcbError> for Error {
    fn from(_: BcbError) -> Self {
        Error::MalformedBcb
    }
}

/// Semantic interpretation of the BCB `command` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BcbCommand<'a> {
    /// Command field is empty
    Empty,
    /// `boot-<name>`: persistent request, left in place
    Boot(&'a str),
    /// `bootonce-<name>`: one-shot request, erased before honoring
    BootOnce(&'a str),
    /// Non-empty command this bootloader does not understand
    Other(&'a str),
}

/// In-memory Bootloader Control Block
#[derive(Clone)]
pub struct Bcb {
    command: [u8; COMMAND_LEN],
    status: [u8; STATUS_LEN],
    recovery: [u8; RECOVERY_LEN],
    stage: [u8; STAGE_LEN],
}

impl Bcb {
    /// Parse a BCB from the first [`BCB_SIZE`] bytes of `misc`
    pub fn parse(raw: &[u8]) -> Result<Self, BcbError> {
        if raw.len() < BCB_SIZE {
            return Err(BcbError::TooShort);
        }

        let mut bcb = Self {
            command: [0; COMMAND_LEN],
            status: [0; STATUS_LEN],
            recovery: [0; RECOVERY_LEN],
            stage: [0; STAGE_LEN],
        };
        bcb.command
            .copy_from_slice(&raw[COMMAND_OFFSET..COMMAND_OFFSET + COMMAND_LEN]);
        bcb.status
            .copy_from_slice(&raw[STATUS_OFFSET..STATUS_OFFSET + STATUS_LEN]);
        bcb.recovery
            .copy_from_slice(&raw[RECOVERY_OFFSET..RECOVERY_OFFSET + RECOVERY_LEN]);
        bcb.stage
            .copy_from_slice(&raw[STAGE_OFFSET..STAGE_OFFSET + STAGE_LEN]);
        Ok(bcb)
    }

    /// Serialize back into the first [`BCB_SIZE`] bytes of `misc`
    ///
    /// `recovery` and `stage` are written back untouched; they belong to
    /// the OS side of the protocol.
    pub fn write_to(&self, out: &mut [u8]) -> Result<(), BcbError> {
        if out.len() < BCB_SIZE {
            return Err(BcbError::TooShort);
        }

        out[COMMAND_OFFSET..COMMAND_OFFSET + COMMAND_LEN].copy_from_slice(&self.command);
        out[STATUS_OFFSET..STATUS_OFFSET + STATUS_LEN].copy_from_slice(&self.status);
        out[RECOVERY_OFFSET..RECOVERY_OFFSET + RECOVERY_LEN].copy_from_slice(&self.recovery);
        out[STAGE_OFFSET..STAGE_OFFSET + STAGE_LEN].copy_from_slice(&self.stage);
        Ok(())
    }

    /// The command field up to the first NUL
    ///
    /// Non-UTF-8 content is treated as empty; a garbage command must
    /// degrade to a normal boot, not an error.
    #[must_use]
    pub fn command_str(&self) -> &str {
        field_str(&self.command)
    }

    /// Interpret the command field
    #[must_use]
    pub fn command(&self) -> BcbCommand<'_> {
        let cmd = self.command_str();
        if cmd.is_empty() {
            BcbCommand::Empty
        } else if let Some(name) = cmd.strip_prefix("boot-") {
            BcbCommand::Boot(name)
        } else if let Some(name) = cmd.strip_prefix("bootonce-") {
            BcbCommand::BootOnce(name)
        } else {
            BcbCommand::Other(cmd)
        }
    }

    /// Whether the status field holds stale data
    #[must_use]
    pub fn status_dirty(&self) -> bool {
        self.status[0] != 0
    }

    /// Clear the status field
    pub fn clear_status(&mut self) {
        self.status = [0; STATUS_LEN];
    }

    /// Erase the command field (one-shot semantics)
    pub fn clear_command(&mut self) {
        self.command = [0; COMMAND_LEN];
    }

    /// Replace the command field (used by tests and the fastboot `oem`
    /// path)
    pub fn set_command(&mut self, cmd: &str) -> Result<(), BcbError> {
        if cmd.len() >= COMMAND_LEN {
            return Err(BcbError::FieldTooLong);
        }
        self.command = [0; COMMAND_LEN];
        self.command[..cmd.len()].copy_from_slice(cmd.as_bytes());
        Ok(())
    }
}

fn field_str(field: &[u8]) -> &str {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    core::str::from_utf8(&field[..end]).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with_command(cmd: &str) -> [u8; BCB_SIZE] {
        let mut raw = [0u8; BCB_SIZE];
        raw[..cmd.len()].copy_from_slice(cmd.as_bytes());
        raw
    }

    #[test]
    fn parses_persistent_command() {
        let bcb = Bcb::parse(&raw_with_command("boot-recovery")).unwrap();
        assert_eq!(bcb.command(), BcbCommand::Boot("recovery"));
    }

    #[test]
    fn parses_oneshot_command() {
        let bcb = Bcb::parse(&raw_with_command("bootonce-fastboot")).unwrap();
        assert_eq!(bcb.command(), BcbCommand::BootOnce("fastboot"));
    }

    #[test]
    fn empty_and_garbage_commands() {
        let bcb = Bcb::parse(&[0u8; BCB_SIZE]).unwrap();
        assert_eq!(bcb.command(), BcbCommand::Empty);

        let mut raw = [0u8; BCB_SIZE];
        raw[0] = 0xFF;
        raw[1] = 0xFE;
        let bcb = Bcb::parse(&raw).unwrap();
        assert_eq!(bcb.command(), BcbCommand::Empty);
    }

    #[test]
    fn short_buffer_rejected() {
        assert!(matches!(
            Bcb::parse(&[0u8; BCB_SIZE - 1]),
            Err(BcbError::TooShort)
        ));
    }

    #[test]
    fn roundtrip_preserves_opaque_fields_and_clears_status() {
        let mut raw = raw_with_command("boot-recovery");
        raw[32] = b'x'; // stale status
        raw[64] = b'r'; // recovery field content
        raw[832] = b'2'; // stage field content

        let mut bcb = Bcb::parse(&raw).unwrap();
        assert!(bcb.status_dirty());
        bcb.clear_status();

        let mut out = [0u8; BCB_SIZE];
        bcb.write_to(&mut out).unwrap();

        let reparsed = Bcb::parse(&out).unwrap();
        assert!(!reparsed.status_dirty());
        assert_eq!(reparsed.command(), BcbCommand::Boot("recovery"));
        assert_eq!(out[64], b'r');
        assert_eq!(out[832], b'2');
    }

    #[test]
    fn oneshot_erase_does_not_return_on_reparse() {
        let mut bcb = Bcb::parse(&raw_with_command("bootonce-recovery")).unwrap();
        bcb.clear_command();

        let mut out = [0u8; BCB_SIZE];
        bcb.write_to(&mut out).unwrap();
        assert_eq!(Bcb::parse(&out).unwrap().command(), BcbCommand::Empty);
    }

    #[test]
    fn set_command_bounds() {
        let mut bcb = Bcb::parse(&[0u8; BCB_SIZE]).unwrap();
        assert!(bcb.set_command("boot-recovery").is_ok());
        assert_eq!(bcb.command_str(), "boot-recovery");

        let long = "boot-0123456789012345678901234567890123456789";
        assert_eq!(bcb.set_command(long), Err(BcbError::FieldTooLong));
    }
}

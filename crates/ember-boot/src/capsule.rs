// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Ember Systems Inc.

//! Firmware capsule update
//!
//! A `\BIOSUPDATE.fv` file on the ESP is a pending firmware update. It is
//! pushed to the firmware before anything else happens this boot; the
//! file is deleted first because some capsules reset the platform from
//! inside the update call.

use ember_common::{Error, Result};

use crate::env::{BootEnv, ResetType};

/// Capsule file the firmware update tooling drops on the ESP
pub const FWUPDATE_FILE: &str = "\\BIOSUPDATE.fv";

/// Push the pending capsule, if any
///
/// Returns the reset type the firmware requires when a capsule was
/// pushed, `None` when no capsule file exists. Errors leave the boot to
/// continue; a broken capsule file must not brick the device.
pub fn check_and_push_capsule(env: &mut BootEnv<'_>) -> Result<Option<ResetType>> {
    if !env.esp.file_exists(FWUPDATE_FILE) {
        return Ok(None);
    }

    env.info("capsule", format_args!("loading capsule {FWUPDATE_FILE}"));

    let content = env.esp.read_file(FWUPDATE_FILE)?;
    if content.is_empty() {
        return Err(Error::FileIoFailed);
    }

    // Delete before pushing: the update call may reset the platform
    env.esp.delete_file(FWUPDATE_FILE)?;

    let reset = env.capsules.apply_capsule(&content)?;
    env.info("capsule", format_args!("capsule accepted, resetting"));
    Ok(Some(reset))
}

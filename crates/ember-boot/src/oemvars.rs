// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Ember Systems Inc.

//! OEM variable injection
//!
//! A boot image's second-stage region may carry a text blob of firmware
//! variables for the board (`#OEMVARS\n` magic followed by `name=value`
//! lines). Recovery and one-shot ESP images always flash their blob and
//! re-arm the refresh flag so the next normal boot re-reads its own;
//! normal boots flash once per update cycle.
//!
//! Individual malformed lines are skipped, and individual write failures
//! are logged by the caller but do not fail the boot; a board with a
//! buggy variable store still has to come up.

use ember_common::Result;

use crate::env::{VarScope, VarStore};

/// Magic prefix of an OEM variable blob
pub const OEMVARS_MAGIC: &[u8] = b"#OEMVARS\n";

// Android boot image header v0 field offsets
const KERNEL_SIZE_OFFSET: usize = 8;
const RAMDISK_SIZE_OFFSET: usize = 16;
const SECOND_SIZE_OFFSET: usize = 24;
const PAGE_SIZE_OFFSET: usize = 36;
const HEADER_MIN_LEN: usize = 40;

/// Locate the second-stage region inside a boot image payload
///
/// Returns `None` when the image has no second stage or the header does
/// not describe a region inside the payload bounds.
#[must_use]
pub fn second_stage_region(payload: &[u8]) -> Option<&[u8]> {
    if payload.len() < HEADER_MIN_LEN {
        return None;
    }

    let read_u32 = |offset: usize| -> u32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(&payload[offset..offset + 4]);
        u32::from_le_bytes(b)
    };

    let kernel_size = read_u32(KERNEL_SIZE_OFFSET) as usize;
    let ramdisk_size = read_u32(RAMDISK_SIZE_OFFSET) as usize;
    let second_size = read_u32(SECOND_SIZE_OFFSET) as usize;
    let page_size = read_u32(PAGE_SIZE_OFFSET) as usize;

    if second_size == 0 || page_size == 0 || !page_size.is_power_of_two() {
        return None;
    }

    let pages = |len: usize| len.div_ceil(page_size);
    let offset = page_size
        .checked_mul(1 + pages(kernel_size) + pages(ramdisk_size))?;
    let end = offset.checked_add(second_size)?;
    payload.get(offset..end)
}

/// Whether a second-stage blob is an OEM variable blob
#[must_use]
pub fn is_oemvars_blob(blob: &[u8]) -> bool {
    blob.len() > OEMVARS_MAGIC.len() && blob.starts_with(OEMVARS_MAGIC)
}

/// Flash an OEM variable blob into the variable store
///
/// Returns the number of variables written. Lines without `=`, empty
/// lines and `#` comments are skipped.
pub fn flash_oemvars(vars: &mut dyn VarStore, blob: &[u8]) -> Result<usize> {
    let body = &blob[OEMVARS_MAGIC.len()..];
    let Ok(text) = core::str::from_utf8(body) else {
        return Ok(0);
    };

    let mut written = 0;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, value)) = line.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        if vars
            .set_var(VarScope::Device, name, value.trim().as_bytes())
            .is_ok()
        {
            written += 1;
        }
    }
    Ok(written)
}

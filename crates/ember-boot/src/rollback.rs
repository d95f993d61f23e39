// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Ember Systems Inc.

//! Rollback index protection
//!
//! Each trust location carries a 64-bit monotone counter in tamper-proof
//! storage. After a successful verification, every index the verified
//! image asserts is compared against the stored value and the stored value
//! is advanced when the image's is higher. The stored value is never
//! decreased.
//!
//! Updates walk locations in ascending order. The first I/O error aborts
//! the whole pass: locations below the failure point keep their new
//! values (each individual write is monotone, so this is safe) and the
//! next successful boot reconciles the rest.

use ember_common::{Error, Result};

use crate::verify::{SlotVerifyData, Verifier, MAX_ROLLBACK_LOCATIONS};

/// Advance stored rollback indexes to match a verified slot
///
/// Locations the image does not populate (asserted index zero) are
/// skipped, matching the verifier's "unused location" convention.
pub fn update_rollback_for_slot(
    verifier: &mut dyn Verifier,
    slot_data: &SlotVerifyData,
) -> Result<()> {
    for location in 0..MAX_ROLLBACK_LOCATIONS {
        let asserted = slot_data.rollback_indexes[location];
        if asserted == 0 {
            continue;
        }

        let stored = verifier
            .read_rollback_index(location)
            .map_err(|_| Error::RollbackStoreFailed)?;

        if asserted > stored {
            verifier
                .write_rollback_index(location, asserted)
                .map_err(|_| Error::RollbackStoreFailed)?;
        }
    }

    Ok(())
}

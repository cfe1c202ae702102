//! Part planning for multipart uploads
//!
//! Splits a payload of `total` bytes into fixed-size parts. Two boundary
//! behaviors exist:
//!
//! - [`PartBoundary::Tiled`]: parts `1..=whole` of `part_size` bytes, then
//!   one remainder part. The parts exactly tile `[0, total)`.
//! - [`PartBoundary::Legacy`]: parts `1..whole` (the last whole part is
//!   skipped), then the remainder part at the next offset. This under-tiles
//!   the payload by one whole part and exists only for parity with
//!   deployments that relied on it.

use super::TransferError;
use serde::{Deserialize, Serialize};

/// Fixed part size (10 MiB)
pub const PART_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum parts allowed in one multipart upload
pub const MAX_PARTS: u64 = 10_000;

/// How the final whole part is handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartBoundary {
    #[default]
    Tiled,
    Legacy,
}

/// One planned part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartDescriptor {
    /// 1-based, contiguous
    pub part_number: u32,
    pub offset: u64,
    pub length: u64,
}

impl PartDescriptor {
    /// Offset one past the last byte of the part
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Number of parts `plan_parts` would produce
pub fn part_count(total: u64, part_size: u64, boundary: PartBoundary) -> u64 {
    if part_size == 0 {
        return 0;
    }
    let whole = total / part_size;
    let remainder = total % part_size;
    let extra = u64::from(remainder > 0);

    match boundary {
        PartBoundary::Tiled => whole + extra,
        PartBoundary::Legacy => whole.saturating_sub(1) + extra,
    }
}

/// Plan the parts for a payload of `total` bytes
///
/// Returns an empty plan when `total` or `part_size` is zero, or under
/// [`PartBoundary::Legacy`] when `total == part_size`. Part numbers are
/// `u32`; use [`checked_plan`] for sizes that are not already bounded.
pub fn plan_parts(total: u64, part_size: u64, boundary: PartBoundary) -> Vec<PartDescriptor> {
    if part_size == 0 || total == 0 {
        return Vec::new();
    }

    let whole = total / part_size;
    let remainder = total % part_size;
    let full_parts = match boundary {
        PartBoundary::Tiled => whole,
        PartBoundary::Legacy => whole.saturating_sub(1),
    };

    let capacity = part_count(total, part_size, boundary).min(MAX_PARTS);
    let mut parts = Vec::with_capacity(capacity as usize);
    let mut offset = 0u64;
    let mut part_number = 1u32;

    for _ in 0..full_parts {
        parts.push(PartDescriptor {
            part_number,
            offset,
            length: part_size,
        });
        offset += part_size;
        part_number += 1;
    }

    if remainder > 0 {
        parts.push(PartDescriptor {
            part_number,
            offset,
            length: remainder,
        });
    }

    parts
}

/// Plan the parts, rejecting plans over [`MAX_PARTS`] before building them
pub fn checked_plan(
    total: u64,
    part_size: u64,
    boundary: PartBoundary,
) -> Result<Vec<PartDescriptor>, TransferError> {
    let parts = part_count(total, part_size, boundary);
    if parts > MAX_PARTS {
        return Err(TransferError::TooManyParts {
            parts,
            max: MAX_PARTS,
        });
    }
    Ok(plan_parts(total, part_size, boundary))
}

//! Transfer strategy selector
//!
//! Decides, from the payload size and the memory policy, whether a payload
//! fits comfortably in memory. Uploads use the answer to pick a single
//! request or a multipart transfer; downloads use it to pick an in-memory
//! payload or a file on disk.
//!
//! The decision is advisory: memory may change between the check and the
//! transfer.
//!
//! # Example
//!
//! ```
//! use s3_transfer_facade::memory::FixedMemoryProbe;
//! use s3_transfer_facade::strategy::{MemoryPolicy, StrategySelector, UploadStrategy};
//!
//! const MIB: u64 = 1024 * 1024;
//!
//! let probe = FixedMemoryProbe::new(800 * MIB, 1000 * MIB);
//! let selector = StrategySelector::new(MemoryPolicy::Percent(20.0), probe);
//!
//! // 500 MiB leaves 300 MiB spare: 30% of total
//! assert_eq!(selector.choose_upload(500 * MIB), UploadStrategy::SingleShot);
//! // 700 MiB leaves 100 MiB spare: 10% of total
//! assert_eq!(selector.choose_upload(700 * MIB), UploadStrategy::Chunked);
//! ```

use crate::memory::MemoryProbe;
use serde::Serialize;

/// Default percentage of total memory that must stay free
pub const DEFAULT_MEMORY_PERCENT: f64 = 20.0;

/// Default number of bytes that must stay free (500 MiB)
pub const DEFAULT_MEMORY_ABSOLUTE_BYTES: u64 = 500 * 1024 * 1024;

/// Memory policy
///
/// Exactly one mode is active for a selector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", content = "threshold", rename_all = "snake_case")]
pub enum MemoryPolicy {
    /// Percentage of total memory that must remain free after reserving the
    /// payload. Negative values are never satisfied.
    Percent(f64),
    /// Bytes that must remain free after reserving the payload
    Absolute(u64),
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        MemoryPolicy::Percent(DEFAULT_MEMORY_PERCENT)
    }
}

/// Upload strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStrategy {
    /// One PutObject request
    SingleShot,
    /// Multipart upload in fixed-size parts
    Chunked,
}

impl UploadStrategy {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStrategy::SingleShot => "single_shot",
            UploadStrategy::Chunked => "chunked",
        }
    }
}

/// Download delivery mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Object body held in memory
    InMemory,
    /// Object body streamed to a destination file
    FileBacked,
}

impl Delivery {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Delivery::InMemory => "in_memory",
            Delivery::FileBacked => "file_backed",
        }
    }
}

/// Strategy selector
///
/// Pure function of the policy and the probe's current figures.
#[derive(Debug)]
pub struct StrategySelector<P> {
    policy: MemoryPolicy,
    probe: P,
}

impl<P: MemoryProbe> StrategySelector<P> {
    /// Create a selector for the given policy and probe
    pub fn new(policy: MemoryPolicy, probe: P) -> Self {
        Self { policy, probe }
    }

    /// Active policy
    pub fn policy(&self) -> MemoryPolicy {
        self.policy
    }

    /// Underlying probe
    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Whether `size` bytes fit in memory while honoring the policy
    pub fn fits_in_memory(&self, size: u64) -> bool {
        let free = self.probe.free_memory();

        let fits = match self.policy {
            MemoryPolicy::Percent(percent) => {
                percent_fits(percent, free, self.probe.total_memory(), size)
            }
            MemoryPolicy::Absolute(threshold) => absolute_fits(threshold, free, size),
        };

        tracing::debug!(
            policy = ?self.policy,
            free_bytes = free,
            payload_bytes = size,
            fits = fits,
            "Evaluated memory policy"
        );

        fits
    }

    /// Pick the upload strategy for a payload of `size` bytes
    pub fn choose_upload(&self, size: u64) -> UploadStrategy {
        if self.fits_in_memory(size) {
            UploadStrategy::SingleShot
        } else {
            UploadStrategy::Chunked
        }
    }

    /// Pick the delivery mode for an object of `size` bytes
    pub fn choose_delivery(&self, size: u64) -> Delivery {
        if self.fits_in_memory(size) {
            Delivery::InMemory
        } else {
            Delivery::FileBacked
        }
    }
}

fn percent_fits(percent: f64, free: u64, total: u64, size: u64) -> bool {
    if percent < 0.0 || free < size || total == 0 {
        return false;
    }
    let spare_ratio = (free - size) as f64 / total as f64;
    spare_ratio * 100.0 >= percent
}

fn absolute_fits(threshold: u64, free: u64, size: u64) -> bool {
    if free < size {
        return false;
    }
    free - size >= threshold
}

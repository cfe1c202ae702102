//! Memory probe module
//!
//! Supplies the free/total memory figures the strategy selector decides on.
//!
//! # Design
//!
//! - `MemoryProbe` trait: the selector never reads host memory directly
//! - `SystemMemoryProbe` reads the host (Linux: `/proc/meminfo`, falling back
//!   to `sysinfo(2)`)
//! - `FixedMemoryProbe` reports caller-controlled values
//!
//! # Example
//!
//! ```
//! use s3_transfer_facade::memory::{FixedMemoryProbe, MemoryProbe};
//!
//! let probe = FixedMemoryProbe::new(512, 1024);
//! assert_eq!(probe.free_memory(), 512);
//! probe.set_free(128);
//! assert_eq!(probe.free_memory(), 128);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of memory availability figures, in bytes.
///
/// Implementations are queried on every decision since free memory changes
/// over time.
pub trait MemoryProbe: Send + Sync {
    /// Memory currently available for new allocations
    fn free_memory(&self) -> u64;

    /// Total memory the free figure is measured against
    fn total_memory(&self) -> u64;
}

impl<P: MemoryProbe + ?Sized> MemoryProbe for Arc<P> {
    fn free_memory(&self) -> u64 {
        (**self).free_memory()
    }

    fn total_memory(&self) -> u64 {
        (**self).total_memory()
    }
}

// ============================================================================
// System probe
// ============================================================================

/// Host memory probe
///
/// On Linux, prefers `MemAvailable` from `/proc/meminfo` (it accounts for
/// reclaimable page cache) and falls back to `sysinfo(2)` free RAM.
///
/// On other platforms both figures are reported as zero and a warning is
/// logged once. Every upload then goes multipart and every download is
/// file-backed, so downloads fail with `MissingDestination` unless a
/// destination is given. Use [`FixedMemoryProbe`] there to choose a policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMemoryProbe;

impl SystemMemoryProbe {
    /// Create a new system probe
    pub fn new() -> Self {
        Self
    }

    #[cfg(target_os = "linux")]
    fn snapshot() -> MemorySnapshot {
        if let Some(snapshot) = std::fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|content| parse_meminfo(&content))
        {
            return snapshot;
        }

        let mut info: libc::sysinfo = unsafe { std::mem::zeroed() };
        // SAFETY: `info` is a valid, writable sysinfo struct.
        let rc = unsafe { libc::sysinfo(&mut info) };
        if rc != 0 {
            tracing::warn!(
                error = %std::io::Error::last_os_error(),
                "sysinfo(2) failed, reporting zero memory"
            );
            return MemorySnapshot::default();
        }

        let unit = u64::from(info.mem_unit.max(1));
        MemorySnapshot {
            free: (info.freeram as u64).saturating_mul(unit),
            total: (info.totalram as u64).saturating_mul(unit),
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn snapshot() -> MemorySnapshot {
        static UNSUPPORTED: std::sync::Once = std::sync::Once::new();
        UNSUPPORTED.call_once(|| {
            tracing::warn!(
                os = std::env::consts::OS,
                "Host memory probing is not supported on this platform, reporting zero memory; \
                 uploads will use multipart and downloads will need a destination file"
            );
        });
        MemorySnapshot::default()
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn free_memory(&self) -> u64 {
        Self::snapshot().free
    }

    fn total_memory(&self) -> u64 {
        Self::snapshot().total
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct MemorySnapshot {
    free: u64,
    total: u64,
}

/// Parse `MemAvailable` (or `MemFree`) and `MemTotal` from `/proc/meminfo`.
///
/// Values in the file are in kB.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_meminfo(content: &str) -> Option<MemorySnapshot> {
    let mut total = None;
    let mut available = None;
    let mut free = None;

    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let (Some(name), Some(value)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Ok(kib) = value.parse::<u64>() else {
            continue;
        };
        let bytes = kib.saturating_mul(1024);
        match name {
            "MemTotal:" => total = Some(bytes),
            "MemAvailable:" => available = Some(bytes),
            "MemFree:" => free = Some(bytes),
            _ => {}
        }
    }

    Some(MemorySnapshot {
        free: available.or(free)?,
        total: total?,
    })
}

// ============================================================================
// Fixed probe
// ============================================================================

/// Probe reporting caller-controlled figures
///
/// Used for dry runs and to force either branch of the selector in tests.
/// The figures can be changed at any time through a shared reference.
#[derive(Debug, Default)]
pub struct FixedMemoryProbe {
    free: AtomicU64,
    total: AtomicU64,
}

impl FixedMemoryProbe {
    /// Create a probe reporting `free` out of `total` bytes
    pub fn new(free: u64, total: u64) -> Self {
        Self {
            free: AtomicU64::new(free),
            total: AtomicU64::new(total),
        }
    }

    /// Change the reported free memory
    pub fn set_free(&self, free: u64) {
        self.free.store(free, Ordering::Relaxed);
    }

    /// Change the reported total memory
    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }
}

impl MemoryProbe for FixedMemoryProbe {
    fn free_memory(&self) -> u64 {
        self.free.load(Ordering::Relaxed)
    }

    fn total_memory(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

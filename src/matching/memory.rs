//! Memory budget for the streaming scanner
//!
//! Available memory is a system-wide resource shared by every worker, so a
//! worker never sees the whole of it: either a fixed per-worker reservation
//! from configuration, or the current system figure divided by the worker
//! count, re-read every time the scanner asks.

use std::sync::Arc;

/// Used when the platform gives no figure (non-Linux, restricted /proc)
const FALLBACK_AVAILABLE_BYTES: u64 = 512 * 1024 * 1024;

/// Source of "how much memory is free right now"
pub trait MemorySource: Send + Sync {
    fn available_bytes(&self) -> Option<u64>;
}

/// Reads `MemAvailable` from /proc/meminfo
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMemory;

impl MemorySource for SystemMemory {
    fn available_bytes(&self) -> Option<u64> {
        #[cfg(target_os = "linux")]
        {
            let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
            parse_meminfo(&meminfo)
        }
        #[cfg(not(target_os = "linux"))]
        {
            None
        }
    }
}

/// Constant figure, for tests and fixed reservations
#[derive(Debug, Clone, Copy)]
pub struct FixedMemory(pub u64);

impl MemorySource for FixedMemory {
    fn available_bytes(&self) -> Option<u64> {
        Some(self.0)
    }
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_meminfo(meminfo: &str) -> Option<u64> {
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            let kib = rest.split_whitespace().next()?.parse::<u64>().ok()?;
            return Some(kib.saturating_mul(1024));
        }
    }
    None
}

/// Per-worker view of available memory
#[derive(Clone)]
pub struct MemoryBudget {
    source: Arc<dyn MemorySource>,
    workers: u64,
}

impl MemoryBudget {
    /// Share the system's available memory between `workers`
    pub fn shared(workers: usize) -> Self {
        Self::with_source(Arc::new(SystemMemory), workers)
    }

    /// Reserve a fixed number of bytes for each worker
    pub fn reserved(bytes_per_worker: u64) -> Self {
        Self::with_source(Arc::new(FixedMemory(bytes_per_worker)), 1)
    }

    pub fn with_source(source: Arc<dyn MemorySource>, workers: usize) -> Self {
        Self {
            source,
            workers: workers.max(1) as u64,
        }
    }

    /// Bytes this worker may use right now
    pub fn available(&self) -> u64 {
        self.source
            .available_bytes()
            .unwrap_or(FALLBACK_AVAILABLE_BYTES)
            / self.workers
    }
}

impl std::fmt::Debug for MemoryBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBudget")
            .field("workers", &self.workers)
            .field("available", &self.available())
            .finish()
    }
}

//! Memory budget for the resident frame set.
//!
//! Tracks max bytes, used bytes and the per-frame size learned from the first
//! decoded frame. Not thread-safe on its own: the frame cache keeps it behind the
//! same lock as the "last produced" cursor so admission and accounting never race.

use log::{debug, info};
use sysinfo::System;

const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Compute a byte limit from currently available system memory.
///
/// * `mem_fraction` - fraction of available memory (0.0-1.0)
/// * `reserve_gb` - memory left for the system before the fraction is applied
pub fn system_memory_limit(mem_fraction: f64, reserve_gb: f64) -> usize {
    let mut sys = System::new();
    sys.refresh_memory();

    let available = sys.available_memory() as usize;
    let reserve = (reserve_gb * GB) as usize;
    let usable = available.saturating_sub(reserve);
    let limit = (usable as f64 * mem_fraction.clamp(0.0, 1.0)) as usize;

    info!(
        "System memory: available={} MB, reserve={} MB, limit={} MB ({}%)",
        available / 1024 / 1024,
        reserve / 1024 / 1024,
        limit / 1024 / 1024,
        (mem_fraction * 100.0) as u32
    );
    limit
}

/// Convert a preference value in GB to bytes.
pub fn gb_to_bytes(gb: f64) -> usize {
    (gb.max(0.0) * GB) as usize
}

/// Point-in-time view of the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemorySnapshot {
    pub used_bytes: usize,
    pub max_bytes: usize,
    pub frame_size: Option<usize>,
}

impl MemorySnapshot {
    /// Used/max in 0.0-1.0
    pub fn usage_fraction(&self) -> f64 {
        if self.max_bytes == 0 {
            0.0
        } else {
            self.used_bytes as f64 / self.max_bytes as f64
        }
    }

    /// How many frames of the learned size fit in the budget.
    pub fn frame_capacity(&self) -> Option<usize> {
        self.frame_size.map(|size| self.max_bytes / size)
    }
}

#[derive(Debug, Clone)]
pub struct MemoryBudget {
    max_bytes: usize,
    used_bytes: usize,
    frame_size: Option<usize>,
}

impl MemoryBudget {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            used_bytes: 0,
            frame_size: None,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn frame_size(&self) -> Option<usize> {
        self.frame_size
    }

    pub fn set_max_bytes(&mut self, max_bytes: usize) {
        if self.max_bytes != max_bytes {
            info!(
                "Cache memory limit: {} MB -> {} MB",
                self.max_bytes / 1024 / 1024,
                max_bytes / 1024 / 1024
            );
        }
        self.max_bytes = max_bytes;
    }

    /// Record the per-frame size and re-derive usage for frames admitted before it was known.
    ///
    /// Zero is ignored so a failed first decode keeps the budget in bootstrap mode.
    pub fn learn_frame_size(&mut self, bytes: usize, resident: usize) {
        if bytes == 0 || self.frame_size.is_some() {
            return;
        }
        self.frame_size = Some(bytes);
        self.used_bytes = resident * bytes;
        debug!(
            "Learned frame size: {} bytes ({} frames fit in {} MB)",
            bytes,
            self.max_bytes / bytes,
            self.max_bytes / 1024 / 1024
        );
    }

    /// True if one more frame fits. Always true while the frame size is unknown.
    pub fn fits_one_more(&self) -> bool {
        match self.frame_size {
            Some(size) => self.used_bytes.saturating_add(size) <= self.max_bytes,
            None => true,
        }
    }

    /// Account for one admitted frame.
    pub fn add_frame(&mut self) {
        let size = self.frame_size.unwrap_or(0);
        self.used_bytes = self.used_bytes.saturating_add(size);
    }

    /// Account for one evicted frame (saturating).
    pub fn free_frame(&mut self) {
        let size = self.frame_size.unwrap_or(0);
        self.used_bytes = self.used_bytes.saturating_sub(size);
    }

    /// Drop usage. With `forget_frame_size` the next media starts in bootstrap mode.
    pub fn reset(&mut self, forget_frame_size: bool) {
        self.used_bytes = 0;
        if forget_frame_size {
            self.frame_size = None;
        }
    }

    pub fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            used_bytes: self.used_bytes,
            max_bytes: self.max_bytes,
            frame_size: self.frame_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_fits_unconditionally() {
        let budget = MemoryBudget::new(0);
        assert!(budget.fits_one_more());
        assert_eq!(budget.frame_size(), None);
    }

    #[test]
    fn test_learn_frame_size_recomputes_usage() {
        let mut budget = MemoryBudget::new(1000);
        budget.add_frame();
        assert_eq!(budget.used_bytes(), 0);

        budget.learn_frame_size(100, 1);
        assert_eq!(budget.used_bytes(), 100);

        // Only the first non-zero size counts
        budget.learn_frame_size(500, 1);
        assert_eq!(budget.frame_size(), Some(100));
    }

    #[test]
    fn test_memory_tracking() {
        let mut budget = MemoryBudget::new(300);
        budget.learn_frame_size(100, 0);

        budget.add_frame();
        budget.add_frame();
        assert!(budget.fits_one_more());
        budget.add_frame();
        assert!(!budget.fits_one_more());
        assert_eq!(budget.snapshot().frame_capacity(), Some(3));

        budget.free_frame();
        assert_eq!(budget.used_bytes(), 200);

        budget.reset(false);
        budget.free_frame();
        assert_eq!(budget.used_bytes(), 0);
        assert_eq!(budget.frame_size(), Some(100));
    }

    #[test]
    fn test_gb_conversion() {
        assert_eq!(gb_to_bytes(1.0), 1024 * 1024 * 1024);
        assert_eq!(gb_to_bytes(-2.0), 0);
    }
}

//! # Allocator Statistics

use core::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of allocator counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Multi-node arrays allocated
    pub multinode_allocs: u64,
    /// Multi-node arrays freed (including incomplete frees)
    pub multinode_frees: u64,
    /// Single-node regions allocated
    pub single_allocs: u64,
    /// Single-node regions freed
    pub single_frees: u64,
    /// Allocations that failed
    pub failed_allocs: u64,
    /// Multi-node allocations that committed pieces and then had to roll back
    pub rollbacks: u64,
    /// Frees that leaked at least one piece
    pub incomplete_frees: u64,
    /// Frees of unknown addresses
    pub misuse: u64,
}

/// Live counters
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub multinode_allocs: AtomicU64,
    pub multinode_frees: AtomicU64,
    pub single_allocs: AtomicU64,
    pub single_frees: AtomicU64,
    pub failed_allocs: AtomicU64,
    pub rollbacks: AtomicU64,
    pub incomplete_frees: AtomicU64,
    pub misuse: AtomicU64,
}

impl Counters {
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AllocatorStats {
        AllocatorStats {
            multinode_allocs: self.multinode_allocs.load(Ordering::Relaxed),
            multinode_frees: self.multinode_frees.load(Ordering::Relaxed),
            single_allocs: self.single_allocs.load(Ordering::Relaxed),
            single_frees: self.single_frees.load(Ordering::Relaxed),
            failed_allocs: self.failed_allocs.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            incomplete_frees: self.incomplete_frees.load(Ordering::Relaxed),
            misuse: self.misuse.load(Ordering::Relaxed),
        }
    }
}

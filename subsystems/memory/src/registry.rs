//! # Allocation Registry
//!
//! Remembers how each multi-node array was split so that a bare base address
//! can be decomposed into its pieces again at free time.
//!
//! The registry is shared by every allocate and free call in the process and
//! does its own locking; callers never hold an external lock around it.

use alloc::collections::BTreeMap;

use silo_hal::VirtAddr;
use spin::Mutex;

use crate::piece::{AllocationPiece, PieceList};

/// Storage for live multi-node arrays, keyed by base address
pub trait AllocationRegistry {
    /// Store `pieces` under the address of its first piece
    ///
    /// The list comes back unchanged if it is empty or its base is already
    /// registered.
    fn submit(&self, pieces: PieceList) -> Result<VirtAddr, PieceList>;

    /// Take the entry for `base` out of the registry
    fn lookup_and_remove(&self, base: VirtAddr) -> Option<PieceList>;

    /// Piece of any live entry that contains `addr`
    fn find_containing(&self, addr: VirtAddr) -> Option<AllocationPiece>;

    /// Number of live entries
    fn len(&self) -> usize;

    /// Check if no entry is live
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registry statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Live entries
    pub live_entries: usize,
    /// Bytes covered by live entries
    pub live_bytes: usize,
    /// Entries ever submitted
    pub submitted: u64,
    /// Entries ever removed
    pub removed: u64,
}

#[derive(Debug, Default)]
struct MapInner {
    entries: BTreeMap<VirtAddr, PieceList>,
    live_bytes: usize,
    submitted: u64,
    removed: u64,
}

/// Mutex-protected [`AllocationRegistry`]
#[derive(Debug, Default)]
pub struct PointerMap {
    inner: Mutex<MapInner>,
}

static_assertions::assert_impl_all!(PointerMap: Send, Sync);

impl PointerMap {
    /// Create an empty registry
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(MapInner {
                entries: BTreeMap::new(),
                live_bytes: 0,
                submitted: 0,
                removed: 0,
            }),
        }
    }

    /// Check whether `base` is registered
    pub fn contains(&self, base: VirtAddr) -> bool {
        self.inner.lock().entries.contains_key(&base)
    }

    /// Copy of the pieces registered under `base`
    pub fn get(&self, base: VirtAddr) -> Option<PieceList> {
        self.inner.lock().entries.get(&base).cloned()
    }

    /// Get statistics
    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock();
        RegistryStats {
            live_entries: inner.entries.len(),
            live_bytes: inner.live_bytes,
            submitted: inner.submitted,
            removed: inner.removed,
        }
    }
}

impl AllocationRegistry for PointerMap {
    fn submit(&self, pieces: PieceList) -> Result<VirtAddr, PieceList> {
        let Some(base) = pieces.base() else {
            return Err(pieces);
        };

        let mut inner = self.inner.lock();
        if inner.entries.contains_key(&base) {
            return Err(pieces);
        }

        inner.live_bytes += pieces.total_size();
        inner.submitted += 1;
        inner.entries.insert(base, pieces);
        Ok(base)
    }

    fn lookup_and_remove(&self, base: VirtAddr) -> Option<PieceList> {
        let mut inner = self.inner.lock();
        let pieces = inner.entries.remove(&base)?;
        inner.live_bytes -= pieces.total_size();
        inner.removed += 1;
        Some(pieces)
    }

    fn find_containing(&self, addr: VirtAddr) -> Option<AllocationPiece> {
        let inner = self.inner.lock();
        // Entries never overlap, so only the closest base at or below `addr`
        // can contain it.
        let (_, pieces) = inner.entries.range(..=addr).next_back()?;
        pieces.piece_containing(addr).copied()
    }

    fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

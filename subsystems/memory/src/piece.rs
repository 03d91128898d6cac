//! # Requests and Pieces
//!
//! What the caller asks for ([`NodeRequest`]) and what the allocator hands
//! back to the OS at free time ([`PieceList`]).

use alloc::vec::Vec;

use silo_hal::{OsNode, VirtAddr};
use silo_topology::LogicalNode;

// =============================================================================
// Requests
// =============================================================================

/// One piece of a multi-node array as requested by the caller
///
/// `size` is updated in place to the rounded length actually allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRequest {
    /// Node the piece should live on
    pub node: LogicalNode,
    /// Length in bytes
    pub size: usize,
}

impl NodeRequest {
    /// Create a request
    pub const fn new(node: LogicalNode, size: usize) -> Self {
        Self { node, size }
    }
}

// =============================================================================
// Pieces
// =============================================================================

/// One committed, node-pinned region of a multi-node array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocationPiece {
    /// Start of the region
    pub addr: VirtAddr,
    /// Length in bytes, a multiple of the allocation unit
    pub size: usize,
    /// Node the region is pinned to
    pub node: OsNode,
}

impl AllocationPiece {
    /// First address past the piece
    #[inline]
    pub fn end(&self) -> VirtAddr {
        self.addr + self.size
    }

    /// Check whether `addr` falls inside the piece
    #[inline]
    pub fn contains(&self, addr: VirtAddr) -> bool {
        self.addr <= addr && addr < self.end()
    }
}

/// Ordered pieces making up one multi-node array
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PieceList {
    pieces: Vec<AllocationPiece>,
}

impl PieceList {
    /// Empty list
    pub const fn new() -> Self {
        Self { pieces: Vec::new() }
    }

    /// Empty list with room for `capacity` pieces
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pieces: Vec::with_capacity(capacity),
        }
    }

    /// Append a piece
    pub fn push(&mut self, piece: AllocationPiece) {
        self.pieces.push(piece);
    }

    /// Address of the first piece
    pub fn base(&self) -> Option<VirtAddr> {
        self.pieces.first().map(|p| p.addr)
    }

    /// Sum of all piece lengths
    pub fn total_size(&self) -> usize {
        self.pieces.iter().map(|p| p.size).sum()
    }

    /// Number of pieces
    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    /// Check if there are no pieces
    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Check that each piece starts where the previous one ends
    pub fn is_contiguous(&self) -> bool {
        self.pieces.windows(2).all(|w| w[0].end() == w[1].addr)
    }

    /// Piece containing `addr`
    pub fn piece_containing(&self, addr: VirtAddr) -> Option<&AllocationPiece> {
        self.pieces.iter().find(|p| p.contains(addr))
    }

    /// Iterate over the pieces in address order
    pub fn iter(&self) -> core::slice::Iter<'_, AllocationPiece> {
        self.pieces.iter()
    }

    /// Pieces as a slice
    pub fn as_slice(&self) -> &[AllocationPiece] {
        &self.pieces
    }
}

impl<'a> IntoIterator for &'a PieceList {
    type Item = &'a AllocationPiece;
    type IntoIter = core::slice::Iter<'a, AllocationPiece>;

    fn into_iter(self) -> Self::IntoIter {
        self.pieces.iter()
    }
}

impl IntoIterator for PieceList {
    type Item = AllocationPiece;
    type IntoIter = alloc::vec::IntoIter<AllocationPiece>;

    fn into_iter(self) -> Self::IntoIter {
        self.pieces.into_iter()
    }
}

impl FromIterator<AllocationPiece> for PieceList {
    fn from_iter<I: IntoIterator<Item = AllocationPiece>>(iter: I) -> Self {
        Self {
            pieces: iter.into_iter().collect(),
        }
    }
}

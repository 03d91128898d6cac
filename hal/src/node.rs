//! # NUMA Node Identifiers
//!
//! OS-level node indices and fixed-size node bitmaps.

use core::fmt;

/// Largest number of OS nodes a [`NodeMask`] can describe
pub const MAX_NODES: usize = 1024;

const WORD_BITS: usize = u64::BITS as usize;
const MASK_WORDS: usize = MAX_NODES / WORD_BITS;

/// NUMA node index as the operating system numbers it
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct OsNode(u32);

impl OsNode {
    /// Create a node index
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Raw index
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for OsNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OsNode({})", self.0)
    }
}

impl fmt::Display for OsNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node{}", self.0)
    }
}

/// Set of OS nodes
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct NodeMask {
    words: [u64; MASK_WORDS],
}

impl NodeMask {
    /// Empty mask
    pub const fn new() -> Self {
        Self {
            words: [0; MASK_WORDS],
        }
    }

    /// Mask containing only `node`
    pub fn single(node: OsNode) -> Self {
        let mut mask = Self::new();
        mask.insert(node);
        mask
    }

    /// Add a node, returning `false` if it does not fit in the mask
    pub fn insert(&mut self, node: OsNode) -> bool {
        let index = node.index() as usize;
        if index >= MAX_NODES {
            return false;
        }
        self.words[index / WORD_BITS] |= 1 << (index % WORD_BITS);
        true
    }

    /// Check whether `node` is in the mask
    pub fn contains(&self, node: OsNode) -> bool {
        let index = node.index() as usize;
        index < MAX_NODES && self.words[index / WORD_BITS] & (1 << (index % WORD_BITS)) != 0
    }

    /// Number of nodes in the mask
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Check if no node is set
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Iterate over the nodes in ascending order
    pub fn iter(&self) -> impl Iterator<Item = OsNode> + '_ {
        (0..MAX_NODES)
            .filter(move |&i| self.words[i / WORD_BITS] & (1 << (i % WORD_BITS)) != 0)
            .map(|i| OsNode::new(i as u32))
    }
}

impl Default for NodeMask {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NodeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(|n| n.index())).finish()
    }
}

impl FromIterator<OsNode> for NodeMask {
    fn from_iter<I: IntoIterator<Item = OsNode>>(iter: I) -> Self {
        let mut mask = Self::new();
        for node in iter {
            mask.insert(node);
        }
        mask
    }
}

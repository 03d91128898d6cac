//! # Silo Topology
//!
//! Callers name NUMA nodes by *logical* index: a dense `0..node_count()`
//! numbering of the nodes this process may use. The operating system has its
//! own numbering, which can have gaps (offline nodes, cpusets). This crate
//! translates between the two.
//!
//! ```text
//!   logical   0     1     2
//!             │     │     │
//!   OS        0     2     3      (node 1 not allowed for this process)
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod system;
pub mod table;

use core::fmt;

use silo_hal::OsNode;

pub use system::SystemTopology;
pub use table::NodeTable;

/// NUMA node as callers number it
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct LogicalNode(u32);

impl LogicalNode {
    /// Create a logical node index
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

impl fmt::Debug for LogicalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogicalNode({})", self.0)
    }
}

impl fmt::Display for LogicalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Translation between logical and OS node numbering
pub trait TopologyService {
    /// Number of logical nodes
    fn node_count(&self) -> usize;

    /// OS index of a logical node, `None` if it does not exist
    fn os_index(&self, node: LogicalNode) -> Option<OsNode>;

    /// Logical index of an OS node, `None` if this process cannot use it
    fn logical_index(&self, node: OsNode) -> Option<LogicalNode>;
}

impl<T: TopologyService + ?Sized> TopologyService for &T {
    fn node_count(&self) -> usize {
        (**self).node_count()
    }

    fn os_index(&self, node: LogicalNode) -> Option<OsNode> {
        (**self).os_index(node)
    }

    fn logical_index(&self, node: OsNode) -> Option<LogicalNode> {
        (**self).logical_index(node)
    }
}

//! # Silo
//!
//! Topology-aware memory allocation. A caller asks for one contiguous buffer
//! made of several pieces, each placed on a chosen NUMA node, and later frees
//! the whole buffer with its base address alone.
//!
//! ## Components
//!
//! - **silo-hal**: OS virtual memory and node binding
//! - **silo-topology**: logical node numbering
//! - **silo-memory**: granularity, planning, the allocation registry and the
//!   multi-node allocator
//!
//! [`Silo`] wires the three together for the running system.
//!
//! ## Example
//!
//! ```no_run
//! use silo_core::{LogicalNode, NodeRequest, Silo};
//!
//! let silo = Silo::new();
//! let mut pieces = [
//!     NodeRequest::new(LogicalNode::new(0), 1 << 20),
//!     NodeRequest::new(LogicalNode::new(1), 1 << 20),
//! ];
//! let buffer = silo.allocate_multinode(&mut pieces)?;
//! // pieces[i].size now holds the rounded size of each piece.
//! unsafe { silo.free_multinode(buffer)? };
//! # Ok::<(), silo_core::AllocError>(())
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

use alloc::sync::Arc;
use core::fmt;
use core::ptr::NonNull;

pub use silo_hal::{OsNode, PlatformBackend, VirtAddr};
pub use silo_memory::{
    AllocError, AllocatorConfig, AllocatorStats, ErrorKind, MemResult, NodeRequest, PointerMap,
    RegistryStats,
};
pub use silo_topology::{LogicalNode, SystemTopology, TopologyService};

use silo_memory::MultiNodeAllocator;

// =============================================================================
// Version
// =============================================================================

/// Library version
pub const VERSION: Version = Version {
    major: 0,
    minor: 1,
    patch: 0,
    suffix: "",
};

/// Version structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Patch version
    pub patch: u16,
    /// Pre-release suffix, empty for releases
    pub suffix: &'static str,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.suffix.is_empty() {
            write!(f, "-{}", self.suffix)?;
        }
        Ok(())
    }
}

// =============================================================================
// Facade
// =============================================================================

/// Allocator for the running system
///
/// Thread-safe: every operation takes `&self`, and one instance can be shared
/// across threads.
#[derive(Debug)]
pub struct Silo {
    inner: MultiNodeAllocator<SystemTopology, PlatformBackend, PointerMap>,
}

static_assertions::assert_impl_all!(Silo: Send, Sync);

impl Silo {
    /// Detect the topology and create an allocator with the default configuration
    pub fn new() -> Self {
        Self::with_config(AllocatorConfig::default())
    }

    /// Detect the topology and create an allocator
    pub fn with_config(config: AllocatorConfig) -> Self {
        let inner = MultiNodeAllocator::new(
            SystemTopology::detect(),
            PlatformBackend::new(),
            Arc::new(PointerMap::new()),
            config,
        );
        log::info!(
            "Silo {}: {} node(s), allocation unit {:#x}",
            VERSION,
            inner.topology().node_count(),
            inner.allocation_unit(false)
        );
        Self { inner }
    }

    /// Number of NUMA nodes available to this process
    pub fn node_count(&self) -> usize {
        self.inner.topology().node_count()
    }

    /// Allocation unit in bytes, with or without large pages
    pub fn allocation_unit(&self, large_pages: bool) -> usize {
        self.inner.allocation_unit(large_pages)
    }

    /// Logical node of the calling thread's CPU, if known
    pub fn current_node(&self) -> Option<LogicalNode> {
        self.inner.topology().current_node()
    }

    /// Allocate one contiguous buffer split across nodes
    ///
    /// Each request names a logical node and a size. On success the sizes are
    /// replaced by the rounded sizes actually used.
    pub fn allocate_multinode(&self, requests: &mut [NodeRequest]) -> MemResult<NonNull<u8>> {
        self.inner.allocate_multinode(requests)
    }

    /// Free a buffer from [`allocate_multinode`](Self::allocate_multinode)
    ///
    /// # Safety
    ///
    /// Nothing may access the buffer after this call.
    pub unsafe fn free_multinode(&self, base: NonNull<u8>) -> MemResult<()> {
        // SAFETY: forwarded contract
        unsafe { self.inner.free_multinode(base) }
    }

    /// Allocate `size` bytes on one node
    pub fn allocate_single_node(&self, size: usize, node: LogicalNode) -> MemResult<NonNull<u8>> {
        self.inner.allocate_single_node(size, node)
    }

    /// Allocate `size` bytes on the calling thread's node
    ///
    /// Falls back to logical node 0 if the current node is unknown.
    pub fn allocate_local(&self, size: usize) -> MemResult<NonNull<u8>> {
        let node = self.current_node().unwrap_or(LogicalNode::new(0));
        self.inner.allocate_single_node(size, node)
    }

    /// Free a region from [`allocate_single_node`](Self::allocate_single_node)
    /// or [`allocate_local`](Self::allocate_local)
    ///
    /// # Safety
    ///
    /// `ptr` and `size` must match the allocation, and nothing may access the
    /// region after this call.
    pub unsafe fn free_single_node(&self, ptr: NonNull<u8>, size: usize) -> MemResult<()> {
        // SAFETY: forwarded contract
        unsafe { self.inner.free_single_node(ptr, size) }
    }

    /// Logical node backing `ptr`, if it lies inside a live multi-node buffer
    pub fn node_of(&self, ptr: *const u8) -> Option<LogicalNode> {
        self.inner.node_of(ptr)
    }

    /// Get allocator statistics
    pub fn stats(&self) -> AllocatorStats {
        self.inner.stats()
    }

    /// Get registry statistics
    pub fn registry_stats(&self) -> RegistryStats {
        self.inner.registry().stats()
    }
}

impl Default for Silo {
    fn default() -> Self {
        Self::new()
    }
}

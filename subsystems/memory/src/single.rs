//! # Single-Node Regions
//!
//! A region that lives entirely on one node is a single backend reservation,
//! so it needs neither a probe nor a registry entry. The caller keeps the
//! size and passes it back on free.

use core::ptr::NonNull;

use silo_hal::{HalError, NodeBackend, ReserveRequest, VirtAddr};
use silo_topology::{LogicalNode, TopologyService};

use crate::error::{AllocError, MemResult};
use crate::multinode::MultiNodeAllocator;
use crate::registry::AllocationRegistry;
use crate::stats::Counters;

impl<T, B, R> MultiNodeAllocator<T, B, R>
where
    T: TopologyService,
    B: NodeBackend,
    R: AllocationRegistry,
{
    /// Allocate `size` bytes on one node
    ///
    /// The size is rounded up to the single-node allocation unit, which
    /// includes large pages when the configuration asks for them.
    pub fn allocate_single_node(&self, size: usize, node: LogicalNode) -> MemResult<NonNull<u8>> {
        let result = self.try_allocate_single_node(size, node);
        match &result {
            Ok(_) => Counters::bump(&self.counters.single_allocs),
            Err(err) => {
                Counters::bump(&self.counters.failed_allocs);
                log::debug!("Single-node allocation failed: {}", err);
            },
        }
        result
    }

    fn try_allocate_single_node(&self, size: usize, node: LogicalNode) -> MemResult<NonNull<u8>> {
        let os_node = self
            .topology()
            .os_index(node)
            .ok_or(AllocError::InvalidNode { index: 0, node })?;
        if size == 0 {
            return Err(AllocError::EmptyRequest);
        }
        let rounded = self
            .single_granularity
            .round_up(size)
            .ok_or(AllocError::SizeOverflow)?;

        let request =
            ReserveRequest::pinned(rounded, os_node).large_pages(self.config().large_pages);
        let addr = self
            .backend()
            .reserve(&request)
            .map_err(|source| AllocError::CommitFailed {
                index: 0,
                node: os_node,
                size: rounded,
                source,
                leaked_bytes: 0,
            })?;

        log::debug!("Single-node region {}+{:#x} on {}", addr, rounded, os_node);
        addr.as_non_null().ok_or(AllocError::AddressSpaceExhausted {
            size: rounded,
            source: HalError::OutOfMemory { size: rounded },
        })
    }

    /// Free a region from [`allocate_single_node`](Self::allocate_single_node)
    ///
    /// # Safety
    ///
    /// `ptr` and `size` must match an earlier single-node allocation that was
    /// not freed yet, and nothing may access the region after this call.
    pub unsafe fn free_single_node(&self, ptr: NonNull<u8>, size: usize) -> MemResult<()> {
        let addr = VirtAddr::from(ptr);
        let rounded = self
            .single_granularity
            .round_up(size)
            .ok_or(AllocError::SizeOverflow)?;

        // SAFETY: forwarded contract
        match unsafe { self.backend().release(addr, rounded) } {
            Ok(()) => {
                Counters::bump(&self.counters.single_frees);
                Ok(())
            },
            Err(err) => {
                Counters::bump(&self.counters.incomplete_frees);
                log::warn!("Releasing single-node region {}+{:#x} failed: {}", addr, rounded, err);
                Err(AllocError::IncompleteFree {
                    base: addr,
                    leaked_pieces: 1,
                    leaked_bytes: rounded,
                })
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use silo_hal::OsNode;
    use silo_topology::NodeTable;

    use super::*;
    use crate::config::AllocatorConfig;
    use crate::registry::PointerMap;
    use crate::testing::{Call, MockBackend, UNIT};

    fn allocator(
        backend: &MockBackend,
        config: AllocatorConfig,
    ) -> MultiNodeAllocator<NodeTable, &MockBackend, PointerMap> {
        MultiNodeAllocator::new(
            NodeTable::new([OsNode::new(0), OsNode::new(4)]),
            backend,
            Arc::new(PointerMap::new()),
            config,
        )
    }

    #[test]
    fn test_single_node_round_trip() {
        let backend = MockBackend::new();
        let alloc = allocator(&backend, AllocatorConfig::default());

        let ptr = alloc.allocate_single_node(5000, LogicalNode::new(1)).unwrap();
        match backend.calls()[0] {
            Call::Reserve(r) => {
                assert_eq!(r.size, 2 * UNIT);
                assert_eq!(r.node, Some(OsNode::new(4)));
                assert!(r.commits());
                assert!(!r.wants_large_pages());
            },
            other => panic!("unexpected call {:?}", other),
        }
        assert!(alloc.registry().is_empty());

        unsafe { alloc.free_single_node(ptr, 5000) }.unwrap();
        assert_eq!(backend.live_bytes(), 0);

        let stats = alloc.stats();
        assert_eq!(stats.single_allocs, 1);
        assert_eq!(stats.single_frees, 1);
    }

    #[test]
    fn test_single_node_large_pages() {
        let backend = MockBackend::new();
        let alloc = allocator(&backend, AllocatorConfig::with_large_pages());
        assert_eq!(alloc.allocation_unit(true), 2 << 20);

        let ptr = alloc.allocate_single_node(1, LogicalNode::new(0)).unwrap();
        assert_eq!(backend.live_bytes(), 2 << 20);
        unsafe { alloc.free_single_node(ptr, 1) }.unwrap();
        assert_eq!(backend.live_bytes(), 0);
    }

    #[test]
    fn test_single_node_large_pages_unavailable() {
        let backend = MockBackend::new();
        backend.without_large_pages();
        let alloc = allocator(&backend, AllocatorConfig::with_large_pages());

        let err = alloc.allocate_single_node(4096, LogicalNode::new(0)).unwrap_err();
        assert!(matches!(
            err,
            AllocError::CommitFailed {
                source: HalError::LargePagesUnavailable,
                ..
            }
        ));
    }

    #[test]
    fn test_single_node_rejects_bad_input() {
        let backend = MockBackend::new();
        let alloc = allocator(&backend, AllocatorConfig::default());

        assert_eq!(
            alloc.allocate_single_node(4096, LogicalNode::new(2)),
            Err(AllocError::InvalidNode {
                index: 0,
                node: LogicalNode::new(2)
            })
        );
        assert_eq!(
            alloc.allocate_single_node(0, LogicalNode::new(0)),
            Err(AllocError::EmptyRequest)
        );
        assert!(backend.calls().is_empty());
        assert_eq!(alloc.stats().failed_allocs, 2);
    }

    #[test]
    fn test_single_node_commit_failure() {
        let backend = MockBackend::new();
        backend.fail_node(OsNode::new(0));
        let alloc = allocator(&backend, AllocatorConfig::default());

        let err = alloc.allocate_single_node(4096, LogicalNode::new(0)).unwrap_err();
        assert!(matches!(err, AllocError::CommitFailed { index: 0, .. }));
        assert_eq!(backend.live_bytes(), 0);
    }

    #[test]
    fn test_single_node_release_failure() {
        let backend = MockBackend::new();
        let alloc = allocator(&backend, AllocatorConfig::default());
        let ptr = alloc.allocate_single_node(4096, LogicalNode::new(0)).unwrap();
        backend.fail_release(VirtAddr::from(ptr));

        assert_eq!(
            unsafe { alloc.free_single_node(ptr, 4096) },
            Err(AllocError::IncompleteFree {
                base: VirtAddr::from(ptr),
                leaked_pieces: 1,
                leaked_bytes: 4096
            })
        );
    }
}

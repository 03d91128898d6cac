//! # Multi-Node Array Allocator
//!
//! Builds one contiguous buffer out of several node-pinned OS regions and
//! tears it down again.
//!
//! Allocation runs in four phases:
//!
//! 1. **Plan**: resolve every logical node, round every size to the
//!    allocation unit, and pad the last piece until the rounded total covers
//!    the requested total.
//! 2. **Probe**: reserve the whole span without committing it, only to learn
//!    a base address where it fits, then release it.
//! 3. **Commit**: reserve-and-commit each piece at `base + offset`, pinned to
//!    its node. The first failure releases every piece already committed.
//! 4. **Register**: hand the piece list to the registry under the base
//!    address.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::ptr::NonNull;

use silo_hal::{HalError, NodeBackend, OsNode, ReserveRequest, VirtAddr};
use silo_topology::{LogicalNode, TopologyService};

use crate::config::AllocatorConfig;
use crate::error::{AllocError, MemResult};
use crate::granularity::Granularity;
use crate::piece::{AllocationPiece, NodeRequest, PieceList};
use crate::registry::{AllocationRegistry, PointerMap};
use crate::stats::{AllocatorStats, Counters};

// =============================================================================
// Planning
// =============================================================================

/// One piece as planned, before anything is reserved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PiecePlan {
    /// Target node
    pub node: OsNode,
    /// Rounded length in bytes
    pub size: usize,
}

/// Normalized layout of a multi-node array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Pieces in address order
    pub pieces: Vec<PiecePlan>,
    /// Sum of the caller's sizes
    pub requested: usize,
    /// Sum of the planned sizes
    pub total: usize,
}

/// Resolve nodes, round sizes and pad the last piece
///
/// Touches no OS resource. Fails if any node is unknown, if the rounded
/// sizes add up to zero, or if a piece is still empty after padding.
pub fn plan_pieces<T: TopologyService + ?Sized>(
    topology: &T,
    granularity: &Granularity,
    requests: &[NodeRequest],
) -> MemResult<Plan> {
    let nodes = requests
        .iter()
        .enumerate()
        .map(|(index, req)| {
            topology
                .os_index(req.node)
                .ok_or(AllocError::InvalidNode {
                    index,
                    node: req.node,
                })
        })
        .collect::<MemResult<Vec<_>>>()?;

    let mut pieces = Vec::with_capacity(requests.len());
    let mut requested: usize = 0;
    let mut total: usize = 0;

    for (req, node) in requests.iter().zip(nodes) {
        let size = granularity.round(req.size).ok_or(AllocError::SizeOverflow)?;
        requested = requested
            .checked_add(req.size)
            .ok_or(AllocError::SizeOverflow)?;
        total = total.checked_add(size).ok_or(AllocError::SizeOverflow)?;
        pieces.push(PiecePlan { node, size });
    }

    if total == 0 {
        return Err(AllocError::EmptyRequest);
    }

    // Independent rounding can undershoot; the last piece absorbs the rest,
    // one unit at a time.
    if total < requested {
        let padding = granularity
            .round_up(requested - total)
            .ok_or(AllocError::SizeOverflow)?;
        total = total.checked_add(padding).ok_or(AllocError::SizeOverflow)?;
        if let Some(last) = pieces.last_mut() {
            last.size += padding;
        }
    }

    if let Some(index) = pieces.iter().position(|p| p.size == 0) {
        return Err(AllocError::EmptyPiece { index });
    }

    Ok(Plan {
        pieces,
        requested,
        total,
    })
}

// =============================================================================
// Allocator
// =============================================================================

/// Multi-node array allocator
///
/// Owns its topology service and backend and shares the registry, which
/// callers may inspect or hand to several allocators.
#[derive(Debug)]
pub struct MultiNodeAllocator<T, B, R = PointerMap> {
    topology: T,
    backend: B,
    registry: Arc<R>,
    config: AllocatorConfig,
    /// Unit for multi-node pieces (never large pages)
    granularity: Granularity,
    /// Unit for single-node regions
    pub(crate) single_granularity: Granularity,
    pub(crate) counters: Counters,
}

impl<T, B, R> MultiNodeAllocator<T, B, R>
where
    T: TopologyService,
    B: NodeBackend,
    R: AllocationRegistry,
{
    /// Create an allocator
    pub fn new(topology: T, backend: B, registry: Arc<R>, config: AllocatorConfig) -> Self {
        let info = backend.system_info();
        Self {
            granularity: Granularity::from_system(&info, false),
            single_granularity: Granularity::from_system(&info, config.large_pages),
            topology,
            backend,
            registry,
            config,
            counters: Counters::default(),
        }
    }

    /// Topology service
    pub fn topology(&self) -> &T {
        &self.topology
    }

    /// Backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Shared registry
    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    /// Configuration
    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Allocation unit in bytes
    pub fn allocation_unit(&self, large_pages: bool) -> usize {
        Granularity::from_system(&self.backend.system_info(), large_pages).unit()
    }

    /// Get statistics
    pub fn stats(&self) -> AllocatorStats {
        self.counters.snapshot()
    }

    /// Allocate a multi-node array
    ///
    /// On success each request's `size` holds the rounded length of its
    /// piece, and the returned pointer is the start of the whole buffer.
    /// On failure the requests are left untouched and nothing stays
    /// allocated.
    pub fn allocate_multinode(&self, requests: &mut [NodeRequest]) -> MemResult<NonNull<u8>> {
        let result = self.try_allocate_multinode(requests);
        match &result {
            Ok(_) => Counters::bump(&self.counters.multinode_allocs),
            Err(err) => {
                Counters::bump(&self.counters.failed_allocs);
                log::debug!("Multi-node allocation failed: {}", err);
            },
        }
        result
    }

    fn try_allocate_multinode(&self, requests: &mut [NodeRequest]) -> MemResult<NonNull<u8>> {
        let plan = plan_pieces(&self.topology, &self.granularity, requests)?;
        log::debug!(
            "Multi-node plan: {} piece(s), {} bytes requested, {} bytes reserved",
            plan.pieces.len(),
            plan.requested,
            plan.total
        );

        let base = self.probe(plan.total)?;
        let pieces = self.commit(base, &plan)?;

        let base = match self.registry.submit(pieces) {
            Ok(base) => base,
            Err(pieces) => {
                log::warn!("Base {} already registered, rolling back", base);
                let leaked_bytes = self.rollback(&pieces);
                return Err(AllocError::AlreadyRegistered { base, leaked_bytes });
            },
        };

        for (req, piece) in requests.iter_mut().zip(&plan.pieces) {
            req.size = piece.size;
        }

        base.as_non_null().ok_or(AllocError::AddressSpaceExhausted {
            size: plan.total,
            source: HalError::OutOfMemory { size: plan.total },
        })
    }

    /// Find a base address with `size` bytes of free address space after it
    fn probe(&self, size: usize) -> MemResult<VirtAddr> {
        let request = ReserveRequest::probe(size).on(self.config.probe_node);
        let base = self
            .backend
            .reserve(&request)
            .map_err(|source| AllocError::AddressSpaceExhausted { size, source })?;

        // SAFETY: the probe was reserved just above and never handed out
        if let Err(source) = unsafe { self.backend.release(base, size) } {
            log::warn!("Releasing probe {}+{:#x} failed: {}", base, size, source);
            return Err(AllocError::AddressSpaceExhausted { size, source });
        }

        if base.is_null() {
            return Err(AllocError::AddressSpaceExhausted {
                size,
                source: HalError::OutOfMemory { size },
            });
        }

        Ok(base)
    }

    /// Commit every planned piece back to back from `base`
    fn commit(&self, base: VirtAddr, plan: &Plan) -> MemResult<PieceList> {
        let mut pieces = PieceList::with_capacity(plan.pieces.len());
        let mut addr = base;

        for (index, planned) in plan.pieces.iter().enumerate() {
            let request = ReserveRequest::pinned(planned.size, planned.node).at(addr);
            let result = self.backend.reserve(&request).and_then(|got| {
                if got == addr {
                    return Ok(got);
                }
                log::warn!("Backend placed piece {} at {} instead of {}", index, got, addr);
                // SAFETY: reserved just above and never handed out
                if let Err(err) = unsafe { self.backend.release(got, planned.size) } {
                    log::warn!("Releasing misplaced {}+{:#x} failed: {}", got, planned.size, err);
                }
                Err(HalError::AddressUnavailable {
                    addr,
                    size: planned.size,
                })
            });

            match result {
                Ok(got) => {
                    log::debug!("Piece {}: {}+{:#x} on {}", index, got, planned.size, planned.node);
                    pieces.push(AllocationPiece {
                        addr: got,
                        size: planned.size,
                        node: planned.node,
                    });
                    addr = addr + planned.size;
                },
                Err(source) => {
                    log::warn!(
                        "Piece {} ({}+{:#x} on {}) failed: {}; rolling back {} piece(s)",
                        index,
                        addr,
                        planned.size,
                        planned.node,
                        source,
                        pieces.len()
                    );
                    let leaked_bytes = self.rollback(&pieces);
                    return Err(AllocError::CommitFailed {
                        index,
                        node: planned.node,
                        size: planned.size,
                        source,
                        leaked_bytes,
                    });
                },
            }
        }

        Ok(pieces)
    }

    /// Release pieces of an allocation that never reached the caller
    ///
    /// Returns the number of bytes that could not be released.
    fn rollback(&self, pieces: &PieceList) -> usize {
        if pieces.is_empty() {
            return 0;
        }
        Counters::bump(&self.counters.rollbacks);

        let mut leaked = 0;
        for piece in pieces {
            // SAFETY: committed during this call and never handed out
            if let Err(err) = unsafe { self.backend.release(piece.addr, piece.size) } {
                log::warn!("Rollback of {}+{:#x} failed: {}", piece.addr, piece.size, err);
                leaked += piece.size;
            }
        }
        leaked
    }

    /// Free a multi-node array
    ///
    /// Every piece is released even if an earlier one fails. The registry
    /// entry is gone either way, so the same pointer can never be freed twice.
    ///
    /// # Safety
    ///
    /// If `base` came from [`allocate_multinode`](Self::allocate_multinode),
    /// nothing may access the buffer after this call.
    pub unsafe fn free_multinode(&self, base: NonNull<u8>) -> MemResult<()> {
        let base = VirtAddr::from(base);

        let Some(pieces) = self.registry.lookup_and_remove(base) else {
            Counters::bump(&self.counters.misuse);
            log::warn!("Free of unknown multi-node array {}", base);
            return Err(AllocError::NotFound(base));
        };
        Counters::bump(&self.counters.multinode_frees);

        let mut leaked_pieces = 0;
        let mut leaked_bytes = 0;
        for piece in &pieces {
            // SAFETY: the registry entry proves the piece is live, and the
            // caller gave up access to the buffer
            if let Err(err) = unsafe { self.backend.release(piece.addr, piece.size) } {
                log::warn!("Releasing {}+{:#x} failed: {}", piece.addr, piece.size, err);
                leaked_pieces += 1;
                leaked_bytes += piece.size;
            }
        }

        if leaked_pieces > 0 {
            Counters::bump(&self.counters.incomplete_frees);
            return Err(AllocError::IncompleteFree {
                base,
                leaked_pieces,
                leaked_bytes,
            });
        }

        log::debug!("Freed multi-node array {} ({} piece(s))", base, pieces.len());
        Ok(())
    }

    /// Logical node backing `ptr`, if it lies inside a live multi-node array
    pub fn node_of(&self, ptr: *const u8) -> Option<LogicalNode> {
        let piece = self.registry.find_containing(VirtAddr::from_ptr(ptr))?;
        self.topology.logical_index(piece.node)
    }
}

//! # Silo Memory Subsystem
//!
//! Multi-node arrays: one contiguous buffer whose pages are split across
//! NUMA nodes.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                      MultiNodeAllocator                       │
//! │                                                               │
//! │   plan ──► probe ──► commit piece 0..N ──► submit to registry │
//! │                          │ failure                            │
//! │                          └──► release committed pieces        │
//! └───────┬──────────────────┬──────────────────────┬─────────────┘
//!         │                  │                      │
//!  ┌──────┴──────┐   ┌───────┴───────┐   ┌──────────┴──────────┐
//!  │ Granularity │   │  NodeBackend  │   │ AllocationRegistry  │
//!  │  (rounding) │   │  (silo-hal)   │   │    (PointerMap)     │
//!  └─────────────┘   └───────────────┘   └─────────────────────┘
//! ```
//!
//! Most virtual memory APIs that place memory on a node want an explicit
//! address for every call, and none reserves several node-pinned ranges
//! atomically. The allocator therefore reserves the whole span once to find a
//! free base address, releases it, and then commits the pieces one after the
//! other at consecutive addresses.
//!
//! ## Known limitation
//!
//! Between releasing the probe and committing the first piece, other code in
//! the process can map something into the probed range. The commit then fails
//! and the allocation is rolled back; it is not retried.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod config;
pub mod error;
pub mod granularity;
pub mod multinode;
pub mod piece;
pub mod registry;
pub mod stats;

mod single;

#[cfg(test)]
mod testing;

pub use config::AllocatorConfig;
pub use error::{AllocError, ErrorKind, MemResult};
pub use granularity::Granularity;
pub use multinode::{plan_pieces, MultiNodeAllocator, PiecePlan, Plan};
pub use piece::{AllocationPiece, NodeRequest, PieceList};
pub use registry::{AllocationRegistry, PointerMap, RegistryStats};
pub use stats::AllocatorStats;

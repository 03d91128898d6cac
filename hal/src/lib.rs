//! # Silo Platform Layer
//!
//! Everything in Silo that talks to the operating system lives here:
//!
//! - **Addresses**: [`VirtAddr`], a plain integer address that can be shared
//!   across threads and used as a map key.
//! - **Nodes**: [`OsNode`] indices and [`NodeMask`] bitmaps as the OS sees them.
//! - **Backends**: the [`NodeBackend`] trait (reserve a region pinned to one
//!   node, release it) and one implementation per operating system.
//! - **Topology queries**: [`online_nodes`] and [`current_node`].
//!
//! ## Platform selection
//!
//! The backend is chosen at build time, never at runtime:
//!
//! ```text
//! target_os = "linux"    ──► LinuxBackend    (mmap + mbind)
//! target_os = "windows"  ──► WindowsBackend  (VirtualAllocExNuma)
//! other unix             ──► UnixBackend     (mmap, single node)
//! ```
//!
//! Whatever the target, the selected type is re-exported as
//! [`PlatformBackend`].

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod addr;
pub mod backend;
pub mod node;

#[cfg(unix)]
mod mmap;

pub use addr::VirtAddr;
pub use backend::{HalError, HalResult, NodeBackend, ReserveFlags, ReserveRequest, SystemInfo};
pub use node::{NodeMask, OsNode, MAX_NODES};

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod linux;
        pub use linux::{current_node, online_nodes, LinuxBackend as PlatformBackend};
    } else if #[cfg(windows)] {
        mod windows;
        pub use windows::{current_node, online_nodes, WindowsBackend as PlatformBackend};
    } else if #[cfg(unix)] {
        mod unix;
        pub use unix::{current_node, online_nodes, UnixBackend as PlatformBackend};
    } else {
        compile_error!("silo-hal has no virtual memory backend for this target");
    }
}

static_assertions::assert_impl_all!(PlatformBackend: Send, Sync, core::fmt::Debug);

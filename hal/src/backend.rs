//! # Single-Node Backend
//!
//! The contract every platform implements: reserve (and optionally commit) a
//! virtual memory region pinned to one node, at an OS-chosen or explicit
//! address, and release it again.

use core::fmt;

use bitflags::bitflags;

use crate::addr::VirtAddr;
use crate::node::OsNode;

// ============================================================================
// ERRORS
// ============================================================================

/// Backend result type
pub type HalResult<T> = Result<T, HalError>;

/// Backend error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// A zero-length region was requested
    ZeroSize,
    /// Not enough address space or memory to satisfy the request
    OutOfMemory {
        /// Requested length in bytes
        size: usize,
    },
    /// The requested address range is already in use
    AddressUnavailable {
        /// Requested start address
        addr: VirtAddr,
        /// Requested length in bytes
        size: usize,
    },
    /// The platform cannot place memory on this node
    NodeUnsupported(OsNode),
    /// Binding the region to a node failed
    BindFailed {
        /// Target node
        node: OsNode,
        /// OS error code
        code: i32,
    },
    /// Releasing a region failed
    ReleaseFailed {
        /// Region start
        addr: VirtAddr,
        /// Region length in bytes
        size: usize,
        /// OS error code
        code: i32,
    },
    /// Large pages are not available on this system
    LargePagesUnavailable,
    /// Any other OS error
    Os(i32),
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroSize => write!(f, "Zero-length region requested"),
            Self::OutOfMemory { size } => write!(f, "Out of memory reserving {} bytes", size),
            Self::AddressUnavailable { addr, size } => {
                write!(f, "Address range {}+{:#x} is unavailable", addr, size)
            },
            Self::NodeUnsupported(node) => write!(f, "Cannot place memory on {}", node),
            Self::BindFailed { node, code } => {
                write!(f, "Binding to {} failed: OS error {}", node, code)
            },
            Self::ReleaseFailed { addr, size, code } => write!(
                f,
                "Releasing {}+{:#x} failed: OS error {}",
                addr, size, code
            ),
            Self::LargePagesUnavailable => write!(f, "Large pages are unavailable"),
            Self::Os(code) => write!(f, "OS error {}", code),
        }
    }
}

// ============================================================================
// SYSTEM INFORMATION
// ============================================================================

/// Virtual memory parameters reported by the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemInfo {
    /// Page size in bytes
    pub page_size: usize,
    /// Granularity of region start addresses in bytes
    pub allocation_granularity: usize,
    /// Smallest large page, if large pages exist
    pub large_page_minimum: Option<usize>,
}

// ============================================================================
// RESERVATION REQUESTS
// ============================================================================

bitflags! {
    /// Options for a reservation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ReserveFlags: u32 {
        /// Back the region with memory instead of only claiming address space
        const COMMIT = 1 << 0;
        /// Use large pages
        const LARGE_PAGES = 1 << 1;
    }
}

/// One reserve call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveRequest {
    /// Region length in bytes
    pub size: usize,
    /// Node to pin to, `None` for the OS default
    pub node: Option<OsNode>,
    /// Exact start address, `None` to let the OS choose
    pub addr: Option<VirtAddr>,
    /// Options
    pub flags: ReserveFlags,
}

impl ReserveRequest {
    /// Address-space-only reservation anywhere, on no particular node
    pub const fn probe(size: usize) -> Self {
        Self {
            size,
            node: None,
            addr: None,
            flags: ReserveFlags::empty(),
        }
    }

    /// Committed region pinned to `node`
    pub const fn pinned(size: usize, node: OsNode) -> Self {
        Self {
            size,
            node: Some(node),
            addr: None,
            flags: ReserveFlags::COMMIT,
        }
    }

    /// Place the region at exactly `addr`
    pub const fn at(mut self, addr: VirtAddr) -> Self {
        self.addr = Some(addr);
        self
    }

    /// Override the node, `None` for the OS default
    pub const fn on(mut self, node: Option<OsNode>) -> Self {
        self.node = node;
        self
    }

    /// Request large pages
    pub fn large_pages(mut self, enabled: bool) -> Self {
        self.flags.set(ReserveFlags::LARGE_PAGES, enabled);
        self
    }

    /// Check whether memory is committed
    pub const fn commits(&self) -> bool {
        self.flags.contains(ReserveFlags::COMMIT)
    }

    /// Check whether large pages are requested
    pub const fn wants_large_pages(&self) -> bool {
        self.flags.contains(ReserveFlags::LARGE_PAGES)
    }
}

// ============================================================================
// BACKEND TRAIT
// ============================================================================

/// Reserve and release node-pinned virtual memory
pub trait NodeBackend {
    /// Virtual memory parameters of this system
    fn system_info(&self) -> SystemInfo;

    /// Reserve a region as described by `request`
    ///
    /// With an explicit address the region starts exactly there or the call
    /// fails; the backend never silently moves it.
    fn reserve(&self, request: &ReserveRequest) -> HalResult<VirtAddr>;

    /// Release a region previously returned by [`reserve`](Self::reserve)
    ///
    /// # Safety
    ///
    /// `addr` and `size` must describe exactly one live region obtained from
    /// this backend, and nothing may access it afterwards.
    unsafe fn release(&self, addr: VirtAddr, size: usize) -> HalResult<()>;
}

impl<B: NodeBackend + ?Sized> NodeBackend for &B {
    fn system_info(&self) -> SystemInfo {
        (**self).system_info()
    }

    fn reserve(&self, request: &ReserveRequest) -> HalResult<VirtAddr> {
        (**self).reserve(request)
    }

    unsafe fn release(&self, addr: VirtAddr, size: usize) -> HalResult<()> {
        // SAFETY: forwarded contract
        unsafe { (**self).release(addr, size) }
    }
}

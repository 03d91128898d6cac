//! # Generic Unix Backend
//!
//! For Unix systems without a node placement API. The whole machine is node
//! 0; regions are plain anonymous mappings. Explicit addresses are passed as
//! hints and verified after the call.

use crate::addr::VirtAddr;
use crate::backend::{HalError, HalResult, NodeBackend, ReserveRequest, SystemInfo};
use crate::mmap;
use crate::node::{NodeMask, OsNode};

const ONLY_NODE: OsNode = OsNode::new(0);

/// Single-node Unix backend
#[derive(Debug, Clone, Copy)]
pub struct UnixBackend {
    info: SystemInfo,
}

impl UnixBackend {
    /// Create a backend
    pub fn new() -> Self {
        let page_size = mmap::page_size();
        Self {
            info: SystemInfo {
                page_size,
                allocation_granularity: page_size,
                large_page_minimum: None,
            },
        }
    }
}

impl Default for UnixBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeBackend for UnixBackend {
    fn system_info(&self) -> SystemInfo {
        self.info
    }

    fn reserve(&self, request: &ReserveRequest) -> HalResult<VirtAddr> {
        if let Some(node) = request.node.filter(|&n| n != ONLY_NODE) {
            return Err(HalError::NodeUnsupported(node));
        }
        if request.wants_large_pages() {
            return Err(HalError::LargePagesUnavailable);
        }
        mmap::map(request.addr, request.size, request.commits(), 0)
    }

    unsafe fn release(&self, addr: VirtAddr, size: usize) -> HalResult<()> {
        // SAFETY: guaranteed by the caller
        unsafe { mmap::unmap(addr, size) }
    }
}

/// Always node 0 alone
pub fn online_nodes() -> NodeMask {
    NodeMask::single(ONLY_NODE)
}

/// Always node 0
pub fn current_node() -> Option<OsNode> {
    Some(ONLY_NODE)
}

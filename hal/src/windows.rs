//! # Windows Backend
//!
//! `VirtualAllocExNuma` reserves, commits and pins in one call, and accepts
//! an explicit start address; `VirtualFreeEx(MEM_RELEASE)` gives the whole
//! region back.

use core::ffi::c_void;
use core::mem::MaybeUninit;
use core::ptr;

use windows_sys::Win32::Foundation::GetLastError;
use windows_sys::Win32::System::Kernel::PROCESSOR_NUMBER;
use windows_sys::Win32::System::Memory::{
    GetLargePageMinimum, VirtualAllocExNuma, VirtualFreeEx, MEM_COMMIT, MEM_LARGE_PAGES,
    MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE,
};
use windows_sys::Win32::System::SystemInformation::{
    GetNumaHighestNodeNumber, GetNumaProcessorNodeEx, GetSystemInfo, SYSTEM_INFO,
};
use windows_sys::Win32::System::Threading::{GetCurrentProcess, GetCurrentProcessorNumberEx};

use crate::addr::VirtAddr;
use crate::backend::{HalError, HalResult, NodeBackend, ReserveRequest, SystemInfo};
use crate::node::{NodeMask, OsNode};

const NUMA_NO_PREFERRED_NODE: u32 = u32::MAX;
const ERROR_NOT_ENOUGH_MEMORY: u32 = 8;
const ERROR_INVALID_ADDRESS: u32 = 487;
const ERROR_COMMITMENT_LIMIT: u32 = 1455;

/// Windows virtual memory backend
#[derive(Debug, Clone, Copy)]
pub struct WindowsBackend {
    info: SystemInfo,
}

impl WindowsBackend {
    /// Create a backend, querying page sizes once
    pub fn new() -> Self {
        let mut raw = MaybeUninit::<SYSTEM_INFO>::uninit();
        // SAFETY: GetSystemInfo fills the whole structure
        let raw = unsafe {
            GetSystemInfo(raw.as_mut_ptr());
            raw.assume_init()
        };

        // SAFETY: no preconditions
        let large = unsafe { GetLargePageMinimum() };

        let info = SystemInfo {
            page_size: raw.dwPageSize as usize,
            allocation_granularity: raw.dwAllocationGranularity as usize,
            large_page_minimum: (cfg!(feature = "large_pages") && large > 0).then_some(large),
        };
        log::debug!(
            "Windows backend: page {:#x}, granularity {:#x}, large page {:?}",
            info.page_size,
            info.allocation_granularity,
            info.large_page_minimum
        );
        Self { info }
    }
}

impl Default for WindowsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeBackend for WindowsBackend {
    fn system_info(&self) -> SystemInfo {
        self.info
    }

    fn reserve(&self, request: &ReserveRequest) -> HalResult<VirtAddr> {
        if request.size == 0 {
            return Err(HalError::ZeroSize);
        }

        let mut kind = MEM_RESERVE;
        if request.commits() {
            kind |= MEM_COMMIT;
        }
        if request.wants_large_pages() {
            if self.info.large_page_minimum.is_none() {
                return Err(HalError::LargePagesUnavailable);
            }
            kind |= MEM_LARGE_PAGES;
        }

        let node = request.node.map_or(NUMA_NO_PREFERRED_NODE, |n| n.index());
        let want = request.addr.map_or(ptr::null(), |a| a.as_mut_ptr::<c_void>() as *const c_void);

        // SAFETY: allocating in our own process; an explicit address is never
        // forced over an existing region, the call fails instead.
        let raw = unsafe {
            VirtualAllocExNuma(GetCurrentProcess(), want, request.size, kind, PAGE_READWRITE, node)
        };
        if raw.is_null() {
            // SAFETY: no preconditions
            let code = unsafe { GetLastError() };
            log::trace!("VirtualAllocExNuma({:p}, {:#x}) failed: {}", want, request.size, code);
            return Err(match (code, request.addr) {
                (ERROR_INVALID_ADDRESS, Some(addr)) => HalError::AddressUnavailable {
                    addr,
                    size: request.size,
                },
                (ERROR_NOT_ENOUGH_MEMORY | ERROR_COMMITMENT_LIMIT, _) => {
                    HalError::OutOfMemory { size: request.size }
                },
                (code, _) => match request.node {
                    Some(node) => HalError::BindFailed {
                        node,
                        code: code as i32,
                    },
                    None => HalError::Os(code as i32),
                },
            });
        }

        log::trace!(
            "reserve {:p}+{:#x} on {:?} (commit: {})",
            raw,
            request.size,
            request.node,
            request.commits()
        );
        Ok(VirtAddr::from_ptr(raw))
    }

    unsafe fn release(&self, addr: VirtAddr, size: usize) -> HalResult<()> {
        log::trace!("release {}+{:#x}", addr, size);
        // SAFETY: guaranteed by the caller; MEM_RELEASE requires a zero size
        let ok = unsafe { VirtualFreeEx(GetCurrentProcess(), addr.as_mut_ptr(), 0, MEM_RELEASE) };
        if ok == 0 {
            // SAFETY: no preconditions
            let code = unsafe { GetLastError() };
            return Err(HalError::ReleaseFailed {
                addr,
                size,
                code: code as i32,
            });
        }
        Ok(())
    }
}

/// Nodes 0 through the highest node number the system reports
pub fn online_nodes() -> NodeMask {
    let mut highest: u32 = 0;
    // SAFETY: `highest` is a valid out-pointer
    if unsafe { GetNumaHighestNodeNumber(&mut highest) } == 0 {
        log::debug!("GetNumaHighestNodeNumber failed, assuming a single node");
        return NodeMask::single(OsNode::new(0));
    }
    (0..=highest).map(OsNode::new).collect()
}

/// Node of the processor the calling thread is running on
pub fn current_node() -> Option<OsNode> {
    let mut processor = MaybeUninit::<PROCESSOR_NUMBER>::uninit();
    let mut node: u16 = 0;
    // SAFETY: both out-pointers are valid; the processor number is filled
    // before GetNumaProcessorNodeEx reads it
    let ok = unsafe {
        GetCurrentProcessorNumberEx(processor.as_mut_ptr());
        GetNumaProcessorNodeEx(processor.as_ptr(), &mut node)
    };
    (ok != 0).then(|| OsNode::new(node as u32))
}

//! # Linux Backend
//!
//! Regions are created with `mmap` and pinned with `mbind(MPOL_BIND)` before
//! any page is touched, so every fault is served from the target node.
//! Explicit addresses use `MAP_FIXED_NOREPLACE`, which refuses to clobber a
//! range someone else already mapped.

use core::ffi::{c_int, c_uint, c_ulong, c_void};
use core::ptr;

use crate::addr::VirtAddr;
use crate::backend::{HalError, HalResult, NodeBackend, ReserveRequest, SystemInfo};
use crate::mmap;
use crate::node::{NodeMask, OsNode, MAX_NODES};

// From <numaif.h>
const MPOL_BIND: c_int = 2;
const MPOL_F_MEMS_ALLOWED: c_ulong = 1 << 2;

const LONG_BITS: usize = c_ulong::BITS as usize;
const MASK_LONGS: usize = MAX_NODES / LONG_BITS;

/// Linux virtual memory backend
#[derive(Debug, Clone, Copy)]
pub struct LinuxBackend {
    info: SystemInfo,
}

impl LinuxBackend {
    /// Create a backend, querying page sizes once
    pub fn new() -> Self {
        let page_size = mmap::page_size();
        let info = SystemInfo {
            page_size,
            allocation_granularity: page_size,
            large_page_minimum: huge_page_size(),
        };
        log::debug!(
            "Linux backend: page {:#x}, huge page {:?}",
            info.page_size,
            info.large_page_minimum
        );
        Self { info }
    }

    fn map_flags(&self, request: &ReserveRequest) -> HalResult<c_int> {
        let mut flags = 0;
        if request.addr.is_some() {
            flags |= libc::MAP_FIXED_NOREPLACE;
        }
        if request.wants_large_pages() {
            if !cfg!(feature = "large_pages") || self.info.large_page_minimum.is_none() {
                return Err(HalError::LargePagesUnavailable);
            }
            flags |= libc::MAP_HUGETLB;
        }
        Ok(flags)
    }
}

impl Default for LinuxBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeBackend for LinuxBackend {
    fn system_info(&self) -> SystemInfo {
        self.info
    }

    fn reserve(&self, request: &ReserveRequest) -> HalResult<VirtAddr> {
        let flags = self.map_flags(request)?;
        let addr = mmap::map(request.addr, request.size, request.commits(), flags)?;

        if let Some(node) = request.node {
            if let Err(err) = bind(addr, request.size, node) {
                // SAFETY: mapped above, never handed out
                if let Err(undo) = unsafe { mmap::unmap(addr, request.size) } {
                    log::warn!("Unmapping unbound {}+{:#x} failed: {}", addr, request.size, undo);
                }
                return Err(err);
            }
        }

        log::trace!(
            "reserve {}+{:#x} on {:?} (commit: {})",
            addr,
            request.size,
            request.node,
            request.commits()
        );
        Ok(addr)
    }

    unsafe fn release(&self, addr: VirtAddr, size: usize) -> HalResult<()> {
        log::trace!("release {}+{:#x}", addr, size);
        // SAFETY: guaranteed by the caller
        unsafe { mmap::unmap(addr, size) }
    }
}

/// Restrict future faults in the range to `node`
fn bind(addr: VirtAddr, size: usize, node: OsNode) -> HalResult<()> {
    let index = node.index() as usize;
    if index >= MAX_NODES {
        return Err(HalError::NodeUnsupported(node));
    }

    let mut mask: [c_ulong; MASK_LONGS] = [0; MASK_LONGS];
    mask[index / LONG_BITS] = 1 << (index % LONG_BITS);

    // The kernel drops the last bit of maxnode.
    // SAFETY: the range is a mapping we own; `mask` outlives the call.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_mbind,
            addr.as_mut_ptr::<c_void>(),
            size as c_ulong,
            MPOL_BIND,
            mask.as_ptr(),
            (MAX_NODES + 1) as c_ulong,
            0 as c_uint,
        )
    };
    if rc == 0 {
        return Ok(());
    }

    let code = mmap::last_error();
    // Kernels built without NUMA have exactly one node.
    if code == libc::ENOSYS && index == 0 {
        return Ok(());
    }
    log::debug!("mbind {}+{:#x} to {} failed: errno {}", addr, size, node, code);
    Err(HalError::BindFailed { node, code })
}

/// Nodes this process may allocate from
///
/// Falls back to node 0 alone when the kernel cannot tell.
pub fn online_nodes() -> NodeMask {
    let mut words: [c_ulong; MASK_LONGS] = [0; MASK_LONGS];

    // SAFETY: `words` holds MAX_NODES bits and outlives the call
    let rc = unsafe {
        libc::syscall(
            libc::SYS_get_mempolicy,
            ptr::null_mut::<c_int>(),
            words.as_mut_ptr(),
            MAX_NODES as c_ulong,
            ptr::null_mut::<c_void>(),
            MPOL_F_MEMS_ALLOWED,
        )
    };
    if rc != 0 {
        log::debug!(
            "get_mempolicy failed (errno {}), assuming a single node",
            mmap::last_error()
        );
        return NodeMask::single(OsNode::new(0));
    }

    let mask: NodeMask = (0..MAX_NODES)
        .filter(|&i| words[i / LONG_BITS] & (1 << (i % LONG_BITS)) != 0)
        .map(|i| OsNode::new(i as u32))
        .collect();

    if mask.is_empty() {
        NodeMask::single(OsNode::new(0))
    } else {
        mask
    }
}

/// Node of the CPU the calling thread is running on
pub fn current_node() -> Option<OsNode> {
    let mut cpu: c_uint = 0;
    let mut node: c_uint = 0;

    // SAFETY: both out-pointers are valid for the call; the cache argument is unused
    let rc = unsafe {
        libc::syscall(
            libc::SYS_getcpu,
            &mut cpu as *mut c_uint,
            &mut node as *mut c_uint,
            ptr::null_mut::<c_void>(),
        )
    };
    (rc == 0).then(|| OsNode::new(node))
}

// ============================================================================
// LARGE PAGES
// ============================================================================

/// Default hugetlb page size, from /proc/meminfo
fn huge_page_size() -> Option<usize> {
    let mut buf = [0u8; 8192];
    let len = read_file(b"/proc/meminfo\0", &mut buf)?;
    parse_huge_page_size(&buf[..len])
}

fn parse_huge_page_size(meminfo: &[u8]) -> Option<usize> {
    let line = meminfo
        .split(|&b| b == b'\n')
        .find(|line| line.starts_with(b"Hugepagesize:"))?;
    let text = core::str::from_utf8(&line[b"Hugepagesize:".len()..]).ok()?;
    let mut fields = text.split_whitespace();
    let value: usize = fields.next()?.parse().ok()?;
    let scale = match fields.next() {
        Some("kB") => 1024,
        Some("MB") => 1024 * 1024,
        None => 1,
        Some(_) => return None,
    };
    value.checked_mul(scale).filter(|&size| size > 0)
}

/// Read up to `buf.len()` bytes of a NUL-terminated path
fn read_file(path: &[u8], buf: &mut [u8]) -> Option<usize> {
    // SAFETY: `path` is NUL-terminated
    let fd = unsafe { libc::open(path.as_ptr().cast(), libc::O_RDONLY | libc::O_CLOEXEC) };
    if fd < 0 {
        return None;
    }

    let mut filled = 0;
    while filled < buf.len() {
        let rest = &mut buf[filled..];
        // SAFETY: `rest` is a valid writable buffer of the given length
        let n = unsafe { libc::read(fd, rest.as_mut_ptr().cast(), rest.len()) };
        if n <= 0 {
            break;
        }
        filled += n as usize;
    }

    // SAFETY: `fd` was opened above
    unsafe { libc::close(fd) };
    Some(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_huge_page_size() {
        let meminfo = b"MemTotal:       32768000 kB\n\
                        HugePages_Total:       0\n\
                        Hugepagesize:       2048 kB\n\
                        Hugetlb:               0 kB\n";
        assert_eq!(parse_huge_page_size(meminfo), Some(2 * 1024 * 1024));
    }

    #[test]
    fn test_parse_huge_page_size_missing() {
        assert_eq!(parse_huge_page_size(b"MemTotal: 1024 kB\n"), None);
        assert_eq!(parse_huge_page_size(b"Hugepagesize: 0 kB\n"), None);
    }

    #[test]
    fn test_system_info() {
        let info = LinuxBackend::new().system_info();
        assert!(info.page_size.is_power_of_two());
        assert_eq!(info.allocation_granularity, info.page_size);
    }

    #[test]
    fn test_online_nodes_not_empty() {
        let nodes = online_nodes();
        assert!(nodes.count() >= 1);
    }

    #[test]
    fn test_bind_failure_undoes_mapping() {
        let backend = LinuxBackend::new();
        let size = backend.system_info().page_size * 4;
        let beyond = OsNode::new(MAX_NODES as u32);

        let base = backend.reserve(&ReserveRequest::probe(size)).expect("reserve");
        unsafe { backend.release(base, size) }.expect("release");

        let request = ReserveRequest::probe(size).at(base).on(Some(beyond));
        assert_eq!(backend.reserve(&request), Err(HalError::NodeUnsupported(beyond)));

        // The range is free again, so an unbound placement there succeeds.
        let addr = backend
            .reserve(&ReserveRequest::probe(size).at(base))
            .expect("range released after the failed bind");
        assert_eq!(addr, base);
        unsafe { backend.release(addr, size) }.expect("release");
    }

    #[test]
    fn test_probe_then_exact_placement() {
        let backend = LinuxBackend::new();
        let size = backend.system_info().page_size * 8;

        let base = backend.reserve(&ReserveRequest::probe(size)).expect("probe");
        unsafe { backend.release(base, size) }.expect("release probe");

        // Reserve-only at the probed address; no node binding involved.
        let request = ReserveRequest::probe(size).at(base);
        let addr = backend.reserve(&request).expect("place at probed base");
        assert_eq!(addr, base);

        // A second mapping on the same range must be refused.
        assert_eq!(
            backend.reserve(&request),
            Err(HalError::AddressUnavailable { addr: base, size })
        );
        unsafe { backend.release(addr, size) }.expect("release");
    }
}

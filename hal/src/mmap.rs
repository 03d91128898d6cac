//! # Anonymous Mappings
//!
//! `mmap`/`munmap` helpers shared by the Unix backends.

use core::ptr;

use crate::addr::VirtAddr;
use crate::backend::{HalError, HalResult};

/// Fallback when `sysconf` cannot report a page size
const DEFAULT_PAGE_SIZE: usize = 4096;

/// System page size in bytes
pub(crate) fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        DEFAULT_PAGE_SIZE
    }
}

/// errno of the last failed call on this thread
pub(crate) fn last_error() -> i32 {
    errno::errno().0
}

/// Map `size` bytes of anonymous memory
///
/// Without `commit` the range is inaccessible and not charged against
/// swap. With a `hint`, the mapping must land exactly there: the caller
/// passes a flag that refuses to replace existing mappings, and a kernel
/// that treats it as a plain hint gets its mapping undone here.
pub(crate) fn map(
    hint: Option<VirtAddr>,
    size: usize,
    commit: bool,
    extra_flags: libc::c_int,
) -> HalResult<VirtAddr> {
    if size == 0 {
        return Err(HalError::ZeroSize);
    }

    let prot = if commit {
        libc::PROT_READ | libc::PROT_WRITE
    } else {
        libc::PROT_NONE
    };
    let mut flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | extra_flags;
    if !commit {
        flags |= libc::MAP_NORESERVE;
    }

    let want = hint.map_or(ptr::null_mut(), |addr| addr.as_mut_ptr());

    // SAFETY: an anonymous mapping never aliases existing Rust objects, and
    // MAP_FIXED is never used, so live mappings cannot be replaced.
    let raw = unsafe { libc::mmap(want, size, prot, flags, -1, 0) };
    if raw == libc::MAP_FAILED {
        let code = last_error();
        log::trace!("mmap({:p}, {:#x}) failed: errno {}", want, size, code);
        return Err(match (code, hint) {
            (libc::ENOMEM, _) => HalError::OutOfMemory { size },
            (libc::EEXIST, Some(addr)) => HalError::AddressUnavailable { addr, size },
            _ => HalError::Os(code),
        });
    }

    let addr = VirtAddr::from_ptr(raw);
    if let Some(expected) = hint {
        if addr != expected {
            // SAFETY: `raw` was mapped just above with this length
            unsafe { libc::munmap(raw, size) };
            return Err(HalError::AddressUnavailable {
                addr: expected,
                size,
            });
        }
    }

    Ok(addr)
}

/// Unmap a range
///
/// # Safety
///
/// The range must be a mapping this process owns and no longer uses.
pub(crate) unsafe fn unmap(addr: VirtAddr, size: usize) -> HalResult<()> {
    // SAFETY: guaranteed by the caller
    if unsafe { libc::munmap(addr.as_mut_ptr(), size) } != 0 {
        return Err(HalError::ReleaseFailed {
            addr,
            size,
            code: last_error(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_power_of_two() {
        assert!(page_size().is_power_of_two());
    }

    #[test]
    fn test_reserve_only_mapping() {
        let size = page_size() * 4;
        let addr = map(None, size, false, 0).expect("reserve address space");
        assert!(addr.is_aligned(page_size()));
        unsafe { unmap(addr, size) }.expect("unmap reservation");
    }

    #[test]
    fn test_committed_mapping_is_writable() {
        let size = page_size();
        let addr = map(None, size, true, 0).expect("commit memory");
        let ptr: *mut u8 = addr.as_mut_ptr();
        unsafe {
            ptr.write(0xA5);
            assert_eq!(ptr.read(), 0xA5);
            unmap(addr, size).expect("unmap");
        }
    }

    #[test]
    fn test_zero_size_rejected() {
        assert_eq!(map(None, 0, true, 0), Err(HalError::ZeroSize));
    }
}

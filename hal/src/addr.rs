//! # Address Types
//!
//! Virtual addresses are carried as integers rather than raw pointers so that
//! allocation metadata can be stored in shared, thread-safe structures.

use core::fmt;
use core::ops::Add;
use core::ptr::NonNull;

/// A virtual memory address in the current process
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VirtAddr(usize);

static_assertions::assert_eq_size!(VirtAddr, usize);

impl VirtAddr {
    /// Create a new virtual address
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Create a null (zero) virtual address
    #[inline]
    pub const fn null() -> Self {
        Self(0)
    }

    /// Create from a pointer
    #[inline]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    /// Check if this is a null address
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Get the raw address value
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Convert to a mutable pointer
    #[inline]
    pub const fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    /// Convert to a non-null pointer, `None` for the null address
    #[inline]
    pub fn as_non_null<T>(self) -> Option<NonNull<T>> {
        NonNull::new(self.as_mut_ptr())
    }

    /// Add a byte offset, `None` if the result leaves the address space
    #[inline]
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Check alignment to `align`, which must be a power of two
    #[inline]
    pub const fn is_aligned(self, align: usize) -> bool {
        self.0 & (align - 1) == 0
    }
}

impl<T> From<NonNull<T>> for VirtAddr {
    #[inline]
    fn from(ptr: NonNull<T>) -> Self {
        Self::from_ptr(ptr.as_ptr())
    }
}

impl Add<usize> for VirtAddr {
    type Output = Self;

    #[inline]
    fn add(self, rhs: usize) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::LowerHex for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

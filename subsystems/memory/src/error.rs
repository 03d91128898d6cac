//! # Allocation Errors

use core::fmt;

use silo_hal::{HalError, OsNode, VirtAddr};
use silo_topology::LogicalNode;

/// Memory subsystem result type
pub type MemResult<T> = Result<T, AllocError>;

/// Broad failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Rejected before any OS resource was touched
    InvalidInput,
    /// The OS could not provide address space or memory
    ResourceExhausted,
    /// The caller freed something this library does not own
    Misuse,
    /// A free went through but some memory could not be returned
    PartialFree,
}

/// Allocation error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// A logical node does not exist
    InvalidNode {
        /// Position of the request in the caller's list
        index: usize,
        /// The unresolvable node
        node: LogicalNode,
    },
    /// Requested sizes add up to nothing after rounding
    EmptyRequest,
    /// A piece would be zero bytes long
    EmptyPiece {
        /// Position of the request in the caller's list
        index: usize,
    },
    /// Sizes do not fit in the address space
    SizeOverflow,
    /// No contiguous range of the required length was available
    AddressSpaceExhausted {
        /// Total length in bytes
        size: usize,
        /// Backend failure
        source: HalError,
    },
    /// Committing one piece failed; everything committed before it was rolled back
    CommitFailed {
        /// Position of the failed piece
        index: usize,
        /// Target node
        node: OsNode,
        /// Piece length in bytes
        size: usize,
        /// Backend failure
        source: HalError,
        /// Bytes of earlier pieces that could not be released again
        leaked_bytes: usize,
    },
    /// The base address is already registered; the new pieces were rolled back
    AlreadyRegistered {
        /// Contested base address
        base: VirtAddr,
        /// Bytes that could not be released again
        leaked_bytes: usize,
    },
    /// The address was never allocated here, or was already freed
    NotFound(VirtAddr),
    /// Some pieces could not be released; their memory is leaked
    IncompleteFree {
        /// Base address of the freed allocation
        base: VirtAddr,
        /// Number of pieces that failed to release
        leaked_pieces: usize,
        /// Bytes in those pieces
        leaked_bytes: usize,
    },
}

impl AllocError {
    /// Failure class
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidNode { .. }
            | Self::EmptyRequest
            | Self::EmptyPiece { .. }
            | Self::SizeOverflow => ErrorKind::InvalidInput,
            Self::AddressSpaceExhausted { .. }
            | Self::CommitFailed { .. }
            | Self::AlreadyRegistered { .. } => ErrorKind::ResourceExhausted,
            Self::NotFound(_) => ErrorKind::Misuse,
            Self::IncompleteFree { .. } => ErrorKind::PartialFree,
        }
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNode { index, node } => {
                write!(f, "Request {}: logical node {} does not exist", index, node)
            },
            Self::EmptyRequest => write!(f, "Requested sizes round to zero bytes"),
            Self::EmptyPiece { index } => write!(f, "Request {} rounds to zero bytes", index),
            Self::SizeOverflow => write!(f, "Requested size overflows the address space"),
            Self::AddressSpaceExhausted { size, source } => write!(
                f,
                "No contiguous {:#x}-byte address range available: {}",
                size, source
            ),
            Self::CommitFailed {
                index,
                node,
                size,
                source,
                leaked_bytes,
            } => {
                write!(
                    f,
                    "Committing piece {} ({:#x} bytes on {}) failed: {}",
                    index, size, node, source
                )?;
                if *leaked_bytes > 0 {
                    write!(f, "; {} bytes leaked in rollback", leaked_bytes)?;
                }
                Ok(())
            },
            Self::AlreadyRegistered { base, leaked_bytes } => {
                write!(f, "Address {} is already registered", base)?;
                if *leaked_bytes > 0 {
                    write!(f, "; {} bytes leaked in rollback", leaked_bytes)?;
                }
                Ok(())
            },
            Self::NotFound(addr) => write!(f, "Address {} was not allocated by Silo", addr),
            Self::IncompleteFree {
                base,
                leaked_pieces,
                leaked_bytes,
            } => write!(
                f,
                "Freed {} with {} piece(s) leaked ({} bytes)",
                base, leaked_pieces, leaked_bytes
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(AllocError::EmptyRequest.kind(), ErrorKind::InvalidInput);
        assert_eq!(
            AllocError::NotFound(VirtAddr::new(0x1000)).kind(),
            ErrorKind::Misuse
        );
        let err = AllocError::CommitFailed {
            index: 1,
            node: OsNode::new(1),
            size: 0x1000,
            source: HalError::OutOfMemory { size: 0x1000 },
            leaked_bytes: 0,
        };
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    }

    #[test]
    fn test_rollback_leak_is_reported() {
        let err = AllocError::AlreadyRegistered {
            base: VirtAddr::new(0x10000),
            leaked_bytes: 0x2000,
        };
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert!(alloc::format!("{}", err).ends_with("8192 bytes leaked in rollback"));
    }
}

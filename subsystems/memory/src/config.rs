//! # Allocator Configuration

use silo_hal::OsNode;

/// Allocator configuration parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocatorConfig {
    /// Use large pages for single-node allocations
    ///
    /// Multi-node arrays always use the regular allocation unit.
    pub large_pages: bool,
    /// Node for the probe reservation, `None` for the OS default
    pub probe_node: Option<OsNode>,
}

impl AllocatorConfig {
    /// Configuration with large pages for single-node allocations
    pub fn with_large_pages() -> Self {
        Self {
            large_pages: true,
            ..Default::default()
        }
    }

    /// Place probe reservations on `node`
    pub fn probe_on(self, node: OsNode) -> Self {
        Self {
            probe_node: Some(node),
            ..self
        }
    }
}

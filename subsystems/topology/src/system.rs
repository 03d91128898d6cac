//! # System Topology
//!
//! The topology of the machine the process runs on, detected once.

use silo_hal::OsNode;

use crate::table::NodeTable;
use crate::{LogicalNode, TopologyService};

/// Topology detected from the operating system
#[derive(Debug, Clone)]
pub struct SystemTopology {
    table: NodeTable,
}

impl SystemTopology {
    /// Query the OS for the nodes this process may allocate from
    pub fn detect() -> Self {
        let table = NodeTable::from_mask(&silo_hal::online_nodes());
        log::info!(
            "Topology: {} NUMA node(s), OS indices {:?}",
            table.node_count(),
            table.os_nodes()
        );
        Self { table }
    }

    /// Logical node of the CPU the calling thread runs on
    ///
    /// `None` if the OS cannot tell or the node is outside this process' set.
    pub fn current_node(&self) -> Option<LogicalNode> {
        silo_hal::current_node().and_then(|node| self.table.logical_index(node))
    }

    /// Underlying mapping
    pub fn table(&self) -> &NodeTable {
        &self.table
    }
}

impl TopologyService for SystemTopology {
    fn node_count(&self) -> usize {
        self.table.node_count()
    }

    fn os_index(&self, node: LogicalNode) -> Option<OsNode> {
        self.table.os_index(node)
    }

    fn logical_index(&self, node: OsNode) -> Option<LogicalNode> {
        self.table.logical_index(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_has_a_node() {
        let topo = SystemTopology::detect();
        assert!(topo.node_count() >= 1);
        assert!(topo.os_index(LogicalNode::new(0)).is_some());
        assert!(topo
            .os_index(LogicalNode::new(topo.node_count() as u32))
            .is_none());
    }

    #[test]
    fn test_current_node_is_known() {
        let topo = SystemTopology::detect();
        if let Some(node) = topo.current_node() {
            assert!((node.index() as usize) < topo.node_count());
        }
    }
}

//! # Node Table
//!
//! A fixed logical-to-OS node mapping.

use alloc::vec::Vec;

use silo_hal::{NodeMask, OsNode};

use crate::{LogicalNode, TopologyService};

/// Ordered list of OS nodes; logical node `i` is entry `i`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTable {
    os_nodes: Vec<OsNode>,
}

impl NodeTable {
    /// Build from an explicit order, dropping repeated nodes
    pub fn new<I: IntoIterator<Item = OsNode>>(nodes: I) -> Self {
        let mut os_nodes: Vec<OsNode> = Vec::new();
        for node in nodes {
            if !os_nodes.contains(&node) {
                os_nodes.push(node);
            }
        }
        Self { os_nodes }
    }

    /// Build from a mask, in ascending OS order
    pub fn from_mask(mask: &NodeMask) -> Self {
        Self {
            os_nodes: mask.iter().collect(),
        }
    }

    /// Single node 0, for machines without NUMA
    pub fn uniform() -> Self {
        Self {
            os_nodes: alloc::vec![OsNode::new(0)],
        }
    }

    /// OS nodes in logical order
    pub fn os_nodes(&self) -> &[OsNode] {
        &self.os_nodes
    }

    /// Iterate over all logical nodes
    pub fn logical_nodes(&self) -> impl Iterator<Item = LogicalNode> {
        (0..self.os_nodes.len() as u32).map(LogicalNode::new)
    }
}

impl TopologyService for NodeTable {
    fn node_count(&self) -> usize {
        self.os_nodes.len()
    }

    fn os_index(&self, node: LogicalNode) -> Option<OsNode> {
        self.os_nodes.get(node.index() as usize).copied()
    }

    fn logical_index(&self, node: OsNode) -> Option<LogicalNode> {
        self.os_nodes
            .iter()
            .position(|&n| n == node)
            .map(|i| LogicalNode::new(i as u32))
    }
}

//! Subtrees cut out of their tree's numbering.
//!
//! A subtree moves through `Attached → Detached → Attached | Purged`.
//! A soft delete yields a `Detached` subtree whose records stay in the
//! store; `TreeEngine::reattach` puts it back somewhere, `TreeEngine::purge`
//! drops its records. A hard delete yields a `Purged` subtree directly.

use crate::error::{Result, TreeError};
use crate::storage::NodeRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtreeState {
    /// Part of a tree's numbering again.
    Attached,
    /// Out of the numbering, records kept in the store.
    Detached,
    /// Records removed; the nodes are plain values without ids.
    Purged,
}

/// A self-contained subtree: re-based to `left = 1`, no parent links.
#[derive(Debug, Clone)]
pub struct DetachedSubtree<K, D> {
    nodes: Vec<NodeRecord<K, D>>,
    state: SubtreeState,
}

impl<K, D> DetachedSubtree<K, D> {
    pub(crate) fn new(mut nodes: Vec<NodeRecord<K, D>>, state: SubtreeState) -> Self {
        nodes.sort_by_key(|n| n.left);
        Self { nodes, state }
    }

    pub fn state(&self) -> SubtreeState {
        self.state
    }

    /// Nodes in tree order.
    pub fn nodes(&self) -> &[NodeRecord<K, D>] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<NodeRecord<K, D>> {
        self.nodes
    }

    /// The subtree's own root (`left == 1`).
    pub fn root(&self) -> Option<&NodeRecord<K, D>> {
        self.nodes.first()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn mark_attached(&mut self, nodes: Vec<NodeRecord<K, D>>) {
        self.nodes = nodes;
        self.state = SubtreeState::Attached;
    }

    pub(crate) fn mark_purged(&mut self) {
        for node in &mut self.nodes {
            node.id = None;
        }
        self.state = SubtreeState::Purged;
    }

    pub(crate) fn expect_detached(&self, action: &str) -> Result<()> {
        match self.state {
            SubtreeState::Detached => Ok(()),
            other => Err(TreeError::invalid(format!(
                "cannot {} a subtree in state {:?}",
                action, other
            ))),
        }
    }
}

impl<K, D> From<DetachedSubtree<K, D>> for Vec<NodeRecord<K, D>> {
    fn from(subtree: DetachedSubtree<K, D>) -> Self {
        subtree.into_nodes()
    }
}

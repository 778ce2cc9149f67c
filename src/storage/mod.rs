//! Node records and the store interface the tree engine runs on

pub mod file;
pub mod memory;

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Identifier type a store assigns to its records.
pub trait NodeKey: Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {}

impl<T> NodeKey for T where
    T: Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
}

/// Whether a record takes part in its tree's numbering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    #[default]
    Attached,
    /// Soft-deleted, kept in the store until it is re-inserted or purged.
    /// Invisible to tree scans.
    Detached,
}

/// One vertex of one tree in the forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord<K, D> {
    /// Assigned by the store on first persistence
    pub id: Option<K>,

    /// Immediate parent, None for a tree root
    pub parent_id: Option<K>,

    /// Id of the tree's root (the root carries its own id)
    pub root_id: Option<K>,

    /// Depth from the root
    pub level: i32,

    pub left: i32,

    pub right: i32,

    #[serde(default)]
    pub state: NodeState,

    /// Caller payload, opaque to the engine
    pub data: D,
}

impl<K, D> NodeRecord<K, D> {
    /// Fresh node with no coordinates, ready for a single-node insert.
    pub fn new(data: D) -> Self {
        Self {
            id: None,
            parent_id: None,
            root_id: None,
            level: 0,
            left: 0,
            right: 0,
            state: NodeState::Attached,
            data,
        }
    }

    /// Node with pre-computed relative coordinates, for batch inserts.
    pub fn with_bounds(data: D, left: i32, right: i32, level: i32) -> Self {
        Self {
            left,
            right,
            level,
            ..Self::new(data)
        }
    }

    pub fn is_detached(&self) -> bool {
        self.state == NodeState::Detached
    }

    pub fn is_root(&self) -> bool {
        self.left == 1 && self.parent_id.is_none()
    }

    /// `(right - left - 1) / 2`
    pub fn descendant_count(&self) -> usize {
        ((self.right - self.left - 1).max(0) / 2) as usize
    }

    /// Strict interval containment.
    pub fn contains(&self, other: &Self) -> bool {
        self.left < other.left && other.right < self.right
    }
}

/// Typed predicate over `left`/`right`/`level` for tree-scoped scans.
///
/// Each variant maps onto a plain range condition so SQL-backed stores can
/// push it down as a WHERE clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalFilter {
    /// Every node of the tree.
    Any,
    /// `left >= left && right <= right` (a subtree, its root included).
    Within { left: i32, right: i32 },
    /// `left > left && right < right`, optionally `level <= max_level`.
    Inside { left: i32, right: i32, max_level: Option<i32> },
    /// `left < left && right > right` (ancestors).
    Enclosing { left: i32, right: i32 },
    /// `left >= left_from || right >= right_from` (shift candidates).
    Reaching { left_from: i32, right_from: i32 },
    /// Nodes inside `(left, right)` at exactly `level`.
    ChildLevel { left: i32, right: i32, level: i32 },
}

impl IntervalFilter {
    pub fn matches(&self, left: i32, right: i32, level: i32) -> bool {
        match *self {
            IntervalFilter::Any => true,
            IntervalFilter::Within { left: l, right: r } => left >= l && right <= r,
            IntervalFilter::Inside { left: l, right: r, max_level } => {
                left > l && right < r && max_level.map_or(true, |m| level <= m)
            }
            IntervalFilter::Enclosing { left: l, right: r } => left < l && right > r,
            IntervalFilter::Reaching { left_from, right_from } => {
                left >= left_from || right >= right_from
            }
            IntervalFilter::ChildLevel { left: l, right: r, level: lv } => {
                left > l && right < r && level == lv
            }
        }
    }

    pub fn matches_node<K, D>(&self, node: &NodeRecord<K, D>) -> bool {
        self.matches(node.left, node.right, node.level)
    }
}

/// Record type a given store traffics in.
pub type StoreNode<S> = NodeRecord<<S as NodeStore>::Key, <S as NodeStore>::Data>;

/// Record store the engine runs on.
///
/// Writes are staged and become durable on `commit()`; reads see the
/// current transaction's staged writes. `rollback()` discards them.
pub trait NodeStore {
    type Key: NodeKey;
    type Data: Clone;

    /// Point lookup, attached or detached. Fails with NodeNotFound.
    fn get(&self, id: Self::Key) -> Result<StoreNode<Self>>;

    /// Attached nodes tagged `root_id` that match `filter`.
    fn scan(&self, root_id: Self::Key, filter: &IntervalFilter) -> Result<Vec<StoreNode<Self>>>;

    /// Attached tree roots across the forest.
    fn roots(&self) -> Result<Vec<StoreNode<Self>>>;

    /// Stage new records. Assigns `id` in place.
    fn add_batch(&mut self, nodes: &mut [StoreNode<Self>]) -> Result<()>;

    /// Stage modifications of existing records.
    fn update_batch(&mut self, nodes: &[StoreNode<Self>]) -> Result<()>;

    /// Stage removals.
    fn remove_batch(&mut self, ids: &[Self::Key]) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self);
}

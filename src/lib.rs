//! nestset - nested-set interval trees over a pluggable record store
//!
//! A forest of ordered trees, each node numbered with a `[left, right]`
//! interval so that subtree, ancestor and depth queries are plain range
//! filters. Trees are told apart by `root_id`, the id of their root node.
//!
//! - `TreeEngine` runs inserts, deletes, moves and queries as single store
//!   transactions.
//! - `NodeStore` is the persistence seam; `MemoryStore` and `FileStore`
//!   ship with the crate.
//! - `SharedForest` puts an engine behind an `RwLock` for multi-threaded use.

pub mod config;
pub mod error;
pub mod shared;
pub mod storage;
pub mod tree;

pub use config::{SnapshotFormat, StoreConfig};
pub use error::{Result, TreeError};
pub use shared::{AccessMode, SharedForest};
pub use storage::{
    FileStore, IntervalFilter, MemoryStore, NodeKey, NodeRecord, NodeState, NodeStore, StoreNode,
};
pub use tree::{
    DetachedSubtree, InsertMode, Placement, Rule, SubtreeState, TreeEngine, Violation,
};

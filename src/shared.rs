//! SharedForest - a TreeEngine behind an RwLock
//!
//! Readers run in parallel, writers are exclusive. The access mode is fixed
//! per handle: a `ReadOnly` forest rejects every write with `ReadOnlyMode`
//! before taking the lock.
//!
//! ```no_run
//! use std::sync::Arc;
//! use nestset::{AccessMode, MemoryStore, NodeRecord, SharedForest, TreeEngine};
//!
//! let forest = Arc::new(SharedForest::new(
//!     TreeEngine::new(MemoryStore::<String>::new()),
//!     AccessMode::ReadWrite,
//! ));
//! let root = forest
//!     .write(|engine| engine.insert_root(NodeRecord::new("Clothing".to_string())))
//!     .unwrap();
//! let tree = forest.read(|engine| engine.get_tree(root.id.unwrap())).unwrap();
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use crate::error::{Result, TreeError};
use crate::storage::NodeStore;
use crate::tree::TreeEngine;

/// Whether a `SharedForest` handle accepts mutations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    #[default]
    ReadWrite,
}

impl AccessMode {
    pub fn is_write(self) -> bool {
        self == AccessMode::ReadWrite
    }
}

impl FromStr for AccessMode {
    type Err = TreeError;

    /// Accepts `ro`/`read-only` and `rw`/`read-write`, case-insensitive.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ro" | "read-only" | "readonly" => Ok(AccessMode::ReadOnly),
            "rw" | "read-write" | "readwrite" => Ok(AccessMode::ReadWrite),
            other => Err(TreeError::invalid(format!("unknown access mode '{}'", other))),
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccessMode::ReadOnly => "ro",
            AccessMode::ReadWrite => "rw",
        })
    }
}

pub struct SharedForest<S: NodeStore> {
    engine: RwLock<TreeEngine<S>>,
    mode: AccessMode,
}

impl<S: NodeStore> SharedForest<S> {
    pub fn new(engine: TreeEngine<S>, mode: AccessMode) -> Self {
        Self {
            engine: RwLock::new(engine),
            mode,
        }
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Run a query under the read lock.
    ///
    /// A lock poisoned by a panicking writer is taken over as is: every
    /// engine call either commits or rolls back, so no half-applied
    /// mutation can be observed.
    pub fn read<T>(&self, f: impl FnOnce(&TreeEngine<S>) -> Result<T>) -> Result<T> {
        let engine = self.engine.read().unwrap_or_else(PoisonError::into_inner);
        f(&engine)
    }

    /// Run a mutation under the write lock.
    pub fn write<T>(&self, f: impl FnOnce(&mut TreeEngine<S>) -> Result<T>) -> Result<T> {
        if !self.mode.is_write() {
            return Err(TreeError::ReadOnlyMode);
        }
        let mut engine = self.engine.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut engine)
    }

    /// Number of trees in the forest (for stats)
    pub fn tree_count(&self) -> Result<usize> {
        self.read(|engine| Ok(engine.roots()?.len()))
    }

    pub fn into_engine(self) -> TreeEngine<S> {
        self.engine.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod shared_tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use crate::storage::{MemoryStore, NodeRecord};
    use crate::tree::InsertMode;

    fn make_forest(mode: AccessMode) -> SharedForest<MemoryStore<String>> {
        SharedForest::new(TreeEngine::new(MemoryStore::new()), mode)
    }

    #[test]
    fn test_access_mode_parse() {
        for text in ["ro", "read-only", "ReadOnly"] {
            assert_eq!(text.parse::<AccessMode>().unwrap(), AccessMode::ReadOnly);
        }
        for text in ["rw", "READ-WRITE"] {
            assert_eq!(text.parse::<AccessMode>().unwrap(), AccessMode::ReadWrite);
        }
        let err = "append".parse::<AccessMode>().unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn test_access_mode_display_round_trips() {
        for mode in [AccessMode::ReadOnly, AccessMode::ReadWrite] {
            assert_eq!(mode.to_string().parse::<AccessMode>().unwrap(), mode);
        }
        assert_eq!(AccessMode::default(), AccessMode::ReadWrite);
        assert!(AccessMode::ReadWrite.is_write());
        assert!(!AccessMode::ReadOnly.is_write());
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let forest = make_forest(AccessMode::ReadOnly);
        let err = forest
            .write(|engine| engine.insert_root(NodeRecord::new("A".to_string())))
            .unwrap_err();
        assert!(matches!(err, TreeError::ReadOnlyMode));
        assert_eq!(forest.tree_count().unwrap(), 0);
    }

    #[test]
    fn test_concurrent_writers_build_one_tree() {
        let forest = Arc::new(make_forest(AccessMode::ReadWrite));
        let root = forest
            .write(|engine| engine.insert_root(NodeRecord::new("root".to_string())))
            .unwrap()
            .id
            .unwrap();

        let mut handles = vec![];

        // 8 threads each append 10 children
        for t in 0..8 {
            let forest = Arc::clone(&forest);
            handles.push(thread::spawn(move || {
                for i in 0..10 {
                    forest
                        .write(|engine| {
                            let node = NodeRecord::new(format!("{}-{}", t, i));
                            engine.insert_below(root, node, InsertMode::Right)
                        })
                        .unwrap();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        let (count, violations) = forest
            .read(|engine| Ok((engine.get_descendants(root, None)?.len(), engine.verify(root)?)))
            .unwrap();
        assert_eq!(count, 80);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let forest = Arc::new(make_forest(AccessMode::ReadWrite));
        let clone = Arc::clone(&forest);
        let _ = thread::spawn(move || {
            clone
                .write(|_| -> Result<()> { panic!("writer died") })
                .ok();
        })
        .join();

        let root = forest
            .write(|engine| engine.insert_root(NodeRecord::new("after".to_string())))
            .unwrap();
        assert!(root.id.is_some());
        assert_eq!(forest.tree_count().unwrap(), 1);
    }
}

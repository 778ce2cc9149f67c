//! TreeEngine: nested-set tree operations over a `NodeStore`.
//!
//! Every mutation runs as one store transaction: all interval work is
//! staged on the store, committed once on success and rolled back on any
//! error, so a failed call leaves the forest exactly as it found it.

pub mod delete;
pub mod detached;
pub mod insert;
pub mod interval;
pub mod query;
pub mod verify;

use crate::error::{Result, TreeError};
use crate::storage::{IntervalFilter, NodeStore, StoreNode};

pub use detached::{DetachedSubtree, SubtreeState};
pub use verify::{Rule, Violation};

/// Side of the anchor a batch lands on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InsertMode {
    #[default]
    Left,
    Right,
}

/// What a batch is placed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement<K> {
    /// Start a new tree.
    Root,
    /// First (Left) or last (Right) child of the given node.
    Below(K),
    /// Immediately before (Left) or after (Right) the given node.
    NextTo(K),
}

impl<K> Placement<K> {
    fn anchor(&self) -> Option<&K> {
        match self {
            Placement::Root => None,
            Placement::Below(id) | Placement::NextTo(id) => Some(id),
        }
    }
}

pub struct TreeEngine<S: NodeStore> {
    store: S,
}

impl<S: NodeStore> TreeEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Raw store access. Writes made here bypass the tree invariants.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn transaction<T>(&mut self, op: &str, f: impl FnOnce(&mut S) -> Result<T>) -> Result<T> {
        let result = f(&mut self.store).and_then(|value| {
            self.store.commit()?;
            Ok(value)
        });
        if let Err(err) = &result {
            self.store.rollback();
            tracing::warn!("{} failed, rolled back: {}", op, err);
        }
        result
    }

    // ── Inserts ────────────────────────────────────────────────────

    /// Place `batch` at `placement`. Returns the batch in tree order with
    /// ids, bounds, levels and links as stored.
    pub fn insert(
        &mut self,
        placement: Placement<S::Key>,
        batch: impl Into<Vec<StoreNode<S>>>,
        mode: InsertMode,
    ) -> Result<Vec<StoreNode<S>>> {
        let batch = batch.into();
        self.transaction("insert", |store| insert::insert(store, placement, batch, mode))
    }

    fn insert_one(
        &mut self,
        placement: Placement<S::Key>,
        node: StoreNode<S>,
        mode: InsertMode,
    ) -> Result<StoreNode<S>> {
        self.insert(placement, vec![node], mode)?
            .into_iter()
            .next()
            .ok_or_else(|| TreeError::invalid("insert returned no node"))
    }

    pub fn insert_root(&mut self, node: StoreNode<S>) -> Result<StoreNode<S>> {
        self.insert_one(Placement::Root, node, InsertMode::Left)
    }

    pub fn insert_root_batch(
        &mut self,
        batch: impl Into<Vec<StoreNode<S>>>,
    ) -> Result<Vec<StoreNode<S>>> {
        self.insert(Placement::Root, batch, InsertMode::Left)
    }

    pub fn insert_below(
        &mut self,
        parent_id: S::Key,
        node: StoreNode<S>,
        mode: InsertMode,
    ) -> Result<StoreNode<S>> {
        self.insert_one(Placement::Below(parent_id), node, mode)
    }

    pub fn insert_below_batch(
        &mut self,
        parent_id: S::Key,
        batch: impl Into<Vec<StoreNode<S>>>,
        mode: InsertMode,
    ) -> Result<Vec<StoreNode<S>>> {
        self.insert(Placement::Below(parent_id), batch, mode)
    }

    pub fn insert_next_to(
        &mut self,
        sibling_id: S::Key,
        node: StoreNode<S>,
        mode: InsertMode,
    ) -> Result<StoreNode<S>> {
        self.insert_one(Placement::NextTo(sibling_id), node, mode)
    }

    pub fn insert_next_to_batch(
        &mut self,
        sibling_id: S::Key,
        batch: impl Into<Vec<StoreNode<S>>>,
        mode: InsertMode,
    ) -> Result<Vec<StoreNode<S>>> {
        self.insert(Placement::NextTo(sibling_id), batch, mode)
    }

    // ── Deletes and moves ──────────────────────────────────────────

    /// Cut `node_id`'s subtree out of its tree.
    ///
    /// Soft: the records stay in the store as `Detached` and the returned
    /// subtree can be reattached or purged. Hard: the records are removed
    /// and the returned subtree is `Purged`.
    pub fn delete(
        &mut self,
        node_id: S::Key,
        soft: bool,
    ) -> Result<DetachedSubtree<S::Key, S::Data>> {
        let nodes = self.transaction("delete", |store| delete::delete(store, node_id, soft))?;
        let mut subtree = DetachedSubtree::new(nodes, SubtreeState::Detached);
        if !soft {
            subtree.mark_purged();
        }
        Ok(subtree)
    }

    pub fn detach(&mut self, node_id: S::Key) -> Result<DetachedSubtree<S::Key, S::Data>> {
        self.delete(node_id, true)
    }

    /// Put a detached subtree back at `placement`. On failure the subtree
    /// is left untouched and can be retried.
    pub fn reattach(
        &mut self,
        subtree: &mut DetachedSubtree<S::Key, S::Data>,
        placement: Placement<S::Key>,
        mode: InsertMode,
    ) -> Result<Vec<StoreNode<S>>> {
        subtree.expect_detached("reattach")?;
        let batch = subtree.nodes().to_vec();
        let placed = self.insert(placement, batch, mode)?;
        subtree.mark_attached(placed.clone());
        Ok(placed)
    }

    /// Drop a detached subtree's records for good.
    pub fn purge(&mut self, subtree: &mut DetachedSubtree<S::Key, S::Data>) -> Result<()> {
        subtree.expect_detached("purge")?;
        let ids: Vec<S::Key> = subtree.nodes().iter().filter_map(|n| n.id).collect();
        self.transaction("purge", |store| {
            for id in &ids {
                if !store.get(*id)?.is_detached() {
                    return Err(TreeError::invalid(format!(
                        "node {} was reattached and cannot be purged",
                        id
                    )));
                }
            }
            store.remove_batch(&ids)
        })?;
        tracing::debug!("purge: removed {} detached nodes", ids.len());
        subtree.mark_purged();
        Ok(())
    }

    /// Move `node_id`'s subtree to be the first (Left) or last (Right)
    /// child of `parent_id`, possibly in another tree.
    pub fn move_to_parent(
        &mut self,
        node_id: S::Key,
        parent_id: S::Key,
        mode: InsertMode,
    ) -> Result<Vec<StoreNode<S>>> {
        self.relocate(node_id, Placement::Below(parent_id), mode)
    }

    /// Move `node_id`'s subtree beside `sibling_id`.
    pub fn move_to_sibling(
        &mut self,
        node_id: S::Key,
        sibling_id: S::Key,
        mode: InsertMode,
    ) -> Result<Vec<StoreNode<S>>> {
        self.relocate(node_id, Placement::NextTo(sibling_id), mode)
    }

    fn relocate(
        &mut self,
        node_id: S::Key,
        placement: Placement<S::Key>,
        mode: InsertMode,
    ) -> Result<Vec<StoreNode<S>>> {
        self.transaction("move", |store| {
            let target = store.get(node_id)?;
            if let Some(anchor_id) = placement.anchor() {
                let anchor = store.get(*anchor_id)?;
                if anchor.root_id == target.root_id
                    && target.left <= anchor.left
                    && anchor.right <= target.right
                {
                    return Err(TreeError::invalid(format!(
                        "cannot move node {} into its own subtree",
                        node_id
                    )));
                }
            }
            let detached = delete::delete(store, node_id, true)?;
            insert::insert(store, placement, detached, mode)
        })
    }

    // ── Queries ────────────────────────────────────────────────────

    /// Any stored node, attached or detached.
    pub fn get_node(&self, id: S::Key) -> Result<StoreNode<S>> {
        self.store.get(id)
    }

    /// Attached node and the tree it belongs to.
    fn attached(&self, id: S::Key) -> Result<(StoreNode<S>, S::Key)> {
        let node = self.store.get(id)?;
        if node.is_detached() {
            return Err(TreeError::invalid(format!("node {} is detached", id)));
        }
        let root_id = node.root_id.ok_or(TreeError::UndeterminableRoot)?;
        Ok((node, root_id))
    }

    /// Nodes below `id`, at most `depth` levels down. Tree order.
    pub fn get_descendants(&self, id: S::Key, depth: Option<i32>) -> Result<Vec<StoreNode<S>>> {
        let (node, root_id) = self.attached(id)?;
        let scan = self.store.scan(root_id, &query::descendants_filter(&node, depth))?;
        Ok(query::descendants(&node, depth, &scan).into_iter().cloned().collect())
    }

    /// Root first, direct parent last.
    pub fn get_ancestors(&self, id: S::Key) -> Result<Vec<StoreNode<S>>> {
        let (node, _) = self.attached(id)?;
        self.get_path_to_node(&node)
    }

    pub fn get_immediate_children(&self, id: S::Key) -> Result<Vec<StoreNode<S>>> {
        let (node, root_id) = self.attached(id)?;
        let scan = self.store.scan(root_id, &query::children_filter(&node))?;
        Ok(query::immediate_children(&node, &scan).into_iter().cloned().collect())
    }

    /// Ancestors of `node` in its tree, by interval. `node` need not be
    /// stored; it only needs a `root_id` and bounds.
    pub fn get_path_to_node(&self, node: &StoreNode<S>) -> Result<Vec<StoreNode<S>>> {
        let root_id = node.root_id.ok_or(TreeError::UndeterminableRoot)?;
        let scan = self.store.scan(root_id, &query::ancestors_filter(node))?;
        Ok(query::path_to_node(node, &scan).into_iter().cloned().collect())
    }

    /// Every attached node of one tree, root first.
    pub fn get_tree(&self, root_id: S::Key) -> Result<Vec<StoreNode<S>>> {
        let mut nodes = self.store.scan(root_id, &IntervalFilter::Any)?;
        nodes.sort_by_key(|n| n.left);
        Ok(nodes)
    }

    pub fn roots(&self) -> Result<Vec<StoreNode<S>>> {
        self.store.roots()
    }

    /// Structural violations in one tree. Empty means healthy.
    pub fn verify(&self, root_id: S::Key) -> Result<Vec<Violation<S::Key>>> {
        let nodes = self.store.scan(root_id, &IntervalFilter::Any)?;
        Ok(verify::check_tree(root_id, &nodes))
    }
}

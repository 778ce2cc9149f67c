//! In-memory node store with a staged write set.
//!
//! Committed records live in a `BTreeMap` keyed by id. Writes go to a
//! `WriteSet` overlay first; reads merge the overlay over committed state
//! so an operation sees its own staged writes. `commit()` folds the overlay
//! in, `rollback()` drops it.
//!
//! No internal locking: wrap the engine in `SharedForest` to share it
//! across threads.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Result, TreeError};
use crate::storage::{IntervalFilter, NodeRecord, NodeState, NodeStore};

/// A staged change to one record.
#[derive(Debug, Clone)]
enum PendingWrite<D> {
    Upsert(NodeRecord<u64, D>),
    Remove,
}

/// Uncommitted writes keyed by id. Last write to an id wins.
#[derive(Debug, Clone)]
struct WriteSet<D> {
    writes: HashMap<u64, PendingWrite<D>>,
}

impl<D> WriteSet<D> {
    fn new() -> Self {
        Self { writes: HashMap::new() }
    }

    fn upsert(&mut self, record: NodeRecord<u64, D>, id: u64) {
        self.writes.insert(id, PendingWrite::Upsert(record));
    }

    fn remove(&mut self, id: u64) {
        self.writes.insert(id, PendingWrite::Remove);
    }

    fn get(&self, id: u64) -> Option<&PendingWrite<D>> {
        self.writes.get(&id)
    }

    fn len(&self) -> usize {
        self.writes.len()
    }

    fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    fn drain(&mut self) -> impl Iterator<Item = (u64, PendingWrite<D>)> + '_ {
        self.writes.drain()
    }

    fn clear(&mut self) {
        self.writes.clear();
    }
}

/// Ephemeral store with `u64` ids drawn from a sequence starting at 1.
#[derive(Debug, Clone)]
pub struct MemoryStore<D> {
    committed: BTreeMap<u64, NodeRecord<u64, D>>,
    pending: WriteSet<D>,
    /// Next id handed out by `add_batch` (includes staged adds)
    next_id: u64,
    /// `next_id` as of the last commit, restored on rollback
    committed_next_id: u64,
}

impl<D: Clone> MemoryStore<D> {
    pub fn new() -> Self {
        Self {
            committed: BTreeMap::new(),
            pending: WriteSet::new(),
            next_id: 1,
            committed_next_id: 1,
        }
    }

    /// Rebuild from previously committed records.
    pub(crate) fn from_parts(records: Vec<NodeRecord<u64, D>>, next_id: u64) -> Result<Self> {
        let mut committed = BTreeMap::new();
        for record in records {
            let id = record
                .id
                .ok_or_else(|| TreeError::InvalidFormat("record without id".to_string()))?;
            if id >= next_id {
                return Err(TreeError::InvalidFormat(format!(
                    "record id {} beyond id sequence {}",
                    id, next_id
                )));
            }
            committed.insert(id, record);
        }
        Ok(Self {
            committed,
            pending: WriteSet::new(),
            next_id,
            committed_next_id: next_id,
        })
    }

    /// Committed records in id order.
    pub fn committed_records(&self) -> impl Iterator<Item = &NodeRecord<u64, D>> {
        self.committed.values()
    }

    /// Live records in id order, staged writes applied.
    pub(crate) fn merged_records(&self) -> Vec<NodeRecord<u64, D>> {
        let mut records: Vec<_> = self.live().cloned().collect();
        records.sort_by_key(|n| n.id);
        records
    }

    /// Id sequence including staged adds.
    pub(crate) fn staged_next_id(&self) -> u64 {
        self.next_id
    }

    /// Number of live records, staged writes included.
    pub fn len(&self) -> usize {
        self.live().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of staged, uncommitted writes.
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Live records with staged writes applied.
    fn live(&self) -> impl Iterator<Item = &NodeRecord<u64, D>> {
        let committed = self
            .committed
            .iter()
            .filter(|(id, _)| self.pending.get(**id).is_none())
            .map(|(_, record)| record);
        let staged = self.pending.writes.values().filter_map(|write| match write {
            PendingWrite::Upsert(record) => Some(record),
            PendingWrite::Remove => None,
        });
        committed.chain(staged)
    }

    fn exists(&self, id: u64) -> bool {
        match self.pending.get(id) {
            Some(PendingWrite::Upsert(_)) => true,
            Some(PendingWrite::Remove) => false,
            None => self.committed.contains_key(&id),
        }
    }

    fn sorted(mut nodes: Vec<NodeRecord<u64, D>>) -> Vec<NodeRecord<u64, D>> {
        nodes.sort_by_key(|n| (n.root_id, n.left));
        nodes
    }
}

impl<D: Clone> Default for MemoryStore<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Clone> NodeStore for MemoryStore<D> {
    type Key = u64;
    type Data = D;

    fn get(&self, id: u64) -> Result<NodeRecord<u64, D>> {
        match self.pending.get(id) {
            Some(PendingWrite::Upsert(record)) => Ok(record.clone()),
            Some(PendingWrite::Remove) => Err(TreeError::not_found(id)),
            None => self
                .committed
                .get(&id)
                .cloned()
                .ok_or_else(|| TreeError::not_found(id)),
        }
    }

    fn scan(&self, root_id: u64, filter: &IntervalFilter) -> Result<Vec<NodeRecord<u64, D>>> {
        let nodes = self
            .live()
            .filter(|n| n.root_id == Some(root_id))
            .filter(|n| n.state == NodeState::Attached)
            .filter(|n| filter.matches_node(*n))
            .cloned()
            .collect();
        Ok(Self::sorted(nodes))
    }

    fn roots(&self) -> Result<Vec<NodeRecord<u64, D>>> {
        let nodes = self
            .live()
            .filter(|n| n.state == NodeState::Attached && n.is_root())
            .cloned()
            .collect();
        Ok(Self::sorted(nodes))
    }

    fn add_batch(&mut self, nodes: &mut [NodeRecord<u64, D>]) -> Result<()> {
        if let Some(existing) = nodes.iter().find_map(|n| n.id) {
            return Err(TreeError::invalid(format!(
                "record {} already has an id and cannot be added",
                existing
            )));
        }
        for node in nodes.iter_mut() {
            let id = self.next_id;
            self.next_id += 1;
            node.id = Some(id);
            self.pending.upsert(node.clone(), id);
        }
        Ok(())
    }

    fn update_batch(&mut self, nodes: &[NodeRecord<u64, D>]) -> Result<()> {
        for node in nodes {
            let id = node
                .id
                .ok_or_else(|| TreeError::invalid("cannot update a record without an id"))?;
            if !self.exists(id) {
                return Err(TreeError::not_found(id));
            }
        }
        for node in nodes {
            if let Some(id) = node.id {
                self.pending.upsert(node.clone(), id);
            }
        }
        Ok(())
    }

    fn remove_batch(&mut self, ids: &[u64]) -> Result<()> {
        if let Some(missing) = ids.iter().find(|id| !self.exists(**id)) {
            return Err(TreeError::not_found(missing));
        }
        for id in ids {
            self.pending.remove(*id);
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            self.committed_next_id = self.next_id;
            return Ok(());
        }
        let count = self.pending.len();
        for (id, write) in self.pending.drain() {
            match write {
                PendingWrite::Upsert(record) => {
                    self.committed.insert(id, record);
                }
                PendingWrite::Remove => {
                    self.committed.remove(&id);
                }
            }
        }
        self.committed_next_id = self.next_id;
        tracing::debug!("memory store: committed {} writes", count);
        Ok(())
    }

    fn rollback(&mut self) {
        self.pending.clear();
        self.next_id = self.committed_next_id;
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_node(name: &str, left: i32, right: i32, level: i32) -> NodeRecord<u64, String> {
        NodeRecord::with_bounds(name.to_string(), left, right, level)
    }

    fn tagged(mut nodes: Vec<NodeRecord<u64, String>>, root: u64) -> Vec<NodeRecord<u64, String>> {
        for node in &mut nodes {
            node.root_id = Some(root);
        }
        nodes
    }

    #[test]
    fn test_empty_store() {
        let store: MemoryStore<String> = MemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.pending_writes(), 0);
        assert!(matches!(store.get(1), Err(TreeError::NodeNotFound(_))));
        assert!(store.roots().unwrap().is_empty());
    }

    #[test]
    fn test_add_assigns_sequential_ids() {
        let mut store = MemoryStore::new();
        let mut nodes = vec![make_node("a", 1, 4, 0), make_node("b", 2, 3, 1)];
        store.add_batch(&mut nodes).unwrap();

        assert_eq!(nodes[0].id, Some(1));
        assert_eq!(nodes[1].id, Some(2));
        assert_eq!(store.pending_writes(), 2);
        // staged writes are visible before commit
        assert_eq!(store.get(2).unwrap().data, "b");
    }

    #[test]
    fn test_add_rejects_records_with_ids() {
        let mut store = MemoryStore::new();
        let mut node = make_node("a", 1, 2, 0);
        node.id = Some(42);
        let result = store.add_batch(&mut [node]);
        assert!(matches!(result, Err(TreeError::InvalidArgument(_))));
    }

    #[test]
    fn test_rollback_discards_staged_writes_and_ids() {
        let mut store = MemoryStore::new();
        let mut first = vec![make_node("a", 1, 2, 0)];
        store.add_batch(&mut first).unwrap();
        store.commit().unwrap();

        let mut second = vec![make_node("b", 1, 2, 0)];
        store.add_batch(&mut second).unwrap();
        assert_eq!(second[0].id, Some(2));
        store.rollback();

        assert!(store.get(2).is_err());
        assert_eq!(store.len(), 1);

        // the id sequence rewinds with the rollback
        let mut third = vec![make_node("c", 1, 2, 0)];
        store.add_batch(&mut third).unwrap();
        assert_eq!(third[0].id, Some(2));
    }

    #[test]
    fn test_scan_is_tree_scoped_and_skips_detached() {
        let mut store = MemoryStore::new();
        let mut tree_a = tagged(vec![make_node("a", 1, 4, 0), make_node("a1", 2, 3, 1)], 1);
        store.add_batch(&mut tree_a).unwrap();
        let mut tree_b = tagged(vec![make_node("b", 1, 2, 0)], 3);
        store.add_batch(&mut tree_b).unwrap();

        let mut detached = tree_a[1].clone();
        detached.state = NodeState::Detached;
        store.update_batch(&[detached]).unwrap();
        store.commit().unwrap();

        let scanned = store.scan(1, &IntervalFilter::Any).unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].data, "a");
        // still reachable by id
        assert!(store.get(2).unwrap().is_detached());

        let other = store.scan(3, &IntervalFilter::Any).unwrap();
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].data, "b");
    }

    #[test]
    fn test_update_and_remove_unknown_ids() {
        let mut store: MemoryStore<String> = MemoryStore::new();
        let mut ghost = make_node("ghost", 1, 2, 0);
        ghost.id = Some(9);
        assert!(matches!(store.update_batch(&[ghost]), Err(TreeError::NodeNotFound(_))));
        assert!(matches!(store.remove_batch(&[9]), Err(TreeError::NodeNotFound(_))));

        let unsaved = make_node("unsaved", 1, 2, 0);
        assert!(matches!(store.update_batch(&[unsaved]), Err(TreeError::InvalidArgument(_))));
    }

    #[test]
    fn test_remove_then_commit() {
        let mut store = MemoryStore::new();
        let mut nodes = vec![make_node("a", 1, 2, 0)];
        store.add_batch(&mut nodes).unwrap();
        store.commit().unwrap();

        store.remove_batch(&[1]).unwrap();
        assert!(store.get(1).is_err());
        assert_eq!(store.committed_records().count(), 1);

        store.commit().unwrap();
        assert_eq!(store.committed_records().count(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_from_parts_rejects_ids_past_sequence() {
        let mut node = make_node("a", 1, 2, 0);
        node.id = Some(5);
        let result = MemoryStore::from_parts(vec![node], 3);
        assert!(matches!(result, Err(TreeError::InvalidFormat(_))));
    }
}

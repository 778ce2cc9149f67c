//! Insertion engine.
//!
//! Places a node batch (one fresh node, or a pre-numbered subtree) at an
//! anchor, opens a gap for it among the anchor tree's attached nodes,
//! re-bases the batch's bounds and levels, then tags and links it.
//! Everything is staged on the store; the caller commits.

use std::collections::BTreeSet;

use crate::error::{Result, TreeError};
use crate::storage::{IntervalFilter, NodeKey, NodeRecord, NodeState, NodeStore, StoreNode};

use super::interval::{self, Pivot};
use super::query;
use super::verify;
use super::{InsertMode, Placement};

/// Where the batch's `root_id` comes from.
enum RootTag<K> {
    /// New tree: the relative root's own id, known once it is added.
    SelfTag,
    Known(K),
}

/// Resolved parent and sibling the batch is placed against.
struct Anchor<K, D> {
    parent: Option<NodeRecord<K, D>>,
    sibling: Option<NodeRecord<K, D>>,
}

impl<K: NodeKey, D> Anchor<K, D> {
    fn root_id(&self) -> Option<K> {
        self.parent
            .as_ref()
            .and_then(|p| p.root_id)
            .or_else(|| self.sibling.as_ref().and_then(|s| s.root_id))
    }

    /// New left bound of the batch, plus the neighbour shift that makes room.
    fn placement(&self, mode: InsertMode) -> (i32, Option<(IntervalFilter, Pivot)>) {
        match (&self.sibling, &self.parent, mode) {
            (Some(s), _, InsertMode::Left) => (
                s.left,
                Some((
                    IntervalFilter::Reaching { left_from: s.left, right_from: s.right },
                    Pivot::AtOrAfter(s.left),
                )),
            ),
            (Some(s), _, InsertMode::Right) => (
                s.right + 1,
                Some((
                    IntervalFilter::Reaching { left_from: s.right + 1, right_from: s.right + 1 },
                    Pivot::After(s.left),
                )),
            ),
            // `left > p.left` already implies `right >= p.left`, so this is
            // exactly `right >= p.left`.
            (None, Some(p), _) => (
                p.left + 1,
                Some((
                    IntervalFilter::Reaching { left_from: p.left + 1, right_from: p.left },
                    Pivot::After(p.left),
                )),
            ),
            (None, None, _) => (1, None),
        }
    }
}

pub(crate) fn insert<S: NodeStore>(
    store: &mut S,
    placement: Placement<S::Key>,
    mut batch: Vec<StoreNode<S>>,
    mode: InsertMode,
) -> Result<Vec<StoreNode<S>>> {
    if batch.is_empty() {
        return Err(TreeError::invalid("node tree is empty"));
    }

    let batch_roots: Vec<S::Key> = batch
        .iter()
        .filter_map(|n| n.root_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if batch_roots.len() > 1 {
        return Err(TreeError::AmbiguousRoot(
            batch_roots.iter().map(|r| r.to_string()).collect(),
        ));
    }

    let (lowest, highest) = assign_span(&mut batch)?;
    let difference = highest - lowest;
    let root_idx = relative_root(&batch, lowest, highest)?;
    validate_batch(&batch)?;
    expect_stored_detached(store, &batch)?;

    let anchor = resolve_anchor(store, placement, mode)?;
    let tag = match placement {
        Placement::Root => RootTag::SelfTag,
        _ => match anchor.root_id().or_else(|| batch_roots.first().copied()) {
            Some(root) => RootTag::Known(root),
            None => return Err(TreeError::UndeterminableRoot),
        },
    };

    // Open the gap
    let (new_left, shift) = anchor.placement(mode);
    if let (Some((filter, pivot)), RootTag::Known(root)) = (shift, &tag) {
        let width = interval::gap_width(difference);
        let mut neighbors = store.scan(*root, &filter)?;
        interval::shift_neighbors(&mut neighbors, width, pivot);
        store.update_batch(&neighbors)?;
        tracing::debug!(
            "insert: shifted {} nodes of tree {} by {}",
            neighbors.len(),
            root,
            width
        );
    }

    // Translate the batch onto its new home
    let left_change = new_left - batch[root_idx].left;
    let right_change = new_left + difference - batch[root_idx].right;
    interval::rebase(&mut batch, left_change, right_change);
    let base_level = anchor.parent.as_ref().map_or(0, |p| p.level + 1);
    interval::rebase_levels(&mut batch, base_level);
    batch[root_idx].parent_id = anchor.parent.as_ref().and_then(|p| p.id);

    // Phase 1: fresh nodes get their ids
    let fresh: Vec<usize> = (0..batch.len()).filter(|&i| batch[i].id.is_none()).collect();
    if !fresh.is_empty() {
        let mut added: Vec<StoreNode<S>> = fresh.iter().map(|&i| batch[i].clone()).collect();
        store.add_batch(&mut added)?;
        for (i, node) in fresh.iter().zip(added) {
            batch[*i].id = node.id;
        }
    }

    // Phase 2: tag the tree, re-attach, link parents
    let root_id = match tag {
        RootTag::SelfTag => batch[root_idx]
            .id
            .ok_or_else(|| TreeError::invalid("store assigned no id to the new root"))?,
        RootTag::Known(root) => root,
    };
    for node in &mut batch {
        node.root_id = Some(root_id);
        node.state = NodeState::Attached;
    }
    rewire_parents(&mut batch, root_idx);
    store.update_batch(&batch)?;

    tracing::debug!(
        "insert: placed {} nodes ({} new) at [{}, {}] in tree {}",
        batch.len(),
        fresh.len(),
        new_left,
        new_left + difference,
        root_id
    );

    batch.sort_by_key(|n| n.left);
    Ok(batch)
}

/// Batch span. A lone node without bounds becomes a `[1, 2]` leaf.
fn assign_span<K, D>(batch: &mut [NodeRecord<K, D>]) -> Result<(i32, i32)> {
    let (lowest, highest) =
        interval::span(batch).ok_or_else(|| TreeError::invalid("node tree is empty"))?;
    if lowest == 0 && highest == 0 {
        if batch.len() != 1 {
            return Err(TreeError::invalid(
                "node tree must have left right values when it holds more than one node",
            ));
        }
        batch[0].left = 1;
        batch[0].right = 2;
        return Ok((1, 2));
    }
    Ok((lowest, highest))
}

/// Index of the single node spanning the whole batch.
fn relative_root<K, D>(batch: &[NodeRecord<K, D>], lowest: i32, highest: i32) -> Result<usize> {
    let mut candidates = (0..batch.len()).filter(|&i| batch[i].left == lowest);
    let (Some(idx), None) = (candidates.next(), candidates.next()) else {
        return Err(TreeError::invalid(format!(
            "node tree has more than one node at left {}",
            lowest
        )));
    };
    if batch[idx].right != highest {
        return Err(TreeError::invalid(
            "node tree has more than one top-level node",
        ));
    }
    Ok(idx)
}

/// The batch must be one well-formed subtree: positive bounds, no
/// duplicate ids, and a clean nested-set shape.
fn validate_batch<K: NodeKey, D>(batch: &[NodeRecord<K, D>]) -> Result<()> {
    if let Some(node) = batch.iter().find(|n| n.left < 1) {
        return Err(TreeError::invalid(format!(
            "invalid interval [{}, {}]",
            node.left, node.right
        )));
    }
    let mut seen = BTreeSet::new();
    if let Some(id) = batch.iter().filter_map(|n| n.id).find(|id| !seen.insert(*id)) {
        return Err(TreeError::invalid(format!("node {} appears twice in the batch", id)));
    }
    if let Some(violation) = verify::check_batch(batch).into_iter().next() {
        return Err(TreeError::invalid(format!("malformed node tree: {}", violation)));
    }
    Ok(())
}

/// Records that already have an id must be detached in the store. The
/// batch's own `state` is a caller copy and proves nothing.
fn expect_stored_detached<S: NodeStore>(store: &S, batch: &[StoreNode<S>]) -> Result<()> {
    for id in batch.iter().filter_map(|n| n.id) {
        if !store.get(id)?.is_detached() {
            return Err(TreeError::invalid(format!(
                "node {} is already attached to a tree",
                id
            )));
        }
    }
    Ok(())
}

fn resolve_anchor<S: NodeStore>(
    store: &S,
    placement: Placement<S::Key>,
    mode: InsertMode,
) -> Result<Anchor<S::Key, S::Data>> {
    match placement {
        Placement::Root => Ok(Anchor { parent: None, sibling: None }),
        Placement::Below(parent_id) => {
            let parent = fetch_anchor(store, parent_id)?;
            // Right mode appends after the current last child
            let sibling = match (mode, parent.root_id) {
                (InsertMode::Right, Some(root)) => {
                    let children = store.scan(root, &query::children_filter(&parent))?;
                    query::rightmost_child(&parent, &children).cloned()
                }
                _ => None,
            };
            Ok(Anchor { parent: Some(parent), sibling })
        }
        Placement::NextTo(sibling_id) => {
            let sibling = fetch_anchor(store, sibling_id)?;
            let parent_id = sibling.parent_id.ok_or_else(|| {
                TreeError::invalid(format!("cannot insert next to tree root {}", sibling_id))
            })?;
            let parent = fetch_anchor(store, parent_id)?;
            Ok(Anchor { parent: Some(parent), sibling: Some(sibling) })
        }
    }
}

fn fetch_anchor<S: NodeStore>(store: &S, id: S::Key) -> Result<StoreNode<S>> {
    let node = store.get(id)?;
    if node.is_detached() {
        return Err(TreeError::invalid(format!(
            "node {} is detached and cannot anchor an insert",
            id
        )));
    }
    Ok(node)
}

/// Point every non-root batch node at its nearest enclosing batch node.
///
/// One sweep in tree order: the stack holds the open ancestors of the
/// current node, so its top is the parent.
fn rewire_parents<K: NodeKey, D>(batch: &mut [NodeRecord<K, D>], root_idx: usize) {
    let mut order: Vec<usize> = (0..batch.len()).collect();
    order.sort_by_key(|&i| batch[i].left);

    let mut open: Vec<usize> = Vec::new();
    for i in order {
        while let Some(&top) = open.last() {
            if batch[top].right > batch[i].left {
                break;
            }
            open.pop();
        }
        if i != root_idx {
            batch[i].parent_id = open.last().and_then(|&top| batch[top].id);
        }
        open.push(i);
    }
}

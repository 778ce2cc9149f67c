//! Deletion engine: cut a subtree out of its tree and close the gap.

use std::collections::HashSet;

use crate::error::{Result, TreeError};
use crate::storage::{IntervalFilter, NodeState, NodeStore, StoreNode};

use super::interval::{self, Pivot};

/// Stage the removal (hard) or detachment (soft) of `node_id`'s subtree.
///
/// Survivors are renumbered to close the gap. The returned nodes are
/// re-based to `left = 1` with parent links cleared; they keep their
/// `root_id` so a later reinsertion can tell which tree they came from.
pub(crate) fn delete<S: NodeStore>(
    store: &mut S,
    node_id: S::Key,
    soft: bool,
) -> Result<Vec<StoreNode<S>>> {
    let target = store.get(node_id)?;
    if target.is_detached() {
        return Err(TreeError::invalid(format!("node {} is already detached", node_id)));
    }
    let root_id = target.root_id.ok_or(TreeError::UndeterminableRoot)?;
    let difference = target.right - target.left + 1;

    let mut subtree = store.scan(
        root_id,
        &IntervalFilter::Within { left: target.left, right: target.right },
    )?;
    let cut: Vec<S::Key> = subtree.iter().filter_map(|n| n.id).collect();
    let cut_set: HashSet<S::Key> = cut.iter().copied().collect();

    // left > target.left || right >= target.left
    let mut survivors: Vec<StoreNode<S>> = store
        .scan(
            root_id,
            &IntervalFilter::Reaching { left_from: target.left + 1, right_from: target.left },
        )?
        .into_iter()
        .filter(|n| n.id.map_or(true, |id| !cut_set.contains(&id)))
        .collect();
    interval::shift_neighbors(&mut survivors, -difference, Pivot::AtOrAfter(target.left));

    interval::rebase_to_one(&mut subtree);
    for node in &mut subtree {
        node.parent_id = None;
    }

    if soft {
        for node in &mut subtree {
            node.state = NodeState::Detached;
        }
        store.update_batch(&subtree)?;
    } else {
        store.remove_batch(&cut)?;
    }
    store.update_batch(&survivors)?;

    tracing::debug!(
        "delete: {} {} nodes under {}, shifted {} survivors by -{}",
        if soft { "detached" } else { "removed" },
        subtree.len(),
        node_id,
        survivors.len(),
        difference
    );

    Ok(subtree)
}

//! Interval arithmetic: spans, gap widths, shifts and re-basing.
//!
//! Pure functions over node slices, no store access.

use crate::storage::NodeRecord;

/// `(lowest left, highest right)` across a node set, None when empty.
pub fn span<K, D>(nodes: &[NodeRecord<K, D>]) -> Option<(i32, i32)> {
    let lowest = nodes.iter().map(|n| n.left).min()?;
    let highest = nodes.iter().map(|n| n.right).max()?;
    Some((lowest, highest))
}

/// Position units a shift must open for a subtree spanning `difference`
/// (`highest_right - lowest_left`) boundary units.
pub fn gap_width(difference: i32) -> i32 {
    difference + 1
}

/// Add fixed deltas to every node's bounds.
pub fn rebase<K, D>(nodes: &mut [NodeRecord<K, D>], delta_left: i32, delta_right: i32) {
    for node in nodes {
        node.left += delta_left;
        node.right += delta_right;
    }
}

/// Translate a subtree so its lowest `left` becomes 1.
pub fn rebase_to_one<K, D>(nodes: &mut [NodeRecord<K, D>]) {
    if let Some((lowest, _)) = span(nodes) {
        let delta = 1 - lowest;
        rebase(nodes, delta, delta);
    }
}

/// Subtract the batch's minimum level, then add `base`.
pub fn rebase_levels<K, D>(nodes: &mut [NodeRecord<K, D>], base: i32) {
    if let Some(min_level) = nodes.iter().map(|n| n.level).min() {
        for node in nodes {
            node.level = node.level - min_level + base;
        }
    }
}

/// Decides which shifted neighbours move their `left` bound as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pivot {
    /// `left >= pivot`
    AtOrAfter(i32),
    /// `left > pivot`
    After(i32),
}

impl Pivot {
    pub fn admits(&self, left: i32) -> bool {
        match *self {
            Pivot::AtOrAfter(p) => left >= p,
            Pivot::After(p) => left > p,
        }
    }
}

/// Shift existing neighbours by `delta`: every `right` moves, `left` moves
/// where the pivot admits it. Positive deltas open a gap, negative close one.
pub fn shift_neighbors<K, D>(nodes: &mut [NodeRecord<K, D>], delta: i32, pivot: Pivot) {
    for node in nodes {
        if pivot.admits(node.left) {
            node.left += delta;
        }
        node.right += delta;
    }
}

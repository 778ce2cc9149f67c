//! Descendant, ancestor and child lookups over a tree-scoped node scan.
//!
//! Every function here trusts its scan to hold a single tree. Handing in
//! nodes from several trees yields interval matches that mean nothing;
//! `TreeEngine` always scopes its scans by `root_id` before calling in.

use crate::storage::{IntervalFilter, NodeKey, NodeRecord};

/// Store filter matching `descendants(node, depth, ..)`.
pub fn descendants_filter<K, D>(node: &NodeRecord<K, D>, depth: Option<i32>) -> IntervalFilter {
    IntervalFilter::Inside {
        left: node.left,
        right: node.right,
        max_level: depth.map(|d| node.level + d),
    }
}

/// Store filter matching `ancestors(node, ..)`.
pub fn ancestors_filter<K, D>(node: &NodeRecord<K, D>) -> IntervalFilter {
    IntervalFilter::Enclosing {
        left: node.left,
        right: node.right,
    }
}

/// Store filter covering the candidates for `node`'s direct children.
pub fn children_filter<K, D>(node: &NodeRecord<K, D>) -> IntervalFilter {
    IntervalFilter::ChildLevel {
        left: node.left,
        right: node.right,
        level: node.level + 1,
    }
}

/// Nodes strictly inside `node`, at most `depth` levels below it. Tree order.
pub fn descendants<'a, K, D>(
    node: &NodeRecord<K, D>,
    depth: Option<i32>,
    scan: &'a [NodeRecord<K, D>],
) -> Vec<&'a NodeRecord<K, D>> {
    let filter = descendants_filter(node, depth);
    let mut found: Vec<_> = scan.iter().filter(|n| filter.matches_node(*n)).collect();
    found.sort_by_key(|n| n.left);
    found
}

/// Nodes strictly enclosing `node`, root first, nearest parent last.
pub fn ancestors<'a, K, D>(
    node: &NodeRecord<K, D>,
    scan: &'a [NodeRecord<K, D>],
) -> Vec<&'a NodeRecord<K, D>> {
    let filter = ancestors_filter(node);
    let mut found: Vec<_> = scan.iter().filter(|n| filter.matches_node(*n)).collect();
    found.sort_by_key(|n| n.left);
    found
}

/// Nodes whose `parent_id` is `node`'s id. Tree order.
pub fn immediate_children<'a, K: NodeKey, D>(
    node: &NodeRecord<K, D>,
    scan: &'a [NodeRecord<K, D>],
) -> Vec<&'a NodeRecord<K, D>> {
    let Some(id) = node.id else {
        return Vec::new();
    };
    let mut found: Vec<_> = scan.iter().filter(|n| n.parent_id == Some(id)).collect();
    found.sort_by_key(|n| n.left);
    found
}

/// Ancestors of `node` drawn from `candidates` only. `node` itself need
/// not be among them.
pub fn path_to_node<'a, K, D>(
    node: &NodeRecord<K, D>,
    candidates: &'a [NodeRecord<K, D>],
) -> Vec<&'a NodeRecord<K, D>> {
    ancestors(node, candidates)
}

/// Attached child of `parent` with the greatest `right`.
pub fn rightmost_child<'a, K, D>(
    parent: &NodeRecord<K, D>,
    scan: &'a [NodeRecord<K, D>],
) -> Option<&'a NodeRecord<K, D>> {
    let filter = children_filter(parent);
    scan.iter()
        .filter(|n| !n.is_detached() && filter.matches_node(*n))
        .max_by_key(|n| n.right)
}

//! Structural checks over one tree's attached nodes.

use std::fmt;

use crate::storage::{NodeKey, NodeRecord};

/// Which tree invariant a violation breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// `left < right` with an odd width
    Interval,
    /// One top-level node at `left = 1`, parentless, self-tagged, level 0
    Root,
    /// Intervals nest or are disjoint, never overlap
    Nesting,
    /// Children exactly tile their parent's interior
    Partition,
    /// `level = parent.level + 1`
    Level,
    /// `parent_id` names the nearest enclosing node
    Parent,
    /// `(right - left - 1) / 2` matches the contained node count
    DescendantCount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation<K> {
    pub node: Option<K>,
    pub rule: Rule,
    pub detail: String,
}

impl<K: fmt::Debug> fmt::Display for Violation<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} at node {:?}: {}", self.rule, self.node, self.detail)
    }
}

struct Frame {
    idx: usize,
    /// Where the next child must start
    next: i32,
}

/// Check `nodes` (one tree, any order) against the nested-set invariants.
pub fn check_tree<K: NodeKey, D>(root_id: K, nodes: &[NodeRecord<K, D>]) -> Vec<Violation<K>> {
    sweep(Some(root_id), nodes)
}

/// Shape of a pre-numbered batch: intervals, nesting, partition, relative
/// levels and counts. The batch may start at any left bound; ids, tags and
/// parent links are not checked.
pub(crate) fn check_batch<K: NodeKey, D>(nodes: &[NodeRecord<K, D>]) -> Vec<Violation<K>> {
    sweep(None, nodes)
}

fn sweep<K: NodeKey, D>(root_id: Option<K>, nodes: &[NodeRecord<K, D>]) -> Vec<Violation<K>> {
    let mut sorted: Vec<&NodeRecord<K, D>> = nodes.iter().collect();
    sorted.sort_by_key(|n| n.left);
    let first_left = match root_id {
        Some(_) => 1,
        None => sorted.first().map_or(1, |n| n.left),
    };

    let mut violations = Vec::new();
    let mut report = |node: &NodeRecord<K, D>, rule: Rule, detail: String| {
        violations.push(Violation { node: node.id, rule, detail });
    };

    let mut stack: Vec<Frame> = Vec::new();
    let mut top_level = 0usize;

    for (idx, &node) in sorted.iter().enumerate() {
        if node.left >= node.right || (node.right - node.left) % 2 == 0 {
            report(node, Rule::Interval, format!("[{}, {}]", node.left, node.right));
        }

        while let Some(frame) = stack.last() {
            let open = sorted[frame.idx];
            if open.right > node.left {
                break;
            }
            if frame.next != open.right {
                let detail = format!("children end at {}, right is {}", frame.next - 1, open.right);
                report(open, Rule::Partition, detail);
            }
            stack.pop();
        }

        match stack.last_mut() {
            None => {
                top_level += 1;
                if top_level > 1 || node.left != first_left {
                    report(node, Rule::Root, format!("extra top-level node at {}", node.left));
                } else if let Some(root_id) = root_id {
                    if node.parent_id.is_some() || node.level != 0 {
                        let detail = "root has a parent or a non-zero level".to_string();
                        report(node, Rule::Root, detail);
                    }
                    if node.id != Some(root_id) {
                        let detail = format!("root is not the tagged root {}", root_id);
                        report(node, Rule::Root, detail);
                    }
                }
            }
            Some(frame) => {
                let parent = sorted[frame.idx];
                if node.right > parent.right {
                    let detail = format!("overlaps [{}, {}]", parent.left, parent.right);
                    report(node, Rule::Nesting, detail);
                }
                if node.left != frame.next {
                    let detail = format!("starts at {}, expected {}", node.left, frame.next);
                    report(node, Rule::Partition, detail);
                }
                frame.next = node.right + 1;
                if node.level != parent.level + 1 {
                    let detail = format!("level {}, parent level {}", node.level, parent.level);
                    report(node, Rule::Level, detail);
                }
                if root_id.is_some() && node.parent_id != parent.id {
                    let detail = format!(
                        "parent_id {:?}, enclosing node {:?}",
                        node.parent_id, parent.id
                    );
                    report(node, Rule::Parent, detail);
                }
            }
        }

        let contained = sorted[idx + 1..]
            .iter()
            .take_while(|n| n.left < node.right)
            .count();
        if contained != node.descendant_count() {
            let detail =
                format!("holds {} nodes, bounds imply {}", contained, node.descendant_count());
            report(node, Rule::DescendantCount, detail);
        }

        stack.push(Frame { idx, next: node.left + 1 });
    }

    while let Some(frame) = stack.pop() {
        let open = sorted[frame.idx];
        if frame.next != open.right {
            let detail = format!("children end at {}, right is {}", frame.next - 1, open.right);
            report(open, Rule::Partition, detail);
        }
    }

    if top_level == 0 && !nodes.is_empty() {
        violations.push(Violation { node: None, rule: Rule::Root, detail: "no root".to_string() });
    }

    violations
}

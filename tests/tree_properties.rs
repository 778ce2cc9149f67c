//! Property-based invariant tests for the tree engine.
//!
//! Random sequences of inserts, detaches, reattaches, hard deletes and
//! moves over a small forest. After every step:
//!
//! 1. Every tree passes `verify` (intervals, nesting, partition, levels,
//!    parent links, root tag).
//! 2. `get_descendants(root)` returns every other node of the tree once.
//! 3. Stored records = attached nodes + parked detached subtrees.
//! 4. A rejected operation leaves the committed state untouched.

use std::collections::HashSet;

use nestset::{
    DetachedSubtree, InsertMode, MemoryStore, NodeRecord, Placement, TreeEngine, TreeError,
};
use proptest::prelude::*;

type Engine = TreeEngine<MemoryStore<u32>>;
type Node = NodeRecord<u64, u32>;

// ── Operations ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Root,
    Below(usize, bool),
    NextTo(usize, bool),
    Detach(usize),
    HardDelete(usize),
    Reattach(usize, usize, bool),
    Move(usize, usize, bool),
}

fn mode(right: bool) -> InsertMode {
    if right {
        InsertMode::Right
    } else {
        InsertMode::Left
    }
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => Just(Op::Root),
        5 => (any::<usize>(), any::<bool>()).prop_map(|(p, r)| Op::Below(p, r)),
        3 => (any::<usize>(), any::<bool>()).prop_map(|(p, r)| Op::NextTo(p, r)),
        1 => any::<usize>().prop_map(Op::Detach),
        1 => any::<usize>().prop_map(Op::HardDelete),
        1 => (any::<usize>(), any::<usize>(), any::<bool>())
            .prop_map(|(s, p, r)| Op::Reattach(s, p, r)),
        2 => (any::<usize>(), any::<usize>(), any::<bool>())
            .prop_map(|(n, p, r)| Op::Move(n, p, r)),
    ]
}

// ── Harness ─────────────────────────────────────────────────────────────

struct Forest {
    engine: Engine,
    parked: Vec<DetachedSubtree<u64, u32>>,
    label: u32,
}

impl Forest {
    fn new() -> Self {
        Self {
            engine: TreeEngine::new(MemoryStore::new()),
            parked: Vec::new(),
            label: 0,
        }
    }

    fn fresh(&mut self) -> Node {
        self.label += 1;
        NodeRecord::new(self.label)
    }

    fn attached(&self) -> Vec<u64> {
        let mut ids = Vec::new();
        for root in self.engine.roots().unwrap() {
            let tree = self.engine.get_tree(root.id.unwrap()).unwrap();
            ids.extend(tree.iter().filter_map(|n| n.id));
        }
        ids
    }

    fn committed(&self) -> Vec<Node> {
        self.engine.store().committed_records().cloned().collect()
    }

    /// Apply `op`; Ok(false) when it was skipped for lack of nodes.
    fn apply(&mut self, op: &Op) -> Result<bool, TreeError> {
        let ids = self.attached();
        let pick = |i: usize| ids.get(i % ids.len().max(1)).copied();

        match *op {
            Op::Root => {
                let node = self.fresh();
                self.engine.insert_root(node)?;
            }
            Op::Below(p, r) => {
                let Some(parent) = pick(p) else { return Ok(false) };
                let node = self.fresh();
                self.engine.insert_below(parent, node, mode(r))?;
            }
            Op::NextTo(p, r) => {
                let Some(sibling) = pick(p) else { return Ok(false) };
                let node = self.fresh();
                self.engine.insert_next_to(sibling, node, mode(r))?;
            }
            Op::Detach(p) => {
                let Some(id) = pick(p) else { return Ok(false) };
                let subtree = self.engine.detach(id)?;
                self.parked.push(subtree);
            }
            Op::HardDelete(p) => {
                let Some(id) = pick(p) else { return Ok(false) };
                self.engine.delete(id, false)?;
            }
            Op::Reattach(s, p, r) => {
                if self.parked.is_empty() {
                    return Ok(false);
                }
                let idx = s % self.parked.len();
                let placement = pick(p).map_or(Placement::Root, Placement::Below);
                self.engine.reattach(&mut self.parked[idx], placement, mode(r))?;
                self.parked.remove(idx);
            }
            Op::Move(n, p, r) => {
                let (Some(id), Some(anchor)) = (pick(n), pick(p)) else { return Ok(false) };
                if p % 2 == 0 {
                    self.engine.move_to_parent(id, anchor, mode(r))?;
                } else {
                    self.engine.move_to_sibling(id, anchor, mode(r))?;
                }
            }
        }
        Ok(true)
    }

    fn check(&self) -> Result<(), TestCaseError> {
        let mut attached = 0;
        for root in self.engine.roots().unwrap() {
            let root_id = root.id.unwrap();
            let violations = self.engine.verify(root_id).unwrap();
            prop_assert!(violations.is_empty(), "tree {}: {:?}", root_id, violations);

            let tree = self.engine.get_tree(root_id).unwrap();
            let below = self.engine.get_descendants(root_id, None).unwrap();
            let unique: HashSet<u64> = below.iter().filter_map(|n| n.id).collect();
            prop_assert_eq!(below.len(), tree.len() - 1);
            prop_assert_eq!(unique.len(), below.len());
            prop_assert!(!unique.contains(&root_id));
            attached += tree.len();
        }

        let parked: usize = self.parked.iter().map(|s| s.len()).sum();
        prop_assert_eq!(self.engine.store().len(), attached + parked);
        Ok(())
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Random operation sequences keep every tree valid
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_operations_keep_forest_valid(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        let mut forest = Forest::new();
        for op in &ops {
            let before = forest.committed();
            match forest.apply(op) {
                Ok(_) => {}
                Err(err) => {
                    // Only structural refusals are expected: next to a root,
                    // or into the moved node's own subtree
                    prop_assert!(matches!(err, TreeError::InvalidArgument(_)), "{:?}: {}", op, err);
                    prop_assert_eq!(&forest.committed(), &before);
                    prop_assert_eq!(forest.engine.store().pending_writes(), 0);
                }
            }
            forest.check()?;
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Detach + reattach in place is the identity
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn detach_reattach_in_place_is_identity(
        ops in proptest::collection::vec((any::<usize>(), any::<bool>()), 1..25),
        victim in any::<usize>(),
    ) {
        let mut forest = Forest::new();
        forest.apply(&Op::Root).unwrap();
        for (p, r) in &ops {
            forest.apply(&Op::Below(*p, *r)).unwrap();
        }

        let root = forest.engine.roots().unwrap()[0].id.unwrap();
        let tree = forest.engine.get_tree(root).unwrap();
        let target = &tree[1 + victim % (tree.len() - 1)];
        let parent = target.parent_id.unwrap();

        // Left neighbour sibling, or the parent when the target is first
        let siblings = forest.engine.get_immediate_children(parent).unwrap();
        let pos = siblings.iter().position(|n| n.id == target.id).unwrap();
        let placement = if pos == 0 {
            Placement::Below(parent)
        } else {
            Placement::NextTo(siblings[pos - 1].id.unwrap())
        };
        let mode = if pos == 0 { InsertMode::Left } else { InsertMode::Right };

        let mut subtree = forest.engine.detach(target.id.unwrap()).unwrap();
        forest.engine.reattach(&mut subtree, placement, mode).unwrap();
        prop_assert_eq!(forest.engine.get_tree(root).unwrap(), tree);
    }
}

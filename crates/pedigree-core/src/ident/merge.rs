//! Set-union merge with maximal safe prefix and suffix sharing.
//!
//! Merging two identity DAGs must represent exactly the union of their
//! lineage sets while sharing as much structure as possible. The danger is
//! over-sharing: coalescing two equal-group nodes whose surroundings both
//! diverge routes every left prefix into every right suffix and back,
//! manufacturing lineages neither input contained.
//!
//! # Algorithm
//!
//! The merge is the disjoint union of the two arenas followed by an
//! alternating congruence collapse, run to fixpoint:
//!
//! 1. **Suffix pass.** Walk the DAG in reverse-topological order and key
//!    each node by `(group, sink flag, successor classes)`. Two nodes in
//!    one class spell exactly the same set of group sequences after
//!    themselves, so collapsing them (uniting predecessors) cannot invent
//!    a path — this is suffix sharing generalised from tries to DAGs.
//! 2. **Prefix pass.** The mirror image, keyed by
//!    `(group, root flag, predecessor classes)`, uniting successors.
//!
//! A pair whose post-paths diverge *and* whose pre-paths diverge never
//! lands in one class in either pass, so the cartesian blow-up is refused
//! without any search or back-out. Passes alternate because one collapse
//! can enable the other; the node count shrinks monotonically, so the
//! loop terminates.
//!
//! # Edge Cases
//!
//! - A lineage ending where a longer one continues keeps its terminal
//!   marker: sink flags are part of the suffix key, so a tail of a
//!   different length never forces convergence.
//! - Equal-group candidates at one level may split: the one whose suffix
//!   matches collapses, the other stays separate.
//! - Merging a value with itself collapses the two copies completely;
//!   merging with [`Identities::empty`] returns the other side unchanged.
//!
//! Semilattice laws (commutative, associative, idempotent, identity)
//! follow from the union semantics and expansion-set equality; the
//! property suite exercises them over random values.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use tracing::{debug, trace};

use super::{Group, Identities, Node, NodeId};

/// Which flank of a node a collapse pass inspects.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Flank {
    /// Key on successors; safe to unite predecessors.
    Suffix,
    /// Key on predecessors; safe to unite successors.
    Prefix,
}

/// Congruence class key: nodes with equal groups, the same terminal flag
/// on the inspected flank, and identical collapsed flank classes spell
/// identical path sets on that flank.
#[derive(PartialEq, Eq, Hash)]
struct ClassKey<V> {
    group: Group<V>,
    flagged: bool,
    links: Vec<u32>,
}

impl<V: Clone + Ord + Hash> Identities<V> {
    /// Merge two identity sets: the result represents exactly the union
    /// of the two lineage sets, with maximal safe sharing.
    ///
    /// `empty` is the identity element; merging a value with itself
    /// returns an equal value at the same storage size.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }

        // Disjoint union: append the right arena with shifted handles.
        let offset = self.nodes.len() as u32;
        let mut nodes = self.nodes.clone();
        nodes.extend(other.nodes.iter().map(|node| Node {
            group: node.group.clone(),
            succs: node.succs.iter().map(|id| NodeId(id.0 + offset)).collect(),
            preds: node.preds.iter().map(|id| NodeId(id.0 + offset)).collect(),
        }));
        let roots = self
            .roots
            .iter()
            .copied()
            .chain(other.roots.iter().map(|id| NodeId(id.0 + offset)))
            .collect();
        let sinks = self
            .sinks
            .iter()
            .copied()
            .chain(other.sinks.iter().map(|id| NodeId(id.0 + offset)))
            .collect();

        let merged = Self {
            nodes,
            roots,
            sinks,
        }
        .normalize();
        debug!(
            left = self.storage_size(),
            right = other.storage_size(),
            merged = merged.storage_size(),
            "merged identity sets"
        );
        merged
    }

    /// Run collapse passes until neither flank changes. Every operation
    /// publishes values through this, so published values are reduced.
    pub(crate) fn normalize(self) -> Self {
        let mut current = self;
        let mut rounds = 0usize;
        loop {
            rounds += 1;
            let (after_suffix, suffix_changed) = current.collapse(Flank::Suffix);
            let (after_prefix, prefix_changed) = after_suffix.collapse(Flank::Prefix);
            current = after_prefix;
            if !suffix_changed && !prefix_changed {
                break;
            }
        }
        trace!(rounds, nodes = current.nodes.len(), "reduced identity DAG");
        debug_assert!(current.invariants_hold());
        current
    }

    /// One collapse pass over the given flank.
    ///
    /// Nodes are classed in an order where the inspected flank is always
    /// already classed (reverse-topological for `Suffix`, topological for
    /// `Prefix`), then the arena is rebuilt with one node per class. The
    /// boolean reports whether anything collapsed.
    fn collapse(&self, flank: Flank) -> (Self, bool) {
        let count = self.nodes.len();
        if count == 0 {
            return (Self::empty(), false);
        }

        let mut class_of: Vec<u32> = vec![0; count];
        let mut table: HashMap<ClassKey<V>, u32> = HashMap::with_capacity(count);
        let mut reps: Vec<NodeId> = Vec::with_capacity(count);

        // Kahn walk: a node is ready once its whole inspected flank is
        // classed. Ties break by handle for determinism.
        let mut remaining: Vec<usize> = (0..count)
            .map(|index| self.walk_links(NodeId(index as u32), flank).len())
            .collect();
        let mut ready: BTreeSet<NodeId> = remaining
            .iter()
            .enumerate()
            .filter(|(_, left)| **left == 0)
            .map(|(index, _)| NodeId(index as u32))
            .collect();
        let mut processed = 0usize;

        while let Some(id) = ready.pop_first() {
            let node = self.node(id);
            let links: BTreeSet<u32> = self
                .walk_links(id, flank)
                .iter()
                .map(|link| class_of[link.index()])
                .collect();
            let key = ClassKey {
                group: node.group.clone(),
                flagged: self.flagged(id, flank),
                links: links.into_iter().collect(),
            };
            let fresh = reps.len() as u32;
            let class = *table.entry(key).or_insert_with(|| {
                reps.push(id);
                fresh
            });
            class_of[id.index()] = class;
            processed += 1;
            for &back in self.against_links(id, flank) {
                remaining[back.index()] -= 1;
                if remaining[back.index()] == 0 {
                    ready.insert(back);
                }
            }
        }
        debug_assert_eq!(processed, count);

        if reps.len() == count {
            return (self.clone(), false);
        }
        trace!(
            nodes = count,
            classes = reps.len(),
            "collapsed congruent nodes"
        );

        // Rebuild: one node per class. Successor classes are uniform
        // across a class (suffix pass) or recomputed from scratch (prefix
        // pass), so edges are re-derived from every original node.
        let mut nodes: Vec<Node<V>> = reps
            .iter()
            .map(|&rep| Node {
                group: self.node(rep).group.clone(),
                succs: BTreeSet::new(),
                preds: BTreeSet::new(),
            })
            .collect();
        for (index, node) in self.nodes.iter().enumerate() {
            let from = class_of[index];
            for succ in &node.succs {
                let to = class_of[succ.index()];
                debug_assert_ne!(from, to);
                nodes[from as usize].succs.insert(NodeId(to));
                nodes[to as usize].preds.insert(NodeId(from));
            }
        }
        let roots = self
            .roots
            .iter()
            .map(|root| NodeId(class_of[root.index()]))
            .collect();
        let sinks = self
            .sinks
            .iter()
            .map(|sink| NodeId(class_of[sink.index()]))
            .collect();

        (
            Self {
                nodes,
                roots,
                sinks,
            },
            true,
        )
    }

    fn walk_links(&self, id: NodeId, flank: Flank) -> &BTreeSet<NodeId> {
        match flank {
            Flank::Suffix => &self.node(id).succs,
            Flank::Prefix => &self.node(id).preds,
        }
    }

    fn against_links(&self, id: NodeId, flank: Flank) -> &BTreeSet<NodeId> {
        match flank {
            Flank::Suffix => &self.node(id).preds,
            Flank::Prefix => &self.node(id).succs,
        }
    }

    fn flagged(&self, id: NodeId, flank: Flank) -> bool {
        match flank {
            Flank::Suffix => self.sinks.contains(&id),
            Flank::Prefix => self.roots.contains(&id),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::super::Lineage;
    use super::*;

    fn singles(ids: &[i32]) -> Lineage<i32> {
        ids.iter().map(|&id| vec![id]).collect()
    }

    fn expanded_set(value: &Identities<i32>) -> BTreeSet<Lineage<i32>> {
        value.expanded().into_iter().collect()
    }

    // === Semilattice basics =================================================

    #[test]
    fn test_empty_is_identity() {
        let value = Identities::contracted([singles(&[1, 2]), singles(&[3])]);
        assert_eq!(value.merge(&Identities::empty()), value);
        assert_eq!(Identities::empty().merge(&value), value);
    }

    #[test]
    fn test_self_merge_keeps_storage() {
        let value = Identities::contracted([singles(&[1, 2, 3, 4, 5]), singles(&[1, 2, 6, 4, 5])]);
        let doubled = value.merge(&value);
        assert_eq!(doubled, value);
        assert_eq!(doubled.storage_size(), value.storage_size());
    }

    #[test]
    fn test_commutes() {
        let a = Identities::contracted([singles(&[1, 2, 3])]);
        let b = Identities::contracted([singles(&[4, 2, 3]), singles(&[5])]);
        assert_eq!(a.merge(&b), b.merge(&a));
        assert_eq!(a.merge(&b).storage_size(), b.merge(&a).storage_size());
    }

    #[test]
    fn test_merge_is_set_union() {
        let a = Identities::contracted([singles(&[1, 2]), singles(&[3, 4])]);
        let b = Identities::contracted([singles(&[3, 4]), singles(&[5, 6])]);
        let merged = a.merge(&b);
        let mut expected = expanded_set(&a);
        expected.extend(expanded_set(&b));
        assert_eq!(expanded_set(&merged), expected);
        assert_eq!(merged.breadth(), 3);
    }

    // === Sharing shapes =====================================================

    #[test]
    fn test_shared_suffix() {
        let value = Identities::contracted([singles(&[1, 2, 3, 4, 5]), singles(&[8, 9, 3, 4, 5])]);
        assert_eq!(value.storage_size(), 7);
        assert_eq!(value.breadth(), 2);
    }

    #[test]
    fn test_shared_prefix_and_suffix_around_a_split() {
        let value = Identities::contracted([singles(&[1, 2, 3, 4, 5]), singles(&[1, 2, 6, 4, 5])]);
        assert_eq!(value.storage_size(), 6);
        assert_eq!(value.breadth(), 2);
    }

    #[test]
    fn test_shorter_lineage_shares_whole_prefix() {
        // {[1,2,3,9], [1,2,3]}: the end of the shorter lineage is marked
        // on the shared node rather than copied.
        let value = Identities::contracted([singles(&[1, 2, 3, 9]), singles(&[1, 2, 3])]);
        assert_eq!(value.storage_size(), 4);
        assert_eq!(value.breadth(), 2);
        assert_eq!(value.depth(), 4);
    }

    #[test]
    fn test_reversed_lineage_shares_nothing() {
        // Coalescing the middle 3 would manufacture four lineages.
        let value = Identities::contracted([singles(&[1, 2, 3, 4, 5]), singles(&[5, 4, 3, 2, 1])]);
        assert_eq!(value.storage_size(), 10);
        assert_eq!(value.breadth(), 2);
    }

    #[test]
    fn test_interior_node_shared_only_when_paths_stay_exact() {
        // Both prefixes already combine with both suffixes, so one 6 node
        // carrying all four routes is exact.
        let value = Identities::contracted([
            singles(&[1, 2, 6, 7, 8]),
            singles(&[3, 4, 6, 7, 8]),
            singles(&[1, 2, 6, 9, 10]),
            singles(&[3, 4, 6, 9, 10]),
        ]);
        assert_eq!(value.storage_size(), 9);
        assert_eq!(value.breadth(), 4);
    }

    #[test]
    fn test_mismatched_tail_lengths_do_not_converge() {
        let value = Identities::contracted([singles(&[1, 2, 3, 4]), singles(&[6, 7, 3])]);
        assert_eq!(value.storage_size(), 7);
        assert_eq!(value.breadth(), 2);
    }

    // === Exactness under sharing ============================================

    #[test]
    fn test_no_spurious_lineages_across_operations() {
        let inputs = [
            singles(&[1, 2, 3, 4, 5]),
            singles(&[7, 8, 9, 4, 5]),
            singles(&[11, 12, 3, 13, 5]),
            singles(&[15, 17, 9, 4, 5]),
        ];
        let value = Identities::contracted(inputs.clone());
        let expected: BTreeSet<Lineage<i32>> = inputs.into_iter().collect();
        assert_eq!(expanded_set(&value), expected);
    }

    #[test]
    fn test_merge_of_overlapping_sets_keeps_breadth_exact() {
        // b's lineages are a subset of a's, but arrive with their own
        // sharing; the merged DAG may spell [1,2] along two paths, and
        // breadth must still count it once.
        let a = Identities::contracted([singles(&[7, 1, 2]), singles(&[1, 2]), singles(&[1, 3])]);
        let b = Identities::contracted([singles(&[1, 2]), singles(&[1, 3])]);
        let merged = a.merge(&b);
        assert_eq!(merged, a);
        assert_eq!(merged.breadth(), 3);
        assert!(merged.invariants_hold());
    }

    #[test]
    fn test_merge_result_is_reduced() {
        let a = Identities::contracted([singles(&[1, 2, 3])]);
        let b = Identities::contracted([singles(&[1, 2, 4])]);
        let merged = a.merge(&b);
        assert!(merged.invariants_hold());
        // Shared [1,2] prefix, split tails.
        assert_eq!(merged.storage_size(), 4);
    }
}

//! Identity DAG with prefix and suffix sharing.
//!
//! An [`Identities`] value represents a *set* of lineage paths. Each path
//! is a non-empty sequence of non-empty groups of identifier values; a
//! group bundles the identifiers that are conjoined at one level of the
//! lineage. Storing the set as a vector-of-vectors explodes in memory on
//! realistic query plans, so the set is kept as a DAG instead: every node
//! holds one group, and every root-to-sink path spells out one lineage.
//!
//! # DAG Properties
//!
//! - **Shared prefixes and suffixes**: a node may have several successors
//!   (divergence after a common prefix) and several predecessors (suffixes
//!   reuniting), unlike a trie which shares prefixes only.
//! - **Explicit root and sink sets**: a lineage may end where a longer
//!   lineage continues, so "is a sink" is a flag, not "has no successors".
//!   Symmetrically a node with predecessors can still be a root.
//! - **Reduced form**: no two nodes carry equal groups with identical
//!   collapsed flanks; see [`merge`] for the reduction passes that every
//!   operation finishes with.
//!
//! # Sub-modules
//!
//! - [`merge`]: set-union merge with maximal safe sharing, and the
//!   reduction passes behind it.
//! - [`ops`]: the edit operations (`init`, `snoc`, `conj`, `submerge`).
//! - [`serde`]: canonical vectors-of-groups (de)serialisation.

pub mod merge;
pub mod ops;
pub mod serde;

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// One conjoined region of identifiers: the values present together at a
/// single lineage level. Non-empty in every stored node.
pub type Group<V> = Vec<V>;

/// One lineage path: a non-empty sequence of groups.
pub type Lineage<V> = Vec<Group<V>>;

// ---------------------------------------------------------------------------
// NodeId / Node
// ---------------------------------------------------------------------------

/// Stable handle into the node arena of one [`Identities`] value.
///
/// Handles are dense indexes and are renumbered by every operation; they
/// are never meaningful across two values.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct NodeId(pub(crate) u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A node of the identity DAG: one group plus bidirectional links.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct Node<V> {
    /// The group stored at this node. Never empty.
    pub(crate) group: Group<V>,
    /// Successor nodes (next group in some lineage).
    pub(crate) succs: BTreeSet<NodeId>,
    /// Predecessor nodes (previous group in some lineage).
    pub(crate) preds: BTreeSet<NodeId>,
}

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// A set of lineage paths, stored as a DAG with prefix and suffix sharing.
///
/// Values are immutable: every operation returns a fresh value and two
/// threads may share one freely. Equality is *semantic* — two values are
/// equal exactly when they represent the same set of lineages, regardless
/// of how the sharing worked out.
#[derive(Clone)]
pub struct Identities<V> {
    /// Node arena; [`NodeId`]s index into it.
    pub(crate) nodes: Vec<Node<V>>,
    /// Nodes at which a lineage may start.
    pub(crate) roots: BTreeSet<NodeId>,
    /// Nodes at which a lineage may end.
    pub(crate) sinks: BTreeSet<NodeId>,
}

impl<V> Identities<V> {
    /// The empty set of lineages: no nodes, no roots, no sinks.
    ///
    /// This is the identity element of [`merge`](Self::merge).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            roots: BTreeSet::new(),
            sinks: BTreeSet::new(),
        }
    }

    /// A single lineage of a single singleton group.
    #[must_use]
    pub fn single(value: V) -> Self {
        let mut identities = Self::empty();
        let id = identities.alloc(vec![value]);
        identities.roots.insert(id);
        identities.sinks.insert(id);
        identities
    }

    /// Build a single lineage from its groups.
    ///
    /// Empty groups carry no identity and are skipped; an empty (or
    /// all-empty) lineage yields [`empty`](Self::empty). A plain chain is
    /// already in reduced form.
    #[must_use]
    pub fn from_lineage<G>(lineage: G) -> Self
    where
        G: IntoIterator<Item = Group<V>>,
    {
        let mut identities = Self::empty();
        let mut previous: Option<NodeId> = None;
        for group in lineage {
            if group.is_empty() {
                continue;
            }
            let id = identities.alloc(group);
            match previous {
                Some(prev) => {
                    identities.nodes[prev.index()].succs.insert(id);
                    identities.nodes[id.index()].preds.insert(prev);
                }
                None => {
                    identities.roots.insert(id);
                }
            }
            previous = Some(id);
        }
        if let Some(last) = previous {
            identities.sinks.insert(last);
        }
        identities
    }

    /// Returns `true` if this value represents no lineages at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Total identifier occurrences across the node arena.
    ///
    /// This is the sharing metric: the better two lineages share prefix
    /// and suffix structure, the smaller the value.
    #[must_use]
    pub fn storage_size(&self) -> usize {
        self.nodes.iter().map(|node| node.group.len()).sum()
    }

    /// Length (in groups) of the longest lineage; 0 for empty.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut memo: Vec<Option<usize>> = vec![None; self.nodes.len()];
        self.roots
            .iter()
            .map(|&root| self.longest_from(root, &mut memo))
            .max()
            .unwrap_or(0)
    }

    /// Longest path (in nodes) starting at `id`.
    fn longest_from(&self, id: NodeId, memo: &mut Vec<Option<usize>>) -> usize {
        if let Some(length) = memo[id.index()] {
            return length;
        }
        let tail = self
            .node(id)
            .succs
            .iter()
            .map(|&succ| self.longest_from(succ, memo))
            .max()
            .unwrap_or(0);
        memo[id.index()] = Some(1 + tail);
        1 + tail
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node<V> {
        &self.nodes[id.index()]
    }

    /// Push a fresh unlinked node and return its handle.
    pub(crate) fn alloc(&mut self, group: Group<V>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            group,
            succs: BTreeSet::new(),
            preds: BTreeSet::new(),
        });
        id
    }

    fn is_acyclic(&self) -> bool {
        let mut remaining: Vec<usize> = self.nodes.iter().map(|node| node.succs.len()).collect();
        let mut ready: Vec<NodeId> = remaining
            .iter()
            .enumerate()
            .filter(|(_, left)| **left == 0)
            .map(|(index, _)| NodeId(index as u32))
            .collect();
        let mut seen = 0usize;
        while let Some(id) = ready.pop() {
            seen += 1;
            for &pred in &self.node(id).preds {
                remaining[pred.index()] -= 1;
                if remaining[pred.index()] == 0 {
                    ready.push(pred);
                }
            }
        }
        seen == self.nodes.len()
    }

    fn closure_covers<'a, F>(&'a self, seeds: &BTreeSet<NodeId>, links: F) -> bool
    where
        F: Fn(&'a Node<V>) -> &'a BTreeSet<NodeId>,
    {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: Vec<NodeId> = seeds.iter().copied().collect();
        for &seed in seeds {
            visited[seed.index()] = true;
        }
        while let Some(id) = stack.pop() {
            for &next in links(self.node(id)) {
                if !visited[next.index()] {
                    visited[next.index()] = true;
                    stack.push(next);
                }
            }
        }
        visited.into_iter().all(|reached| reached)
    }
}

impl<V: Clone + Ord> Identities<V> {
    /// Number of distinct lineages represented; 0 for empty.
    ///
    /// Counted from the deduplicated enumeration: after a merge of
    /// overlapping lineage sets, sharing can spell one lineage along two
    /// distinct paths, and those must collapse to a single count.
    #[must_use]
    pub fn breadth(&self) -> usize {
        self.expanded().len()
    }

    /// Enumerate every represented lineage, deduplicated. Depth-first
    /// from roots in ascending handle order, so the order is
    /// deterministic within one value; it is not meaningful across
    /// values.
    #[must_use]
    pub fn expanded(&self) -> Vec<Lineage<V>> {
        let mut seen = BTreeSet::new();
        self.raw_expanded()
            .into_iter()
            .filter(|lineage| seen.insert(lineage.clone()))
            .collect()
    }

    /// Every root-to-sink path spelling, without deduplication. A merge
    /// of overlapping sets can leave one lineage spelled twice here;
    /// [`expanded`](Self::expanded) collapses such repeats.
    fn raw_expanded(&self) -> Vec<Lineage<V>> {
        let mut out = Vec::new();
        let mut path = Vec::new();
        for &root in &self.roots {
            self.expand_from(root, &mut path, &mut out);
        }
        out
    }

    fn expand_from(&self, id: NodeId, path: &mut Vec<NodeId>, out: &mut Vec<Lineage<V>>) {
        path.push(id);
        if self.sinks.contains(&id) {
            out.push(
                path.iter()
                    .map(|&step| self.node(step).group.clone())
                    .collect(),
            );
        }
        for &succ in &self.node(id).succs {
            self.expand_from(succ, path, out);
        }
        path.pop();
    }

    /// The expansion as a set: the value's semantic identity.
    pub(crate) fn expanded_set(&self) -> BTreeSet<Lineage<V>> {
        self.expanded().into_iter().collect()
    }

    /// Full sanity check: structural well-formedness (mirrored links,
    /// in-bounds handles, non-empty groups, acyclicity, reachability from
    /// roots and to sinks) plus the two semantic invariants — congruent
    /// nodes are coalesced, and the expansion is duplicate-free. Used
    /// from `debug_assert!` after reduction and from tests.
    pub(crate) fn invariants_hold(&self) -> bool {
        if self.nodes.is_empty() {
            return self.roots.is_empty() && self.sinks.is_empty();
        }
        if self.roots.is_empty() || self.sinks.is_empty() {
            return false;
        }
        let count = self.nodes.len();
        let in_bounds = |id: &NodeId| id.index() < count;
        if !self.roots.iter().all(in_bounds) || !self.sinks.iter().all(in_bounds) {
            return false;
        }
        for (index, node) in self.nodes.iter().enumerate() {
            let id = NodeId(index as u32);
            if node.group.is_empty() {
                return false;
            }
            if !node.succs.iter().all(in_bounds) || !node.preds.iter().all(in_bounds) {
                return false;
            }
            if node.succs.contains(&id) || node.preds.contains(&id) {
                return false;
            }
            if !node.succs.iter().all(|s| self.node(*s).preds.contains(&id)) {
                return false;
            }
            if !node.preds.iter().all(|p| self.node(*p).succs.contains(&id)) {
                return false;
            }
            // A dead end must be a sink and an orphan must be a root,
            // otherwise some node lies on no root-to-sink path.
            if node.succs.is_empty() && !self.sinks.contains(&id) {
                return false;
            }
            if node.preds.is_empty() && !self.roots.contains(&id) {
                return false;
            }
        }
        if !self.is_acyclic() {
            return false;
        }
        if !self.closure_covers(&self.roots, |node| &node.succs)
            || !self.closure_covers(&self.sinks, |node| &node.preds)
        {
            return false;
        }
        // No two nodes may share group, successor set, and predecessor
        // set: such twins must have been coalesced.
        let mut shapes = BTreeSet::new();
        for node in &self.nodes {
            if !shapes.insert((&node.group, &node.succs, &node.preds)) {
                return false;
            }
        }
        // The expansion is a set: no duplicate lineages may reach
        // observers, and `breadth` must agree with it.
        let expansion = self.expanded();
        let distinct: BTreeSet<&Lineage<V>> = expansion.iter().collect();
        distinct.len() == expansion.len() && expansion.len() == self.breadth()
    }
}

impl<V: Clone + Ord + Hash> Identities<V> {
    /// Build from a sequence of lineages by repeated merge.
    ///
    /// Duplicate lineages collapse (set semantics); the result carries
    /// whatever sharing [`merge`](Self::merge) discovers.
    #[must_use]
    pub fn contracted<I, L>(lineages: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: IntoIterator<Item = Group<V>>,
    {
        lineages.into_iter().fold(Self::empty(), |acc, lineage| {
            acc.merge(&Self::from_lineage(lineage))
        })
    }
}

impl<V> Default for Identities<V> {
    fn default() -> Self {
        Self::empty()
    }
}

// Equality is set-equality of expansions: representation differences
// (how well sharing worked out) are invisible.
impl<V: Clone + Ord> PartialEq for Identities<V> {
    fn eq(&self, other: &Self) -> bool {
        self.expanded_set() == other.expanded_set()
    }
}

impl<V: Clone + Ord> Eq for Identities<V> {}

impl<V: Clone + Ord + Hash> Hash for Identities<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.expanded_set().hash(state);
    }
}

impl<V: Clone + Ord + fmt::Debug> fmt::Display for Identities<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (index, lineage) in self.expanded_set().iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{lineage:?}")?;
        }
        f.write_str("}")
    }
}

impl<V: fmt::Debug> fmt::Debug for Identities<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identities")
            .field("nodes", &DebugNodes(self))
            .field("roots", &self.roots)
            .field("sinks", &self.sinks)
            .finish()
    }
}

struct DebugNodes<'a, V>(&'a Identities<V>);

impl<V: fmt::Debug> fmt::Debug for DebugNodes<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (index, node) in self.0.nodes.iter().enumerate() {
            map.entry(&NodeId(index as u32), &(&node.group, &node.succs));
        }
        map.finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn singles(ids: &[i32]) -> Lineage<i32> {
        ids.iter().map(|&id| vec![id]).collect()
    }

    // === Construction =======================================================

    #[test]
    fn test_empty_has_no_structure() {
        let empty = Identities::<i32>::empty();
        assert!(empty.is_empty());
        assert_eq!(empty.breadth(), 0);
        assert_eq!(empty.depth(), 0);
        assert_eq!(empty.storage_size(), 0);
        assert!(empty.expanded().is_empty());
        assert!(empty.invariants_hold());
    }

    #[test]
    fn test_default_is_empty() {
        assert_eq!(Identities::<i32>::default(), Identities::empty());
    }

    #[test]
    fn test_single() {
        let single = Identities::single(7);
        assert!(!single.is_empty());
        assert_eq!(single.breadth(), 1);
        assert_eq!(single.depth(), 1);
        assert_eq!(single.storage_size(), 1);
        assert_eq!(single.expanded(), vec![vec![vec![7]]]);
        assert!(single.invariants_hold());
    }

    #[test]
    fn test_from_lineage_chain() {
        let chain = Identities::from_lineage(vec![vec![1, 2], vec![3]]);
        assert_eq!(chain.breadth(), 1);
        assert_eq!(chain.depth(), 2);
        assert_eq!(chain.storage_size(), 3);
        assert_eq!(chain.expanded(), vec![vec![vec![1, 2], vec![3]]]);
        assert!(chain.invariants_hold());
    }

    #[test]
    fn test_from_lineage_skips_empty_groups() {
        let chain = Identities::from_lineage(vec![vec![], vec![1], vec![]]);
        assert_eq!(chain, Identities::single(1));
    }

    #[test]
    fn test_from_lineage_of_nothing_is_empty() {
        let none: Identities<i32> = Identities::from_lineage(Vec::new());
        assert!(none.is_empty());
        let all_empty: Identities<i32> = Identities::from_lineage(vec![vec![], vec![]]);
        assert!(all_empty.is_empty());
    }

    #[test]
    fn test_contracted_collapses_duplicates() {
        let value = Identities::contracted([singles(&[1, 2]), singles(&[1, 2])]);
        assert_eq!(value.breadth(), 1);
        assert_eq!(value.storage_size(), 2);
    }

    // === Projections ========================================================

    #[test]
    fn test_breadth_and_depth_over_shared_dag() {
        let value = Identities::contracted([
            singles(&[1, 2, 6, 7, 8]),
            singles(&[3, 4, 6, 7, 8]),
            singles(&[1, 2, 6, 9, 10]),
            singles(&[3, 4, 6, 9, 10]),
        ]);
        assert_eq!(value.breadth(), 4);
        assert_eq!(value.depth(), 5);
        assert_eq!(value.breadth(), value.expanded().len());
    }

    #[test]
    fn test_depth_takes_longest_lineage() {
        let value = Identities::contracted([singles(&[1]), singles(&[2, 3, 4])]);
        assert_eq!(value.depth(), 3);
    }

    #[test]
    fn test_expanded_is_stable_within_a_value() {
        let value = Identities::contracted([singles(&[1, 2, 3]), singles(&[4, 5])]);
        assert_eq!(value.expanded(), value.expanded());
    }

    // === Equality and hashing ===============================================

    #[test]
    fn test_equality_ignores_lineage_order() {
        let forward = Identities::contracted([singles(&[1, 2]), singles(&[3, 4])]);
        let backward = Identities::contracted([singles(&[3, 4]), singles(&[1, 2])]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_equality_is_semantic_not_structural() {
        // Built through different merge histories, same lineage set.
        let a = Identities::contracted([singles(&[1, 2, 3]), singles(&[4, 2, 3])]);
        let b = Identities::from_lineage(singles(&[1, 2, 3]))
            .merge(&Identities::from_lineage(singles(&[4, 2, 3])));
        assert_eq!(a, b);
    }

    #[test]
    fn test_inequality() {
        let a = Identities::contracted([singles(&[1, 2])]);
        let b = Identities::contracted([singles(&[1, 3])]);
        assert_ne!(a, b);
        assert_ne!(a, Identities::empty());
    }

    #[test]
    fn test_hash_agrees_with_equality() {
        use std::collections::hash_map::DefaultHasher;

        let hash_of = |value: &Identities<i32>| {
            let mut hasher = DefaultHasher::new();
            value.hash(&mut hasher);
            hasher.finish()
        };
        let forward = Identities::contracted([singles(&[1, 2]), singles(&[3, 4])]);
        let backward = Identities::contracted([singles(&[3, 4]), singles(&[1, 2])]);
        assert_eq!(hash_of(&forward), hash_of(&backward));
    }

    // === Display ============================================================

    #[test]
    fn test_display_empty() {
        assert_eq!(format!("{}", Identities::<i32>::empty()), "{}");
    }

    #[test]
    fn test_display_sorts_lineages() {
        let value = Identities::contracted([singles(&[2]), singles(&[1])]);
        assert_eq!(format!("{value}"), "{[[1]], [[2]]}");
    }

    #[test]
    fn test_display_groups() {
        let value = Identities::from_lineage(vec![vec![1, 2], vec![3]]);
        assert_eq!(format!("{value}"), "{[[1, 2], [3]]}");
    }
}

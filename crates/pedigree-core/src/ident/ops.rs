//! Edit operations over identity DAGs.
//!
//! All four edits act on the *terminal* group of every represented
//! lineage. In the DAG that terminal role is the sink flag, and a sink may
//! also carry successors (a lineage ends where a longer one continues).
//! Edits that rewrite terminal groups therefore first split such mixed
//! sinks into an interior copy and a pure terminal copy, then touch only
//! the terminal copies. Every edit returns a fresh reduced value.

use std::hash::Hash;

use super::{Identities, NodeId};

impl<V: Clone + Ord + Hash> Identities<V> {
    /// Drop the final group of every lineage, discarding lineages that
    /// had only one group.
    ///
    /// Returns `None` on empty. Returns `Some(empty)` when every lineage
    /// had a single group. Runs in one traversal: predecessors of sinks
    /// become the new sinks, successor-free sinks are deleted, and sinks
    /// that continue into longer lineages merely lose their flag.
    #[must_use]
    pub fn init(&self) -> Option<Self> {
        if self.is_empty() {
            return None;
        }

        let doomed: Vec<NodeId> = self
            .sinks
            .iter()
            .copied()
            .filter(|&sink| self.node(sink).succs.is_empty())
            .collect();
        let promoted: Vec<NodeId> = self
            .sinks
            .iter()
            .flat_map(|&sink| self.node(sink).preds.iter().copied())
            .collect();

        // Rebuild the arena without the deleted terminals. A deleted node
        // has no successors, so surviving nodes keep all their
        // predecessors and only lose successor links.
        let mut remap: Vec<Option<NodeId>> = vec![None; self.nodes.len()];
        let mut trimmed = Self::empty();
        for (index, node) in self.nodes.iter().enumerate() {
            let id = NodeId(index as u32);
            if doomed.binary_search(&id).is_ok() {
                continue;
            }
            remap[index] = Some(trimmed.alloc(node.group.clone()));
        }
        if trimmed.nodes.is_empty() {
            return Some(Self::empty());
        }
        for (index, node) in self.nodes.iter().enumerate() {
            let Some(from) = remap[index] else { continue };
            for succ in &node.succs {
                if let Some(to) = remap[succ.index()] {
                    trimmed.nodes[from.index()].succs.insert(to);
                    trimmed.nodes[to.index()].preds.insert(from);
                }
            }
        }
        trimmed.roots = self
            .roots
            .iter()
            .filter_map(|root| remap[root.index()])
            .collect();
        trimmed.sinks = promoted
            .iter()
            .filter_map(|sink| remap[sink.index()])
            .collect();
        Some(trimmed.normalize())
    }

    /// Append a fresh singleton group `[value]` after every lineage.
    ///
    /// On empty this is [`single`](Self::single). All lineages come to
    /// share the one new terminal node.
    #[must_use]
    pub fn snoc(&self, value: V) -> Self {
        if self.is_empty() {
            return Self::single(value);
        }
        let mut next = self.clone();
        let tail = next.alloc(vec![value]);
        let old_sinks: Vec<NodeId> = next.sinks.iter().copied().collect();
        for sink in old_sinks {
            next.nodes[sink.index()].succs.insert(tail);
            next.nodes[tail.index()].preds.insert(sink);
        }
        next.sinks.clear();
        next.sinks.insert(tail);
        next.normalize()
    }

    /// Append `value` *into* the final group of every lineage.
    ///
    /// On empty this yields a single lineage of one group `[value]`.
    /// Unlike [`snoc`](Self::snoc) the lineage lengths do not change.
    #[must_use]
    pub fn conj(&self, value: V) -> Self {
        if self.is_empty() {
            return Self::single(value);
        }
        let mut next = self.clone();
        let old_sinks: Vec<NodeId> = next.sinks.iter().copied().collect();
        for sink in old_sinks {
            let terminal = next.split_terminal(sink);
            next.nodes[terminal.index()].group.push(value.clone());
        }
        next.normalize()
    }

    /// Insert a fresh singleton group `[value]` immediately before the
    /// final group of every lineage. Empty in, empty out.
    ///
    /// Lineages sharing one sink receive one spliced node between that
    /// sink and its predecessors; where a root is also a sink, the new
    /// node becomes that sink's unique predecessor and takes over as the
    /// root.
    #[must_use]
    pub fn submerge(&self, value: V) -> Self {
        if self.is_empty() {
            return Self::empty();
        }
        let mut next = self.clone();
        let old_sinks: Vec<NodeId> = next.sinks.iter().copied().collect();
        for sink in old_sinks {
            let terminal = next.split_terminal(sink);
            next.splice_before(terminal, value.clone());
        }
        next.normalize()
    }

    /// Detach the terminal role of `sink` from its interior role.
    ///
    /// For a pure sink (no successors) this is the node itself. For a
    /// mixed sink a terminal copy is created with the same group, the
    /// same predecessors, and the same root flag; the original keeps its
    /// successors and loses the sink flag.
    fn split_terminal(&mut self, sink: NodeId) -> NodeId {
        if self.node(sink).succs.is_empty() {
            return sink;
        }
        let group = self.node(sink).group.clone();
        let preds = self.node(sink).preds.clone();
        let terminal = self.alloc(group);
        self.nodes[terminal.index()].preds = preds.clone();
        for pred in preds {
            self.nodes[pred.index()].succs.insert(terminal);
        }
        if self.roots.contains(&sink) {
            self.roots.insert(terminal);
        }
        self.sinks.remove(&sink);
        self.sinks.insert(terminal);
        terminal
    }

    /// Splice a fresh `[value]` node between `sink` and its predecessors.
    /// `sink` must be a pure sink (callers split first).
    fn splice_before(&mut self, sink: NodeId, value: V) {
        let spliced = self.alloc(vec![value]);
        let preds = std::mem::take(&mut self.nodes[sink.index()].preds);
        for pred in &preds {
            self.nodes[pred.index()].succs.remove(&sink);
            self.nodes[pred.index()].succs.insert(spliced);
        }
        self.nodes[spliced.index()].preds = preds;
        self.nodes[spliced.index()].succs.insert(sink);
        self.nodes[sink.index()].preds.insert(spliced);
        if self.roots.remove(&sink) {
            self.roots.insert(spliced);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

// ByteGraph - Самообучающийся байтовый нейрографовый движок.
// Copyright (C) 2024-2025 Chernov Denys

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! EdgeList v1.0 - per-source directed edges between byte nodes
//!
//! Each source node owns its outgoing list; a symmetric incoming index keeps
//! reverse lookups O(degree). Weights are absolute and only compared locally
//! (relative weight = weight / max over the source's edges). Pruning marks
//! edges inactive; counters are retained and memory reclamation is deferred.

use crate::symbols::{SymbolId, BYTE_SYMBOLS, END_MARKER};

/// Initial weight of a freshly created edge.
pub const INITIAL_WEIGHT: f32 = 0.5;

/// Weight growth cap per strengthen invocation.
const GROWTH_CAP: f32 = 0.5;

/// A directed edge out of one byte node.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    /// Target: byte node or `END_MARKER`.
    pub to: SymbolId,
    /// Absolute weight; compared only against siblings of the same source.
    pub weight: f32,
    pub use_count: u32,
    /// Incremented only by feedback, never by propagation.
    pub success_count: u32,
    pub active: bool,
    /// Set when the edge was materialized from a pattern prediction.
    pub is_pattern_edge: bool,
    /// First context this edge was exercised in; frozen at creation.
    pub context_node: Option<u8>,
}

impl Edge {
    #[inline]
    pub fn success_rate(&self) -> f32 {
        if self.use_count == 0 {
            0.0
        } else {
            self.success_count as f32 / self.use_count as f32
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SourceEdges {
    edges: Vec<Edge>,
    /// Max weight over this source's active edges (local normalizer).
    max_weight: f32,
}

/// All node→node and node→END edges, keyed by source byte.
#[derive(Debug, Clone)]
pub struct EdgeList {
    sources: Vec<SourceEdges>,
    /// Incoming index: for each byte, the sources that point at it.
    incoming: Vec<Vec<u8>>,
    active_count: usize,
}

impl EdgeList {
    pub fn new() -> Self {
        Self {
            sources: vec![SourceEdges::default(); BYTE_SYMBOLS],
            incoming: vec![Vec::new(); BYTE_SYMBOLS],
            active_count: 0,
        }
    }

    /// Outgoing edges of `from` (active and inactive).
    #[inline]
    pub fn outgoing(&self, from: u8) -> &[Edge] {
        &self.sources[from as usize].edges
    }

    /// Sources with an active edge into `to`.
    #[inline]
    pub fn incoming(&self, to: u8) -> &[u8] {
        &self.incoming[to as usize]
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Relative weight of an edge against its source's strongest edge.
    #[inline]
    pub fn relative_weight(&self, from: u8, edge: &Edge) -> f32 {
        let max = self.sources[from as usize].max_weight;
        if max > 0.0 {
            edge.weight / max
        } else {
            0.0
        }
    }

    pub fn get(&self, from: u8, to: SymbolId) -> Option<&Edge> {
        self.sources[from as usize]
            .edges
            .iter()
            .find(|e| e.to == to)
    }

    pub fn get_mut(&mut self, from: u8, to: SymbolId) -> Option<&mut Edge> {
        let src = &mut self.sources[from as usize];
        let found = src.edges.iter_mut().find(|e| e.to == to);
        found
    }

    /// Create the edge or strengthen it if it already exists.
    ///
    /// Growth rate scales with usage and success:
    /// `0.1 * learning_rate * (1 + log(1+use)/10) * (1 + 2*success_rate)`,
    /// capped per invocation. `context` is recorded at first creation only.
    /// Self-loops are rejected. Returns true if the edge exists afterwards.
    pub fn create_or_strengthen(
        &mut self,
        from: u8,
        to: SymbolId,
        learning_rate: f32,
        context: Option<u8>,
    ) -> bool {
        if to == from as SymbolId {
            return false;
        }

        let existing = self.sources[from as usize]
            .edges
            .iter()
            .position(|e| e.to == to);
        if let Some(index) = existing {
            let mut revived = false;
            let src = &mut self.sources[from as usize];
            let edge = &mut src.edges[index];
            if edge.active {
                edge.use_count = edge.use_count.saturating_add(1);
                let growth = 0.1
                    * learning_rate
                    * (1.0 + (1.0 + edge.use_count as f32).ln() / 10.0)
                    * (1.0 + 2.0 * edge.success_rate());
                edge.weight += growth.min(GROWTH_CAP);
            } else {
                // Pruned edges revive on re-use with their history intact.
                edge.active = true;
                edge.use_count = edge.use_count.saturating_add(1);
                revived = true;
            }
            src.max_weight = src
                .edges
                .iter()
                .filter(|e| e.active)
                .fold(0.0, |m, e| m.max(e.weight));
            if revived {
                self.active_count += 1;
            }
            return true;
        }

        let src = &mut self.sources[from as usize];
        src.edges.push(Edge {
            to,
            weight: INITIAL_WEIGHT,
            use_count: 1,
            success_count: 0,
            active: true,
            is_pattern_edge: false,
            context_node: context,
        });
        src.max_weight = src.max_weight.max(INITIAL_WEIGHT);
        self.active_count += 1;

        if (to as usize) < BYTE_SYMBOLS {
            let inc = &mut self.incoming[to as usize];
            if !inc.contains(&from) {
                inc.push(from);
            }
        }
        true
    }

    /// Mark an edge as pattern-materialized.
    pub fn mark_pattern_edge(&mut self, from: u8, to: SymbolId) {
        if let Some(edge) = self.get_mut(from, to) {
            edge.is_pattern_edge = true;
        }
    }

    /// Record a feedback success on an edge.
    pub fn record_success(&mut self, from: u8, to: SymbolId) {
        if let Some(edge) = self.get_mut(from, to) {
            edge.success_count = edge.success_count.saturating_add(1).min(edge.use_count);
        }
    }

    /// Multiplicatively weaken an edge (negative feedback).
    pub fn weaken(&mut self, from: u8, to: SymbolId, factor: f32) {
        let src = &mut self.sources[from as usize];
        if let Some(edge) = src.edges.iter_mut().find(|e| e.to == to) {
            edge.weight *= factor.clamp(0.0, 1.0);
        }
        src.max_weight = src
            .edges
            .iter()
            .filter(|e| e.active)
            .fold(0.0, |m, e| m.max(e.weight));
    }

    /// Metabolic load of one source: `(count / 256)^2`.
    pub fn metabolic_load(&self, from: u8) -> f32 {
        let count = self.sources[from as usize]
            .edges
            .iter()
            .filter(|e| e.active)
            .count() as f32;
        (count / BYTE_SYMBOLS as f32).powi(2)
    }

    /// Deactivate edges whose value no longer pays for their cost share.
    ///
    /// Runs only under metabolic load above 0.5; an edge survives while
    /// `weight / cost_share >= load * 0.1`.
    pub fn prune(&mut self, from: u8) {
        let load = self.metabolic_load(from);
        if load <= 0.5 {
            return;
        }
        let src = &mut self.sources[from as usize];
        let active = src.edges.iter().filter(|e| e.active).count().max(1) as f32;
        let cost_share = 1.0 / active;
        let cutoff = load * 0.1;
        let mut deactivated = 0usize;
        for edge in src.edges.iter_mut() {
            if edge.active && edge.weight / cost_share < cutoff {
                edge.active = false;
                deactivated += 1;
            }
        }
        src.max_weight = src
            .edges
            .iter()
            .filter(|e| e.active)
            .fold(0.0, |m, e| m.max(e.weight));
        self.active_count -= deactivated;
    }

    /// Restore a persisted edge with its exact weight. Counters start
    /// fresh; only the weight was persisted.
    pub fn restore(&mut self, from: u8, to: SymbolId, weight: f32) -> bool {
        if to == from as SymbolId || !weight.is_finite() {
            return false;
        }
        let src = &mut self.sources[from as usize];
        if let Some(edge) = src.edges.iter_mut().find(|e| e.to == to) {
            edge.weight = weight;
            src.max_weight = src
                .edges
                .iter()
                .filter(|e| e.active)
                .fold(0.0, |m, e| m.max(e.weight));
            return true;
        }
        src.edges.push(Edge {
            to,
            weight,
            use_count: 1,
            success_count: 0,
            active: true,
            is_pattern_edge: false,
            context_node: None,
        });
        src.max_weight = src.max_weight.max(weight);
        self.active_count += 1;
        if (to as usize) < BYTE_SYMBOLS {
            let inc = &mut self.incoming[to as usize];
            if !inc.contains(&from) {
                inc.push(from);
            }
        }
        true
    }

    /// All active edges as (from, edge) for persistence and invariants.
    pub fn iter_active(&self) -> impl Iterator<Item = (u8, &Edge)> {
        self.sources.iter().enumerate().flat_map(|(from, src)| {
            src.edges
                .iter()
                .filter(|e| e.active)
                .map(move |e| (from as u8, e))
        })
    }

    /// Does `from` have an active edge to `to`?
    #[inline]
    pub fn has_active(&self, from: u8, to: SymbolId) -> bool {
        self.get(from, to).map(|e| e.active).unwrap_or(false)
    }
}

/// Canonical Hebbian direction: lower id → higher id.
#[inline]
pub fn canonical_pair(a: u8, b: u8) -> (u8, u8) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_self_loops() {
        let mut edges = EdgeList::new();
        assert!(!edges.create_or_strengthen(b'a', b'a' as SymbolId, 0.1, None));
        assert_eq!(edges.active_count(), 0);
    }

    #[test]
    fn test_create_then_strengthen() {
        let mut edges = EdgeList::new();
        edges.create_or_strengthen(b'a', b'b' as SymbolId, 0.1, Some(b'c'));
        let w0 = edges.get(b'a', b'b' as SymbolId).unwrap().weight;
        assert!((w0 - INITIAL_WEIGHT).abs() < 1e-6);

        edges.create_or_strengthen(b'a', b'b' as SymbolId, 0.1, Some(b'x'));
        let edge = edges.get(b'a', b'b' as SymbolId).unwrap();
        assert!(edge.weight > w0);
        assert_eq!(edge.use_count, 2);
        // Context frozen at creation.
        assert_eq!(edge.context_node, Some(b'c'));
    }

    #[test]
    fn test_relative_weight_uses_source_max() {
        let mut edges = EdgeList::new();
        edges.create_or_strengthen(b'a', b'b' as SymbolId, 0.1, None);
        for _ in 0..50 {
            edges.create_or_strengthen(b'a', b'c' as SymbolId, 0.5, None);
        }
        let weak = *edges.get(b'a', b'b' as SymbolId).unwrap();
        let strong = *edges.get(b'a', b'c' as SymbolId).unwrap();
        assert!(edges.relative_weight(b'a', &strong) > edges.relative_weight(b'a', &weak));
        assert!((edges.relative_weight(b'a', &strong) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_success_capped_by_use() {
        let mut edges = EdgeList::new();
        edges.create_or_strengthen(b'a', b'b' as SymbolId, 0.1, None);
        edges.record_success(b'a', b'b' as SymbolId);
        edges.record_success(b'a', b'b' as SymbolId);
        let edge = edges.get(b'a', b'b' as SymbolId).unwrap();
        assert!(edge.success_count <= edge.use_count);
    }

    #[test]
    fn test_end_marker_edge() {
        let mut edges = EdgeList::new();
        edges.create_or_strengthen(b's', END_MARKER, 0.1, None);
        assert!(edges.has_active(b's', END_MARKER));
        // END is not a byte; no incoming entry.
        assert!(edges.incoming.iter().all(|v| v.is_empty()));
    }

    #[test]
    fn test_incoming_index() {
        let mut edges = EdgeList::new();
        edges.create_or_strengthen(b'a', b'b' as SymbolId, 0.1, None);
        edges.create_or_strengthen(b'c', b'b' as SymbolId, 0.1, None);
        assert_eq!(edges.incoming(b'b'), &[b'a', b'c']);
    }

    #[test]
    fn test_prune_requires_metabolic_load() {
        let mut edges = EdgeList::new();
        edges.create_or_strengthen(b'a', b'b' as SymbolId, 0.1, None);
        edges.prune(b'a');
        // Load is far below 0.5 with one edge; nothing deactivates.
        assert!(edges.get(b'a', b'b' as SymbolId).unwrap().active);
    }
}

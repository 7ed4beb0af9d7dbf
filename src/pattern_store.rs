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

//! PatternStore v1.0 - arena of patterns with acceleration indices
//!
//! Patterns reference each other (parents, associations, rules, pattern
//! predictions) through integer handles into this arena; `PATTERN_NONE` is
//! the null handle. Pruning marks a pattern inert instead of freeing it so
//! handles never dangle.
//!
//! Two indices keep the per-step hot path off the full pattern scan:
//! symbol → patterns containing it, and symbol → patterns predicting it.
//! Both index membership only; weights live on the patterns.

use smallvec::SmallVec;

use crate::pattern::Pattern;
use crate::symbols::{PatternId, SymbolId, WILDCARD};

/// Symbol index domain: 256 bytes + WILDCARD + END_MARKER.
const SYMBOL_SLOTS: usize = 258;

/// A directed pattern→pattern edge (separate space from node edges).
#[derive(Debug, Clone, Copy)]
pub struct PatternEdge {
    pub to: PatternId,
    pub weight: f32,
    pub use_count: u32,
}

#[derive(Debug, Clone)]
pub struct PatternStore {
    patterns: Vec<Pattern>,
    /// symbol → patterns whose sequence contains it.
    containing: Vec<SmallVec<[PatternId; 4]>>,
    /// symbol → patterns whose prediction table contains it.
    predicting: Vec<SmallVec<[PatternId; 4]>>,
    /// Per-pattern outgoing pattern edges.
    pattern_edges: Vec<SmallVec<[PatternEdge; 2]>>,
    /// Patterns above threshold this step, rebuilt by the propagator.
    pub active: Vec<PatternId>,
}

impl PatternStore {
    pub fn new() -> Self {
        Self {
            patterns: Vec::new(),
            containing: vec![SmallVec::new(); SYMBOL_SLOTS],
            predicting: vec![SmallVec::new(); SYMBOL_SLOTS],
            pattern_edges: Vec::new(),
            active: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Count of patterns that are still alive (strength > 0).
    pub fn alive_count(&self) -> usize {
        self.patterns.iter().filter(|p| p.is_alive()).count()
    }

    #[inline]
    pub fn get(&self, id: PatternId) -> Option<&Pattern> {
        self.patterns.get(id as usize)
    }

    #[inline]
    pub fn get_mut(&mut self, id: PatternId) -> Option<&mut Pattern> {
        self.patterns.get_mut(id as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PatternId, &Pattern)> {
        self.patterns
            .iter()
            .enumerate()
            .map(|(i, p)| (i as PatternId, p))
    }

    pub fn ids(&self) -> std::ops::Range<PatternId> {
        0..self.patterns.len() as PatternId
    }

    /// Insert a pattern and index its membership.
    pub fn insert(&mut self, pattern: Pattern) -> PatternId {
        let id = self.patterns.len() as PatternId;
        for &symbol in &pattern.sequence {
            let slot = &mut self.containing[symbol as usize];
            if !slot.contains(&id) {
                slot.push(id);
            }
        }
        for &symbol in &pattern.predicted_nodes {
            let slot = &mut self.predicting[symbol as usize];
            if !slot.contains(&id) {
                slot.push(id);
            }
        }
        self.patterns.push(pattern);
        self.pattern_edges.push(SmallVec::new());
        id
    }

    /// Does an alive pattern with exactly this sequence exist?
    pub fn find_by_sequence(&self, sequence: &[SymbolId]) -> Option<PatternId> {
        // Narrow via the first concrete symbol's containing index.
        let probe = sequence.iter().find(|&&s| s != WILDCARD).copied();
        let candidates: &[PatternId] = match probe {
            Some(s) => &self.containing[s as usize],
            None => return None,
        };
        candidates
            .iter()
            .copied()
            .find(|&id| {
                let p = &self.patterns[id as usize];
                p.is_alive() && p.sequence.as_slice() == sequence
            })
    }

    /// Patterns containing `symbol` (alive or not; callers filter).
    #[inline]
    pub fn containing(&self, symbol: SymbolId) -> &[PatternId] {
        &self.containing[symbol as usize]
    }

    /// Patterns predicting `symbol`.
    #[inline]
    pub fn predicting(&self, symbol: SymbolId) -> &[PatternId] {
        &self.predicting[symbol as usize]
    }

    /// Keep the predicting index in sync after a prediction was appended.
    pub fn index_prediction(&mut self, id: PatternId, symbol: SymbolId) {
        let slot = &mut self.predicting[symbol as usize];
        if !slot.contains(&id) {
            slot.push(id);
        }
    }

    /// Add or strengthen a directed pattern→pattern edge.
    pub fn link_patterns(&mut self, from: PatternId, to: PatternId, delta: f32) {
        if from == to || (from as usize) >= self.pattern_edges.len() {
            return;
        }
        let edges = &mut self.pattern_edges[from as usize];
        if let Some(edge) = edges.iter_mut().find(|e| e.to == to) {
            edge.weight = (edge.weight + delta).min(5.0);
            edge.use_count = edge.use_count.saturating_add(1);
        } else {
            edges.push(PatternEdge {
                to,
                weight: 0.5 + delta,
                use_count: 1,
            });
        }
    }

    #[inline]
    pub fn pattern_edges(&self, from: PatternId) -> &[PatternEdge] {
        self.pattern_edges
            .get(from as usize)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn all_pattern_edges(&self) -> impl Iterator<Item = (PatternId, &PatternEdge)> {
        self.pattern_edges.iter().enumerate().flat_map(|(from, edges)| {
            edges.iter().map(move |e| (from as PatternId, e))
        })
    }

    /// Prune: strength to zero, volatile state cleared, slot retained.
    pub fn prune(&mut self, id: PatternId) {
        if let Some(p) = self.patterns.get_mut(id as usize) {
            p.strength = 0.0;
            p.activation = 0.0;
            p.has_fired = false;
        }
    }

    /// Reset per-episode volatile state on every pattern.
    pub fn reset_volatile(&mut self) {
        for p in self.patterns.iter_mut() {
            p.reset_volatile();
        }
        self.active.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::CONTEXT_LEN;
    use crate::symbols::END_MARKER;

    fn seq(s: &[u8]) -> Vec<SymbolId> {
        s.iter().map(|&b| b as SymbolId).collect()
    }

    fn store_with(seqs: &[&[u8]]) -> PatternStore {
        let mut store = PatternStore::new();
        for s in seqs {
            store.insert(Pattern::new(&seq(s), 0.5, 0, [0.0; CONTEXT_LEN]));
        }
        store
    }

    #[test]
    fn test_insert_and_indices() {
        let mut store = store_with(&[b"ca", b"at"]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.containing(b'a' as SymbolId).len(), 2);
        assert_eq!(store.containing(b'c' as SymbolId), &[0]);

        store.get_mut(1).unwrap().upsert_prediction(b's' as SymbolId, 0.0, 0.3);
        store.index_prediction(1, b's' as SymbolId);
        assert_eq!(store.predicting(b's' as SymbolId), &[1]);
    }

    #[test]
    fn test_find_by_sequence() {
        let store = store_with(&[b"ca", b"at"]);
        assert_eq!(store.find_by_sequence(&seq(b"at")), Some(1));
        assert_eq!(store.find_by_sequence(&seq(b"xy")), None);
    }

    #[test]
    fn test_pruned_handle_stays_valid() {
        let mut store = store_with(&[b"ca"]);
        store.prune(0);
        let p = store.get(0).unwrap();
        assert!(!p.is_alive());
        assert_eq!(p.activation, 0.0);
        // Pruned patterns no longer resolve by sequence.
        assert_eq!(store.find_by_sequence(&seq(b"ca")), None);
    }

    #[test]
    fn test_pattern_edges() {
        let mut store = store_with(&[b"ca", b"at"]);
        store.link_patterns(0, 1, 0.2);
        store.link_patterns(0, 1, 0.2);
        let edges = store.pattern_edges(0);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].use_count, 2);
        // Self-links are rejected.
        store.link_patterns(1, 1, 0.2);
        assert!(store.pattern_edges(1).is_empty());
    }

    #[test]
    fn test_end_marker_indexable() {
        let mut store = store_with(&[b"at"]);
        store.get_mut(0).unwrap().upsert_prediction(END_MARKER, 0.0, 0.2);
        store.index_prediction(0, END_MARKER);
        assert_eq!(store.predicting(END_MARKER), &[0]);
    }
}

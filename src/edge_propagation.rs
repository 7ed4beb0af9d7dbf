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

//! EdgePropagator v1.0 - wave propagation with path-quality scoring
//!
//! Runs after the pattern propagator. Every sufficiently active node pushes
//! activation along its outgoing edges; the share each edge carries is its
//! *path quality*, a product of independently evaluated factors:
//!
//! - information carried: edges that follow the input sequence structure
//!   transfer an order of magnitude more than edges merely reachable from
//!   input nodes;
//! - pattern support: the strongest active pattern predicting the target;
//! - history coherence: whether the previous output connects to the target;
//! - predictive power: prediction weight × success of the supporting
//!   pattern;
//! - learned factor: the controlling pattern's propagation transfer rate.
//!
//! Transfers use the pre-step activation snapshot, so ordering within a
//! step cannot influence the result. After the wave: Hebbian edge creation
//! between co-active nodes, materialization of pattern predictions into
//! edges, pattern co-activation links, node dynamics, and pruning.

use crate::edge::canonical_pair;
use crate::graph::ByteGraph;
use crate::symbols::{SymbolId, BYTE_SYMBOLS};

/// Path-quality explosion cap (soft normalization ceiling).
const QUALITY_CAP: f32 = 100.0;
/// Transfers below this are dropped as noise.
const MIN_TRANSFER: f32 = 1.0e-4;

impl ByteGraph {
    /// One edge-propagation step: wave transfer plus structural upkeep.
    pub(crate) fn propagate_edges(&mut self) {
        let learning_rate = self.state.learning_rate;
        let avg_activation = self.state.avg_activation;
        let competition_pressure = self.state.competition_pressure;
        let flow_adjustment = self.state.activation_flow_adjustment.clamp(0.5, 1.5);

        // Pattern support tables over byte targets.
        let mut support = [0.0f32; BYTE_SYMBOLS];
        let mut learned_rate = [0.5f32; BYTE_SYMBOLS];
        let mut predictive = [0.0f32; BYTE_SYMBOLS];
        for &pid in &self.patterns.active {
            let p = match self.patterns.get(pid) {
                Some(p) if p.is_alive() => p,
                _ => continue,
            };
            let backing = p.activation * p.strength;
            for (&symbol, &weight) in p.predicted_nodes.iter().zip(p.prediction_weights.iter()) {
                if (symbol as usize) >= BYTE_SYMBOLS {
                    continue;
                }
                let target = symbol as usize;
                if backing > support[target] {
                    support[target] = backing;
                    learned_rate[target] = p.transfer.rate;
                }
                predictive[target] = predictive[target].max(weight * p.success_rate());
            }
        }

        let mut in_input = [false; BYTE_SYMBOLS];
        for &b in &self.input {
            in_input[b as usize] = true;
        }
        let prev_out = self.output.last().copied();

        // Pre-step snapshot: the wave reads it, receives accumulate on top.
        let pre: Vec<f32> = (0..BYTE_SYMBOLS)
            .map(|i| self.nodes.get(i as u8).activation)
            .collect();
        let act_min = (0.1 * avg_activation).max(1.0e-4);

        let sources: Vec<u8> = self
            .nodes
            .iter_existing()
            .filter(|(b, _)| pre[*b as usize] >= act_min)
            .map(|(b, _)| b)
            .collect();

        for from in sources {
            let source_act = pre[from as usize];
            let mut transfers: Vec<(u8, f32, bool)> = Vec::new();

            for edge in self.edges.outgoing(from) {
                if !edge.active || (edge.to as usize) >= BYTE_SYMBOLS {
                    continue;
                }
                let to = edge.to as u8;
                let rel = self.edges.relative_weight(from, edge);
                let usage = 1.0 + (1.0 + edge.use_count as f32).ln() / 10.0;

                let follows_input = self
                    .input
                    .windows(2)
                    .any(|w| w[0] == from && w[1] == to);
                let information = if follows_input {
                    1.0 * rel * usage
                } else if in_input[from as usize] && in_input[to as usize] {
                    0.1 * rel * usage
                } else {
                    0.02 * rel * usage
                };

                let support_factor = 0.02 + support[to as usize];
                let mut coherence = match prev_out {
                    Some(prev) if self.edges.has_active(prev, to as SymbolId) => {
                        (edge.weight * usage * 0.1).min(1.0)
                    }
                    _ => 0.0,
                };
                // Context continuity: the edge fires in the context it was
                // first exercised in.
                if prev_out.is_some() && edge.context_node == prev_out {
                    coherence += 0.2;
                }

                let quality = (information
                    * support_factor
                    * (1.0 + coherence)
                    * (1.0 + predictive[to as usize]))
                    .min(QUALITY_CAP);

                let transfer =
                    source_act * quality * learned_rate[to as usize] * flow_adjustment;
                if transfer > MIN_TRANSFER {
                    transfers.push((to, transfer, transfer > 0.1 * source_act));
                }
            }

            for &(to, transfer, strong) in &transfers {
                self.nodes.receive(to, transfer, from);
                if strong {
                    // Strong transfer reinforces usage; success counters are
                    // touched only by feedback.
                    if let Some(edge) = self.edges.get_mut(from, to as SymbolId) {
                        edge.use_count = edge.use_count.saturating_add(1);
                    }
                }
            }

            // Temporal decay of the pre-step component; freshly-received
            // activation is preserved.
            let node = self.nodes.get_mut(from);
            node.activation = (node.activation - source_act * 0.1).max(0.0);
        }

        self.create_hebbian_edges(learning_rate, prev_out);
        self.materialize_prediction_edges(learning_rate);
        self.link_coactive_patterns();

        let existing: Vec<u8> = self.nodes.iter_existing().map(|(b, _)| b).collect();
        for byte in existing {
            self.nodes
                .update_dynamics(byte, avg_activation, competition_pressure, learning_rate);
            self.edges.prune(byte);
        }
    }

    /// Hebbian creation between currently co-active nodes. Direction is
    /// canonicalized lower id → higher id; the activity threshold scales
    /// with the learning rate.
    fn create_hebbian_edges(&mut self, learning_rate: f32, context: Option<u8>) {
        let threshold = (3.0 * learning_rate).clamp(0.1, 0.5);
        let active: Vec<u8> = self
            .nodes
            .iter_existing()
            .filter(|(_, n)| n.activation >= threshold)
            .map(|(b, _)| b)
            .collect();

        for i in 0..active.len() {
            for j in (i + 1)..active.len() {
                let (lo, hi) = canonical_pair(active[i], active[j]);
                if !self.config.allow_antiparallel
                    && self.edges.has_active(hi, lo as SymbolId)
                {
                    continue;
                }
                self.edges
                    .create_or_strengthen(lo, hi as SymbolId, learning_rate, context);
            }
        }
    }

    /// Materialize confident pattern predictions as edges from the last
    /// concrete pattern member to each predicted node.
    fn materialize_prediction_edges(&mut self, learning_rate: f32) {
        let mut wanted: Vec<(u8, SymbolId)> = Vec::new();
        for &pid in &self.patterns.active {
            let p = match self.patterns.get(pid) {
                Some(p) if p.is_alive() => p,
                _ => continue,
            };
            let last = match p
                .sequence
                .iter()
                .rev()
                .find(|&&s| (s as usize) < BYTE_SYMBOLS)
            {
                Some(&s) => s as u8,
                None => continue,
            };
            for (&symbol, &weight) in p.predicted_nodes.iter().zip(p.prediction_weights.iter()) {
                if weight >= 0.3 && (symbol as usize) < BYTE_SYMBOLS && symbol != last as SymbolId {
                    wanted.push((last, symbol));
                }
            }
        }
        for (from, to) in wanted {
            if !self.config.allow_antiparallel && self.edges.has_active(to as u8, from as SymbolId)
            {
                continue;
            }
            self.edges.create_or_strengthen(from, to, learning_rate, None);
            self.edges.mark_pattern_edge(from, to);
        }
    }

    /// Pattern co-activation links; bidirectional in pattern space.
    fn link_coactive_patterns(&mut self) {
        let active = self.patterns.active.clone();
        for i in 0..active.len() {
            for j in (i + 1)..active.len() {
                self.patterns.link_patterns(active[i], active[j], 0.05);
                self.patterns.link_patterns(active[j], active[i], 0.05);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::ByteGraph;
    use crate::pattern::{Pattern, CONTEXT_LEN};
    use crate::symbols::SymbolId;

    #[test]
    fn test_input_sequence_transfer_dominates() {
        let mut graph = ByteGraph::new();
        graph.input = b"ab".to_vec();
        graph.nodes.activate(b'a', 1.0, 0);
        graph.nodes.activate(b'b', 0.0, 0);
        graph.nodes.activate(b'x', 0.0, 0);
        graph.edges.create_or_strengthen(b'a', b'b' as SymbolId, 0.1, None);
        graph.edges.create_or_strengthen(b'a', b'x' as SymbolId, 0.1, None);
        graph.state.recompute(&graph.nodes, &graph.edges, &graph.patterns, 2, 0);

        graph.propagate_edges();

        let b_act = graph.nodes.get(b'b').activation;
        let x_act = graph.nodes.get(b'x').activation;
        assert!(
            b_act > x_act,
            "edge following input structure must carry more ({} vs {})",
            b_act,
            x_act
        );
    }

    #[test]
    fn test_hebbian_creation_is_canonical() {
        let mut graph = ByteGraph::new();
        graph.nodes.activate(b'b', 1.0, 0);
        graph.nodes.activate(b'a', 1.0, 0);
        graph.state.recompute(&graph.nodes, &graph.edges, &graph.patterns, 0, 0);

        graph.propagate_edges();

        // Lower id → higher id regardless of activation order.
        assert!(graph.edges.has_active(b'a', b'b' as SymbolId));
        assert!(!graph.edges.has_active(b'b', b'a' as SymbolId));
    }

    #[test]
    fn test_prediction_materialization() {
        let mut graph = ByteGraph::new();
        graph.input = b"at".to_vec();
        graph.nodes.activate(b'a', 1.0, 0);
        graph.nodes.activate(b't', 1.0, 0);

        let mut p = Pattern::new(&[b'a' as SymbolId, b't' as SymbolId], 0.8, 0, [0.0; CONTEXT_LEN]);
        p.upsert_prediction(b's' as SymbolId, 0.0, 0.9);
        p.activation = 1.0;
        let id = graph.patterns.insert(p);
        graph.patterns.index_prediction(id, b's' as SymbolId);
        graph.patterns.active.push(id);

        graph.propagate_edges();

        let edge = graph.edges.get(b't', b's' as SymbolId).expect("materialized");
        assert!(edge.active);
        assert!(edge.is_pattern_edge);
    }

    #[test]
    fn test_antiparallel_toggle() {
        let mut config = crate::config::GraphConfig::default();
        config.allow_antiparallel = false;
        let mut graph = ByteGraph::with_config(config);
        graph.edges.create_or_strengthen(b'b', b'a' as SymbolId, 0.1, None);
        graph.nodes.activate(b'a', 1.0, 0);
        graph.nodes.activate(b'b', 1.0, 0);

        graph.propagate_edges();

        // Reverse already exists, so the canonical a→b pair is skipped.
        assert!(!graph.edges.has_active(b'a', b'b' as SymbolId));
    }
}

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

//! Selector v1.0 - per-step output selection
//!
//! Combines four per-node components — pattern evidence, edge evidence,
//! positional context, and raw activation — each normalized by its own
//! per-step maximum, then mixed with weights derived from the current
//! learning and error rates. The end marker competes as a pseudo-node fed
//! by END predictions of tail-matching patterns and END edges out of the
//! last output; it wins by exceeding the best byte's combined score.
//!
//! Pattern predictions are alignment-scoped: a prediction names the symbol
//! after its match, so only matches ending exactly at the next output
//! position count. Before anything is emitted no match can end at the
//! response head, and the positional context component seeds the first
//! byte instead.

use crate::graph::ByteGraph;
use crate::matcher::MatchQuery;
use crate::symbols::{PatternId, SymbolId, BYTE_SYMBOLS, END_MARKER};

/// Tagged selection outcome; the driver dispatches on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Emit this byte.
    Node(u8),
    /// Terminate output.
    End,
    /// Nothing scored; a streak of these ends the episode.
    NoSelection,
}

/// One pattern's share in an emitted symbol.
#[derive(Debug, Clone)]
pub struct PatternContribution {
    pub pattern: PatternId,
    pub prediction: SymbolId,
    pub amount: f32,
}

/// One edge's share in an emitted symbol.
#[derive(Debug, Clone)]
pub struct EdgeContribution {
    pub from: u8,
    pub to: SymbolId,
    pub amount: f32,
}

/// Credit-assignment record for one emitted position.
#[derive(Debug, Clone, Default)]
pub struct StepContribution {
    pub position: usize,
    pub patterns: Vec<PatternContribution>,
    pub edges: Vec<EdgeContribution>,
    pub total: f32,
}

impl ByteGraph {
    /// Pick the next symbol. Returns the outcome, the selection confidence
    /// (margin between best and runner-up), and the contribution record for
    /// the winning byte.
    pub(crate) fn select_next(&mut self) -> (Selection, f32, StepContribution) {
        let error_rate = self.state.error_rate;
        let learning_rate = self.state.learning_rate;
        let position = self.output.len();

        let novelty = self.novelty_multiplier();

        let mut pattern_score = [0.0f32; BYTE_SYMBOLS];
        let mut edge_score = [0.0f32; BYTE_SYMBOLS];
        let mut context_score = [0.0f32; BYTE_SYMBOLS];
        let mut activation_score = [0.0f32; BYTE_SYMBOLS];
        let mut end_pattern = 0.0f32;
        let mut end_edge = 0.0f32;

        let mut pattern_contribs: Vec<(SymbolId, PatternContribution)> = Vec::new();
        let mut edge_contribs: Vec<(SymbolId, EdgeContribution)> = Vec::new();

        // Pattern component: predictions of patterns whose match ends at
        // the next output position.
        if !self.output.is_empty() {
            let query = MatchQuery {
                nodes: &self.nodes,
                ambient: &self.context,
                port: self.input_port,
            };
            for (id, p) in self.patterns.iter() {
                if !p.is_alive() || p.activation <= 0.0 {
                    continue;
                }
                if !query.matches_suffix(p, &self.output) {
                    continue;
                }
                let influence = p.selection.weight_factor * p.strength
                    + p.selection.activation_factor * p.activation.min(1.0)
                    + p.selection.context_factor
                    + p.selection.pattern_factor;
                let meaning = p.meaning_boost(error_rate);
                let hierarchy = 1.0 + 0.05 * p.chain_depth as f32;
                let success = 0.5 + p.success_rate();
                for (&symbol, &weight) in
                    p.predicted_nodes.iter().zip(p.prediction_weights.iter())
                {
                    let amount = p.strength
                        * p.activation
                        * weight
                        * influence
                        * meaning
                        * hierarchy
                        * success
                        * novelty;
                    if amount <= 0.0 {
                        continue;
                    }
                    if symbol == END_MARKER {
                        end_pattern += amount;
                    } else if (symbol as usize) < BYTE_SYMBOLS {
                        pattern_score[symbol as usize] += amount;
                    }
                    pattern_contribs.push((
                        symbol,
                        PatternContribution {
                            pattern: id,
                            prediction: symbol,
                            amount,
                        },
                    ));
                }
            }
        }

        // Edge component: out of the last output node, or out of the input
        // nodes before anything is emitted.
        let mut edge_sources: Vec<u8> = Vec::new();
        match self.output.last() {
            Some(&last) => edge_sources.push(last),
            None => {
                for &b in &self.input {
                    if !edge_sources.contains(&b) {
                        edge_sources.push(b);
                    }
                }
            }
        }
        let first_emission = self.output.is_empty();
        let input_head = self.input.first().copied();
        for &from in &edge_sources {
            for edge in self.edges.outgoing(from) {
                if !edge.active {
                    continue;
                }
                let rel = self.edges.relative_weight(from, edge);
                let usage = 1.0 + (1.0 + edge.use_count as f32).ln() / 10.0;
                let mut amount = rel * usage * (0.3 + edge.success_rate()) * novelty;
                if first_emission && Some(from) == input_head {
                    amount *= 1.2;
                }
                if amount <= 0.0 {
                    continue;
                }
                if edge.to == END_MARKER {
                    // END edges only speak for the emitted tail.
                    if !first_emission {
                        end_edge += amount;
                        edge_contribs.push((
                            END_MARKER,
                            EdgeContribution { from, to: edge.to, amount },
                        ));
                    }
                } else if (edge.to as usize) < BYTE_SYMBOLS {
                    edge_score[edge.to as usize] += amount;
                    edge_contribs.push((
                        edge.to,
                        EdgeContribution { from, to: edge.to, amount },
                    ));
                }
            }
        }

        // Context component: position-aware echo of the input.
        if position < self.input.len() {
            if position == 0 {
                context_score[self.input[0] as usize] += 3.0;
            } else {
                context_score[self.input[position] as usize] += 1.5;
            }
            for &b in &self.input {
                context_score[b as usize] += 0.3;
            }
        }

        // Activation component: fatigue-damped, echo-penalized for input.
        let echo_penalty = (0.5 + 0.5 * error_rate - learning_rate).clamp(0.1, 1.0);
        let mut in_input = [false; BYTE_SYMBOLS];
        for &b in &self.input {
            in_input[b as usize] = true;
        }
        let loop_damp = 1.0 - 0.5 * self.state.loop_breaking_strength.clamp(0.0, 1.0);
        for (byte, node) in self.nodes.iter_existing() {
            let mut a = node.activation * (1.0 - node.adaptation);
            if in_input[byte as usize] {
                a *= echo_penalty;
            }
            if self.output.last() == Some(&byte) {
                a *= loop_damp;
            }
            activation_score[byte as usize] = a.max(0.0);
        }

        // Per-component normalization; END participates in its components.
        let pattern_max = max_of(&pattern_score).max(end_pattern);
        let edge_max = max_of(&edge_score).max(end_edge);
        let context_max = max_of(&context_score);
        let activation_max = max_of(&activation_score);

        // Combination weights are functions of the current rates.
        let mut w_pattern = 0.4 * (1.0 - 0.5 * error_rate);
        let mut w_edge = 0.15;
        let mut w_context = 0.3 + 0.2 * error_rate;
        let mut w_activation = 0.1;
        let sum = w_pattern + w_edge + w_context + w_activation;
        w_pattern /= sum;
        w_edge /= sum;
        w_context /= sum;
        w_activation /= sum;

        let mut best: Option<(u8, f32)> = None;
        let mut second = 0.0f32;
        for byte in 0..BYTE_SYMBOLS {
            let mut score = 0.0f32;
            if pattern_max > 0.0 {
                score += w_pattern * pattern_score[byte] / pattern_max;
            }
            if edge_max > 0.0 {
                score += w_edge * edge_score[byte] / edge_max;
            }
            if context_max > 0.0 {
                score += w_context * context_score[byte] / context_max;
            }
            if activation_max > 0.0 {
                score += w_activation * activation_score[byte] / activation_max;
            }
            if score <= 0.0 {
                continue;
            }
            match best {
                Some((_, b)) if score > b => {
                    second = b;
                    best = Some((byte as u8, score));
                }
                Some((_, b)) => {
                    if score > second && score <= b {
                        second = score;
                    }
                }
                None => best = Some((byte as u8, score)),
            }
        }

        let mut end_score = 0.0f32;
        if pattern_max > 0.0 {
            end_score += w_pattern * end_pattern / pattern_max;
        }
        if edge_max > 0.0 {
            end_score += w_edge * end_edge / edge_max;
        }

        match best {
            None => {
                if end_score > 0.0 {
                    (Selection::End, 1.0, StepContribution::default())
                } else {
                    (Selection::NoSelection, 0.0, StepContribution::default())
                }
            }
            Some((byte, score)) => {
                if end_score > score {
                    let confidence = (end_score - score) / (end_score + 1.0e-6);
                    return (Selection::End, confidence, StepContribution::default());
                }
                let runner_up = second.max(end_score);
                let confidence = (score - runner_up) / (score + 1.0e-6);

                let symbol = byte as SymbolId;
                let record = StepContribution {
                    position,
                    patterns: pattern_contribs
                        .into_iter()
                        .filter(|(s, _)| *s == symbol)
                        .map(|(_, c)| c)
                        .collect(),
                    edges: edge_contribs
                        .into_iter()
                        .filter(|(s, _)| *s == symbol)
                        .map(|(_, c)| c)
                        .collect(),
                    total: score,
                };
                (Selection::Node(byte), confidence, record)
            }
        }
    }

    /// Memory coverage of the current input, mapped to an attenuation on
    /// pattern and edge evidence when below the adaptive novelty threshold.
    fn novelty_multiplier(&self) -> f32 {
        let threshold = 0.3 + 0.2 * (1.0 - self.state.error_rate);
        if self.memory_strength >= threshold {
            1.0
        } else {
            0.2 + 0.8 * self.memory_strength
        }
    }
}

fn max_of(values: &[f32]) -> f32 {
    values.iter().fold(0.0f32, |m, &v| m.max(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ByteGraph;
    use crate::pattern::{Pattern, CONTEXT_LEN};

    #[test]
    fn test_first_emission_prefers_input_head() {
        let mut graph = ByteGraph::new();
        graph.input = b"cat".to_vec();
        graph.memory_strength = 1.0;
        for &b in b"cat" {
            graph.nodes.activate(b, 1.0, 0);
        }
        graph.edges.create_or_strengthen(b'c', b'a' as SymbolId, 0.1, None);
        graph.edges.create_or_strengthen(b'a', b't' as SymbolId, 0.1, None);

        let (selection, confidence, _) = graph.select_next();
        assert_eq!(selection, Selection::Node(b'c'));
        assert!(confidence > 0.0);
    }

    #[test]
    fn test_continuation_follows_input_position() {
        let mut graph = ByteGraph::new();
        graph.input = b"cat".to_vec();
        graph.output = b"c".to_vec();
        graph.memory_strength = 1.0;
        for &b in b"cat" {
            graph.nodes.activate(b, 0.5, 0);
        }

        let (selection, _, _) = graph.select_next();
        assert_eq!(selection, Selection::Node(b'a'));
    }

    #[test]
    fn test_pattern_prediction_drives_extension() {
        let mut graph = ByteGraph::new();
        graph.input = b"cat".to_vec();
        graph.output = b"cat".to_vec();
        graph.memory_strength = 1.0;
        graph.state.error_rate = 0.05;
        for &b in b"cat" {
            graph.nodes.activate(b, 0.1, 0);
        }

        let mut p = Pattern::new(&[b'a' as SymbolId, b't' as SymbolId], 0.9, 0, [0.0; CONTEXT_LEN]);
        p.upsert_prediction(b's' as SymbolId, 0.9, 0.9);
        p.activation = 0.8;
        p.prediction_attempts = 20;
        p.prediction_successes = 18;
        let id = graph.patterns.insert(p);
        graph.patterns.index_prediction(id, b's' as SymbolId);

        let (selection, _, record) = graph.select_next();
        assert_eq!(selection, Selection::Node(b's'));
        assert!(!record.patterns.is_empty());
        assert_eq!(record.patterns[0].pattern, id);
        assert_eq!(record.position, 3);
    }

    #[test]
    fn test_end_marker_wins_after_learned_tail() {
        let mut graph = ByteGraph::new();
        graph.input = b"cat".to_vec();
        graph.output = b"cats".to_vec();
        graph.memory_strength = 1.0;
        graph.state.error_rate = 0.05;

        // Learned END edge out of the emitted tail.
        graph.nodes.activate(b's', 0.2, 0);
        for _ in 0..20 {
            graph.edges.create_or_strengthen(b's', END_MARKER, 0.1, None);
            graph.edges.record_success(b's', END_MARKER);
        }

        let (selection, confidence, _) = graph.select_next();
        assert_eq!(selection, Selection::End);
        assert!(confidence > 0.0);
    }

    #[test]
    fn test_no_selection_on_dead_graph() {
        let mut graph = ByteGraph::new();
        graph.input = Vec::new();
        let (selection, confidence, _) = graph.select_next();
        assert_eq!(selection, Selection::NoSelection);
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn test_novelty_multiplier_attenuates_unseen_input() {
        let mut graph = ByteGraph::new();
        graph.state.error_rate = 0.0;
        graph.memory_strength = 0.2;
        assert!(graph.novelty_multiplier() < 1.0);
        graph.memory_strength = 0.9;
        assert_eq!(graph.novelty_multiplier(), 1.0);
    }
}

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

//! Learner v1.0 - feedback, detection, and parameter adaptation
//!
//! Runs once per episode after the emit loop. Training episodes get the
//! supervised pass: per-position credit assignment against the recorded
//! contributions, target-structure teaching (sequential pairs, end marker,
//! tail patterns), and micro-network backprop. Every episode gets the
//! self-supervised passes, pattern detection over the input history, the
//! learned-parameter updates, and pruning.
//!
//! `apply_error_feedback` is the universal negative signal: it weakens
//! exactly the edges and pattern predictions recorded as contributors to
//! the last output.

use std::collections::BTreeMap;

use tracing::debug;

use crate::graph::ByteGraph;
use crate::matcher::MatchQuery;
use crate::pattern::Pattern;
use crate::symbols::{PatternId, SymbolId, END_MARKER, PATTERN_NONE, WILDCARD};

/// Hard ceiling on arena growth from detection.
const MAX_PATTERNS: usize = 4096;
/// Longest prefix considered by positional detection.
const MAX_POSITIONAL: usize = 16;

impl ByteGraph {
    /// Post-episode learning pass. Detection runs first so fresh patterns
    /// are taught by the same episode's supervised pass.
    pub(crate) fn learn_episode(&mut self, target: Option<&[u8]>) {
        self.detect_sequential_patterns();
        self.detect_wildcard_patterns();
        self.detect_positional_patterns();

        if let Some(t) = target {
            if !t.is_empty() {
                self.supervised_feedback(t);
            }
        }
        self.self_supervised(target);
        self.update_learned_parameters(target);
        self.prune_patterns();
        self.normalize_chain_depths();
    }

    /// Re-derive every chain depth as the walk length to the root, cutting
    /// parent cycles. Keeps `chain_depth == parent.chain_depth + 1` exact
    /// after reparenting moved an ancestor.
    fn normalize_chain_depths(&mut self) {
        let ids: Vec<PatternId> = self.patterns.ids().collect();
        for id in ids {
            let mut depth = 0u32;
            let mut current = id;
            let mut cycle = false;
            loop {
                let parent = match self.patterns.get(current) {
                    Some(p) => p.parent_pattern_id,
                    None => break,
                };
                if parent == PATTERN_NONE {
                    break;
                }
                depth += 1;
                if depth > 64 || parent == id {
                    cycle = true;
                    break;
                }
                current = parent;
            }
            let p = self.patterns.get_mut(id).unwrap();
            if cycle {
                p.parent_pattern_id = PATTERN_NONE;
                p.chain_depth = 0;
            } else {
                p.chain_depth = depth;
            }
        }
    }

    /// Universal negative signal without a target. Weakens the recorded
    /// contributors of the last episode's output and raises the error rate.
    pub fn apply_error_feedback(&mut self, magnitude: f32) {
        let m = magnitude.clamp(0.0, 1.0);
        if m == 0.0 {
            return;
        }
        let prediction_factor = 1.0 - 0.3 * m;
        let rule_factor = 1.0 - 0.2 * m;

        let records = self.contributions.clone();
        for record in &records {
            for pc in &record.patterns {
                if let Some(p) = self.patterns.get_mut(pc.pattern) {
                    if let Some(slot) = p.prediction_slot(pc.prediction) {
                        p.prediction_weights[slot] *= prediction_factor;
                    }
                    p.dynamic_importance *= prediction_factor;
                    p.accumulated_meaning *= prediction_factor;
                    p.rule_confidence *= rule_factor;
                    for rule in p.rules.iter_mut() {
                        rule.strength *= rule_factor;
                    }
                }
            }
            for ec in &record.edges {
                self.edges.weaken(ec.from, ec.to, prediction_factor);
            }
        }

        let error_rate = self.state.error_rate;
        self.state.error_rate = error_rate + (1.0 - error_rate) * 0.3 * m;
        debug!(magnitude = m, error_rate = self.state.error_rate, "error feedback applied");
    }

    /// Generalization pass at injection: wildcard patterns that match the
    /// new input materialize their confident predictions as edges from the
    /// last input symbol.
    pub(crate) fn connect_similar_patterns(&mut self) {
        let last = match self.input.last() {
            Some(&b) => b,
            None => return,
        };
        let learning_rate = self.state.learning_rate;
        let mut materialize: Vec<(PatternId, SymbolId)> = Vec::new();

        for id in self.patterns.ids().collect::<Vec<_>>() {
            let query = MatchQuery {
                nodes: &self.nodes,
                ambient: &self.context,
                port: self.input_port,
            };
            let matched = {
                let p = self.patterns.get(id).unwrap();
                p.is_alive() && p.wildcard_count() > 0 && query.best_match(p, &self.input).is_some()
            };
            if !matched {
                continue;
            }
            {
                let p = self.patterns.get(id).unwrap();
                for (&symbol, &weight) in p.predicted_nodes.iter().zip(p.prediction_weights.iter())
                {
                    if weight >= 0.3 && (symbol as usize) < 256 && symbol != last as SymbolId {
                        materialize.push((id, symbol));
                    }
                }
            }
            self.patterns.get_mut(id).unwrap().prediction_attempts += 1;
        }

        for (_, symbol) in materialize {
            self.edges
                .create_or_strengthen(last, symbol, learning_rate, None);
            self.edges.mark_pattern_edge(last, symbol);
        }
    }

    /// Supervised feedback against the target, position by position.
    fn supervised_feedback(&mut self, target: &[u8]) {
        let learning_rate = self.state.learning_rate;
        let mut matches = 0usize;

        for (i, &expected) in target.iter().enumerate() {
            let emitted = self.output.get(i).copied();
            if emitted == Some(expected) {
                matches += 1;
                self.reward_position(i, expected, learning_rate);
                if i > 0 {
                    let prev = self.output[i - 1];
                    self.edges
                        .create_or_strengthen(prev, expected as SymbolId, learning_rate, None);
                    self.edges.record_success(prev, expected as SymbolId);
                }
            } else if emitted.is_some() {
                self.punish_position(i, expected, learning_rate);
            }
            self.teach_position(target, i, learning_rate);
        }

        self.teach_target_structure(target, learning_rate);

        let accuracy = matches as f32 / target.len() as f32;
        self.state.observe_accuracy(accuracy);
        self.state.observe_target_ratio(self.input.len(), target.len());

        // Micro-network backprop for patterns that fired this episode.
        let error = accuracy - 0.5;
        let ids: Vec<PatternId> = self
            .patterns
            .iter()
            .filter(|(_, p)| p.is_alive() && p.has_fired)
            .map(|(id, _)| id)
            .collect();
        for id in ids {
            let nodes = &self.nodes;
            let p = self.patterns.get_mut(id).unwrap();
            p.adjust_micro_net(nodes, error, learning_rate);
        }
    }

    /// Credit the recorded contributors of a correctly emitted position.
    fn reward_position(&mut self, position: usize, symbol: u8, learning_rate: f32) {
        let record = match self.contributions.get(position) {
            Some(r) => r.clone(),
            None => return,
        };
        let total: f32 = record
            .patterns
            .iter()
            .map(|c| c.amount)
            .chain(record.edges.iter().map(|c| c.amount))
            .sum::<f32>()
            .max(1.0e-6);

        for pc in &record.patterns {
            if pc.prediction != symbol as SymbolId {
                continue;
            }
            if let Some(p) = self.patterns.get_mut(pc.pattern) {
                p.prediction_successes += 1;
                p.prediction_attempts += 1;
                let share = pc.amount / total;
                p.upsert_prediction(symbol as SymbolId, learning_rate * share * 0.5, 0.3);
                p.rule_confidence = (p.rule_confidence + 0.05).min(1.0);
                for rule in p.rules.iter_mut() {
                    rule.strength = (rule.strength + 0.02).min(1.0);
                }
                p.rule_successes += 1;
                p.rule_attempts += 1;
            }
        }
        for ec in &record.edges {
            if ec.to == symbol as SymbolId {
                self.edges.record_success(ec.from, ec.to);
            }
        }
    }

    /// Weaken the contributors of a mismatched position and steer their
    /// prediction tables toward the correct symbol.
    fn punish_position(&mut self, position: usize, expected: u8, learning_rate: f32) {
        let wrong = match self.output.get(position) {
            Some(&b) => b as SymbolId,
            None => return,
        };
        let record = match self.contributions.get(position) {
            Some(r) => r.clone(),
            None => return,
        };
        let total: f32 = record
            .patterns
            .iter()
            .map(|c| c.amount)
            .sum::<f32>()
            .max(1.0e-6);

        for pc in &record.patterns {
            if let Some(p) = self.patterns.get_mut(pc.pattern) {
                p.prediction_attempts += 1;
                let share = pc.amount / total;
                p.weaken_prediction(wrong, learning_rate * share * 0.3);
                p.dynamic_importance *= 0.9;
                p.accumulated_meaning *= 0.9;
                p.rule_confidence *= 0.95;
                for rule in p.rules.iter_mut() {
                    rule.strength *= 0.95;
                }
                p.rule_attempts += 1;
                p.upsert_prediction(expected as SymbolId, learning_rate * 0.3, 0.2);
            }
            self.patterns.index_prediction(pc.pattern, expected as SymbolId);
        }
    }

    /// Teach patterns whose match ends at `position` to predict the target
    /// symbol there, whether or not the engine emitted anything.
    fn teach_position(&mut self, target: &[u8], position: usize, learning_rate: f32) {
        if position == 0 {
            return;
        }
        let prefix = &target[..position];
        let expected = target[position] as SymbolId;
        let ids: Vec<PatternId> = self.patterns.ids().collect();
        for id in ids {
            let query = MatchQuery {
                nodes: &self.nodes,
                ambient: &self.context,
                port: self.input_port,
            };
            let matched = {
                let p = self.patterns.get(id).unwrap();
                p.is_alive() && query.matches_suffix(p, prefix)
            };
            if !matched {
                continue;
            }
            let p = self.patterns.get_mut(id).unwrap();
            p.upsert_prediction(expected, learning_rate * 0.5, 0.3);
            self.patterns.index_prediction(id, expected);
        }
    }

    /// Sequential structure of the target: adjacent pairs as edges, the end
    /// marker after the final symbol, and END predictions on patterns that
    /// match the target's tail (creating a tail pattern if none does).
    fn teach_target_structure(&mut self, target: &[u8], learning_rate: f32) {
        for w in target.windows(2) {
            self.edges
                .create_or_strengthen(w[0], w[1] as SymbolId, learning_rate, None);
            self.edges.record_success(w[0], w[1] as SymbolId);
        }

        let last = *target.last().unwrap();
        self.edges
            .create_or_strengthen(last, END_MARKER, learning_rate, None);
        self.edges.record_success(last, END_MARKER);

        let mut tail_covered = false;
        let ids: Vec<PatternId> = self.patterns.ids().collect();
        for id in ids {
            let query = MatchQuery {
                nodes: &self.nodes,
                ambient: &self.context,
                port: self.input_port,
            };
            let matched = {
                let p = self.patterns.get(id).unwrap();
                p.is_alive() && query.matches_suffix(p, target)
            };
            if !matched {
                continue;
            }
            tail_covered = true;
            let p = self.patterns.get_mut(id).unwrap();
            p.upsert_prediction(END_MARKER, learning_rate * 0.5, 0.25);
            p.prediction_successes += 1;
            p.prediction_attempts += 1;
            self.patterns.index_prediction(id, END_MARKER);
        }

        if !tail_covered && target.len() >= 2 && self.patterns.len() < MAX_PATTERNS {
            let seq = [
                target[target.len() - 2] as SymbolId,
                target[target.len() - 1] as SymbolId,
            ];
            let port = self.port_of(target[target.len() - 2]);
            let mut pattern = Pattern::new(&seq, 0.5, port, self.context);
            pattern.upsert_prediction(END_MARKER, 0.0, 0.25);
            pattern.prediction_successes = 1;
            pattern.prediction_attempts = 1;
            let id = self.patterns.insert(pattern);
            debug!(pattern = id, "tail pattern created for end marker");
        }
    }

    /// Self-supervised reinforcement that runs with or without a target.
    fn self_supervised(&mut self, target: Option<&[u8]>) {
        let learning_rate = self.state.learning_rate;

        // Sequential edges from the input are always evidence.
        let input = self.input.clone();
        for w in input.windows(2) {
            self.edges
                .create_or_strengthen(w[0], w[1] as SymbolId, learning_rate, None);
        }

        // The output only reinforces itself in generation mode; in training
        // the target already did.
        if target.is_none() {
            let output = self.output.clone();
            for w in output.windows(2) {
                self.edges
                    .create_or_strengthen(w[0], w[1] as SymbolId, learning_rate, None);
            }
        }

        // Hierarchical validation: a parent that predicts nodes appearing
        // inside the child corroborates the composition.
        let ids: Vec<PatternId> = self.patterns.ids().collect();
        for id in ids.iter().copied() {
            let parent_id = match self.patterns.get(id) {
                Some(p) if p.is_alive() && p.parent_pattern_id != PATTERN_NONE => {
                    p.parent_pattern_id
                }
                _ => continue,
            };
            let validated = match (self.patterns.get(id), self.patterns.get(parent_id)) {
                (Some(child), Some(parent)) if parent.is_alive() => parent
                    .predicted_nodes
                    .iter()
                    .any(|&s| child.sequence.contains(&s)),
                _ => false,
            };
            if validated {
                let p = self.patterns.get_mut(id).unwrap();
                p.co_occurrence_strength = (p.co_occurrence_strength + 0.05).min(1.0);
            }
        }

        // Association learning between patterns that fired together.
        let fired: Vec<PatternId> = self
            .patterns
            .iter()
            .filter(|(_, p)| p.is_alive() && p.has_fired)
            .map(|(id, _)| id)
            .collect();
        for i in 0..fired.len() {
            for j in (i + 1)..fired.len() {
                self.strengthen_association(fired[i], fired[j]);
                self.strengthen_association(fired[j], fired[i]);
            }
        }

        // Self-consistency: verify node predictions against what the data
        // actually contained.
        let observed: Vec<u8> = match target {
            Some(t) => t.to_vec(),
            None => self.output.clone(),
        };
        if observed.len() >= 2 {
            for id in ids {
                let query = MatchQuery {
                    nodes: &self.nodes,
                    ambient: &self.context,
                    port: self.input_port,
                };
                let next_symbol = {
                    let p = self.patterns.get(id).unwrap();
                    if !p.is_alive() || !p.has_fired {
                        None
                    } else {
                        (0..observed.len().saturating_sub(p.len()))
                            .find(|&pos| query.matches_at(p, &observed, pos))
                            .map(|pos| observed[pos + p.len()] as SymbolId)
                    }
                };
                let next = match next_symbol {
                    Some(n) => n,
                    None => continue,
                };
                let p = self.patterns.get_mut(id).unwrap();
                let len = p.predicted_nodes.len();
                for slot in 0..len {
                    let symbol = p.predicted_nodes[slot];
                    if symbol >= 256 {
                        continue; // END is verified by tail teaching
                    }
                    if symbol == next {
                        p.prediction_weights[slot] =
                            (p.prediction_weights[slot] + 0.02).min(1.0);
                    } else {
                        p.prediction_weights[slot] =
                            (p.prediction_weights[slot] - 0.01).max(0.0);
                    }
                }
            }
        }
    }

    fn strengthen_association(&mut self, from: PatternId, to: PatternId) {
        if let Some(p) = self.patterns.get_mut(from) {
            match p.associated_patterns.iter().position(|&a| a == to) {
                Some(i) => {
                    p.association_strengths[i] = (p.association_strengths[i] + 0.05).min(1.0);
                }
                None => {
                    p.associated_patterns.push(to);
                    p.association_strengths.push(0.1);
                }
            }
            p.co_occurrence_strength = (p.co_occurrence_strength + 0.02).min(1.0);
        }
    }

    /// Per-pattern learned scalars follow episode outcomes within their
    /// documented ranges.
    fn update_learned_parameters(&mut self, target: Option<&[u8]>) {
        let observed: Vec<u8> = match target {
            Some(t) => t.to_vec(),
            None => self.output.clone(),
        };
        let ids: Vec<PatternId> = self
            .patterns
            .iter()
            .filter(|(_, p)| p.is_alive() && p.has_fired)
            .map(|(id, _)| id)
            .collect();

        for id in ids {
            let p = self.patterns.get_mut(id).unwrap();
            let success = p
                .predicted_nodes
                .iter()
                .any(|&s| (s as usize) < 256 && observed.contains(&(s as u8)));

            let t = &mut p.transfer;
            if success {
                t.rate = (t.rate + 0.02).min(0.9);
                t.decay = (t.decay + 0.005).min(0.99);
                t.threshold = (t.threshold - 0.005).max(0.01);
                t.boost = (t.boost + 0.02).min(2.0);
                t.success_count += 1;
            } else {
                t.rate = (t.rate - 0.02).max(0.1);
                t.decay = (t.decay - 0.005).max(0.8);
                t.threshold = (t.threshold + 0.005).min(0.3);
                t.boost = (t.boost - 0.02).max(0.5);
            }
            t.use_count += 1;

            let high_success = p.success_rate() > 0.5;
            let s = &mut p.selection;
            if high_success {
                s.pattern_factor = (s.pattern_factor + 0.01).min(0.4);
                s.weight_factor = (s.weight_factor - 0.005).max(0.2);
            } else {
                s.activation_factor = (s.activation_factor + 0.01).min(0.5);
                s.pattern_factor = (s.pattern_factor - 0.005).max(0.05);
            }
            s.use_count += 1;
            if success {
                s.success_count += 1;
            }
        }
    }

    /// Repeated-bigram detection over the input history. The creation
    /// threshold tightens as the error rate falls.
    fn detect_sequential_patterns(&mut self) {
        if self.patterns.len() >= MAX_PATTERNS {
            return;
        }
        let threshold = (2.0 * (1.0 - self.state.error_rate)).clamp(1.5, 3.0);

        let mut counts: BTreeMap<(u8, u8), u32> = BTreeMap::new();
        for entry in &self.input_history {
            for w in entry.windows(2) {
                *counts.entry((w[0], w[1])).or_insert(0) += 1;
            }
        }

        for (&(a, b), &count) in &counts {
            if (count as f32) < threshold {
                continue;
            }
            let seq = [a as SymbolId, b as SymbolId];
            if self.patterns.find_by_sequence(&seq).is_some() {
                continue;
            }
            if self.patterns.len() >= MAX_PATTERNS {
                break;
            }
            let port = self.port_of(a);
            let mut pattern = Pattern::new(&seq, 0.5, port, self.context);

            // Hierarchical composition: chain onto a pattern whose endpoint
            // connects to this one's start.
            let parent = self
                .patterns
                .iter()
                .find(|(_, q)| {
                    q.is_alive()
                        && q.sequence
                            .iter()
                            .rev()
                            .find(|&&s| s != WILDCARD)
                            .map(|&s| s == a as SymbolId)
                            .unwrap_or(false)
                })
                .map(|(id, q)| (id, q.chain_depth));
            if let Some((pid, depth)) = parent {
                pattern.parent_pattern_id = pid;
                pattern.chain_depth = depth + 1;
            }

            let id = self.patterns.insert(pattern);
            debug!(pattern = id, from = a, to = b, count, "sequential pattern created");
        }
    }

    /// Wildcard generalization: the same two-byte suffix seen under several
    /// first symbols becomes a wildcard-headed trigram pattern.
    fn detect_wildcard_patterns(&mut self) {
        if self.patterns.len() >= MAX_PATTERNS {
            return;
        }
        let mut heads: BTreeMap<(u8, u8), Vec<u8>> = BTreeMap::new();
        for entry in &self.input_history {
            for w in entry.windows(3) {
                let slot = heads.entry((w[1], w[2])).or_default();
                if !slot.contains(&w[0]) {
                    slot.push(w[0]);
                }
            }
        }

        for (&(b, c), variants) in &heads {
            if variants.len() < 2 {
                continue;
            }
            let seq = [WILDCARD, b as SymbolId, c as SymbolId];
            if self.patterns.find_by_sequence(&seq).is_some() {
                continue;
            }
            if self.patterns.len() >= MAX_PATTERNS {
                break;
            }
            let port = self.port_of(b);
            let pattern = Pattern::new(&seq, 0.5, port, self.context);
            let id = self.patterns.insert(pattern);
            debug!(pattern = id, suffix = ?(b as char, c as char), "wildcard pattern created");
        }
    }

    /// Positional regularities: a (position, value) pair recurring across
    /// the input history becomes an anchored mostly-wildcard pattern.
    fn detect_positional_patterns(&mut self) {
        if self.patterns.len() >= MAX_PATTERNS {
            return;
        }
        let history_len = self.input_history.len().max(1) as f32;

        for position in 0..MAX_POSITIONAL {
            let mut counts: BTreeMap<u8, u32> = BTreeMap::new();
            for entry in &self.input_history {
                if let Some(&value) = entry.get(position) {
                    *counts.entry(value).or_insert(0) += 1;
                }
            }
            for (&value, &count) in &counts {
                if count < 2 {
                    continue;
                }
                let mut seq: Vec<SymbolId> = vec![WILDCARD; position];
                seq.push(value as SymbolId);
                let strength = 0.3 + 0.4 * (count as f32 / history_len).min(1.0);

                if let Some(id) = self.patterns.find_by_sequence(&seq) {
                    let p = self.patterns.get_mut(id).unwrap();
                    p.strength = p.strength.max(strength);
                    continue;
                }
                if self.patterns.len() >= MAX_PATTERNS {
                    return;
                }
                let port = self.port_of(value);
                let pattern = Pattern::new(&seq, strength, port, self.context);
                let id = self.patterns.insert(pattern);
                debug!(pattern = id, position, value, "positional pattern created");
            }
        }
    }

    /// Drop patterns whose utility stayed below chance long after creation.
    fn prune_patterns(&mut self) {
        let alive = self.patterns.alive_count().max(1);
        let floor = 0.01 / alive as f32;
        let doomed: Vec<PatternId> = self
            .patterns
            .iter()
            .filter(|(_, p)| {
                p.is_alive()
                    && p.strength < floor
                    && p.prediction_attempts > 50
                    && p.success_rate() < 0.2
            })
            .map(|(id, _)| id)
            .collect();
        for id in doomed {
            self.patterns.prune(id);
            debug!(pattern = id, "pattern pruned");
        }
    }

    /// Port tag for a pattern derived from a member node; falls back to the
    /// current input port for bytes never seen before.
    fn port_of(&self, byte: u8) -> u32 {
        let node = self.nodes.get(byte);
        if node.exists {
            node.source_port
        } else {
            self.input_port
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::ByteGraph;
    use crate::symbols::{SymbolId, END_MARKER, WILDCARD};

    fn train(graph: &mut ByteGraph, input: &[u8], target: &[u8], reps: usize) {
        for _ in 0..reps {
            graph.run_episode(input, Some(target)).unwrap();
        }
    }

    #[test]
    fn test_sequential_pattern_detection() {
        let mut graph = ByteGraph::new();
        train(&mut graph, b"cat", b"cat", 5);
        let found = graph
            .patterns()
            .iter()
            .any(|(_, p)| p.sequence.as_slice() == [b'a' as SymbolId, b't' as SymbolId]);
        assert!(found, "repeated bigram must become a pattern");
    }

    #[test]
    fn test_wildcard_pattern_detection() {
        let mut graph = ByteGraph::new();
        train(&mut graph, b"cat", b"cat", 3);
        train(&mut graph, b"bat", b"bat", 3);
        let found = graph.patterns().iter().any(|(_, p)| {
            p.sequence.as_slice() == [WILDCARD, b'a' as SymbolId, b't' as SymbolId]
        });
        assert!(found, "shared suffix with two heads must generalize");
    }

    #[test]
    fn test_target_structure_teaching() {
        let mut graph = ByteGraph::new();
        train(&mut graph, b"cat", b"cats", 3);
        // Sequential pair and end-marker edges exist and carry successes.
        assert!(graph.edges().has_active(b't', b's' as SymbolId));
        assert!(graph.edges().has_active(b's', END_MARKER));
        let end_edge = graph.edges().get(b's', END_MARKER).unwrap();
        assert!(end_edge.success_count > 0);
        assert!(end_edge.success_count <= end_edge.use_count);
    }

    #[test]
    fn test_error_rate_falls_with_successful_training() {
        let mut graph = ByteGraph::new();
        let before = graph.error_rate();
        train(&mut graph, b"cat", b"cat", 20);
        assert!(graph.error_rate() < before);
    }

    #[test]
    fn test_error_feedback_weakens_contributors() {
        let mut graph = ByteGraph::new();
        train(&mut graph, b"cat", b"cats", 30);
        graph.run_episode(b"cat", None).unwrap();
        let weight_before = graph.edge_weight(b't', b's' as SymbolId);
        let error_before = graph.error_rate();

        graph.apply_error_feedback(1.0);

        assert!(graph.error_rate() > error_before);
        let weight_after = graph.edge_weight(b't', b's' as SymbolId);
        if weight_before > 0.0 {
            assert!(weight_after < weight_before);
        }
    }

    #[test]
    fn test_positional_pattern_detection() {
        let mut graph = ByteGraph::new();
        train(&mut graph, b"cat", b"cat", 3);
        // Position 1 = 'a' recurs, yielding an anchored wildcard pattern.
        let found = graph
            .patterns()
            .iter()
            .any(|(_, p)| p.sequence.as_slice() == [WILDCARD, b'a' as SymbolId]);
        assert!(found);
    }
}

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

//! PatternPropagator v1.0 - pattern-level activation spreading
//!
//! Runs once per step, before edge propagation. Patterns are matched
//! against the tail of the output buffer (preferred) or the best position
//! in the input buffer, activated through their micro-network, then spread
//! activation into predicted nodes and predicted patterns, feed their
//! hierarchy, apply associations and rules, and finally decay.
//!
//! Firing memoization (`fired_predictions`) keeps one prediction from being
//! spent repeatedly inside a single generation burst; it resets when enough
//! steps pass or when the output has grown since the last fire.

use crate::graph::ByteGraph;
use crate::matcher::MatchQuery;
use crate::symbols::{PatternId, PATTERN_NONE};

/// Steps after which firing memoization expires.
const FIRE_MEMO_STEPS: u64 = 5;
/// Steps after which an individual prediction may re-fire.
const PREDICTION_REFIRE_STEPS: u64 = 3;
/// Minimum transfer worth delivering to a node.
const MIN_TRANSFER: f32 = 0.01;

impl ByteGraph {
    /// One pattern-propagation step over the whole arena.
    pub(crate) fn propagate_patterns(&mut self) {
        let step = self.state.step;
        let error_rate = self.state.error_rate;
        let meaning_rate = self.state.meaning_accumulation_rate;
        let competition_pressure = self.state.competition_pressure;

        let n = self.patterns.len() as PatternId;

        // Match + forward pass, one pattern at a time.
        for id in 0..n {
            // Reset firing memoization when stale or when output has grown
            // since the last fire.
            {
                let output_len = self.output.len();
                let p = self.patterns.get_mut(id).unwrap();
                if !p.is_alive() {
                    continue;
                }
                if p.has_fired
                    && (step.saturating_sub(p.last_fired_step) > FIRE_MEMO_STEPS
                        || output_len > p.last_fired_output_len)
                {
                    p.fired_predictions = 0;
                }
            }

            let query = MatchQuery {
                nodes: &self.nodes,
                ambient: &self.context,
                port: self.input_port,
            };

            // Prefer the output tail; fall back to the best input position.
            let (matched, context_boost) = {
                let p = self.patterns.get(id).unwrap();
                if !self.output.is_empty() && query.matches_suffix(p, &self.output) {
                    (true, 1.0)
                } else if query.best_match(p, &self.input).is_some() {
                    let boost = if p.len() < self.input.len() {
                        1.0 + 0.5 * (p.len() as f32 / self.input.len() as f32)
                    } else {
                        1.0
                    };
                    (true, boost)
                } else {
                    (false, 1.0)
                }
            };

            if matched {
                let nodes = &self.nodes;
                let edges = &self.edges;
                let p = self.patterns.get_mut(id).unwrap();
                let activation = p.forward(
                    nodes,
                    |symbol| {
                        // Seed from the member node's outgoing-edge average,
                        // centered around zero.
                        if (symbol as usize) < 256 {
                            let out = edges.outgoing(symbol as u8);
                            if out.is_empty() {
                                0.0
                            } else {
                                let avg: f32 = out.iter().map(|e| e.weight).sum::<f32>()
                                    / out.len() as f32;
                                (avg - 0.5).clamp(-1.0, 1.0)
                            }
                        } else {
                            0.0
                        }
                    },
                    context_boost,
                );
                p.activation = p.activation.max(activation);
                p.guard_activation();
            }
        }

        self.apply_local_competition();
        self.spread_node_predictions(step);
        self.spread_pattern_predictions(error_rate, meaning_rate);
        self.spread_pattern_edges();
        self.update_importance_and_rules();
        self.apply_associations();
        self.apply_hierarchy_feedback(meaning_rate);
        self.evaluate_rules();
        self.apply_suppression();

        // Decay, guard, and rebuild the active set.
        let decay = 0.95 + 0.03 * (1.0 - competition_pressure.clamp(0.0, 1.0));
        let mut active = Vec::new();
        for id in 0..n {
            let p = self.patterns.get_mut(id).unwrap();
            if !p.is_alive() {
                p.activation = 0.0;
                continue;
            }
            p.activation *= decay;
            p.guard_activation();
            if p.activation > p.threshold {
                active.push(id);
            }
        }
        self.patterns.active = active;
    }

    /// Local competition: patterns predicting the same nodes push each
    /// other's thresholds up; success pulls a pattern's own threshold down
    /// and nudges strength toward the observed success rate.
    fn apply_local_competition(&mut self) {
        let n = self.patterns.len() as PatternId;
        for id in 0..n {
            let (is_live, predicted) = {
                let p = self.patterns.get(id).unwrap();
                (p.is_alive() && p.activation > 0.0, p.predicted_nodes.clone())
            };
            if !is_live {
                continue;
            }

            let mut competition = 0.0f32;
            let mut competitors = 0u32;
            for &symbol in &predicted {
                for &other in self.patterns.predicting(symbol) {
                    if other == id {
                        continue;
                    }
                    if let Some(o) = self.patterns.get(other) {
                        if o.is_alive() && o.activation > 0.0 {
                            competition += o.activation;
                            competitors += 1;
                        }
                    }
                }
            }
            let avg_competition = if competitors > 0 {
                competition / competitors as f32
            } else {
                0.0
            };
            let competition_adj = 0.2 * (avg_competition / (avg_competition + 1.0));

            let p = self.patterns.get_mut(id).unwrap();
            let success = p.success_rate();
            p.threshold = (0.3 + competition_adj - 0.2 * success).clamp(0.1, 0.9);
            p.strength = (p.strength + 0.01 * (success - p.strength)).clamp(0.0, 1.0);
        }
    }

    /// Spread activation from patterns above threshold into their predicted
    /// nodes, honoring the fired-predictions bitmask.
    fn spread_node_predictions(&mut self, step: u64) {
        let n = self.patterns.len() as PatternId;
        let output_len = self.output.len();
        for id in 0..n {
            let mut transfers: Vec<(u8, f32, u32)> = Vec::new();
            let context_byte;
            {
                let p = self.patterns.get(id).unwrap();
                if !p.is_alive() || p.activation <= p.threshold {
                    continue;
                }
                context_byte = p
                    .sequence
                    .iter()
                    .rev()
                    .find(|&&s| (s as usize) < 256)
                    .map(|&s| s as u8)
                    .unwrap_or(0);
                let success_factor = 1.0 + 2.0 * (p.success_rate() - 0.5);
                for (slot, (&symbol, &weight)) in p
                    .predicted_nodes
                    .iter()
                    .zip(p.prediction_weights.iter())
                    .enumerate()
                {
                    if (symbol as usize) >= 256 {
                        continue; // END competes in selection, not here
                    }
                    let bit = 1u32 << (slot.min(31));
                    let spent = p.fired_predictions & bit != 0;
                    if spent && step.saturating_sub(p.last_fired_step) <= PREDICTION_REFIRE_STEPS {
                        continue;
                    }
                    let transfer = p.activation * weight * p.strength * success_factor;
                    if transfer > MIN_TRANSFER {
                        transfers.push((symbol as u8, transfer, bit));
                    }
                }
            }
            if transfers.is_empty() {
                continue;
            }
            for &(byte, transfer, _) in &transfers {
                self.nodes.receive(byte, transfer, context_byte);
            }
            let p = self.patterns.get_mut(id).unwrap();
            for &(_, _, bit) in &transfers {
                p.fired_predictions |= bit;
            }
            p.has_fired = true;
            p.last_fired_step = step;
            p.last_fired_output_len = output_len;
        }
    }

    /// Spread into predicted patterns with a meaning multiplier, updating
    /// hierarchy links toward the closest-to-root parent.
    fn spread_pattern_predictions(&mut self, error_rate: f32, meaning_rate: f32) {
        let n = self.patterns.len() as PatternId;
        let mut boosts: Vec<(PatternId, f32, f32)> = Vec::new();
        let mut reparent: Vec<(PatternId, PatternId, u32)> = Vec::new();

        for id in 0..n {
            let p = match self.patterns.get(id) {
                Some(p) if p.is_alive() && p.activation > p.threshold => p,
                _ => continue,
            };
            let own_depth = p.chain_depth;
            let own_act = p.activation;
            for (&target, &weight) in p
                .predicted_patterns
                .iter()
                .zip(p.pattern_prediction_weights.iter())
            {
                let t = match self.patterns.get(target) {
                    Some(t) if t.is_alive() => t,
                    _ => continue,
                };
                let multiplier = t.meaning_boost(error_rate);
                let boost = own_act * weight * 0.5 * multiplier;
                let meaning_gain = meaning_rate * (1.0 + weight) * (1.0 + 0.1 * own_depth as f32);
                boosts.push((target, boost, meaning_gain));

                if t.parent_pattern_id == PATTERN_NONE || own_depth + 1 < t.chain_depth {
                    reparent.push((target, id, own_depth + 1));
                }
            }
        }

        for (target, boost, meaning) in boosts {
            if let Some(t) = self.patterns.get_mut(target) {
                t.activation += boost;
                t.accumulate_meaning(meaning);
                t.guard_activation();
            }
        }
        for (target, parent, depth) in reparent {
            if target == parent {
                continue;
            }
            if let Some(t) = self.patterns.get_mut(target) {
                t.parent_pattern_id = parent;
                t.chain_depth = depth;
            }
        }
    }

    /// Spread through explicit pattern→pattern edges.
    fn spread_pattern_edges(&mut self) {
        let n = self.patterns.len() as PatternId;
        let mut boosts: Vec<(PatternId, f32)> = Vec::new();
        for id in 0..n {
            let act = match self.patterns.get(id) {
                Some(p) if p.is_alive() && p.activation > p.threshold => p.activation,
                _ => continue,
            };
            for edge in self.patterns.pattern_edges(id) {
                boosts.push((edge.to, act * edge.weight * 0.1));
            }
        }
        for (target, boost) in boosts {
            if let Some(t) = self.patterns.get_mut(target) {
                if t.is_alive() {
                    t.activation += boost;
                    t.guard_activation();
                }
            }
        }
    }

    /// Dynamic importance = mean(usage, success, hierarchy, co-occurrence);
    /// rule confidence follows the observed rule success ratio.
    fn update_importance_and_rules(&mut self) {
        let n = self.patterns.len() as PatternId;
        for id in 0..n {
            let p = match self.patterns.get_mut(id) {
                Some(p) if p.is_alive() => p,
                _ => continue,
            };
            let usage = (p.prediction_attempts as f32 / 50.0).min(1.0);
            let success = p.success_rate();
            let hierarchy = ((p.chain_depth as f32) / 5.0
                + if p.parent_pattern_id != PATTERN_NONE { 0.2 } else { 0.0 })
            .min(1.0);
            let co_occurrence = p.co_occurrence_strength.clamp(0.0, 1.0);
            p.dynamic_importance = (usage + success + hierarchy + co_occurrence) / 4.0;

            if p.rule_attempts > 0 {
                p.rule_success_rate = p.rule_successes as f32 / p.rule_attempts as f32;
                p.rule_confidence = p.rule_success_rate.clamp(0.05, 1.0);
            }
        }
    }

    /// Co-activation boost between associated patterns; stronger when their
    /// confidence and hierarchy depth are similar.
    fn apply_associations(&mut self) {
        let n = self.patterns.len() as PatternId;
        let mut boosts: Vec<(PatternId, f32)> = Vec::new();
        for id in 0..n {
            let p = match self.patterns.get(id) {
                Some(p) if p.is_alive() && p.activation > p.threshold => p,
                _ => continue,
            };
            for (&other, &strength) in p
                .associated_patterns
                .iter()
                .zip(p.association_strengths.iter())
            {
                let o = match self.patterns.get(other) {
                    Some(o) if o.is_alive() && o.activation > o.threshold => o,
                    _ => continue,
                };
                let depth_sim = 1.0
                    / (1.0 + (p.chain_depth as f32 - o.chain_depth as f32).abs());
                let conf_sim = 1.0 - (p.rule_confidence - o.rule_confidence).abs();
                let boost = strength * 0.1 * depth_sim * conf_sim.max(0.0);
                boosts.push((other, p.activation * boost));
                boosts.push((id, o.activation * boost));
            }
        }
        for (target, boost) in boosts {
            if let Some(t) = self.patterns.get_mut(target) {
                t.activation += boost;
                t.guard_activation();
            }
        }
    }

    /// Active patterns feed their parents: activation and meaning flow up.
    fn apply_hierarchy_feedback(&mut self, meaning_rate: f32) {
        let n = self.patterns.len() as PatternId;
        let mut feed: Vec<(PatternId, f32)> = Vec::new();
        for id in 0..n {
            let p = match self.patterns.get(id) {
                Some(p) if p.is_alive() && p.activation > p.threshold => p,
                _ => continue,
            };
            if p.parent_pattern_id != PATTERN_NONE {
                feed.push((p.parent_pattern_id, p.activation));
            }
        }
        for (parent, act) in feed {
            if let Some(t) = self.patterns.get_mut(parent) {
                if t.is_alive() {
                    t.activation += 0.1 * act;
                    t.accumulate_meaning(meaning_rate * act);
                    t.guard_activation();
                }
            }
        }
    }

    /// IF-THEN rules: an active condition pattern boosts the rule target.
    fn evaluate_rules(&mut self) {
        let n = self.patterns.len() as PatternId;
        let mut boosts: Vec<(PatternId, f32)> = Vec::new();
        for id in 0..n {
            let p = match self.patterns.get(id) {
                Some(p) if p.is_alive() => p,
                _ => continue,
            };
            let confidence = p.rule_confidence;
            for rule in p.rules.iter() {
                let cond = match self.patterns.get(rule.condition) {
                    Some(c) if c.is_alive() && c.activation > c.threshold => c,
                    _ => continue,
                };
                boosts.push((
                    rule.target,
                    cond.activation * rule.boost * rule.strength * confidence,
                ));
            }
        }
        for (target, boost) in boosts {
            if let Some(t) = self.patterns.get_mut(target) {
                if t.is_alive() {
                    t.activation += boost;
                    t.guard_activation();
                }
            }
        }
    }

    /// Patterns with suppression strength dampen low-success competitors
    /// that predict the same nodes.
    fn apply_suppression(&mut self) {
        let n = self.patterns.len() as PatternId;
        let mut damp: Vec<(PatternId, f32)> = Vec::new();
        for id in 0..n {
            let p = match self.patterns.get(id) {
                Some(p) if p.is_alive() && p.suppression_strength > 0.0 => p,
                _ => continue,
            };
            if p.activation <= p.threshold {
                continue;
            }
            let factor = 1.0 - 0.5 * p.suppression_strength.clamp(0.0, 1.0);
            let predicted = p.predicted_nodes.clone();
            for &symbol in &predicted {
                for &other in self.patterns.predicting(symbol) {
                    if other == id {
                        continue;
                    }
                    if let Some(o) = self.patterns.get(other) {
                        if o.is_alive() && o.success_rate() < 0.3 {
                            damp.push((other, factor));
                        }
                    }
                }
            }
        }
        for (target, factor) in damp {
            if let Some(t) = self.patterns.get_mut(target) {
                t.activation *= factor;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::ByteGraph;
    use crate::pattern::{Pattern, CONTEXT_LEN};
    use crate::symbols::SymbolId;

    fn seq(s: &[u8]) -> Vec<SymbolId> {
        s.iter().map(|&b| b as SymbolId).collect()
    }

    #[test]
    fn test_matched_pattern_activates_and_spreads() {
        let mut graph = ByteGraph::new();
        graph.input = b"cat".to_vec();
        for (i, &b) in b"cat".iter().enumerate() {
            graph.nodes.activate(b, 1.0 - 0.1 * i as f32, 0);
        }

        let mut p = Pattern::new(&seq(b"at"), 0.8, 0, [0.0; CONTEXT_LEN]);
        p.upsert_prediction(b's' as SymbolId, 0.0, 0.9);
        let id = graph.patterns.insert(p);
        graph.patterns.index_prediction(id, b's' as SymbolId);

        graph.state.step = 1;
        graph.propagate_patterns();

        let p = graph.patterns.get(id).unwrap();
        assert!(p.activation > 0.0, "matched pattern must activate");
        assert!(
            graph.nodes.get(b's').activation > 0.0,
            "prediction spreading must reach the predicted node"
        );
        assert!(p.has_fired);
    }

    #[test]
    fn test_fired_prediction_not_respent_immediately() {
        let mut graph = ByteGraph::new();
        graph.input = b"at".to_vec();
        graph.nodes.activate(b'a', 1.0, 0);
        graph.nodes.activate(b't', 1.0, 0);

        let mut p = Pattern::new(&seq(b"at"), 0.8, 0, [0.0; CONTEXT_LEN]);
        p.upsert_prediction(b's' as SymbolId, 0.0, 0.9);
        let id = graph.patterns.insert(p);
        graph.patterns.index_prediction(id, b's' as SymbolId);

        graph.state.step = 1;
        graph.propagate_patterns();
        let first = graph.nodes.get(b's').activation;

        graph.state.step = 2;
        graph.propagate_patterns();
        let second = graph.nodes.get(b's').activation;

        // Second step only decays: the spent prediction may not re-fire yet.
        assert!(second < first * 1.05);
    }

    #[test]
    fn test_unmatched_pattern_stays_inactive() {
        let mut graph = ByteGraph::new();
        graph.input = b"xyz".to_vec();
        let p = Pattern::new(&seq(b"at"), 0.8, 0, [0.0; CONTEXT_LEN]);
        let id = graph.patterns.insert(p);
        graph.state.step = 1;
        graph.propagate_patterns();
        assert_eq!(graph.patterns.get(id).unwrap().activation, 0.0);
    }

    #[test]
    fn test_activation_capped() {
        let mut graph = ByteGraph::new();
        graph.input = b"at".to_vec();
        let mut p = Pattern::new(&seq(b"at"), 1.0, 0, [0.0; CONTEXT_LEN]);
        p.activation = 9.9e5;
        let id = graph.patterns.insert(p);
        graph.state.step = 1;
        graph.propagate_patterns();
        assert!(graph.patterns.get(id).unwrap().activation <= 10.0);
    }
}

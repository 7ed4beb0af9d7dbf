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

//! Pattern v1.0 - bounded symbol sequence with prediction tables
//!
//! A pattern is the engine's unit of learned structure: a short sequence of
//! byte symbols (possibly with wildcards), a micro-network over its member
//! activations, next-symbol and next-pattern prediction tables, hierarchy
//! links, associations, IF-THEN rules, and per-pattern learned transfer and
//! selection scalars. Patterns are arena-allocated; a pruned pattern keeps
//! its slot as an inert zero-activation record so handles stay valid.

use smallvec::SmallVec;

use crate::node::{sigmoid, NodeArray};
use crate::symbols::{PatternId, SymbolId, PATTERN_NONE, WILDCARD};

/// Pattern activation hard cap.
pub const PATTERN_ACTIVATION_CAP: f32 = 10.0;

/// Accumulated meaning hard cap; log-compressed above the soft knee.
pub const MEANING_CAP: f32 = 1000.0;
const MEANING_KNEE: f32 = 100.0;

/// Context vector length (ambient context snapshot).
pub const CONTEXT_LEN: usize = 16;

/// Learned propagation scalars, updated per episode from outcomes.
#[derive(Debug, Clone, Copy)]
pub struct TransferParams {
    pub rate: f32,
    pub decay: f32,
    pub threshold: f32,
    pub boost: f32,
    pub use_count: u32,
    pub success_count: u32,
}

impl Default for TransferParams {
    fn default() -> Self {
        Self {
            rate: 0.5,
            decay: 0.9,
            threshold: 0.1,
            boost: 1.0,
            use_count: 0,
            success_count: 0,
        }
    }
}

/// Learned selection-factor scalars (how this pattern's evidence is mixed).
#[derive(Debug, Clone, Copy)]
pub struct SelectionParams {
    pub weight_factor: f32,
    pub activation_factor: f32,
    pub context_factor: f32,
    pub pattern_factor: f32,
    pub use_count: u32,
    pub success_count: u32,
}

impl Default for SelectionParams {
    fn default() -> Self {
        Self {
            weight_factor: 0.4,
            activation_factor: 0.3,
            context_factor: 0.2,
            pattern_factor: 0.1,
            use_count: 0,
            success_count: 0,
        }
    }
}

/// One learned IF-THEN rule: if the condition pattern is active, boost the
/// target pattern. Parallel arrays live on the owning pattern.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub condition: PatternId,
    pub target: PatternId,
    pub boost: f32,
    pub strength: f32,
}

#[derive(Debug, Clone)]
pub struct Pattern {
    /// Member symbols; byte ids or `WILDCARD`.
    pub sequence: SmallVec<[SymbolId; 8]>,
    /// Compression/utility-derived; converges toward prediction success rate.
    pub strength: f32,

    // Micro-network state.
    pub activation: f32,
    pub threshold: f32,
    pub bias: f32,
    /// Lazily seeded on first forward pass.
    pub input_weights: SmallVec<[f32; 8]>,

    // Next-symbol predictions (may include END_MARKER).
    pub predicted_nodes: SmallVec<[SymbolId; 4]>,
    pub prediction_weights: SmallVec<[f32; 4]>,
    pub prediction_attempts: u32,
    pub prediction_successes: u32,

    // Next-pattern predictions (concept chains).
    pub predicted_patterns: SmallVec<[PatternId; 4]>,
    pub pattern_prediction_weights: SmallVec<[f32; 4]>,

    // Hierarchy.
    pub parent_pattern_id: PatternId,
    pub chain_depth: u32,
    pub accumulated_meaning: f32,

    // Dynamic importance triplet.
    pub dynamic_importance: f32,
    pub context_frequency: f32,
    pub co_occurrence_strength: f32,

    // Associations (parallel arrays).
    pub associated_patterns: SmallVec<[PatternId; 4]>,
    pub association_strengths: SmallVec<[f32; 4]>,

    // Rules.
    pub rules: SmallVec<[Rule; 2]>,
    pub rule_confidence: f32,
    pub rule_success_rate: f32,
    pub rule_attempts: u32,
    pub rule_successes: u32,

    // Firing memoization.
    pub has_fired: bool,
    pub last_fired_step: u64,
    /// Bitmask over prediction slots already spent this generation burst.
    pub fired_predictions: u32,
    pub last_fired_output_len: usize,

    // Learned scalars.
    pub transfer: TransferParams,
    pub selection: SelectionParams,

    pub suppression_strength: f32,

    // Port tags, derived from member nodes at creation.
    pub input_port: u32,
    pub output_port: u32,

    /// Ambient context snapshot at creation; cosine-gated during matching.
    pub context_vector: [f32; CONTEXT_LEN],
}

impl Pattern {
    pub fn new(sequence: &[SymbolId], strength: f32, port: u32, context: [f32; CONTEXT_LEN]) -> Self {
        Self {
            sequence: SmallVec::from_slice(sequence),
            strength: strength.clamp(0.0, 1.0),
            activation: 0.0,
            threshold: 0.3,
            bias: 0.0,
            input_weights: SmallVec::new(),
            predicted_nodes: SmallVec::new(),
            prediction_weights: SmallVec::new(),
            prediction_attempts: 0,
            prediction_successes: 0,
            predicted_patterns: SmallVec::new(),
            pattern_prediction_weights: SmallVec::new(),
            parent_pattern_id: PATTERN_NONE,
            chain_depth: 0,
            accumulated_meaning: 0.0,
            dynamic_importance: 0.0,
            context_frequency: 0.0,
            co_occurrence_strength: 0.0,
            associated_patterns: SmallVec::new(),
            association_strengths: SmallVec::new(),
            rules: SmallVec::new(),
            rule_confidence: 0.5,
            rule_success_rate: 0.0,
            rule_attempts: 0,
            rule_successes: 0,
            has_fired: false,
            last_fired_step: 0,
            fired_predictions: 0,
            last_fired_output_len: 0,
            transfer: TransferParams::default(),
            selection: SelectionParams::default(),
            suppression_strength: 0.0,
            input_port: port,
            output_port: port,
            context_vector: context,
        }
    }

    /// A pattern with strength zero is pruned: handles stay valid but it
    /// neither matches nor activates.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.strength > 0.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Positional patterns carry mostly wildcards and anchor at position 0.
    pub fn is_positional(&self) -> bool {
        let concrete = self.sequence.iter().filter(|&&s| s != WILDCARD).count();
        concrete * 2 <= self.sequence.len()
    }

    pub fn wildcard_count(&self) -> usize {
        self.sequence.iter().filter(|&&s| s == WILDCARD).count()
    }

    pub fn success_rate(&self) -> f32 {
        if self.prediction_attempts == 0 {
            0.5
        } else {
            self.prediction_successes as f32 / self.prediction_attempts as f32
        }
    }

    /// Find the slot of a node prediction.
    pub fn prediction_slot(&self, symbol: SymbolId) -> Option<usize> {
        self.predicted_nodes.iter().position(|&p| p == symbol)
    }

    /// Add or strengthen a node prediction; weight is clamped to [0, 1].
    pub fn upsert_prediction(&mut self, symbol: SymbolId, delta: f32, initial: f32) {
        match self.prediction_slot(symbol) {
            Some(i) => {
                self.prediction_weights[i] = (self.prediction_weights[i] + delta).clamp(0.0, 1.0);
            }
            None => {
                self.predicted_nodes.push(symbol);
                self.prediction_weights.push(initial.clamp(0.0, 1.0));
            }
        }
    }

    /// Weaken a node prediction toward zero.
    pub fn weaken_prediction(&mut self, symbol: SymbolId, delta: f32) {
        if let Some(i) = self.prediction_slot(symbol) {
            self.prediction_weights[i] = (self.prediction_weights[i] - delta).max(0.0);
        }
    }

    /// Neural-net style forward pass over member node activations.
    ///
    /// Input weights are lazily seeded from the member nodes' outgoing-edge
    /// average, centered around zero, on the first call. `context_boost`
    /// rewards proper sub-window matches into the input buffer.
    pub fn forward(&mut self, nodes: &NodeArray, seed: impl Fn(SymbolId) -> f32, context_boost: f32) -> f32 {
        if self.input_weights.len() != self.sequence.len() {
            self.input_weights = self
                .sequence
                .iter()
                .map(|&s| seed(s))
                .collect();
            self.bias = 0.0;
        }

        let mut sum = self.bias;
        for (i, &symbol) in self.sequence.iter().enumerate() {
            let act = match symbol {
                WILDCARD => 0.5,
                s if (s as usize) < 256 => nodes.get(s as u8).activation,
                _ => 0.0,
            };
            sum += act * self.input_weights[i];
        }
        sigmoid(sum) * self.strength * context_boost
    }

    /// Backprop-style nudge of the micro-network toward `error`.
    pub fn adjust_micro_net(&mut self, nodes: &NodeArray, error: f32, rate: f32) {
        if self.input_weights.len() != self.sequence.len() {
            return;
        }
        for (i, &symbol) in self.sequence.iter().enumerate() {
            let act = match symbol {
                WILDCARD => 0.5,
                s if (s as usize) < 256 => nodes.get(s as u8).activation,
                _ => 0.0,
            };
            self.input_weights[i] = (self.input_weights[i] + rate * error * act).clamp(-1.0, 1.0);
        }
        self.bias = (self.bias + rate * error).clamp(-1.0, 1.0);
    }

    /// Bounded meaning accumulation: linear to the knee, log-compressed
    /// above it, hard-capped.
    pub fn accumulate_meaning(&mut self, amount: f32) {
        let mut m = self.accumulated_meaning + amount;
        if !m.is_finite() {
            m = 1.0;
        }
        if m > MEANING_KNEE {
            m = MEANING_KNEE + (1.0 + (m - MEANING_KNEE)).ln() * 10.0;
        }
        self.accumulated_meaning = m.min(MEANING_CAP);
    }

    /// Multiplier derived from accumulated meaning, tempered by error rate.
    pub fn meaning_boost(&self, error_rate: f32) -> f32 {
        let raw = 1.0 + (1.0 + self.accumulated_meaning).ln() / 10.0;
        1.0 + (raw - 1.0) * (1.0 - error_rate * 0.5)
    }

    /// Cap activation and recover from numeric degeneration.
    pub fn guard_activation(&mut self) {
        if !self.activation.is_finite() {
            self.activation = PATTERN_ACTIVATION_CAP;
        }
        self.activation = self.activation.clamp(0.0, PATTERN_ACTIVATION_CAP);
    }

    /// Reset volatile firing state between episodes.
    pub fn reset_volatile(&mut self) {
        self.activation = 0.0;
        self.has_fired = false;
        self.last_fired_step = 0;
        self.fired_predictions = 0;
        self.last_fired_output_len = 0;
    }
}

/// Cosine similarity between two context vectors.
pub fn context_cosine(a: &[f32; CONTEXT_LEN], b: &[f32; CONTEXT_LEN]) -> f32 {
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for i in 0..CONTEXT_LEN {
        dot += a[i] * b[i];
        na += a[i] * a[i];
        nb += b[i] * b[i];
    }
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::END_MARKER;

    fn pat(seq: &[SymbolId]) -> Pattern {
        Pattern::new(seq, 0.5, 0, [0.0; CONTEXT_LEN])
    }

    #[test]
    fn test_positional_classification() {
        // Half or fewer concrete symbols => positional.
        assert!(pat(&[WILDCARD, b'a' as SymbolId]).is_positional());
        assert!(!pat(&[b'a' as SymbolId, b't' as SymbolId]).is_positional());
        assert!(!pat(&[WILDCARD, b'a' as SymbolId, b't' as SymbolId]).is_positional());
    }

    #[test]
    fn test_prediction_upsert_and_weaken() {
        let mut p = pat(&[b'a' as SymbolId, b't' as SymbolId]);
        p.upsert_prediction(b's' as SymbolId, 0.0, 0.3);
        p.upsert_prediction(b's' as SymbolId, 0.5, 0.3);
        assert_eq!(p.predicted_nodes.len(), 1);
        assert!((p.prediction_weights[0] - 0.8).abs() < 1e-6);

        p.weaken_prediction(b's' as SymbolId, 1.0);
        assert_eq!(p.prediction_weights[0], 0.0);

        p.upsert_prediction(END_MARKER, 0.0, 0.2);
        assert_eq!(p.predicted_nodes.len(), 2);
    }

    #[test]
    fn test_meaning_compression_and_cap() {
        let mut p = pat(&[b'a' as SymbolId]);
        p.accumulate_meaning(50.0);
        assert!((p.accumulated_meaning - 50.0).abs() < 1e-4);
        p.accumulate_meaning(1.0e9);
        assert!(p.accumulated_meaning <= MEANING_CAP);
        // NaN resets to a safe value instead of propagating.
        p.accumulated_meaning = 0.0;
        p.accumulate_meaning(f32::NAN);
        assert!(p.accumulated_meaning.is_finite());
    }

    #[test]
    fn test_activation_guard() {
        let mut p = pat(&[b'a' as SymbolId]);
        p.activation = f32::NAN;
        p.guard_activation();
        assert_eq!(p.activation, PATTERN_ACTIVATION_CAP);
        p.activation = 99.0;
        p.guard_activation();
        assert_eq!(p.activation, PATTERN_ACTIVATION_CAP);
    }

    #[test]
    fn test_forward_pass_bounded() {
        let mut nodes = NodeArray::new();
        nodes.activate(b'a', 1.0, 0);
        nodes.activate(b't', 1.0, 0);
        let mut p = pat(&[b'a' as SymbolId, b't' as SymbolId]);
        let out = p.forward(&nodes, |_| 0.5, 1.0);
        assert!(out > 0.0 && out <= 1.0);
        assert_eq!(p.input_weights.len(), 2);
    }

    #[test]
    fn test_context_cosine_zero_vector() {
        let zero = [0.0; CONTEXT_LEN];
        let mut one = [0.0; CONTEXT_LEN];
        one[0] = 1.0;
        assert_eq!(context_cosine(&zero, &one), 0.0);
        assert!((context_cosine(&one, &one) - 1.0).abs() < 1e-6);
    }
}

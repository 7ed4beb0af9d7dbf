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

//! SystemState v1.0 - per-step computed aggregates and pressures
//!
//! Everything the engine self-regulates with lives here: activation
//! averages, graph density, the five pressures, the derived tuning knobs,
//! and the output-history ring. The previous-total-activation slot that
//! feeds `activation_rate` is part of this record, not a module global, so
//! multiple graphs in one process never share state.

use std::collections::VecDeque;

use crate::edge::EdgeList;
use crate::node::NodeArray;
use crate::pattern_store::PatternStore;

/// Output-history ring capacity.
const OUTPUT_HISTORY_LEN: usize = 50;
/// Variance window over the freshest history entries.
const VARIANCE_WINDOW: usize = 20;

#[derive(Debug, Clone)]
pub struct SystemState {
    // Averages and totals.
    pub avg_activation: f32,
    pub avg_threshold: f32,
    pub total_activation: f32,
    pub prev_total_activation: f32,

    // Counts.
    pub active_nodes: u32,
    pub active_edges: u32,
    pub active_patterns: u32,

    // Rates.
    pub activation_rate: f32,
    pub learning_rate: f32,
    pub error_rate: f32,

    // Pressures.
    pub competition_pressure: f32,
    pub exploration_pressure: f32,
    pub metabolic_pressure: f32,
    pub loop_pressure: f32,
    pub completion_pressure: f32,

    // Self-tuning knobs derived from the pressures.
    pub activation_flow_adjustment: f32,
    pub meaning_accumulation_rate: f32,
    pub loop_breaking_strength: f32,
    pub diversity_pressure: f32,

    // Output observation.
    pub output_history: VecDeque<u8>,
    pub output_variance: f32,
    pub selection_confidence: f32,

    /// EMA of |target| / |input| seen in training; sizes the expected
    /// output length for completion pressure.
    pub avg_target_ratio: f32,

    /// Monotonic step counter across the graph's lifetime.
    pub step: u64,
}

impl SystemState {
    pub fn new() -> Self {
        Self {
            avg_activation: 0.0,
            avg_threshold: 0.5,
            total_activation: 0.0,
            prev_total_activation: 0.0,
            active_nodes: 0,
            active_edges: 0,
            active_patterns: 0,
            activation_rate: 0.0,
            learning_rate: 0.1,
            error_rate: 0.5,
            competition_pressure: 0.0,
            exploration_pressure: 0.5,
            metabolic_pressure: 0.0,
            loop_pressure: 0.0,
            completion_pressure: 0.0,
            activation_flow_adjustment: 1.0,
            meaning_accumulation_rate: 0.05,
            loop_breaking_strength: 0.0,
            diversity_pressure: 0.0,
            output_history: VecDeque::with_capacity(OUTPUT_HISTORY_LEN),
            output_variance: 0.0,
            selection_confidence: 0.0,
            avg_target_ratio: 1.0,
            step: 0,
        }
    }

    /// Recompute all aggregates from the current graph state.
    pub fn recompute(
        &mut self,
        nodes: &NodeArray,
        edges: &EdgeList,
        patterns: &PatternStore,
        input_len: usize,
        output_len: usize,
    ) {
        let mut total = 0.0f32;
        let mut threshold_sum = 0.0f32;
        let mut count = 0u32;
        for (_, node) in nodes.iter_existing() {
            total += node.activation;
            threshold_sum += node.threshold;
            count += 1;
        }
        self.active_nodes = count;
        self.avg_activation = if count > 0 { total / count as f32 } else { 0.0 };
        self.avg_threshold = if count > 0 {
            threshold_sum / count as f32
        } else {
            0.5
        };

        let pattern_total: f32 = patterns.iter().map(|(_, p)| p.activation).sum();
        self.prev_total_activation = self.total_activation;
        self.total_activation = total + pattern_total;
        self.activation_rate = self.total_activation - self.prev_total_activation;

        self.active_edges = edges.active_count() as u32;
        self.active_patterns = patterns
            .iter()
            .filter(|(_, p)| p.is_alive() && p.activation > p.threshold)
            .count() as u32;

        // Competition: spread of activation across existing nodes.
        if count > 1 {
            let mean = self.avg_activation;
            let var: f32 = nodes
                .iter_existing()
                .map(|(_, n)| (n.activation - mean).powi(2))
                .sum::<f32>()
                / count as f32;
            self.competition_pressure = (var.sqrt() / (mean + 0.1)).clamp(0.0, 1.0);
        } else {
            self.competition_pressure = 0.0;
        }

        self.exploration_pressure = self.error_rate;
        self.metabolic_pressure =
            ((self.active_edges as f32 / 4096.0).powi(2)).clamp(0.0, 1.0);

        let expected = self.expected_output_len(input_len);
        self.completion_pressure = if expected > 0 {
            (output_len as f32 / (expected as f32 + 1.0)).clamp(0.0, 1.0)
        } else {
            0.0
        };

        self.learning_rate = (0.05 + 0.15 * self.error_rate).clamp(0.02, 0.5);

        self.activation_flow_adjustment = 1.0 + 0.5 * (1.0 - self.competition_pressure);
        self.meaning_accumulation_rate = 0.1 * (1.0 - self.error_rate);
        self.loop_breaking_strength = self.loop_pressure;
        self.diversity_pressure = 1.0 / (1.0 + self.output_variance);
    }

    /// Expected output length from learned target/input ratios.
    pub fn expected_output_len(&self, input_len: usize) -> usize {
        (self.avg_target_ratio * input_len as f32).round() as usize
    }

    /// Record one emitted byte: history ring, variance, loop detection.
    pub fn note_emission(&mut self, byte: u8) {
        if self.output_history.len() == OUTPUT_HISTORY_LEN {
            self.output_history.pop_front();
        }
        self.output_history.push_back(byte);
        self.output_variance = self.variance_window();

        // Loop detection: repetition over the last four emissions.
        let n = self.output_history.len();
        let looping = n >= 4 && {
            let tail: Vec<u8> = self.output_history.iter().rev().take(4).copied().collect();
            let distinct = {
                let mut seen: Vec<u8> = Vec::with_capacity(4);
                for &b in &tail {
                    if !seen.contains(&b) {
                        seen.push(b);
                    }
                }
                seen.len()
            };
            distinct <= 2
        };
        if looping {
            self.loop_pressure = (self.loop_pressure + 0.3).min(1.0);
        } else {
            self.loop_pressure *= 0.7;
        }
    }

    fn variance_window(&self) -> f32 {
        let window: Vec<f32> = self
            .output_history
            .iter()
            .rev()
            .take(VARIANCE_WINDOW)
            .map(|&b| b as f32)
            .collect();
        if window.len() < 2 {
            return 0.0;
        }
        let mean = window.iter().sum::<f32>() / window.len() as f32;
        window.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / window.len() as f32
    }

    /// Update the error-rate EMA from one episode's accuracy.
    pub fn observe_accuracy(&mut self, accuracy: f32) {
        self.error_rate = 0.9 * self.error_rate + 0.1 * (1.0 - accuracy.clamp(0.0, 1.0));
    }

    /// Track target/input length ratio from a training episode.
    pub fn observe_target_ratio(&mut self, input_len: usize, target_len: usize) {
        if input_len == 0 {
            return;
        }
        let ratio = target_len as f32 / input_len as f32;
        self.avg_target_ratio = 0.8 * self.avg_target_ratio + 0.2 * ratio;
    }

    /// Per-episode volatile reset; learned rates and the step counter persist.
    pub fn reset_volatile(&mut self) {
        self.loop_pressure = 0.0;
        self.completion_pressure = 0.0;
        self.selection_confidence = 0.0;
        self.total_activation = 0.0;
        self.prev_total_activation = 0.0;
        self.activation_rate = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = SystemState::new();
        assert!((state.error_rate - 0.5).abs() < 1e-6);
        assert_eq!(state.step, 0);
    }

    #[test]
    fn test_recompute_totals() {
        let mut nodes = NodeArray::new();
        nodes.activate(b'a', 1.0, 0);
        nodes.activate(b'b', 3.0, 0);
        let edges = EdgeList::new();
        let patterns = PatternStore::new();

        let mut state = SystemState::new();
        state.recompute(&nodes, &edges, &patterns, 2, 0);
        assert_eq!(state.active_nodes, 2);
        assert!((state.total_activation - 4.0).abs() < 1e-5);
        assert!((state.avg_activation - 2.0).abs() < 1e-5);
        assert!(state.competition_pressure > 0.0);

        // prev_total moves with the record, never a module global.
        state.recompute(&nodes, &edges, &patterns, 2, 0);
        assert!((state.prev_total_activation - 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_loop_pressure_rises_on_repetition() {
        let mut state = SystemState::new();
        for _ in 0..6 {
            state.note_emission(b'x');
        }
        assert!(state.loop_pressure > 0.5);

        for b in [b'a', b'b', b'c', b'd', b'e'] {
            state.note_emission(b);
        }
        assert!(state.loop_pressure < 0.5);
    }

    #[test]
    fn test_error_rate_ema() {
        let mut state = SystemState::new();
        for _ in 0..50 {
            state.observe_accuracy(1.0);
        }
        assert!(state.error_rate < 0.01);
        state.observe_accuracy(0.0);
        assert!(state.error_rate > 0.05);
    }

    #[test]
    fn test_expected_output_len_tracks_targets() {
        let mut state = SystemState::new();
        for _ in 0..30 {
            state.observe_target_ratio(3, 4);
        }
        assert_eq!(state.expected_output_len(3), 4);
    }
}

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

//! EpisodeDriver v1.0 - the propagate/select/emit loop
//!
//! An episode: reset volatile state, inject input, then loop
//! (system state → pattern propagation → edge propagation → selection →
//! emission) until a self-regulating stop condition fires, and finally run
//! the post-loop learning pass. Structural state persists across episodes;
//! activations, firing memoization and contribution records do not.

use tracing::debug;

use crate::config::PropagationHead;
use crate::error::{EngineError, EngineResult};
use crate::graph::ByteGraph;
use crate::matcher::MatchQuery;
use crate::selector::Selection;

/// Activation-energy floor; below it the episode has burned out.
const ENERGY_FLOOR: f32 = 0.005;
/// Confidence floor for the low-confidence stop.
const CONFIDENCE_FLOOR: f32 = 0.01;
/// Consecutive empty selections tolerated before giving up.
const MAX_NO_SELECTION: u32 = 10;

impl ByteGraph {
    /// Run one episode. `target` switches the driver into training mode:
    /// tighter state updates, a target-length stop, and supervised feedback
    /// in the learning pass.
    pub fn run_episode(&mut self, input: &[u8], target: Option<&[u8]>) -> EngineResult<()> {
        if input.is_empty() {
            if target.is_some() {
                return Err(EngineError::InvalidArgument(
                    "zero-length input with target",
                ));
            }
            // Empty input is a no-op: structure untouched, empty output.
            self.output.clear();
            self.contributions.clear();
            return Ok(());
        }

        self.training = target.is_some();
        debug!(
            input_len = input.len(),
            training = self.training,
            port = self.input_port,
            "episode start"
        );

        // 1. Volatile reset.
        self.output.clear();
        self.contributions.clear();
        self.nodes.reset_volatile();
        self.patterns.reset_volatile();
        self.state.reset_volatile();

        // 2. Input-history ring.
        if self.input_history.len() == self.config.input_history_len {
            self.input_history.pop_front();
        }
        self.input_history.push_back(input.to_vec());

        // 3. Inject: novelty measurement first, then nodes and edges.
        self.memory_strength = self.measure_memory(input);
        self.input = input.to_vec();
        let n = input.len();
        for (i, &byte) in input.iter().enumerate() {
            let seed = 1.5 - 0.5 * i as f32 / n as f32;
            self.nodes.activate(byte, seed, self.input_port);
        }
        let learning_rate = self.state.learning_rate;
        for i in 1..n {
            let context = if i >= 2 { Some(input[i - 2]) } else { None };
            self.edges
                .create_or_strengthen(input[i - 1], input[i] as u16, learning_rate, context);
        }

        // 4. Generalization pass over wildcard patterns.
        self.connect_similar_patterns();

        // 5. First system-state computation.
        self.state
            .recompute(&self.nodes, &self.edges, &self.patterns, n, 0);

        // 6. Re-seed input to dominate the first propagation step.
        for &byte in input {
            self.nodes.get_mut(byte).activation = 1.0;
        }

        // 7. Propagate / select / emit.
        let (max_steps, update_interval) = if self.training {
            (self.config.max_steps_training, 1)
        } else {
            (self.config.max_steps_generation, 5)
        };
        let min_output = (n / 2).max(1);
        let target_len = target.map(|t| t.len());
        let mut no_selection = 0u32;

        for step_index in 0..max_steps {
            self.state.step += 1;
            if step_index % update_interval == 0 {
                self.state.recompute(
                    &self.nodes,
                    &self.edges,
                    &self.patterns,
                    n,
                    self.output.len(),
                );
            }

            match self.config.propagation_head {
                PropagationHead::PathQuality => {
                    self.propagate_patterns();
                    self.propagate_edges();
                }
                PropagationHead::Coherence => {
                    self.propagate_patterns();
                }
            }

            // Burned out: nothing left to select from.
            let energy = self.nodes.total_activation()
                + self
                    .patterns
                    .iter()
                    .map(|(_, p)| p.activation)
                    .sum::<f32>();
            if energy < ENERGY_FLOOR {
                debug!(step = step_index, "episode stop: activation energy");
                break;
            }

            if let Some(t) = target_len {
                if self.output.len() >= t {
                    break;
                }
            }
            if self.output.len() >= self.config.max_output_len {
                break;
            }

            let (selection, confidence, record) = match self.config.propagation_head {
                PropagationHead::PathQuality => self.select_next(),
                PropagationHead::Coherence => self.select_coherent(),
            };
            self.state.selection_confidence = confidence;

            match selection {
                Selection::End => {
                    debug!(step = step_index, "episode stop: end marker");
                    break;
                }
                Selection::NoSelection => {
                    no_selection += 1;
                    if no_selection >= MAX_NO_SELECTION {
                        debug!(step = step_index, "episode stop: degenerate selection");
                        break;
                    }
                }
                Selection::Node(byte) => {
                    no_selection = 0;
                    if confidence < CONFIDENCE_FLOOR && self.output.len() >= min_output {
                        debug!(step = step_index, "episode stop: low confidence");
                        break;
                    }
                    self.emit(byte, record);
                    if self.state.loop_pressure > 0.95 && self.output.len() > 3 {
                        debug!(step = step_index, "episode stop: loop pressure");
                        break;
                    }
                    if self.state.completion_pressure > 0.9 && self.output.len() >= min_output {
                        debug!(step = step_index, "episode stop: completion");
                        break;
                    }
                }
            }
        }

        // 8. Post-loop learning pass.
        self.learn_episode(target);

        debug!(
            output_len = self.output.len(),
            error_rate = self.state.error_rate,
            patterns = self.patterns.alive_count(),
            "episode end"
        );
        Ok(())
    }

    /// Append one byte to the output and apply its immediate consequences:
    /// history/variance/loop bookkeeping, emitter fatigue, recurrent
    /// pattern support, and progress-proportional input decay.
    fn emit(&mut self, byte: u8, record: crate::selector::StepContribution) {
        self.output.push(byte);
        self.contributions.push(record);
        self.state.note_emission(byte);
        self.state.completion_pressure = {
            let expected = self.state.expected_output_len(self.input.len());
            (self.output.len() as f32 / (expected as f32 + 1.0)).clamp(0.0, 1.0)
        };

        {
            let node = self.nodes.get_mut(byte);
            node.adaptation = (node.adaptation + 0.4).min(crate::node::MAX_ADAPTATION);
            node.fire_count = node.fire_count.saturating_add(1);
        }

        // Recurrent support: active patterns containing the emitted byte
        // lift their subsequent members, damped by target fatigue.
        let mut boosts: Vec<(u8, f32)> = Vec::new();
        for &pid in &self.patterns.active {
            let p = match self.patterns.get(pid) {
                Some(p) if p.is_alive() => p,
                _ => continue,
            };
            if let Some(pos) = p.sequence.iter().position(|&s| s == byte as u16) {
                for (offset, &symbol) in p.sequence.iter().enumerate().skip(pos + 1) {
                    if (symbol as usize) < 256 {
                        let distance = (offset - pos) as f32;
                        boosts.push((symbol as u8, p.activation * 0.1 / distance));
                    }
                }
            }
        }
        for (target, boost) in boosts {
            let fatigue = 1.0 - self.nodes.get(target).adaptation;
            self.nodes.receive(target, boost * fatigue, byte);
        }

        // Input fades as the output covers it.
        let progress = (self.output.len() as f32 / self.input.len() as f32).min(1.0);
        let input = self.input.clone();
        for b in input {
            let node = self.nodes.get_mut(b);
            node.activation *= 1.0 - progress;
        }
    }

    /// Memory coverage of an input before it is injected: known nodes on
    /// the right port, known sequential edges, and patterns that match.
    fn measure_memory(&self, input: &[u8]) -> f32 {
        let n = input.len();
        let node_mem = input
            .iter()
            .filter(|&&b| {
                let node = self.nodes.get(b);
                node.exists && node.source_port == self.input_port
            })
            .count() as f32
            / n as f32;

        let edge_mem = if n < 2 {
            1.0
        } else {
            input
                .windows(2)
                .filter(|w| self.edges.has_active(w[0], w[1] as u16))
                .count() as f32
                / (n - 1) as f32
        };

        let query = MatchQuery {
            nodes: &self.nodes,
            ambient: &self.context,
            port: self.input_port,
        };
        let matching = self
            .patterns
            .iter()
            .filter(|(_, p)| p.is_alive() && query.best_match(p, input).is_some())
            .count();
        let pattern_mem = (matching as f32 / 2.0).min(1.0);

        0.4 * node_mem + 0.3 * edge_mem + 0.3 * pattern_mem
    }
}

#[cfg(test)]
mod tests {
    use crate::error::EngineError;
    use crate::graph::ByteGraph;

    #[test]
    fn test_empty_input_is_noop() {
        let mut graph = ByteGraph::new();
        graph.run_episode(b"", None).unwrap();
        assert!(graph.output().is_empty());
        assert_eq!(graph.edges().active_count(), 0);
        assert_eq!(graph.pattern_count(), 0);
    }

    #[test]
    fn test_empty_input_with_target_rejected() {
        let mut graph = ByteGraph::new();
        let err = graph.run_episode(b"", Some(b"x")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn test_injection_creates_nodes_and_edges() {
        let mut graph = ByteGraph::new();
        graph.run_episode(b"ab", None).unwrap();
        assert!(graph.edges().has_active(b'a', b'b' as u16));
        assert!(graph.system().step > 0);
    }

    #[test]
    fn test_training_output_bounded_by_target() {
        let mut graph = ByteGraph::new();
        for _ in 0..5 {
            graph.run_episode(b"ab", Some(b"abc")).unwrap();
            assert!(graph.output().len() <= 3);
        }
    }

    #[test]
    fn test_fresh_graph_echo_is_input_prefix() {
        let mut graph = ByteGraph::new();
        graph.run_episode(b"hello", None).unwrap();
        let out = graph.output().to_vec();
        assert!(out.len() <= 10);
        // Whatever came out of a fresh graph is drawn from the input bytes.
        assert!(out.iter().all(|b| b"hello".contains(b)));
    }
}

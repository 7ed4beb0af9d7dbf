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

//! ByteGraph v1.0 - the self-regulating byte-level neural graph
//!
//! One graph owns all state: the 256-slot node table, per-node edge lists,
//! the pattern arena, computed system state, episode buffers, and the
//! input-history ring. A graph is driven by exactly one thread; propagation
//! and learning are synchronous and deterministic for a given starting
//! state, input, port and context settings.
//!
//! # Episode flow
//!
//! `run_episode` resets volatile state, injects input, then loops
//! pattern propagation → edge propagation → selection until a
//! self-regulating stop condition fires, and finally runs the learning
//! pass. See `episode.rs` for the driver and `learner.rs` for feedback.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::GraphConfig;
use crate::edge::EdgeList;
use crate::node::NodeArray;
use crate::pattern::CONTEXT_LEN;
use crate::pattern_store::PatternStore;
use crate::selector::StepContribution;
use crate::symbols::{PatternId, SymbolId};
use crate::system_state::SystemState;

/// Public snapshot of the engine's self-regulation signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    pub step: u64,
    pub error_rate: f32,
    pub learning_rate: f32,
    pub active_nodes: u32,
    pub active_edges: u32,
    pub pattern_count: u32,
    pub competition_pressure: f32,
    pub metabolic_pressure: f32,
    pub loop_pressure: f32,
    pub completion_pressure: f32,
    pub selection_confidence: f32,
    pub output_variance: f32,
}

/// Introspection view of one pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternInfo {
    pub sequence: Vec<SymbolId>,
    pub strength: f32,
}

pub struct ByteGraph {
    pub(crate) config: GraphConfig,
    pub(crate) nodes: NodeArray,
    pub(crate) edges: EdgeList,
    pub(crate) patterns: PatternStore,
    pub(crate) state: SystemState,

    /// Current episode input bytes (injected under `input_port`).
    pub(crate) input: Vec<u8>,
    /// Current episode output buffer; owned by the graph.
    pub(crate) output: Vec<u8>,
    /// Recent inputs for positional pattern detection.
    pub(crate) input_history: VecDeque<Vec<u8>>,
    /// Per-emitted-position contribution records (credit assignment).
    pub(crate) contributions: Vec<StepContribution>,

    /// Ambient context vector; snapshotted into patterns at creation.
    pub(crate) context: [f32; CONTEXT_LEN],
    pub(crate) input_port: u32,
    pub(crate) output_port: u32,
    /// True while the current episode carries a target.
    pub(crate) training: bool,
    /// How strongly memory covers the current input (novelty detection);
    /// set at injection, read by the selector.
    pub(crate) memory_strength: f32,
}

impl ByteGraph {
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            config,
            nodes: NodeArray::new(),
            edges: EdgeList::new(),
            patterns: PatternStore::new(),
            state: SystemState::new(),
            input: Vec::new(),
            output: Vec::new(),
            input_history: VecDeque::new(),
            contributions: Vec::new(),
            context: [0.0; CONTEXT_LEN],
            input_port: 0,
            output_port: 0,
            training: false,
            memory_strength: 1.0,
        }
    }

    /// Tag subsequent injections with this port.
    pub fn set_input_port(&mut self, port: u32) {
        self.input_port = port;
    }

    /// Tag subsequent emissions with this port.
    pub fn set_output_port(&mut self, port: u32) {
        self.output_port = port;
    }

    /// Replace the ambient context vector.
    pub fn set_context(&mut self, context: [f32; CONTEXT_LEN]) {
        self.context = context;
    }

    /// Current output buffer; valid until the next episode.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn error_rate(&self) -> f32 {
        self.state.error_rate
    }

    pub fn pattern_count(&self) -> u32 {
        self.patterns.alive_count() as u32
    }

    /// Weight of the active edge `from → to`, or 0.0 if absent.
    pub fn edge_weight(&self, from: u8, to: SymbolId) -> f32 {
        self.edges
            .get(from, to)
            .filter(|e| e.active)
            .map(|e| e.weight)
            .unwrap_or(0.0)
    }

    pub fn pattern_info(&self, id: PatternId) -> Option<PatternInfo> {
        self.patterns.get(id).map(|p| PatternInfo {
            sequence: p.sequence.to_vec(),
            strength: p.strength,
        })
    }

    /// Node predictions of one pattern as parallel (symbol, weight) lists.
    pub fn pattern_predictions(&self, id: PatternId) -> Option<(Vec<SymbolId>, Vec<f32>)> {
        self.patterns
            .get(id)
            .map(|p| (p.predicted_nodes.to_vec(), p.prediction_weights.to_vec()))
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            step: self.state.step,
            error_rate: self.state.error_rate,
            learning_rate: self.state.learning_rate,
            active_nodes: self.state.active_nodes,
            active_edges: self.edges.active_count() as u32,
            pattern_count: self.pattern_count(),
            competition_pressure: self.state.competition_pressure,
            metabolic_pressure: self.state.metabolic_pressure,
            loop_pressure: self.state.loop_pressure,
            completion_pressure: self.state.completion_pressure,
            selection_confidence: self.state.selection_confidence,
            output_variance: self.state.output_variance,
        }
    }

    /// Read-only view of the edge lists (inspection and invariants).
    pub fn edges(&self) -> &EdgeList {
        &self.edges
    }

    /// Read-only view of the pattern arena.
    pub fn patterns(&self) -> &PatternStore {
        &self.patterns
    }

    /// Read-only view of the computed system state.
    pub fn system(&self) -> &SystemState {
        &self.state
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }
}

impl Default for ByteGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_graph_is_empty() {
        let graph = ByteGraph::new();
        assert!(graph.output().is_empty());
        assert_eq!(graph.pattern_count(), 0);
        assert_eq!(graph.edge_weight(b'a', b'b' as SymbolId), 0.0);
    }

    #[test]
    fn test_port_and_context_setters() {
        let mut graph = ByteGraph::new();
        graph.set_input_port(2);
        graph.set_output_port(3);
        let mut ctx = [0.0; CONTEXT_LEN];
        ctx[0] = 0.7;
        graph.set_context(ctx);
        assert_eq!(graph.input_port, 2);
        assert_eq!(graph.output_port, 3);
        assert!((graph.context[0] - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_stats_snapshot() {
        let graph = ByteGraph::new();
        let stats = graph.stats();
        assert_eq!(stats.pattern_count, 0);
        assert!((stats.error_rate - 0.5).abs() < 1e-6);
        // Serializable for host export.
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("error_rate"));
    }
}

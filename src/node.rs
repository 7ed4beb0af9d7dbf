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

//! NodeArray v1.0 - fixed 256-slot table of byte nodes
//!
//! One slot per byte value; index equals payload for existing nodes. Nodes
//! are created lazily on first activation and never destroyed. Structural
//! identity persists across episodes; activation state does not.

use crate::symbols::BYTE_SYMBOLS;

/// Hard ceiling on node adaptation (fatigue).
pub const MAX_ADAPTATION: f32 = 0.8;

/// Numeric guard: activation above this is reset to a safe value.
const ACTIVATION_GUARD: f32 = 1.0e6;
const ACTIVATION_SAFE: f32 = 100.0;

/// A single byte node.
#[derive(Debug, Clone, Copy)]
pub struct Node {
    /// True once first activated.
    pub exists: bool,
    /// Current activation; decays over time, accumulates on receive.
    pub activation: f32,
    /// Activation at the previous dynamics step.
    pub prev_activation: f32,
    /// EMA of activation deltas.
    pub activation_momentum: f32,
    /// Firing threshold; adapts toward `1 - importance`.
    pub threshold: f32,
    /// Fatigue; grows when the node is emitted, recovers on rest.
    pub adaptation: f32,
    /// Times this node drove an emission or fired above threshold.
    pub fire_count: u32,
    /// Times this node received transferred activation.
    pub receive_count: u32,
    /// Last node that drove activation into this one (context).
    pub activated_by: Option<u8>,
    /// First-seen modality tag; frozen at creation.
    pub source_port: u32,
}

impl Node {
    const INERT: Node = Node {
        exists: false,
        activation: 0.0,
        prev_activation: 0.0,
        activation_momentum: 0.0,
        threshold: 0.5,
        adaptation: 0.0,
        fire_count: 0,
        receive_count: 0,
        activated_by: None,
        source_port: 0,
    };
}

/// Fixed-capacity table of the 256 byte nodes.
#[derive(Debug, Clone)]
pub struct NodeArray {
    slots: [Node; BYTE_SYMBOLS],
}

impl NodeArray {
    pub fn new() -> Self {
        Self {
            slots: [Node::INERT; BYTE_SYMBOLS],
        }
    }

    #[inline]
    pub fn get(&self, byte: u8) -> &Node {
        &self.slots[byte as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, byte: u8) -> &mut Node {
        &mut self.slots[byte as usize]
    }

    /// Create the node on first activation and add activation to it.
    /// `port` is recorded only at creation (first-seen modality tag).
    pub fn activate(&mut self, byte: u8, amount: f32, port: u32) {
        let node = &mut self.slots[byte as usize];
        if !node.exists {
            node.exists = true;
            node.source_port = port;
        }
        node.activation += amount;
        node.guard();
    }

    /// Add activation transferred from `from`, bumping receive bookkeeping.
    pub fn receive(&mut self, byte: u8, amount: f32, from: u8) {
        let node = &mut self.slots[byte as usize];
        if !node.exists {
            // Transfer can reach a byte never seen in input; it becomes a
            // real node with the default port.
            node.exists = true;
        }
        node.activation += amount;
        node.receive_count = node.receive_count.saturating_add(1);
        node.activated_by = Some(from);
        node.guard();
    }

    /// Iterate existing nodes as (byte, node).
    pub fn iter_existing(&self) -> impl Iterator<Item = (u8, &Node)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, n)| n.exists)
            .map(|(i, n)| (i as u8, n))
    }

    pub fn existing_count(&self) -> usize {
        self.slots.iter().filter(|n| n.exists).count()
    }

    /// Total activation over existing nodes.
    pub fn total_activation(&self) -> f32 {
        self.slots
            .iter()
            .filter(|n| n.exists)
            .map(|n| n.activation)
            .sum()
    }

    /// Reset volatile state between episodes; structure persists.
    pub fn reset_volatile(&mut self) {
        for node in self.slots.iter_mut() {
            node.activation = 0.0;
            node.prev_activation = 0.0;
            node.activation_momentum = 0.0;
            node.adaptation = 0.0;
            node.activated_by = None;
        }
    }

    /// Per-step dynamics for one node.
    ///
    /// Momentum tracks the activation delta, natural decay is softened when
    /// competition is low, and the threshold drifts toward `1 - importance`
    /// so that important symbols stay easy to keep active. Activation itself
    /// is never clamped toward the average.
    pub fn update_dynamics(
        &mut self,
        byte: u8,
        avg_activation: f32,
        competition_pressure: f32,
        learning_rate: f32,
    ) {
        let node = &mut self.slots[byte as usize];
        if !node.exists {
            return;
        }

        node.activation_momentum =
            0.9 * node.activation_momentum + 0.1 * (node.activation - node.prev_activation);
        node.prev_activation = node.activation;

        node.activation *= 0.95 + 0.05 * (1.0 - competition_pressure.clamp(0.0, 1.0));

        // Importance: mean of usage, relative activation, and success.
        let usage = ((1.0 + node.receive_count as f32).ln() / 10.0).min(1.0);
        let relative = node.activation / (avg_activation + 0.1);
        let act_signal = if relative > 1.0 {
            relative.min(2.0) * 0.5
        } else {
            (relative * 0.5).min(0.5)
        };
        let success = if node.receive_count > 0 {
            (node.fire_count as f32 / node.receive_count as f32).min(1.0)
        } else {
            0.5
        };
        let importance = (usage + act_signal + success) / 3.0;

        let target = 1.0 - importance;
        node.threshold += (target - node.threshold) * 0.01 * learning_rate;
        node.threshold = sigmoid(5.0 * (node.threshold - 0.5));

        // Fatigue recovers on rest.
        node.adaptation = (node.adaptation - 0.02).max(0.0);

        node.guard();
    }
}

impl Node {
    #[inline]
    fn guard(&mut self) {
        if !self.activation.is_finite() || self.activation > ACTIVATION_GUARD {
            self.activation = ACTIVATION_SAFE;
        }
        if self.activation < 0.0 {
            self.activation = 0.0;
        }
    }
}

#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_creation() {
        let mut nodes = NodeArray::new();
        assert!(!nodes.get(b'a').exists);

        nodes.activate(b'a', 1.0, 3);
        let node = nodes.get(b'a');
        assert!(node.exists);
        assert_eq!(node.source_port, 3);
        assert!((node.activation - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_port_frozen_at_creation() {
        let mut nodes = NodeArray::new();
        nodes.activate(b'x', 0.5, 1);
        nodes.activate(b'x', 0.5, 2);
        assert_eq!(nodes.get(b'x').source_port, 1);
    }

    #[test]
    fn test_receive_tracks_context() {
        let mut nodes = NodeArray::new();
        nodes.activate(b'a', 1.0, 0);
        nodes.receive(b'b', 0.4, b'a');
        let b = nodes.get(b'b');
        assert_eq!(b.receive_count, 1);
        assert_eq!(b.activated_by, Some(b'a'));
    }

    #[test]
    fn test_reset_keeps_structure() {
        let mut nodes = NodeArray::new();
        nodes.activate(b'a', 1.0, 0);
        nodes.reset_volatile();
        assert!(nodes.get(b'a').exists);
        assert_eq!(nodes.get(b'a').activation, 0.0);
    }

    #[test]
    fn test_dynamics_decay_and_threshold_bounds() {
        let mut nodes = NodeArray::new();
        nodes.activate(b'a', 1.0, 0);
        for _ in 0..20 {
            nodes.update_dynamics(b'a', 0.5, 0.5, 0.1);
        }
        let node = nodes.get(b'a');
        assert!(node.activation < 1.0);
        assert!(node.threshold > 0.0 && node.threshold < 1.0);
    }

    #[test]
    fn test_numeric_guard() {
        let mut nodes = NodeArray::new();
        nodes.activate(b'a', f32::INFINITY, 0);
        assert_eq!(nodes.get(b'a').activation, 100.0);
    }
}

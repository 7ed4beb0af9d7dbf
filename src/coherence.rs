//! Coherence-based propagation v1.0 - the fused alternative head
//!
//! A single pass that, for each candidate edge out of the active nodes,
//! derives a *relative coherence* from four independently scaled signals:
//! pattern support, context fit, sequence coherence (edge success), and
//! generalization (wildcard-pattern matches). The signals are blended with
//! an adaptive mix of geometric and arithmetic means weighted by how much
//! they agree; coherence above 0.5 amplifies transfer (up to 2×), below it
//! attenuates (down to 0.1×). Selection falls out of the same pass: the
//! most activated node that is neither input echo nor a recent emission,
//! with the end marker competing on its own coherence.

use crate::graph::ByteGraph;
use crate::matcher::MatchQuery;
use crate::selector::{EdgeContribution, Selection, StepContribution};
use crate::symbols::{SymbolId, BYTE_SYMBOLS, END_MARKER};

/// Signals below this floor are treated as absent in the geometric mean.
const SIGNAL_FLOOR: f32 = 0.05;

impl ByteGraph {
    /// Fused propagation + selection step for the coherence head.
    pub(crate) fn select_coherent(&mut self) -> (Selection, f32, StepContribution) {
        let position = self.output.len();

        // Pattern support per target.
        let mut support = [0.0f32; BYTE_SYMBOLS];
        let mut generalized = [false; BYTE_SYMBOLS];
        {
            let query = MatchQuery {
                nodes: &self.nodes,
                ambient: &self.context,
                port: self.input_port,
            };
            for (_, p) in self.patterns.iter() {
                if !p.is_alive() || p.activation <= 0.0 {
                    continue;
                }
                let wildcard = p.wildcard_count() > 0;
                let matches_input = query.best_match(p, &self.input).is_some();
                for (&symbol, &weight) in
                    p.predicted_nodes.iter().zip(p.prediction_weights.iter())
                {
                    if (symbol as usize) >= BYTE_SYMBOLS {
                        continue;
                    }
                    let s = p.activation * p.strength * weight;
                    support[symbol as usize] = support[symbol as usize].max(s);
                    if wildcard && matches_input {
                        generalized[symbol as usize] = true;
                    }
                }
            }
        }

        let mut in_input = [false; BYTE_SYMBOLS];
        for &b in &self.input {
            in_input[b as usize] = true;
        }
        let continuation = self.input.get(position).copied();
        let recent: Vec<u8> = self.output.iter().rev().take(4).copied().collect();

        let pre: Vec<f32> = (0..BYTE_SYMBOLS)
            .map(|i| self.nodes.get(i as u8).activation)
            .collect();
        let act_min = (0.1 * self.state.avg_activation).max(1.0e-4);

        let mut end_coherence = 0.0f32;
        let last_output = self.output.last().copied();
        let mut transfers: Vec<(u8, f32, u8, f32)> = Vec::new();

        for (from, _) in self.nodes.iter_existing() {
            let source_act = pre[from as usize];
            if source_act < act_min {
                continue;
            }
            for edge in self.edges.outgoing(from) {
                if !edge.active {
                    continue;
                }
                if edge.to == END_MARKER {
                    if Some(from) == last_output {
                        let signals = [
                            0.5,
                            0.5,
                            edge.success_rate(),
                            0.0,
                        ];
                        end_coherence = end_coherence.max(blend(&signals));
                    }
                    continue;
                }
                if (edge.to as usize) >= BYTE_SYMBOLS {
                    continue;
                }
                let to = edge.to as u8;

                let pattern_signal = {
                    let s = support[to as usize];
                    s / (s + 1.0)
                };
                let context_signal = if continuation == Some(to) {
                    1.0
                } else if in_input[to as usize] {
                    0.5
                } else {
                    0.2
                };
                let sequence_signal = edge.success_rate();
                let generalization_signal = if generalized[to as usize] { 1.0 } else { 0.0 };

                let coherence = blend(&[
                    pattern_signal,
                    context_signal,
                    sequence_signal,
                    generalization_signal,
                ]);
                let multiplier = if coherence > 0.5 {
                    1.0 + 2.0 * (coherence - 0.5) * 2.0
                } else {
                    0.1 + 1.8 * coherence
                };

                let rel = self.edges.relative_weight(from, edge);
                let transfer = source_act * rel * 0.5 * multiplier;
                if transfer > 1.0e-4 {
                    transfers.push((to, transfer, from, coherence));
                }
            }
        }

        for &(to, transfer, from, _) in &transfers {
            self.nodes.receive(to, transfer, from);
        }

        // Selection: strongest node that is neither input echo (already
        // covered) nor a recent emission.
        let mut best: Option<(u8, f32)> = None;
        let mut second = 0.0f32;
        for (byte, node) in self.nodes.iter_existing() {
            if recent.contains(&byte) || in_input[byte as usize] {
                continue;
            }
            let score = node.activation * (1.0 - node.adaptation);
            if score <= 0.01 {
                continue;
            }
            match best {
                Some((_, b)) if score > b => {
                    second = b;
                    best = Some((byte, score));
                }
                Some((_, b)) => {
                    if score > second && score <= b {
                        second = score;
                    }
                }
                None => best = Some((byte, score)),
            }
        }

        match best {
            Some((byte, score)) => {
                if end_coherence > 0.5 && end_coherence > score {
                    return (
                        Selection::End,
                        (end_coherence - score) / (end_coherence + 1.0e-6),
                        StepContribution::default(),
                    );
                }
                let confidence = (score - second) / (score + 1.0e-6);
                let record = StepContribution {
                    position,
                    patterns: Vec::new(),
                    edges: transfers
                        .iter()
                        .filter(|(to, _, _, _)| *to == byte)
                        .map(|&(to, amount, from, _)| EdgeContribution {
                            from,
                            to: to as SymbolId,
                            amount,
                        })
                        .collect(),
                    total: score,
                };
                (Selection::Node(byte), confidence, record)
            }
            None => {
                if end_coherence > 0.5 {
                    (Selection::End, end_coherence, StepContribution::default())
                } else {
                    (Selection::NoSelection, 0.0, StepContribution::default())
                }
            }
        }
    }
}

/// Adaptive blend: agreement between the signals decides how much the
/// geometric mean (strict) outweighs the arithmetic mean (lenient).
fn blend(signals: &[f32; 4]) -> f32 {
    let arithmetic = signals.iter().sum::<f32>() / 4.0;
    let geometric = signals
        .iter()
        .map(|&s| s.max(SIGNAL_FLOOR))
        .product::<f32>()
        .powf(0.25);
    let variance = signals
        .iter()
        .map(|&s| (s - arithmetic).powi(2))
        .sum::<f32>()
        / 4.0;
    let agreement = (1.0 - variance * 4.0).clamp(0.0, 1.0);
    (agreement * geometric + (1.0 - agreement) * arithmetic).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GraphConfig, PropagationHead};
    use crate::graph::ByteGraph;

    fn coherent_graph() -> ByteGraph {
        let mut config = GraphConfig::default();
        config.propagation_head = PropagationHead::Coherence;
        ByteGraph::with_config(config)
    }

    #[test]
    fn test_blend_agreeing_signals() {
        let high = blend(&[0.9, 0.9, 0.9, 0.9]);
        let low = blend(&[0.1, 0.1, 0.1, 0.1]);
        assert!(high > 0.8);
        assert!(low < 0.2);
        // Disagreement pulls toward the arithmetic mean.
        let mixed = blend(&[1.0, 0.0, 1.0, 0.0]);
        assert!(mixed > 0.2 && mixed < 0.8);
    }

    #[test]
    fn test_coherence_head_runs_episodes() {
        let mut graph = coherent_graph();
        for _ in 0..5 {
            graph.run_episode(b"ab", Some(b"ab")).unwrap();
        }
        graph.run_episode(b"ab", None).unwrap();
        // The head is bounded and deterministic; output stays within caps.
        assert!(graph.output().len() <= graph.config().max_output_len);
    }

    #[test]
    fn test_coherence_head_deterministic() {
        let run = || {
            let mut graph = coherent_graph();
            for _ in 0..10 {
                graph.run_episode(b"ab", Some(b"abc")).unwrap();
            }
            graph.run_episode(b"ab", None).unwrap();
            graph.output().to_vec()
        };
        assert_eq!(run(), run());
    }
}

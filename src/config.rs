//! Graph configuration
//!
//! Everything here is observable behavior a host may want to pin down;
//! learning rates and thresholds are deliberately absent because the engine
//! derives them from system statistics at runtime.

use serde::{Deserialize, Serialize};

/// Which activation-transfer head drives each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropagationHead {
    /// Path-quality wave propagation: per-edge quality from information,
    /// pattern support, history coherence and predictive power.
    PathQuality,

    /// Fused coherence head: adaptive blend of pattern, context, sequence
    /// and generalization signals as a single transfer multiplier.
    Coherence,
}

/// Graph construction options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Permit antiparallel edge pairs (a→b and b→a). Hebbian creation
    /// canonicalizes direction either way; feedback and prediction
    /// materialization may still produce the reverse edge when allowed.
    pub allow_antiparallel: bool,

    /// Propagation head used by the episode loop.
    pub propagation_head: PropagationHead,

    /// Step cap for an episode with a target.
    pub max_steps_training: usize,

    /// Step cap for an episode without a target.
    pub max_steps_generation: usize,

    /// Emergency cap on emitted symbols per episode.
    pub max_output_len: usize,

    /// Input-history ring capacity (positional pattern detection window).
    pub input_history_len: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            allow_antiparallel: true,
            propagation_head: PropagationHead::PathQuality,
            max_steps_training: 1000,
            max_steps_generation: 200,
            max_output_len: 10_000,
            input_history_len: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GraphConfig::default();
        assert!(config.allow_antiparallel);
        assert_eq!(config.propagation_head, PropagationHead::PathQuality);
        assert_eq!(config.max_steps_training, 1000);
        assert_eq!(config.max_output_len, 10_000);
    }
}

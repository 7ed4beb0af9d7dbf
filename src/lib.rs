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

//! ByteGraph Core - Rust implementation
//!
//! A self-regulating, byte-level neural graph engine. It consumes opaque
//! byte sequences (input plus optional target), learns sequential and
//! positional associations among byte values, and emits a byte sequence in
//! response. Thresholds, rates and capacities derive from system
//! statistics at runtime; the fixed quantities are the 256-symbol byte
//! alphabet and two reserved sentinels (wildcard, end marker).
//!
//! # Architecture
//!
//! - NodeArray: fixed 256-slot table of byte nodes
//! - EdgeList: per-source weighted directed edges with usage/success
//! - PatternStore: arena of wildcard-capable patterns with predictions,
//!   hierarchy, associations, rules, and learned scalars
//! - SystemState: per-step aggregates, pressures, self-tuning knobs
//! - Propagation: pattern spreading + path-quality wave transfer (plus the
//!   fused coherence head behind a config toggle)
//! - Selector: four-component scoring with end-marker competition
//! - Learner: supervised + self-supervised feedback, pattern detection
//! - EpisodeDriver: the propagate/select/emit loop
//! - Persistence: line-oriented text brain format
//! - C ABI via `ffi` (cdylib)
//!
//! Single-threaded by design: one graph, one driver thread, no internal
//! locks, fully deterministic.

pub mod config;
pub mod edge;
pub mod error;
pub mod graph;
pub mod logging;
pub mod matcher;
pub mod node;
pub mod pattern;
pub mod pattern_store;
pub mod persistence;
pub mod selector;
pub mod symbols;
pub mod system_state;

mod coherence;
mod edge_propagation;
mod episode;
mod ffi;
mod learner;
mod pattern_propagation;

pub use config::{GraphConfig, PropagationHead};
pub use edge::{Edge, EdgeList};
pub use error::{EngineError, EngineResult};
pub use graph::{ByteGraph, EngineStats, PatternInfo};
pub use node::{Node, NodeArray};
pub use pattern::{Pattern, SelectionParams, TransferParams, CONTEXT_LEN};
pub use pattern_store::{PatternEdge, PatternStore};
pub use selector::{
    EdgeContribution, PatternContribution, Selection, StepContribution,
};
pub use symbols::{
    PatternId, SymbolId, BYTE_SYMBOLS, END_MARKER, PATTERN_NONE, WILDCARD,
};
pub use system_state::SystemState;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const VERSION_MAJOR: u8 = 0;
pub const VERSION_MINOR: u8 = 9;
pub const VERSION_PATCH: u8 = 0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.9.0");
    }
}

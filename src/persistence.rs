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

//! Brain persistence v1.0 - line-oriented text format
//!
//! Record kinds:
//!
//! ```text
//! # comment
//! state error_rate:<f> learning_rate:<f> pattern_count:<u>
//! pattern "<seq>" -> "<pred>" context:[c0,...,c15] strength:<f> utility:<f>
//! pat_edge <from_id> -> <to_id> weight:<f>
//! edge '<from>' -> '<to>' weight:<f>
//! ```
//!
//! Sequences use `_` for the wildcard; predictions use `\$` for the end
//! marker. Bytes outside printable ASCII (and the characters that would
//! collide with the syntax: quotes, backslash, underscore, dollar) are
//! written as `\xNN`. Unknown or malformed records are skipped on load.
//!
//! Only what is written here is restored; activations, firing memoization,
//! learned scalars, associations and rules come back as defaults. Partial
//! writes are not rolled back; hosts wanting atomicity should write to a
//! temporary path and rename.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::EngineResult;
use crate::graph::ByteGraph;
use crate::pattern::{Pattern, CONTEXT_LEN};
use crate::symbols::{PatternId, SymbolId, END_MARKER, WILDCARD};

/// Patterns below this strength are not worth persisting.
const MIN_PATTERN_STRENGTH: f32 = 0.01;
/// Predictions below this confidence are dropped from the file.
const MIN_PREDICTION_WEIGHT: f32 = 0.2;
/// Edges below this weight are dropped from the file.
const MIN_EDGE_WEIGHT: f32 = 0.1;
/// Utility restored into this many synthetic attempts on load.
const RESTORED_ATTEMPTS: u32 = 25;

impl ByteGraph {
    /// Persist the learned structure to a text file.
    pub fn save_brain<P: AsRef<Path>>(&self, path: P) -> EngineResult<()> {
        let file = File::create(path.as_ref())?;
        let mut out = BufWriter::new(file);

        writeln!(out, "# bytegraph brain v1")?;
        writeln!(
            out,
            "state error_rate:{:.6} learning_rate:{:.6} pattern_count:{}",
            self.state.error_rate,
            self.state.learning_rate,
            self.pattern_count()
        )?;

        // Saved-pattern id remapping: load assigns ids in file order.
        let mut remap: BTreeMap<PatternId, PatternId> = BTreeMap::new();
        for (id, p) in self.patterns.iter() {
            if !p.is_alive() || p.strength < MIN_PATTERN_STRENGTH {
                continue;
            }
            let new_id = remap.len() as PatternId;
            remap.insert(id, new_id);

            let seq: String = p.sequence.iter().map(|&s| encode_symbol(s)).collect();
            let preds: String = p
                .predicted_nodes
                .iter()
                .zip(p.prediction_weights.iter())
                .filter(|(_, &w)| w >= MIN_PREDICTION_WEIGHT)
                .map(|(&s, _)| encode_symbol(s))
                .collect();
            let context: Vec<String> = p
                .context_vector
                .iter()
                .map(|c| format!("{:.4}", c))
                .collect();
            let utility = if p.prediction_attempts > 0 {
                (p.prediction_successes as f32 / p.prediction_attempts as f32).min(1.0)
            } else {
                0.0
            };
            writeln!(
                out,
                "pattern \"{}\" -> \"{}\" context:[{}] strength:{:.6} utility:{:.6}",
                seq,
                preds,
                context.join(","),
                p.strength,
                utility
            )?;
        }

        for (from, edge) in self.patterns.all_pattern_edges() {
            let (from_new, to_new) = match (remap.get(&from), remap.get(&edge.to)) {
                (Some(&f), Some(&t)) => (f, t),
                _ => continue,
            };
            if edge.weight < MIN_EDGE_WEIGHT {
                continue;
            }
            writeln!(out, "pat_edge {} -> {} weight:{:.6}", from_new, to_new, edge.weight)?;
        }

        for (from, edge) in self.edges.iter_active() {
            if edge.weight < MIN_EDGE_WEIGHT {
                continue;
            }
            writeln!(
                out,
                "edge '{}' -> '{}' weight:{:.6}",
                encode_symbol(from as SymbolId),
                encode_symbol(edge.to),
                edge.weight
            )?;
        }

        out.flush()?;
        info!(patterns = remap.len(), "brain saved");
        Ok(())
    }

    /// Rebuild a graph from a saved brain file. Unknown and malformed
    /// records are skipped; everything not in the file starts at defaults.
    pub fn load_brain<P: AsRef<Path>>(path: P) -> EngineResult<ByteGraph> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);
        let mut graph = ByteGraph::new();
        let mut skipped = 0usize;

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let ok = if let Some(rest) = line.strip_prefix("state ") {
                parse_state(&mut graph, rest)
            } else if let Some(rest) = line.strip_prefix("pattern ") {
                parse_pattern(&mut graph, rest)
            } else if let Some(rest) = line.strip_prefix("pat_edge ") {
                parse_pattern_edge(&mut graph, rest)
            } else if let Some(rest) = line.strip_prefix("edge ") {
                parse_edge(&mut graph, rest)
            } else {
                false
            };
            if !ok {
                skipped += 1;
                debug!(line, "skipped record");
            }
        }

        if skipped > 0 {
            warn!(skipped, "brain load skipped records");
        }
        info!(patterns = graph.pattern_count(), "brain loaded");
        Ok(graph)
    }
}

/// Encode one symbol for a quoted string.
fn encode_symbol(symbol: SymbolId) -> String {
    match symbol {
        WILDCARD => "_".to_string(),
        END_MARKER => "\\$".to_string(),
        s => {
            let b = s as u8;
            match b {
                b'_' | b'$' | b'"' | b'\'' | b'\\' => format!("\\x{:02x}", b),
                0x21..=0x7e => (b as char).to_string(),
                _ => format!("\\x{:02x}", b),
            }
        }
    }
}

/// Decode a quoted string body into symbols. Returns None on malformed
/// escapes.
fn decode_symbols(body: &str) -> Option<Vec<SymbolId>> {
    let bytes = body.as_bytes();
    let mut symbols = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                symbols.push(WILDCARD);
                i += 1;
            }
            b'\\' => {
                if i + 1 >= bytes.len() {
                    return None;
                }
                match bytes[i + 1] {
                    b'$' => {
                        symbols.push(END_MARKER);
                        i += 2;
                    }
                    b'x' => {
                        if i + 3 >= bytes.len() {
                            return None;
                        }
                        let hex = std::str::from_utf8(&bytes[i + 2..i + 4]).ok()?;
                        let value = u8::from_str_radix(hex, 16).ok()?;
                        symbols.push(value as SymbolId);
                        i += 4;
                    }
                    _ => return None,
                }
            }
            b => {
                symbols.push(b as SymbolId);
                i += 1;
            }
        }
    }
    Some(symbols)
}

/// Pull a `key:value` float out of a whitespace-separated record.
fn field_f32(rest: &str, key: &str) -> Option<f32> {
    rest.split_whitespace()
        .find_map(|tok| tok.strip_prefix(key))
        .and_then(|v| v.strip_prefix(':'))
        .and_then(|v| v.parse::<f32>().ok())
}

fn parse_state(graph: &mut ByteGraph, rest: &str) -> bool {
    let error_rate = match field_f32(rest, "error_rate") {
        Some(v) => v,
        None => return false,
    };
    let learning_rate = field_f32(rest, "learning_rate").unwrap_or(0.1);
    graph.state.error_rate = error_rate.clamp(0.0, 1.0);
    graph.state.learning_rate = learning_rate.clamp(0.02, 0.5);
    true
}

/// `"<seq>" -> "<pred>" context:[...] strength:<f> utility:<f>`
fn parse_pattern(graph: &mut ByteGraph, rest: &str) -> bool {
    let (seq_body, rest) = match quoted(rest, '"') {
        Some(v) => v,
        None => return false,
    };
    let rest = match rest.trim_start().strip_prefix("->") {
        Some(r) => r.trim_start(),
        None => return false,
    };
    let (pred_body, rest) = match quoted(rest, '"') {
        Some(v) => v,
        None => return false,
    };

    let sequence = match decode_symbols(seq_body) {
        Some(s) if !s.is_empty() => s,
        _ => return false,
    };
    if sequence.iter().any(|&s| s == END_MARKER) {
        return false;
    }
    let predictions = match decode_symbols(pred_body) {
        Some(p) => p,
        None => return false,
    };

    let strength = match field_f32(rest, "strength") {
        Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
        _ => return false,
    };
    let utility = field_f32(rest, "utility").unwrap_or(0.0).clamp(0.0, 1.0);

    let mut context = [0.0f32; CONTEXT_LEN];
    if let Some(start) = rest.find("context:[") {
        if let Some(end) = rest[start..].find(']') {
            let body = &rest[start + "context:[".len()..start + end];
            for (i, tok) in body.split(',').take(CONTEXT_LEN).enumerate() {
                context[i] = tok.trim().parse::<f32>().unwrap_or(0.0);
            }
        }
    }

    let mut pattern = Pattern::new(&sequence, strength, 0, context);
    for &symbol in &predictions {
        pattern.upsert_prediction(symbol, 0.0, 0.5);
    }
    pattern.prediction_attempts = RESTORED_ATTEMPTS;
    pattern.prediction_successes = (RESTORED_ATTEMPTS as f32 * utility).round() as u32;

    let id = graph.patterns.insert(pattern);
    for &symbol in &predictions {
        graph.patterns.index_prediction(id, symbol);
    }
    true
}

/// `<from_id> -> <to_id> weight:<f>`
fn parse_pattern_edge(graph: &mut ByteGraph, rest: &str) -> bool {
    let mut parts = rest.split_whitespace();
    let from = match parts.next().and_then(|v| v.parse::<PatternId>().ok()) {
        Some(v) => v,
        None => return false,
    };
    if parts.next() != Some("->") {
        return false;
    }
    let to = match parts.next().and_then(|v| v.parse::<PatternId>().ok()) {
        Some(v) => v,
        None => return false,
    };
    let weight = match field_f32(rest, "weight") {
        Some(v) if v.is_finite() && v >= 0.0 => v,
        _ => return false,
    };
    let count = graph.patterns.len() as PatternId;
    if from >= count || to >= count {
        return false;
    }
    graph.patterns.link_patterns(from, to, weight - 0.5);
    true
}

/// `'<from>' -> '<to>' weight:<f>`
fn parse_edge(graph: &mut ByteGraph, rest: &str) -> bool {
    let (from_body, rest2) = match quoted(rest, '\'') {
        Some(v) => v,
        None => return false,
    };
    let rest2 = match rest2.trim_start().strip_prefix("->") {
        Some(r) => r.trim_start(),
        None => return false,
    };
    let (to_body, rest2) = match quoted(rest2, '\'') {
        Some(v) => v,
        None => return false,
    };

    let from = match decode_symbols(from_body).as_deref() {
        Some([f]) if (*f as usize) < 256 => *f as u8,
        _ => return false,
    };
    let to = match decode_symbols(to_body).as_deref() {
        Some([t]) if *t != WILDCARD => *t,
        _ => return false,
    };
    let weight = match field_f32(rest2, "weight") {
        Some(v) if v.is_finite() && v >= 0.0 => v,
        _ => return false,
    };
    graph.edges.restore(from, to, weight)
}

/// Split off a quoted segment: returns (body, remainder after close quote).
fn quoted(s: &str, quote: char) -> Option<(&str, &str)> {
    let s = s.trim_start();
    let rest = s.strip_prefix(quote)?;
    let end = rest.find(quote)?;
    Some((&rest[..end], &rest[end + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_encoding_roundtrip() {
        for symbol in [b'a' as SymbolId, 0x00, 0x0a, b'_' as SymbolId, b'$' as SymbolId, b'\'' as SymbolId, WILDCARD, END_MARKER] {
            let encoded = encode_symbol(symbol);
            let decoded = decode_symbols(&encoded).unwrap();
            assert_eq!(decoded, vec![symbol], "roundtrip for {:?}", encoded);
        }
    }

    #[test]
    fn test_wildcard_underscore_disambiguation() {
        // A literal underscore byte must not come back as a wildcard.
        let encoded = encode_symbol(b'_' as SymbolId);
        assert_eq!(encoded, "\\x5f");
        assert_eq!(decode_symbols("_").unwrap(), vec![WILDCARD]);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let mut graph = ByteGraph::new();
        assert!(!parse_pattern(&mut graph, "no quotes at all"));
        assert!(!parse_edge(&mut graph, "'a' -> "));
        assert!(!parse_state(&mut graph, "garbage"));
        assert!(!parse_pattern_edge(&mut graph, "7 -> 9 weight:0.5"));
        assert_eq!(graph.pattern_count(), 0);
    }

    #[test]
    fn test_parse_pattern_line() {
        let mut graph = ByteGraph::new();
        let ok = parse_pattern(
            &mut graph,
            "\"_at\" -> \"s\\$\" context:[0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0] strength:0.8 utility:0.9",
        );
        assert!(ok);
        let p = graph.patterns().get(0).unwrap();
        assert_eq!(p.sequence.as_slice(), &[WILDCARD, b'a' as SymbolId, b't' as SymbolId]);
        assert!(p.predicted_nodes.contains(&(b's' as SymbolId)));
        assert!(p.predicted_nodes.contains(&END_MARKER));
        assert!((p.strength - 0.8).abs() < 1e-5);
        assert!(p.success_rate() > 0.8);
    }

    #[test]
    fn test_parse_edge_line() {
        let mut graph = ByteGraph::new();
        assert!(parse_edge(&mut graph, "'s' -> '\\$' weight:1.5"));
        let edge = graph.edges().get(b's', END_MARKER).unwrap();
        assert!((edge.weight - 1.5).abs() < 1e-5);
    }
}

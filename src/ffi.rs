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

//! C ABI v1.0 - the canonical host surface
//!
//! Every function is null-safe: a null graph or buffer is an early return
//! with an error status, never undefined behavior on our side. The output
//! buffer returned by `bytegraph_get_output` is owned by the graph and
//! valid until the next `bytegraph_run_episode` or `bytegraph_destroy`.
//!
//! Input is `*const u8`, so the reserved symbols (256, 257) cannot occur
//! in it by construction.

use std::ffi::CStr;
use std::os::raw::c_char;

use crate::graph::ByteGraph;
use crate::pattern::CONTEXT_LEN;
use crate::symbols::SymbolId;

const STATUS_OK: i32 = 0;
const STATUS_ERR: i32 = -1;

/// Create a fresh graph. Returns null only if allocation fails.
#[no_mangle]
pub extern "C" fn bytegraph_create() -> *mut ByteGraph {
    Box::into_raw(Box::new(ByteGraph::new()))
}

/// Destroy a graph created by `bytegraph_create` or `bytegraph_load_brain`.
///
/// # Safety
///
/// `graph` must be a pointer previously returned by this library and not
/// already destroyed.
#[no_mangle]
pub unsafe extern "C" fn bytegraph_destroy(graph: *mut ByteGraph) {
    if !graph.is_null() {
        drop(Box::from_raw(graph));
    }
}

/// # Safety
///
/// `graph` must be a live graph pointer from this library.
#[no_mangle]
pub unsafe extern "C" fn bytegraph_set_input_port(graph: *mut ByteGraph, port: u32) {
    if let Some(g) = graph.as_mut() {
        g.set_input_port(port);
    }
}

/// # Safety
///
/// `graph` must be a live graph pointer from this library.
#[no_mangle]
pub unsafe extern "C" fn bytegraph_set_output_port(graph: *mut ByteGraph, port: u32) {
    if let Some(g) = graph.as_mut() {
        g.set_output_port(port);
    }
}

/// Replace the ambient context vector with 16 floats.
///
/// # Safety
///
/// `graph` must be live; `context` must point at 16 readable floats.
#[no_mangle]
pub unsafe extern "C" fn bytegraph_set_context(graph: *mut ByteGraph, context: *const f32) {
    let g = match graph.as_mut() {
        Some(g) => g,
        None => return,
    };
    if context.is_null() {
        return;
    }
    let mut ctx = [0.0f32; CONTEXT_LEN];
    ctx.copy_from_slice(std::slice::from_raw_parts(context, CONTEXT_LEN));
    g.set_context(ctx);
}

/// Run one episode. `target` may be null for generation mode.
/// Returns 0 on success, -1 on invalid arguments.
///
/// # Safety
///
/// `graph` must be live; `input`/`target` must point at `input_len` /
/// `target_len` readable bytes when non-null.
#[no_mangle]
pub unsafe extern "C" fn bytegraph_run_episode(
    graph: *mut ByteGraph,
    input: *const u8,
    input_len: usize,
    target: *const u8,
    target_len: usize,
) -> i32 {
    let g = match graph.as_mut() {
        Some(g) => g,
        None => return STATUS_ERR,
    };
    if input.is_null() && input_len > 0 {
        return STATUS_ERR;
    }
    let input_slice = if input_len == 0 {
        &[][..]
    } else {
        std::slice::from_raw_parts(input, input_len)
    };
    let target_slice = if target.is_null() {
        None
    } else {
        Some(std::slice::from_raw_parts(target, target_len))
    };
    match g.run_episode(input_slice, target_slice) {
        Ok(()) => STATUS_OK,
        Err(_) => STATUS_ERR,
    }
}

/// Current output buffer; `len_out` receives its length. The buffer is
/// owned by the graph.
///
/// # Safety
///
/// `graph` must be live; `len_out` must be writable when non-null.
#[no_mangle]
pub unsafe extern "C" fn bytegraph_get_output(
    graph: *const ByteGraph,
    len_out: *mut usize,
) -> *const u8 {
    let g = match graph.as_ref() {
        Some(g) => g,
        None => return std::ptr::null(),
    };
    if !len_out.is_null() {
        *len_out = g.output().len();
    }
    g.output().as_ptr()
}

/// # Safety
///
/// `graph` must be live.
#[no_mangle]
pub unsafe extern "C" fn bytegraph_get_error_rate(graph: *const ByteGraph) -> f32 {
    graph.as_ref().map(|g| g.error_rate()).unwrap_or(1.0)
}

/// # Safety
///
/// `graph` must be live.
#[no_mangle]
pub unsafe extern "C" fn bytegraph_get_pattern_count(graph: *const ByteGraph) -> u32 {
    graph.as_ref().map(|g| g.pattern_count()).unwrap_or(0)
}

/// Weight of the edge `from → to`; `to` may be 257 for the end marker.
///
/// # Safety
///
/// `graph` must be live.
#[no_mangle]
pub unsafe extern "C" fn bytegraph_get_edge_weight(
    graph: *const ByteGraph,
    from: u32,
    to: u32,
) -> f32 {
    let g = match graph.as_ref() {
        Some(g) => g,
        None => return 0.0,
    };
    if from > 255 || to > 257 {
        return 0.0;
    }
    g.edge_weight(from as u8, to as SymbolId)
}

/// Copy a pattern's sequence into `seq_out` (capacity symbols) and its
/// strength into `strength_out`. Returns 0 on success.
///
/// # Safety
///
/// `graph` must be live; out-pointers must be writable as described.
#[no_mangle]
pub unsafe extern "C" fn bytegraph_get_pattern_info(
    graph: *const ByteGraph,
    id: u32,
    seq_out: *mut u16,
    capacity: usize,
    len_out: *mut usize,
    strength_out: *mut f32,
) -> i32 {
    let g = match graph.as_ref() {
        Some(g) => g,
        None => return STATUS_ERR,
    };
    let info = match g.pattern_info(id) {
        Some(i) => i,
        None => return STATUS_ERR,
    };
    if !len_out.is_null() {
        *len_out = info.sequence.len();
    }
    if !strength_out.is_null() {
        *strength_out = info.strength;
    }
    if !seq_out.is_null() {
        let n = info.sequence.len().min(capacity);
        std::ptr::copy_nonoverlapping(info.sequence.as_ptr(), seq_out, n);
    }
    STATUS_OK
}

/// Copy a pattern's node predictions into parallel arrays. Returns 0 on
/// success.
///
/// # Safety
///
/// `graph` must be live; out-pointers must be writable as described.
#[no_mangle]
pub unsafe extern "C" fn bytegraph_get_pattern_predictions(
    graph: *const ByteGraph,
    id: u32,
    nodes_out: *mut u16,
    weights_out: *mut f32,
    capacity: usize,
    count_out: *mut usize,
) -> i32 {
    let g = match graph.as_ref() {
        Some(g) => g,
        None => return STATUS_ERR,
    };
    let (nodes, weights) = match g.pattern_predictions(id) {
        Some(p) => p,
        None => return STATUS_ERR,
    };
    if !count_out.is_null() {
        *count_out = nodes.len();
    }
    let n = nodes.len().min(capacity);
    if !nodes_out.is_null() {
        std::ptr::copy_nonoverlapping(nodes.as_ptr(), nodes_out, n);
    }
    if !weights_out.is_null() {
        std::ptr::copy_nonoverlapping(weights.as_ptr(), weights_out, n);
    }
    STATUS_OK
}

/// Universal negative signal without a target.
///
/// # Safety
///
/// `graph` must be live.
#[no_mangle]
pub unsafe extern "C" fn bytegraph_apply_error_feedback(graph: *mut ByteGraph, magnitude: f32) {
    if let Some(g) = graph.as_mut() {
        g.apply_error_feedback(magnitude);
    }
}

/// Persist the graph; returns 0 on success, non-zero on I/O failure.
///
/// # Safety
///
/// `graph` must be live; `path` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn bytegraph_save_brain(
    graph: *const ByteGraph,
    path: *const c_char,
) -> i32 {
    let g = match graph.as_ref() {
        Some(g) => g,
        None => return STATUS_ERR,
    };
    if path.is_null() {
        return STATUS_ERR;
    }
    let path = match CStr::from_ptr(path).to_str() {
        Ok(p) => p,
        Err(_) => return STATUS_ERR,
    };
    match g.save_brain(path) {
        Ok(()) => STATUS_OK,
        Err(_) => STATUS_ERR,
    }
}

/// Load a brain file; returns null on failure.
///
/// # Safety
///
/// `path` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn bytegraph_load_brain(path: *const c_char) -> *mut ByteGraph {
    if path.is_null() {
        return std::ptr::null_mut();
    }
    let path = match CStr::from_ptr(path).to_str() {
        Ok(p) => p,
        Err(_) => return std::ptr::null_mut(),
    };
    match ByteGraph::load_brain(path) {
        Ok(g) => Box::into_raw(Box::new(g)),
        Err(_) => std::ptr::null_mut(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_run_destroy() {
        let graph = bytegraph_create();
        assert!(!graph.is_null());
        unsafe {
            let input = b"cat";
            let status =
                bytegraph_run_episode(graph, input.as_ptr(), input.len(), std::ptr::null(), 0);
            assert_eq!(status, STATUS_OK);

            let mut len = 0usize;
            let out = bytegraph_get_output(graph, &mut len);
            assert!(!out.is_null());

            bytegraph_destroy(graph);
        }
    }

    #[test]
    fn test_null_safety() {
        unsafe {
            assert_eq!(
                bytegraph_run_episode(std::ptr::null_mut(), std::ptr::null(), 0, std::ptr::null(), 0),
                STATUS_ERR
            );
            assert_eq!(bytegraph_get_pattern_count(std::ptr::null()), 0);
            assert_eq!(bytegraph_get_error_rate(std::ptr::null()), 1.0);
            assert!(bytegraph_load_brain(std::ptr::null()).is_null());
            bytegraph_destroy(std::ptr::null_mut());
        }
    }

    #[test]
    fn test_empty_input_with_target_is_invalid() {
        let graph = bytegraph_create();
        unsafe {
            let target = b"x";
            let status =
                bytegraph_run_episode(graph, std::ptr::null(), 0, target.as_ptr(), target.len());
            assert_eq!(status, STATUS_ERR);
            bytegraph_destroy(graph);
        }
    }
}

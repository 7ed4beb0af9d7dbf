//! Engine error taxonomy
//!
//! The core recovers internally from numeric degeneration (NaN/overflow
//! guards) and from degenerate selection (the episode just ends), so the
//! public surface only reports conditions the host must act on.

use thiserror::Error;

/// Errors surfaced by the public API.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Null buffers, zero-length input where a target is provided.
    /// Graph state is unchanged when this is returned.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Allocation failure during array growth. Fatal to the graph lifetime.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    /// save_brain / load_brain I/O failure. Partial writes are not rolled
    /// back; the host is responsible for atomic rename on success.
    #[error("persistence failure: {0}")]
    Persistence(#[from] std::io::Error),

    /// load_brain saw a file with no usable records at all.
    #[error("brain file unreadable: {0}")]
    BrainFormat(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = EngineError::InvalidArgument("empty input with target");
        assert!(e.to_string().contains("empty input"));
    }
}

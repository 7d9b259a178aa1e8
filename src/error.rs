use thiserror::Error;

/// Failures surfaced by the reference and call-path engine.
///
/// Heuristic misses (no match, ambiguity, unresolved targets) are not errors;
/// they come back as empty or partial results.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("symbol not found: {name}")]
    SymbolNotFound { name: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl TraceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TraceError::SymbolNotFound { .. })
    }
}

pub type TraceResult<T> = std::result::Result<T, TraceError>;

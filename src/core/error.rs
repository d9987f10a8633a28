use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Two inputs that must be index-aligned have different lengths.
    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Covariance row whose length differs from the number of rows.
    #[error("covariance matrix is not square: row {row} has {actual} entries, expected {expected}")]
    NonSquareCovariance {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// The computation is undefined for the supplied inputs (e.g. zero risk).
    #[error("degenerate input in {context}")]
    Degenerate { context: &'static str },
}

impl EngineError {
    pub fn dimension_mismatch(context: &'static str, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            context,
            expected,
            actual,
        }
    }

    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

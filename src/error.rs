//! Error types for HMM construction, inference and training.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HmmError {
    /// Malformed dimensions or an observation index outside the alphabet.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An observation label that is not part of the configured symbol alphabet.
    #[error("unknown symbol: {0:?}")]
    UnknownSymbol(String),

    /// The sequence has zero probability under the current parameters, or a
    /// re-estimation denominator vanished.
    #[error("degenerate sequence: {0}")]
    DegenerateSequence(String),

    /// Floating point underflow or non-finite values in the recursions.
    #[error("numeric instability: {0}")]
    NumericInstability(String),
}

pub type Result<T> = std::result::Result<T, HmmError>;

//! Errors surfaced while resolving a reporting round.
//!
//! Every variant is fatal to the round that produced it.  Stages return the
//! first error they hit and never substitute a default value, so a failed
//! round leaves no partially-updated reputation behind.

use thiserror::Error;

/// Errors produced by the fixed-point core and the resolution pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    /// An event column has no reports carrying reputation.
    #[error("event {event} has no usable reports")]
    InsufficientData {
        /// Zero-based event column.
        event: usize,
    },
    /// The reputation-weighted covariance collapsed the loading vector to zero.
    #[error("weighted covariance is degenerate (iteration {iteration})")]
    DegenerateCovariance {
        /// Solver iteration at which the zero vector appeared.
        iteration: u32,
    },
    /// Smoothing would leave every reporter with zero weight.
    #[error("reputation collapsed to zero for every reporter")]
    NegativeReputationCollapse,
    /// A scaled-integer result does not fit the representation.
    #[error("fixed-point arithmetic overflow")]
    ArithmeticOverflow,
    /// Division by a scaled zero.
    #[error("fixed-point division by zero")]
    DivisionByZero,
    /// Operation outside its mathematical domain (square root of a negative).
    #[error("fixed-point domain error")]
    DomainError,
    /// Round or configuration failed validation before any stage ran.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// File-system failure while loading a round or configuration.
    #[error("I/O error: {0}")]
    Io(String),
    /// A round or configuration file could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ConsensusError>;

//! Error types for model and distribution operations.

use thiserror::Error;

/// Errors raised by the MDP collaborator interfaces.
///
/// Distribution errors are raised where a distribution is built, so a
/// malformed distribution never reaches the sampling loop.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MdpError {
    /// Distribution has no entries.
    #[error("distribution cannot be empty")]
    EmptyDistribution,

    /// Negative probability encountered.
    #[error("negative probability {probability} encountered")]
    NegativeProbability { probability: f64 },

    /// Probabilities don't sum to 1.
    #[error("distribution not normalized: sum = {sum} (expected 1.0)")]
    NotNormalized { sum: f64 },

    /// All weights are zero (can't normalize).
    #[error("cannot normalize: all weights are zero")]
    ZeroWeights,

    /// Temperature for a Boltzmann distribution must be positive.
    #[error("temperature must be positive, got {temperature}")]
    InvalidTemperature { temperature: f64 },

    /// A softmax preference is NaN.
    #[error("preference {value} is not a number")]
    InvalidPreference { value: f64 },

    /// The model has no outcomes for this state-action pair.
    #[error("no transitions defined for action '{action}'")]
    NoTransitions { action: String },

    /// Action is not executable in the current state.
    #[error("invalid action '{action}' for state")]
    InvalidAction { action: String },

    /// Environment is in a terminal state.
    #[error("environment is in terminal state")]
    TerminalState,
}

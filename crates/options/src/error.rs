//! Error types for policy, option and rollout operations.

use semimdp_core::MdpError;
use thiserror::Error;

/// Errors that can occur while sampling, executing or planning over options.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanningError {
    /// The policy has no opinion for the queried state.
    #[error("policy is undefined for the provided state")]
    UndefinedPolicy,

    /// An action kind that can't be handled where it appeared.
    #[error("unsupported action '{action}' in {context}")]
    UnsupportedAction {
        action: String,
        context: &'static str,
    },

    /// Option was initiated in a state outside its initiation set.
    #[error("option '{option}' is not applicable in the provided state")]
    NotApplicable { option: String },

    /// Expectation search needs termination and selection to depend only on state.
    #[error("option '{option}' is not Markov; its transition model cannot be derived")]
    NonMarkovOption { option: String },

    /// Configuration value out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Model, environment or distribution failure.
    #[error(transparent)]
    Mdp(#[from] MdpError),
}

//! # Core - MDP Collaborator Interfaces
//!
//! This crate provides the pieces that planners and policies consume but do
//! not own:
//!
//! - **Distributions**: Normalized action distributions and Boltzmann weights
//! - **State hashing**: Pluggable value-equality keys for memoisation
//! - **Models**: Actions, enumerable transition dynamics, reward and terminal functions
//! - **Environments**: Stateful worlds, including a model-backed simulator
//! - **Errors**: Malformed distributions and invalid executions
//!
//! ## Example
//!
//! ```rust
//! use semimdp_core::{ActionDistribution, FnModel, TransitionModel, TransitionProb};
//!
//! // A coin-flip world: action 0 leaves the state, action 1 flips it
//! let model = FnModel::new(|s: &bool, a: &usize| match a {
//!     0 => vec![TransitionProb::certain(*s)],
//!     _ => vec![TransitionProb::new(!*s, 0.5), TransitionProb::new(*s, 0.5)],
//! });
//! assert_eq!(model.transitions(&true, &1).unwrap().len(), 2);
//!
//! let pi = ActionDistribution::new(vec![(0usize, 0.5), (1, 0.5)]).unwrap();
//! assert_eq!(pi.probability_of(&1), 0.5);
//! ```

pub mod distribution;
pub mod env;
pub mod error;
pub mod model;
pub mod state;

pub use distribution::{boltzmann, ActionDistribution, ActionProb};
pub use env::{Environment, EnvironmentOutcome, SimulatedEnvironment};
pub use error::MdpError;
pub use model::{
    Action, FnModel, NeverTerminal, RewardFunction, TerminalFunction, TransitionModel,
    TransitionProb,
};
pub use state::{FnHasher, StateHasher, ValueHasher};

/// Tolerance for probability comparisons.
pub const PROB_TOLERANCE: f64 = 1e-6;

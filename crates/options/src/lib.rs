//! # Options - Temporally Extended Actions
//!
//! This crate layers semi-MDP planning machinery over the interfaces in
//! `semimdp-core`:
//! - Policies expose full action distributions and sample with an injected RNG
//! - Options are sub-policies with initiation sets and termination conditions
//! - Expectation search derives an option's transition model for planners
//!
//! ## Core Components
//!
//! - [`Policy`]: Maps states to action distributions (`State -> [(Act, p)]`)
//! - [`TemporalOption`]: Initiation, termination, and one-step selection
//! - [`ExpectationSearch`]: `(option, state) -> [(State', discounted mass)] + E[reward]`
//! - [`evaluate()`]: Follows a policy, running options and recording an [`Episode`]
//!
//! ## Example
//!
//! ```rust
//! use semimdp_core::{FnModel, TransitionProb, ValueHasher};
//! use semimdp_options::{
//!     ActionKind, ExpectationSearch, FnPolicy, PolicyOption, SearchConfig, Termination,
//! };
//!
//! // Walk right along a line; the option stops at 3
//! let model = FnModel::new(|s: &i32, _a: &&'static str| vec![TransitionProb::certain(s + 1)]);
//! let reward = |_s: &i32, _a: &&'static str, _n: &i32| -1.0;
//! let to_three = PolicyOption::new(
//!     "toThree",
//!     FnPolicy::new(|_s: &i32| Some(ActionKind::Primitive("right"))),
//!     Termination::states(|s: &i32| *s == 3),
//! );
//!
//! let config = SearchConfig::default().with_discount(1.0);
//! let mut search = ExpectationSearch::new(model, reward, ValueHasher, config).unwrap();
//! let expectation = search.compute_transitions(&to_three, &0).unwrap();
//!
//! assert_eq!(expectation.transitions[0].state, 3);
//! assert_eq!(expectation.expected_reward, -3.0);
//! ```
//!
//! ## Semi-MDP View
//!
//! ```text
//!          ┌──────────┐   primitive   ┌──────────┐
//!  State ─▶│  Policy  │──────────────▶│  World   │─▶ (State', r)
//!          └──────────┘               └──────────┘
//!               │ option                   ▲
//!               ▼                          │
//!          ┌──────────┐   primitives       │
//!          │  Option  │────────────────────┘ until β fires
//!          └──────────┘
//! ```

pub mod action;
mod error;
pub mod execution;
pub mod expectation;
pub mod option;
pub mod policy;
pub mod rollout;

pub use action::{ActionKind, AnnotatedAction, SharedOption};
pub use error::PlanningError;
pub use execution::{
    execute_option, EnvironmentWorld, ModelWorld, OptionOutcome, StepRecord, TerminationCause,
    World,
};
pub use expectation::{ExpectationSearch, OptionExpectation, SearchConfig, SearchStats};
pub use option::{
    ExecutionContext, MacroAction, PolicyOption, PrimitiveOption, RewardTracked, TemporalOption,
    Termination,
};
pub use policy::{
    BoltzmannPolicy, CachedPolicy, DomainMappedPolicy, EpsilonGreedyPolicy, FnPolicy,
    GreedyPolicy, Policy, PrimitivePolicy, QFunction, RandomPolicy, StochasticFnPolicy, TieBreak,
};
pub use rollout::{
    evaluate, evaluate_batch, evaluate_in_environment, Episode, RolloutConfig, RolloutStats, Step,
};

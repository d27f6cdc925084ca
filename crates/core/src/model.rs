//! World dynamics: actions, transition models, reward and terminal functions.
//!
//! A model defines how the world evolves in response to actions:
//!
//! ```text
//!        ┌──────────┐
//!  Act ─▶│  Model   │─▶ [(State', p), ...]
//!        │          │
//! State ─▶│          │
//!        └──────────┘
//! ```
//!
//! Rewards and terminal conditions are separate functions so the same
//! dynamics can be planned over with different objectives.

use std::fmt::Debug;

use rand::{Rng, RngCore};

use crate::error::MdpError;

/// A primitive action that can be executed in a state.
///
/// Equality is by value; the name is used for display and for annotating
/// primitives executed on behalf of a temporally extended action.
pub trait Action: Clone + PartialEq + Debug {
    /// Human-readable name of the action.
    fn name(&self) -> String;
}

impl Action for usize {
    fn name(&self) -> String {
        self.to_string()
    }
}

impl Action for &'static str {
    fn name(&self) -> String {
        (*self).to_string()
    }
}

impl Action for String {
    fn name(&self) -> String {
        self.clone()
    }
}

/// One possible outcome of executing an action.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionProb<S> {
    /// The resulting state.
    pub state: S,
    /// Probability of reaching it.
    pub probability: f64,
}

impl<S> TransitionProb<S> {
    /// Create an outcome.
    pub fn new(state: S, probability: f64) -> Self {
        Self { state, probability }
    }

    /// An outcome that happens with certainty.
    pub fn certain(state: S) -> Self {
        Self::new(state, 1.0)
    }
}

/// Enumerable one-step dynamics.
///
/// Planners that perform explicit backups call [`transitions`]; simulators
/// call [`sample`], which by default draws from the enumerated outcomes.
///
/// [`transitions`]: TransitionModel::transitions
/// [`sample`]: TransitionModel::sample
pub trait TransitionModel<S, A: Action> {
    /// Every possible next state with its probability.
    fn transitions(&self, state: &S, action: &A) -> Result<Vec<TransitionProb<S>>, MdpError>;

    /// Draw a next state.
    fn sample(&self, state: &S, action: &A, rng: &mut dyn RngCore) -> Result<S, MdpError> {
        let mut outcomes = self.transitions(state, action)?;
        let roll: f64 = rng.gen();

        // The last positive outcome absorbs any rounding shortfall.
        let mut cumulative = 0.0;
        let mut chosen = None;
        for (i, outcome) in outcomes.iter().enumerate() {
            if outcome.probability <= 0.0 {
                continue;
            }
            cumulative += outcome.probability;
            chosen = Some(i);
            if roll < cumulative {
                break;
            }
        }

        let index = chosen.ok_or_else(|| MdpError::NoTransitions {
            action: action.name(),
        })?;
        Ok(outcomes.swap_remove(index).state)
    }
}

impl<S, A, M> TransitionModel<S, A> for &M
where
    A: Action,
    M: TransitionModel<S, A> + ?Sized,
{
    fn transitions(&self, state: &S, action: &A) -> Result<Vec<TransitionProb<S>>, MdpError> {
        (**self).transitions(state, action)
    }

    fn sample(&self, state: &S, action: &A, rng: &mut dyn RngCore) -> Result<S, MdpError> {
        (**self).sample(state, action, rng)
    }
}

/// A model defined by a function.
///
/// Wraps any `Fn(&State, &Act) -> Vec<TransitionProb<State>>` as a model.
///
/// ```rust
/// use semimdp_core::{FnModel, TransitionModel, TransitionProb};
///
/// // Walk right on a line, slipping in place 10% of the time
/// let model = FnModel::new(|s: &i32, _a: &usize| {
///     vec![
///         TransitionProb::new(s + 1, 0.9),
///         TransitionProb::new(*s, 0.1),
///     ]
/// });
/// assert_eq!(model.transitions(&0, &0).unwrap().len(), 2);
/// ```
pub struct FnModel<F> {
    f: F,
}

impl<F> FnModel<F> {
    /// Create a model from a transition function.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<S, A, F> TransitionModel<S, A> for FnModel<F>
where
    A: Action,
    F: Fn(&S, &A) -> Vec<TransitionProb<S>>,
{
    fn transitions(&self, state: &S, action: &A) -> Result<Vec<TransitionProb<S>>, MdpError> {
        let outcomes = (self.f)(state, action);
        if outcomes.is_empty() {
            return Err(MdpError::NoTransitions {
                action: action.name(),
            });
        }
        Ok(outcomes)
    }
}

/// Reward for a transition: `(state, action, next_state) -> r`.
pub trait RewardFunction<S, A> {
    /// The reward received for moving from `state` to `next` via `action`.
    fn reward(&self, state: &S, action: &A, next: &S) -> f64;
}

impl<S, A, F> RewardFunction<S, A> for F
where
    F: Fn(&S, &A, &S) -> f64,
{
    fn reward(&self, state: &S, action: &A, next: &S) -> f64 {
        self(state, action, next)
    }
}

/// Whether a state ends the episode.
pub trait TerminalFunction<S> {
    /// True when `state` is terminal.
    fn is_terminal(&self, state: &S) -> bool;
}

impl<S, F> TerminalFunction<S> for F
where
    F: Fn(&S) -> bool,
{
    fn is_terminal(&self, state: &S) -> bool {
        self(state)
    }
}

/// A terminal function that never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverTerminal;

impl<S> TerminalFunction<S> for NeverTerminal {
    fn is_terminal(&self, _state: &S) -> bool {
        false
    }
}

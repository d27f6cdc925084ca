//! Environments: stateful worlds that actions are executed in.
//!
//! Unlike a [`TransitionModel`], an environment owns its current state and
//! may have dynamics that differ from any model used for planning. Rollouts
//! against an environment observe outcomes instead of computing them.
//!
//! ```text
//!        ┌─────────────┐
//!  Act ─▶│ Environment │─▶ (Obs', Reward, Done)
//!        └─────────────┘
//! ```

use std::marker::PhantomData;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::trace;

use crate::error::MdpError;
use crate::model::{Action, RewardFunction, TerminalFunction, TransitionModel};

/// The observed result of executing an action.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentOutcome<S> {
    /// Observation after the action
    pub observation: S,
    /// Reward received
    pub reward: f64,
    /// Whether the environment is now in a terminal state
    pub done: bool,
}

/// A stateful world.
pub trait Environment {
    /// Observation type
    type State: Clone;
    /// Action type
    type Action: Action;

    /// The current observation.
    fn current_observation(&self) -> Self::State;

    /// Whether the environment is in a terminal state.
    fn is_in_terminal_state(&self) -> bool;

    /// Execute an action, advancing the environment.
    fn execute(
        &mut self,
        action: &Self::Action,
    ) -> Result<EnvironmentOutcome<Self::State>, MdpError>;

    /// Restart from the initial state.
    fn reset(&mut self);
}

/// An environment backed by a transition model.
///
/// Next states are sampled from the model with the environment's own
/// seeded RNG, rewards come from the reward function, and termination from
/// the terminal function.
pub struct SimulatedEnvironment<S, A, M, R, T> {
    model: M,
    reward: R,
    terminal: T,
    initial: S,
    current: S,
    rng: StdRng,
    _phantom: PhantomData<A>,
}

impl<S, A, M, R, T> SimulatedEnvironment<S, A, M, R, T>
where
    S: Clone,
    A: Action,
    M: TransitionModel<S, A>,
    R: RewardFunction<S, A>,
    T: TerminalFunction<S>,
{
    /// Create an environment starting in `initial`.
    pub fn new(model: M, reward: R, terminal: T, initial: S) -> Self {
        Self {
            model,
            reward,
            terminal,
            current: initial.clone(),
            initial,
            rng: StdRng::seed_from_u64(0),
            _phantom: PhantomData,
        }
    }

    /// Reseed the environment's RNG.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Move the environment to an arbitrary state.
    pub fn set_state(&mut self, state: S) {
        self.current = state;
    }
}

impl<S, A, M, R, T> Environment for SimulatedEnvironment<S, A, M, R, T>
where
    S: Clone,
    A: Action,
    M: TransitionModel<S, A>,
    R: RewardFunction<S, A>,
    T: TerminalFunction<S>,
{
    type State = S;
    type Action = A;

    fn current_observation(&self) -> S {
        self.current.clone()
    }

    fn is_in_terminal_state(&self) -> bool {
        self.terminal.is_terminal(&self.current)
    }

    fn execute(&mut self, action: &A) -> Result<EnvironmentOutcome<S>, MdpError> {
        if self.is_in_terminal_state() {
            return Err(MdpError::TerminalState);
        }

        let next = self.model.sample(&self.current, action, &mut self.rng)?;
        let reward = self.reward.reward(&self.current, action, &next);
        let done = self.terminal.is_terminal(&next);
        trace!(action = %action.name(), reward, done, "environment step");

        self.current = next.clone();
        Ok(EnvironmentOutcome {
            observation: next,
            reward,
            done,
        })
    }

    fn reset(&mut self) {
        self.current = self.initial.clone();
    }
}

//! Running options against a world.
//!
//! A [`World`] is anything that turns `(state, primitive)` into
//! `(next_state, reward)`: either a model sampled with the caller's RNG, or
//! a live [`Environment`]. [`execute_option`] drives an option through a
//! world until it or the surrounding MDP terminates.

use rand::{Rng, RngCore};
use semimdp_core::{Action, Environment, RewardFunction, TerminalFunction, TransitionModel};
use tracing::{debug, trace};

use crate::action::{ActionKind, AnnotatedAction};
use crate::error::PlanningError;
use crate::option::{ExecutionContext, TemporalOption};

/// Where primitive actions are carried out.
pub trait World<S, A> {
    /// Execute `action` in `state`, returning the next state and reward.
    fn step(&mut self, state: &S, action: &A, rng: &mut dyn RngCore)
        -> Result<(S, f64), PlanningError>;

    /// Whether `state` ends the episode.
    fn is_terminal(&self, state: &S) -> bool;
}

/// A world simulated from a transition model.
pub struct ModelWorld<'a, M, R, T> {
    model: &'a M,
    reward: &'a R,
    terminal: &'a T,
}

impl<'a, M, R, T> ModelWorld<'a, M, R, T> {
    pub fn new(model: &'a M, reward: &'a R, terminal: &'a T) -> Self {
        Self {
            model,
            reward,
            terminal,
        }
    }
}

impl<'a, S, A, M, R, T> World<S, A> for ModelWorld<'a, M, R, T>
where
    A: Action,
    M: TransitionModel<S, A>,
    R: RewardFunction<S, A>,
    T: TerminalFunction<S>,
{
    fn step(&mut self, state: &S, action: &A, rng: &mut dyn RngCore) -> Result<(S, f64), PlanningError> {
        let next = self.model.sample(state, action, rng)?;
        let reward = self.reward.reward(state, action, &next);
        Ok((next, reward))
    }

    fn is_terminal(&self, state: &S) -> bool {
        self.terminal.is_terminal(state)
    }
}

/// A world backed by a live environment.
///
/// The environment tracks its own state; the state passed to
/// [`World::step`] is only the caller's view of it.
pub struct EnvironmentWorld<'a, E> {
    env: &'a mut E,
}

impl<'a, E: Environment> EnvironmentWorld<'a, E> {
    pub fn new(env: &'a mut E) -> Self {
        Self { env }
    }
}

impl<'a, E: Environment> World<E::State, E::Action> for EnvironmentWorld<'a, E> {
    fn step(
        &mut self,
        _state: &E::State,
        action: &E::Action,
        _rng: &mut dyn RngCore,
    ) -> Result<(E::State, f64), PlanningError> {
        let outcome = self.env.execute(action)?;
        Ok((outcome.observation, outcome.reward))
    }

    fn is_terminal(&self, _state: &E::State) -> bool {
        self.env.is_in_terminal_state()
    }
}

/// Why an option execution stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCause {
    /// The option's own termination condition fired.
    Option,
    /// The surrounding MDP reached a terminal state.
    Mdp,
}

/// One primitive step taken during an option execution.
#[derive(Debug, Clone)]
pub struct StepRecord<S, A> {
    /// Name of the innermost option that chose the primitive.
    pub option: String,
    /// Index of the step within that option's execution.
    pub index: usize,
    pub state: S,
    pub action: A,
    pub reward: f64,
    pub next_state: S,
}

/// The result of running an option to termination.
#[derive(Debug, Clone)]
pub struct OptionOutcome<S> {
    /// State the option terminated in.
    pub state: S,
    /// Final bookkeeping: discounted return, γ^k and duration.
    pub context: ExecutionContext,
    pub cause: TerminationCause,
}

/// Run `option` from `state` until it terminates.
///
/// After every step the reward is booked first, then the surrounding MDP's
/// terminal condition is checked, then the option's termination
/// probability. The RNG is only drawn for termination when 0 < β < 1.
///
/// Options chosen by the option are run to completion as a single step of
/// the outer option; their primitives are booked into each enclosing
/// context with that context's own discount and tracked reward. `on_step`
/// sees every primitive with the world's reward, tagged with the innermost
/// option that chose it.
pub fn execute_option<S, A, W>(
    option: &dyn TemporalOption<S, A>,
    state: S,
    world: &mut W,
    rng: &mut dyn RngCore,
    on_step: &mut dyn FnMut(StepRecord<S, A>),
) -> Result<OptionOutcome<S>, PlanningError>
where
    S: Clone,
    A: Action,
    W: World<S, A> + ?Sized,
{
    let mut context = option.initiate(&state)?;
    debug!(option = option.name(), "option initiated");

    let mut current = state;
    let cause = loop {
        let choice = option.one_step_action(&current, &mut context, rng)?;
        match choice {
            ActionKind::Option(inner) => {
                // Every nested primitive is booked here under this option's
                // discount and reward tracking.
                let outcome = execute_option(inner.as_ref(), current, world, rng, &mut |record: StepRecord<S, A>| {
                    let booked = option.tracked_reward(&record.state, &record.action, &record.next_state, record.reward);
                    context.record(booked, option.discount());
                    on_step(record);
                })?;
                current = outcome.state;
            }
            ActionKind::Primitive(action) | ActionKind::Annotated(AnnotatedAction { action, .. }) => {
                let (next, reward) = world.step(&current, &action, rng)?;
                trace!(option = option.name(), step = context.steps, action = %action.name(), reward, "option step");
                let booked = option.tracked_reward(&current, &action, &next, reward);
                on_step(StepRecord {
                    option: option.name().to_string(),
                    index: context.steps,
                    state: current,
                    action,
                    reward,
                    next_state: next.clone(),
                });
                context.record(booked, option.discount());
                current = next;
            }
        }

        if world.is_terminal(&current) {
            break TerminationCause::Mdp;
        }
        let beta = option.probability_of_termination(&current, &context);
        if beta >= 1.0 || (beta > 0.0 && rng.gen::<f64>() < beta) {
            break TerminationCause::Option;
        }
    };

    debug!(
        option = option.name(),
        steps = context.steps,
        reward = context.cumulative_reward,
        ?cause,
        "option terminated"
    );
    Ok(OptionOutcome {
        state: current,
        context,
        cause,
    })
}

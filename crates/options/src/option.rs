//! Options: temporally extended actions.
//!
//! An option is a sub-policy with an initiation set and a termination
//! condition. Once initiated it selects actions until it terminates,
//! carrying a small [`ExecutionContext`] that accumulates its discounted
//! reward and duration.
//!
//! ```text
//!            initiate                 step (β = 0)
//!   Idle ─────────────▶ Running ◀─────────────┐
//!                          │  └───────────────┘
//!                          │ β fires, or the MDP terminates
//!                          ▼
//!                      Terminated
//! ```
//!
//! Markov options choose actions and terminate based on the current state
//! alone; only those have a derivable transition model (see
//! [`ExpectationSearch`](crate::ExpectationSearch)).

use std::marker::PhantomData;

use rand::RngCore;
use semimdp_core::{Action, ActionDistribution, RewardFunction};

use crate::action::ActionKind;
use crate::error::PlanningError;
use crate::policy::Policy;

/// Per-execution bookkeeping of a running option.
///
/// A fresh context is created on every initiation; contexts are never
/// shared between executions.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    /// γ^k after k primitive steps.
    pub cumulative_discount: f64,
    /// Σ γ^i · r_i over the steps taken so far.
    pub cumulative_reward: f64,
    /// Primitive steps taken so far.
    pub steps: usize,
    /// Position for options that follow a fixed script.
    pub cursor: usize,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            cumulative_discount: 1.0,
            cumulative_reward: 0.0,
            steps: 0,
            cursor: 0,
        }
    }

    /// Book one primitive step with reward `reward`.
    pub fn record(&mut self, reward: f64, discount: f64) {
        self.cumulative_reward += self.cumulative_discount * reward;
        self.cumulative_discount *= discount;
        self.steps += 1;
    }

}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A temporally extended action.
///
/// Implementors provide the initiation set, the termination condition and
/// the one-step selection rule. Execution against a world lives in
/// [`execute_option`](crate::execute_option).
pub trait TemporalOption<S, A> {
    /// Unique name, used for display, annotation and cache keys.
    fn name(&self) -> &str;

    /// Whether selection and termination depend only on the current state.
    fn is_markov(&self) -> bool {
        true
    }

    /// Whether termination probabilities are always 0 or 1.
    fn uses_deterministic_termination(&self) -> bool;

    /// Whether the selection rule always picks a single action.
    fn uses_deterministic_policy(&self) -> bool;

    /// Discount used to book rewards while the option runs.
    fn discount(&self) -> f64;

    /// Reward booked into the option's own context for one primitive step.
    ///
    /// Defaults to the world's reward. Episodes always record the world's
    /// reward; this only affects the option's bookkeeping.
    fn tracked_reward(&self, _state: &S, _action: &A, _next: &S, reward: f64) -> f64 {
        reward
    }

    /// Whether the option may be initiated in `state`.
    fn applicable_in(&self, state: &S) -> bool;

    /// β(state): probability of terminating on arrival in `state`.
    ///
    /// Only consulted after at least one step; an option never terminates
    /// in the state it was initiated in.
    fn probability_of_termination(&self, state: &S, context: &ExecutionContext) -> f64;

    /// Start an execution in `state`.
    fn initiate(&self, state: &S) -> Result<ExecutionContext, PlanningError> {
        if !self.applicable_in(state) {
            return Err(PlanningError::NotApplicable {
                option: self.name().to_string(),
            });
        }
        Ok(ExecutionContext::new())
    }

    /// The distribution over the next action.
    fn one_step_distribution(
        &self,
        state: &S,
        context: &ExecutionContext,
    ) -> Result<ActionDistribution<ActionKind<S, A>>, PlanningError>;

    /// Draw the next action, advancing any internal position in `context`.
    fn one_step_action(
        &self,
        state: &S,
        context: &mut ExecutionContext,
        rng: &mut dyn RngCore,
    ) -> Result<ActionKind<S, A>, PlanningError>
    where
        A: Clone,
    {
        let dist = self.one_step_distribution(state, context)?;
        Ok(dist.sample(rng).clone())
    }

    /// Book `reward` instead of the world's reward while this option runs.
    fn with_reward_tracking<R>(self, reward: R) -> RewardTracked<Self, R>
    where
        Self: Sized,
        R: RewardFunction<S, A>,
    {
        RewardTracked::new(self, reward)
    }
}

// ============================================================================
// Reward Tracking
// ============================================================================

/// An option that books a pseudo-reward instead of the world's reward.
///
/// Useful for subgoal options: the option's context accumulates, say, a
/// bonus for reaching its subgoal, while rollouts keep recording what the
/// world actually paid. Everything else delegates to the wrapped option.
///
/// ```rust
/// use semimdp_options::{MacroAction, TemporalOption};
///
/// let option = MacroAction::new("dash", vec!["right", "right"])
///     .with_reward_tracking(|_s: &i32, _a: &&'static str, n: &i32| if *n == 2 { 5.0 } else { 0.0 });
/// assert_eq!(option.tracked_reward(&1, &"right", &2, -1.0), 5.0);
/// ```
#[derive(Debug, Clone)]
pub struct RewardTracked<O, R> {
    option: O,
    reward: R,
}

impl<O, R> RewardTracked<O, R> {
    pub fn new(option: O, reward: R) -> Self {
        Self { option, reward }
    }

    pub fn inner(&self) -> &O {
        &self.option
    }
}

impl<S, A, O, R> TemporalOption<S, A> for RewardTracked<O, R>
where
    O: TemporalOption<S, A>,
    R: RewardFunction<S, A>,
{
    fn name(&self) -> &str {
        self.option.name()
    }

    fn is_markov(&self) -> bool {
        self.option.is_markov()
    }

    fn uses_deterministic_termination(&self) -> bool {
        self.option.uses_deterministic_termination()
    }

    fn uses_deterministic_policy(&self) -> bool {
        self.option.uses_deterministic_policy()
    }

    fn discount(&self) -> f64 {
        self.option.discount()
    }

    fn tracked_reward(&self, state: &S, action: &A, next: &S, _reward: f64) -> f64 {
        self.reward.reward(state, action, next)
    }

    fn applicable_in(&self, state: &S) -> bool {
        self.option.applicable_in(state)
    }

    fn probability_of_termination(&self, state: &S, context: &ExecutionContext) -> f64 {
        self.option.probability_of_termination(state, context)
    }

    fn initiate(&self, state: &S) -> Result<ExecutionContext, PlanningError> {
        self.option.initiate(state)
    }

    fn one_step_distribution(
        &self,
        state: &S,
        context: &ExecutionContext,
    ) -> Result<ActionDistribution<ActionKind<S, A>>, PlanningError> {
        self.option.one_step_distribution(state, context)
    }

    fn one_step_action(
        &self,
        state: &S,
        context: &mut ExecutionContext,
        rng: &mut dyn RngCore,
    ) -> Result<ActionKind<S, A>, PlanningError>
    where
        A: Clone,
    {
        self.option.one_step_action(state, context, rng)
    }
}

// ============================================================================
// Primitive Option
// ============================================================================

/// A primitive action viewed as an option.
///
/// Applicable everywhere, terminates after exactly one step. Planning over
/// a primitive option is equivalent to planning over the primitive.
#[derive(Debug, Clone)]
pub struct PrimitiveOption<A> {
    name: String,
    action: A,
    discount: f64,
}

impl<A: Action> PrimitiveOption<A> {
    pub fn new(action: A) -> Self {
        Self {
            name: action.name(),
            action,
            discount: 1.0,
        }
    }

    /// Set the bookkeeping discount.
    pub fn with_discount(mut self, discount: f64) -> Self {
        self.discount = discount;
        self
    }

    pub fn action(&self) -> &A {
        &self.action
    }
}

impl<S, A: Action> TemporalOption<S, A> for PrimitiveOption<A> {
    fn name(&self) -> &str {
        &self.name
    }

    fn uses_deterministic_termination(&self) -> bool {
        true
    }

    fn uses_deterministic_policy(&self) -> bool {
        true
    }

    fn discount(&self) -> f64 {
        self.discount
    }

    fn applicable_in(&self, _state: &S) -> bool {
        true
    }

    fn probability_of_termination(&self, _state: &S, _context: &ExecutionContext) -> f64 {
        1.0
    }

    fn one_step_distribution(
        &self,
        _state: &S,
        _context: &ExecutionContext,
    ) -> Result<ActionDistribution<ActionKind<S, A>>, PlanningError> {
        Ok(ActionDistribution::deterministic(ActionKind::Primitive(
            self.action.clone(),
        )))
    }
}

// ============================================================================
// Policy Option
// ============================================================================

/// When a [`PolicyOption`] stops.
pub enum Termination<S> {
    /// Terminate exactly in the states satisfying the predicate.
    States(Box<dyn Fn(&S) -> bool>),
    /// Terminate with the given probability β(s).
    Probability(Box<dyn Fn(&S) -> f64>),
}

impl<S> Termination<S> {
    /// Deterministic termination in the states where `f` holds.
    pub fn states(f: impl Fn(&S) -> bool + 'static) -> Self {
        Termination::States(Box::new(f))
    }

    /// Stochastic termination with probability `f(state)`, clamped to `[0, 1]`.
    pub fn probability(f: impl Fn(&S) -> f64 + 'static) -> Self {
        Termination::Probability(Box::new(f))
    }

    fn beta(&self, state: &S) -> f64 {
        match self {
            Termination::States(f) => {
                if f(state) {
                    1.0
                } else {
                    0.0
                }
            }
            Termination::Probability(f) => f(state).clamp(0.0, 1.0),
        }
    }
}

/// A Markov option defined by an initiation predicate, a policy and a
/// termination condition.
///
/// The option also terminates wherever its policy is undefined. It is
/// itself a [`Policy`], so it can be inspected like any other.
pub struct PolicyOption<S, A, P> {
    name: String,
    policy: P,
    initiation: Box<dyn Fn(&S) -> bool>,
    termination: Termination<S>,
    discount: f64,
    _phantom: PhantomData<fn() -> A>,
}

impl<S, A, P> PolicyOption<S, A, P>
where
    A: Clone,
    P: Policy<S, ActionKind<S, A>>,
{
    /// An option applicable everywhere, with a bookkeeping discount of 1.
    pub fn new(name: impl Into<String>, policy: P, termination: Termination<S>) -> Self {
        Self {
            name: name.into(),
            policy,
            initiation: Box::new(|_| true),
            termination,
            discount: 1.0,
            _phantom: PhantomData,
        }
    }

    /// Restrict the initiation set.
    pub fn with_initiation(mut self, initiation: impl Fn(&S) -> bool + 'static) -> Self {
        self.initiation = Box::new(initiation);
        self
    }

    /// Set the bookkeeping discount.
    pub fn with_discount(mut self, discount: f64) -> Self {
        self.discount = discount;
        self
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }
}

impl<S, A, P> TemporalOption<S, A> for PolicyOption<S, A, P>
where
    A: Clone,
    P: Policy<S, ActionKind<S, A>>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn uses_deterministic_termination(&self) -> bool {
        matches!(self.termination, Termination::States(_))
    }

    fn uses_deterministic_policy(&self) -> bool {
        !self.policy.is_stochastic()
    }

    fn discount(&self) -> f64 {
        self.discount
    }

    fn applicable_in(&self, state: &S) -> bool {
        (self.initiation)(state)
    }

    fn probability_of_termination(&self, state: &S, _context: &ExecutionContext) -> f64 {
        if !self.policy.is_defined_for(state) {
            return 1.0;
        }
        self.termination.beta(state)
    }

    fn one_step_distribution(
        &self,
        state: &S,
        _context: &ExecutionContext,
    ) -> Result<ActionDistribution<ActionKind<S, A>>, PlanningError> {
        self.policy.distribution(state)
    }

    fn one_step_action(
        &self,
        state: &S,
        _context: &mut ExecutionContext,
        rng: &mut dyn RngCore,
    ) -> Result<ActionKind<S, A>, PlanningError> {
        self.policy.sample(state, rng)
    }
}

impl<S, A, P> Policy<S, ActionKind<S, A>> for PolicyOption<S, A, P>
where
    A: Clone,
    P: Policy<S, ActionKind<S, A>>,
{
    fn distribution(&self, state: &S) -> Result<ActionDistribution<ActionKind<S, A>>, PlanningError> {
        self.policy.distribution(state)
    }

    fn sample(&self, state: &S, rng: &mut dyn RngCore) -> Result<ActionKind<S, A>, PlanningError> {
        self.policy.sample(state, rng)
    }

    fn is_stochastic(&self) -> bool {
        self.policy.is_stochastic()
    }

    fn is_defined_for(&self, state: &S) -> bool {
        self.policy.is_defined_for(state)
    }
}

// ============================================================================
// Macro Action
// ============================================================================

/// A fixed, open-loop sequence of primitives.
///
/// Not Markov: the next action depends on how far into the sequence the
/// execution is, which is tracked by [`ExecutionContext::cursor`].
#[derive(Debug, Clone)]
pub struct MacroAction<A> {
    name: String,
    actions: Vec<A>,
    discount: f64,
}

impl<A> MacroAction<A> {
    pub fn new(name: impl Into<String>, actions: Vec<A>) -> Self {
        Self {
            name: name.into(),
            actions,
            discount: 1.0,
        }
    }

    /// Set the bookkeeping discount.
    pub fn with_discount(mut self, discount: f64) -> Self {
        self.discount = discount;
        self
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl<S, A: Clone> TemporalOption<S, A> for MacroAction<A> {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_markov(&self) -> bool {
        false
    }

    fn uses_deterministic_termination(&self) -> bool {
        true
    }

    fn uses_deterministic_policy(&self) -> bool {
        true
    }

    fn discount(&self) -> f64 {
        self.discount
    }

    fn applicable_in(&self, _state: &S) -> bool {
        !self.actions.is_empty()
    }

    fn probability_of_termination(&self, _state: &S, context: &ExecutionContext) -> f64 {
        if context.cursor >= self.actions.len() {
            1.0
        } else {
            0.0
        }
    }

    fn one_step_distribution(
        &self,
        _state: &S,
        context: &ExecutionContext,
    ) -> Result<ActionDistribution<ActionKind<S, A>>, PlanningError> {
        self.actions
            .get(context.cursor)
            .map(|a| ActionDistribution::deterministic(ActionKind::Primitive(a.clone())))
            .ok_or(PlanningError::UndefinedPolicy)
    }

    fn one_step_action(
        &self,
        _state: &S,
        context: &mut ExecutionContext,
        _rng: &mut dyn RngCore,
    ) -> Result<ActionKind<S, A>, PlanningError> {
        let action = self
            .actions
            .get(context.cursor)
            .cloned()
            .ok_or(PlanningError::UndefinedPolicy)?;
        context.cursor += 1;
        Ok(ActionKind::Primitive(action))
    }
}

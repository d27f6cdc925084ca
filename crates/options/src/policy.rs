//! Policies: State → distribution over actions.
//!
//! Every policy exposes the full action distribution for a state and can
//! sample from it with a caller-supplied RNG. Deterministic policies are
//! the special case of a one-entry distribution.
//!
//! ```text
//!          ┌──────────┐
//!  State ─▶│  Policy  │─▶ [(Act, p), ...] ─▶ sample ─▶ Act
//!          └──────────┘
//! ```
//!
//! Policies are agnostic to what an action is: the same greedy or
//! Boltzmann policy works over primitives or over [`ActionKind`]s that
//! include options.

use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;

use rand::RngCore;
use semimdp_core::{ActionDistribution, StateHasher};

use crate::action::ActionKind;
use crate::error::PlanningError;

/// A mapping from states to action distributions.
pub trait Policy<S, A: Clone> {
    /// The action distribution for `state`.
    ///
    /// Fails with [`PlanningError::UndefinedPolicy`] when the policy has no
    /// opinion about the state.
    fn distribution(&self, state: &S) -> Result<ActionDistribution<A>, PlanningError>;

    /// Draw an action for `state`.
    fn sample(&self, state: &S, rng: &mut dyn RngCore) -> Result<A, PlanningError> {
        let dist = self.distribution(state)?;
        Ok(dist.sample(rng).clone())
    }

    /// Whether different actions may be returned for the same state.
    fn is_stochastic(&self) -> bool;

    /// Whether the policy can produce an action for `state`.
    fn is_defined_for(&self, state: &S) -> bool {
        self.distribution(state).is_ok()
    }

    /// Probability of choosing `action` in `state`.
    fn probability_of(&self, state: &S, action: &A) -> Result<f64, PlanningError>
    where
        A: PartialEq,
    {
        Ok(self.distribution(state)?.probability_of(action))
    }
}

impl<S, A: Clone, P: Policy<S, A> + ?Sized> Policy<S, A> for &P {
    fn distribution(&self, state: &S) -> Result<ActionDistribution<A>, PlanningError> {
        (**self).distribution(state)
    }

    fn sample(&self, state: &S, rng: &mut dyn RngCore) -> Result<A, PlanningError> {
        (**self).sample(state, rng)
    }

    fn is_stochastic(&self) -> bool {
        (**self).is_stochastic()
    }

    fn is_defined_for(&self, state: &S) -> bool {
        (**self).is_defined_for(state)
    }
}

impl<S, A: Clone, P: Policy<S, A> + ?Sized> Policy<S, A> for Box<P> {
    fn distribution(&self, state: &S) -> Result<ActionDistribution<A>, PlanningError> {
        (**self).distribution(state)
    }

    fn sample(&self, state: &S, rng: &mut dyn RngCore) -> Result<A, PlanningError> {
        (**self).sample(state, rng)
    }

    fn is_stochastic(&self) -> bool {
        (**self).is_stochastic()
    }

    fn is_defined_for(&self, state: &S) -> bool {
        (**self).is_defined_for(state)
    }
}

// ============================================================================
// Function Policies
// ============================================================================

/// A deterministic policy defined by a function.
///
/// Wraps any `Fn(&S) -> Option<A>`; `None` means undefined.
pub struct FnPolicy<F, S, A> {
    f: F,
    _phantom: PhantomData<fn(&S) -> A>,
}

impl<F, S, A> FnPolicy<F, S, A>
where
    F: Fn(&S) -> Option<A>,
{
    /// Create a policy from a function.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: PhantomData,
        }
    }
}

impl<F, S, A> Policy<S, A> for FnPolicy<F, S, A>
where
    A: Clone,
    F: Fn(&S) -> Option<A>,
{
    fn distribution(&self, state: &S) -> Result<ActionDistribution<A>, PlanningError> {
        (self.f)(state)
            .map(ActionDistribution::deterministic)
            .ok_or(PlanningError::UndefinedPolicy)
    }

    // No randomness is consumed.
    fn sample(&self, state: &S, _rng: &mut dyn RngCore) -> Result<A, PlanningError> {
        (self.f)(state).ok_or(PlanningError::UndefinedPolicy)
    }

    fn is_stochastic(&self) -> bool {
        false
    }

    fn is_defined_for(&self, state: &S) -> bool {
        (self.f)(state).is_some()
    }
}

/// A stochastic policy defined by a function returning a distribution.
pub struct StochasticFnPolicy<F, S, A> {
    f: F,
    _phantom: PhantomData<fn(&S) -> A>,
}

impl<F, S, A> StochasticFnPolicy<F, S, A>
where
    F: Fn(&S) -> Option<ActionDistribution<A>>,
{
    /// Create a policy from a function.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: PhantomData,
        }
    }
}

impl<F, S, A> Policy<S, A> for StochasticFnPolicy<F, S, A>
where
    A: Clone,
    F: Fn(&S) -> Option<ActionDistribution<A>>,
{
    fn distribution(&self, state: &S) -> Result<ActionDistribution<A>, PlanningError> {
        (self.f)(state).ok_or(PlanningError::UndefinedPolicy)
    }

    fn is_stochastic(&self) -> bool {
        true
    }
}

// ============================================================================
// Random Policy
// ============================================================================

/// Uniform over the actions available in a state.
///
/// Useful as a baseline or for exploration.
pub struct RandomPolicy<F, S, A> {
    actions: F,
    _phantom: PhantomData<fn(&S) -> A>,
}

impl<F, S, A> RandomPolicy<F, S, A>
where
    F: Fn(&S) -> Vec<A>,
{
    /// Create a policy from the function listing available actions.
    pub fn new(actions: F) -> Self {
        Self {
            actions,
            _phantom: PhantomData,
        }
    }
}

impl<F, S, A> Policy<S, A> for RandomPolicy<F, S, A>
where
    A: Clone,
    F: Fn(&S) -> Vec<A>,
{
    fn distribution(&self, state: &S) -> Result<ActionDistribution<A>, PlanningError> {
        let actions = (self.actions)(state);
        if actions.is_empty() {
            return Err(PlanningError::UndefinedPolicy);
        }
        Ok(ActionDistribution::uniform(actions)?)
    }

    fn is_stochastic(&self) -> bool {
        true
    }
}

// ============================================================================
// Value-Based Policies
// ============================================================================

/// Action values for a state: `state → [(action, Q)]`.
pub trait QFunction<S, A> {
    /// Q-values of every action available in `state`.
    fn q_values(&self, state: &S) -> Vec<(A, f64)>;
}

impl<S, A, F> QFunction<S, A> for F
where
    F: Fn(&S) -> Vec<(A, f64)>,
{
    fn q_values(&self, state: &S) -> Vec<(A, f64)> {
        self(state)
    }
}

/// Indices of the entries that share the maximum Q-value. Empty when
/// every value is NaN.
fn argmax_ties<A>(q: &[(A, f64)]) -> Vec<usize> {
    let best = q.iter().map(|(_, v)| *v).fold(f64::NEG_INFINITY, f64::max);
    q.iter()
        .enumerate()
        .filter(|(_, (_, v))| *v == best)
        .map(|(i, _)| i)
        .collect()
}

/// How a greedy policy picks among equally valued actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// The first maximal action in Q-function order.
    #[default]
    First,
    /// Uniformly among all maximal actions.
    Uniform,
}

/// A policy that selects the action with the highest Q-value.
#[derive(Debug, Clone)]
pub struct GreedyPolicy<Q> {
    q_function: Q,
    tie_break: TieBreak,
}

impl<Q> GreedyPolicy<Q> {
    /// Create a greedy policy breaking ties by first occurrence.
    pub fn new(q_function: Q) -> Self {
        Self {
            q_function,
            tie_break: TieBreak::First,
        }
    }

    /// Choose how ties are broken.
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }
}

impl<S, A, Q> Policy<S, A> for GreedyPolicy<Q>
where
    A: Clone,
    Q: QFunction<S, A>,
{
    fn distribution(&self, state: &S) -> Result<ActionDistribution<A>, PlanningError> {
        let q = self.q_function.q_values(state);
        if q.is_empty() {
            return Err(PlanningError::UndefinedPolicy);
        }

        let ties = argmax_ties(&q);
        if ties.is_empty() {
            return Err(PlanningError::UndefinedPolicy);
        }
        match self.tie_break {
            TieBreak::First => Ok(ActionDistribution::deterministic(q[ties[0]].0.clone())),
            TieBreak::Uniform => {
                let best = ties.into_iter().map(|i| q[i].0.clone()).collect();
                Ok(ActionDistribution::uniform(best)?)
            }
        }
    }

    fn is_stochastic(&self) -> bool {
        self.tie_break == TieBreak::Uniform
    }
}

/// A policy that selects the greedy action with probability (1-ε),
/// and a uniformly random action with probability ε.
///
/// Every action gets ε/n; the remaining (1-ε) is split evenly among the
/// maximal actions.
#[derive(Debug, Clone)]
pub struct EpsilonGreedyPolicy<Q> {
    q_function: Q,
    epsilon: f64,
}

impl<Q> EpsilonGreedyPolicy<Q> {
    /// Create an epsilon-greedy policy; ε is clamped to `[0, 1]`.
    pub fn new(q_function: Q, epsilon: f64) -> Self {
        Self {
            q_function,
            epsilon: epsilon.clamp(0.0, 1.0),
        }
    }

    /// Exploration probability.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }
}

impl<S, A, Q> Policy<S, A> for EpsilonGreedyPolicy<Q>
where
    A: Clone,
    Q: QFunction<S, A>,
{
    fn distribution(&self, state: &S) -> Result<ActionDistribution<A>, PlanningError> {
        let q = self.q_function.q_values(state);
        if q.is_empty() {
            return Err(PlanningError::UndefinedPolicy);
        }

        let ties = argmax_ties(&q);
        if ties.is_empty() {
            return Err(PlanningError::UndefinedPolicy);
        }
        let explore = self.epsilon / q.len() as f64;
        let exploit = (1.0 - self.epsilon) / ties.len() as f64;

        let mut entries: Vec<(A, f64)> = q.into_iter().map(|(a, _)| (a, explore)).collect();
        for i in ties {
            entries[i].1 += exploit;
        }
        Ok(ActionDistribution::new(entries)?)
    }

    fn is_stochastic(&self) -> bool {
        true
    }
}

/// Softmax over Q-values with a temperature.
///
/// Low temperatures approach greedy; high temperatures approach uniform.
#[derive(Debug, Clone)]
pub struct BoltzmannPolicy<Q> {
    q_function: Q,
    temperature: f64,
}

impl<Q> BoltzmannPolicy<Q> {
    /// Create a Boltzmann policy. The temperature is checked on use.
    pub fn new(q_function: Q, temperature: f64) -> Self {
        Self {
            q_function,
            temperature,
        }
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }
}

impl<S, A, Q> Policy<S, A> for BoltzmannPolicy<Q>
where
    A: Clone,
    Q: QFunction<S, A>,
{
    fn distribution(&self, state: &S) -> Result<ActionDistribution<A>, PlanningError> {
        let q = self.q_function.q_values(state);
        if q.is_empty() {
            return Err(PlanningError::UndefinedPolicy);
        }
        Ok(ActionDistribution::boltzmann(q, self.temperature)?)
    }

    fn is_stochastic(&self) -> bool {
        true
    }
}

// ============================================================================
// Adapters
// ============================================================================

/// Lifts a policy over primitives into a policy over [`ActionKind`]s.
pub struct PrimitivePolicy<P> {
    inner: P,
}

impl<P> PrimitivePolicy<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<S, A, P> Policy<S, ActionKind<S, A>> for PrimitivePolicy<P>
where
    A: Clone,
    P: Policy<S, A>,
{
    fn distribution(&self, state: &S) -> Result<ActionDistribution<ActionKind<S, A>>, PlanningError> {
        Ok(self.inner.distribution(state)?.map(ActionKind::Primitive))
    }

    fn sample(&self, state: &S, rng: &mut dyn RngCore) -> Result<ActionKind<S, A>, PlanningError> {
        self.inner.sample(state, rng).map(ActionKind::Primitive)
    }

    fn is_stochastic(&self) -> bool {
        self.inner.is_stochastic()
    }

    fn is_defined_for(&self, state: &S) -> bool {
        self.inner.is_defined_for(state)
    }
}

/// Memoises another policy's distributions per hashed state.
///
/// Errors are not cached. Not `Sync`: share one per thread.
pub struct CachedPolicy<S, A, P, H: StateHasher<S>> {
    inner: P,
    hasher: H,
    cache: RefCell<HashMap<H::Key, ActionDistribution<A>>>,
    _phantom: PhantomData<fn(&S)>,
}

impl<S, A, P, H> CachedPolicy<S, A, P, H>
where
    A: Clone,
    P: Policy<S, A>,
    H: StateHasher<S>,
{
    /// Wrap `inner`, keying the cache with `hasher`.
    pub fn new(inner: P, hasher: H) -> Self {
        Self {
            inner,
            hasher,
            cache: RefCell::new(HashMap::new()),
            _phantom: PhantomData,
        }
    }

    /// Number of memoised states.
    pub fn cached_len(&self) -> usize {
        self.cache.borrow().len()
    }

    /// Forget every memoised distribution.
    pub fn clear(&self) {
        self.cache.borrow_mut().clear();
    }
}

impl<S, A, P, H> Policy<S, A> for CachedPolicy<S, A, P, H>
where
    A: Clone,
    P: Policy<S, A>,
    H: StateHasher<S>,
{
    fn distribution(&self, state: &S) -> Result<ActionDistribution<A>, PlanningError> {
        let key = self.hasher.key(state);
        if let Some(dist) = self.cache.borrow().get(&key) {
            return Ok(dist.clone());
        }

        let dist = self.inner.distribution(state)?;
        self.cache.borrow_mut().insert(key, dist.clone());
        Ok(dist)
    }

    fn is_stochastic(&self) -> bool {
        self.inner.is_stochastic()
    }
}

/// Translates states into another domain before consulting a policy.
///
/// Lets a policy learned on an abstraction act in the concrete domain.
pub struct DomainMappedPolicy<P, F, T> {
    inner: P,
    mapping: F,
    _phantom: PhantomData<fn() -> T>,
}

impl<P, F, T> DomainMappedPolicy<P, F, T> {
    /// Consult `inner` on `mapping(state)`.
    pub fn new<S>(inner: P, mapping: F) -> Self
    where
        F: Fn(&S) -> T,
    {
        Self {
            inner,
            mapping,
            _phantom: PhantomData,
        }
    }
}

impl<S, T, A, P, F> Policy<S, A> for DomainMappedPolicy<P, F, T>
where
    A: Clone,
    P: Policy<T, A>,
    F: Fn(&S) -> T,
{
    fn distribution(&self, state: &S) -> Result<ActionDistribution<A>, PlanningError> {
        self.inner.distribution(&(self.mapping)(state))
    }

    fn sample(&self, state: &S, rng: &mut dyn RngCore) -> Result<A, PlanningError> {
        self.inner.sample(&(self.mapping)(state), rng)
    }

    fn is_stochastic(&self) -> bool {
        self.inner.is_stochastic()
    }

    fn is_defined_for(&self, state: &S) -> bool {
        self.inner.is_defined_for(&(self.mapping)(state))
    }
}

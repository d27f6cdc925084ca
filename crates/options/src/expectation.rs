//! Deriving an option's semi-MDP transition model.
//!
//! For a Markov option `o` started in `s`, the search enumerates the
//! option's execution tree and aggregates, for every terminal state `s'`,
//! the discounted termination mass
//!
//! ```text
//! T(s' | s, o) = Σ_k  P(o terminates in s' after k steps) · γ^k
//! ```
//!
//! together with the expected discounted reward accumulated until
//! termination. Branches whose path probability falls to the cutoff or
//! below are dropped, so the resulting masses are a lower bound on the true
//! expectation; with a cutoff of zero and a finite horizon they are exact.
//!
//! Results are memoised per option name and hashed start state.

use std::collections::HashMap;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use semimdp_core::{
    Action, NeverTerminal, RewardFunction, StateHasher, TerminalFunction, TransitionModel,
    TransitionProb,
};
use tracing::{debug, warn};

use crate::action::{ActionKind, AnnotatedAction};
use crate::error::PlanningError;
use crate::option::{ExecutionContext, TemporalOption};

/// Expectation search settings.
///
/// ```rust
/// use semimdp_options::SearchConfig;
///
/// let config = SearchConfig::default().with_discount(0.95).with_cutoff(1e-4);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Discount applied per primitive step.
    pub discount: f64,
    /// Branches with path probability at or below this are pruned.
    pub cutoff_probability: f64,
    /// Hard bound on option duration explored; `None` for unbounded.
    pub max_depth: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            discount: 0.99,
            cutoff_probability: 0.001,
            max_depth: Some(10_000),
        }
    }
}

impl SearchConfig {
    pub fn with_discount(mut self, discount: f64) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_cutoff(mut self, cutoff_probability: f64) -> Self {
        self.cutoff_probability = cutoff_probability;
        self
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Check value ranges: γ in (0, 1], cutoff in [0, 1).
    pub fn validate(&self) -> Result<(), PlanningError> {
        if !(self.discount > 0.0 && self.discount <= 1.0) {
            return Err(PlanningError::InvalidConfig {
                reason: format!("discount must be in (0, 1], got {}", self.discount),
            });
        }
        if !(0.0..1.0).contains(&self.cutoff_probability) {
            return Err(PlanningError::InvalidConfig {
                reason: format!(
                    "cutoff probability must be in [0, 1), got {}",
                    self.cutoff_probability
                ),
            });
        }
        Ok(())
    }
}

/// The derived model of an option from one start state.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionExpectation<S> {
    /// Terminal states with their discounted termination mass.
    pub transitions: Vec<TransitionProb<S>>,
    /// The same terminal states with their undiscounted probability.
    pub terminations: Vec<TransitionProb<S>>,
    /// Expected discounted reward until termination.
    pub expected_reward: f64,
}

impl<S> OptionExpectation<S> {
    /// Σ T(s'|s,o). At most 1; exactly γ^k for a deterministic k-step
    /// option.
    pub fn total_mass(&self) -> f64 {
        self.transitions.iter().map(|t| t.probability).sum()
    }
}

/// Counters from the most recent uncached search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Nodes whose successors were generated.
    pub expanded: usize,
    /// Successors dropped by the probability cutoff.
    pub pruned: usize,
    /// Nodes dropped at the depth bound.
    pub depth_limited: usize,
}

struct SearchNode<S> {
    state: S,
    probability: f64,
    discounted_reward: f64,
    discount: f64,
    steps: usize,
}

/// Branch-and-bound search over option executions, with a memo cache.
///
/// The cache is owned by the engine: share one engine to share results,
/// or call [`clear_cache`](ExpectationSearch::clear_cache) when the model
/// changes.
pub struct ExpectationSearch<S, A, M, R, H: StateHasher<S>, T = NeverTerminal> {
    model: M,
    reward: R,
    hasher: H,
    terminal: T,
    config: SearchConfig,
    cache: HashMap<String, HashMap<H::Key, OptionExpectation<S>>>,
    stats: SearchStats,
    _phantom: PhantomData<fn(&A)>,
}

impl<S, A, M, R, H> ExpectationSearch<S, A, M, R, H, NeverTerminal>
where
    A: Action,
    M: TransitionModel<S, A>,
    R: RewardFunction<S, A>,
    H: StateHasher<S>,
{
    /// Create an engine for an MDP without terminal states.
    pub fn new(model: M, reward: R, hasher: H, config: SearchConfig) -> Result<Self, PlanningError> {
        config.validate()?;
        Ok(Self {
            model,
            reward,
            hasher,
            terminal: NeverTerminal,
            config,
            cache: HashMap::new(),
            stats: SearchStats::default(),
            _phantom: PhantomData,
        })
    }
}

impl<S, A, M, R, H, T> ExpectationSearch<S, A, M, R, H, T>
where
    H: StateHasher<S>,
{
    /// Treat states satisfying `terminal` as forcing termination.
    pub fn with_terminal<T2>(self, terminal: T2) -> ExpectationSearch<S, A, M, R, H, T2> {
        ExpectationSearch {
            model: self.model,
            reward: self.reward,
            hasher: self.hasher,
            terminal,
            config: self.config,
            cache: HashMap::new(),
            stats: SearchStats::default(),
            _phantom: PhantomData,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Counters from the most recent search that missed the cache.
    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    /// Number of memoised (option, state) entries.
    pub fn cached_len(&self) -> usize {
        self.cache.values().map(HashMap::len).sum()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

impl<S, A, M, R, H, T> ExpectationSearch<S, A, M, R, H, T>
where
    S: Clone,
    A: Action,
    M: TransitionModel<S, A>,
    R: RewardFunction<S, A>,
    H: StateHasher<S>,
    T: TerminalFunction<S>,
{
    /// Expected outcome of taking `action` in `state`.
    ///
    /// Primitives yield the model's one-step transitions, discounted by γ
    /// like an option's, and the expected reward; options yield their
    /// derived model.
    pub fn outcome(
        &mut self,
        action: &ActionKind<S, A>,
        state: &S,
    ) -> Result<OptionExpectation<S>, PlanningError> {
        match action {
            ActionKind::Option(option) => self.compute_transitions(option.as_ref(), state),
            ActionKind::Primitive(a) | ActionKind::Annotated(AnnotatedAction { action: a, .. }) => {
                let gamma = self.config.discount;
                let terminations = self.model.transitions(state, a)?;
                let expected_reward = terminations
                    .iter()
                    .map(|t| t.probability * self.reward.reward(state, a, &t.state))
                    .sum();
                let transitions = terminations
                    .iter()
                    .map(|t| TransitionProb::new(t.state.clone(), t.probability * gamma))
                    .collect();
                Ok(OptionExpectation {
                    transitions,
                    terminations,
                    expected_reward,
                })
            }
        }
    }

    /// Expected discounted reward of running `option` from `state`.
    pub fn expected_reward(
        &mut self,
        option: &dyn TemporalOption<S, A>,
        state: &S,
    ) -> Result<f64, PlanningError> {
        Ok(self.compute_transitions(option, state)?.expected_reward)
    }

    /// Derive the transition model of `option` started in `state`.
    ///
    /// Fails for non-Markov options, and for options that select other
    /// options.
    pub fn compute_transitions(
        &mut self,
        option: &dyn TemporalOption<S, A>,
        state: &S,
    ) -> Result<OptionExpectation<S>, PlanningError> {
        if !option.is_markov() {
            return Err(PlanningError::NonMarkovOption {
                option: option.name().to_string(),
            });
        }

        let key = self.hasher.key(state);
        if let Some(hit) = self.cache.get(option.name()).and_then(|m| m.get(&key)) {
            debug!(option = option.name(), "expectation cache hit");
            return Ok(hit.clone());
        }

        let expectation = self.search(option, state)?;
        self.cache
            .entry(option.name().to_string())
            .or_default()
            .insert(key, expectation.clone());
        Ok(expectation)
    }

    fn search(
        &mut self,
        option: &dyn TemporalOption<S, A>,
        state: &S,
    ) -> Result<OptionExpectation<S>, PlanningError> {
        // Markov options never read their context.
        let context = ExecutionContext::new();
        let gamma = self.config.discount;
        let cutoff = self.config.cutoff_probability;

        let mut stats = SearchStats::default();
        let mut index: HashMap<H::Key, usize> = HashMap::new();
        let mut transitions: Vec<TransitionProb<S>> = Vec::new();
        let mut terminations: Vec<TransitionProb<S>> = Vec::new();
        let mut expected_reward = 0.0;

        let mut open = vec![SearchNode {
            state: state.clone(),
            probability: 1.0,
            discounted_reward: 0.0,
            discount: 1.0,
            steps: 0,
        }];

        while let Some(node) = open.pop() {
            let p_term = if self.terminal.is_terminal(&node.state) {
                1.0
            } else if node.steps == 0 {
                0.0
            } else {
                option
                    .probability_of_termination(&node.state, &context)
                    .clamp(0.0, 1.0)
            };

            if p_term > 0.0 {
                let mass = node.probability * p_term;
                expected_reward += mass * node.discounted_reward;

                let key = self.hasher.key(&node.state);
                match index.get(&key) {
                    Some(&i) => {
                        transitions[i].probability += mass * node.discount;
                        terminations[i].probability += mass;
                    }
                    None => {
                        index.insert(key, transitions.len());
                        transitions.push(TransitionProb::new(node.state.clone(), mass * node.discount));
                        terminations.push(TransitionProb::new(node.state.clone(), mass));
                    }
                }
            }

            let p_continue = 1.0 - p_term;
            if p_continue <= 0.0 {
                continue;
            }
            if self.config.max_depth.is_some_and(|max| node.steps >= max) {
                stats.depth_limited += 1;
                continue;
            }

            stats.expanded += 1;
            let selection = option.one_step_distribution(&node.state, &context)?;
            for entry in selection.iter() {
                if entry.probability <= 0.0 {
                    continue;
                }
                let action = entry.action.primitive().ok_or_else(|| PlanningError::UnsupportedAction {
                    action: entry.action.name(),
                    context: "expectation search",
                })?;

                for outcome in self.model.transitions(&node.state, action)? {
                    let probability = node.probability * p_continue * entry.probability * outcome.probability;
                    if probability <= cutoff {
                        stats.pruned += 1;
                        continue;
                    }
                    let reward = self.reward.reward(&node.state, action, &outcome.state);
                    open.push(SearchNode {
                        state: outcome.state,
                        probability,
                        discounted_reward: node.discounted_reward + node.discount * reward,
                        discount: node.discount * gamma,
                        steps: node.steps + 1,
                    });
                }
            }
        }

        debug!(
            option = option.name(),
            terminals = transitions.len(),
            expanded = stats.expanded,
            pruned = stats.pruned,
            depth_limited = stats.depth_limited,
            "expectation search complete"
        );
        if stats.depth_limited > 0 {
            warn!(
                option = option.name(),
                depth_limited = stats.depth_limited,
                "expectation search hit the depth bound"
            );
        }
        self.stats = stats;

        Ok(OptionExpectation {
            transitions,
            terminations,
            expected_reward,
        })
    }
}

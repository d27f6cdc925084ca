//! Rollout: follow a policy to produce an episode.
//!
//! The rollout is where a policy meets a world, either a model sampled with
//! the caller's RNG or a live environment.
//!
//! ```text
//!    ┌──────────┐     ┌──────────────────┐
//!    │  Policy  │────▶│ Model / Env      │
//!    └──────────┘     └──────────────────┘
//!         │                │
//!         ▼                ▼
//!    ┌──────────────────────────────────┐
//!    │             Episode              │
//!    │  [(s₀,a₀,r₀), (s₁,a₁,r₁), ...]   │
//!    └──────────────────────────────────┘
//! ```
//!
//! When the policy picks an option, the option runs to termination. The
//! episode either records every primitive it executed (optionally annotated
//! with the option's name and sub-step) or a single step for the whole
//! option carrying its cumulative discounted reward.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use semimdp_core::{Action, Environment, RewardFunction, TerminalFunction, TransitionModel};
use tracing::debug;

use crate::action::{ActionKind, AnnotatedAction};
use crate::error::PlanningError;
use crate::execution::{execute_option, EnvironmentWorld, ModelWorld, TerminationCause, World};
use crate::option::ExecutionContext;
use crate::policy::Policy;

/// How options are recorded and how long episodes may run.
///
/// ```rust
/// use semimdp_options::RolloutConfig;
///
/// let config: RolloutConfig = serde_json::from_str(r#"{ "max_steps": 50 }"#).unwrap();
/// assert!(config.decompose_options);
/// assert_eq!(config.max_steps, Some(50));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    /// Record the primitives an option executes instead of the option.
    pub decompose_options: bool,
    /// Tag decomposed primitives with their option and sub-step.
    pub annotate_options: bool,
    /// Stop once this many steps are recorded. Checked before each
    /// decision, so an option may run past it.
    pub max_steps: Option<usize>,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            decompose_options: true,
            annotate_options: true,
            max_steps: None,
        }
    }
}

impl RolloutConfig {
    pub fn with_decomposition(mut self, decompose: bool) -> Self {
        self.decompose_options = decompose;
        self
    }

    pub fn with_annotation(mut self, annotate: bool) -> Self {
        self.annotate_options = annotate;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }
}

/// A single step in an episode.
#[derive(Debug, Clone)]
pub struct Step<S, A> {
    /// State the action was taken in
    pub state: S,
    /// Action taken: a primitive, an annotated primitive, or a whole option
    pub action: ActionKind<S, A>,
    /// Reward received; the cumulative discounted reward for an option
    pub reward: f64,
    /// State after the action
    pub next_state: S,
    /// Whether this step ended the episode
    pub done: bool,
}

/// A recorded trajectory.
#[derive(Debug, Clone)]
pub struct Episode<S, A> {
    /// State the episode started in
    pub initial_state: S,
    /// The steps taken
    pub steps: Vec<Step<S, A>>,
}

impl<S, A> Episode<S, A> {
    /// Create an episode with no steps.
    pub fn new(initial_state: S) -> Self {
        Self {
            initial_state,
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, step: Step<S, A>) {
        self.steps.push(step);
    }

    /// Extend with an episode that starts where this one ends.
    pub fn append(&mut self, other: Episode<S, A>) {
        self.steps.extend(other.steps);
    }

    /// The last state reached.
    pub fn final_state(&self) -> &S {
        self.steps
            .last()
            .map(|s| &s.next_state)
            .unwrap_or(&self.initial_state)
    }

    /// Get the total reward.
    pub fn total_reward(&self) -> f64 {
        self.steps.iter().map(|s| s.reward).sum()
    }

    /// Get the discounted reward with given discount factor.
    pub fn discounted_reward(&self, gamma: f64) -> f64 {
        let mut total = 0.0;
        let mut discount = 1.0;
        for step in &self.steps {
            total += discount * step.reward;
            discount *= gamma;
        }
        total
    }

    /// Number of recorded steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Check if the episode ended in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.steps.last().map(|s| s.done).unwrap_or(false)
    }

    pub fn rewards(&self) -> Vec<f64> {
        self.steps.iter().map(|s| s.reward).collect()
    }

    pub fn actions(&self) -> Vec<ActionKind<S, A>>
    where
        A: Clone,
    {
        self.steps.iter().map(|s| s.action.clone()).collect()
    }

    /// Every visited state, starting with the initial one.
    pub fn states(&self) -> Vec<S>
    where
        S: Clone,
    {
        std::iter::once(self.initial_state.clone())
            .chain(self.steps.iter().map(|s| s.next_state.clone()))
            .collect()
    }
}

/// Follow `policy` from `initial` in a world simulated from a model.
///
/// Stops when the terminal function holds or the step budget is spent.
///
/// # Example
///
/// ```rust
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
/// use semimdp_core::{FnModel, TransitionProb};
/// use semimdp_options::{evaluate, ActionKind, FnPolicy, RolloutConfig};
///
/// let model = FnModel::new(|s: &i32, _a: &&'static str| vec![TransitionProb::certain(s + 1)]);
/// let policy = FnPolicy::new(|_s: &i32| Some(ActionKind::Primitive("step")));
/// let mut rng = StdRng::seed_from_u64(0);
///
/// let episode = evaluate(
///     &policy,
///     0,
///     &model,
///     &|_s: &i32, _a: &&'static str, _n: &i32| 1.0,
///     &|s: &i32| *s == 3,
///     &RolloutConfig::default(),
///     &mut rng,
/// )
/// .unwrap();
/// assert_eq!(episode.len(), 3);
/// assert_eq!(*episode.final_state(), 3);
/// ```
pub fn evaluate<S, A, P, M, R, T>(
    policy: &P,
    initial: S,
    model: &M,
    reward: &R,
    terminal: &T,
    config: &RolloutConfig,
    rng: &mut dyn RngCore,
) -> Result<Episode<S, A>, PlanningError>
where
    S: Clone,
    A: Action,
    P: Policy<S, ActionKind<S, A>> + ?Sized,
    M: TransitionModel<S, A>,
    R: RewardFunction<S, A>,
    T: TerminalFunction<S>,
{
    let mut world = ModelWorld::new(model, reward, terminal);
    follow(policy, initial, &mut world, config, rng)
}

/// Follow `policy` in a live environment from its current observation.
pub fn evaluate_in_environment<E, P>(
    policy: &P,
    env: &mut E,
    config: &RolloutConfig,
    rng: &mut dyn RngCore,
) -> Result<Episode<E::State, E::Action>, PlanningError>
where
    E: Environment,
    P: Policy<E::State, ActionKind<E::State, E::Action>> + ?Sized,
{
    let initial = env.current_observation();
    let mut world = EnvironmentWorld::new(env);
    follow(policy, initial, &mut world, config, rng)
}

/// Run `num_episodes` model rollouts from the same initial state.
#[allow(clippy::too_many_arguments)]
pub fn evaluate_batch<S, A, P, M, R, T>(
    policy: &P,
    initial: &S,
    model: &M,
    reward: &R,
    terminal: &T,
    config: &RolloutConfig,
    num_episodes: usize,
    rng: &mut dyn RngCore,
) -> Result<Vec<Episode<S, A>>, PlanningError>
where
    S: Clone,
    A: Action,
    P: Policy<S, ActionKind<S, A>> + ?Sized,
    M: TransitionModel<S, A>,
    R: RewardFunction<S, A>,
    T: TerminalFunction<S>,
{
    (0..num_episodes)
        .map(|_| evaluate(policy, initial.clone(), model, reward, terminal, config, &mut *rng))
        .collect()
}

fn follow<S, A, P, W>(
    policy: &P,
    initial: S,
    world: &mut W,
    config: &RolloutConfig,
    rng: &mut dyn RngCore,
) -> Result<Episode<S, A>, PlanningError>
where
    S: Clone,
    A: Action,
    P: Policy<S, ActionKind<S, A>> + ?Sized,
    W: World<S, A>,
{
    debug!(max_steps = ?config.max_steps, decompose = config.decompose_options, "rollout started");
    let mut episode = Episode::new(initial.clone());
    let mut state = initial;

    while !world.is_terminal(&state) && config.max_steps.map_or(true, |max| episode.len() < max) {
        state = follow_one(policy, state, world, config, &mut episode, rng)?;
    }

    debug!(
        steps = episode.len(),
        total_reward = episode.total_reward(),
        terminal = episode.is_terminal(),
        "rollout complete"
    );
    Ok(episode)
}

/// Take one decision of `policy`, record it, and return the next state.
fn follow_one<S, A, P, W>(
    policy: &P,
    state: S,
    world: &mut W,
    config: &RolloutConfig,
    episode: &mut Episode<S, A>,
    rng: &mut dyn RngCore,
) -> Result<S, PlanningError>
where
    S: Clone,
    A: Action,
    P: Policy<S, ActionKind<S, A>> + ?Sized,
    W: World<S, A>,
{
    match policy.sample(&state, rng)? {
        ActionKind::Option(option) if !config.decompose_options => {
            // The episode records what the world paid, discounted like the
            // option's own bookkeeping.
            let discount = option.discount();
            let mut paid = ExecutionContext::new();
            let outcome = execute_option(option.as_ref(), state.clone(), world, rng, &mut |record| {
                paid.record(record.reward, discount)
            })?;
            debug!(option = option.name(), steps = outcome.context.steps, "recorded option as one step");
            episode.push(Step {
                state,
                action: ActionKind::Option(option),
                reward: paid.cumulative_reward,
                next_state: outcome.state.clone(),
                done: outcome.cause == TerminationCause::Mdp,
            });
            Ok(outcome.state)
        }
        ActionKind::Option(option) => {
            let annotate = config.annotate_options;
            let outcome = execute_option(option.as_ref(), state, world, rng, &mut |record| {
                let action = if annotate {
                    ActionKind::Annotated(AnnotatedAction::new(record.option, record.index, record.action))
                } else {
                    ActionKind::Primitive(record.action)
                };
                episode.push(Step {
                    state: record.state,
                    action,
                    reward: record.reward,
                    next_state: record.next_state,
                    done: false,
                });
            })?;
            if outcome.cause == TerminationCause::Mdp {
                if let Some(last) = episode.steps.last_mut() {
                    last.done = true;
                }
            }
            Ok(outcome.state)
        }
        primitive => {
            let action = primitive.primitive().cloned().ok_or_else(|| PlanningError::UnsupportedAction {
                action: primitive.name(),
                context: "rollout",
            })?;
            let (next, reward) = world.step(&state, &action, rng)?;
            let done = world.is_terminal(&next);
            episode.push(Step {
                state,
                action: primitive,
                reward,
                next_state: next.clone(),
                done,
            });
            Ok(next)
        }
    }
}

/// Compute statistics over multiple rollouts.
#[derive(Debug, Clone)]
pub struct RolloutStats {
    /// Number of episodes
    pub num_episodes: usize,
    /// Mean total reward
    pub mean_reward: f64,
    /// Standard deviation of total reward
    pub std_reward: f64,
    /// Mean episode length
    pub mean_length: f64,
    /// Number of episodes that reached terminal state
    pub num_terminal: usize,
}

impl RolloutStats {
    /// Summarise a set of episodes. All statistics are zero when empty.
    pub fn from_episodes<S, A>(episodes: &[Episode<S, A>]) -> Self {
        let n = episodes.len();
        if n == 0 {
            return Self {
                num_episodes: 0,
                mean_reward: 0.0,
                std_reward: 0.0,
                mean_length: 0.0,
                num_terminal: 0,
            };
        }

        let rewards: Vec<f64> = episodes.iter().map(|e| e.total_reward()).collect();
        let mean_reward = rewards.iter().sum::<f64>() / n as f64;
        let mean_length = episodes.iter().map(|e| e.len() as f64).sum::<f64>() / n as f64;
        let variance = rewards
            .iter()
            .map(|r| (r - mean_reward).powi(2))
            .sum::<f64>()
            / n as f64;

        Self {
            num_episodes: n,
            mean_reward,
            std_reward: variance.sqrt(),
            mean_length,
            num_terminal: episodes.iter().filter(|e| e.is_terminal()).count(),
        }
    }
}

impl fmt::Display for RolloutStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Rollout Statistics ({} episodes):", self.num_episodes)?;
        writeln!(
            f,
            "  Mean reward: {:.4} ± {:.4}",
            self.mean_reward, self.std_reward
        )?;
        writeln!(f, "  Mean length: {:.2}", self.mean_length)?;
        writeln!(
            f,
            "  Terminal: {}/{}",
            self.num_terminal, self.num_episodes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::option::{PolicyOption, TemporalOption, Termination};
    use crate::policy::{FnPolicy, RandomPolicy};
    use float_eq::assert_float_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use semimdp_core::{FnModel, NeverTerminal, SimulatedEnvironment, TransitionProb};

    type Kind = ActionKind<i32, &'static str>;

    fn line() -> FnModel<impl Fn(&i32, &&'static str) -> Vec<TransitionProb<i32>>> {
        FnModel::new(|s: &i32, a: &&'static str| {
            let next = match *a {
                "right" => s + 1,
                "left" => s - 1,
                _ => *s,
            };
            vec![TransitionProb::certain(next)]
        })
    }

    fn unit_reward(_s: &i32, _a: &&'static str, _n: &i32) -> f64 {
        1.0
    }

    fn at_five(s: &i32) -> bool {
        *s == 5
    }

    /// From 0 take the option to 3, then step right.
    fn option_policy() -> impl Policy<i32, Kind> {
        let to_three = Kind::option(
            PolicyOption::new(
                "toThree",
                FnPolicy::new(|_s: &i32| Some(Kind::Primitive("right"))),
                Termination::states(|s: &i32| *s == 3),
            )
            .with_discount(0.5),
        );
        FnPolicy::new(move |s: &i32| {
            Some(if *s == 0 {
                to_three.clone()
            } else {
                Kind::Primitive("right")
            })
        })
    }

    #[test]
    fn test_rollout_terminates() {
        let model = line();
        let policy = FnPolicy::new(|_s: &i32| Some(Kind::Primitive("right")));
        let mut rng = StdRng::seed_from_u64(0);

        let episode = evaluate(&policy, 0, &model, &unit_reward, &at_five, &RolloutConfig::default(), &mut rng).unwrap();

        assert!(episode.is_terminal());
        assert_eq!(episode.len(), 5);
        assert_eq!(episode.states(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(episode.total_reward(), 5.0);
    }

    #[test]
    fn test_terminal_initial_state_gives_empty_episode() {
        let model = line();
        let policy = FnPolicy::new(|_s: &i32| Some(Kind::Primitive("right")));
        let mut rng = StdRng::seed_from_u64(0);

        let episode = evaluate(&policy, 5, &model, &unit_reward, &at_five, &RolloutConfig::default(), &mut rng).unwrap();
        assert!(episode.is_empty());
        assert_eq!(*episode.final_state(), 5);
    }

    #[test]
    fn test_step_budget() {
        let model = line();
        let policy = FnPolicy::new(|_s: &i32| Some(Kind::Primitive("right")));
        let mut rng = StdRng::seed_from_u64(0);
        let config = RolloutConfig::default().with_max_steps(3);

        let episode = evaluate(&policy, 0, &model, &unit_reward, &NeverTerminal, &config, &mut rng).unwrap();
        assert_eq!(episode.len(), 3);
        assert!(!episode.is_terminal());
    }

    #[test]
    fn test_decomposed_and_annotated() {
        let model = line();
        let mut rng = StdRng::seed_from_u64(0);

        let episode = evaluate(&option_policy(), 0, &model, &unit_reward, &at_five, &RolloutConfig::default(), &mut rng).unwrap();

        let names: Vec<String> = episode.actions().iter().map(|a| a.name()).collect();
        assert_eq!(
            names,
            vec!["toThree(0)-right", "toThree(1)-right", "toThree(2)-right", "right", "right"]
        );
        assert_eq!(episode.rewards(), vec![1.0; 5]);
        assert!(episode.is_terminal());
    }

    #[test]
    fn test_decomposed_without_annotation() {
        let model = line();
        let mut rng = StdRng::seed_from_u64(0);
        let config = RolloutConfig::default().with_annotation(false);

        let episode = evaluate(&option_policy(), 0, &model, &unit_reward, &at_five, &config, &mut rng).unwrap();
        assert!(episode
            .actions()
            .iter()
            .all(|a| matches!(a, ActionKind::Primitive("right"))));
    }

    #[test]
    fn test_option_recorded_as_single_step() {
        let model = line();
        let mut rng = StdRng::seed_from_u64(0);
        let config = RolloutConfig::default().with_decomposition(false);

        let episode = evaluate(&option_policy(), 0, &model, &unit_reward, &at_five, &config, &mut rng).unwrap();

        assert_eq!(episode.len(), 3);
        assert_eq!(episode.actions()[0].name(), "toThree");
        assert_eq!(episode.steps[0].next_state, 3);
        // 1 + 0.5 + 0.25 under the option's own discount
        assert_float_eq!(episode.steps[0].reward, 1.75, abs <= 1e-12);
    }

    #[test]
    fn test_recorded_option_reports_world_reward() {
        let model = line();
        let mut rng = StdRng::seed_from_u64(0);
        let tracked = Kind::option(
            PolicyOption::new(
                "toThree",
                FnPolicy::new(|_s: &i32| Some(Kind::Primitive("right"))),
                Termination::states(|s: &i32| *s == 3),
            )
            .with_reward_tracking(|_s: &i32, _a: &&'static str, _n: &i32| 100.0),
        );
        let policy = FnPolicy::new(move |s: &i32| {
            Some(if *s == 0 {
                tracked.clone()
            } else {
                Kind::Primitive("right")
            })
        });

        for decompose in [false, true] {
            let config = RolloutConfig::default().with_decomposition(decompose);
            let episode = evaluate(&policy, 0, &model, &unit_reward, &at_five, &config, &mut rng).unwrap();
            assert_float_eq!(episode.total_reward(), 5.0, abs <= 1e-12);
        }
    }

    #[test]
    fn test_option_interrupted_by_mdp_marks_done() {
        let model = line();
        let mut rng = StdRng::seed_from_u64(0);
        let terminal = |s: &i32| *s == 2;

        let episode = evaluate(&option_policy(), 0, &model, &unit_reward, &terminal, &RolloutConfig::default(), &mut rng).unwrap();
        assert_eq!(episode.len(), 2);
        assert!(episode.is_terminal());
        assert_eq!(*episode.final_state(), 2);
    }

    #[test]
    fn test_evaluate_in_environment() {
        let mut env = SimulatedEnvironment::new(line(), unit_reward, at_five, 0);
        let mut rng = StdRng::seed_from_u64(0);

        let episode = evaluate_in_environment(&option_policy(), &mut env, &RolloutConfig::default(), &mut rng).unwrap();
        assert_eq!(episode.len(), 5);
        assert!(env.is_in_terminal_state());
    }

    #[test]
    fn test_episode_append_and_discount() {
        let step = |s: i32| Step {
            state: s,
            action: Kind::Primitive("right"),
            reward: 1.0,
            next_state: s + 1,
            done: false,
        };
        let mut first = Episode::new(0);
        first.push(step(0));
        let mut second = Episode::new(1);
        second.push(step(1));
        second.push(step(2));

        first.append(second);
        assert_eq!(first.states(), vec![0, 1, 2, 3]);
        // With gamma=0.9: 1 + 0.9 + 0.81 = 2.71
        assert_float_eq!(first.discounted_reward(0.9), 2.71, abs <= 1e-10);
    }

    #[test]
    fn test_batch_stats() {
        let model = line();
        let policy = RandomPolicy::new(|_s: &i32| vec![Kind::Primitive("left"), Kind::Primitive("right")]);
        let mut rng = StdRng::seed_from_u64(9);
        let config = RolloutConfig::default().with_max_steps(20);

        let episodes = evaluate_batch(&policy, &0, &model, &unit_reward, &at_five, &config, 10, &mut rng).unwrap();
        let stats = RolloutStats::from_episodes(&episodes);

        assert_eq!(stats.num_episodes, 10);
        assert!(stats.mean_length > 0.0 && stats.mean_length <= 20.0);
        // Unit reward per step
        assert_float_eq!(stats.mean_reward, stats.mean_length, abs <= 1e-12);
        assert!(stats.to_string().contains("10 episodes"));
    }
}

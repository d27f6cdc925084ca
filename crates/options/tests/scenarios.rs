//! End-to-end scenarios: rollouts, option execution and expectation search
//! over small hand-checkable worlds.

use std::collections::HashMap;

use float_eq::assert_float_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;
use semimdp_core::{FnModel, NeverTerminal, TransitionProb, ValueHasher};
use semimdp_options::{
    evaluate, execute_option, ActionKind, ExpectationSearch, FnPolicy, ModelWorld, PlanningError,
    PolicyOption, PrimitiveOption, RolloutConfig, SearchConfig, TemporalOption, Termination,
    TerminationCause,
};

// ============================================================================
// Deterministic two-step option: A -a1-> B -a2-> C
// ============================================================================

type Abc = ActionKind<char, &'static str>;

fn abc_model() -> FnModel<impl Fn(&char, &&'static str) -> Vec<TransitionProb<char>>> {
    FnModel::new(|s: &char, a: &&'static str| {
        let next = match (*s, *a) {
            ('A', "a1") => 'B',
            ('B', "a2") => 'C',
            (s, _) => s,
        };
        vec![TransitionProb::certain(next)]
    })
}

fn abc_reward(_s: &char, a: &&'static str, _n: &char) -> f64 {
    match *a {
        "a1" => 1.0,
        "a2" => 2.0,
        _ => 0.0,
    }
}

fn a_to_c() -> Abc {
    Abc::option(
        PolicyOption::new(
            "AtoC",
            FnPolicy::new(|s: &char| match s {
                'A' => Some(Abc::Primitive("a1")),
                'B' => Some(Abc::Primitive("a2")),
                _ => None,
            }),
            Termination::states(|s: &char| *s == 'C'),
        )
        .with_discount(0.9),
    )
}

#[test]
fn two_step_option_rollout_trace() {
    let option = a_to_c();
    let policy = FnPolicy::new(move |s: &char| if *s == 'A' { Some(option.clone()) } else { None });
    let mut rng = StdRng::seed_from_u64(0);

    let episode = evaluate(
        &policy,
        'A',
        &abc_model(),
        &abc_reward,
        &|s: &char| *s == 'C',
        &RolloutConfig::default(),
        &mut rng,
    )
    .unwrap();

    let trace: Vec<(char, Abc, f64)> = episode
        .steps
        .iter()
        .map(|s| (s.state, s.action.clone(), s.reward))
        .collect();
    assert_eq!(
        trace,
        vec![
            ('A', Abc::Primitive("a1"), 1.0),
            ('B', Abc::Primitive("a2"), 2.0),
        ]
    );
    assert_eq!(*episode.final_state(), 'C');
    assert_eq!(episode.steps[1].action.name(), "AtoC(1)-a2");
}

#[test]
fn two_step_option_recorded_whole() {
    let option = a_to_c();
    let policy = FnPolicy::new(move |s: &char| if *s == 'A' { Some(option.clone()) } else { None });
    let mut rng = StdRng::seed_from_u64(0);
    let config = RolloutConfig::default().with_decomposition(false);

    let episode = evaluate(&policy, 'A', &abc_model(), &abc_reward, &|s: &char| *s == 'C', &config, &mut rng).unwrap();

    assert_eq!(episode.len(), 1);
    assert_eq!(episode.steps[0].next_state, 'C');
    assert_float_eq!(episode.steps[0].reward, 2.8, abs <= 1e-12);
}

#[test]
fn two_step_option_transitions() {
    let config = SearchConfig::default().with_discount(0.9);
    let mut search = ExpectationSearch::new(abc_model(), abc_reward, ValueHasher, config).unwrap();

    let option = a_to_c();
    let result = search.outcome(&option, &'A').unwrap();

    assert_eq!(result.terminations, vec![TransitionProb::new('C', 1.0)]);
    assert_eq!(result.transitions.len(), 1);
    assert_eq!(result.transitions[0].state, 'C');
    assert_float_eq!(result.transitions[0].probability, 0.81, abs <= 1e-12);
    assert_float_eq!(result.expected_reward, 2.8, abs <= 1e-12);
}

// ============================================================================
// Pruned branch: three equally likely outcomes per step
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Cell {
    T,
    X,
    Y,
}

#[test]
fn pruned_branch_loses_bounded_mass() {
    let third = 1.0 / 3.0;
    let model = FnModel::new(move |_s: &Cell, _a: &&'static str| {
        vec![
            TransitionProb::new(Cell::T, third),
            TransitionProb::new(Cell::X, third),
            TransitionProb::new(Cell::Y, third),
        ]
    });
    let option = PolicyOption::new(
        "roll",
        FnPolicy::new(|_s: &Cell| Some(ActionKind::Primitive("roll"))),
        Termination::states(|s: &Cell| *s == Cell::T),
    );
    let config = SearchConfig::default().with_discount(1.0).with_cutoff(0.05);
    let reward = |_s: &Cell, _a: &&'static str, _n: &Cell| 0.0;
    let mut search = ExpectationSearch::new(model, reward, ValueHasher, config).unwrap();

    let result = search.compute_transitions(&option, &Cell::X).unwrap();
    let stats = search.stats();

    // Depths 1 and 2 survive (1/3, 1/9); every depth-3 child (1/27) is cut
    assert_eq!(stats.expanded, 1 + 2 + 4);
    assert_eq!(stats.pruned, 12);

    // Both surviving terminations aggregate into one entry
    assert_eq!(result.transitions.len(), 1);
    assert_eq!(result.transitions[0].state, Cell::T);
    assert_float_eq!(result.total_mass(), 5.0 / 9.0, abs <= 1e-12);

    assert!(result.total_mass() < 1.0);
    assert!(result.total_mass() >= 1.0 - stats.pruned as f64 * 0.05);
}

// ============================================================================
// Mass conservation against brute-force enumeration
// ============================================================================

type Walk = (i32, u8);

const GAMMA: f64 = 0.9;

fn walk_beta(s: &Walk) -> f64 {
    if s.1 >= 3 {
        1.0
    } else if s.0 == 0 {
        0.25
    } else {
        0.0
    }
}

fn walk_reward(_s: &Walk, _a: &&'static str, n: &Walk) -> f64 {
    n.0 as f64
}

fn walk_successors(s: &Walk) -> [(Walk, f64); 2] {
    [((s.0 + 1, s.1 + 1), 0.5), ((s.0 - 1, s.1 + 1), 0.5)]
}

/// Enumerate every path, accumulating discounted termination mass per state
/// and the expected discounted reward.
fn brute_force(
    state: Walk,
    probability: f64,
    reward_so_far: f64,
    discount: f64,
    steps: usize,
    masses: &mut HashMap<Walk, f64>,
    expected_reward: &mut f64,
) {
    let beta = if steps == 0 { 0.0 } else { walk_beta(&state) };
    if beta > 0.0 {
        *masses.entry(state).or_default() += probability * beta * discount;
        *expected_reward += probability * beta * reward_so_far;
    }
    if beta < 1.0 {
        for (next, p) in walk_successors(&state) {
            brute_force(
                next,
                probability * (1.0 - beta) * p,
                reward_so_far + discount * walk_reward(&state, &"flip", &next),
                discount * GAMMA,
                steps + 1,
                masses,
                expected_reward,
            );
        }
    }
}

#[test]
fn expectation_search_conserves_mass() {
    let model = FnModel::new(|s: &Walk, _a: &&'static str| {
        walk_successors(s)
            .into_iter()
            .map(|(next, p)| TransitionProb::new(next, p))
            .collect()
    });
    let option = PolicyOption::new(
        "wander",
        FnPolicy::new(|_s: &Walk| Some(ActionKind::Primitive("flip"))),
        Termination::probability(walk_beta),
    );
    let config = SearchConfig::default().with_discount(GAMMA).with_cutoff(0.0);
    let mut search = ExpectationSearch::new(model, walk_reward, ValueHasher, config).unwrap();

    let result = search.compute_transitions(&option, &(0, 0)).unwrap();

    let mut masses = HashMap::new();
    let mut expected_reward = 0.0;
    brute_force((0, 0), 1.0, 0.0, 1.0, 0, &mut masses, &mut expected_reward);

    // One entry per distinct terminal state, no double counting
    assert_eq!(result.transitions.len(), masses.len());
    for t in &result.transitions {
        assert_float_eq!(t.probability, masses[&t.state], abs <= 1e-12);
    }
    let brute_total: f64 = masses.values().sum();
    assert_float_eq!(result.total_mass() / brute_total, 1.0, abs <= 1e-12);
    assert_float_eq!(result.expected_reward, expected_reward, abs <= 1e-12);

    // Undiscounted termination probabilities form a distribution
    let total: f64 = result.terminations.iter().map(|t| t.probability).sum();
    assert_float_eq!(total, 1.0, abs <= 1e-12);
}

// ============================================================================
// Execution bookkeeping
// ============================================================================

fn counter() -> FnModel<impl Fn(&i32, &&'static str) -> Vec<TransitionProb<i32>>> {
    FnModel::new(|s: &i32, _a: &&'static str| vec![TransitionProb::certain(s + 1)])
}

fn scripted_reward(_s: &i32, _a: &&'static str, n: &i32) -> f64 {
    match n {
        1 => 1.5,
        2 => -2.25,
        3 => 4.0,
        _ => 0.0,
    }
}

fn count_to(goal: i32, gamma: f64) -> PolicyOption<i32, &'static str, impl semimdp_options::Policy<i32, ActionKind<i32, &'static str>>> {
    PolicyOption::new(
        format!("countTo{goal}"),
        FnPolicy::new(|_s: &i32| Some(ActionKind::Primitive("inc"))),
        Termination::states(move |s: &i32| *s == goal),
    )
    .with_discount(gamma)
}

#[test]
fn three_step_discount_bookkeeping_is_exact() {
    let gamma = 0.9;
    let (r1, r2, r3) = (1.5, -2.25, 4.0);
    let model = counter();
    let mut world = ModelWorld::new(&model, &scripted_reward, &NeverTerminal);
    let mut rng = StdRng::seed_from_u64(0);

    let outcome = execute_option(&count_to(3, gamma), 0, &mut world, &mut rng, &mut |_| {}).unwrap();

    assert_eq!(outcome.context.steps, 3);
    assert_eq!(outcome.context.cumulative_reward, r1 + gamma * r2 + gamma * gamma * r3);
}

#[test]
fn option_terminates_by_itself() {
    let model = counter();
    let terminal = |s: &i32| *s >= 10;
    let mut world = ModelWorld::new(&model, &scripted_reward, &terminal);
    let mut rng = StdRng::seed_from_u64(0);

    let outcome = execute_option(&count_to(3, 1.0), 0, &mut world, &mut rng, &mut |_| {}).unwrap();
    assert_eq!(outcome.cause, TerminationCause::Option);
    assert_eq!(outcome.state, 3);
}

#[test]
fn surrounding_mdp_forces_termination_mid_option() {
    let model = counter();
    let terminal = |s: &i32| *s >= 2;
    let mut world = ModelWorld::new(&model, &scripted_reward, &terminal);
    let mut rng = StdRng::seed_from_u64(0);

    let outcome = execute_option(&count_to(3, 1.0), 0, &mut world, &mut rng, &mut |_| {}).unwrap();
    assert_eq!(outcome.cause, TerminationCause::Mdp);
    assert_eq!(outcome.state, 2);
    // The step into the terminal state is still booked
    assert_float_eq!(outcome.context.cumulative_reward, 1.5 - 2.25, abs <= 1e-12);
}

#[test]
fn option_as_primitive_equivalence() {
    // A slippery step: moves with probability 0.7, stays otherwise
    let model = FnModel::new(|s: &i32, _a: &&'static str| {
        vec![TransitionProb::new(s + 1, 0.7), TransitionProb::new(*s, 0.3)]
    });
    let reward = |s: &i32, _a: &&'static str, n: &i32| if n > s { 1.0 } else { -0.5 };
    let config = RolloutConfig::default().with_max_steps(1).with_decomposition(false);

    let direct = FnPolicy::new(|_s: &i32| Some(ActionKind::Primitive("step")));
    let wrapped_option = ActionKind::option(PrimitiveOption::new("step"));
    let wrapped = FnPolicy::new(move |_s: &i32| Some(wrapped_option.clone()));

    for seed in 0..20 {
        let a = evaluate(&direct, 0, &model, &reward, &NeverTerminal, &config, &mut StdRng::seed_from_u64(seed)).unwrap();
        let b = evaluate(&wrapped, 0, &model, &reward, &NeverTerminal, &config, &mut StdRng::seed_from_u64(seed)).unwrap();

        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert_eq!(a.steps[0].next_state, b.steps[0].next_state);
        assert_eq!(a.steps[0].reward, b.steps[0].reward);
    }
}

#[test]
fn primitive_option_model_matches_primitive() {
    let model = FnModel::new(|s: &i32, _a: &&'static str| {
        vec![TransitionProb::new(s + 1, 0.7), TransitionProb::new(*s, 0.3)]
    });
    let reward = |s: &i32, _a: &&'static str, n: &i32| if n > s { 1.0 } else { -0.5 };
    let config = SearchConfig::default().with_discount(0.95).with_cutoff(0.0);
    let mut search = ExpectationSearch::new(model, reward, ValueHasher, config).unwrap();

    let primitive = search.outcome(&ActionKind::Primitive("step"), &0).unwrap();
    let option = search
        .outcome(&ActionKind::option(PrimitiveOption::new("step")), &0)
        .unwrap();

    assert_eq!(primitive.transitions.len(), option.transitions.len());
    for p in &primitive.transitions {
        let o = option
            .transitions
            .iter()
            .find(|o| o.state == p.state)
            .unwrap();
        assert_float_eq!(p.probability, o.probability, abs <= 1e-12);
    }
    assert_float_eq!(primitive.expected_reward, option.expected_reward, abs <= 1e-12);
}

#[test]
fn option_outside_initiation_set_is_rejected() {
    let model = counter();
    let mut world = ModelWorld::new(&model, &scripted_reward, &NeverTerminal);
    let mut rng = StdRng::seed_from_u64(0);
    let option = count_to(3, 1.0).with_initiation(|s: &i32| *s < 3);

    let result = execute_option(&option, 5, &mut world, &mut rng, &mut |_| {});
    assert!(matches!(result, Err(PlanningError::NotApplicable { .. })));
    assert!(!option.applicable_in(&5));
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn configs_load_from_json_with_defaults() {
    let rollout: RolloutConfig =
        serde_json::from_str(r#"{ "annotate_options": false, "max_steps": 200 }"#).unwrap();
    assert!(rollout.decompose_options);
    assert!(!rollout.annotate_options);
    assert_eq!(rollout.max_steps, Some(200));

    let search: SearchConfig = serde_json::from_str(r#"{ "discount": 0.95 }"#).unwrap();
    assert_eq!(search.discount, 0.95);
    assert_eq!(search.cutoff_probability, SearchConfig::default().cutoff_probability);
    assert_eq!(search.max_depth, Some(10_000));

    let round_trip: SearchConfig = serde_json::from_str(&serde_json::to_string(&search).unwrap()).unwrap();
    assert_eq!(round_trip, search);
}

#[test]
fn invalid_search_config_is_rejected() {
    let config: SearchConfig = serde_json::from_str(r#"{ "cutoff_probability": 1.5 }"#).unwrap();
    let result = ExpectationSearch::new(counter(), scripted_reward, ValueHasher, config);
    assert!(matches!(result, Err(PlanningError::InvalidConfig { .. })));
}

// ============================================================================
// Logging
// ============================================================================

#[test]
fn rollout_runs_under_env_filtered_subscriber() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("semimdp_options=debug"))
        .with_test_writer()
        .finish();

    let option = a_to_c();
    let policy = FnPolicy::new(move |s: &char| if *s == 'A' { Some(option.clone()) } else { None });
    let mut rng = StdRng::seed_from_u64(0);

    let episode = tracing::subscriber::with_default(subscriber, || {
        evaluate(
            &policy,
            'A',
            &abc_model(),
            &abc_reward,
            &|s: &char| *s == 'C',
            &RolloutConfig::default(),
            &mut rng,
        )
    })
    .unwrap();
    assert_eq!(*episode.final_state(), 'C');
}

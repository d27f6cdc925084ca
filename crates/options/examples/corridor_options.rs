//! Options in a Slippery Corridor
//!
//! Run with: cargo run -p semimdp-options --example corridor_options
//! Set RUST_LOG=debug to see option and search events.
//!
//! This example walks through the semi-MDP workflow:
//! - Options are built from internal policies and termination conditions
//! - ExpectationSearch derives each option's transition model
//! - Value iteration backs up primitives and options uniformly
//! - Rollouts decompose options into annotated primitive steps

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use semimdp_core::{FnModel, SimulatedEnvironment, TransitionProb, ValueHasher};
use semimdp_options::{
    evaluate, evaluate_batch, evaluate_in_environment, ActionKind, EpsilonGreedyPolicy, ExpectationSearch,
    FnPolicy, GreedyPolicy, PolicyOption, RolloutConfig, RolloutStats, SearchConfig, Termination,
};

type Kind = ActionKind<i32, &'static str>;

const LENGTH: i32 = 10;
const DOOR: i32 = 5;
const GAMMA: f64 = 0.95;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== Options in a Slippery Corridor ===\n");

    // Moving succeeds 80% of the time; otherwise the agent stays put
    let model = FnModel::new(|s: &i32, a: &&'static str| {
        let target = match *a {
            "right" => (s + 1).min(LENGTH),
            "left" => (s - 1).max(0),
            _ => *s,
        };
        if target == *s {
            vec![TransitionProb::certain(*s)]
        } else {
            vec![TransitionProb::new(target, 0.8), TransitionProb::new(*s, 0.2)]
        }
    });
    let reward = |_s: &i32, _a: &&'static str, n: &i32| if *n == LENGTH { 10.0 } else { -1.0 };
    let terminal = |s: &i32| *s == LENGTH;

    // -------------------------------------------------------------------------
    // 1. Options
    // -------------------------------------------------------------------------
    println!("1. Options");
    println!("----------\n");

    let to_door = Kind::option(
        PolicyOption::new(
            "toDoor",
            FnPolicy::new(|_s: &i32| Some(Kind::Primitive("right"))),
            Termination::states(|s: &i32| *s == DOOR),
        )
        .with_initiation(|s: &i32| *s < DOOR)
        .with_discount(GAMMA),
    );
    let to_goal = Kind::option(
        PolicyOption::new(
            "toGoal",
            FnPolicy::new(|_s: &i32| Some(Kind::Primitive("right"))),
            Termination::states(|s: &i32| *s == LENGTH),
        )
        .with_initiation(|s: &i32| *s >= DOOR)
        .with_discount(GAMMA),
    );

    let actions = move |s: &i32| {
        let mut available = vec![Kind::Primitive("left"), Kind::Primitive("right")];
        if *s < DOOR {
            available.push(to_door.clone());
        } else {
            available.push(to_goal.clone());
        }
        available
    };

    // -------------------------------------------------------------------------
    // 2. Derived option models
    // -------------------------------------------------------------------------
    println!("2. Derived Option Models");
    println!("------------------------\n");

    let config = SearchConfig::default().with_discount(GAMMA).with_cutoff(1e-6);
    let mut search = ExpectationSearch::new(&model, &reward, ValueHasher, config)?.with_terminal(&terminal);

    for start in [0, 3] {
        let door = actions(&start).pop().ok_or("no option available")?;
        let expectation = search.outcome(&door, &start)?;
        println!(
            "  {} from {}: mass {:.4}, expected reward {:.4}",
            door.name(),
            start,
            expectation.total_mass(),
            expectation.expected_reward
        );
    }
    println!();

    // -------------------------------------------------------------------------
    // 3. Value iteration over primitives and options
    // -------------------------------------------------------------------------
    println!("3. Value Iteration");
    println!("------------------\n");

    let mut outcomes = HashMap::new();
    for s in 0..LENGTH {
        let row = actions(&s)
            .into_iter()
            .map(|a| search.outcome(&a, &s).map(|o| (a, o)))
            .collect::<Result<Vec<_>, _>>()?;
        outcomes.insert(s, row);
    }

    let mut values = vec![0.0; (LENGTH + 1) as usize];
    for sweep in 0..200 {
        let mut delta: f64 = 0.0;
        for s in 0..LENGTH {
            let best = outcomes[&s]
                .iter()
                .map(|(_, o)| {
                    o.expected_reward
                        + o.transitions
                            .iter()
                            .map(|t| t.probability * values[t.state as usize])
                            .sum::<f64>()
                })
                .fold(f64::NEG_INFINITY, f64::max);
            delta = delta.max((best - values[s as usize]).abs());
            values[s as usize] = best;
        }
        if delta < 1e-9 {
            println!("  Converged after {} sweeps", sweep + 1);
            break;
        }
    }
    for (s, v) in values.iter().enumerate() {
        println!("  V({s:2}) = {v:8.4}");
    }
    println!();

    let q_table: HashMap<i32, Vec<(Kind, f64)>> = outcomes
        .into_iter()
        .map(|(s, row)| {
            let q = row
                .into_iter()
                .map(|(a, o)| {
                    let future: f64 = o
                        .transitions
                        .iter()
                        .map(|t| t.probability * values[t.state as usize])
                        .sum();
                    (a, o.expected_reward + future)
                })
                .collect();
            (s, q)
        })
        .collect();
    let q_function = move |s: &i32| q_table.get(s).cloned().unwrap_or_default();

    // -------------------------------------------------------------------------
    // 4. Rollouts
    // -------------------------------------------------------------------------
    println!("4. Greedy Rollout (options decomposed and annotated)");
    println!("----------------------------------------------------\n");

    let greedy = GreedyPolicy::new(q_function.clone());
    let mut rng = StdRng::seed_from_u64(17);
    let episode = evaluate(&greedy, 0, &model, &reward, &terminal, &RolloutConfig::default(), &mut rng)?;
    for step in &episode.steps {
        println!(
            "  {:2} --{:<16}--> {:2}  r = {:5.1}",
            step.state,
            step.action.name(),
            step.next_state,
            step.reward
        );
    }
    println!("  Discounted return: {:.4}\n", episode.discounted_reward(GAMMA));

    println!("5. Epsilon-Greedy Batch (options recorded whole)");
    println!("------------------------------------------------\n");

    let explorer = EpsilonGreedyPolicy::new(q_function, 0.2);
    let config = RolloutConfig::default().with_decomposition(false).with_max_steps(100);
    let episodes = evaluate_batch(&explorer, &0, &model, &reward, &terminal, &config, 50, &mut rng)?;
    println!("{}", RolloutStats::from_episodes(&episodes));

    println!("6. Environment Rollout");
    println!("----------------------\n");

    let mut env = SimulatedEnvironment::new(&model, reward, terminal, 0).with_seed(3);
    let episode = evaluate_in_environment(&greedy, &mut env, &RolloutConfig::default(), &mut rng)?;
    println!(
        "  {} primitive steps, total reward {:.1}",
        episode.len(),
        episode.total_reward()
    );

    Ok(())
}

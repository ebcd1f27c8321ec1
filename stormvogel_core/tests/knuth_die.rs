use std::collections::{BTreeMap, HashMap};
use stormvogel_core::{Model, ModelType, StateId, Value, bird::Bird};

fn flip(s: &u32) -> Option<Vec<(Value, u32)>> {
    let (heads, tails) = match s {
        0 => (1, 2),
        1 => (3, 4),
        2 => (5, 6),
        3 => (1, 7),
        4 => (8, 9),
        5 => (10, 11),
        6 => (2, 12),
        s => (*s, *s),
    };
    Some(vec![(Value::ratio(1, 2), heads), (Value::ratio(1, 2), tails)])
}

fn die() -> Model {
    Bird::new(ModelType::Dtmc, 0u32)
        .delta(flip)
        .labels(|s| {
            if *s > 6 {
                vec![format!("rolled{}", s - 6)]
            } else {
                Vec::new()
            }
        })
        .build()
        .expect("build die")
}

// Reachability probabilities by value iteration.
fn reach(model: &Model, label: &str) -> HashMap<StateId, f64> {
    let targets = model.get_states_with_label(label);
    let mut probs = model
        .state_ids()
        .iter()
        .map(|s| (*s, if targets.contains(s) { 1. } else { 0. }))
        .collect::<HashMap<_, _>>();
    for _ in 0..1000 {
        let next = model
            .state_ids()
            .iter()
            .map(|s| {
                if targets.contains(s) {
                    (*s, 1.)
                } else {
                    let p = model
                        .get_branch(*s)
                        .map(|branch| {
                            branch
                                .iter()
                                .map(|(v, t)| v.as_f64().unwrap() * probs[t])
                                .sum::<f64>()
                        })
                        .unwrap_or(0.);
                    (*s, p)
                }
            })
            .collect();
        probs = next;
    }
    probs
}

#[test]
fn structure() {
    let die = die();
    assert_eq!(die.nr_states(), 13);
    assert!(die.is_stochastic(0.));
    for n in 1..=6 {
        let outcomes = die.get_states_with_label(&format!("rolled{n}"));
        assert_eq!(outcomes.len(), 1);
        let outcome = outcomes[0];
        let branch = die.get_branch(outcome).expect("self-loop");
        assert!(branch.targets().all(|t| t == outcome));
    }
}

#[test]
fn fair_die() {
    let die = die();
    let init = die.get_initial_state().unwrap();
    for n in 1..=6 {
        let probs = reach(&die, &format!("rolled{n}"));
        assert!((probs[&init] - 1. / 6.).abs() < 1e-9);
    }
}

#[test]
fn rewards_count_flips() {
    let die = Bird::new(ModelType::Dtmc, 0u32)
        .delta(flip)
        .rewards(|s| {
            let flip = if *s <= 6 { Value::one() } else { Value::zero() };
            BTreeMap::from([(String::from("flips"), flip)])
        })
        .max_size(100)
        .build()
        .expect("build die");
    let flips = die.get_rewards("flips").expect("reward model");
    let init = die.get_initial_state().unwrap();
    assert_eq!(flips.get_state_reward(init), Some(&Value::one()));
    assert_eq!(flips.state_rewards().count(), die.nr_states());
}

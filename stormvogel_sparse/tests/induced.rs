use std::convert::Infallible;
use stormvogel_core::{Branch, Choice, Model, ModelType, Value};
use stormvogel_sparse::{
    CheckOutput, Checker, EngineValue, ResultError, SparseModel, model_checking,
};

// Maximal probability to reach the states labelled by the property,
// by value iteration over the sparse model.
struct MaxReach;

impl Checker for MaxReach {
    type Error = Infallible;

    fn check(&self, model: &SparseModel, property: &str) -> Result<CheckOutput, Self::Error> {
        let matrix = &model.transition_matrix;
        let goal = model.states_with_label(property);
        let mut values = vec![0f64; model.nr_states()];
        let mut choices = vec![0usize; model.nr_states()];
        for _ in 0..1000 {
            let mut next = values.clone();
            for state in 0..model.nr_states() {
                if goal.contains(&state) {
                    next[state] = 1.;
                    continue;
                }
                for (index, row) in matrix.row_group(state).enumerate() {
                    let value = matrix
                        .row(row)
                        .iter()
                        .map(|entry| entry.value.as_f64().unwrap_or_default() * values[entry.column])
                        .sum::<f64>();
                    if value > next[state] {
                        next[state] = value;
                        choices[state] = index;
                    }
                }
            }
            values = next;
        }
        Ok(CheckOutput {
            values: values.into_iter().map(EngineValue::Double).collect(),
            scheduler: (model.model_type == ModelType::Mdp).then_some(choices),
        })
    }
}

fn gamble() -> Model {
    let mut mdp = Model::new_mdp();
    let init = mdp.get_initial_state().unwrap();
    let win = mdp.new_state(["win"]);
    let lose = mdp.new_state(["lose"]);
    let safe = mdp.new_action(["safe"]).unwrap();
    let risky = mdp.new_action(["risky"]).unwrap();
    mdp.set_choice(
        init,
        Choice::new(vec![
            (
                safe,
                Branch::new(vec![(Value::ratio(1, 2), win), (Value::ratio(1, 2), lose)]),
            ),
            (
                risky,
                Branch::new(vec![(Value::ratio(3, 4), win), (Value::ratio(1, 4), lose)]),
            ),
        ]),
    )
    .unwrap();
    mdp.add_self_loops();
    mdp
}

#[test]
fn induced_dtmc_keeps_scheduled_branches() {
    let mdp = gamble();
    let result = model_checking(&mdp, "win", &MaxReach).unwrap();
    let init = mdp.get_initial_state().unwrap();
    assert_eq!(result.maximum_result(), Some(1.));
    assert_eq!(result.get_result_of_state(init), Some(&Value::from(0.75)));
    let risky = mdp.get_action(["risky"]).unwrap();
    assert_eq!(
        result.scheduler().unwrap().get_choice_of_state(init),
        Ok(risky)
    );

    let dtmc = result.generate_induced_dtmc().unwrap();
    assert_eq!(dtmc.model_type(), ModelType::Dtmc);
    assert_eq!(dtmc.nr_states(), mdp.nr_states());
    assert_eq!(dtmc.nr_choices(), dtmc.nr_states());
    let branch = dtmc.get_branch(0).unwrap();
    let risky_branch = mdp.get_choice(init).unwrap().get(risky).unwrap();
    assert_eq!(branch, risky_branch);
    assert!(dtmc.is_stochastic(0.));
    assert_eq!(dtmc.get_states_with_label("win"), vec![1]);
}

#[test]
fn induced_dtmc_needs_scheduler() {
    struct NoScheduler;

    impl Checker for NoScheduler {
        type Error = Infallible;

        fn check(&self, model: &SparseModel, _: &str) -> Result<CheckOutput, Self::Error> {
            Ok(CheckOutput {
                values: vec![EngineValue::Double(0.); model.nr_states()],
                scheduler: None,
            })
        }
    }

    let result = model_checking(&gamble(), "win", &NoScheduler).unwrap();
    assert!(matches!(
        result.generate_induced_dtmc(),
        Err(ResultError::NoScheduler)
    ));
}

#[test]
fn stale_results_are_detected() {
    let mut mdp = gamble();
    let result = model_checking(&mdp, "win", &MaxReach).unwrap();
    assert!(result.is_valid_for(&mdp));
    assert!(result.scheduler().unwrap().is_valid_for(&mdp));
    let lose = mdp.get_states_with_label("lose")[0];
    mdp.remove_state(lose, true).unwrap();
    assert!(!result.is_valid_for(&mdp));
    assert!(!result.scheduler().unwrap().is_valid_for(&mdp));
}

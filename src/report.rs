use serde::Serialize;
use std::{collections::BTreeMap, fmt::Display};
use stormvogel_core::{Model, ModelType};
use stormvogel_sparse::{SparseModel, ValueType};

#[derive(Serialize)]
pub(crate) struct InfoReport {
    pub(crate) model: String,
    pub(crate) model_type: String,
    pub(crate) value_type: ValueType,
    pub(crate) states: usize,
    pub(crate) choices: usize,
    pub(crate) transitions: usize,
    pub(crate) labels: BTreeMap<String, usize>,
    pub(crate) reward_models: Vec<String>,
    pub(crate) parameters: Vec<String>,
    pub(crate) variables: Vec<String>,
    pub(crate) stochastic: Option<bool>,
    pub(crate) zero_transitions: bool,
}

impl InfoReport {
    pub(crate) fn new(name: String, sparse: &SparseModel, model: &Model) -> Self {
        let stochastic = matches!(
            model.model_type(),
            ModelType::Dtmc | ModelType::Mdp | ModelType::Pomdp
        )
        .then(|| model.is_stochastic(1e-6));
        Self {
            model: name,
            model_type: model.model_type().to_string(),
            value_type: sparse.value_type,
            states: model.nr_states(),
            choices: model.nr_choices(),
            transitions: model.nr_transitions(),
            labels: sparse
                .state_labeling
                .iter()
                .map(|(label, states)| (label.clone(), states.len()))
                .collect(),
            reward_models: sparse.reward_models.keys().cloned().collect(),
            parameters: sparse.parameters.iter().map(str::to_owned).collect(),
            variables: model.variables().into_iter().collect(),
            stochastic,
            zero_transitions: model.has_zero_transition(),
        }
    }

    pub(crate) fn print(&self, json: bool) {
        if json {
            let report = serde_json::ser::to_string_pretty(&self).expect("report serialization");
            println!("{report}");
        } else {
            println!("{self}");
        };
    }
}

impl Display for InfoReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} '{}' with {:?} values",
            self.model_type, self.model, self.value_type
        )?;
        writeln!(
            f,
            "{} states, {} choices, {} transitions",
            self.states, self.choices, self.transitions
        )?;
        for (label, count) in &self.labels {
            writeln!(f, "label '{label}': {count} states")?;
        }
        if !self.reward_models.is_empty() {
            writeln!(f, "reward models: {}", self.reward_models.join(", "))?;
        }
        if !self.parameters.is_empty() {
            writeln!(f, "parameters: {}", self.parameters.join(", "))?;
        }
        if !self.variables.is_empty() {
            writeln!(f, "variables: {}", self.variables.join(", "))?;
        }
        if self.zero_transitions {
            writeln!(f, "WARNING: some transitions have value zero")?;
        }
        match self.stochastic {
            Some(true) => write!(f, "all branches sum to one"),
            Some(false) => write!(f, "WARNING: some branches do not sum to one"),
            None => write!(f, "branch values are rates"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stormvogel_core::Value;

    #[test]
    fn report_counts_labels() {
        let mut dtmc = Model::new_dtmc();
        let init = dtmc.get_initial_state().unwrap();
        let a = dtmc.new_state(["end"]);
        let b = dtmc.new_state(["end"]);
        dtmc.set_probabilistic_choice(init, vec![(Value::ratio(1, 3), a), (Value::ratio(1, 3), b)])
            .unwrap();
        dtmc.add_self_loops();
        let sparse = stormvogel_sparse::to_engine(&dtmc).unwrap();
        let report = InfoReport::new(String::from("test"), &sparse, &dtmc);
        assert_eq!(report.labels["end"], 2);
        assert_eq!(report.stochastic, Some(false));
        assert!(report.to_string().contains("WARNING: some branches do not sum to one"));
    }
}

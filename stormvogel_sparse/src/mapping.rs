//! Conversion between [`Model`] and [`SparseModel`].
//!
//! States are mapped to rows by enumeration position, so ids left sparse
//! by deleted states are compacted on the way to the sparse form.
//! On the way back, state ids coincide with row indices.
//!
//! Actions are identified by their labels: converting back synthesizes
//! actions from the choice labeling, so action handles of the original model
//! are not preserved (though labels and branches are).
//! Rows of a multi-row group without labels get their index within the group as label.

use crate::{
    sparse::{
        EngineValue, SparseMatrixBuilder, SparseModel, SparseRewardModel, ValueType, VarValue,
    },
    symbolic::{SymbolicRationalFunction, VariablePool},
};
use log::{debug, info, trace};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    time::Instant,
};
use stormvogel_core::{
    Branch, Choice, EMPTY_ACTION, INIT_LABEL, Interval, Model, ModelError, ModelType, Observation,
    ParametricError, StateId, Val, Value, ValueError,
};
use thiserror::Error;

/// The error type for conversions between [`Model`] and [`SparseModel`].
#[derive(Debug, Error)]
pub enum MappingError {
    /// A state has no outgoing choice.
    #[error("state {0} has no outgoing choice: add self loops first")]
    MissingSelfLoops(StateId),
    /// A variable valued somewhere is not valued in a state.
    #[error("variable '{variable}' is unassigned in state {state}")]
    UnassignedVariable {
        /// The state missing the variable.
        state: StateId,
        /// The variable.
        variable: String,
    },
    /// A POMDP state has no observation.
    #[error("state {0} has no observation")]
    MissingObservation(StateId),
    /// A reward model has no entry for a state or state-action pair.
    #[error("reward model '{name}' has no reward for state {state}")]
    MissingReward {
        /// The reward model.
        name: String,
        /// The state missing a reward.
        state: StateId,
    },
    /// A state of a continuous-time model has no exit rate.
    #[error("state {0} has no exit rate")]
    MissingExitRate(StateId),
    /// Interval and parametric values cannot share a model.
    #[error("interval and parametric values cannot be mixed")]
    IncompatibleValues,
    /// A value cannot be lifted to the value type of the model.
    #[error("value {value} cannot be represented as {value_type:?}")]
    Lift {
        /// The value.
        value: String,
        /// The value type of the model.
        value_type: ValueType,
    },
    /// A vector does not match the dimensions of the model.
    #[error("{what} has length {found}, expected {expected}")]
    Dimension {
        /// What has the wrong length.
        what: &'static str,
        /// The expected length.
        expected: usize,
        /// The actual length.
        found: usize,
    },
    /// A column (or state index) is out of range.
    #[error("column {0} out of range")]
    Column(usize),
    /// Malformed index vectors.
    #[error("malformed {0}")]
    Malformed(&'static str),
    /// The operation does not apply to this type of model.
    #[error("unsupported model type {0}")]
    UnsupportedModelType(ModelType),
    /// A scheduler picks a choice a state does not have.
    #[error("state {state} has no choice with index {index}")]
    ChoiceIndex {
        /// The state.
        state: usize,
        /// The index of the choice.
        index: usize,
    },
    /// A symbolic value refers to a parameter outside the pool.
    #[error("unknown parameter with index {0}")]
    UnknownParameter(usize),
    /// An exact value with a zero denominator.
    #[error("exact value with zero denominator")]
    ZeroDenominator,
    /// An exact value that does not fit in a 64-bit fraction.
    #[error("exact value {numerator}/{denominator} overflows")]
    RatioOverflow {
        /// Numerator.
        numerator: i64,
        /// Denominator.
        denominator: i64,
    },
    /// Invalid parametric value.
    #[error(transparent)]
    Parametric(#[from] ParametricError),
    /// Invalid value.
    #[error(transparent)]
    Value(#[from] ValueError),
    /// The model rejected the converted data.
    #[error(transparent)]
    Model(#[from] ModelError),
}

fn value_type(value: &Value) -> ValueType {
    match value {
        Value::Rational(_) => ValueType::Exact,
        Value::Float(_) => ValueType::Double,
        Value::Interval(_) => ValueType::Interval,
        Value::Polynomial(_) | Value::RationalFunction(_) => ValueType::Parametric,
    }
}

// Every value that ends up in the sparse model.
fn all_values(model: &Model) -> impl Iterator<Item = Value> + '_ {
    let transitions = model.state_ids().iter().flat_map(move |id| {
        model
            .get_choice(*id)
            .into_iter()
            .flat_map(|choice| choice.iter().flat_map(|(_, branch)| branch.values()))
            .cloned()
    });
    let rewards = model.reward_models().iter().flat_map(|rewards| {
        rewards
            .state_rewards()
            .map(|(_, v)| v)
            .chain(rewards.state_action_rewards().map(|(_, v)| v))
            .cloned()
    });
    let rates = model
        .state_ids()
        .iter()
        .filter_map(move |id| model.get_exit_rate(*id));
    transitions.chain(rewards).chain(rates)
}

fn widest_value_type(model: &Model) -> Result<ValueType, MappingError> {
    let kinds = all_values(model)
        .map(|value| value_type(&value))
        .collect::<BTreeSet<_>>();
    if kinds.contains(&ValueType::Interval) && kinds.contains(&ValueType::Parametric) {
        return Err(MappingError::IncompatibleValues);
    }
    Ok(kinds.last().copied().unwrap_or_default())
}

fn lift(
    value: &Value,
    target: ValueType,
    pool: &mut VariablePool,
) -> Result<EngineValue, MappingError> {
    let lifted = match (target, value) {
        (ValueType::Exact, Value::Rational(r)) => Some(EngineValue::Exact {
            numerator: *r.numer(),
            denominator: *r.denom(),
        }),
        (ValueType::Double, value) => value.as_f64().map(EngineValue::Double),
        (ValueType::Interval, Value::Interval(i)) => Some(EngineValue::Interval {
            lower: i.bottom(),
            upper: i.top(),
        }),
        (ValueType::Interval, value) => value.as_f64().map(|x| EngineValue::Interval {
            lower: x,
            upper: x,
        }),
        (ValueType::Parametric, Value::Polynomial(p)) => Some(EngineValue::Parametric(
            SymbolicRationalFunction::from_polynomial(p, pool),
        )),
        (ValueType::Parametric, Value::RationalFunction(rf)) => Some(EngineValue::Parametric(
            SymbolicRationalFunction::from_rational_function(rf, pool),
        )),
        (ValueType::Parametric, value) => value
            .as_f64()
            .map(|x| EngineValue::Parametric(SymbolicRationalFunction::constant(x))),
        _ => None,
    };
    lifted.ok_or_else(|| MappingError::Lift {
        value: value.to_string(),
        value_type: target,
    })
}

pub(crate) fn lower(value: &EngineValue, pool: &VariablePool) -> Result<Value, MappingError> {
    match value {
        EngineValue::Exact {
            denominator: 0, ..
        } => Err(MappingError::ZeroDenominator),
        EngineValue::Exact {
            numerator,
            denominator,
        } => Value::checked_ratio(*numerator, *denominator).ok_or(MappingError::RatioOverflow {
            numerator: *numerator,
            denominator: *denominator,
        }),
        EngineValue::Double(x) => Ok(Value::Float(*x)),
        // Degenerate intervals come from lifted numbers.
        EngineValue::Interval { lower, upper } if lower == upper => Ok(Value::Float(*lower)),
        EngineValue::Interval { lower, upper } => Ok(Interval::new(*lower, *upper)?.into()),
        EngineValue::Parametric(rf) if rf.is_polynomial() => {
            Ok(rf.numerator.to_polynomial(pool)?.into())
        }
        EngineValue::Parametric(rf) => Ok(rf.to_rational_function(pool)?.into()),
    }
}

/// Converts a model into its sparse form.
///
/// Fails, without returning any partial result, if a state has no choice
/// (see [`Model::add_self_loops`]), a variable is unassigned in some state
/// (see [`Model::set_valuation_at_remaining_states`]),
/// a reward model misses an entry (see [`Model::set_unset_rewards`]),
/// or kind-specific data (observations, exit rates) is missing.
pub fn to_engine(model: &Model) -> Result<SparseModel, MappingError> {
    let start = Instant::now();
    info!(target: "mapping", "converting {} to sparse form", model.model_type());

    let order = model.state_ids();
    if let Some(state) = order.iter().find(|id| {
        model
            .get_choice(**id)
            .is_none_or(|choice| choice.is_empty())
    }) {
        return Err(MappingError::MissingSelfLoops(*state));
    }
    if let Some((state, variable)) = model.unassigned_variables().into_iter().next() {
        return Err(MappingError::UnassignedVariable { state, variable });
    }

    let value_type = widest_value_type(model)?;
    debug!(target: "mapping", "value type: {value_type:?}");
    let mut parameters = VariablePool::default();
    let rows = order
        .iter()
        .enumerate()
        .map(|(row, id)| (*id, row))
        .collect::<HashMap<_, _>>();

    let supports_actions = model.model_type().supports_actions();
    let mut builder = SparseMatrixBuilder::new(order.len());
    let mut choice_labeling = Vec::new();
    for id in order {
        builder.new_row_group();
        let choice = model
            .get_choice(*id)
            .expect("every state has a choice");
        for (action, branch) in choice.iter() {
            let entries = branch
                .iter()
                .map(|(value, target)| {
                    Ok((rows[target], lift(value, value_type, &mut parameters)?))
                })
                .collect::<Result<Vec<_>, MappingError>>()?;
            builder.add_row(entries)?;
            if supports_actions {
                choice_labeling.push(model.action_labels(*action).cloned().unwrap_or_default());
            }
        }
        trace!(target: "mapping", "state {id} mapped to row group {}", rows[id]);
    }
    let transition_matrix = builder.build();

    let mut state_labeling = BTreeMap::<String, BTreeSet<usize>>::new();
    for (row, id) in order.iter().enumerate() {
        for label in model.get_labels(*id).into_iter().flatten() {
            state_labeling.entry(label.clone()).or_default().insert(row);
        }
    }

    let pairs = model.state_action_pairs();
    let mut reward_models = BTreeMap::new();
    for rewards in model.reward_models() {
        let missing = |state| MappingError::MissingReward {
            name: rewards.name().to_owned(),
            state,
        };
        let state_rewards = if rewards.has_state_rewards() {
            Some(
                order
                    .iter()
                    .map(|id| {
                        let value = rewards.get_state_reward(*id).ok_or_else(|| missing(*id))?;
                        lift(value, value_type, &mut parameters)
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            )
        } else {
            None
        };
        let state_action_rewards = if rewards.has_state_action_rewards() {
            Some(
                pairs
                    .iter()
                    .map(|(id, action)| {
                        let value = rewards
                            .get_state_action_reward(*id, *action)
                            .ok_or_else(|| missing(*id))?;
                        lift(value, value_type, &mut parameters)
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            )
        } else {
            None
        };
        reward_models.insert(
            rewards.name().to_owned(),
            SparseRewardModel {
                state_rewards,
                state_action_rewards,
            },
        );
    }

    let exit_rates = match model.model_type() {
        ModelType::Ctmc => Some(
            order
                .iter()
                .map(|id| {
                    let rate = model
                        .get_exit_rate(*id)
                        .ok_or(MappingError::MissingExitRate(*id))?;
                    lift(&rate, value_type, &mut parameters)
                })
                .collect::<Result<Vec<_>, _>>()?,
        ),
        // Probabilistic states of a Markov automaton have rate zero.
        ModelType::Ma => Some(
            order
                .iter()
                .map(|id| match model.get_exit_rate(*id) {
                    Some(rate) => lift(&rate, value_type, &mut parameters),
                    None if model.is_markovian(*id) => Err(MappingError::MissingExitRate(*id)),
                    None => Ok(EngineValue::zero(value_type)),
                })
                .collect::<Result<Vec<_>, _>>()?,
        ),
        _ => None,
    };
    let markovian_states = (model.model_type() == ModelType::Ma)
        .then(|| order.iter().map(|id| model.is_markovian(*id)).collect());
    let observations = if model.model_type() == ModelType::Pomdp {
        Some(
            order
                .iter()
                .map(|id| {
                    model
                        .get_observation(*id)
                        .map(|obs| obs.0)
                        .ok_or(MappingError::MissingObservation(*id))
                })
                .collect::<Result<Vec<_>, _>>()?,
        )
    } else {
        None
    };
    let state_valuations = if model.variables().is_empty() {
        None
    } else {
        Some(
            order
                .iter()
                .map(|id| {
                    model
                        .get_valuations(*id)
                        .into_iter()
                        .flatten()
                        .map(|(var, val)| (var.clone(), VarValue::from(*val)))
                        .collect()
                })
                .collect(),
        )
    };

    let sparse = SparseModel {
        model_type: model.model_type(),
        value_type,
        transition_matrix,
        state_labeling,
        reward_models,
        choice_labeling: supports_actions.then_some(choice_labeling),
        exit_rates,
        markovian_states,
        observations,
        state_valuations,
        parameters,
    };
    info!(
        target: "mapping",
        "converted {} states, {} rows and {} entries in {:?}",
        sparse.nr_states(),
        sparse.nr_choices(),
        sparse.nr_transitions(),
        start.elapsed()
    );
    Ok(sparse)
}

/// Converts a sparse model back into a [`Model`].
///
/// The state of row `i` gets id `i`; the first row reuses the initial state of the new model.
/// Actions are synthesized from the choice labeling.
pub fn from_engine(sparse: &SparseModel) -> Result<Model, MappingError> {
    let start = Instant::now();
    info!(target: "mapping", "converting sparse {} to model", sparse.model_type);
    sparse.validate()?;

    let kind = sparse.model_type;
    let matrix = &sparse.transition_matrix;
    let nr_states = sparse.nr_states();
    if !kind.supports_actions() && !matrix.has_trivial_row_grouping() {
        return Err(MappingError::Dimension {
            what: "rows",
            expected: nr_states,
            found: sparse.nr_choices(),
        });
    }
    let pool = &sparse.parameters;

    let starts_at_init = sparse
        .state_labeling
        .get(INIT_LABEL)
        .is_some_and(|states| states.contains(&0));
    let mut model = Model::new(kind, starts_at_init);
    let mut states = Vec::with_capacity(nr_states);
    for row in 0..nr_states {
        let state = if row == 0 && starts_at_init {
            model
                .get_initial_state()
                .expect("model created with initial state")
        } else {
            model.new_state(std::iter::empty::<String>())
        };
        states.push(state);
    }
    for (label, rows) in &sparse.state_labeling {
        for row in rows {
            model.add_label(states[*row], label)?;
        }
    }

    for (group, state) in states.iter().enumerate() {
        let rows = matrix.row_group(group);
        let single = rows.len() == 1;
        for (index, row) in rows.enumerate() {
            let labels = sparse
                .choice_labeling
                .as_ref()
                .map(|labeling| labeling[row].clone())
                .unwrap_or_default();
            let action = if !kind.supports_actions() || (labels.is_empty() && single) {
                EMPTY_ACTION
            } else if labels.is_empty() {
                model.get_or_create_action([index.to_string()])?
            } else {
                model.get_or_create_action(labels)?
            };
            let branch = matrix
                .row(row)
                .iter()
                .map(|entry| Ok((lower(&entry.value, pool)?, states[entry.column])))
                .collect::<Result<Vec<_>, MappingError>>()?;
            model.add_choice(*state, Choice::new(vec![(action, Branch::new(branch))]))?;
        }
    }

    for (name, rewards) in &sparse.reward_models {
        model.new_reward_model(name)?;
        if let Some(values) = &rewards.state_action_rewards {
            let values = values
                .iter()
                .map(|value| lower(value, pool))
                .collect::<Result<Vec<_>, _>>()?;
            model.set_rewards_from_vector(name, values)?;
        }
        if let Some(values) = &rewards.state_rewards {
            let reward_model = model
                .get_rewards_mut(name)
                .expect("reward model just created");
            for (state, value) in states.iter().zip(values) {
                reward_model.set_state_reward(*state, lower(value, pool)?);
            }
        }
    }

    if let Some(markovian) = &sparse.markovian_states {
        for (state, _) in states.iter().zip(markovian).filter(|(_, m)| **m) {
            model.set_markovian(*state)?;
        }
    }
    if let Some(rates) = &sparse.exit_rates {
        for (state, rate) in states.iter().zip(rates) {
            if kind == ModelType::Ctmc || model.is_markovian(*state) {
                model.set_exit_rate(*state, lower(rate, pool)?)?;
            }
        }
    }
    if let Some(observations) = &sparse.observations {
        for (state, obs) in states.iter().zip(observations) {
            model.set_observation(*state, Observation(*obs))?;
        }
    }
    if let Some(valuations) = &sparse.state_valuations {
        for (state, valuation) in states.iter().zip(valuations) {
            for (var, val) in valuation {
                model.set_valuation(*state, var, Val::from(*val))?;
            }
        }
    }

    info!(
        target: "mapping",
        "converted {} states back in {:?}",
        model.nr_states(),
        start.elapsed()
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stormvogel_core::Polynomial;

    fn coin() -> Model {
        let mut dtmc = Model::new_dtmc();
        let init = dtmc.get_initial_state().unwrap();
        let heads = dtmc.new_state(["heads"]);
        let tails = dtmc.new_state(["tails"]);
        dtmc.set_probabilistic_choice(
            init,
            vec![(Value::ratio(1, 2), heads), (Value::ratio(1, 2), tails)],
        )
        .unwrap();
        dtmc
    }

    #[test]
    fn exact_values_are_checked() {
        let pool = VariablePool::default();
        let exact = |numerator, denominator| EngineValue::Exact {
            numerator,
            denominator,
        };
        assert_eq!(lower(&exact(2, -4), &pool).unwrap(), Value::ratio(-1, 2));
        assert!(matches!(
            lower(&exact(1, 0), &pool),
            Err(MappingError::ZeroDenominator)
        ));
        assert!(matches!(
            lower(&exact(i64::MIN, -1), &pool),
            Err(MappingError::RatioOverflow { .. })
        ));
        assert!(matches!(
            lower(&exact(1, i64::MIN), &pool),
            Err(MappingError::RatioOverflow { .. })
        ));
    }

    #[test]
    fn self_loops_required() {
        let dtmc = coin();
        assert!(matches!(
            to_engine(&dtmc),
            Err(MappingError::MissingSelfLoops(1))
        ));
    }

    #[test]
    fn unassigned_variable() {
        let mut dtmc = coin();
        dtmc.add_self_loops();
        dtmc.set_valuation(1, "x", Val::Integer(1)).unwrap();
        assert!(matches!(
            to_engine(&dtmc),
            Err(MappingError::UnassignedVariable { state: 0, .. })
        ));
        dtmc.set_valuation_at_remaining_states(Val::Integer(0));
        let sparse = to_engine(&dtmc).unwrap();
        let valuations = sparse.state_valuations.unwrap();
        assert_eq!(valuations[2]["x"], VarValue::Integer(0));
    }

    #[test]
    fn exact_values_stay_exact() {
        let mut dtmc = coin();
        dtmc.add_self_loops();
        let sparse = to_engine(&dtmc).unwrap();
        assert_eq!(sparse.value_type, ValueType::Exact);
        assert_eq!(sparse.nr_states(), 3);
        assert_eq!(sparse.nr_transitions(), 4);
        assert_eq!(sparse.states_with_label("heads"), vec![1]);
        assert!(sparse.choice_labeling.is_none());
    }

    #[test]
    fn floats_widen_exact_values() {
        let mut dtmc = coin();
        let heads = 1;
        dtmc.set_probabilistic_choice(heads, vec![(Value::from(1.), heads)])
            .unwrap();
        dtmc.add_self_loops();
        let sparse = to_engine(&dtmc).unwrap();
        assert_eq!(sparse.value_type, ValueType::Double);
        assert!(
            sparse
                .transition_matrix
                .entries()
                .all(|e| matches!(e.value, EngineValue::Double(_)))
        );
    }

    #[test]
    fn intervals_and_parameters_do_not_mix() {
        let mut dtmc = Model::new_dtmc();
        let init = dtmc.get_initial_state().unwrap();
        let mut p = Polynomial::new(["p"]);
        p.add_term(&[1], 1.).unwrap();
        dtmc.set_probabilistic_choice(
            init,
            vec![
                (Value::from(p), init),
                (Interval::new(0.1, 0.2).unwrap().into(), init),
            ],
        )
        .unwrap();
        assert!(matches!(
            to_engine(&dtmc),
            Err(MappingError::IncompatibleValues)
        ));
    }

    #[test]
    fn missing_observation() {
        let mut pomdp = Model::new_pomdp();
        pomdp.add_self_loops();
        assert!(matches!(
            to_engine(&pomdp),
            Err(MappingError::MissingObservation(0))
        ));
    }

    #[test]
    fn missing_reward() {
        let mut dtmc = coin();
        dtmc.add_self_loops();
        dtmc.new_reward_model("steps")
            .unwrap()
            .set_state_reward(0, Value::one());
        assert!(matches!(
            to_engine(&dtmc),
            Err(MappingError::MissingReward { state: 1, .. })
        ));
        dtmc.set_unset_rewards("steps", Value::zero()).unwrap();
        assert!(to_engine(&dtmc).is_ok());
    }

    #[test]
    fn removed_states_are_compacted() {
        let mut dtmc = coin();
        let extra = dtmc.new_state(["extra"]);
        dtmc.add_self_loops();
        dtmc.remove_state(1, false).unwrap();
        let sparse = to_engine(&dtmc).unwrap();
        assert_eq!(sparse.nr_states(), 3);
        assert_eq!(sparse.states_with_label("extra"), vec![extra - 1]);
    }

    #[test]
    fn unlabelled_rows_get_numeric_actions() {
        let mut builder = SparseMatrixBuilder::new(1);
        builder.new_row_group();
        builder.add_row(vec![(0, EngineValue::Double(1.))]).unwrap();
        builder.add_row(vec![(0, EngineValue::Double(1.))]).unwrap();
        let sparse = SparseModel {
            model_type: ModelType::Mdp,
            value_type: ValueType::Double,
            transition_matrix: builder.build(),
            state_labeling: BTreeMap::new(),
            reward_models: BTreeMap::new(),
            choice_labeling: None,
            exit_rates: None,
            markovian_states: None,
            observations: None,
            state_valuations: None,
            parameters: VariablePool::default(),
        };
        let mdp = from_engine(&sparse).unwrap();
        assert_eq!(mdp.nr_choices(), 2);
        assert!(mdp.get_action(["0"]).is_some());
        assert!(mdp.get_action(["1"]).is_some());
        assert!(mdp.get_labels(0).unwrap().is_empty());
    }
}

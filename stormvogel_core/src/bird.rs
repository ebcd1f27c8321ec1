//! Builds [`Model`]s by exploring the state space of a user-defined system.
//!
//! The user describes the system through functions over its own state type
//! (any `Clone + Eq + Hash + Debug` type),
//! and [`Bird::build`] discovers the reachable states breadth-first.

use crate::{Action, Branch, Choice, Model, ModelError, ModelType, Observation, StateId, Val, Value};
use log::{debug, info, trace};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    fmt::Debug,
    hash::Hash,
    time::Instant,
};
use thiserror::Error;

/// Default ceiling on the number of states explored by [`Bird::build`].
pub const DEFAULT_MAX_SIZE: usize = 10_000;

/// The error type for building models by state-space exploration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    /// Neither `delta` nor `action_delta` has been given.
    #[error("no transition function given")]
    MissingDelta,
    /// A plain `delta` has been given for a model kind with actions.
    #[error("{0} models have actions: use `action_delta` instead of `delta`")]
    PlainDelta(ModelType),
    /// An `action_delta` has been given for a model kind without actions.
    #[error("{0} models have no actions: use `delta` instead of `action_delta`")]
    ActionDelta(ModelType),
    /// The model kind has actions, but no `available_actions` function has been given.
    #[error("{0} models have actions: `available_actions` is required")]
    MissingAvailableActions(ModelType),
    /// The exploration discovered more states than allowed.
    #[error(
        "the model has more than {0} states: raise `max_size` if the state space is finite, or check `delta` for unbounded growth"
    )]
    TooManyStates(usize),
    /// The reward keys of a state differ from those of the initial state.
    #[error("rewards of state {state} have keys {found:?}, expected {expected:?}")]
    RewardKeys {
        /// The offending state.
        state: String,
        /// Keys returned for the initial state.
        expected: BTreeSet<String>,
        /// Keys returned for the offending state.
        found: BTreeSet<String>,
    },
    /// The valuation keys of a state differ from those of the initial state.
    #[error("valuations of state {state} have variables {found:?}, expected {expected:?}")]
    ValuationKeys {
        /// The offending state.
        state: String,
        /// Variables returned for the initial state.
        expected: BTreeSet<String>,
        /// Variables returned for the offending state.
        found: BTreeSet<String>,
    },
    /// The model rejected an operation while processing a state.
    #[error("failed processing state {state}")]
    Model {
        /// The offending state.
        state: String,
        /// The underlying error.
        #[source]
        source: ModelError,
    },
}

type Delta<'a, S> = Box<dyn Fn(&S) -> Option<Vec<(Value, S)>> + 'a>;
type ActionDelta<'a, S> = Box<dyn Fn(&S, &[String]) -> Option<Vec<(Value, S)>> + 'a>;
type StateFn<'a, S, T> = Box<dyn Fn(&S) -> T + 'a>;
type ActionFn<'a, S, T> = Box<dyn Fn(&S, &[String]) -> T + 'a>;

fn model_error<S: Debug>(state: &S) -> impl FnOnce(ModelError) -> BuildError + '_ {
    move |source| BuildError::Model {
        state: format!("{state:?}"),
        source,
    }
}

/// Defines a model through functions over a user-defined state type `S`,
/// and builds it by breadth-first exploration from the initial state.
///
/// Actions are given as lists of labels.
/// Successors are given as (value, state) pairs;
/// returning `None` or no successors leaves a state absorbing,
/// and absorbing states get a self-loop once exploration is complete
/// (see [`Bird::self_loops`]).
///
/// ```
/// # use stormvogel_core::{bird::Bird, ModelType, Value};
/// // A biased coin, flipped until heads comes up
/// let model = Bird::new(ModelType::Dtmc, false)
///     .delta(|heads: &bool| {
///         (!heads).then(|| vec![(Value::ratio(1, 3), true), (Value::ratio(2, 3), false)])
///     })
///     .labels(|heads| if *heads { vec![String::from("heads")] } else { Vec::new() })
///     .build()
///     .expect("build model");
/// assert_eq!(model.nr_states(), 2);
/// assert!(model.is_stochastic(0.));
/// ```
pub struct Bird<'a, S> {
    kind: ModelType,
    initial: S,
    delta: Option<Delta<'a, S>>,
    action_delta: Option<ActionDelta<'a, S>>,
    available_actions: Option<StateFn<'a, S, Vec<Vec<String>>>>,
    labels: Option<StateFn<'a, S, Vec<String>>>,
    rewards: Option<StateFn<'a, S, BTreeMap<String, Value>>>,
    action_rewards: Option<ActionFn<'a, S, BTreeMap<String, Value>>>,
    observations: Option<StateFn<'a, S, u32>>,
    rates: Option<StateFn<'a, S, Option<Value>>>,
    valuations: Option<StateFn<'a, S, BTreeMap<String, Val>>>,
    max_size: usize,
    self_loops: bool,
}

impl<'a, S> Bird<'a, S>
where
    S: Clone + Eq + Hash + Debug,
{
    /// Starts the definition of a model of the given kind, from the given initial state.
    pub fn new(kind: ModelType, initial: S) -> Self {
        Self {
            kind,
            initial,
            delta: None,
            action_delta: None,
            available_actions: None,
            labels: None,
            rewards: None,
            action_rewards: None,
            observations: None,
            rates: None,
            valuations: None,
            max_size: DEFAULT_MAX_SIZE,
            self_loops: true,
        }
    }

    /// Sets the successors function, for kinds without actions.
    pub fn delta<F>(mut self, delta: F) -> Self
    where
        F: Fn(&S) -> Option<Vec<(Value, S)>> + 'a,
    {
        self.delta = Some(Box::new(delta));
        self
    }

    /// Sets the successors function under an action, for kinds with actions.
    pub fn action_delta<F>(mut self, delta: F) -> Self
    where
        F: Fn(&S, &[String]) -> Option<Vec<(Value, S)>> + 'a,
    {
        self.action_delta = Some(Box::new(delta));
        self
    }

    /// Sets the function listing the actions available in a state.
    /// An action with no labels is the empty action.
    pub fn available_actions<F>(mut self, available_actions: F) -> Self
    where
        F: Fn(&S) -> Vec<Vec<String>> + 'a,
    {
        self.available_actions = Some(Box::new(available_actions));
        self
    }

    /// Sets the function labelling states.
    /// The initial state is always labelled `"init"` as well.
    pub fn labels<F>(mut self, labels: F) -> Self
    where
        F: Fn(&S) -> Vec<String> + 'a,
    {
        self.labels = Some(Box::new(labels));
        self
    }

    /// Sets the function giving the state rewards, keyed by reward model.
    pub fn rewards<F>(mut self, rewards: F) -> Self
    where
        F: Fn(&S) -> BTreeMap<String, Value> + 'a,
    {
        self.rewards = Some(Box::new(rewards));
        self
    }

    /// Sets the function giving the state-action rewards, keyed by reward model.
    pub fn action_rewards<F>(mut self, rewards: F) -> Self
    where
        F: Fn(&S, &[String]) -> BTreeMap<String, Value> + 'a,
    {
        self.action_rewards = Some(Box::new(rewards));
        self
    }

    /// Sets the function giving the observation of a state (POMDPs only).
    pub fn observations<F>(mut self, observations: F) -> Self
    where
        F: Fn(&S) -> u32 + 'a,
    {
        self.observations = Some(Box::new(observations));
        self
    }

    /// Sets the function giving the exit rate of a state (CTMCs and MAs only).
    ///
    /// In Markov automata, states with an exit rate are markovian.
    pub fn rates<F>(mut self, rates: F) -> Self
    where
        F: Fn(&S) -> Option<Value> + 'a,
    {
        self.rates = Some(Box::new(rates));
        self
    }

    /// Sets the function giving the variable valuations of a state.
    pub fn valuations<F>(mut self, valuations: F) -> Self
    where
        F: Fn(&S) -> BTreeMap<String, Val> + 'a,
    {
        self.valuations = Some(Box::new(valuations));
        self
    }

    /// Sets the maximum number of states to explore (default [`DEFAULT_MAX_SIZE`]).
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Sets whether absorbing states get a self-loop after exploration (default `true`).
    ///
    /// Without self-loops, the model needs [`Model::add_self_loops`]
    /// before it can be converted to sparse form.
    pub fn self_loops(mut self, self_loops: bool) -> Self {
        self.self_loops = self_loops;
        self
    }

    fn check(&self) -> Result<(), BuildError> {
        if self.kind.supports_actions() {
            if self.delta.is_some() {
                return Err(BuildError::PlainDelta(self.kind));
            }
            if self.action_delta.is_none() {
                return Err(BuildError::MissingDelta);
            }
            if self.available_actions.is_none() {
                return Err(BuildError::MissingAvailableActions(self.kind));
            }
        } else {
            if self.action_delta.is_some() {
                return Err(BuildError::ActionDelta(self.kind));
            }
            if self.delta.is_none() {
                return Err(BuildError::MissingDelta);
            }
        }
        Ok(())
    }

    fn actions(&self, state: &S) -> Vec<Vec<String>> {
        self.available_actions
            .as_ref()
            .map(|available| available(state))
            .unwrap_or_else(|| vec![Vec::new()])
    }

    fn successors(&self, state: &S, action: &[String]) -> Vec<(Value, S)> {
        if let Some(delta) = self.action_delta.as_ref() {
            delta(state, action)
        } else if let Some(delta) = self.delta.as_ref() {
            delta(state)
        } else {
            None
        }
        .unwrap_or_default()
    }

    /// Explores the state space and builds the model.
    ///
    /// Absorbing states get a self-loop, unless disabled with [`Bird::self_loops`].
    ///
    /// Fails if the functions are inconsistent with the model kind,
    /// if more than `max_size` states are discovered,
    /// or if some function returns data the model rejects.
    pub fn build(&self) -> Result<Model, BuildError> {
        self.check()?;
        info!(target: "build", "exploration starting");
        let start_time = Instant::now();

        let mut model = Model::new(self.kind, true);
        let init = model
            .get_initial_state()
            .expect("model created with initial state");
        let mut ids = HashMap::from([(self.initial.clone(), init)]);
        let mut visited = vec![(self.initial.clone(), init)];
        let mut queue = VecDeque::from([self.initial.clone()]);

        while let Some(state) = queue.pop_front() {
            let id = ids[&state];
            trace!(target: "build", "expanding state {state:?} ({id})");
            let mut choice = Vec::new();
            for labels in self.actions(&state) {
                let successors = self.successors(&state, &labels);
                if successors.is_empty() {
                    continue;
                }
                let action = model
                    .get_or_create_action(labels)
                    .map_err(model_error(&state))?;
                let mut branch = Vec::with_capacity(successors.len());
                for (value, next) in successors {
                    let next_id = if let Some(next_id) = ids.get(&next) {
                        *next_id
                    } else {
                        if model.nr_states() >= self.max_size {
                            return Err(BuildError::TooManyStates(self.max_size));
                        }
                        let next_id = model.new_state(Vec::<String>::new());
                        ids.insert(next.clone(), next_id);
                        visited.push((next.clone(), next_id));
                        queue.push_back(next);
                        next_id
                    };
                    branch.push((value, next_id));
                }
                choice.push((action, Branch::new(branch)));
            }
            if !choice.is_empty() {
                model
                    .set_choice(id, Choice::new(choice))
                    .map_err(model_error(&state))?;
            }
        }
        debug!(target: "build", "{} states discovered", model.nr_states());

        self.add_labels(&mut model, &visited)?;
        self.add_rewards(&mut model, &visited)?;
        self.add_action_rewards(&mut model, &visited)?;
        self.add_observations(&mut model, &visited)?;
        self.add_rates(&mut model, &visited)?;
        self.add_valuations(&mut model, &visited)?;
        if self.self_loops {
            model.add_self_loops();
        }

        let elapsed = start_time.elapsed();
        info!(target: "build", "exploration time elapsed: {elapsed:0.2?}");
        Ok(model)
    }

    fn add_labels(&self, model: &mut Model, visited: &[(S, StateId)]) -> Result<(), BuildError> {
        if let Some(labels) = self.labels.as_ref() {
            for (state, id) in visited {
                for label in labels(state) {
                    model.add_label(*id, &label).map_err(model_error(state))?;
                }
            }
        }
        Ok(())
    }

    fn add_rewards(&self, model: &mut Model, visited: &[(S, StateId)]) -> Result<(), BuildError> {
        let Some(rewards) = self.rewards.as_ref() else {
            return Ok(());
        };
        let expected = rewards(&self.initial).into_keys().collect::<BTreeSet<_>>();
        for name in &expected {
            model
                .new_reward_model(name)
                .map_err(model_error(&self.initial))?;
        }
        for (state, id) in visited {
            let values = rewards(state);
            let found = values.keys().cloned().collect::<BTreeSet<_>>();
            if found != expected {
                return Err(BuildError::RewardKeys {
                    state: format!("{state:?}"),
                    expected,
                    found,
                });
            }
            for (name, value) in values {
                model
                    .get_rewards_mut(&name)
                    .expect("reward model created")
                    .set_state_reward(*id, value);
            }
        }
        Ok(())
    }

    fn add_action_rewards(
        &self,
        model: &mut Model,
        visited: &[(S, StateId)],
    ) -> Result<(), BuildError> {
        let Some(rewards) = self.action_rewards.as_ref() else {
            return Ok(());
        };
        let mut expected: Option<BTreeSet<String>> = None;
        for (state, id) in visited {
            for labels in self.actions(state) {
                let Some(action) = model.get_action(labels.iter().cloned()) else {
                    continue;
                };
                if !model
                    .get_choice(*id)
                    .is_some_and(|choice| choice.get(action).is_some())
                {
                    continue;
                }
                let values = rewards(state, &labels);
                let found = values.keys().cloned().collect::<BTreeSet<_>>();
                match expected.as_ref() {
                    Some(expected) if *expected != found => {
                        return Err(BuildError::RewardKeys {
                            state: format!("{state:?}"),
                            expected: expected.clone(),
                            found,
                        });
                    }
                    Some(_) => {}
                    None => {
                        for name in &found {
                            if model.get_rewards(name).is_none() {
                                model.new_reward_model(name).map_err(model_error(state))?;
                            }
                        }
                        expected = Some(found);
                    }
                }
                for (name, value) in values {
                    set_action_reward(model, &name, *id, action, value);
                }
            }
        }
        Ok(())
    }

    fn add_observations(
        &self,
        model: &mut Model,
        visited: &[(S, StateId)],
    ) -> Result<(), BuildError> {
        if let Some(observations) = self.observations.as_ref() {
            for (state, id) in visited {
                model
                    .set_observation(*id, Observation(observations(state)))
                    .map_err(model_error(state))?;
            }
        }
        Ok(())
    }

    fn add_rates(&self, model: &mut Model, visited: &[(S, StateId)]) -> Result<(), BuildError> {
        if let Some(rates) = self.rates.as_ref() {
            for (state, id) in visited {
                if let Some(rate) = rates(state) {
                    model.set_exit_rate(*id, rate).map_err(model_error(state))?;
                    if model.model_type() == ModelType::Ma {
                        model.set_markovian(*id).map_err(model_error(state))?;
                    }
                }
            }
        }
        Ok(())
    }

    fn add_valuations(
        &self,
        model: &mut Model,
        visited: &[(S, StateId)],
    ) -> Result<(), BuildError> {
        let Some(valuations) = self.valuations.as_ref() else {
            return Ok(());
        };
        let expected = valuations(&self.initial)
            .into_keys()
            .collect::<BTreeSet<_>>();
        for (state, id) in visited {
            let values = valuations(state);
            let found = values.keys().cloned().collect::<BTreeSet<_>>();
            if found != expected {
                return Err(BuildError::ValuationKeys {
                    state: format!("{state:?}"),
                    expected,
                    found,
                });
            }
            for (var, val) in values {
                model
                    .set_valuation(*id, &var, val)
                    .map_err(model_error(state))?;
            }
        }
        Ok(())
    }
}

fn set_action_reward(model: &mut Model, name: &str, state: StateId, action: Action, value: Value) {
    model
        .get_rewards_mut(name)
        .expect("reward model created")
        .set_state_action_reward(state, action, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EMPTY_ACTION;

    #[test]
    fn missing_delta() {
        let bird = Bird::new(ModelType::Dtmc, 0u32);
        assert!(matches!(bird.build(), Err(BuildError::MissingDelta)));
    }

    #[test]
    fn delta_kind_mismatch() {
        let bird = Bird::new(ModelType::Mdp, 0u32).delta(|_| None);
        assert!(matches!(
            bird.build(),
            Err(BuildError::PlainDelta(ModelType::Mdp))
        ));
        let bird = Bird::new(ModelType::Dtmc, 0u32).action_delta(|_, _| None);
        assert!(matches!(
            bird.build(),
            Err(BuildError::ActionDelta(ModelType::Dtmc))
        ));
        let bird = Bird::new(ModelType::Mdp, 0u32).action_delta(|_, _| None);
        assert!(matches!(
            bird.build(),
            Err(BuildError::MissingAvailableActions(ModelType::Mdp))
        ));
    }

    #[test]
    fn absorbing_initial_state() {
        let model = Bird::new(ModelType::Dtmc, ())
            .delta(|_| None)
            .build()
            .unwrap();
        assert_eq!(model.nr_states(), 1);
        let init = model.get_initial_state().unwrap();
        assert_eq!(model.get_successor_states(init), BTreeSet::from([init]));
    }

    #[test]
    fn absorbing_without_self_loops() {
        let model = Bird::new(ModelType::Dtmc, 0u8)
            .delta(|s| (*s == 0).then(|| vec![(Value::one(), 1)]))
            .self_loops(false)
            .build()
            .unwrap();
        assert_eq!(model.nr_states(), 2);
        assert!(model.get_choice(1).is_none());
        assert!(!model.all_states_outgoing_transition());
    }

    #[test]
    fn mdp_with_rewards() {
        let model = Bird::new(ModelType::Mdp, 0u8)
            .available_actions(|s| {
                if *s == 0 {
                    vec![vec![String::from("left")], vec![String::from("right")]]
                } else {
                    Vec::new()
                }
            })
            .action_delta(|_, action| match action[0].as_str() {
                "left" => Some(vec![(Value::one(), 1)]),
                _ => Some(vec![(Value::ratio(1, 2), 1), (Value::ratio(1, 2), 2)]),
            })
            .action_rewards(|_, action| {
                let cost = if action[0] == "left" { 2 } else { 1 };
                BTreeMap::from([(String::from("cost"), Value::from(cost as i64))])
            })
            .build()
            .unwrap();
        assert_eq!(model.nr_states(), 3);
        let init = model.get_initial_state().unwrap();
        let right = model.get_action(["right"]).unwrap();
        assert_eq!(model.get_choice(init).unwrap().len(), 2);
        let rewards = model.get_rewards("cost").unwrap();
        assert_eq!(
            rewards.get_state_action_reward(init, right),
            Some(&Value::one())
        );
        // absorbing states get a self-loop under the empty action
        assert_eq!(
            model.get_choice(1).unwrap().actions().collect::<Vec<_>>(),
            vec![EMPTY_ACTION]
        );
    }

    #[test]
    fn reward_keys_must_match() {
        let result = Bird::new(ModelType::Dtmc, 0u8)
            .delta(|s| (*s == 0).then(|| vec![(Value::one(), 1)]))
            .rewards(|s| {
                if *s == 0 {
                    BTreeMap::from([(String::from("r"), Value::one())])
                } else {
                    BTreeMap::from([(String::from("q"), Value::one())])
                }
            })
            .build();
        match result {
            Err(BuildError::RewardKeys { state, .. }) => assert_eq!(state, "1"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn observations_on_dtmc() {
        let result = Bird::new(ModelType::Dtmc, 0u8)
            .delta(|_| None)
            .observations(|_| 0)
            .build();
        assert!(matches!(
            result,
            Err(BuildError::Model {
                source: ModelError::ObservationsNotSupported(ModelType::Dtmc),
                ..
            })
        ));
    }

    #[test]
    fn markovian_states_from_rates() {
        let model = Bird::new(ModelType::Ma, 0u8)
            .available_actions(|_| vec![Vec::new()])
            .action_delta(|s, _| match s {
                0 => Some(vec![(Value::from(3i64), 1)]),
                _ => None,
            })
            .rates(|s| (*s == 0).then(|| Value::from(3i64)))
            .build()
            .unwrap();
        let init = model.get_initial_state().unwrap();
        assert!(model.is_markovian(init));
        assert!(!model.is_markovian(1));
        assert_eq!(model.get_exit_rate(init), Some(Value::from(3i64)));
    }
}

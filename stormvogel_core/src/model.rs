//! The in-memory representation of Markov models:
//! states, actions, choices, reward models and the kind-specific data of
//! DTMCs, MDPs, CTMCs, POMDPs and Markov automata.

mod choice;
mod reward;

use crate::{
    Val, Value,
    parametric::{Assignment, ParametricError},
};
pub use choice::{Branch, Choice};
use log::{debug, trace};
pub use reward::RewardModel;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};
use thiserror::Error;

/// Identifier of a [`State`], unique within its [`Model`].
pub type StateId = usize;

/// The label carried by the initial state.
pub const INIT_LABEL: &str = "init";

/// Index type of actions.
pub type ActionIdx = u32;

/// An action, as issued by a [`Model`]'s action registry.
///
/// The caller-visible identity of an action is its set of labels,
/// see [`Model::action_labels`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Action(ActionIdx);

/// The implicit single action of states without a choice among actions,
/// as in DTMCs and CTMCs.
pub const EMPTY_ACTION: Action = Action(ActionIdx::MAX);

static EMPTY_LABELS: BTreeSet<String> = BTreeSet::new();

/// An observation class, for POMDPs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Observation(pub u32);

/// The supported kinds of models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelType {
    /// Discrete-Time Markov Chain.
    Dtmc,
    /// Markov Decision Process.
    Mdp,
    /// Continuous-Time Markov Chain.
    Ctmc,
    /// Partially Observable Markov Decision Process.
    Pomdp,
    /// Markov Automaton.
    Ma,
}

impl ModelType {
    /// Whether the states of the model can choose among actions.
    pub fn supports_actions(&self) -> bool {
        matches!(self, ModelType::Mdp | ModelType::Pomdp | ModelType::Ma)
    }

    /// Whether transitions (of some states) are weighted by rates.
    pub fn supports_rates(&self) -> bool {
        matches!(self, ModelType::Ctmc | ModelType::Ma)
    }

    /// Whether states carry observations.
    pub fn supports_observations(&self) -> bool {
        matches!(self, ModelType::Pomdp)
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelType::Dtmc => "DTMC",
            ModelType::Mdp => "MDP",
            ModelType::Ctmc => "CTMC",
            ModelType::Pomdp => "POMDP",
            ModelType::Ma => "MA",
        };
        write!(f, "{name}")
    }
}

/// The error type for operations on a [`Model`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// There is no state with the given id.
    #[error("state {0} does not exist")]
    MissingState(StateId),
    /// A state with the given name already exists.
    #[error("a state named `{0}` already exists")]
    DuplicateName(String),
    /// An action with the given labels already exists.
    #[error("an action with labels {0:?} already exists")]
    DuplicateAction(BTreeSet<String>),
    /// The action was not issued by this model.
    #[error("action {0:?} does not belong to this model")]
    MissingAction(Action),
    /// The model kind has no actions.
    #[error("{0} models do not support actions")]
    ActionsNotSupported(ModelType),
    /// The model kind has no observations.
    #[error("{0} models do not support observations")]
    ObservationsNotSupported(ModelType),
    /// The model kind has no rates.
    #[error("{0} models do not support rates")]
    RatesNotSupported(ModelType),
    /// The model kind has no markovian states.
    #[error("{0} models do not have markovian states")]
    MarkovianNotSupported(ModelType),
    /// The choice would mix the empty action with labelled actions.
    #[error(
        "inconsistent action kind in the choice of state {0}: the empty action cannot be mixed with labelled actions"
    )]
    InconsistentActionKind(StateId),
    /// The same action would appear twice in a choice.
    #[error("action {action:?} appears twice in the choice of state {state}")]
    DuplicateChoiceAction {
        /// The state owning the choice.
        state: StateId,
        /// The repeated action.
        action: Action,
    },
    /// Rates cannot be normalized.
    #[error("cannot normalize the rates of a {0} model")]
    NormalizeRates(ModelType),
    /// A reward model with the given name already exists.
    #[error("reward model `{0}` already exists")]
    DuplicateRewardModel(String),
    /// There is no reward model with the given name.
    #[error("reward model `{0}` does not exist")]
    MissingRewardModel(String),
    /// The rewards vector does not cover the state-action pairs exactly.
    #[error("rewards vector has length {found} but the model has {expected} state-action pairs")]
    RewardsVectorLength {
        /// Number of state-action pairs.
        expected: usize,
        /// Length of the vector.
        found: usize,
    },
    /// A parametric value could not be evaluated.
    #[error("failed evaluating a value of state {state}")]
    Valuation {
        /// The state the value belongs to.
        state: StateId,
        /// The underlying error.
        #[source]
        source: ParametricError,
    },
}

/// A state of a [`Model`].
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    id: StateId,
    name: Option<String>,
    labels: BTreeSet<String>,
    valuations: BTreeMap<String, Val>,
    observation: Option<Observation>,
}

impl State {
    /// The id of the state.
    pub fn id(&self) -> StateId {
        self.id
    }

    /// The optional (unique) name of the state.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The labels of the state.
    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    /// Tells whether the state has the given label.
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// The valuation of the variables of the state.
    pub fn valuations(&self) -> &BTreeMap<String, Val> {
        &self.valuations
    }

    /// The observation of the state, if any.
    pub fn observation(&self) -> Option<Observation> {
        self.observation
    }
}

/// Identifies a model and its structural revision.
///
/// Results and schedulers record the stamp of the model they refer to,
/// so that structural mutations of the model can be detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelStamp {
    uid: u64,
    generation: u64,
}

static NEXT_UID: AtomicU64 = AtomicU64::new(0);

fn next_uid() -> u64 {
    NEXT_UID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Default)]
struct ActionRegistry {
    labels: Vec<BTreeSet<String>>,
    index: HashMap<BTreeSet<String>, Action>,
}

impl ActionRegistry {
    fn get(&self, labels: &BTreeSet<String>) -> Option<Action> {
        if labels.is_empty() {
            Some(EMPTY_ACTION)
        } else {
            self.index.get(labels).copied()
        }
    }

    fn insert(&mut self, labels: BTreeSet<String>) -> Action {
        // Actions are indexed progressively
        let action = Action(self.labels.len() as ActionIdx);
        self.labels.push(labels.clone());
        self.index.insert(labels, action);
        action
    }

    fn labels(&self, action: Action) -> Option<&BTreeSet<String>> {
        if action == EMPTY_ACTION {
            Some(&EMPTY_LABELS)
        } else {
            self.labels.get(action.0 as usize)
        }
    }

    fn contains(&self, action: Action) -> bool {
        action == EMPTY_ACTION || (action.0 as usize) < self.labels.len()
    }
}

/// A Markov model of one of the supported [`ModelType`]s.
///
/// States are enumerated in insertion order,
/// which is also the row order used when converting to sparse form.
///
/// ```
/// # use stormvogel_core::{Model, Value};
/// let mut dtmc = Model::new_dtmc();
/// let init = dtmc.get_initial_state().expect("initial state");
/// let heads = dtmc.new_state(["heads"]);
/// let tails = dtmc.new_state(["tails"]);
/// dtmc.set_probabilistic_choice(init, vec![(Value::ratio(1, 2), heads), (Value::ratio(1, 2), tails)])
///     .expect("states exist");
/// dtmc.add_self_loops();
/// assert!(dtmc.is_stochastic(0.));
/// ```
#[derive(Debug)]
pub struct Model {
    model_type: ModelType,
    states: HashMap<StateId, State>,
    order: Vec<StateId>,
    names: HashMap<String, StateId>,
    choices: HashMap<StateId, Choice>,
    actions: ActionRegistry,
    rewards: Vec<RewardModel>,
    exit_rates: HashMap<StateId, Value>,
    markovian_states: BTreeSet<StateId>,
    free_ids: BTreeSet<StateId>,
    next_id: StateId,
    uid: u64,
    generation: u64,
}

// Clones are distinct models, so they get a fresh uid.
impl Clone for Model {
    fn clone(&self) -> Self {
        Self {
            model_type: self.model_type,
            states: self.states.clone(),
            order: self.order.clone(),
            names: self.names.clone(),
            choices: self.choices.clone(),
            actions: self.actions.clone(),
            rewards: self.rewards.clone(),
            exit_rates: self.exit_rates.clone(),
            markovian_states: self.markovian_states.clone(),
            free_ids: self.free_ids.clone(),
            next_id: self.next_id,
            uid: next_uid(),
            generation: 0,
        }
    }
}

impl Model {
    /// Creates an empty model of the given type,
    /// optionally with an initial state labelled `"init"`.
    pub fn new(model_type: ModelType, create_initial_state: bool) -> Self {
        let mut model = Self {
            model_type,
            states: HashMap::new(),
            order: Vec::new(),
            names: HashMap::new(),
            choices: HashMap::new(),
            actions: ActionRegistry::default(),
            rewards: Vec::new(),
            exit_rates: HashMap::new(),
            markovian_states: BTreeSet::new(),
            free_ids: BTreeSet::new(),
            next_id: 0,
            uid: next_uid(),
            generation: 0,
        };
        if create_initial_state {
            model.new_state([INIT_LABEL]);
        }
        model
    }

    /// Creates a DTMC with an initial state.
    pub fn new_dtmc() -> Self {
        Self::new(ModelType::Dtmc, true)
    }

    /// Creates an MDP with an initial state.
    pub fn new_mdp() -> Self {
        Self::new(ModelType::Mdp, true)
    }

    /// Creates a CTMC with an initial state.
    pub fn new_ctmc() -> Self {
        Self::new(ModelType::Ctmc, true)
    }

    /// Creates a POMDP with an initial state.
    pub fn new_pomdp() -> Self {
        Self::new(ModelType::Pomdp, true)
    }

    /// Creates a Markov automaton with an initial state.
    pub fn new_ma() -> Self {
        Self::new(ModelType::Ma, true)
    }

    /// The type of the model.
    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    /// The current stamp of the model.
    pub fn stamp(&self) -> ModelStamp {
        ModelStamp {
            uid: self.uid,
            generation: self.generation,
        }
    }

    // Records a structural mutation.
    fn touch(&mut self) {
        self.generation += 1;
    }

    fn check_state(&self, state: StateId) -> Result<(), ModelError> {
        if self.states.contains_key(&state) {
            Ok(())
        } else {
            Err(ModelError::MissingState(state))
        }
    }

    // ------------------------------------------------------------------
    // States
    // ------------------------------------------------------------------

    /// Adds a new state with the given labels and returns its id.
    ///
    /// The id is the smallest one not in use.
    pub fn new_state<I, S>(&mut self, labels: I) -> StateId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.new_state_with(labels, [])
    }

    /// Adds a new state with the given labels and variable valuations and returns its id.
    pub fn new_state_with<I, S, V>(&mut self, labels: I, valuations: V) -> StateId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        V: IntoIterator<Item = (String, Val)>,
    {
        let id = if let Some(id) = self.free_ids.pop_first() {
            id
        } else {
            let id = self.next_id;
            self.next_id += 1;
            id
        };
        let state = State {
            id,
            name: None,
            labels: labels.into_iter().map(Into::into).collect(),
            valuations: valuations.into_iter().collect(),
            observation: None,
        };
        trace!("new state {id} with labels {:?}", state.labels);
        self.states.insert(id, state);
        self.order.push(id);
        self.touch();
        id
    }

    /// Adds a new state with a unique name.
    ///
    /// Fails if another state has the same name.
    pub fn new_named_state<I, S>(&mut self, name: &str, labels: I) -> Result<StateId, ModelError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.names.contains_key(name) {
            return Err(ModelError::DuplicateName(name.to_owned()));
        }
        let id = self.new_state(labels);
        self.states.get_mut(&id).expect("state just created").name = Some(name.to_owned());
        self.names.insert(name.to_owned(), id);
        Ok(id)
    }

    /// The state with the given id.
    pub fn get_state(&self, state: StateId) -> Option<&State> {
        self.states.get(&state)
    }

    /// The state with the given name.
    pub fn get_state_by_name(&self, name: &str) -> Option<&State> {
        self.names.get(name).and_then(|id| self.states.get(id))
    }

    /// Iterates over the states, in enumeration order.
    pub fn get_states(&self) -> impl Iterator<Item = &State> {
        self.order.iter().map(|id| &self.states[id])
    }

    /// The ids of the states, in enumeration order.
    pub fn state_ids(&self) -> &[StateId] {
        &self.order
    }

    /// Position of the state in the enumeration order.
    pub fn position(&self, state: StateId) -> Option<usize> {
        self.order.iter().position(|s| *s == state)
    }

    /// The initial state: the first state labelled `"init"`, or else the first state.
    pub fn get_initial_state(&self) -> Option<StateId> {
        self.order
            .iter()
            .find(|id| self.states[*id].has_label(INIT_LABEL))
            .or_else(|| self.order.first())
            .copied()
    }

    /// Number of states.
    pub fn nr_states(&self) -> usize {
        self.order.len()
    }

    /// Adds a label to a state.
    pub fn add_label(&mut self, state: StateId, label: &str) -> Result<(), ModelError> {
        self.states
            .get_mut(&state)
            .ok_or(ModelError::MissingState(state))?
            .labels
            .insert(label.to_owned());
        Ok(())
    }

    /// The labels of a state.
    pub fn get_labels(&self, state: StateId) -> Option<&BTreeSet<String>> {
        self.states.get(&state).map(State::labels)
    }

    /// All labels used in the model.
    pub fn all_labels(&self) -> BTreeSet<String> {
        self.states
            .values()
            .flat_map(|s| s.labels.iter().cloned())
            .collect()
    }

    /// The states carrying the given label, in enumeration order.
    pub fn get_states_with_label(&self, label: &str) -> Vec<StateId> {
        self.order
            .iter()
            .filter(|id| self.states[*id].has_label(label))
            .copied()
            .collect()
    }

    /// Sets the value of a variable in a state.
    pub fn set_valuation(
        &mut self,
        state: StateId,
        variable: &str,
        value: Val,
    ) -> Result<(), ModelError> {
        self.states
            .get_mut(&state)
            .ok_or(ModelError::MissingState(state))?
            .valuations
            .insert(variable.to_owned(), value);
        Ok(())
    }

    /// The valuation of the variables of a state.
    pub fn get_valuations(&self, state: StateId) -> Option<&BTreeMap<String, Val>> {
        self.states.get(&state).map(State::valuations)
    }

    /// All variables valued in some state.
    pub fn variables(&self) -> BTreeSet<String> {
        self.states
            .values()
            .flat_map(|s| s.valuations.keys().cloned())
            .collect()
    }

    /// The (state, variable) pairs such that the variable is valued in some state but not in this one.
    pub fn unassigned_variables(&self) -> Vec<(StateId, String)> {
        let variables = self.variables();
        self.order
            .iter()
            .flat_map(|id| {
                let valuations = &self.states[id].valuations;
                variables
                    .iter()
                    .filter(|var| !valuations.contains_key(*var))
                    .map(|var| (*id, var.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Assigns the default value to every unassigned variable,
    /// see [`Model::unassigned_variables`].
    pub fn set_valuation_at_remaining_states(&mut self, default: Val) {
        for (state, var) in self.unassigned_variables() {
            self.states
                .get_mut(&state)
                .expect("state exists")
                .valuations
                .insert(var, default);
        }
    }

    /// Sets the observation of a state.
    pub fn set_observation(
        &mut self,
        state: StateId,
        observation: Observation,
    ) -> Result<(), ModelError> {
        if !self.model_type.supports_observations() {
            return Err(ModelError::ObservationsNotSupported(self.model_type));
        }
        self.states
            .get_mut(&state)
            .ok_or(ModelError::MissingState(state))?
            .observation = Some(observation);
        Ok(())
    }

    /// The observation of a state, if set.
    pub fn get_observation(&self, state: StateId) -> Option<Observation> {
        self.states.get(&state).and_then(State::observation)
    }

    /// Sets the exit rate of a state explicitly.
    pub fn set_exit_rate(&mut self, state: StateId, rate: Value) -> Result<(), ModelError> {
        if !self.model_type.supports_rates() {
            return Err(ModelError::RatesNotSupported(self.model_type));
        }
        self.check_state(state)?;
        self.exit_rates.insert(state, rate);
        Ok(())
    }

    /// The exit rate of a state:
    /// either explicitly set, or the sum of the rates of its (empty-action) branch.
    ///
    /// Only CTMC states and markovian MA states have an exit rate.
    pub fn get_exit_rate(&self, state: StateId) -> Option<Value> {
        if let Some(rate) = self.exit_rates.get(&state) {
            return Some(rate.clone());
        }
        match self.model_type {
            ModelType::Ctmc => {}
            ModelType::Ma if self.markovian_states.contains(&state) => {}
            _ => return None,
        }
        self.get_branch(state).and_then(Branch::sum)
    }

    /// Marks a state of a Markov automaton as markovian.
    pub fn set_markovian(&mut self, state: StateId) -> Result<(), ModelError> {
        if self.model_type != ModelType::Ma {
            return Err(ModelError::MarkovianNotSupported(self.model_type));
        }
        self.check_state(state)?;
        self.markovian_states.insert(state);
        Ok(())
    }

    /// Tells whether a state is markovian.
    pub fn is_markovian(&self, state: StateId) -> bool {
        self.markovian_states.contains(&state)
    }

    /// The markovian states, ordered by id.
    pub fn markovian_states(&self) -> impl Iterator<Item = StateId> + '_ {
        self.markovian_states.iter().copied()
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    /// Registers a new action with the given labels.
    ///
    /// Fails if an action with the same labels already exists.
    /// Use [`Model::get_or_create_action`] for idempotent lookup.
    pub fn new_action<I, S>(&mut self, labels: I) -> Result<Action, ModelError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if !self.model_type.supports_actions() {
            return Err(ModelError::ActionsNotSupported(self.model_type));
        }
        let labels = labels.into_iter().map(Into::into).collect::<BTreeSet<_>>();
        if self.actions.get(&labels).is_some() {
            Err(ModelError::DuplicateAction(labels))
        } else {
            Ok(self.actions.insert(labels))
        }
    }

    /// The action with exactly the given labels.
    ///
    /// The empty label set denotes [`EMPTY_ACTION`].
    pub fn get_action<I, S>(&self, labels: I) -> Option<Action>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels = labels.into_iter().map(Into::into).collect::<BTreeSet<_>>();
        self.actions.get(&labels)
    }

    /// The action with exactly the given labels, created if it does not exist yet.
    pub fn get_or_create_action<I, S>(&mut self, labels: I) -> Result<Action, ModelError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels = labels.into_iter().map(Into::into).collect::<BTreeSet<_>>();
        if let Some(action) = self.actions.get(&labels) {
            Ok(action)
        } else if self.model_type.supports_actions() {
            Ok(self.actions.insert(labels))
        } else {
            Err(ModelError::ActionsNotSupported(self.model_type))
        }
    }

    /// The labels of an action, if it belongs to this model.
    pub fn action_labels(&self, action: Action) -> Option<&BTreeSet<String>> {
        self.actions.labels(action)
    }

    /// Iterates over the registered actions (excluding [`EMPTY_ACTION`]).
    pub fn actions(&self) -> impl Iterator<Item = (Action, &BTreeSet<String>)> {
        self.actions
            .labels
            .iter()
            .enumerate()
            .map(|(idx, labels)| (Action(idx as ActionIdx), labels))
    }

    // ------------------------------------------------------------------
    // Choices
    // ------------------------------------------------------------------

    fn check_choice(&self, state: StateId, choice: &Choice) -> Result<(), ModelError> {
        self.check_state(state)?;
        if !choice.is_homogeneous() {
            return Err(ModelError::InconsistentActionKind(state));
        }
        if let Some(action) = choice.duplicate_action() {
            return Err(ModelError::DuplicateChoiceAction { state, action });
        }
        for (action, branch) in choice.iter() {
            if *action != EMPTY_ACTION {
                if !self.model_type.supports_actions() {
                    return Err(ModelError::ActionsNotSupported(self.model_type));
                }
                if !self.actions.contains(*action) {
                    return Err(ModelError::MissingAction(*action));
                }
            }
            branch.targets().try_for_each(|target| self.check_state(target))?;
        }
        Ok(())
    }

    /// Replaces the choice of a state.
    pub fn set_choice(&mut self, state: StateId, choice: Choice) -> Result<(), ModelError> {
        self.check_choice(state, &choice)?;
        self.choices.insert(state, choice);
        self.touch();
        Ok(())
    }

    /// Replaces the choice of a state with a single branch under the empty action.
    pub fn set_probabilistic_choice(
        &mut self,
        state: StateId,
        branch: Vec<(Value, StateId)>,
    ) -> Result<(), ModelError> {
        self.set_choice(state, Choice::from_branch(Branch::new(branch)))
    }

    /// Replaces the choice of a state with one probability-1 transition per action.
    pub fn set_action_choice(
        &mut self,
        state: StateId,
        transitions: Vec<(Action, StateId)>,
    ) -> Result<(), ModelError> {
        self.set_choice(state, Self::action_choice(transitions))
    }

    fn action_choice(transitions: Vec<(Action, StateId)>) -> Choice {
        transitions
            .into_iter()
            .map(|(action, target)| (action, Branch::new(vec![(Value::one(), target)])))
            .collect()
    }

    /// Merges a choice into the existing choice of a state.
    ///
    /// Branches under the empty action are concatenated (without checking probabilities),
    /// labelled actions are added as new alternatives.
    /// Fails if the empty action would be mixed with labelled actions,
    /// or if a labelled action is already available in the state.
    pub fn add_choice(&mut self, state: StateId, choice: Choice) -> Result<(), ModelError> {
        self.check_choice(state, &choice)?;
        let existing = self.choices.get(&state).cloned().unwrap_or_default();
        let merged = if existing.is_empty() {
            choice
        } else if existing.has_empty_action() && choice.has_empty_action() {
            let mut merged = existing;
            for (_, branch) in choice.choice {
                merged.choice[0].1.branch.extend(branch.branch);
            }
            merged
        } else if !existing.has_empty_action() && !choice.has_empty_action() {
            let mut merged = existing;
            for (action, branch) in choice.choice {
                if merged.get(action).is_some() {
                    return Err(ModelError::DuplicateChoiceAction { state, action });
                }
                merged.choice.push((action, branch));
            }
            merged
        } else {
            return Err(ModelError::InconsistentActionKind(state));
        };
        self.choices.insert(state, merged);
        self.touch();
        Ok(())
    }

    /// Merges (value, target) pairs into the empty-action branch of a state.
    pub fn add_probabilistic_choice(
        &mut self,
        state: StateId,
        branch: Vec<(Value, StateId)>,
    ) -> Result<(), ModelError> {
        self.add_choice(state, Choice::from_branch(Branch::new(branch)))
    }

    /// Adds probability-1 transitions under new actions to a state.
    pub fn add_action_choice(
        &mut self,
        state: StateId,
        transitions: Vec<(Action, StateId)>,
    ) -> Result<(), ModelError> {
        self.add_choice(state, Self::action_choice(transitions))
    }

    /// The choice of a state, if set.
    pub fn get_choice(&self, state: StateId) -> Option<&Choice> {
        self.choices.get(&state)
    }

    /// The branch of a state under the empty action.
    pub fn get_branch(&self, state: StateId) -> Option<&Branch> {
        self.choices
            .get(&state)
            .and_then(|choice| choice.get(EMPTY_ACTION))
    }

    /// All states reachable in one step from a state.
    pub fn get_successor_states(&self, state: StateId) -> BTreeSet<StateId> {
        self.choices
            .get(&state)
            .map(Choice::successors)
            .unwrap_or_default()
    }

    /// Total number of (state, action) pairs.
    pub fn nr_choices(&self) -> usize {
        self.choices.values().map(Choice::len).sum()
    }

    /// Total number of (value, target) pairs.
    pub fn nr_transitions(&self) -> usize {
        self.choices
            .values()
            .flat_map(|choice| choice.iter().map(|(_, branch)| branch.len()))
            .sum()
    }

    /// Installs a self-loop (with value one, under the empty action)
    /// on every state without outgoing transitions.
    pub fn add_self_loops(&mut self) {
        let absorbing = self
            .order
            .iter()
            .filter(|id| self.choices.get(*id).is_none_or(Choice::is_empty))
            .copied()
            .collect::<Vec<_>>();
        if absorbing.is_empty() {
            return;
        }
        debug!("adding self-loops to {} states", absorbing.len());
        for state in absorbing {
            self.choices.insert(
                state,
                Choice::from_branch(Branch::new(vec![(Value::one(), state)])),
            );
        }
        self.touch();
    }

    /// Tells whether every state has at least one outgoing transition.
    pub fn all_states_outgoing_transition(&self) -> bool {
        self.order
            .iter()
            .all(|id| self.choices.get(id).is_some_and(|c| !c.is_empty()))
    }

    /// Tells whether some transition has value zero.
    pub fn has_zero_transition(&self) -> bool {
        self.choices
            .values()
            .flat_map(|c| c.iter().flat_map(|(_, b)| b.values()))
            .any(Value::is_zero)
    }

    fn is_probabilistic_state(&self, state: StateId) -> bool {
        match self.model_type {
            ModelType::Ctmc => false,
            ModelType::Ma => !self.markovian_states.contains(&state),
            _ => true,
        }
    }

    /// Rescales the numeric branches of probabilistic states so that they sum to one.
    ///
    /// Fails on CTMCs; markovian states of Markov automata are left untouched.
    pub fn normalize(&mut self) -> Result<(), ModelError> {
        if self.model_type == ModelType::Ctmc {
            return Err(ModelError::NormalizeRates(self.model_type));
        }
        for (state, choice) in self.choices.iter_mut() {
            if self.markovian_states.contains(state) {
                continue;
            }
            choice.branches_mut().for_each(Branch::normalize);
        }
        self.touch();
        Ok(())
    }

    /// Tells whether every numeric branch of every probabilistic state sums to one,
    /// up to `epsilon` (exactly, when all values are rational and `epsilon` is zero).
    ///
    /// Non-numeric branches are not checked.
    pub fn is_stochastic(&self, epsilon: f64) -> bool {
        self.order
            .iter()
            .filter(|id| self.is_probabilistic_state(**id))
            .filter_map(|id| self.choices.get(id))
            .flat_map(|choice| choice.iter())
            .all(|(_, branch)| match branch.sum() {
                Some(Value::Rational(sum)) if epsilon == 0. => sum == num::one(),
                Some(sum) => sum.as_f64().is_some_and(|sum| (sum - 1.).abs() <= epsilon),
                None => true,
            })
    }

    // ------------------------------------------------------------------
    // Structural operations
    // ------------------------------------------------------------------

    /// Removes a state, together with all transitions and rewards referring to it.
    ///
    /// Actions left without successors are dropped from their choices.
    /// If `reassign_ids` is set, the remaining states are renumbered from 0 in enumeration order.
    pub fn remove_state(&mut self, state: StateId, reassign_ids: bool) -> Result<(), ModelError> {
        let removed = self
            .states
            .remove(&state)
            .ok_or(ModelError::MissingState(state))?;
        if let Some(name) = removed.name {
            self.names.remove(&name);
        }
        self.order.retain(|s| *s != state);
        self.choices.remove(&state);
        let dropped = self
            .choices
            .iter_mut()
            .flat_map(|(id, choice)| {
                let id = *id;
                choice
                    .remove_target(state)
                    .into_iter()
                    .map(move |action| (id, action))
            })
            .collect::<BTreeSet<_>>();
        self.rewards.iter_mut().for_each(|rewards| {
            rewards.retain_states(|s| s != state);
            rewards.retain_pairs(|s, a| !dropped.contains(&(s, a)));
        });
        self.exit_rates.remove(&state);
        self.markovian_states.remove(&state);
        self.free_ids.insert(state);
        self.touch();
        debug!("removed state {state}");
        if reassign_ids {
            self.reassign_ids();
        }
        Ok(())
    }

    /// Renumbers the states from 0, following the enumeration order.
    pub fn reassign_ids(&mut self) {
        let map = self
            .order
            .iter()
            .enumerate()
            .map(|(new, old)| (*old, new))
            .collect::<HashMap<_, _>>();
        self.remap(&map);
        self.free_ids.clear();
        self.next_id = self.order.len();
        self.touch();
    }

    fn remap(&mut self, map: &HashMap<StateId, StateId>) {
        self.states = std::mem::take(&mut self.states)
            .into_values()
            .map(|mut state| {
                state.id = map[&state.id];
                (state.id, state)
            })
            .collect();
        self.order.iter_mut().for_each(|id| *id = map[id]);
        self.names.values_mut().for_each(|id| *id = map[id]);
        self.choices = std::mem::take(&mut self.choices)
            .into_iter()
            .map(|(id, mut choice)| {
                choice
                    .branches_mut()
                    .for_each(|branch| branch.targets_mut().for_each(|t| *t = map[t]));
                (map[&id], choice)
            })
            .collect();
        self.rewards.iter_mut().for_each(|r| r.remap(map));
        self.exit_rates = std::mem::take(&mut self.exit_rates)
            .into_iter()
            .map(|(id, rate)| (map[&id], rate))
            .collect();
        self.markovian_states = self.markovian_states.iter().map(|id| map[id]).collect();
    }

    /// Returns a new model with only the given states
    /// and the transitions among them.
    ///
    /// State ids are preserved and branches are not renormalized.
    pub fn get_sub_model(&self, states: &[StateId]) -> Result<Model, ModelError> {
        states.iter().try_for_each(|s| self.check_state(*s))?;
        let keep = states.iter().copied().collect::<BTreeSet<_>>();
        let mut sub = Model::new(self.model_type, false);
        sub.actions = self.actions.clone();
        sub.order = self
            .order
            .iter()
            .filter(|id| keep.contains(id))
            .copied()
            .collect();
        sub.states = sub
            .order
            .iter()
            .map(|id| (*id, self.states[id].clone()))
            .collect();
        sub.names = self
            .names
            .iter()
            .filter(|(_, id)| keep.contains(id))
            .map(|(name, id)| (name.clone(), *id))
            .collect();
        let mut dropped = BTreeSet::new();
        sub.choices = self
            .choices
            .iter()
            .filter(|(id, _)| keep.contains(id))
            .map(|(id, choice)| {
                let mut choice = choice.clone();
                choice.choice.iter_mut().for_each(|(_, branch)| {
                    branch.branch.retain(|(_, target)| keep.contains(target))
                });
                dropped.extend(
                    choice
                        .choice
                        .iter()
                        .filter(|(_, branch)| branch.is_empty())
                        .map(|(action, _)| (*id, *action)),
                );
                choice.choice.retain(|(_, branch)| !branch.is_empty());
                (*id, choice)
            })
            .collect();
        sub.rewards = self.rewards.clone();
        sub.rewards.iter_mut().for_each(|r| {
            r.retain_states(|s| keep.contains(&s));
            r.retain_pairs(|s, a| !dropped.contains(&(s, a)));
        });
        sub.exit_rates = self
            .exit_rates
            .iter()
            .filter(|(id, _)| keep.contains(id))
            .map(|(id, rate)| (*id, rate.clone()))
            .collect();
        sub.markovian_states = self
            .markovian_states
            .intersection(&keep)
            .copied()
            .collect();
        sub.next_id = keep.last().map_or(0, |last| last + 1);
        sub.free_ids = (0..sub.next_id).filter(|id| !keep.contains(id)).collect();
        Ok(sub)
    }

    fn values(&self) -> impl Iterator<Item = &Value> {
        self.choices
            .values()
            .flat_map(|c| c.iter().flat_map(|(_, b)| b.values()))
            .chain(self.rewards.iter().flat_map(RewardModel::values))
            .chain(self.exit_rates.values())
    }

    /// Tells whether some value of the model is parametric.
    pub fn is_parametric(&self) -> bool {
        self.values().any(Value::is_parametric)
    }

    /// Tells whether some value of the model is an interval.
    pub fn is_interval_model(&self) -> bool {
        self.values().any(Value::is_interval)
    }

    /// All parameters occurring in the model.
    pub fn get_parameters(&self) -> BTreeSet<String> {
        self.values().flat_map(Value::parameters).collect()
    }

    /// Returns a copy of the model where every parametric value is replaced by
    /// its valuation under the given assignment.
    ///
    /// Fails if some parameter is not assigned.
    pub fn parameter_valuation(&self, assignment: &Assignment) -> Result<Model, ModelError> {
        let mut model = self.clone();
        for (state, choice) in model.choices.iter_mut() {
            for value in choice.branches_mut().flat_map(Branch::values_mut) {
                *value = value
                    .valuation(assignment)
                    .map_err(|source| ModelError::Valuation {
                        state: *state,
                        source,
                    })?;
            }
        }
        for rewards in model.rewards.iter_mut() {
            for (state, value) in rewards.values_mut() {
                *value = value
                    .valuation(assignment)
                    .map_err(|source| ModelError::Valuation { state, source })?;
            }
        }
        for (state, rate) in model.exit_rates.iter_mut() {
            *rate = rate
                .valuation(assignment)
                .map_err(|source| ModelError::Valuation {
                    state: *state,
                    source,
                })?;
        }
        Ok(model)
    }

    // ------------------------------------------------------------------
    // Rewards
    // ------------------------------------------------------------------

    /// Creates a new, empty reward model.
    pub fn new_reward_model(&mut self, name: &str) -> Result<&mut RewardModel, ModelError> {
        if self.rewards.iter().any(|r| r.name() == name) {
            return Err(ModelError::DuplicateRewardModel(name.to_owned()));
        }
        self.rewards.push(RewardModel::new(name.to_owned()));
        Ok(self.rewards.last_mut().expect("reward model just pushed"))
    }

    /// The reward model with the given name.
    pub fn get_rewards(&self, name: &str) -> Option<&RewardModel> {
        self.rewards.iter().find(|r| r.name() == name)
    }

    /// The reward model with the given name, mutably.
    pub fn get_rewards_mut(&mut self, name: &str) -> Option<&mut RewardModel> {
        self.rewards.iter_mut().find(|r| r.name() == name)
    }

    /// All reward models, in creation order.
    pub fn reward_models(&self) -> &[RewardModel] {
        &self.rewards
    }

    /// Enumerates the (state, action) pairs:
    /// states in enumeration order, actions in choice order.
    pub fn state_action_pairs(&self) -> Vec<(StateId, Action)> {
        self.order
            .iter()
            .flat_map(|id| {
                self.choices
                    .get(id)
                    .into_iter()
                    .flat_map(|c| c.actions().map(|a| (*id, a)))
            })
            .collect()
    }

    /// Position of a (state, action) pair in [`Model::state_action_pairs`].
    pub fn get_state_action_id(&self, state: StateId, action: Action) -> Option<usize> {
        self.state_action_pairs()
            .iter()
            .position(|pair| *pair == (state, action))
    }

    /// The (state, action) pair at the given position of [`Model::state_action_pairs`].
    pub fn get_state_action_pair(&self, id: usize) -> Option<(StateId, Action)> {
        self.state_action_pairs().get(id).copied()
    }

    /// Sets the state-action rewards of a reward model from a vector
    /// following the order of [`Model::state_action_pairs`].
    pub fn set_rewards_from_vector(
        &mut self,
        name: &str,
        vector: Vec<Value>,
    ) -> Result<(), ModelError> {
        let pairs = self.state_action_pairs();
        self.get_rewards_mut(name)
            .ok_or_else(|| ModelError::MissingRewardModel(name.to_owned()))?
            .set_from_rewards_vector(&pairs, vector)
    }

    /// Sets the default reward wherever a reward model has no entry.
    ///
    /// State-action rewards are filled for reward models that have some
    /// (or are empty, in models with actions); state rewards otherwise.
    pub fn set_unset_rewards(&mut self, name: &str, default: Value) -> Result<(), ModelError> {
        let pairs = self.state_action_pairs();
        let order = self.order.clone();
        let supports_actions = self.model_type.supports_actions();
        let rewards = self
            .get_rewards_mut(name)
            .ok_or_else(|| ModelError::MissingRewardModel(name.to_owned()))?;
        let empty = !rewards.has_state_rewards() && !rewards.has_state_action_rewards();
        if rewards.has_state_action_rewards() || (empty && supports_actions) {
            rewards.fill_pairs(&pairs, &default);
        }
        if rewards.has_state_rewards() || (empty && !supports_actions) {
            rewards.fill_states(order.into_iter(), &default);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------

    /// A short, human-readable summary of the model.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} with {} states, {} choices and {} transitions",
            self.model_type,
            self.nr_states(),
            self.nr_choices(),
            self.nr_transitions()
        );
        let labels = self.all_labels().into_iter().collect::<Vec<_>>();
        if !labels.is_empty() {
            summary.push_str(&format!("\nlabels: {}", labels.join(", ")));
        }
        if !self.rewards.is_empty() {
            let names = self.rewards.iter().map(RewardModel::name).collect::<Vec<_>>();
            summary.push_str(&format!("\nreward models: {}", names.join(", ")));
        }
        let parameters = self.get_parameters().into_iter().collect::<Vec<_>>();
        if !parameters.is_empty() {
            summary.push_str(&format!("\nparameters: {}", parameters.join(", ")));
        }
        summary
    }

    fn action_name(&self, action: Action) -> String {
        self.action_labels(action)
            .map(|labels| labels.iter().cloned().collect::<Vec<_>>().join(","))
            .unwrap_or_default()
    }

    // Choice of a state with actions replaced by their labels and targets by their positions,
    // sorted so that comparison does not depend on insertion order.
    fn normalized_choice(
        &self,
        state: StateId,
        positions: &HashMap<StateId, usize>,
    ) -> Vec<(BTreeSet<String>, Vec<(usize, Value)>)> {
        let mut choice = self
            .choices
            .get(&state)
            .map(|choice| {
                choice
                    .iter()
                    .map(|(action, branch)| {
                        let labels = self.action_labels(*action).cloned().unwrap_or_default();
                        let mut branch = branch
                            .iter()
                            .map(|(value, target)| (positions[target], value.clone()))
                            .collect::<Vec<_>>();
                        branch.sort_by_key(|(target, _)| *target);
                        (labels, branch)
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        choice.sort_by(|(a, _), (b, _)| a.cmp(b));
        choice
    }

    fn normalized_rewards(
        &self,
        rewards: &RewardModel,
        positions: &HashMap<StateId, usize>,
    ) -> (
        BTreeMap<usize, Value>,
        BTreeMap<(usize, BTreeSet<String>), Value>,
    ) {
        let state_rewards = rewards
            .state_rewards()
            .filter_map(|(s, v)| positions.get(&s).map(|p| (*p, v.clone())))
            .collect();
        let state_action_rewards = rewards
            .state_action_rewards()
            .filter_map(|((s, a), v)| {
                let labels = self.action_labels(a).cloned().unwrap_or_default();
                positions.get(&s).map(|p| ((*p, labels), v.clone()))
            })
            .collect();
        (state_rewards, state_action_rewards)
    }

    fn positions(&self) -> HashMap<StateId, usize> {
        self.order
            .iter()
            .enumerate()
            .map(|(pos, id)| (*id, pos))
            .collect()
    }
}

// Structural equality: states are matched by enumeration position (not by id),
// actions by their labels.
impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        if self.model_type != other.model_type || self.nr_states() != other.nr_states() {
            return false;
        }
        let self_positions = self.positions();
        let other_positions = other.positions();
        let states_eq = self.order.iter().zip(&other.order).all(|(s, o)| {
            let self_state = &self.states[s];
            let other_state = &other.states[o];
            self_state.labels == other_state.labels
                && self_state.valuations == other_state.valuations
                && self_state.observation == other_state.observation
                && self.is_markovian(*s) == other.is_markovian(*o)
                && self.get_exit_rate(*s) == other.get_exit_rate(*o)
                && self.normalized_choice(*s, &self_positions)
                    == other.normalized_choice(*o, &other_positions)
        });
        if !states_eq || self.rewards.len() != other.rewards.len() {
            return false;
        }
        self.rewards.iter().all(|rewards| {
            other.get_rewards(rewards.name()).is_some_and(|other_rewards| {
                self.normalized_rewards(rewards, &self_positions)
                    == other.normalized_rewards(other_rewards, &other_positions)
            })
        })
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary())?;
        for state in self.get_states() {
            let labels = state.labels.iter().cloned().collect::<Vec<_>>();
            writeln!(f, "state {} [{}]", state.id, labels.join(", "))?;
            if let Some(choice) = self.choices.get(&state.id) {
                for (action, branch) in choice.iter() {
                    let transitions = branch
                        .iter()
                        .map(|(value, target)| format!("{value} -> {target}"))
                        .collect::<Vec<_>>();
                    if *action == EMPTY_ACTION {
                        writeln!(f, "  {}", transitions.join(", "))?;
                    } else {
                        writeln!(
                            f,
                            "  {}: {}",
                            self.action_name(*action),
                            transitions.join(", ")
                        )?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Interval, Polynomial};

    fn coin() -> (Model, StateId, StateId) {
        let mut dtmc = Model::new_dtmc();
        let init = dtmc.get_initial_state().unwrap();
        let heads = dtmc.new_state(["heads"]);
        let tails = dtmc.new_state(["tails"]);
        dtmc.set_probabilistic_choice(
            init,
            vec![(Value::ratio(1, 2), heads), (Value::ratio(1, 2), tails)],
        )
        .unwrap();
        (dtmc, heads, tails)
    }

    #[test]
    fn initial_state() {
        let dtmc = Model::new_dtmc();
        assert_eq!(dtmc.nr_states(), 1);
        let init = dtmc.get_initial_state().unwrap();
        assert!(dtmc.get_state(init).unwrap().has_label(INIT_LABEL));
    }

    #[test]
    fn smallest_free_id() {
        let (mut dtmc, heads, tails) = coin();
        dtmc.remove_state(heads, false).unwrap();
        let new = dtmc.new_state(["new"]);
        assert_eq!(new, heads);
        assert!(new < tails);
        let newer = dtmc.new_state(["newer"]);
        assert_eq!(newer, 3);
    }

    #[test]
    fn duplicate_names() {
        let mut dtmc = Model::new_dtmc();
        dtmc.new_named_state("s", ["a"]).unwrap();
        assert_eq!(
            dtmc.new_named_state("s", ["b"]),
            Err(ModelError::DuplicateName(String::from("s")))
        );
        assert!(dtmc.get_state_by_name("s").unwrap().has_label("a"));
    }

    #[test]
    fn duplicate_action() {
        let mut mdp = Model::new_mdp();
        let a = mdp.new_action(["a"]).unwrap();
        assert!(matches!(
            mdp.new_action(["a"]),
            Err(ModelError::DuplicateAction(_))
        ));
        assert_eq!(mdp.get_or_create_action(["a"]), Ok(a));
        assert_eq!(mdp.get_action(Vec::<String>::new()), Some(EMPTY_ACTION));
    }

    #[test]
    fn no_actions_in_dtmc() {
        let mut dtmc = Model::new_dtmc();
        assert_eq!(
            dtmc.new_action(["a"]),
            Err(ModelError::ActionsNotSupported(ModelType::Dtmc))
        );
    }

    #[test]
    fn add_choice_concatenates() {
        let (mut dtmc, heads, _) = coin();
        let init = dtmc.get_initial_state().unwrap();
        dtmc.add_probabilistic_choice(init, vec![(Value::ratio(1, 2), heads)])
            .unwrap();
        assert_eq!(dtmc.get_branch(init).unwrap().len(), 3);
        assert!(!dtmc.is_stochastic(0.));
        dtmc.normalize().unwrap();
        assert!(dtmc.is_stochastic(0.));
        assert_eq!(
            dtmc.get_branch(init).unwrap().sum(),
            Some(Value::one())
        );
    }

    #[test]
    fn inconsistent_action_kind() {
        let mut mdp = Model::new_mdp();
        let init = mdp.get_initial_state().unwrap();
        let s = mdp.new_state(["s"]);
        let a = mdp.new_action(["a"]).unwrap();
        mdp.set_action_choice(init, vec![(a, s)]).unwrap();
        assert_eq!(
            mdp.add_probabilistic_choice(init, vec![(Value::one(), s)]),
            Err(ModelError::InconsistentActionKind(init))
        );
        let b = mdp.new_action(["b"]).unwrap();
        mdp.add_action_choice(init, vec![(b, init)]).unwrap();
        assert_eq!(mdp.get_choice(init).unwrap().len(), 2);
        assert_eq!(
            mdp.add_action_choice(init, vec![(b, s)]),
            Err(ModelError::DuplicateChoiceAction {
                state: init,
                action: b
            })
        );
    }

    #[test]
    fn self_loops_are_idempotent() {
        let (mut dtmc, heads, tails) = coin();
        assert!(!dtmc.all_states_outgoing_transition());
        dtmc.add_self_loops();
        assert!(dtmc.all_states_outgoing_transition());
        let once = dtmc.clone();
        let stamp = dtmc.stamp();
        dtmc.add_self_loops();
        assert_eq!(dtmc, once);
        assert_eq!(dtmc.stamp(), stamp);
        assert_eq!(
            dtmc.get_successor_states(heads),
            BTreeSet::from([heads])
        );
        assert_eq!(
            dtmc.get_successor_states(tails),
            BTreeSet::from([tails])
        );
    }

    #[test]
    fn normalize_floats() {
        let mut dtmc = Model::new_dtmc();
        let init = dtmc.get_initial_state().unwrap();
        let s = dtmc.new_state(["s"]);
        dtmc.set_probabilistic_choice(init, vec![(Value::from(1.), s), (Value::from(3.), init)])
            .unwrap();
        assert!(!dtmc.is_stochastic(1e-6));
        dtmc.normalize().unwrap();
        assert!(dtmc.is_stochastic(1e-9));
        let values = dtmc
            .get_branch(init)
            .unwrap()
            .values()
            .map(|v| v.as_f64().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(values, vec![0.25, 0.75]);
    }

    #[test]
    fn normalize_ctmc_fails() {
        let mut ctmc = Model::new_ctmc();
        assert_eq!(
            ctmc.normalize(),
            Err(ModelError::NormalizeRates(ModelType::Ctmc))
        );
    }

    #[test]
    fn ctmc_rates_untouched() {
        let mut ctmc = Model::new_ctmc();
        let init = ctmc.get_initial_state().unwrap();
        let s = ctmc.new_state(["s"]);
        ctmc.set_probabilistic_choice(init, vec![(Value::from(2i64), s), (Value::from(3i64), init)])
            .unwrap();
        assert!(ctmc.normalize().is_err());
        assert_eq!(ctmc.get_branch(init).unwrap().sum(), Some(Value::from(5i64)));
        // rates are not probabilities
        assert!(ctmc.is_stochastic(0.));
    }

    #[test]
    fn normalize_skips_markovian_states() {
        let mut ma = Model::new_ma();
        let init = ma.get_initial_state().unwrap();
        let s = ma.new_state(["s"]);
        ma.set_probabilistic_choice(init, vec![(Value::from(1i64), s), (Value::from(1i64), init)])
            .unwrap();
        ma.set_probabilistic_choice(s, vec![(Value::from(4i64), init), (Value::from(2i64), s)])
            .unwrap();
        ma.set_markovian(s).unwrap();
        ma.normalize().unwrap();
        assert_eq!(ma.get_branch(init).unwrap().sum(), Some(Value::one()));
        assert_eq!(ma.get_branch(s).unwrap().sum(), Some(Value::from(6i64)));
        assert!(ma.is_stochastic(0.));
    }

    #[test]
    fn normalize_mdp() {
        let mut mdp = Model::new_mdp();
        let init = mdp.get_initial_state().unwrap();
        let s = mdp.new_state(["s"]);
        let a = mdp.new_action(["a"]).unwrap();
        let b = mdp.new_action(["b"]).unwrap();
        mdp.set_choice(
            init,
            Choice::new(vec![
                (a, Branch::new(vec![(Value::ratio(1, 2), s), (Value::ratio(1, 2), init)])),
                (b, Branch::new(vec![(Value::ratio(1, 3), s)])),
            ]),
        )
        .unwrap();
        mdp.add_self_loops();
        assert!(!mdp.is_stochastic(0.));
        mdp.normalize().unwrap();
        assert!(mdp.is_stochastic(0.));
        let choice = mdp.get_choice(init).unwrap();
        let (_, under_b) = choice.iter().find(|(action, _)| *action == b).unwrap();
        assert_eq!(under_b.iter().next(), Some(&(Value::one(), s)));
    }

    #[test]
    fn normalize_skips_non_numeric_branches() {
        let mut dtmc = Model::new_dtmc();
        let init = dtmc.get_initial_state().unwrap();
        let s = dtmc.new_state(["s"]);
        let low = Value::from(Interval::new(0.2, 0.4).unwrap());
        let high = Value::from(Interval::new(0.3, 0.9).unwrap());
        dtmc.set_probabilistic_choice(init, vec![(low.clone(), s), (high.clone(), init)])
            .unwrap();
        let mut p = Polynomial::new(["p"]);
        p.add_term(&[1], 2.).unwrap();
        let p = Value::from(p);
        dtmc.set_probabilistic_choice(s, vec![(p.clone(), s)]).unwrap();
        dtmc.normalize().unwrap();
        let values = |state| dtmc.get_branch(state).unwrap().values().cloned().collect::<Vec<_>>();
        assert_eq!(values(init), vec![low, high]);
        assert_eq!(values(s), vec![p]);
        // non-numeric branches are not checked
        assert!(dtmc.is_stochastic(0.));
    }

    #[test]
    fn normalize_skips_zero_sums() {
        let mut dtmc = Model::new_dtmc();
        let init = dtmc.get_initial_state().unwrap();
        let s = dtmc.new_state(["s"]);
        dtmc.set_probabilistic_choice(init, vec![(Value::zero(), s), (Value::zero(), init)])
            .unwrap();
        dtmc.add_self_loops();
        dtmc.normalize().unwrap();
        assert_eq!(dtmc.get_branch(init).unwrap().sum(), Some(Value::zero()));
        assert!(!dtmc.is_stochastic(1e-6));
        assert!(dtmc.has_zero_transition());
    }

    #[test]
    fn parameter_valuation() {
        let mut dtmc = Model::new_dtmc();
        let init = dtmc.get_initial_state().unwrap();
        let heads = dtmc.new_state(["heads"]);
        let tails = dtmc.new_state(["tails"]);
        let mut p = Polynomial::new(["p"]);
        p.add_term(&[1], 1.).unwrap();
        let mut q = Polynomial::new(["p"]);
        q.add_term(&[0], 1.).unwrap();
        q.add_term(&[1], -1.).unwrap();
        dtmc.set_probabilistic_choice(init, vec![(Value::from(p), heads), (Value::from(q), tails)])
            .unwrap();
        dtmc.add_self_loops();
        assert!(dtmc.is_parametric());
        assert_eq!(dtmc.get_parameters(), BTreeSet::from([String::from("p")]));

        let valued = dtmc
            .parameter_valuation(&Assignment::from([(String::from("p"), 0.25)]))
            .unwrap();
        assert!(!valued.is_parametric());
        assert!(valued.get_parameters().is_empty());
        let values = valued
            .get_branch(init)
            .unwrap()
            .values()
            .map(|v| v.as_f64().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(values, vec![0.25, 0.75]);
        assert!(valued.is_stochastic(1e-9));
        // the original model is left parametric
        assert!(dtmc.is_parametric());

        assert_eq!(
            dtmc.parameter_valuation(&Assignment::new()),
            Err(ModelError::Valuation {
                state: init,
                source: ParametricError::UnassignedVariable(String::from("p")),
            })
        );
    }

    #[test]
    fn remove_state_drops_action_rewards() {
        let mut mdp = Model::new_mdp();
        let init = mdp.get_initial_state().unwrap();
        let a = mdp.new_state(["a"]);
        let b = mdp.new_state(["b"]);
        let go_a = mdp.new_action(["go_a"]).unwrap();
        let go_b = mdp.new_action(["go_b"]).unwrap();
        mdp.set_action_choice(init, vec![(go_a, a), (go_b, b)]).unwrap();
        let rewards = mdp.new_reward_model("r").unwrap();
        rewards.set_state_action_reward(init, go_a, Value::one());
        rewards.set_state_action_reward(init, go_b, Value::from(2i64));
        mdp.remove_state(b, false).unwrap();
        let rewards = mdp.get_rewards("r").unwrap();
        assert_eq!(rewards.get_state_action_reward(init, go_a), Some(&Value::one()));
        assert_eq!(rewards.get_state_action_reward(init, go_b), None);
        assert_eq!(rewards.state_action_rewards().count(), 1);
    }

    #[test]
    fn remove_state_and_reassign() {
        let (mut dtmc, heads, tails) = coin();
        dtmc.add_self_loops();
        dtmc.new_reward_model("r")
            .unwrap()
            .set_state_reward(tails, Value::one());
        dtmc.remove_state(heads, true).unwrap();
        assert_eq!(dtmc.nr_states(), 2);
        assert_eq!(dtmc.state_ids(), &[0, 1]);
        let init = dtmc.get_initial_state().unwrap();
        assert_eq!(dtmc.get_branch(init).unwrap().len(), 1);
        let tails = dtmc.get_states_with_label("tails")[0];
        assert_eq!(tails, 1);
        assert_eq!(
            dtmc.get_rewards("r").unwrap().get_state_reward(tails),
            Some(&Value::one())
        );
        assert_eq!(dtmc.get_successor_states(tails), BTreeSet::from([tails]));
    }

    #[test]
    fn sub_model() {
        let (mut dtmc, heads, _) = coin();
        dtmc.add_self_loops();
        let init = dtmc.get_initial_state().unwrap();
        let sub = dtmc.get_sub_model(&[init, heads]).unwrap();
        assert_eq!(sub.nr_states(), 2);
        assert_eq!(sub.get_branch(init).unwrap().len(), 1);
        assert!(!sub.is_stochastic(0.));
        // ids are preserved, so the freed id is reused first
        let mut sub = sub;
        assert_eq!(sub.new_state(["x"]), 2);
    }

    #[test]
    fn sub_model_drops_outside_transitions() {
        let mut mdp = Model::new_mdp();
        let init = mdp.get_initial_state().unwrap();
        let inside = mdp.new_state(["inside"]);
        let outside = mdp.new_state(["outside"]);
        let stay = mdp.new_action(["stay"]).unwrap();
        let leave = mdp.new_action(["leave"]).unwrap();
        mdp.set_choice(
            init,
            Choice::new(vec![
                (
                    stay,
                    Branch::new(vec![(Value::ratio(1, 2), inside), (Value::ratio(1, 2), outside)]),
                ),
                (leave, Branch::new(vec![(Value::one(), outside)])),
            ]),
        )
        .unwrap();
        mdp.add_self_loops();
        let rewards = mdp.new_reward_model("r").unwrap();
        rewards.set_state_action_reward(init, stay, Value::one());
        rewards.set_state_action_reward(init, leave, Value::one());
        rewards.set_state_reward(outside, Value::one());

        let sub = mdp.get_sub_model(&[init, inside]).unwrap();
        assert_eq!(sub.nr_states(), 2);
        assert!(sub.get_state(outside).is_none());
        let choice = sub.get_choice(init).unwrap();
        assert_eq!(choice.actions().collect::<Vec<_>>(), vec![stay]);
        assert_eq!(sub.get_successor_states(init), BTreeSet::from([inside]));
        let rewards = sub.get_rewards("r").unwrap();
        assert_eq!(rewards.state_action_rewards().count(), 1);
        assert!(!rewards.has_state_rewards());
        // branches are not renormalized
        assert!(!sub.is_stochastic(0.));
        // the source model is unchanged
        assert_eq!(mdp.get_successor_states(init), BTreeSet::from([inside, outside]));
    }

    #[test]
    fn state_action_pairs() {
        let mut mdp = Model::new_mdp();
        let init = mdp.get_initial_state().unwrap();
        let s = mdp.new_state(["s"]);
        let a = mdp.new_action(["a"]).unwrap();
        let b = mdp.new_action(["b"]).unwrap();
        mdp.set_action_choice(init, vec![(a, s), (b, init)]).unwrap();
        mdp.add_self_loops();
        assert_eq!(
            mdp.state_action_pairs(),
            vec![(init, a), (init, b), (s, EMPTY_ACTION)]
        );
        assert_eq!(mdp.get_state_action_id(init, b), Some(1));
        assert_eq!(mdp.get_state_action_pair(2), Some((s, EMPTY_ACTION)));
        mdp.new_reward_model("r").unwrap();
        assert!(matches!(
            mdp.set_rewards_from_vector("r", vec![Value::one()]),
            Err(ModelError::RewardsVectorLength {
                expected: 3,
                found: 1
            })
        ));
        mdp.set_rewards_from_vector("r", vec![Value::from(1i64), Value::from(2i64), Value::from(3i64)])
            .unwrap();
        assert_eq!(
            mdp.get_rewards("r").unwrap().get_state_action_reward(init, b),
            Some(&Value::from(2i64))
        );
    }

    #[test]
    fn set_unset_rewards() {
        let (mut dtmc, heads, tails) = coin();
        dtmc.new_reward_model("r")
            .unwrap()
            .set_state_reward(heads, Value::one());
        dtmc.set_unset_rewards("r", Value::zero()).unwrap();
        let rewards = dtmc.get_rewards("r").unwrap();
        assert_eq!(rewards.get_state_reward(heads), Some(&Value::one()));
        assert_eq!(rewards.get_state_reward(tails), Some(&Value::zero()));
        assert_eq!(rewards.state_rewards().count(), 3);
    }

    #[test]
    fn unassigned_variables() {
        let mut dtmc = Model::new_dtmc();
        let s = dtmc.new_state_with(["s"], [(String::from("x"), Val::Integer(1))]);
        let init = dtmc.get_initial_state().unwrap();
        assert_eq!(dtmc.unassigned_variables(), vec![(init, String::from("x"))]);
        dtmc.set_valuation_at_remaining_states(Val::Integer(0));
        assert!(dtmc.unassigned_variables().is_empty());
        assert_eq!(
            dtmc.get_valuations(s).unwrap().get("x"),
            Some(&Val::Integer(1))
        );
    }

    #[test]
    fn exit_rates() {
        let mut ctmc = Model::new_ctmc();
        let init = ctmc.get_initial_state().unwrap();
        let s = ctmc.new_state(["s"]);
        ctmc.set_probabilistic_choice(init, vec![(Value::from(2i64), s), (Value::from(3i64), init)])
            .unwrap();
        assert_eq!(ctmc.get_exit_rate(init), Some(Value::from(5i64)));
        ctmc.set_exit_rate(s, Value::from(7i64)).unwrap();
        assert_eq!(ctmc.get_exit_rate(s), Some(Value::from(7i64)));
        let mut dtmc = Model::new_dtmc();
        assert_eq!(
            dtmc.set_exit_rate(0, Value::one()),
            Err(ModelError::RatesNotSupported(ModelType::Dtmc))
        );
    }

    #[test]
    fn structural_equality_ignores_ids() {
        let (mut one, heads, _) = coin();
        one.add_self_loops();
        let mut other = one.clone();
        assert_eq!(one, other);
        other.remove_state(heads, false).unwrap();
        assert_ne!(one, other);
        one.remove_state(heads, true).unwrap();
        assert_eq!(one, other);
    }

    #[test]
    fn stamp_changes_on_mutation() {
        let (mut dtmc, heads, _) = coin();
        let stamp = dtmc.stamp();
        assert_ne!(dtmc.clone().stamp(), stamp);
        dtmc.remove_state(heads, false).unwrap();
        assert_ne!(dtmc.stamp(), stamp);
    }
}

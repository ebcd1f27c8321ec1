use super::{Action, ModelError, StateId};
use crate::Value;
use std::collections::{BTreeMap, HashMap};

/// A named reward structure over states and state-action pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardModel {
    name: String,
    state_rewards: BTreeMap<StateId, Value>,
    state_action_rewards: BTreeMap<(StateId, Action), Value>,
}

impl RewardModel {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            state_rewards: BTreeMap::new(),
            state_action_rewards: BTreeMap::new(),
        }
    }

    /// The name of the reward model.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the reward collected in a state.
    pub fn set_state_reward(&mut self, state: StateId, value: Value) {
        self.state_rewards.insert(state, value);
    }

    /// The reward collected in a state, if set.
    pub fn get_state_reward(&self, state: StateId) -> Option<&Value> {
        self.state_rewards.get(&state)
    }

    /// Sets the reward collected by taking an action in a state.
    pub fn set_state_action_reward(&mut self, state: StateId, action: Action, value: Value) {
        self.state_action_rewards.insert((state, action), value);
    }

    /// The reward collected by taking an action in a state, if set.
    pub fn get_state_action_reward(&self, state: StateId, action: Action) -> Option<&Value> {
        self.state_action_rewards.get(&(state, action))
    }

    /// Iterates over state rewards, ordered by state id.
    pub fn state_rewards(&self) -> impl Iterator<Item = (StateId, &Value)> {
        self.state_rewards.iter().map(|(s, v)| (*s, v))
    }

    /// Iterates over state-action rewards, ordered by state id.
    pub fn state_action_rewards(&self) -> impl Iterator<Item = ((StateId, Action), &Value)> {
        self.state_action_rewards.iter().map(|(k, v)| (*k, v))
    }

    /// Tells whether any state reward is set.
    pub fn has_state_rewards(&self) -> bool {
        !self.state_rewards.is_empty()
    }

    /// Tells whether any state-action reward is set.
    pub fn has_state_action_rewards(&self) -> bool {
        !self.state_action_rewards.is_empty()
    }

    /// Sets state-action rewards positionally,
    /// the `n`-th entry of `vector` going to the `n`-th pair of `pairs`.
    ///
    /// See [`super::Model::state_action_pairs`] for the canonical enumeration of pairs.
    pub fn set_from_rewards_vector(
        &mut self,
        pairs: &[(StateId, Action)],
        vector: Vec<Value>,
    ) -> Result<(), ModelError> {
        if pairs.len() != vector.len() {
            return Err(ModelError::RewardsVectorLength {
                expected: pairs.len(),
                found: vector.len(),
            });
        }
        self.state_action_rewards
            .extend(pairs.iter().copied().zip(vector));
        Ok(())
    }

    /// Collects the state-action rewards positionally, following the order of `pairs`.
    /// Unset rewards are `None`.
    pub fn get_rewards_vector(&self, pairs: &[(StateId, Action)]) -> Vec<Option<&Value>> {
        pairs
            .iter()
            .map(|pair| self.state_action_rewards.get(pair))
            .collect()
    }

    pub(crate) fn fill_states(&mut self, states: impl Iterator<Item = StateId>, default: &Value) {
        for state in states {
            self.state_rewards
                .entry(state)
                .or_insert_with(|| default.clone());
        }
    }

    pub(crate) fn fill_pairs(&mut self, pairs: &[(StateId, Action)], default: &Value) {
        for pair in pairs {
            self.state_action_rewards
                .entry(*pair)
                .or_insert_with(|| default.clone());
        }
    }

    pub(crate) fn retain_states(&mut self, keep: impl Fn(StateId) -> bool) {
        self.state_rewards.retain(|s, _| keep(*s));
        self.state_action_rewards.retain(|(s, _), _| keep(*s));
    }

    pub(crate) fn retain_pairs(&mut self, keep: impl Fn(StateId, Action) -> bool) {
        self.state_action_rewards.retain(|(s, a), _| keep(*s, *a));
    }

    pub(crate) fn remap(&mut self, map: &HashMap<StateId, StateId>) {
        self.state_rewards = std::mem::take(&mut self.state_rewards)
            .into_iter()
            .filter_map(|(s, v)| map.get(&s).map(|s| (*s, v)))
            .collect();
        self.state_action_rewards = std::mem::take(&mut self.state_action_rewards)
            .into_iter()
            .filter_map(|((s, a), v)| map.get(&s).map(|s| ((*s, a), v)))
            .collect();
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = (StateId, &mut Value)> {
        self.state_rewards
            .iter_mut()
            .map(|(s, v)| (*s, v))
            .chain(
                self.state_action_rewards
                    .iter_mut()
                    .map(|((s, _), v)| (*s, v)),
            )
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Value> {
        self.state_rewards
            .values()
            .chain(self.state_action_rewards.values())
    }
}

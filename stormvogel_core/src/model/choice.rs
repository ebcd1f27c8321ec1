use super::{Action, EMPTY_ACTION, StateId};
use crate::Value;
use std::collections::BTreeSet;

/// A probability- or rate-weighted list of successor states.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Branch {
    pub(crate) branch: Vec<(Value, StateId)>,
}

impl Branch {
    /// Creates a branch from (value, target) pairs.
    pub fn new(branch: Vec<(Value, StateId)>) -> Self {
        Self { branch }
    }

    /// Iterates over the (value, target) pairs, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &(Value, StateId)> {
        self.branch.iter()
    }

    /// The targets of the branch.
    pub fn targets(&self) -> impl Iterator<Item = StateId> + '_ {
        self.branch.iter().map(|(_, target)| *target)
    }

    /// The values of the branch.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.branch.iter().map(|(value, _)| value)
    }

    /// Number of (value, target) pairs.
    pub fn len(&self) -> usize {
        self.branch.len()
    }

    /// Tells whether the branch has no successors.
    pub fn is_empty(&self) -> bool {
        self.branch.is_empty()
    }

    /// Sum of the values, if they are all numeric.
    pub fn sum(&self) -> Option<Value> {
        Value::sum(self.values())
    }

    /// Rescales numeric values so that they sum to one.
    /// Does nothing for non-numeric branches and for branches summing to zero.
    pub(crate) fn normalize(&mut self) {
        if let Some(sum) = self.sum() {
            if sum.is_zero() {
                return;
            }
            for (value, _) in self.branch.iter_mut() {
                if let Some(normalized) = value.checked_div(&sum) {
                    *value = normalized;
                }
            }
        }
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut Value> {
        self.branch.iter_mut().map(|(value, _)| value)
    }

    pub(crate) fn targets_mut(&mut self) -> impl Iterator<Item = &mut StateId> {
        self.branch.iter_mut().map(|(_, target)| target)
    }
}

impl From<Vec<(Value, StateId)>> for Branch {
    fn from(value: Vec<(Value, StateId)>) -> Self {
        Self::new(value)
    }
}

/// All the action-labelled branches available from a state.
///
/// A choice is homogeneous: either its only action is [`EMPTY_ACTION`],
/// or none of its actions is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Choice {
    pub(crate) choice: Vec<(Action, Branch)>,
}

impl Choice {
    /// Creates a choice from (action, branch) pairs.
    pub fn new(choice: Vec<(Action, Branch)>) -> Self {
        Self { choice }
    }

    /// Creates a choice with a single branch under the empty action.
    pub fn from_branch(branch: Branch) -> Self {
        Self {
            choice: vec![(EMPTY_ACTION, branch)],
        }
    }

    /// Iterates over the (action, branch) pairs, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &(Action, Branch)> {
        self.choice.iter()
    }

    /// The available actions, in insertion order.
    pub fn actions(&self) -> impl Iterator<Item = Action> + '_ {
        self.choice.iter().map(|(action, _)| *action)
    }

    /// The branch associated to the given action.
    pub fn get(&self, action: Action) -> Option<&Branch> {
        self.choice
            .iter()
            .find(|(a, _)| *a == action)
            .map(|(_, branch)| branch)
    }

    /// Position of the action among the available ones.
    pub fn position(&self, action: Action) -> Option<usize> {
        self.choice.iter().position(|(a, _)| *a == action)
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.choice.len()
    }

    /// Tells whether no action is available.
    pub fn is_empty(&self) -> bool {
        self.choice.is_empty()
    }

    /// Tells whether the choice uses the empty action.
    pub fn has_empty_action(&self) -> bool {
        self.choice.iter().any(|(a, _)| *a == EMPTY_ACTION)
    }

    pub(crate) fn is_homogeneous(&self) -> bool {
        !self.has_empty_action() || self.choice.len() == 1
    }

    pub(crate) fn duplicate_action(&self) -> Option<Action> {
        let mut seen = BTreeSet::new();
        self.actions().find(|a| !seen.insert(*a))
    }

    /// All targets of all branches.
    pub fn successors(&self) -> BTreeSet<StateId> {
        self.choice
            .iter()
            .flat_map(|(_, branch)| branch.targets())
            .collect()
    }

    // Drops transitions to `state`, then branches left empty.
    // Returns the actions of the dropped branches.
    pub(crate) fn remove_target(&mut self, state: StateId) -> Vec<Action> {
        for (_, branch) in self.choice.iter_mut() {
            branch.branch.retain(|(_, target)| *target != state);
        }
        let dropped = self
            .choice
            .iter()
            .filter(|(_, branch)| branch.is_empty())
            .map(|(action, _)| *action)
            .collect();
        self.choice.retain(|(_, branch)| !branch.is_empty());
        dropped
    }

    pub(crate) fn branches_mut(&mut self) -> impl Iterator<Item = &mut Branch> {
        self.choice.iter_mut().map(|(_, branch)| branch)
    }
}

impl FromIterator<(Action, Branch)> for Choice {
    fn from_iter<T: IntoIterator<Item = (Action, Branch)>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

use crate::{Action, Model, ModelStamp, StateId};
use rand::Rng;
use std::collections::HashMap;
use thiserror::Error;

/// The error type for building [`Scheduler`]s.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    /// The state does not exist or is not scheduled.
    #[error("state {0} is not scheduled")]
    MissingState(StateId),
    /// The state has no choice, so it cannot be scheduled.
    #[error("state {0} has no choice")]
    NoChoice(StateId),
    /// The action is not available in the state.
    #[error("action {action:?} is not available in state {state}")]
    UnavailableAction {
        /// The state.
        state: StateId,
        /// The scheduled action.
        action: Action,
    },
    /// The choice index is out of range for the state.
    #[error("state {state} has no choice with index {index}")]
    ChoiceIndex {
        /// The state.
        state: StateId,
        /// The out-of-range index.
        index: usize,
    },
    /// The number of scheduled choices differs from the number of states.
    #[error("expected one choice per state ({expected}), found {found}")]
    Length {
        /// Number of states.
        expected: usize,
        /// Number of scheduled choices.
        found: usize,
    },
}

/// A memoryless deterministic scheduler, selecting one action per state.
///
/// The scheduler is tied to the revision of the [`Model`] it was built for,
/// see [`Scheduler::is_valid_for`].
#[derive(Debug, Clone, PartialEq)]
pub struct Scheduler {
    stamp: ModelStamp,
    taken_actions: HashMap<StateId, Action>,
}

impl Scheduler {
    /// Creates a scheduler from the action taken in each state.
    ///
    /// Fails if some action is not available in its state.
    pub fn new(
        model: &Model,
        taken_actions: HashMap<StateId, Action>,
    ) -> Result<Self, SchedulerError> {
        for (state, action) in &taken_actions {
            model
                .get_state(*state)
                .ok_or(SchedulerError::MissingState(*state))?;
            let choice = model
                .get_choice(*state)
                .ok_or(SchedulerError::NoChoice(*state))?;
            if choice.get(*action).is_none() {
                return Err(SchedulerError::UnavailableAction {
                    state: *state,
                    action: *action,
                });
            }
        }
        Ok(Self {
            stamp: model.stamp(),
            taken_actions,
        })
    }

    /// Creates a scheduler from the position of the chosen action in the choice of each state,
    /// with states in enumeration order.
    pub fn from_indices(model: &Model, indices: &[usize]) -> Result<Self, SchedulerError> {
        if indices.len() != model.nr_states() {
            return Err(SchedulerError::Length {
                expected: model.nr_states(),
                found: indices.len(),
            });
        }
        let taken_actions = model
            .state_ids()
            .iter()
            .zip(indices)
            .map(|(state, index)| {
                model
                    .get_choice(*state)
                    .ok_or(SchedulerError::NoChoice(*state))?
                    .actions()
                    .nth(*index)
                    .map(|action| (*state, action))
                    .ok_or(SchedulerError::ChoiceIndex {
                        state: *state,
                        index: *index,
                    })
            })
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(Self {
            stamp: model.stamp(),
            taken_actions,
        })
    }

    /// Creates a scheduler choosing an action uniformly at random in every state with a choice.
    pub fn random<R: Rng>(model: &Model, rng: &mut R) -> Self {
        let taken_actions = model
            .state_ids()
            .iter()
            .filter_map(|state| {
                let choice = model.get_choice(*state)?;
                if choice.is_empty() {
                    None
                } else {
                    let index = rng.random_range(0..choice.len());
                    choice.actions().nth(index).map(|action| (*state, action))
                }
            })
            .collect();
        Self {
            stamp: model.stamp(),
            taken_actions,
        }
    }

    /// The action taken in the given state.
    ///
    /// Fails if the state is not scheduled.
    pub fn get_choice_of_state(&self, state: StateId) -> Result<Action, SchedulerError> {
        self.taken_actions
            .get(&state)
            .copied()
            .ok_or(SchedulerError::MissingState(state))
    }

    /// Iterates over the scheduled (state, action) pairs, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (StateId, Action)> + '_ {
        self.taken_actions.iter().map(|(s, a)| (*s, *a))
    }

    /// The stamp of the model the scheduler was built for.
    pub fn stamp(&self) -> ModelStamp {
        self.stamp
    }

    /// Tells whether the model has not been structurally modified since the scheduler was built.
    pub fn is_valid_for(&self, model: &Model) -> bool {
        self.stamp == model.stamp()
    }
}

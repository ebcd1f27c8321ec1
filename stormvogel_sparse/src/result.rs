//! Model checking through an external engine, and its results.

use crate::{
    MappingError,
    mapping::{from_engine, lower, to_engine},
    sparse::{EngineValue, SparseModel},
};
use log::info;
use std::time::Instant;
use stormvogel_core::{Model, ModelStamp, ModelType, Scheduler, SchedulerError, StateId, Value};
use thiserror::Error;

/// What an engine returns for a property.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutput {
    /// One value per state, in row group order.
    pub values: Vec<EngineValue>,
    /// The index of the chosen row within each row group, if the property induces a scheduler.
    pub scheduler: Option<Vec<usize>>,
}

/// An external model-checking engine.
///
/// The property is passed through unchanged: its syntax belongs to the engine.
pub trait Checker {
    /// The error of the engine.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Checks a property on a sparse model.
    fn check(&self, model: &SparseModel, property: &str) -> Result<CheckOutput, Self::Error>;
}

/// The error type for model checking and its results.
#[derive(Debug, Error)]
pub enum ResultError {
    /// The model could not be converted.
    #[error("conversion failed")]
    Mapping(#[from] MappingError),
    /// The engine failed.
    #[error("engine failed to check '{property}'")]
    Checker {
        /// The checked property.
        property: String,
        /// The error of the engine.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The engine returned the wrong number of values.
    #[error("engine returned {found} values for {expected} states")]
    Length {
        /// Number of states.
        expected: usize,
        /// Number of values.
        found: usize,
    },
    /// The engine returned an invalid scheduler.
    #[error("invalid scheduler")]
    Scheduler(#[from] SchedulerError),
    /// Induced DTMCs exist for MDPs only.
    #[error("cannot induce a DTMC from a {0}")]
    NotMdp(ModelType),
    /// The result carries no scheduler.
    #[error("the result has no scheduler")]
    NoScheduler,
}

/// Converts the model, checks the property with the engine, and maps the outcome back to the model.
pub fn model_checking<C: Checker>(
    model: &Model,
    property: &str,
    checker: &C,
) -> Result<CheckResult, ResultError> {
    let sparse = to_engine(model)?;
    let start = Instant::now();
    info!(target: "mapping", "checking '{property}'");
    let output = checker
        .check(&sparse, property)
        .map_err(|err| ResultError::Checker {
            property: property.to_owned(),
            source: Box::new(err),
        })?;
    info!(target: "mapping", "checked '{property}' in {:?}", start.elapsed());
    CheckResult::new(model, sparse, output)
}

/// The outcome of checking a property on a [`Model`]:
/// one value per state and, possibly, a scheduler.
///
/// A result refers to the revision of the model it was computed for,
/// see [`CheckResult::is_valid_for`].
#[derive(Debug, Clone)]
pub struct CheckResult {
    stamp: ModelStamp,
    states: Vec<StateId>,
    values: Vec<Value>,
    scheduler: Option<Scheduler>,
    choices: Option<Vec<usize>>,
    sparse: SparseModel,
}

impl CheckResult {
    /// Maps an engine output on the sparse form of `model` back to its states.
    pub fn new(
        model: &Model,
        sparse: SparseModel,
        output: CheckOutput,
    ) -> Result<Self, ResultError> {
        if output.values.len() != model.nr_states() {
            return Err(ResultError::Length {
                expected: model.nr_states(),
                found: output.values.len(),
            });
        }
        let values = output
            .values
            .iter()
            .map(|value| lower(value, &sparse.parameters))
            .collect::<Result<Vec<_>, _>>()?;
        let scheduler = output
            .scheduler
            .as_deref()
            .map(|choices| Scheduler::from_indices(model, choices))
            .transpose()?;
        Ok(Self {
            stamp: model.stamp(),
            states: model.state_ids().to_vec(),
            values,
            scheduler,
            choices: output.scheduler,
            sparse,
        })
    }

    /// The value computed for a state.
    pub fn get_result_of_state(&self, state: StateId) -> Option<&Value> {
        self.states
            .iter()
            .position(|s| *s == state)
            .map(|pos| &self.values[pos])
    }

    /// The `(state, value)` pairs, in enumeration order.
    pub fn values(&self) -> impl Iterator<Item = (StateId, &Value)> {
        self.states.iter().copied().zip(&self.values)
    }

    /// The scheduler, if the property induced one.
    pub fn scheduler(&self) -> Option<&Scheduler> {
        self.scheduler.as_ref()
    }

    /// The largest numeric value.
    pub fn maximum_result(&self) -> Option<f64> {
        self.values
            .iter()
            .filter_map(Value::as_f64)
            .max_by(f64::total_cmp)
    }

    /// Tells whether the model has not been structurally modified since the result was computed.
    pub fn is_valid_for(&self, model: &Model) -> bool {
        self.stamp == model.stamp()
    }

    /// The DTMC induced by applying the scheduler to the checked MDP.
    ///
    /// States keep their enumeration position, so the state of the DTMC with id `i`
    /// corresponds to the `i`-th state of the MDP.
    pub fn generate_induced_dtmc(&self) -> Result<Model, ResultError> {
        if self.sparse.model_type != ModelType::Mdp {
            return Err(ResultError::NotMdp(self.sparse.model_type));
        }
        let choices = self.choices.as_ref().ok_or(ResultError::NoScheduler)?;
        let dtmc = self.sparse.apply_scheduler(choices)?;
        Ok(from_engine(&dtmc)?)
    }
}

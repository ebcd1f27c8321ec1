use crate::{
    MappingError,
    symbolic::{SymbolicRationalFunction, VariablePool},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    ops::Range,
};
use stormvogel_core::{ModelType, Val};

#[derive(Serialize, Deserialize)]
#[serde(remote = "ModelType", rename_all = "lowercase")]
enum ModelTypeDef {
    Dtmc,
    Mdp,
    Ctmc,
    Pomdp,
    Ma,
}

/// The kinds of values of a sparse model, from the narrowest to the widest.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Exact rational numbers.
    #[default]
    Exact,
    /// Floating-point numbers.
    Double,
    /// Intervals of floating-point numbers.
    Interval,
    /// Rational functions over the model's parameters.
    Parametric,
}

/// A value of a sparse model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineValue {
    /// Exact rational number.
    Exact {
        /// Numerator.
        numerator: i64,
        /// Denominator.
        denominator: i64,
    },
    /// Floating-point number.
    Double(f64),
    /// Interval of floating-point numbers.
    Interval {
        /// Lower bound.
        lower: f64,
        /// Upper bound.
        upper: f64,
    },
    /// Rational function over the model's parameters.
    Parametric(SymbolicRationalFunction),
}

impl EngineValue {
    /// The kind of the value.
    pub fn value_type(&self) -> ValueType {
        match self {
            EngineValue::Exact { .. } => ValueType::Exact,
            EngineValue::Double(_) => ValueType::Double,
            EngineValue::Interval { .. } => ValueType::Interval,
            EngineValue::Parametric(_) => ValueType::Parametric,
        }
    }

    /// The value as a float, for exact and floating-point values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            EngineValue::Exact {
                numerator,
                denominator,
            } if *denominator != 0 => Some(*numerator as f64 / *denominator as f64),
            EngineValue::Double(x) => Some(*x),
            _ => None,
        }
    }

    /// The zero value of the given kind.
    pub fn zero(value_type: ValueType) -> Self {
        match value_type {
            ValueType::Exact => EngineValue::Exact {
                numerator: 0,
                denominator: 1,
            },
            ValueType::Double => EngineValue::Double(0.),
            ValueType::Interval => EngineValue::Interval {
                lower: 0.,
                upper: 0.,
            },
            ValueType::Parametric => {
                EngineValue::Parametric(SymbolicRationalFunction::constant(0.))
            }
        }
    }
}

/// A value of a state variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarValue {
    /// Boolean value.
    Boolean(bool),
    /// Integer value.
    Integer(i64),
    /// Floating-point value.
    Float(f64),
}

impl From<Val> for VarValue {
    fn from(value: Val) -> Self {
        match value {
            Val::Boolean(b) => VarValue::Boolean(b),
            Val::Integer(i) => VarValue::Integer(i),
            Val::Float(f) => VarValue::Float(f),
        }
    }
}

impl From<VarValue> for Val {
    fn from(value: VarValue) -> Self {
        match value {
            VarValue::Boolean(b) => Val::Boolean(b),
            VarValue::Integer(i) => Val::Integer(i),
            VarValue::Float(f) => Val::Float(f),
        }
    }
}

/// An entry of a [`SparseMatrix`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixEntry {
    /// The column of the entry, i.e., the target state.
    pub column: usize,
    /// The value of the entry.
    pub value: EngineValue,
}

/// A sparse matrix whose rows are partitioned into consecutive row groups,
/// one group per state and one row per choice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseMatrix {
    // Start of each row group, followed by the number of rows
    row_group_indices: Vec<usize>,
    // Start of each row in `entries`, followed by the number of entries
    row_indices: Vec<usize>,
    entries: Vec<MatrixEntry>,
    columns: usize,
}

impl SparseMatrix {
    /// Number of rows.
    pub fn nr_rows(&self) -> usize {
        self.row_indices.len().saturating_sub(1)
    }

    /// Number of row groups.
    pub fn nr_row_groups(&self) -> usize {
        self.row_group_indices.len().saturating_sub(1)
    }

    /// Number of columns.
    pub fn nr_columns(&self) -> usize {
        self.columns
    }

    /// Number of entries.
    pub fn nr_entries(&self) -> usize {
        self.entries.len()
    }

    /// The rows of the given row group.
    pub fn row_group(&self, group: usize) -> Range<usize> {
        self.row_group_indices[group]..self.row_group_indices[group + 1]
    }

    /// The entries of the given row, ordered by column.
    pub fn row(&self, row: usize) -> &[MatrixEntry] {
        &self.entries[self.row_indices[row]..self.row_indices[row + 1]]
    }

    /// Iterates over all entries.
    pub fn entries(&self) -> impl Iterator<Item = &MatrixEntry> {
        self.entries.iter()
    }

    /// Tells whether every row group has exactly one row.
    pub fn has_trivial_row_grouping(&self) -> bool {
        self.nr_rows() == self.nr_row_groups()
    }

    // Checks that indices are consistent, e.g., after deserialization.
    pub(crate) fn validate(&self) -> Result<(), MappingError> {
        let monotone = |indices: &[usize]| indices.windows(2).all(|w| w[0] <= w[1]);
        if self.row_indices.first().is_some_and(|start| *start != 0)
            || self.row_indices.last().copied().unwrap_or_default() != self.entries.len()
            || !monotone(&self.row_indices)
        {
            return Err(MappingError::Malformed("row indices"));
        }
        if self.row_group_indices.first().is_some_and(|start| *start != 0)
            || self.row_group_indices.last().copied().unwrap_or_default() != self.nr_rows()
            || !monotone(&self.row_group_indices)
        {
            return Err(MappingError::Malformed("row group indices"));
        }
        if let Some(entry) = self.entries.iter().find(|e| e.column >= self.columns) {
            return Err(MappingError::Column(entry.column));
        }
        Ok(())
    }
}

/// Builds a [`SparseMatrix`] row by row.
#[derive(Debug, Clone, Default)]
pub struct SparseMatrixBuilder {
    row_group_indices: Vec<usize>,
    rows: Vec<Vec<MatrixEntry>>,
    columns: usize,
}

impl SparseMatrixBuilder {
    /// Creates a builder for a matrix with the given number of columns.
    pub fn new(columns: usize) -> Self {
        Self {
            columns,
            ..Default::default()
        }
    }

    /// Starts a new row group: subsequent rows belong to it.
    pub fn new_row_group(&mut self) {
        self.row_group_indices.push(self.rows.len());
    }

    /// Adds a row with the given `(column, value)` entries.
    ///
    /// Fails if a column is out of range.
    pub fn add_row(&mut self, entries: Vec<(usize, EngineValue)>) -> Result<(), MappingError> {
        if let Some((column, _)) = entries.iter().find(|(column, _)| *column >= self.columns) {
            return Err(MappingError::Column(*column));
        }
        self.rows.push(
            entries
                .into_iter()
                .map(|(column, value)| MatrixEntry { column, value })
                .collect(),
        );
        Ok(())
    }

    /// Builds the matrix, sorting the entries of each row by column.
    ///
    /// If no row group has been started, every row is its own group.
    pub fn build(self) -> SparseMatrix {
        let mut row_group_indices = if self.row_group_indices.is_empty() {
            (0..self.rows.len()).collect()
        } else {
            self.row_group_indices
        };
        row_group_indices.push(self.rows.len());
        let mut row_indices = Vec::with_capacity(self.rows.len() + 1);
        let mut entries = Vec::new();
        for mut row in self.rows {
            row_indices.push(entries.len());
            row.sort_by_key(|entry| entry.column);
            entries.extend(row);
        }
        row_indices.push(entries.len());
        SparseMatrix {
            row_group_indices,
            row_indices,
            entries,
            columns: self.columns,
        }
    }
}

/// A reward model of a sparse model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseRewardModel {
    /// One reward per state, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_rewards: Option<Vec<EngineValue>>,
    /// One reward per row (state-action pair), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_action_rewards: Option<Vec<EngineValue>>,
}

/// The sparse, row-indexed representation of a model,
/// as exchanged with model-checking engines.
///
/// States are identified by their row group (or, equivalently, column) index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseModel {
    /// The kind of the model.
    #[serde(with = "ModelTypeDef")]
    pub model_type: ModelType,
    /// The kind of all values of the model.
    pub value_type: ValueType,
    /// The transition matrix, with one row group per state.
    pub transition_matrix: SparseMatrix,
    /// The states carrying each label.
    pub state_labeling: BTreeMap<String, BTreeSet<usize>>,
    /// Reward models by name.
    #[serde(default)]
    pub reward_models: BTreeMap<String, SparseRewardModel>,
    /// The labels of each row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_labeling: Option<Vec<BTreeSet<String>>>,
    /// The exit rate of each state (CTMCs and MAs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_rates: Option<Vec<EngineValue>>,
    /// Which states are markovian (MAs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markovian_states: Option<Vec<bool>>,
    /// The observation of each state (POMDPs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observations: Option<Vec<u32>>,
    /// The variable valuation of each state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_valuations: Option<Vec<BTreeMap<String, VarValue>>>,
    /// The parameters of parametric values.
    #[serde(default, skip_serializing_if = "VariablePool::is_empty")]
    pub parameters: VariablePool,
}

impl SparseModel {
    /// Number of states.
    pub fn nr_states(&self) -> usize {
        self.transition_matrix.nr_row_groups()
    }

    /// Number of choices, i.e., of rows.
    pub fn nr_choices(&self) -> usize {
        self.transition_matrix.nr_rows()
    }

    /// Number of transitions, i.e., of matrix entries.
    pub fn nr_transitions(&self) -> usize {
        self.transition_matrix.nr_entries()
    }

    /// The states carrying the given label.
    pub fn states_with_label(&self, label: &str) -> Vec<usize> {
        self.state_labeling
            .get(label)
            .map(|states| states.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Checks that all vectors agree with the dimensions of the transition matrix.
    pub fn validate(&self) -> Result<(), MappingError> {
        self.transition_matrix.validate()?;
        let states = self.nr_states();
        let rows = self.nr_choices();
        if self.transition_matrix.nr_columns() != states {
            return Err(MappingError::Dimension {
                what: "transition matrix columns",
                expected: states,
                found: self.transition_matrix.nr_columns(),
            });
        }
        if let Some(state) = self.state_labeling.values().flatten().find(|s| **s >= states) {
            return Err(MappingError::Column(*state));
        }
        let check = |what, expected, found: Option<usize>| match found {
            Some(found) if found != expected => Err(MappingError::Dimension {
                what,
                expected,
                found,
            }),
            _ => Ok(()),
        };
        for rewards in self.reward_models.values() {
            check("state rewards", states, rewards.state_rewards.as_ref().map(Vec::len))?;
            check(
                "state-action rewards",
                rows,
                rewards.state_action_rewards.as_ref().map(Vec::len),
            )?;
        }
        check("choice labeling", rows, self.choice_labeling.as_ref().map(Vec::len))?;
        check("exit rates", states, self.exit_rates.as_ref().map(Vec::len))?;
        check("markovian states", states, self.markovian_states.as_ref().map(Vec::len))?;
        check("observations", states, self.observations.as_ref().map(Vec::len))?;
        check("state valuations", states, self.state_valuations.as_ref().map(Vec::len))?;
        Ok(())
    }

    /// Applies a memoryless deterministic scheduler,
    /// given as the index of the chosen row within each row group,
    /// and returns the induced DTMC.
    ///
    /// Only MDPs and POMDPs can be resolved this way.
    pub fn apply_scheduler(&self, choices: &[usize]) -> Result<SparseModel, MappingError> {
        self.validate()?;
        if !matches!(self.model_type, ModelType::Mdp | ModelType::Pomdp) {
            return Err(MappingError::UnsupportedModelType(self.model_type));
        }
        if choices.len() != self.nr_states() {
            return Err(MappingError::Dimension {
                what: "scheduler",
                expected: self.nr_states(),
                found: choices.len(),
            });
        }
        let rows = choices
            .iter()
            .enumerate()
            .map(|(state, choice)| {
                let group = self.transition_matrix.row_group(state);
                group
                    .start
                    .checked_add(*choice)
                    .filter(|row| group.contains(row))
                    .ok_or(MappingError::ChoiceIndex {
                        state,
                        index: *choice,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut builder = SparseMatrixBuilder::new(self.nr_states());
        for row in &rows {
            builder.new_row_group();
            builder.add_row(
                self.transition_matrix
                    .row(*row)
                    .iter()
                    .map(|entry| (entry.column, entry.value.clone()))
                    .collect(),
            )?;
        }
        let reward_models = self
            .reward_models
            .iter()
            .map(|(name, rewards)| {
                let state_action_rewards = rewards
                    .state_action_rewards
                    .as_ref()
                    .map(|values| rows.iter().map(|row| values[*row].clone()).collect());
                (
                    name.clone(),
                    SparseRewardModel {
                        state_rewards: rewards.state_rewards.clone(),
                        state_action_rewards,
                    },
                )
            })
            .collect();
        Ok(SparseModel {
            model_type: ModelType::Dtmc,
            value_type: self.value_type,
            transition_matrix: builder.build(),
            state_labeling: self.state_labeling.clone(),
            reward_models,
            choice_labeling: None,
            exit_rates: None,
            markovian_states: None,
            observations: None,
            state_valuations: self.state_valuations.clone(),
            parameters: self.parameters.clone(),
        })
    }
}

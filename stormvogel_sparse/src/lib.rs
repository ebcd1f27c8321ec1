//! The sparse, row-indexed form of stormvogel models exchanged with model-checking engines,
//! and the conversions between it and [`stormvogel_core::Model`].
//!
//! ```
//! # use stormvogel_core::{Model, Value};
//! # use stormvogel_sparse::{from_engine, to_engine};
//! let mut dtmc = Model::new_dtmc();
//! let init = dtmc.get_initial_state().expect("initial state");
//! let done = dtmc.new_state(["done"]);
//! dtmc.set_probabilistic_choice(init, vec![(Value::one(), done)]).expect("states exist");
//! dtmc.add_self_loops();
//! let sparse = to_engine(&dtmc).expect("complete model");
//! assert_eq!(sparse.states_with_label("done"), vec![1]);
//! assert_eq!(from_engine(&sparse).expect("valid sparse model"), dtmc);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod mapping;
mod result;
mod sparse;
pub mod symbolic;

use anyhow::Context;
use log::info;
pub use mapping::{MappingError, from_engine, to_engine};
pub use result::{CheckOutput, CheckResult, Checker, ResultError, model_checking};
pub use sparse::{
    EngineValue, MatrixEntry, SparseMatrix, SparseMatrixBuilder, SparseModel, SparseRewardModel,
    ValueType, VarValue,
};
use std::{
    fs::File,
    io::{BufWriter, Read},
    path::Path,
};
use stormvogel_core::Model;

/// Loads a sparse model from a JSON file, checking its dimensions.
pub fn load(path: &Path) -> anyhow::Result<SparseModel> {
    let time = std::time::Instant::now();
    info!(target: "parser", "parsing sparse model file '{}'", path.display());
    let mut file =
        File::open(path).with_context(|| format!("failed to open file '{}'", path.display()))?;
    let size = file.metadata().map(|data| data.len()).unwrap_or_default();
    let mut buf = String::with_capacity(size as usize);
    file.read_to_string(&mut buf)
        .with_context(|| format!("failed to read file '{}' to string", path.display()))?;
    let model: SparseModel = serde_json::from_str(&buf)
        .with_context(|| format!("failed to parse sparse model in '{}'", path.display()))?;
    model
        .validate()
        .with_context(|| format!("inconsistent sparse model in '{}'", path.display()))?;
    info!(target: "parser", "parsing complete in {:?}", time.elapsed());
    Ok(model)
}

/// Loads a sparse model from a JSON file and converts it to a [`Model`].
pub fn load_model(path: &Path) -> anyhow::Result<Model> {
    let sparse = load(path)?;
    from_engine(&sparse)
        .with_context(|| format!("failed to convert sparse model in '{}'", path.display()))
}

/// Saves a sparse model to a JSON file.
pub fn save(path: &Path, model: &SparseModel) -> anyhow::Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create file '{}'", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), model)
        .with_context(|| format!("failed to write sparse model to '{}'", path.display()))?;
    info!(target: "parser", "saved sparse model to '{}'", path.display());
    Ok(())
}

//! # stormvogel
//!
//! Command line front end for stormvogel Markov models
//! (DTMCs, MDPs, CTMCs, POMDPs and Markov automata)
//! stored in the sparse JSON format exchanged with model-checking engines.
//!
//! Models are built programmatically with [`stormvogel_core`],
//! converted to and from the sparse format with [`stormvogel_sparse`],
//! and can then be validated, inspected, repaired and simulated from the command line.

mod progress;
mod report;
mod simulate;
mod tracer;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;
use report::InfoReport;
use simulate::SimulateArgs;
use std::path::PathBuf;

/// stormvogel's available commands.
#[deny(missing_docs)]
#[derive(Subcommand)]
enum Commands {
    /// Validate the model: check that the file parses,
    /// that its dimensions agree and that it converts to a model.
    Validate,
    /// Print a summary of the model.
    Info {
        /// Print JSON-serialized summary.
        ///
        /// By default, a user-friendly summary is printed.
        /// This flag has the summary printed in JSON format instead.
        #[arg(long)]
        json: bool,
    },
    /// Complete the model so that it can be checked, and save it.
    ///
    /// States without choices get a self loop.
    ///
    /// EXAMPLE: stormvogel PATH/TO/MODEL repair --output PATH/TO/REPAIRED --normalize
    #[clap(verbatim_doc_comment)]
    Repair {
        /// Path where the repaired model is saved.
        #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
        output: PathBuf,
        /// Rescale numeric branches so that they sum to one.
        ///
        /// Only applies to models whose branch values are probabilities.
        #[arg(long)]
        normalize: bool,
    },
    /// Simulate random paths and save them to file in csv format.
    ///
    /// Nondeterminism is resolved uniformly at random.
    Simulate(SimulateArgs),
}

/// Inspect, repair and simulate Markov models.
///
/// Models are read from sparse JSON files,
/// as exchanged with probabilistic model-checking engines.
#[derive(Parser)]
#[deny(missing_docs)]
#[command(version, about, long_about)]
pub struct Cli {
    /// Path of the model's sparse JSON file.
    #[arg(value_hint = clap::ValueHint::FilePath)]
    model: PathBuf,
    /// Verbose output
    #[command(flatten)]
    pub verbosity: clap_verbosity_flag::Verbosity,
    /// Actions to execute on the model.
    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Runs the selected command.
    pub fn run(self) -> anyhow::Result<()> {
        let name = self
            .model
            .file_stem()
            .and_then(|os_str| os_str.to_str())
            .unwrap_or("model")
            .to_owned();

        match self.command {
            Commands::Validate => {
                eprint!("Processing model, please wait...");
                let _model = stormvogel_sparse::load_model(&self.model)?;
                // At this point the model has been validated
                eprintln!(" done");
                println!("model '{name}' successfully validated");
            }
            Commands::Info { json } => {
                let sparse = stormvogel_sparse::load(&self.model)?;
                let model = stormvogel_sparse::from_engine(&sparse).with_context(|| {
                    format!("failed to convert sparse model '{}'", self.model.display())
                })?;
                InfoReport::new(name, &sparse, &model).print(json);
            }
            Commands::Repair { output, normalize } => {
                let mut model = stormvogel_sparse::load_model(&self.model)?;
                model.add_self_loops();
                if normalize {
                    model.normalize().context("failed to normalize model")?;
                }
                info!("{}", model.summary());
                let sparse = stormvogel_sparse::to_engine(&model)
                    .context("repaired model cannot be converted")?;
                stormvogel_sparse::save(&output, &sparse)?;
                println!("model '{name}' repaired and saved to '{}'", output.display());
            }
            Commands::Simulate(args) => {
                eprint!("Processing model, please wait...");
                let model = stormvogel_sparse::load_model(&self.model)?;
                eprintln!(" done");
                eprint!("Simulation in progress...");
                args.simulate(&model, &name)?;
                eprintln!(" done");
                println!(
                    "{} paths of model '{name}' saved to '{}'",
                    args.runs,
                    args.output.display()
                );
            }
        }
        Ok(())
    }
}

// From Clap tutorial <https://docs.rs/clap/latest/clap/_derive/_tutorial/index.html#testing>
#[test]
fn verify_cli() {
    use clap::CommandFactory;
    Cli::command().debug_assert();
}

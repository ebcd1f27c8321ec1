use crate::{
    progress::{Bar, Progress},
    tracer::PathPrinter,
};
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use stormvogel_core::{
    Model,
    simulator::{Tracer, par_simulate_paths, simulate_paths},
};

/// Simulate random paths and save them to file in csv format.
#[derive(Debug, Clone, Parser)]
#[deny(missing_docs)]
pub(crate) struct SimulateArgs {
    /// Number of steps of each path.
    #[arg(short, long, default_value_t = 100)]
    pub(crate) steps: usize,
    /// Number of paths to save.
    #[arg(short, long, default_value_t = 1)]
    pub(crate) runs: usize,
    /// Seed of the random number generator.
    ///
    /// Path number `n` is simulated with seed `seed + n`,
    /// so runs are reproducible regardless of threading.
    #[arg(long, default_value_t = 0)]
    pub(crate) seed: u64,
    /// Run the simulation on a single thread.
    ///
    /// By default, paths are simulated on multiple threads.
    #[arg(long)]
    pub(crate) single_thread: bool,
    /// Do not compress the saved paths.
    #[arg(long)]
    pub(crate) uncompressed: bool,
    /// Print a progress bar during simulation.
    #[arg(long, value_enum)]
    pub(crate) progress: Option<Bar>,
    /// Directory where paths are saved.
    #[arg(short, long, default_value = ".", value_hint = clap::ValueHint::DirPath)]
    pub(crate) output: PathBuf,
}

impl SimulateArgs {
    pub(crate) fn simulate(&self, model: &Model, model_name: &str) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.output).with_context(|| {
            format!("failed to create directory '{}'", self.output.display())
        })?;
        let printer = PathPrinter::new(self.output.clone(), !self.uncompressed);
        if let Some(bar) = self.progress {
            let bar = bar.progress_bar(self.runs as u64, model_name);
            self.run(model, Progress::new(printer, bar.clone()))?;
            bar.finish_and_clear();
        } else {
            self.run(model, printer)?;
        }
        Ok(())
    }

    fn run<T: Tracer + Clone + Sync>(&self, model: &Model, tracer: T) -> anyhow::Result<()> {
        if self.single_thread {
            simulate_paths(model, self.steps, self.runs, None, self.seed, tracer)
        } else {
            par_simulate_paths(model, self.steps, self.runs, None, self.seed, tracer)
        }
        .context("simulation failed")
    }
}

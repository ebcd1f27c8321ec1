use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use stormvogel_core::{Action, Model, StateId, simulator::Tracer};

/// Simulation progress bar
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub(crate) enum Bar {
    /// Fancy Unicode progress bars
    #[default]
    Unicode,
    /// Basic ASCII progress bars
    Ascii,
}

impl Bar {
    pub(crate) fn progress_bar(&self, runs: u64, model_name: &str) -> ProgressBar {
        const FINE_BAR: &str = "█▉▊▋▌▍▎▏  ";
        const ASCII_BAR: &str = "#--";

        let style = if let Bar::Ascii = self {
            ProgressStyle::with_template("{msg} {bar:50} {percent:>3}% ({pos}/{len}) ETA: {eta}")
                .expect("valid template")
                .progress_chars(ASCII_BAR)
        } else {
            ProgressStyle::with_template(
                "{msg} {bar:50.white.on_black} {percent:>3}% ({pos}/{len}) ETA: {eta}",
            )
            .expect("valid template")
            .progress_chars(FINE_BAR)
        };
        ProgressBar::new(runs)
            .with_style(style)
            .with_message(format!("simulating {model_name}"))
    }
}

/// Advances a progress bar every time a path is completed.
#[derive(Clone)]
pub(crate) struct Progress<T> {
    inner: T,
    bar: ProgressBar,
}

impl<T> Progress<T> {
    pub(crate) fn new(inner: T, bar: ProgressBar) -> Self {
        Self { inner, bar }
    }
}

impl<T: Tracer> Tracer for Progress<T> {
    fn init(&mut self, model: &Model, initial: StateId) {
        self.inner.init(model, initial);
    }

    fn trace(&mut self, model: &Model, step: usize, action: Action, state: StateId) {
        self.inner.trace(model, step, action, state);
    }

    fn finalize(self) {
        self.inner.finalize();
        self.bar.inc(1);
    }
}

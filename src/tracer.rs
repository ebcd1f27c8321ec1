use csv::Writer;
use flate2::{Compression, write::GzEncoder};
use log::error;
use std::{
    fs::File,
    io::Write,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use stormvogel_core::{Action, EMPTY_ACTION, Model, StateId, simulator::Tracer};

const HEADER: [&str; 4] = ["step", "action", "state", "labels"];

enum Sink {
    Plain(Writer<File>),
    Compressed(Writer<GzEncoder<File>>),
}

impl Sink {
    fn write_record(&mut self, record: [&str; 4]) -> csv::Result<()> {
        match self {
            Sink::Plain(writer) => writer.write_record(record),
            Sink::Compressed(writer) => writer.write_record(record),
        }
    }

    fn close(self) -> std::io::Result<()> {
        match self {
            Sink::Plain(mut writer) => writer.flush(),
            Sink::Compressed(writer) => writer
                .into_inner()
                .map_err(|err| err.into_error())?
                .finish()?
                .flush(),
        }
    }
}

/// Writes each simulated path to its own CSV file,
/// gzip-compressed unless asked otherwise.
///
/// Clones share the path counter, so every path gets a distinct file.
pub(crate) struct PathPrinter {
    index: Arc<AtomicUsize>,
    dir: PathBuf,
    compressed: bool,
    sink: Option<Sink>,
}

impl Clone for PathPrinter {
    fn clone(&self) -> Self {
        Self {
            index: Arc::clone(&self.index),
            dir: self.dir.clone(),
            compressed: self.compressed,
            sink: None,
        }
    }
}

impl PathPrinter {
    pub(crate) fn new(dir: PathBuf, compressed: bool) -> Self {
        Self {
            index: Arc::new(AtomicUsize::new(0)),
            dir,
            compressed,
            sink: None,
        }
    }

    fn open(&self) -> std::io::Result<Sink> {
        let index = self.index.fetch_add(1, Ordering::Relaxed);
        let sink = if self.compressed {
            let file = File::create(self.dir.join(format!("{index}.csv.gz")))?;
            Sink::Compressed(Writer::from_writer(GzEncoder::new(
                file,
                Compression::default(),
            )))
        } else {
            let file = File::create(self.dir.join(format!("{index}.csv")))?;
            Sink::Plain(Writer::from_writer(file))
        };
        Ok(sink)
    }

    fn write(&mut self, model: &Model, step: usize, action: Action, state: StateId) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let action = if action == EMPTY_ACTION {
            String::new()
        } else {
            model
                .action_labels(action)
                .map(|labels| labels.iter().cloned().collect::<Vec<_>>().join("|"))
                .unwrap_or_default()
        };
        let labels = model
            .get_labels(state)
            .map(|labels| labels.iter().cloned().collect::<Vec<_>>().join("|"))
            .unwrap_or_default();
        if let Err(err) = sink.write_record([
            &step.to_string(),
            &action,
            &state.to_string(),
            &labels,
        ]) {
            error!("failed to write path step {step}: {err}");
        }
    }
}

impl Tracer for PathPrinter {
    fn init(&mut self, model: &Model, initial: StateId) {
        match self.open() {
            Ok(mut sink) => {
                if let Err(err) = sink.write_record(HEADER) {
                    error!("failed to write path header: {err}");
                }
                self.sink = Some(sink);
                self.write(model, 0, EMPTY_ACTION, initial);
            }
            Err(err) => error!("failed to create path file in '{}': {err}", self.dir.display()),
        }
    }

    fn trace(&mut self, model: &Model, step: usize, action: Action, state: StateId) {
        self.write(model, step, action, state);
    }

    fn finalize(self) {
        if let Some(sink) = self.sink {
            if let Err(err) = sink.close() {
                error!("failed to close path file: {err}");
            }
        }
    }
}

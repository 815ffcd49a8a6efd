//! Worker role: receive the model once, then process pixels one at a time.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::distribute::task::{FailureKind, PixelOutput, PixelRecord, PixelTask};
use crate::domain::WorkingMode;
use crate::error::InversionError;
use crate::fit::{PixelProblem, invert};
use crate::model::{Model, ParameterSet};
use crate::synth::{SynthesisOracle, evaluate_all};

/// Coordinator-to-worker message.
#[derive(Debug)]
pub enum WorkerMessage {
    /// One-time broadcast of the sealed model.
    Model(Arc<Model>),
    Task(PixelTask),
    Shutdown,
}

pub struct Worker<'a> {
    id: usize,
    oracle: &'a dyn SynthesisOracle,
    inbox: Receiver<WorkerMessage>,
    outbox: Sender<PixelRecord>,
    model: Option<Arc<Model>>,
}

impl<'a> Worker<'a> {
    pub fn new(
        id: usize,
        oracle: &'a dyn SynthesisOracle,
        inbox: Receiver<WorkerMessage>,
        outbox: Sender<PixelRecord>,
    ) -> Self {
        Self {
            id,
            oracle,
            inbox,
            outbox,
            model: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Block until the next task. `None` on shutdown or when the coordinator is gone.
    pub fn await_task(&mut self) -> Option<PixelTask> {
        loop {
            match self.inbox.recv() {
                Ok(WorkerMessage::Model(model)) => self.model = Some(model),
                Ok(WorkerMessage::Task(task)) => return Some(task),
                Ok(WorkerMessage::Shutdown) | Err(_) => return None,
            }
        }
    }

    /// `false` when the coordinator no longer listens.
    pub fn submit_result(&self, record: PixelRecord) -> bool {
        self.outbox.send(record).is_ok()
    }

    pub fn run(mut self) {
        let mut processed = 0usize;
        while let Some(task) = self.await_task() {
            let record = match &self.model {
                Some(model) => process_task(model, self.oracle, &task),
                None => PixelRecord {
                    pixel: task.index,
                    output: PixelOutput::failed(FailureKind::InvalidTask, "task received before the model"),
                },
            };
            if !self.submit_result(record) {
                break;
            }
            processed += 1;
        }
        log::debug!("worker {} stopping after {processed} pixels", self.id);
    }
}

/// Run one pixel through synthesis or inversion.
///
/// Never fails: per-pixel problems become [`PixelOutput::Failed`] records.
pub fn process_task(model: &Model, oracle: &dyn SynthesisOracle, task: &PixelTask) -> PixelRecord {
    let output = process(model, oracle, task);
    if let PixelOutput::Failed(failure) = &output {
        log::debug!("pixel {} failed ({}): {}", task.index, failure.kind, failure.message);
    }
    PixelRecord {
        pixel: task.index,
        output,
    }
}

fn process(model: &Model, oracle: &dyn SynthesisOracle, task: &PixelTask) -> PixelOutput {
    if !task.active {
        return PixelOutput::Skipped;
    }
    let conditions = match task.conditions() {
        Ok(c) => c,
        Err(msg) => return PixelOutput::failed(FailureKind::InvalidTask, msg),
    };
    let start = match ParameterSet::with_overrides(model, &task.initial) {
        Ok(p) => p,
        Err(err) => return PixelOutput::failed(FailureKind::InvalidTask, err.to_string()),
    };

    match model.mode() {
        WorkingMode::Synthesis => match evaluate_all(model, oracle, &start, &conditions) {
            Ok(spectra) => PixelOutput::Synthesis { spectra },
            Err(err) => PixelOutput::failed(FailureKind::Synthesis, err.to_string()),
        },
        WorkingMode::Inversion => {
            let Some(observation) = &task.observation else {
                return PixelOutput::failed(FailureKind::InvalidTask, "no observation for inversion");
            };
            let problem = PixelProblem {
                pixel: task.index,
                observation,
                conditions,
                start,
            };
            match invert(model, oracle, problem) {
                Ok(result) => PixelOutput::Inversion(result),
                Err(err @ InversionError::Diverged { .. }) => {
                    PixelOutput::failed(FailureKind::InversionDiverged, err.to_string())
                }
                Err(err) => PixelOutput::failed(FailureKind::InvalidTask, err.to_string()),
            }
        }
    }
}

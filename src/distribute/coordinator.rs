//! Coordinator role: hand out pixels, collect results.
//!
//! Every worker holds at most one pixel at a time (credit = 1). A worker that
//! returns a result goes back to the front of the idle queue.
//!
//! A worker whose result channel disconnects while it holds a pixel is retired
//! and that pixel is reported as [`FailureKind::WorkerLost`]; it is not handed
//! to another worker. When no worker is left, every queued pixel is reported
//! the same way.

use std::collections::VecDeque;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Select, SendError, Sender};

use crate::distribute::task::{FailureKind, PixelOutput, PixelRecord, PixelTask};
use crate::distribute::worker::{WorkerMessage, process_task};
use crate::error::DistributionError;
use crate::model::Model;
use crate::synth::SynthesisOracle;

pub trait Coordinator {
    /// Give the next queued pixel to an idle worker.
    ///
    /// Returns `false` when nothing was dispatched (queue empty or no idle worker).
    fn dispatch_next(&mut self) -> Result<bool, DistributionError>;

    /// Wait for the next finished pixel. `None` once nothing is outstanding.
    fn collect_next(&mut self) -> Result<Option<PixelRecord>, DistributionError>;
}

/// Processes pixels in the calling thread, one at a time.
pub struct SerialCoordinator<'a> {
    model: &'a Model,
    oracle: &'a dyn SynthesisOracle,
    queue: VecDeque<PixelTask>,
    current: Option<PixelTask>,
}

impl<'a> SerialCoordinator<'a> {
    pub fn new(model: &'a Model, oracle: &'a dyn SynthesisOracle, tasks: Vec<PixelTask>) -> Self {
        Self {
            model,
            oracle,
            queue: tasks.into(),
            current: None,
        }
    }
}

impl Coordinator for SerialCoordinator<'_> {
    fn dispatch_next(&mut self) -> Result<bool, DistributionError> {
        if self.current.is_some() {
            return Ok(false);
        }
        self.current = self.queue.pop_front();
        Ok(self.current.is_some())
    }

    fn collect_next(&mut self) -> Result<Option<PixelRecord>, DistributionError> {
        Ok(self
            .current
            .take()
            .map(|task| process_task(self.model, self.oracle, &task)))
    }
}

/// Coordinator side of one worker's channels.
pub struct WorkerLink {
    pub id: usize,
    pub tasks: Sender<WorkerMessage>,
    pub results: Receiver<PixelRecord>,
}

struct LinkState {
    link: WorkerLink,
    in_flight: Option<usize>,
    alive: bool,
}

/// Message-passing coordinator for workers on other threads.
pub struct ChannelCoordinator {
    workers: Vec<LinkState>,
    queue: VecDeque<PixelTask>,
    idle: VecDeque<usize>,
    lost: VecDeque<PixelRecord>,
}

impl ChannelCoordinator {
    /// Broadcast the model to every worker and queue the tasks in input order.
    pub fn new(model: Arc<Model>, links: Vec<WorkerLink>, tasks: Vec<PixelTask>) -> Self {
        let mut workers = Vec::with_capacity(links.len());
        let mut idle = VecDeque::with_capacity(links.len());
        for (slot, link) in links.into_iter().enumerate() {
            let alive = link.tasks.send(WorkerMessage::Model(Arc::clone(&model))).is_ok();
            if alive {
                idle.push_back(slot);
            } else {
                log::warn!("worker {} unreachable before the first task", link.id);
            }
            workers.push(LinkState {
                link,
                in_flight: None,
                alive,
            });
        }
        Self {
            workers,
            queue: tasks.into(),
            idle,
            lost: VecDeque::new(),
        }
    }

    pub fn alive(&self) -> usize {
        self.workers.iter().filter(|w| w.alive).count()
    }

    /// Ask every remaining worker to stop.
    pub fn shutdown(&mut self) {
        for worker in self.workers.iter().filter(|w| w.alive) {
            let _ = worker.link.tasks.send(WorkerMessage::Shutdown);
        }
    }

    fn retire(&mut self, slot: usize) {
        self.workers[slot].alive = false;
        self.idle.retain(|&s| s != slot);
        if self.alive() == 0 {
            self.fail_queued();
        }
    }

    fn fail_queued(&mut self) {
        for task in self.queue.drain(..) {
            self.lost.push_back(lost(task.index, "no worker left to process the pixel".to_string()));
        }
    }
}

impl Coordinator for ChannelCoordinator {
    fn dispatch_next(&mut self) -> Result<bool, DistributionError> {
        loop {
            if self.queue.is_empty() {
                return Ok(false);
            }
            let Some(slot) = self.idle.pop_front() else {
                return Ok(false);
            };
            let Some(task) = self.queue.pop_front() else {
                return Ok(false);
            };
            let pixel = task.index;
            match self.workers[slot].link.tasks.send(WorkerMessage::Task(task)) {
                Ok(()) => {
                    self.workers[slot].in_flight = Some(pixel);
                    log::trace!("pixel {pixel} -> worker {}", self.workers[slot].link.id);
                    return Ok(true);
                }
                Err(SendError(message)) => {
                    log::warn!("worker {} stopped accepting tasks", self.workers[slot].link.id);
                    if let WorkerMessage::Task(task) = message {
                        self.queue.push_front(task);
                    }
                    self.retire(slot);
                }
            }
        }
    }

    fn collect_next(&mut self) -> Result<Option<PixelRecord>, DistributionError> {
        if let Some(record) = self.lost.pop_front() {
            return Ok(Some(record));
        }

        let busy: Vec<usize> = (0..self.workers.len())
            .filter(|&s| self.workers[s].in_flight.is_some())
            .collect();
        if busy.is_empty() {
            return Ok(None);
        }

        let (slot, received) = {
            let mut select = Select::new();
            for &slot in &busy {
                select.recv(&self.workers[slot].link.results);
            }
            let operation = select.select();
            let slot = busy[operation.index()];
            (slot, operation.recv(&self.workers[slot].link.results))
        };

        let state = &mut self.workers[slot];
        let expected = state.in_flight.take();
        let worker = state.link.id;
        match (received, expected) {
            (Ok(record), Some(pixel)) if record.pixel == pixel => {
                self.idle.push_front(slot);
                Ok(Some(record))
            }
            (Ok(record), expected) => Err(DistributionError::UnexpectedResult {
                worker,
                expected,
                got: record.pixel,
            }),
            (Err(_), Some(pixel)) => {
                log::warn!("worker {worker} disconnected while processing pixel {pixel}");
                self.retire(slot);
                Ok(Some(lost(pixel, format!("worker {worker} disconnected"))))
            }
            (Err(_), None) => {
                self.retire(slot);
                self.collect_next()
            }
        }
    }
}

fn lost(pixel: usize, message: String) -> PixelRecord {
    PixelRecord {
        pixel,
        output: PixelOutput::failed(FailureKind::WorkerLost, message),
    }
}

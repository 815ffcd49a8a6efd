//! Pixel work distribution.
//!
//! Two phases:
//!
//! 1. the sealed [`Model`] is broadcast once to every worker
//! 2. pixels are handed out one per worker and results collected as they come
//!
//! Results are always returned ordered by pixel index, whatever the mode or
//! worker count. Per-pixel failures are records, not errors; only malformed
//! input or a broken exchange aborts the run.

pub mod coordinator;
pub mod task;
pub mod worker;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::thread;

use crate::error::DistributionError;
use crate::model::Model;
use crate::synth::SynthesisOracle;

pub use coordinator::{ChannelCoordinator, Coordinator, SerialCoordinator, WorkerLink};
pub use task::{FailureKind, PixelFailure, PixelOutput, PixelRecord, PixelTask};
pub use worker::{Worker, WorkerMessage, process_task};

/// How pixels are spread over workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    Serial,
    /// Coordinator plus `workers` worker threads.
    Distributed { workers: usize },
}

pub struct WorkDistributor<'a> {
    model: Arc<Model>,
    oracle: &'a dyn SynthesisOracle,
    mode: Distribution,
}

impl<'a> WorkDistributor<'a> {
    pub fn new(model: Arc<Model>, oracle: &'a dyn SynthesisOracle, mode: Distribution) -> Self {
        Self { model, oracle, mode }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn run_all_pixels(&self, tasks: Vec<PixelTask>) -> Result<Vec<PixelRecord>, DistributionError> {
        run_all_pixels(Arc::clone(&self.model), self.oracle, tasks, self.mode)
    }
}

pub fn run_all_pixels(
    model: Arc<Model>,
    oracle: &dyn SynthesisOracle,
    tasks: Vec<PixelTask>,
    mode: Distribution,
) -> Result<Vec<PixelRecord>, DistributionError> {
    validate(&tasks, mode)?;
    if tasks.is_empty() {
        return Ok(Vec::new());
    }

    let total = tasks.len();
    let started = std::time::Instant::now();
    let records = match mode {
        Distribution::Serial => {
            let mut coordinator = SerialCoordinator::new(&model, oracle, tasks);
            drive(&mut coordinator)?
        }
        Distribution::Distributed { workers } => run_distributed(model, oracle, tasks, workers.min(total))?,
    };

    let failed = records.iter().filter(|r| matches!(r.output, PixelOutput::Failed(_))).count();
    log::info!(
        "processed {total} pixels ({failed} failed) in {:.2}s",
        started.elapsed().as_secs_f64()
    );
    Ok(records)
}

fn validate(tasks: &[PixelTask], mode: Distribution) -> Result<(), DistributionError> {
    if mode == (Distribution::Distributed { workers: 0 }) {
        return Err(DistributionError::NoWorkers);
    }
    let mut seen = HashSet::with_capacity(tasks.len());
    for task in tasks {
        if !seen.insert(task.index) {
            return Err(DistributionError::DuplicatePixel(task.index));
        }
    }
    Ok(())
}

/// Prime every worker, then collect one result and refill until drained.
pub fn drive(coordinator: &mut dyn Coordinator) -> Result<Vec<PixelRecord>, DistributionError> {
    while coordinator.dispatch_next()? {}

    let mut results = BTreeMap::new();
    while let Some(record) = coordinator.collect_next()? {
        results.insert(record.pixel, record);
        while coordinator.dispatch_next()? {}
    }
    Ok(results.into_values().collect())
}

fn run_distributed(
    model: Arc<Model>,
    oracle: &dyn SynthesisOracle,
    tasks: Vec<PixelTask>,
    workers: usize,
) -> Result<Vec<PixelRecord>, DistributionError> {
    log::debug!("distributing {} pixels over {workers} workers", tasks.len());

    thread::scope(|scope| {
        let mut links = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for id in 1..=workers {
            let (task_tx, task_rx) = crossbeam_channel::unbounded();
            let (result_tx, result_rx) = crossbeam_channel::unbounded();
            let worker = Worker::new(id, oracle, task_rx, result_tx);
            let handle = thread::Builder::new()
                .name(format!("sfit-worker-{id}"))
                .spawn_scoped(scope, move || worker.run())
                .map_err(|err| DistributionError::Spawn {
                    worker: id,
                    detail: err.to_string(),
                })?;
            handles.push((id, handle));
            links.push(WorkerLink {
                id,
                tasks: task_tx,
                results: result_rx,
            });
        }

        let mut coordinator = ChannelCoordinator::new(model, links, tasks);
        let outcome = drive(&mut coordinator);
        coordinator.shutdown();
        drop(coordinator);

        for (id, handle) in handles {
            if handle.join().is_err() {
                log::warn!("worker {id} panicked");
            }
        }
        outcome
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AtmosphereKind, ParamRef, StokesProfile, WorkingMode};
    use crate::error::SynthesisError;
    use crate::fit::lm::tests::telluric_observation;
    use crate::fit::{Cycle, InversionSettings};
    use crate::model::tests::{atmosphere, region};
    use crate::model::{AtmosphereRef, ModelBuilder};
    use crate::synth::{AnalyticOracle, SynthesisContext};

    fn synthesis_model() -> Arc<Model> {
        Arc::new(
            ModelBuilder::new(WorkingMode::Synthesis)
                .atmosphere(atmosphere("ph1", AtmosphereKind::Photosphere))
                .atmosphere(atmosphere("ch1", AtmosphereKind::Chromosphere))
                .atmosphere(atmosphere("te1", AtmosphereKind::Parametric))
                .region(region("He", "ph1->ch1+te1"))
                .seal()
                .unwrap(),
        )
    }

    fn inversion_model() -> Arc<Model> {
        Arc::new(
            ModelBuilder::new(WorkingMode::Inversion)
                .atmosphere(atmosphere("te1", AtmosphereKind::Parametric))
                .region(region("He", "te1"))
                .inversion(InversionSettings {
                    cycles: vec![Cycle::new(
                        "shape",
                        vec![ParamRef::new("te1", "depth"), ParamRef::new("te1", "sigma")],
                    )],
                    random_restarts: 1,
                    ..InversionSettings::default()
                })
                .seal()
                .unwrap(),
        )
    }

    fn synthesis_tasks(n: usize) -> Vec<PixelTask> {
        (0..n)
            .map(|i| {
                let mut task = PixelTask::new(i);
                task.initial.insert(ParamRef::new("ch1", "Bz"), 50.0 * i as f64);
                task.initial.insert(ParamRef::new("ch1", "tau"), 0.5 + 0.1 * i as f64);
                task
            })
            .collect()
    }

    #[test]
    fn distributed_matches_serial_for_synthesis() {
        let model = synthesis_model();
        let serial = run_all_pixels(model.clone(), &AnalyticOracle, synthesis_tasks(10), Distribution::Serial).unwrap();
        let distributed = run_all_pixels(
            model,
            &AnalyticOracle,
            synthesis_tasks(10),
            Distribution::Distributed { workers: 3 },
        )
        .unwrap();

        assert_eq!(serial.len(), 10);
        assert_eq!(serial, distributed);
        let pixels: Vec<usize> = distributed.iter().map(|r| r.pixel).collect();
        assert_eq!(pixels, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn distributed_matches_serial_for_inversion() {
        let model = inversion_model();
        let obs = telluric_observation(&model);
        let tasks = || -> Vec<PixelTask> {
            (0..10)
                .map(|i| {
                    let mut task = PixelTask::new(i).with_observation(obs.clone());
                    task.initial.insert(ParamRef::new("te1", "depth"), 0.2 + 0.05 * i as f64);
                    task
                })
                .collect()
        };

        let distributor = WorkDistributor::new(model.clone(), &AnalyticOracle, Distribution::Serial);
        let serial = distributor.run_all_pixels(tasks()).unwrap();
        let distributor = WorkDistributor::new(model, &AnalyticOracle, Distribution::Distributed { workers: 3 });
        let distributed = distributor.run_all_pixels(tasks()).unwrap();

        assert_eq!(serial, distributed);
        assert!(serial.iter().all(|r| r.output.status() == "inversion"));
    }

    #[test]
    fn results_are_ordered_by_pixel_not_input() {
        let mut tasks = synthesis_tasks(6);
        tasks.reverse();
        tasks[2].active = false;
        let records = run_all_pixels(
            synthesis_model(),
            &AnalyticOracle,
            tasks,
            Distribution::Distributed { workers: 2 },
        )
        .unwrap();
        let pixels: Vec<usize> = records.iter().map(|r| r.pixel).collect();
        assert_eq!(pixels, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(records[3].output, PixelOutput::Skipped);
    }

    #[test]
    fn malformed_input_is_rejected() {
        let mut tasks = synthesis_tasks(3);
        tasks[2].index = 1;
        assert_eq!(
            run_all_pixels(synthesis_model(), &AnalyticOracle, tasks, Distribution::Serial),
            Err(DistributionError::DuplicatePixel(1))
        );
        assert_eq!(
            run_all_pixels(
                synthesis_model(),
                &AnalyticOracle,
                synthesis_tasks(3),
                Distribution::Distributed { workers: 0 }
            ),
            Err(DistributionError::NoWorkers)
        );
        assert_eq!(
            run_all_pixels(synthesis_model(), &AnalyticOracle, Vec::new(), Distribution::Serial),
            Ok(Vec::new())
        );
    }

    /// Panics when the chromospheric field equals the trigger value.
    struct PanickyOracle(f64);

    impl SynthesisOracle for PanickyOracle {
        fn synthesize(
            &self,
            atmosphere: &AtmosphereRef<'_>,
            context: &SynthesisContext<'_>,
        ) -> Result<StokesProfile, SynthesisError> {
            if atmosphere.name() == "ch1" && atmosphere.get("Bz") == Some(self.0) {
                panic!("oracle crashed");
            }
            AnalyticOracle.synthesize(atmosphere, context)
        }
    }

    #[test]
    fn crashed_worker_fails_only_its_pixel() {
        let oracle = PanickyOracle(100.0);
        let records = run_all_pixels(
            synthesis_model(),
            &oracle,
            synthesis_tasks(6),
            Distribution::Distributed { workers: 2 },
        )
        .unwrap();

        assert_eq!(records.len(), 6);
        for record in &records {
            if record.pixel == 2 {
                assert!(matches!(
                    record.output,
                    PixelOutput::Failed(ref f) if f.kind == FailureKind::WorkerLost
                ));
            } else {
                assert_eq!(record.output.status(), "synthesis", "pixel {}", record.pixel);
            }
        }
    }

    #[test]
    fn losing_every_worker_fails_remaining_pixels() {
        let oracle = PanickyOracle(0.0);
        let records = run_all_pixels(
            synthesis_model(),
            &oracle,
            synthesis_tasks(4),
            Distribution::Distributed { workers: 1 },
        )
        .unwrap();
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| matches!(
            r.output,
            PixelOutput::Failed(ref f) if f.kind == FailureKind::WorkerLost
        )));
    }
}

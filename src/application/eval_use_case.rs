// ============================================================
// Layer 2: EvalUseCase
// ============================================================
// Orchestrates an evaluation run:
//
//   Step 1: Parse the model name          (Layer 5 - ml)
//   Step 2: Build the evaluation context  (Layer 5 - ml)
//   Step 3: Index the TFRecord shards     (Layer 4 - data)
//   Step 4: Work out the batch count      (this file)
//   Step 5: Evaluate once, or loop over new checkpoints
//
// The once/loop decision is an EvaluationMode handed to a single
// EvaluationExecutor, so the driver can be tested with a fake
// executor that only records which entry point was called.

use anyhow::{Context, Result};
use std::{
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use crate::application::session_executor::SessionExecutor;
use crate::domain::checkpoint::Checkpoint;
use crate::domain::snapshot::MetricsSnapshot;
use crate::domain::traits::CheckpointSource;
use crate::infra::checkpoint::CheckpointStore;
use crate::infra::config::EvalConfig;
use crate::infra::watcher::CheckpointWatcher;
use crate::ml::evaluator::{EvalBackend, EvalContext};
use crate::ml::registry::ModelKind;

// ─── Request ──────────────────────────────────────────────────────────────────
/// Everything the command line hands to the use case.
#[derive(Debug, Clone)]
pub struct EvalRequest {
    pub tfrecords:          Vec<PathBuf>,
    pub savedir:            PathBuf,
    pub checkpoint_path:    PathBuf,
    /// 0 derives the count from the dataset size
    pub max_batches:        usize,
    /// 0 evaluates once
    pub eval_interval_secs: u64,
    pub max_evaluations:    Option<usize>,
    pub config:             EvalConfig,
}

// ─── Mode ─────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSchedule {
    /// Minimum time between the starts of two rounds
    pub interval:        Duration,
    /// Stop after this many evaluations; `None` runs forever
    pub max_evaluations: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationMode {
    Once,
    Loop(LoopSchedule),
}

impl EvaluationMode {
    pub fn from_interval(interval_secs: u64, max_evaluations: Option<usize>) -> Self {
        if interval_secs == 0 {
            EvaluationMode::Once
        } else {
            EvaluationMode::Loop(LoopSchedule {
                interval: Duration::from_secs(interval_secs),
                max_evaluations,
            })
        }
    }
}

/// An explicit positive maximum wins, otherwise as many full
/// batches as the test set holds.
pub fn resolve_num_batches(max_batches: usize, num_examples: usize, batch_size: usize) -> usize {
    if max_batches > 0 {
        max_batches
    } else {
        num_examples / batch_size.max(1)
    }
}

// ─── Executor ─────────────────────────────────────────────────────────────────
pub trait EvaluationExecutor {
    /// Restore `checkpoint`, run the metric updates, report the values.
    fn run_once(&mut self, checkpoint: &Checkpoint) -> Result<MetricsSnapshot>;

    /// Evaluate every new checkpoint appearing in `checkpoint_dir`.
    /// Returns the number of evaluations performed.
    fn run_loop(&mut self, checkpoint_dir: &Path, schedule: &LoopSchedule) -> Result<usize>;
}

/// Shared body of `run_loop`: wait for a checkpoint, evaluate it,
/// then sleep out the rest of the interval. The interval is timed
/// from the moment a checkpoint was found, so time spent waiting
/// does not count toward it.
pub fn evaluation_loop<S, F>(
    watcher:  &mut CheckpointWatcher<S>,
    schedule: &LoopSchedule,
    mut evaluate: F,
) -> Result<usize>
where
    S: CheckpointSource,
    F: FnMut(&Checkpoint) -> Result<MetricsSnapshot>,
{
    let mut done = 0;
    while schedule.max_evaluations.map_or(true, |max| done < max) {
        let checkpoint = watcher.wait_for_new()?;
        let started    = Instant::now();
        evaluate(&checkpoint)?;
        done += 1;

        let elapsed = started.elapsed();
        tracing::info!("Evaluation {done} finished in {:.1}s", elapsed.as_secs_f64());
        if schedule.max_evaluations == Some(done) {
            break;
        }
        if let Some(rest) = schedule.interval.checked_sub(elapsed) {
            thread::sleep(rest);
        }
    }
    Ok(done)
}

// ─── Driver ───────────────────────────────────────────────────────────────────
pub struct EvaluationDriver {
    checkpoint_path: PathBuf,
    mode:            EvaluationMode,
}

impl EvaluationDriver {
    pub fn new(checkpoint_path: impl Into<PathBuf>, mode: EvaluationMode) -> Self {
        Self { checkpoint_path: checkpoint_path.into(), mode }
    }

    /// Once: resolve the checkpoint (failing before any restore) and
    /// evaluate it. Loop: hand the checkpoint directory to the executor.
    pub fn run<E: EvaluationExecutor>(&self, executor: &mut E) -> Result<()> {
        match &self.mode {
            EvaluationMode::Once => {
                let checkpoint = CheckpointStore::resolve(&self.checkpoint_path)?;
                executor.run_once(&checkpoint)?;
            }
            EvaluationMode::Loop(schedule) => {
                let dir = watch_dir(&self.checkpoint_path);
                tracing::info!(
                    "Evaluating new checkpoints in '{}' every {}s",
                    dir.display(), schedule.interval.as_secs()
                );
                let n = executor.run_loop(&dir, schedule)?;
                tracing::info!("Stopped after {n} evaluations");
            }
        }
        Ok(())
    }
}

/// Directory to watch in loop mode: the path itself, or the
/// directory holding a checkpoint file.
fn watch_dir(path: &Path) -> PathBuf {
    if path.is_dir() {
        return path.to_path_buf();
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

// ─── EvalUseCase ──────────────────────────────────────────────────────────────
pub struct EvalUseCase {
    request: EvalRequest,
}

impl EvalUseCase {
    pub fn new(request: EvalRequest) -> Self {
        Self { request }
    }

    pub fn execute(self) -> Result<()> {
        let req = self.request;
        req.config.validate()?;

        // ── Step 1: Unknown model names fail before anything is loaded ───────
        let model: ModelKind = req.config.model_name.parse()?;
        tracing::info!(
            "Evaluating {} on {} shard(s), batch size {}",
            model, req.tfrecords.len(), req.config.batch_size
        );

        // ── Step 2: Device and session options ───────────────────────────────
        let ctx = EvalContext::<EvalBackend>::new(
            Default::default(),
            &req.config.session_config,
        );

        // ── Steps 3-4: Dataset, metrics and batch count ──────────────────────
        let mut executor = SessionExecutor::new(
            ctx,
            req.config,
            model,
            req.tfrecords,
            &req.savedir,
            req.max_batches,
        )
        .context("Failed to set up evaluation")?;

        // ── Step 5: Once or loop ─────────────────────────────────────────────
        let mode = EvaluationMode::from_interval(req.eval_interval_secs, req.max_evaluations);
        EvaluationDriver::new(req.checkpoint_path, mode).run(&mut executor)
    }
}

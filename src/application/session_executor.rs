// ============================================================
// Layer 2: Session Executor
// ============================================================
// The real EvaluationExecutor. Holds everything that lives for
// the whole run (indexed dataset, metric set, summary writer)
// and builds per-pass state (restored model, input pipeline)
// on every evaluation.
//
// One pass:
//   restore weights → fresh one-epoch pipeline → metric updates
//     → log eval/<name> values → append to the summary CSV

use anyhow::Result;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use burn::prelude::*;

use crate::application::eval_use_case::{
    evaluation_loop, resolve_num_batches, EvaluationExecutor, LoopSchedule,
};
use crate::data::batcher::ImageBatcher;
use crate::data::dataset::TfRecordDataset;
use crate::data::decoder::ImageDecoder;
use crate::data::pipeline::{InputPipeline, PipelineOptions};
use crate::domain::checkpoint::Checkpoint;
use crate::domain::snapshot::MetricsSnapshot;
use crate::domain::traits::SampleSource;
use crate::infra::checkpoint::CheckpointStore;
use crate::infra::config::EvalConfig;
use crate::infra::summary::SummaryWriter;
use crate::infra::watcher::{CheckpointWatcher, DEFAULT_POLL};
use crate::ml::averaging::{MovingAverage, RestoreMapping};
use crate::ml::evaluator::{run_metric_updates, EvalContext};
use crate::ml::metrics::MetricSet;
use crate::ml::registry::{ModelKind, NetSpec};

pub struct SessionExecutor<B: Backend> {
    ctx:         EvalContext<B>,
    options:     PipelineOptions,
    model:       ModelKind,
    spec:        NetSpec,
    mapping:     RestoreMapping,
    dataset:     Arc<TfRecordDataset>,
    metrics:     MetricSet,
    num_batches: usize,
    summary:     SummaryWriter,
}

impl<B: Backend> SessionExecutor<B> {
    pub fn new(
        ctx:         EvalContext<B>,
        config:      EvalConfig,
        model:       ModelKind,
        tfrecords:   Vec<PathBuf>,
        savedir:     &Path,
        max_batches: usize,
    ) -> Result<Self> {
        let spec = NetSpec::from_config(&config);
        model.check_input(spec.input)?;

        let decoder = ImageDecoder::from_config(&config)?;
        let dataset = Arc::new(TfRecordDataset::open(tfrecords, decoder)?);
        if dataset.is_empty() {
            tracing::warn!("The TFRecord shards hold no records");
        }

        let num_examples = config.num_test_examples.unwrap_or_else(|| dataset.len());
        let num_batches  = resolve_num_batches(max_batches, num_examples, config.batch_size);
        if num_batches == 0 {
            tracing::warn!(
                "{num_examples} examples do not fill a single batch of {}; metrics will be empty",
                config.batch_size
            );
        }

        let mapping = MovingAverage::new(config.moving_average_decay).restore_mapping();
        tracing::info!(
            "{num_batches} batches of {} per pass, restoring {mapping} weights",
            config.batch_size
        );

        Ok(Self {
            ctx,
            options: PipelineOptions::from_config(&config),
            model,
            spec,
            mapping,
            dataset,
            metrics: MetricSet::from_config(&config),
            num_batches,
            summary: SummaryWriter::new(savedir)?,
        })
    }

    #[cfg(test)]
    pub fn num_batches(&self) -> usize {
        self.num_batches
    }

    fn report(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        tracing::info!(
            "Checkpoint '{}' (step {}): {} examples in {} batches",
            snapshot.checkpoint, snapshot.global_step, snapshot.examples, snapshot.batches
        );
        for (name, value) in &snapshot.values {
            tracing::info!("{} = {:.6}", MetricsSnapshot::summary_name(name), value);
        }
        self.summary.write(snapshot)
    }
}

impl<B: Backend> EvaluationExecutor for SessionExecutor<B> {
    fn run_once(&mut self, checkpoint: &Checkpoint) -> Result<MetricsSnapshot> {
        let net = self
            .model
            .restore::<B>(&self.spec, checkpoint, self.mapping, &self.ctx.device)?;

        let batcher  = ImageBatcher::new(self.ctx.device.clone(), self.spec.input);
        let pipeline = InputPipeline::new(self.dataset.clone(), batcher, self.options.clone())?;
        let stats    = run_metric_updates(net.as_ref(), pipeline, self.num_batches, &mut self.metrics)?;

        let snapshot = MetricsSnapshot {
            checkpoint:  checkpoint.name(),
            global_step: checkpoint.global_step(),
            batches:     stats.batches,
            examples:    stats.examples,
            values:      self.metrics.snapshot(),
        };
        self.report(&snapshot)?;
        Ok(snapshot)
    }

    fn run_loop(&mut self, checkpoint_dir: &Path, schedule: &LoopSchedule) -> Result<usize> {
        let mut watcher = CheckpointWatcher::new(CheckpointStore::new(checkpoint_dir), DEFAULT_POLL);
        evaluation_loop(&mut watcher, schedule, |checkpoint| self.run_once(checkpoint))
    }
}

// ============================================================
// Layer 5: Evaluator
// ============================================================
// Runs a restored model over a stream of batches and folds the
// class scores into a MetricSet.
//
// One evaluation pass:
//   1. reset every metric
//   2. for up to `num_batches` batches:
//        images → model → softmax scores → host → MetricSet::update
//   3. report how much data actually went through
//
// The device and session options travel in an explicit
// EvalContext instead of living in global state.

use anyhow::{anyhow, Result};
use burn::prelude::*;

use crate::data::batcher::ImageBatch;
use crate::infra::config::SessionConfig;
use crate::ml::metrics::MetricSet;
use crate::ml::nets::ImageClassifier;

/// Backend used by the command-line evaluator.
pub type EvalBackend = burn::backend::Wgpu;

/// Execution context shared by every evaluation pass of a run.
#[derive(Debug, Clone)]
pub struct EvalContext<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> EvalContext<B> {
    pub fn new(device: B::Device, session: &SessionConfig) -> Self {
        if session.log_device_placement {
            tracing::info!("Evaluation device: {:?}", device);
        }
        // wgpu sizes its own memory pools; the fraction is advisory
        tracing::debug!(
            "Session options: gpu memory fraction {}",
            session.per_process_gpu_memory_fraction
        );
        Self { device }
    }
}

/// What one pass actually consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub batches:  usize,
    pub examples: usize,
}

/// Run `num_batches` metric updates, stopping early if the input
/// runs dry.
pub fn run_metric_updates<B, I>(
    model:       &dyn ImageClassifier<B>,
    batches:     I,
    num_batches: usize,
    metrics:     &mut MetricSet,
) -> Result<PassStats>
where
    B: Backend,
    I: IntoIterator<Item = Result<ImageBatch<B>>>,
{
    metrics.reset();
    let mut stats = PassStats::default();

    for batch in batches.into_iter().take(num_batches) {
        let batch  = batch?;
        let scores = model
            .predictions(batch.images)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("Cannot read model output: {e:?}"))?;
        metrics.update(&batch.labels, &scores)?;

        stats.batches  += 1;
        stats.examples += batch.labels.len();
        tracing::debug!("Batch {}/{} done", stats.batches, num_batches);
    }

    if stats.batches < num_batches {
        tracing::warn!(
            "Input exhausted after {} of {} batches; metrics cover {} examples",
            stats.batches, num_batches, stats.examples
        );
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::ImageBatcher;
    use crate::data::pipeline::tests::CountingSource;
    use crate::data::pipeline::{InputPipeline, PipelineOptions};
    use crate::domain::sample::ImageShape;
    use burn::backend::NdArray;
    use std::sync::Arc;

    /// Ranks class 0 first, class 1 second, class 2 last for every image.
    struct FixedScores;

    impl ImageClassifier<NdArray> for FixedScores {
        fn logits(&self, images: Tensor<NdArray, 4>) -> Tensor<NdArray, 2> {
            let [n, _, _, _] = images.dims();
            let row = Tensor::<NdArray, 1>::from_floats([3.0, 2.0, 1.0], &images.device());
            row.unsqueeze::<2>().repeat_dim(0, n)
        }
    }

    fn batches(len: usize) -> InputPipeline<CountingSource, NdArray> {
        let options = PipelineOptions {
            batch_size:        3,
            num_epochs:        1,
            num_threads:       1,
            shuffle:           false,
            seed:              0,
            capacity:          10,
            min_after_dequeue: 2,
        };
        let batcher = ImageBatcher::new(Default::default(), ImageShape::new(1, 2, 2));
        InputPipeline::new(Arc::new(CountingSource { len, classes: 3 }), batcher, options).unwrap()
    }

    #[test]
    fn test_pass_accumulates_metrics() {
        let mut metrics = MetricSet::new(3, &[2]);
        let stats = run_metric_updates(&FixedScores, batches(9), 3, &mut metrics).unwrap();
        assert_eq!(stats, PassStats { batches: 3, examples: 9 });

        let values = metrics.snapshot();
        assert!((values[0].1 - 1.0 / 3.0).abs() < 1e-9);
        assert!((values[1].1 - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_pass_stops_when_input_runs_out() {
        let mut metrics = MetricSet::new(3, &[]);
        let stats = run_metric_updates(&FixedScores, batches(7), 5, &mut metrics).unwrap();
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.examples, 6);
    }

    #[test]
    fn test_metrics_reset_between_passes() {
        let mut metrics = MetricSet::new(3, &[]);
        metrics.update(&[0], &[1.0, 0.0, 0.0]).unwrap();
        run_metric_updates(&FixedScores, batches(3), 1, &mut metrics).unwrap();
        // labels 0, 1, 2 with class 0 always on top
        assert!((metrics.snapshot()[0].1 - 1.0 / 3.0).abs() < 1e-9);
    }
}

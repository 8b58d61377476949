// ============================================================
// Layer 4: Input Pipeline
// ============================================================
// Feeds fixed-size batches to the evaluator for a fixed number
// of epochs (one, for evaluation).
//
//   SampleSource ── decode on N threads ──▶ ShuffleQueue ──▶ ImageBatcher
//
// ShuffleQueue mirrors the classic shuffle-batch queue:
//   - it never buffers more than `capacity` samples
//   - with shuffling on, a random element is dequeued only while
//     more than `min_after_dequeue` samples are buffered (or once
//     the input is exhausted), which keeps the mix well stirred
//   - with shuffling off it is a plain FIFO
//
// Only full batches are produced; the trailing partial batch of
// an epoch is dropped, matching a batch queue that does not
// allow a smaller final batch.

use anyhow::{Context, Result};
use burn::{data::dataloader::batcher::Batcher, prelude::*};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;
use std::{collections::VecDeque, sync::Arc};

use crate::data::batcher::{ImageBatch, ImageBatcher};
use crate::domain::sample::ImageSample;
use crate::domain::traits::SampleSource;
use crate::infra::config::EvalConfig;

/// Knobs of the input pipeline, normally taken from the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub batch_size:        usize,
    pub num_epochs:        usize,
    pub num_threads:       usize,
    pub shuffle:           bool,
    pub seed:              u64,
    pub capacity:          usize,
    pub min_after_dequeue: usize,
}

impl PipelineOptions {
    /// One-epoch options for an evaluation pass.
    pub fn from_config(cfg: &EvalConfig) -> Self {
        Self {
            batch_size:        cfg.batch_size,
            num_epochs:        1,
            num_threads:       cfg.num_input_threads,
            shuffle:           cfg.shuffle_queue,
            seed:              cfg.random_seed,
            capacity:          cfg.queue_capacity,
            min_after_dequeue: cfg.queue_min,
        }
    }
}

// ─── ShuffleQueue ─────────────────────────────────────────────────────────────
pub struct ShuffleQueue<T> {
    buf:               VecDeque<T>,
    capacity:          usize,
    min_after_dequeue: usize,
    /// `None` means FIFO
    rng:               Option<StdRng>,
}

impl<T> ShuffleQueue<T> {
    pub fn new(capacity: usize, min_after_dequeue: usize, shuffle_seed: Option<u64>) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
            min_after_dequeue: min_after_dequeue.min(capacity - 1),
            rng: shuffle_seed.map(StdRng::seed_from_u64),
        }
    }

    /// Free slots left before the queue is full.
    pub fn room(&self) -> usize {
        self.capacity - self.buf.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn push(&mut self, item: T) {
        debug_assert!(self.room() > 0, "push into a full queue");
        self.buf.push_back(item);
    }

    /// Dequeue one element. `closed` signals that no more input will
    /// arrive, which lifts the min-after-dequeue floor.
    pub fn pop(&mut self, closed: bool) -> Option<T> {
        match self.rng.as_mut() {
            None => self.buf.pop_front(),
            Some(rng) => {
                let ready = self.buf.len() > self.min_after_dequeue || closed;
                if !ready || self.buf.is_empty() {
                    return None;
                }
                let i = rng.gen_range(0..self.buf.len());
                self.buf.swap_remove_back(i)
            }
        }
    }
}

// ─── InputPipeline ────────────────────────────────────────────────────────────
pub struct InputPipeline<S, B: Backend> {
    source:  Arc<S>,
    batcher: ImageBatcher<B>,
    options: PipelineOptions,
    pool:    rayon::ThreadPool,
    pending: VecDeque<usize>,
    queue:   ShuffleQueue<ImageSample>,
}

impl<S: SampleSource, B: Backend> InputPipeline<S, B> {
    pub fn new(source: Arc<S>, batcher: ImageBatcher<B>, options: PipelineOptions) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.num_threads.max(1))
            .build()
            .context("Cannot start input reader threads")?;

        let pending: VecDeque<usize> = (0..options.num_epochs)
            .flat_map(|_| 0..source.len())
            .collect();

        let seed  = options.shuffle.then_some(options.seed);
        let queue = ShuffleQueue::new(options.capacity, options.min_after_dequeue, seed);

        tracing::debug!(
            "Input pipeline: {} examples x {} epoch(s), batch {}, {} threads, shuffle={}",
            source.len(), options.num_epochs, options.batch_size,
            options.num_threads, options.shuffle,
        );

        Ok(Self { source, batcher, options, pool, pending, queue })
    }

    /// Decode pending records in parallel until the queue is full.
    fn fill(&mut self) -> Result<()> {
        let take = self.queue.room().min(self.pending.len());
        if take == 0 {
            return Ok(());
        }

        let indices: Vec<usize> = self.pending.drain(..take).collect();
        let source = &self.source;
        let decoded: Vec<Result<ImageSample>> = self
            .pool
            .install(|| indices.par_iter().map(|&i| source.read(i)).collect());

        for sample in decoded {
            self.queue.push(sample?);
        }
        Ok(())
    }

    /// Next full batch, or `None` once the epochs are exhausted.
    pub fn next_batch(&mut self) -> Result<Option<ImageBatch<B>>> {
        let mut items = Vec::with_capacity(self.options.batch_size);
        while items.len() < self.options.batch_size {
            self.fill()?;
            match self.queue.pop(self.pending.is_empty()) {
                Some(sample) => items.push(sample),
                None if self.pending.is_empty() => return Ok(None),
                None => continue,
            }
        }
        Ok(Some(self.batcher.batch(items)))
    }
}

impl<S: SampleSource, B: Backend> Iterator for InputPipeline<S, B> {
    type Item = Result<ImageBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().transpose()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::sample::ImageShape;
    use burn::backend::NdArray;

    /// In-memory source whose sample `i` has label `i % classes`
    /// and every pixel equal to `i`.
    pub(crate) struct CountingSource {
        pub len:     usize,
        pub classes: usize,
    }

    impl SampleSource for CountingSource {
        fn len(&self) -> usize {
            self.len
        }

        fn read(&self, index: usize) -> Result<ImageSample> {
            anyhow::ensure!(index < self.len, "index {index} out of range");
            Ok(ImageSample::new(vec![index as f32; 4], index % self.classes))
        }
    }

    fn options(batch_size: usize, shuffle: bool) -> PipelineOptions {
        PipelineOptions {
            batch_size,
            num_epochs: 1,
            num_threads: 2,
            shuffle,
            seed: 7,
            capacity: 16,
            min_after_dequeue: 4,
        }
    }

    fn first_pixels(batches: Vec<ImageBatch<NdArray>>) -> Vec<usize> {
        batches
            .into_iter()
            .flat_map(|b| {
                let v = b.images.into_data().to_vec::<f32>().unwrap();
                v.chunks(4).map(|c| c[0] as usize).collect::<Vec<_>>()
            })
            .collect()
    }

    fn pipeline(len: usize, opts: PipelineOptions) -> InputPipeline<CountingSource, NdArray> {
        let batcher = ImageBatcher::new(Default::default(), ImageShape::new(1, 2, 2));
        InputPipeline::new(Arc::new(CountingSource { len, classes: 3 }), batcher, opts).unwrap()
    }

    #[test]
    fn test_fifo_keeps_order_and_drops_partial_batch() {
        let batches: Vec<_> = pipeline(10, options(4, false)).collect::<Result<_>>().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(first_pixels(batches), (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_shuffle_is_a_seeded_permutation() {
        let run = || first_pixels(pipeline(40, options(5, true)).collect::<Result<_>>().unwrap());
        let a = run();
        let b = run();
        assert_eq!(a, b, "same seed must give the same order");
        assert_ne!(a, (0..40).collect::<Vec<_>>());

        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..40).collect::<Vec<_>>());
    }

    #[test]
    fn test_multiple_epochs_repeat_the_data() {
        let mut opts = options(3, false);
        opts.num_epochs = 2;
        let batches: Vec<_> = pipeline(3, opts).collect::<Result<_>>().unwrap();
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn test_queue_waits_for_min_after_dequeue() {
        let mut q = ShuffleQueue::new(8, 3, Some(1));
        for i in 0..3 {
            q.push(i);
        }
        assert_eq!(q.pop(false), None);
        q.push(3);
        assert!(q.pop(false).is_some());
        // once closed, everything drains
        let mut rest = 0;
        while q.pop(true).is_some() {
            rest += 1;
        }
        assert_eq!(rest, 3);
        assert!(q.is_empty());
    }

    #[test]
    fn test_decode_errors_propagate() {
        struct Broken;
        impl SampleSource for Broken {
            fn len(&self) -> usize { 4 }
            fn read(&self, _: usize) -> Result<ImageSample> { anyhow::bail!("corrupt record") }
        }
        let batcher = ImageBatcher::<NdArray>::new(Default::default(), ImageShape::new(1, 2, 2));
        let mut p = InputPipeline::new(Arc::new(Broken), batcher, options(2, false)).unwrap();
        assert!(p.next().unwrap().is_err());
    }
}

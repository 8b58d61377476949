// ============================================================
// Layer 3: Core Traits
// ============================================================
// The application layer programs against these traits, so the
// input pipeline and the checkpoint watcher can be exercised
// with in-memory fakes in tests.

use anyhow::Result;

use crate::domain::checkpoint::Checkpoint;
use crate::domain::sample::ImageSample;

// ─── SampleSource ─────────────────────────────────────────────────────────────
/// Random-access collection of evaluation examples.
///
/// Implementations:
///   - TfRecordDataset → indexed TFRecord shards on disk
pub trait SampleSource: Send + Sync {
    /// Total number of examples available in one epoch.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode the example at `index`.
    fn read(&self, index: usize) -> Result<ImageSample>;
}

// ─── CheckpointSource ─────────────────────────────────────────────────────────
/// Anything that can report the most recent checkpoint.
///
/// Implementations:
///   - CheckpointStore → a checkpoint directory on disk
pub trait CheckpointSource {
    /// The newest checkpoint, or `None` if nothing has been written yet.
    fn latest(&self) -> Result<Option<Checkpoint>>;
}

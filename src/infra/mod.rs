// ============================================================
// Layer 6: Infrastructure Layer
// ============================================================
// File-system concerns shared by the other layers:
//
//   config.rs      YAML evaluation config (serde_yaml) and its
//                  validation
//
//   checkpoint.rs  locating, restoring and writing checkpoints
//                  with Burn's CompactRecorder
//
//   watcher.rs     polling a checkpoint directory for checkpoints
//                  that have not been evaluated yet
//
//   summary.rs     appending metric values to a CSV history

/// Evaluation configuration file
pub mod config;

/// Checkpoint resolution, restore and save
pub mod checkpoint;

/// New-checkpoint polling for loop mode
pub mod watcher;

/// Metric summary CSV
pub mod summary;

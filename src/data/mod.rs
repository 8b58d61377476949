// ============================================================
// Layer 4: Data Pipeline
// ============================================================
// Everything between TFRecord shards on disk and image tensors
// on the device:
//
//   *.tfrecord shards
//       │
//       ▼
//   tfrecord          → length-prefixed, CRC-checked framing
//       │
//       ▼
//   example           → tf.train.Example protobuf messages
//       │
//       ▼
//   decoder           → JPEG/PNG/raw → resized, normalised CHW pixels
//       │
//       ▼
//   dataset           → random access over every record of every shard
//       │
//       ▼
//   pipeline          → parallel decode + shuffle queue, one epoch
//       │
//       ▼
//   batcher           → [N, C, H, W] tensors for the evaluator

pub mod tfrecord;

pub mod example;

pub mod decoder;

pub mod dataset;

pub mod batcher;

pub mod pipeline;

// ============================================================
// Layer 5: ML / Model Layer (Burn)
// ============================================================
// Everything that touches network weights or model output:
//
//   nets.rs       LeNet and CifarNet as Burn modules, behind the
//                 ImageClassifier trait
//
//   registry.rs   ModelKind, the closed set of architectures, and
//                 how each one is built and restored
//
//   averaging.rs  exponential moving average of the parameters and
//                 the raw/averaged restore mapping
//
//   metrics.rs    streaming Accuracy and Precision@k
//
//   evaluator.rs  one pass of metric updates over a batch stream

/// Network architectures
pub mod nets;

/// Model name → constructor
pub mod registry;

/// Shadow weights and restore mapping
pub mod averaging;

/// Streaming evaluation metrics
pub mod metrics;

/// Metric-update loop and evaluation context
pub mod evaluator;

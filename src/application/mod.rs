// ============================================================
// Layer 2: Application / Use Cases
// ============================================================
// Coordinates the other layers to evaluate checkpoints. No model
// math and no argument parsing here, only the workflow:
//
//   eval_use_case.rs     request, once/loop mode, the driver and
//                        the EvaluationExecutor trait
//
//   session_executor.rs  the executor that restores real models
//                        and runs them over the TFRecord shards

// The evaluation workflow
pub mod eval_use_case;

// Restore + metric pass over real data
pub mod session_executor;

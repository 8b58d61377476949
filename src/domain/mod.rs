// ============================================================
// Layer 3: Domain Layer
// ============================================================
// Plain structs and traits describing what an evaluation run
// works with. Nothing in here touches burn, the file system or
// the network, so every type can be unit tested on its own.
//
//   sample.rs      one decoded image and its class label
//   checkpoint.rs  checkpoint identity (prefix + global step)
//   snapshot.rs    metric values produced by one evaluation pass
//   traits.rs      seams implemented by the data and infra layers

pub mod sample;

pub mod checkpoint;

pub mod snapshot;

pub mod traits;

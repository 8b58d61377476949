// ============================================================
// Layer 6: Checkpoint Store
// ============================================================
// Finds, restores and writes model checkpoints using Burn's
// CompactRecorder (half-precision MessagePack).
//
// Directory layout:
//   checkpoints/
//     model-1000.mpk        raw weights after step 1000
//     model-1000_ema.mpk    moving-average shadow weights
//     model-1000.json       {global_step, model_name, num_classes}
//     model-2000.*          ...
//     checkpoint.json       {"latest": "model-2000", "all": [...]}
//
// Resolving "the latest checkpoint" of a directory:
//   1. checkpoint.json, if it exists and its weights exist
//   2. otherwise the most recently modified raw record
//      (ties broken by the higher global step)
//
// Restoring follows a RestoreMapping: averaged weights stand in
// for the raw ones, and the global step always comes back with
// the Checkpoint itself.

use anyhow::{anyhow, ensure, Context, Result};
use burn::{prelude::*, record::CompactRecorder};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

use crate::domain::checkpoint::{
    normalize_prefix, step_from_prefix, Checkpoint, CheckpointMetadata, AVERAGED_SUFFIX,
    RECORD_EXTENSION,
};
use crate::domain::traits::CheckpointSource;
use crate::ml::averaging::RestoreMapping;

const INDEX_FILE: &str = "checkpoint.json";

/// Pointer file naming the newest checkpoint of a directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointIndex {
    pub latest: String,
    pub all:    Vec<String>,
}

/// Manages the checkpoints of one directory.
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Turn a user-supplied path into a concrete checkpoint.
    ///
    /// A directory resolves to its latest checkpoint; anything else is
    /// treated as a checkpoint prefix (with or without extension).
    /// Fails before any weights are touched if nothing is found.
    pub fn resolve(path: &Path) -> Result<Checkpoint> {
        if path.is_dir() {
            return CheckpointStore::new(path)
                .latest()?
                .ok_or_else(|| anyhow!("No checkpoint found in directory '{}'", path.display()));
        }

        let prefix = normalize_prefix(path);
        let checkpoint = Self::describe(&prefix)?;
        ensure!(
            checkpoint.raw_file().exists() || checkpoint.averaged_file().exists(),
            "Checkpoint '{}' does not exist",
            path.display()
        );
        Ok(checkpoint)
    }

    /// Build a Checkpoint for `prefix`, reading its metadata if present.
    pub fn describe(prefix: &Path) -> Result<Checkpoint> {
        let bare = Checkpoint::new(prefix, 0);
        let step = match Self::metadata(&bare)? {
            Some(meta) => meta.global_step,
            None => step_from_prefix(prefix).unwrap_or_else(|| {
                tracing::warn!("No global step known for '{}', using 0", prefix.display());
                0
            }),
        };
        Ok(Checkpoint::new(prefix, step))
    }

    pub fn metadata(checkpoint: &Checkpoint) -> Result<Option<CheckpointMetadata>> {
        let path = checkpoint.metadata_file();
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        let meta = serde_json::from_str(&json)
            .with_context(|| format!("Malformed checkpoint metadata '{}'", path.display()))?;
        Ok(Some(meta))
    }

    /// Load the weights selected by `mapping` into `model`.
    ///
    /// The model must have the architecture the checkpoint was written
    /// with, otherwise the recorder rejects the record.
    pub fn restore<B: Backend, M: Module<B>>(
        model:      M,
        checkpoint: &Checkpoint,
        mapping:    RestoreMapping,
        device:     &B::Device,
    ) -> Result<M> {
        let (record, file) = match mapping {
            RestoreMapping::Averaged => (checkpoint.averaged_record(), checkpoint.averaged_file()),
            RestoreMapping::Raw      => (checkpoint.raw_record(), checkpoint.raw_file()),
        };
        ensure!(
            file.exists(),
            "Checkpoint '{}' has no {} weights ('{}')",
            checkpoint.name(),
            mapping,
            file.display()
        );

        tracing::info!(
            "Restoring {} weights of '{}' (global step {})",
            mapping, checkpoint.name(), checkpoint.global_step()
        );
        model
            .load_file(record, &CompactRecorder::new(), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", file.display()))
    }

    /// Write a checkpoint: raw weights, optional averaged weights,
    /// metadata, and the updated index pointer.
    #[cfg(test)]
    pub fn save<B: Backend, M: Module<B>>(
        &self,
        model:    &M,
        averaged: Option<&M>,
        meta:     &CheckpointMetadata,
    ) -> Result<Checkpoint> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        let name       = format!("model-{}", meta.global_step);
        let checkpoint = Checkpoint::new(self.dir.join(&name), meta.global_step);
        let recorder   = CompactRecorder::new();

        model
            .clone()
            .save_file(checkpoint.raw_record(), &recorder)
            .with_context(|| format!("Failed to save '{}'", checkpoint.raw_file().display()))?;
        if let Some(shadow) = averaged {
            shadow
                .clone()
                .save_file(checkpoint.averaged_record(), &recorder)
                .with_context(|| format!("Failed to save '{}'", checkpoint.averaged_file().display()))?;
        }
        fs::write(checkpoint.metadata_file(), serde_json::to_string_pretty(meta)?)
            .with_context(|| "Failed to write checkpoint metadata")?;

        let mut index = self.read_index()?.unwrap_or_default();
        if !index.all.contains(&name) {
            index.all.push(name.clone());
        }
        index.latest = name;
        fs::write(self.dir.join(INDEX_FILE), serde_json::to_string_pretty(&index)?)
            .with_context(|| format!("Failed to write {INDEX_FILE}"))?;

        tracing::debug!("Saved checkpoint '{}'", checkpoint.name());
        Ok(checkpoint)
    }

    fn read_index(&self) -> Result<Option<CheckpointIndex>> {
        let path = self.dir.join(INDEX_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        Ok(Some(serde_json::from_str(&json)
            .with_context(|| format!("Malformed '{}'", path.display()))?))
    }

    /// Newest raw record by modification time, then by global step.
    fn scan_newest(&self) -> Result<Option<PathBuf>> {
        let raw_suffix = format!(".{RECORD_EXTENSION}");
        let ema_suffix = format!("{AVERAGED_SUFFIX}.{RECORD_EXTENSION}");

        let mut best: Option<(SystemTime, u64, PathBuf)> = None;
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot read directory '{}'", self.dir.display()))?
        {
            let entry = entry?;
            let name  = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(&raw_suffix) || name.ends_with(&ema_suffix) {
                continue;
            }
            let prefix   = normalize_prefix(&entry.path());
            let modified = entry.metadata()?.modified()?;
            let step     = step_from_prefix(&prefix).unwrap_or(0);
            let newer = match &best {
                None => true,
                Some((t, s, _)) => (modified, step) > (*t, *s),
            };
            if newer {
                best = Some((modified, step, prefix));
            }
        }
        Ok(best.map(|(_, _, prefix)| prefix))
    }
}

impl CheckpointSource for CheckpointStore {
    fn latest(&self) -> Result<Option<Checkpoint>> {
        if !self.dir.is_dir() {
            return Ok(None);
        }

        if let Some(index) = self.read_index()? {
            tracing::debug!("{INDEX_FILE} lists {} checkpoints", index.all.len());
            let pointed = Checkpoint::new(self.dir.join(&index.latest), 0);
            if pointed.raw_file().exists() || pointed.averaged_file().exists() {
                return Self::describe(pointed.prefix()).map(Some);
            }
            tracing::warn!(
                "{INDEX_FILE} points at missing checkpoint '{}', scanning directory",
                index.latest
            );
        }

        match self.scan_newest()? {
            Some(prefix) => Self::describe(&prefix).map(Some),
            None => Ok(None),
        }
    }
}

// ============================================================
// Layer 3: Checkpoint Identity
// ============================================================
// A checkpoint is addressed by its prefix, e.g.
//
//   runs/exp1/model-1200
//
// and every file belonging to it hangs off that prefix:
//
//   model-1200.mpk       raw trained weights
//   model-1200_ema.mpk   moving-average shadow weights
//   model-1200.json      CheckpointMetadata
//
// The recorder appends ".mpk" itself (replacing any existing
// extension), so record paths stop before it and must not contain
// a dot of their own.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Extension the compact recorder appends to every record.
pub const RECORD_EXTENSION: &str = "mpk";

/// Suffix marking the averaged (shadow) copy of the weights.
pub const AVERAGED_SUFFIX: &str = "_ema";

/// Sidecar written next to the weights of every checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub global_step: u64,
    pub model_name:  String,
    pub num_classes: usize,
}

/// A concrete, resolved checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    prefix:      PathBuf,
    global_step: u64,
}

impl Checkpoint {
    pub fn new(prefix: impl Into<PathBuf>, global_step: u64) -> Self {
        Self { prefix: prefix.into(), global_step }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    /// File name of the prefix, e.g. `model-1200`.
    pub fn name(&self) -> String {
        self.prefix
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Path handed to the recorder for the raw weights.
    pub fn raw_record(&self) -> PathBuf {
        self.prefix.clone()
    }

    /// Path handed to the recorder for the averaged weights.
    pub fn averaged_record(&self) -> PathBuf {
        with_suffix(&self.prefix, AVERAGED_SUFFIX)
    }

    /// Raw weights file as it exists on disk.
    pub fn raw_file(&self) -> PathBuf {
        with_suffix(&self.prefix, &format!(".{RECORD_EXTENSION}"))
    }

    /// Averaged weights file as it exists on disk.
    pub fn averaged_file(&self) -> PathBuf {
        with_suffix(&self.prefix, &format!("{AVERAGED_SUFFIX}.{RECORD_EXTENSION}"))
    }

    pub fn metadata_file(&self) -> PathBuf {
        with_suffix(&self.prefix, ".json")
    }
}

/// Strip record extensions so `model-5.mpk`, `model-5_ema.mpk`
/// and `model-5` all name the same checkpoint prefix.
pub fn normalize_prefix(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    let stripped = raw
        .strip_suffix(&format!("{AVERAGED_SUFFIX}.{RECORD_EXTENSION}"))
        .or_else(|| raw.strip_suffix(&format!(".{RECORD_EXTENSION}")))
        .unwrap_or(&raw);
    PathBuf::from(stripped)
}

/// Parse the trailing `-<digits>` of a prefix such as `model-1200`.
pub fn step_from_prefix(prefix: &Path) -> Option<u64> {
    let name = prefix.file_name()?.to_str()?;
    let (_, digits) = name.rsplit_once('-')?;
    digits.parse().ok()
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut s = prefix.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_hang_off_prefix() {
        let c = Checkpoint::new("runs/a/model-7", 7);
        assert_eq!(c.raw_file(), PathBuf::from("runs/a/model-7.mpk"));
        assert_eq!(c.averaged_file(), PathBuf::from("runs/a/model-7_ema.mpk"));
        assert_eq!(c.averaged_record(), PathBuf::from("runs/a/model-7_ema"));
        assert_eq!(c.metadata_file(), PathBuf::from("runs/a/model-7.json"));
        assert_eq!(c.name(), "model-7");
    }

    #[test]
    fn test_normalize_prefix() {
        for p in ["ck/model-3", "ck/model-3.mpk", "ck/model-3_ema.mpk"] {
            assert_eq!(normalize_prefix(Path::new(p)), PathBuf::from("ck/model-3"));
        }
    }

    #[test]
    fn test_step_from_prefix() {
        assert_eq!(step_from_prefix(Path::new("x/model-1200")), Some(1200));
        assert_eq!(step_from_prefix(Path::new("x/model")), None);
        assert_eq!(step_from_prefix(Path::new("x/model-final")), None);
    }
}

// ============================================================
// Layer 6: Evaluation Summary Writer
// ============================================================
// Appends every evaluated metric to a CSV file in the output
// directory, one row per metric per checkpoint:
//
//   timestamp,global_step,checkpoint,name,value
//   2026-03-01T10:00:00+00:00,1200,model-1200,eval/Accuracy,0.712500
//   2026-03-01T10:00:00+00:00,1200,model-1200,eval/Precision@5,0.801234
//
// In loop mode rows accumulate across rounds, so the file is a
// history of the metrics over training steps. An existing file
// is appended to, never truncated.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::snapshot::MetricsSnapshot;

pub const SUMMARY_FILE: &str = "eval_metrics.csv";
const HEADER: &str = "timestamp,global_step,checkpoint,name,value";

pub struct SummaryWriter {
    csv_path: PathBuf,
}

impl SummaryWriter {
    /// Create the output directory and the CSV header if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create output directory '{}'", dir.display()))?;

        let csv_path = dir.join(SUMMARY_FILE);
        if !csv_path.exists() {
            fs::write(&csv_path, format!("{HEADER}\n"))
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            tracing::debug!("Created summary file '{}'", csv_path.display());
        }
        Ok(Self { csv_path })
    }

    pub fn write(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false);
        for (name, value) in &snapshot.values {
            writeln!(
                f,
                "{},{},{},{},{:.6}",
                timestamp,
                snapshot.global_step,
                snapshot.checkpoint,
                MetricsSnapshot::summary_name(name),
                value,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(step: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            checkpoint:  format!("model-{step}"),
            global_step: step,
            batches:     1,
            examples:    8,
            values:      vec![("Accuracy".into(), 0.25), ("Precision@2".into(), 0.5)],
        }
    }

    #[test]
    fn test_rows_are_appended_across_writers() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("eval");

        SummaryWriter::new(&out).unwrap().write(&snapshot(10)).unwrap();
        SummaryWriter::new(&out).unwrap().write(&snapshot(20)).unwrap();

        let text  = fs::read_to_string(out.join(SUMMARY_FILE)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], HEADER);
        assert!(lines[1].ends_with(",10,model-10,eval/Accuracy,0.250000"));
        assert!(lines[4].ends_with(",20,model-20,eval/Precision@2,0.500000"));
    }
}

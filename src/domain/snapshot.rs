// ============================================================
// Layer 3: Metrics Snapshot
// ============================================================
// The result of one evaluation pass over one checkpoint.
// Metric order is preserved (Accuracy first, then each
// Precision@k in configuration order) so logs and summary
// files always list them the same way.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Name of the evaluated checkpoint, e.g. `model-1200`
    pub checkpoint: String,

    /// Global step restored alongside the weights
    pub global_step: u64,

    /// Number of metric update steps actually run
    pub batches: usize,

    /// Number of examples that went through the model
    pub examples: usize,

    /// (metric name, value) in reporting order
    pub values: Vec<(String, f64)>,
}

impl MetricsSnapshot {
    /// Look up a metric by name, e.g. `"Accuracy"` or `"Precision@5"`.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    /// Summary tag under which a metric is reported.
    pub fn summary_name(name: &str) -> String {
        format!("eval/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_by_name() {
        let s = MetricsSnapshot {
            checkpoint:  "model-1".into(),
            global_step: 1,
            batches:     2,
            examples:    64,
            values:      vec![("Accuracy".into(), 0.5), ("Precision@5".into(), 0.75)],
        };
        assert_eq!(s.get("Precision@5"), Some(0.75));
        assert_eq!(s.get("Precision@1"), None);
        assert_eq!(MetricsSnapshot::summary_name("Accuracy"), "eval/Accuracy");
    }
}

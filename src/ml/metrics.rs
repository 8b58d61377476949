// ============================================================
// Layer 5: Streaming Metrics
// ============================================================
// Metrics accumulate over every batch of an evaluation pass and
// are read once at the end of it.
//
//   Accuracy      fraction of examples whose label has the top score
//   Precision@k   sparse average precision at k; with one label per
//                 example this is 1/rank when the label ranks within
//                 the top k, else 0
//
// Rank of the true class t among scores s:
//   1 + #{j : s_j > s_t} + #{j < t : s_j == s_t}
// so ties go to the lower class index, as a stable top-k would.

use anyhow::{ensure, Result};

use crate::infra::config::EvalConfig;

/// A metric that is updated one example at a time.
pub trait StreamingMetric: Send {
    fn name(&self) -> String;

    /// Fold in one example: its true class and its per-class scores.
    fn update(&mut self, label: usize, scores: &[f32]);

    /// Mean over everything seen since the last reset. 0 when empty.
    fn value(&self) -> f64;

    fn reset(&mut self);
}

/// 1-based rank of class `label` within `scores`.
pub fn rank_of(label: usize, scores: &[f32]) -> usize {
    let target = scores[label];
    let above = scores
        .iter()
        .enumerate()
        .filter(|&(j, &s)| s > target || (s == target && j < label))
        .count();
    above + 1
}

/// Running mean shared by both metrics.
#[derive(Debug, Default, Clone, Copy)]
struct Mean {
    total: f64,
    count: u64,
}

impl Mean {
    fn add(&mut self, v: f64) {
        self.total += v;
        self.count += 1;
    }

    fn get(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.total / self.count as f64 }
    }
}

#[derive(Debug, Default)]
pub struct Accuracy {
    mean: Mean,
}

impl StreamingMetric for Accuracy {
    fn name(&self) -> String {
        "Accuracy".to_string()
    }

    fn update(&mut self, label: usize, scores: &[f32]) {
        self.mean.add(if rank_of(label, scores) == 1 { 1.0 } else { 0.0 });
    }

    fn value(&self) -> f64 {
        self.mean.get()
    }

    fn reset(&mut self) {
        self.mean = Mean::default();
    }
}

#[derive(Debug)]
pub struct SparseAveragePrecisionAtK {
    k:    usize,
    mean: Mean,
}

impl SparseAveragePrecisionAtK {
    pub fn new(k: usize) -> Self {
        Self { k, mean: Mean::default() }
    }
}

impl StreamingMetric for SparseAveragePrecisionAtK {
    fn name(&self) -> String {
        format!("Precision@{}", self.k)
    }

    fn update(&mut self, label: usize, scores: &[f32]) {
        let rank = rank_of(label, scores);
        self.mean.add(if rank <= self.k { 1.0 / rank as f64 } else { 0.0 });
    }

    fn value(&self) -> f64 {
        self.mean.get()
    }

    fn reset(&mut self) {
        self.mean = Mean::default();
    }
}

// ─── MetricSet ────────────────────────────────────────────────────────────────

/// Ordered collection of metrics over a fixed number of classes.
/// Accuracy always comes first.
pub struct MetricSet {
    num_classes: usize,
    metrics:     Vec<Box<dyn StreamingMetric>>,
}

impl MetricSet {
    pub fn new(num_classes: usize, precision_at_k: &[usize]) -> Self {
        let mut metrics: Vec<Box<dyn StreamingMetric>> = vec![Box::new(Accuracy::default())];
        // a repeated k would report the same name twice
        for (i, &k) in precision_at_k.iter().enumerate() {
            if precision_at_k[..i].contains(&k) {
                tracing::debug!("Precision@{k} listed twice, keeping one");
                continue;
            }
            metrics.push(Box::new(SparseAveragePrecisionAtK::new(k)));
        }
        Self { num_classes, metrics }
    }

    pub fn from_config(cfg: &EvalConfig) -> Self {
        Self::new(cfg.num_classes, &cfg.precision_at_k_metric)
    }

    #[cfg(test)]
    pub fn names(&self) -> Vec<String> {
        self.metrics.iter().map(|m| m.name()).collect()
    }

    /// Update every metric with a batch.
    ///
    /// `scores` is row-major `[labels.len(), num_classes]`.
    pub fn update(&mut self, labels: &[usize], scores: &[f32]) -> Result<()> {
        ensure!(self.num_classes > 0, "MetricSet needs at least one class");
        ensure!(
            scores.len() == labels.len() * self.num_classes,
            "Expected {} scores for {} labels over {} classes, got {}",
            labels.len() * self.num_classes, labels.len(), self.num_classes, scores.len()
        );
        for (&label, row) in labels.iter().zip(scores.chunks(self.num_classes)) {
            ensure!(
                label < self.num_classes,
                "Label {label} out of range for {} classes", self.num_classes
            );
            for metric in self.metrics.iter_mut() {
                metric.update(label, row);
            }
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        for metric in self.metrics.iter_mut() {
            metric.reset();
        }
    }

    /// Current `(name, value)` pairs, in insertion order.
    pub fn snapshot(&self) -> Vec<(String, f64)> {
        self.metrics.iter().map(|m| (m.name(), m.value())).collect()
    }
}

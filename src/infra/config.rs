// ============================================================
// Layer 6: Evaluation Configuration
// ============================================================
// Loads the YAML configuration file shared with training runs.
// Keys are upper case, e.g.
//
//   MODEL_NAME: cifarnet
//   BATCH_SIZE: 32
//   NUM_CLASSES: 10
//   NUM_TEST_EXAMPLES: 10000
//   MOVING_AVERAGE_DECAY: 0.9999
//   PRECISION_AT_K_METRIC: [3, 5]
//   IMAGE_PROCESSING:
//     INPUT_SIZE: 32
//   SESSION_CONFIG:
//     PER_PROCESS_GPU_MEMORY_FRACTION: 0.9
//
// Every key is optional and falls back to the Default impl.
// Keys that only matter for training are ignored.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::domain::sample::ImageShape;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct EvalConfig {
    pub model_name:  String,
    pub batch_size:  usize,
    pub num_classes: usize,

    /// Size of the held-out set. Counted from the shards when absent.
    pub num_test_examples: Option<usize>,

    pub weight_decay:                   f64,
    pub batchnorm_moving_average_decay: f64,
    pub batchnorm_epsilon:              f64,
    pub dropout_keep_prob:              f64,

    /// Decay of the parameter moving average. 0 restores raw weights.
    pub moving_average_decay: f64,

    pub num_input_threads: usize,
    pub shuffle_queue:     bool,
    pub random_seed:       u64,
    pub queue_capacity:    usize,
    pub queue_min:         usize,

    /// Extra `Precision@k` metrics, one per entry
    pub precision_at_k_metric: Vec<usize>,

    pub image_processing: ImageProcessingConfig,
    pub session_config:   SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ImageProcessingConfig {
    /// Images are resized to INPUT_SIZE x INPUT_SIZE
    pub input_size:     usize,
    pub input_channels: usize,
    pub mean:           Vec<f32>,
    pub std:            Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SessionConfig {
    pub log_device_placement:            bool,
    pub per_process_gpu_memory_fraction: f64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            model_name:                     "cifarnet".to_string(),
            batch_size:                     32,
            num_classes:                    10,
            num_test_examples:              None,
            weight_decay:                   4e-5,
            batchnorm_moving_average_decay: 0.9997,
            batchnorm_epsilon:              1e-3,
            dropout_keep_prob:              0.8,
            moving_average_decay:           0.9999,
            num_input_threads:              4,
            shuffle_queue:                  false,
            random_seed:                    1,
            queue_capacity:                 1000,
            queue_min:                      100,
            precision_at_k_metric:          Vec::new(),
            image_processing:               ImageProcessingConfig::default(),
            session_config:                 SessionConfig::default(),
        }
    }
}

impl Default for ImageProcessingConfig {
    fn default() -> Self {
        Self {
            input_size:     32,
            input_channels: 3,
            mean:           vec![0.0; 3],
            std:            vec![1.0; 3],
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            log_device_placement:            false,
            per_process_gpu_memory_fraction: 0.9,
        }
    }
}

impl EvalConfig {
    /// Parse and validate a YAML configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config '{}'", path.display()))?;
        let cfg: EvalConfig = serde_yaml::from_str(&text)
            .with_context(|| format!("Malformed config '{}'", path.display()))?;
        cfg.validate()?;
        tracing::debug!("Loaded config from '{}': {:?}", path.display(), cfg);
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size > 0, "BATCH_SIZE must be positive");
        ensure!(self.num_classes > 0, "NUM_CLASSES must be positive");
        ensure!(self.num_input_threads > 0, "NUM_INPUT_THREADS must be positive");
        ensure!(
            self.precision_at_k_metric.iter().all(|k| *k > 0),
            "PRECISION_AT_K_METRIC entries must be positive"
        );
        ensure!(
            (0.0..1.0).contains(&self.moving_average_decay),
            "MOVING_AVERAGE_DECAY must be in [0, 1)"
        );
        ensure!(
            self.dropout_keep_prob > 0.0 && self.dropout_keep_prob <= 1.0,
            "DROPOUT_KEEP_PROB must be in (0, 1]"
        );
        ensure!(
            self.queue_capacity > self.queue_min,
            "QUEUE_CAPACITY ({}) must exceed QUEUE_MIN ({})",
            self.queue_capacity,
            self.queue_min
        );
        ensure!(self.image_processing.input_size > 0, "IMAGE_PROCESSING.INPUT_SIZE must be positive");

        let fraction = self.session_config.per_process_gpu_memory_fraction;
        ensure!(
            fraction > 0.0 && fraction <= 1.0,
            "SESSION_CONFIG.PER_PROCESS_GPU_MEMORY_FRACTION must be in (0, 1], got {fraction}"
        );
        Ok(())
    }

    pub fn image_shape(&self) -> ImageShape {
        let p = &self.image_processing;
        ImageShape::new(p.input_channels, p.input_size, p.input_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_keys_and_defaults() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("eval.yaml");
        fs::write(&path, "\
MODEL_NAME: lenet
BATCH_SIZE: 16
NUM_CLASSES: 5
PRECISION_AT_K_METRIC: [2, 3]
LEARNING_RATE: 0.1
IMAGE_PROCESSING:
  INPUT_SIZE: 28
  INPUT_CHANNELS: 1
  MEAN: [0.5]
  STD: [0.25]
SESSION_CONFIG:
  LOG_DEVICE_PLACEMENT: true
").unwrap();

        let cfg = EvalConfig::from_file(&path).unwrap();
        assert_eq!(cfg.model_name, "lenet");
        assert_eq!(cfg.batch_size, 16);
        assert_eq!(cfg.precision_at_k_metric, vec![2, 3]);
        assert_eq!(cfg.image_shape(), ImageShape::new(1, 28, 28));
        assert!(cfg.session_config.log_device_placement);
        // untouched keys keep their defaults
        assert_eq!(cfg.queue_capacity, 1000);
        assert_eq!(cfg.num_test_examples, None);
        assert_eq!(cfg.session_config.per_process_gpu_memory_fraction, 0.9);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut cfg = EvalConfig::default();
        assert!(cfg.validate().is_ok());

        cfg.batch_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = EvalConfig::default();
        cfg.session_config.per_process_gpu_memory_fraction = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = EvalConfig::default();
        cfg.queue_min = cfg.queue_capacity;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_missing_file_fails() {
        assert!(EvalConfig::from_file(Path::new("/definitely/not/here.yaml")).is_err());
    }
}

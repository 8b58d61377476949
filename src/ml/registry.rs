// ============================================================
// Layer 5: Model Registry
// ============================================================
// Closed set of architectures, selected by the MODEL_NAME config
// key or --model_name. Parsing happens once at startup, so an
// unknown name fails immediately with the list of valid ones
// instead of surfacing later while restoring weights.

use anyhow::{anyhow, ensure, Result};
use burn::prelude::*;
use std::{fmt, str::FromStr};

use crate::domain::checkpoint::Checkpoint;
use crate::domain::sample::ImageShape;
use crate::infra::checkpoint::CheckpointStore;
use crate::infra::config::EvalConfig;
use crate::ml::averaging::RestoreMapping;
use crate::ml::nets::{CifarNetConfig, ImageClassifier, LeNetConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    LeNet,
    CifarNet,
}

/// Normalisation settings shared by every layer of a network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArgScope {
    pub batch_norm_decay:   f64,
    pub batch_norm_epsilon: f64,
}

/// Everything needed to build a network before restoring it.
#[derive(Debug, Clone, PartialEq)]
pub struct NetSpec {
    pub input:             ImageShape,
    pub num_classes:       usize,
    pub dropout_keep_prob: f64,
    pub scope:             ArgScope,
}

impl NetSpec {
    pub fn from_config(cfg: &EvalConfig) -> Self {
        Self {
            input:             cfg.image_shape(),
            num_classes:       cfg.num_classes,
            dropout_keep_prob: cfg.dropout_keep_prob,
            scope: ArgScope {
                batch_norm_decay:   cfg.batchnorm_moving_average_decay,
                batch_norm_epsilon: cfg.batchnorm_epsilon,
            },
        }
    }
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::LeNet, ModelKind::CifarNet];

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::LeNet    => "lenet",
            ModelKind::CifarNet => "cifarnet",
        }
    }

    /// Reject input sizes the architecture cannot flatten.
    pub fn check_input(self, input: ImageShape) -> Result<()> {
        let min_side = match self {
            ModelKind::LeNet    => 4,
            ModelKind::CifarNet => 1,
        };
        ensure!(
            input.height >= min_side && input.width >= min_side,
            "{} needs inputs of at least {min_side}x{min_side}, got {}x{}",
            self, input.height, input.width
        );
        Ok(())
    }

    /// Build the network in inference mode and load `checkpoint` into it.
    pub fn restore<B: Backend>(
        self,
        spec:       &NetSpec,
        checkpoint: &Checkpoint,
        mapping:    RestoreMapping,
        device:     &B::Device,
    ) -> Result<Box<dyn ImageClassifier<B>>> {
        self.check_input(spec.input)?;

        if let Some(meta) = CheckpointStore::metadata(checkpoint)? {
            ensure!(
                meta.model_name == self.name(),
                "Checkpoint '{}' holds a '{}' model, but '{}' was requested",
                checkpoint.name(), meta.model_name, self
            );
            ensure!(
                meta.num_classes == spec.num_classes,
                "Checkpoint '{}' was trained for {} classes, config says {}",
                checkpoint.name(), meta.num_classes, spec.num_classes
            );
        }

        let ImageShape { channels, height, width } = spec.input;
        let dropout = 1.0 - spec.dropout_keep_prob;

        let model: Box<dyn ImageClassifier<B>> = match self {
            ModelKind::LeNet => {
                let net = LeNetConfig::new(channels, height, width, spec.num_classes)
                    .with_dropout(dropout)
                    .init::<B>(device);
                Box::new(CheckpointStore::restore::<B, _>(net, checkpoint, mapping, device)?)
            }
            ModelKind::CifarNet => {
                let net = CifarNetConfig::new(channels, height, width, spec.num_classes)
                    .with_dropout(dropout)
                    .with_batch_norm_decay(spec.scope.batch_norm_decay)
                    .with_batch_norm_epsilon(spec.scope.batch_norm_epsilon)
                    .init::<B>(device);
                Box::new(CheckpointStore::restore::<B, _>(net, checkpoint, mapping, device)?)
            }
        };
        Ok(model)
    }
}

impl FromStr for ModelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        ModelKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let known: Vec<&str> = ModelKind::ALL.iter().map(|k| k.name()).collect();
                anyhow!("Unknown model '{s}', expected one of: {}", known.join(", "))
            })
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::checkpoint::CheckpointMetadata;
    use crate::ml::nets::LeNet;
    use burn::backend::NdArray;

    fn spec(num_classes: usize) -> NetSpec {
        let mut cfg = EvalConfig::default();
        cfg.num_classes = num_classes;
        cfg.image_processing.input_size = 8;
        cfg.image_processing.input_channels = 1;
        NetSpec::from_config(&cfg)
    }

    #[test]
    fn test_parse_known_and_unknown_names() {
        assert_eq!("lenet".parse::<ModelKind>().unwrap(), ModelKind::LeNet);
        assert_eq!("CifarNet".parse::<ModelKind>().unwrap(), ModelKind::CifarNet);

        let err = "inception_v9".parse::<ModelKind>().unwrap_err().to_string();
        assert!(err.contains("Unknown model 'inception_v9'"));
        assert!(err.contains("lenet, cifarnet"));
    }

    #[test]
    fn test_lenet_rejects_tiny_inputs() {
        assert!(ModelKind::LeNet.check_input(ImageShape::new(1, 3, 3)).is_err());
        assert!(ModelKind::CifarNet.check_input(ImageShape::new(1, 3, 3)).is_ok());
    }

    #[test]
    fn test_restore_checks_metadata() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let net: LeNet<NdArray> = LeNetConfig::new(1, 8, 8, 3).init(&device);
        let meta = CheckpointMetadata { global_step: 9, model_name: "lenet".into(), num_classes: 3 };
        let ckpt = CheckpointStore::new(dir.path())
            .save::<NdArray, _>(&net, Some(&net), &meta)
            .unwrap();

        let restored = ModelKind::LeNet
            .restore::<NdArray>(&spec(3), &ckpt, RestoreMapping::Averaged, &device)
            .unwrap();
        let out = restored.predictions(Tensor::zeros([2, 1, 8, 8], &device));
        assert_eq!(out.dims(), [2, 3]);

        let wrong_model = ModelKind::CifarNet
            .restore::<NdArray>(&spec(3), &ckpt, RestoreMapping::Averaged, &device);
        assert!(wrong_model.is_err());

        let wrong_classes = ModelKind::LeNet
            .restore::<NdArray>(&spec(4), &ckpt, RestoreMapping::Averaged, &device);
        assert!(wrong_classes.is_err());
    }
}

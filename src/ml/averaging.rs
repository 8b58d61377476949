// ============================================================
// Layer 5: Parameter Moving Average
// ============================================================
// Training keeps an exponential moving average ("shadow") of every
// trainable parameter next to the raw weights. Evaluation reads the
// shadow values by default, so the restore step needs to know which
// of the two records to load.
//
//   effective decay = min(decay, (1 + step) / (10 + step))
//   shadow          = shadow - (shadow - value) * (1 - decay)
//
// The step-dependent cap lets the average warm up quickly at the
// start of training.

use std::fmt;

#[cfg(test)]
use burn::{
    module::{Module, ModuleMapper, ModuleVisitor, ParamId},
    prelude::*,
};

/// Which set of weights to load from a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreMapping {
    /// Shadow weights stand in for the raw variables
    Averaged,
    Raw,
}

impl RestoreMapping {
    /// A decay of 0 disables averaging altogether.
    pub fn for_decay(decay: f64) -> Self {
        if decay > 0.0 {
            RestoreMapping::Averaged
        } else {
            RestoreMapping::Raw
        }
    }
}

impl fmt::Display for RestoreMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RestoreMapping::Averaged => "averaged",
            RestoreMapping::Raw      => "raw",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovingAverage {
    decay: f64,
}

impl MovingAverage {
    pub fn new(decay: f64) -> Self {
        Self { decay }
    }

    pub fn restore_mapping(&self) -> RestoreMapping {
        RestoreMapping::for_decay(self.decay)
    }

    /// Decay actually used at `step`; without a step the configured one.
    #[cfg(test)]
    pub fn effective_decay(&self, step: Option<u64>) -> f64 {
        match step {
            Some(step) => {
                let step = step as f64;
                self.decay.min((1.0 + step) / (10.0 + step))
            }
            None => self.decay,
        }
    }

    /// Move every shadow parameter towards its current value.
    ///
    /// Both modules must share an architecture; parameters are paired
    /// in traversal order. Only fixture checkpoints are written this way.
    #[cfg(test)]
    pub fn apply<B: Backend, M: Module<B>>(&self, shadow: M, current: &M, step: Option<u64>) -> M {
        let mut collect = Collect::<B> { values: Vec::new() };
        current.visit(&mut collect);

        let mut blend = Blend::<B> {
            values: collect.values.into_iter(),
            keep:   self.effective_decay(step),
        };
        shadow.map(&mut blend)
    }
}

#[cfg(test)]
struct Collect<B: Backend> {
    values: Vec<Tensor<B, 1>>,
}

#[cfg(test)]
impl<B: Backend> ModuleVisitor<B> for Collect<B> {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        self.values.push(tensor.clone().flatten::<1>(0, D - 1));
    }
}

#[cfg(test)]
struct Blend<B: Backend> {
    values: std::vec::IntoIter<Tensor<B, 1>>,
    keep:   f64,
}

#[cfg(test)]
impl<B: Backend> ModuleMapper<B> for Blend<B> {
    fn map_float<const D: usize>(&mut self, _id: ParamId, shadow: Tensor<B, D>) -> Tensor<B, D> {
        match self.values.next() {
            Some(value) => {
                let value = value.reshape(shadow.dims());
                shadow.clone() - (shadow - value).mul_scalar(1.0 - self.keep)
            }
            None => shadow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::nets::{LeNet, LeNetConfig};
    use burn::backend::NdArray;

    fn weights(net: &LeNet<NdArray>) -> Vec<f32> {
        net.fc4.weight.val().into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_mapping_follows_decay() {
        assert_eq!(RestoreMapping::for_decay(0.9999), RestoreMapping::Averaged);
        assert_eq!(RestoreMapping::for_decay(0.0), RestoreMapping::Raw);
        assert_eq!(RestoreMapping::Averaged.to_string(), "averaged");
    }

    #[test]
    fn test_effective_decay_warms_up() {
        let ema = MovingAverage::new(0.9999);
        assert!((ema.effective_decay(Some(0)) - 0.1).abs() < 1e-12);
        assert!((ema.effective_decay(Some(90)) - 0.91).abs() < 1e-12);
        assert_eq!(ema.effective_decay(None), 0.9999);
        assert_eq!(ema.effective_decay(Some(10_000_000)), 0.9999);
    }

    #[test]
    fn test_apply_blends_towards_current() {
        let device = Default::default();
        let config = LeNetConfig::new(1, 8, 8, 3);
        let shadow: LeNet<NdArray> = config.init(&device);
        let current: LeNet<NdArray> = config.init(&device);

        let before = weights(&shadow);
        let target = weights(&current);

        let ema     = MovingAverage::new(0.5);
        let blended = weights(&ema.apply::<NdArray, _>(shadow, &current, None));

        for ((s, v), b) in before.iter().zip(&target).zip(&blended) {
            assert!((b - (s + v) / 2.0).abs() < 1e-5);
        }
    }
}

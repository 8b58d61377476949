// ============================================================
// Layer 4: Example Decoder
// ============================================================
// Turns a parsed tf.train.Example into an ImageSample:
//
//   1. pull the image bytes and the class label
//   2. decode JPEG/PNG (or wrap raw u8 pixels)
//   3. resize to the configured input size
//   4. scale to [0, 1], subtract the mean, divide by the std
//   5. reorder HWC → CHW
//
// Feature keys follow the layout produced by the usual
// image-to-TFRecord conversion scripts.

use anyhow::{anyhow, bail, ensure, Context, Result};
use image::{imageops::FilterType, DynamicImage, GrayImage, RgbImage};

use crate::data::example::Example;
use crate::domain::sample::{ImageSample, ImageShape};
use crate::infra::config::EvalConfig;

pub const KEY_ENCODED:  &str = "image/encoded";
pub const KEY_FORMAT:   &str = "image/format";
pub const KEY_LABEL:    &str = "image/class/label";
pub const KEY_HEIGHT:   &str = "image/height";
pub const KEY_WIDTH:    &str = "image/width";
pub const KEY_CHANNELS: &str = "image/channels";

/// Converts examples into normalised, fixed-size samples.
#[derive(Debug, Clone)]
pub struct ImageDecoder {
    shape:       ImageShape,
    mean:        Vec<f32>,
    std:         Vec<f32>,
    num_classes: usize,
}

impl ImageDecoder {
    /// `mean` and `std` hold one value per channel.
    pub fn new(shape: ImageShape, mean: Vec<f32>, std: Vec<f32>, num_classes: usize) -> Result<Self> {
        ensure!(!shape.is_empty(), "Image size must be non-zero, got {shape:?}");
        ensure!(
            shape.channels == 1 || shape.channels == 3,
            "Unsupported channel count {} (expected 1 or 3)",
            shape.channels
        );
        ensure!(
            mean.len() == shape.channels && std.len() == shape.channels,
            "MEAN and STD need one entry per channel ({} channels)",
            shape.channels
        );
        ensure!(std.iter().all(|s| *s > 0.0), "STD entries must be positive");
        Ok(Self { shape, mean, std, num_classes })
    }

    /// Decoder for the configured input size. A single MEAN/STD entry
    /// applies to every channel.
    pub fn from_config(cfg: &EvalConfig) -> Result<Self> {
        let shape = cfg.image_shape();
        let p     = &cfg.image_processing;
        let per_channel = |v: &[f32]| match v {
            [one] => vec![*one; shape.channels],
            many  => many.to_vec(),
        };
        Self::new(shape, per_channel(&p.mean), per_channel(&p.std), cfg.num_classes)
    }

    #[cfg(test)]
    pub fn shape(&self) -> ImageShape {
        self.shape
    }

    pub fn decode(&self, example: &Example) -> Result<ImageSample> {
        let label = example
            .int64(KEY_LABEL)
            .ok_or_else(|| anyhow!("Example has no '{KEY_LABEL}' feature"))?;
        ensure!(
            label >= 0 && (label as usize) < self.num_classes,
            "Label {label} outside 0..{}",
            self.num_classes
        );

        let image = self.load_image(example)?;
        Ok(ImageSample::new(self.normalise(image), label as usize))
    }

    fn load_image(&self, example: &Example) -> Result<DynamicImage> {
        let bytes = example
            .bytes(KEY_ENCODED)
            .ok_or_else(|| anyhow!("Example has no '{KEY_ENCODED}' feature"))?;

        if example.bytes(KEY_FORMAT) == Some(b"raw".as_slice()) {
            return raw_image(example, bytes);
        }
        image::load_from_memory(bytes).context("Cannot decode encoded image")
    }

    fn normalise(&self, image: DynamicImage) -> Vec<f32> {
        let ImageShape { channels, height, width } = self.shape;
        let image = if image.width() as usize != width || image.height() as usize != height {
            image.resize_exact(width as u32, height as u32, FilterType::Triangle)
        } else {
            image
        };

        // HWC bytes in the target channel count
        let hwc = match channels {
            1 => image.to_luma8().into_raw(),
            _ => image.to_rgb8().into_raw(),
        };

        let plane = height * width;
        let mut chw = vec![0f32; channels * plane];
        for (i, px) in hwc.iter().enumerate() {
            let c = i % channels;
            let p = i / channels;
            chw[c * plane + p] = (*px as f32 / 255.0 - self.mean[c]) / self.std[c];
        }
        chw
    }
}

/// Wrap raw u8 pixels described by the height/width/channels features.
fn raw_image(example: &Example, bytes: &[u8]) -> Result<DynamicImage> {
    let dim = |key: &str| -> Result<u32> {
        let v = example
            .int64(key)
            .ok_or_else(|| anyhow!("Raw image is missing '{key}'"))?;
        u32::try_from(v).with_context(|| format!("Invalid '{key}' value {v}"))
    };
    let (h, w, c) = (dim(KEY_HEIGHT)?, dim(KEY_WIDTH)?, dim(KEY_CHANNELS)?);
    let expected = (h as usize)
        .checked_mul(w as usize)
        .and_then(|n| n.checked_mul(c as usize))
        .ok_or_else(|| anyhow!("Raw image size {h}x{w}x{c} overflows"))?;
    ensure!(
        bytes.len() == expected,
        "Raw image holds {} bytes, expected {h}x{w}x{c} = {expected}",
        bytes.len()
    );

    let pixels = bytes.to_vec();
    let image = match c {
        1 => GrayImage::from_raw(w, h, pixels).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(w, h, pixels).map(DynamicImage::ImageRgb8),
        other => bail!("Unsupported raw channel count {other}"),
    };
    image.ok_or_else(|| anyhow!("Raw pixel buffer does not match {w}x{h}"))
}

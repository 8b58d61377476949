use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig,
        Dropout, DropoutConfig,
        Linear, LinearConfig,
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::{relu, softmax},
};

/// Anything that maps an image batch to per-class scores.
///
/// Models are only ever run in inference mode here: the evaluation
/// backend has no autodiff, so dropout is a no-op and batch norm
/// normalises with its running statistics.
pub trait ImageClassifier<B: Backend>: Send {
    /// images: [batch, channels, height, width] → logits: [batch, num_classes]
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Softmax over the class dimension.
    fn predictions(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.logits(images), 1)
    }
}

// ─── LeNet ────────────────────────────────────────────────────────────────────
// conv5x5(32) → pool2 → conv5x5(64) → pool2 → fc(1024) → dropout → fc(classes)

#[derive(Config, Debug)]
pub struct LeNetConfig {
    pub channels:    usize,
    pub height:      usize,
    pub width:       usize,
    pub num_classes: usize,
    #[config(default = 0.5)]
    pub dropout:     f64,
}

impl LeNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LeNet<B> {
        let conv = |cin, cout| {
            Conv2dConfig::new([cin, cout], [5, 5])
                .with_padding(PaddingConfig2d::Same)
                .init(device)
        };
        let flat = (self.height / 4) * (self.width / 4) * 64;
        LeNet {
            conv1:   conv(self.channels, 32),
            conv2:   conv(32, 64),
            pool:    MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            fc3:     LinearConfig::new(flat, 1024).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc4:     LinearConfig::new(1024, self.num_classes).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct LeNet<B: Backend> {
    pub conv1:   Conv2d<B>,
    pub conv2:   Conv2d<B>,
    pub pool:    MaxPool2d,
    pub fc3:     Linear<B>,
    pub dropout: Dropout,
    pub fc4:     Linear<B>,
}

impl<B: Backend> ImageClassifier<B> for LeNet<B> {
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(relu(self.conv1.forward(images)));
        let x = self.pool.forward(relu(self.conv2.forward(x)));
        let x = x.flatten::<2>(1, 3);
        let x = self.dropout.forward(relu(self.fc3.forward(x)));
        self.fc4.forward(x)
    }
}

// ─── CifarNet ─────────────────────────────────────────────────────────────────
// conv5x5(64) → bn → pool3/2 → conv5x5(64) → bn → pool3/2
//   → fc(384) → dropout → fc(192) → fc(classes)
//
// Batch norm stands in for local response normalisation, so the
// batch-norm decay and epsilon of the arg scope apply here.

#[derive(Config, Debug)]
pub struct CifarNetConfig {
    pub channels:    usize,
    pub height:      usize,
    pub width:       usize,
    pub num_classes: usize,
    #[config(default = 0.5)]
    pub dropout:          f64,
    #[config(default = 0.9997)]
    pub batch_norm_decay: f64,
    #[config(default = 1e-3)]
    pub batch_norm_epsilon: f64,
}

/// Output side of a 3x3, stride 2, pad 1 max pool.
fn pooled(side: usize) -> usize {
    (side.max(1) - 1) / 2 + 1
}

impl CifarNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> CifarNet<B> {
        let conv = |cin, cout| {
            Conv2dConfig::new([cin, cout], [5, 5])
                .with_padding(PaddingConfig2d::Same)
                .init(device)
        };
        // burn's momentum weights the new batch statistic, i.e. 1 - decay
        let norm = || {
            BatchNormConfig::new(64)
                .with_epsilon(self.batch_norm_epsilon)
                .with_momentum(1.0 - self.batch_norm_decay)
                .init(device)
        };
        let flat = pooled(pooled(self.height)) * pooled(pooled(self.width)) * 64;
        CifarNet {
            conv1:   conv(self.channels, 64),
            norm1:   norm(),
            conv2:   conv(64, 64),
            norm2:   norm(),
            pool:    MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            fc3:     LinearConfig::new(flat, 384).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc4:     LinearConfig::new(384, 192).init(device),
            logits:  LinearConfig::new(192, self.num_classes).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct CifarNet<B: Backend> {
    pub conv1:   Conv2d<B>,
    pub norm1:   BatchNorm<B, 2>,
    pub conv2:   Conv2d<B>,
    pub norm2:   BatchNorm<B, 2>,
    pub pool:    MaxPool2d,
    pub fc3:     Linear<B>,
    pub dropout: Dropout,
    pub fc4:     Linear<B>,
    pub logits:  Linear<B>,
}

impl<B: Backend> ImageClassifier<B> for CifarNet<B> {
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(relu(self.norm1.forward(self.conv1.forward(images))));
        let x = self.pool.forward(relu(self.norm2.forward(self.conv2.forward(x))));
        let x = x.flatten::<2>(1, 3);
        let x = self.dropout.forward(relu(self.fc3.forward(x)));
        let x = relu(self.fc4.forward(x));
        self.logits.forward(x)
    }
}

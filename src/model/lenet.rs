//! LeNet-Style Binary Classifier
//!
//! The exploratory convolutional classifier that predates the segmentation
//! model: two valid-padded conv/batch-norm/max-pool blocks, two dense layers
//! with batch normalization, and a single sigmoid output unit. Standalone;
//! it does not participate in the segmentation pipeline.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig,
        PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

use crate::utils::error::{PetSegError, Result};

/// Configuration for the LeNet classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeNetConfig {
    /// Input image size (assumes square images)
    pub image_size: usize,
    /// Number of input channels (3 for RGB)
    pub input_channels: usize,
    /// Filters in the first conv block; the second uses `2 * filters + 4`
    pub filters: usize,
    /// Convolution kernel size (valid padding)
    pub kernel_size: usize,
    /// Convolution stride
    pub strides: usize,
    /// Max-pool window; pool stride is `2 * strides`
    pub pool_size: usize,
    /// Units in the two dense layers
    pub dense_units: [usize; 2],
    /// Dropout rate after the first conv block and first dense layer
    pub dropout: f64,
}

impl Default for LeNetConfig {
    fn default() -> Self {
        Self {
            image_size: 128,
            input_channels: 3,
            filters: 6,
            kernel_size: 3,
            strides: 1,
            pool_size: 2,
            dense_units: [100, 10],
            dropout: 0.2,
        }
    }
}

impl LeNetConfig {
    /// Spatial size after one valid conv + max-pool block
    fn block_output(&self, input: usize) -> Option<usize> {
        let conv = input.checked_sub(self.kernel_size)? / self.strides + 1;
        let pool = conv.checked_sub(self.pool_size)? / (2 * self.strides) + 1;
        (pool > 0).then_some(pool)
    }

    /// Flattened feature count entering the dense head
    fn flat_features(&self) -> Result<usize> {
        let after_first = self
            .block_output(self.image_size)
            .and_then(|s| self.block_output(s))
            .ok_or_else(|| {
                PetSegError::Configuration(format!(
                    "image size {} too small for two conv/pool blocks",
                    self.image_size
                ))
            })?;
        Ok(after_first * after_first * (2 * self.filters + 4))
    }
}

/// LeNet-style binary classifier
#[derive(Module, Debug)]
pub struct LeNetClassifier<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    pool1: MaxPool2d,
    dropout1: Dropout,

    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    pool2: MaxPool2d,

    fc1: Linear<B>,
    bn_fc1: BatchNorm<B, 1>,
    dropout2: Dropout,

    fc2: Linear<B>,
    bn_fc2: BatchNorm<B, 1>,

    output: Linear<B>,
    relu: Relu,
}

impl<B: Backend> LeNetClassifier<B> {
    /// Create a classifier from configuration
    pub fn new(config: &LeNetConfig, device: &B::Device) -> Result<Self> {
        let flat = config.flat_features()?;
        let second_filters = 2 * config.filters + 4;
        let k = config.kernel_size;
        let s = config.strides;

        let conv = |in_ch: usize, out_ch: usize| {
            Conv2dConfig::new([in_ch, out_ch], [k, k])
                .with_stride([s, s])
                .with_padding(PaddingConfig2d::Valid)
                .init(device)
        };
        let pool = || {
            MaxPool2dConfig::new([config.pool_size, config.pool_size])
                .with_strides([2 * s, 2 * s])
                .init()
        };

        Ok(Self {
            conv1: conv(config.input_channels, config.filters),
            bn1: BatchNormConfig::new(config.filters).init(device),
            pool1: pool(),
            dropout1: DropoutConfig::new(config.dropout).init(),

            conv2: conv(config.filters, second_filters),
            bn2: BatchNormConfig::new(second_filters).init(device),
            pool2: pool(),

            fc1: LinearConfig::new(flat, config.dense_units[0]).init(device),
            bn_fc1: BatchNormConfig::new(config.dense_units[0]).init(device),
            dropout2: DropoutConfig::new(config.dropout).init(),

            fc2: LinearConfig::new(config.dense_units[0], config.dense_units[1]).init(device),
            bn_fc2: BatchNormConfig::new(config.dense_units[1]).init(device),

            output: LinearConfig::new(config.dense_units[1], 1).init(device),
            relu: Relu::new(),
        })
    }

    /// Batch-normalize the output of a dense layer; BatchNorm expects a
    /// trailing spatial dim
    fn dense_bn(bn: &BatchNorm<B, 1>, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let [n, f] = x.dims();
        bn.forward(x.reshape([n, f, 1])).reshape([n, f])
    }

    /// Forward pass returning a raw score per sample, shape [batch_size, 1]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.bn1.forward(x);
        let x = self.relu.forward(x);
        let x = self.pool1.forward(x);
        let x = self.dropout1.forward(x);

        let x = self.conv2.forward(x);
        let x = self.bn2.forward(x);
        let x = self.relu.forward(x);
        let x = self.pool2.forward(x);

        let [n, c, h, w] = x.dims();
        let x = x.reshape([n, c * h * w]);

        let x = self.fc1.forward(x);
        let x = Self::dense_bn(&self.bn_fc1, x);
        let x = self.relu.forward(x);
        let x = self.dropout2.forward(x);

        let x = self.fc2.forward(x);
        let x = Self::dense_bn(&self.bn_fc2, x);
        let x = self.relu.forward(x);

        self.output.forward(x)
    }

    /// Forward pass with sigmoid applied, for probability output
    pub fn forward_probability(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        burn::tensor::activation::sigmoid(self.forward(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;

    type B = DefaultBackend;

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let config = LeNetConfig {
            image_size: 32,
            ..Default::default()
        };
        let model = LeNetClassifier::<B>::new(&config, &device).unwrap();

        let input = Tensor::<B, 4>::zeros([2, 3, 32, 32], &device);
        let output = model.forward(input);
        assert_eq!(output.dims(), [2, 1]);
    }

    #[test]
    fn test_probability_in_unit_interval() {
        let device = Default::default();
        let config = LeNetConfig {
            image_size: 32,
            ..Default::default()
        };
        let model = LeNetClassifier::<B>::new(&config, &device).unwrap();

        let input = Tensor::<B, 4>::random(
            [3, 3, 32, 32],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let probs = model
            .forward_probability(input)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert!(probs.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_too_small_image_rejected() {
        let device: <B as Backend>::Device = Default::default();
        let config = LeNetConfig {
            image_size: 4,
            ..Default::default()
        };
        assert!(LeNetClassifier::<B>::new(&config, &device).is_err());
    }
}

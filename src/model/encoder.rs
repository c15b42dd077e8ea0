//! Frozen Encoder with Named Tap Points
//!
//! A fixed five-stage convolutional feature extractor standing in for a
//! pretrained image-classification backbone (classification head excluded).
//! Each stage halves the spatial resolution and is addressable by name;
//! the encoder exposes the activation maps at the configured tap points,
//! ordered shallow (high resolution) to deep (low resolution).
//!
//! All backbone parameters are non-trainable: only the decoder learns.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    record::CompactRecorder,
    tensor::{backend::Backend, Tensor},
};
use tracing::info;

use crate::config::ModelConfig;
use crate::utils::error::{PetSegError, Result};

/// Names of the backbone stages, shallow to deep. Stage `i` runs at
/// stride `2^(i+1)` relative to the input.
pub const STAGE_NAMES: [&str; 5] = [
    "down1_relu",
    "down2_relu",
    "down3_relu",
    "down4_relu",
    "down5_relu",
];

/// Output channels of each backbone stage
pub const STAGE_CHANNELS: [usize; 5] = [32, 64, 128, 192, 256];

/// One stride-2 downsampling stage: Conv2d, BatchNorm, ReLU
#[derive(Module, Debug)]
pub struct DownBlock<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    relu: Relu,
}

impl<B: Backend> DownBlock<B> {
    fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);

        Self {
            conv,
            bn,
            relu: Relu::new(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        self.relu.forward(x)
    }
}

/// The fixed backbone: five named downsampling stages
#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    blocks: Vec<DownBlock<B>>,
}

impl<B: Backend> Backbone<B> {
    /// Build the backbone with randomly initialized weights
    pub fn new(input_channels: usize, device: &B::Device) -> Self {
        let mut blocks = Vec::with_capacity(STAGE_CHANNELS.len());
        let mut in_channels = input_channels;
        for &out_channels in &STAGE_CHANNELS {
            blocks.push(DownBlock::new(in_channels, out_channels, device));
            in_channels = out_channels;
        }
        Self { blocks }
    }

    /// Resolve a stage name to its index
    pub fn stage_index(name: &str) -> Option<usize> {
        STAGE_NAMES.iter().position(|&n| n == name)
    }

    /// Run all stages, returning every intermediate activation map,
    /// shallow to deep
    pub fn forward_stages(&self, x: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        let mut outputs = Vec::with_capacity(self.blocks.len());
        let mut x = x;
        for block in &self.blocks {
            x = block.forward(x);
            outputs.push(x.clone());
        }
        outputs
    }
}

/// The encoder's multi-resolution output: skip-connection sources
/// (shallow to deep) plus the bottleneck entry point for the decoder
#[derive(Debug)]
pub struct EncoderFeatures<B: Backend> {
    /// Skip feature maps, shallow to deep (all taps except the deepest)
    pub skips: Vec<Tensor<B, 4>>,
    /// The deepest (lowest-resolution) feature map
    pub bottleneck: Tensor<B, 4>,
}

/// Frozen backbone plus resolved tap points
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    backbone: Backbone<B>,
    tap_indices: Vec<usize>,
}

impl<B: Backend> Encoder<B> {
    /// Build the encoder: instantiate the backbone, optionally load
    /// pretrained weights, resolve tap names, and freeze all parameters.
    ///
    /// Fails with `UnknownTapPoint` if a configured name does not exist in
    /// the backbone, and with `Configuration` if the taps are not ordered
    /// shallow to deep.
    pub fn build(config: &ModelConfig, device: &B::Device) -> Result<Self> {
        let mut backbone = Backbone::new(config.input_channels, device);

        if let Some(path) = &config.pretrained_weights {
            info!("Loading pretrained backbone weights from {:?}", path);
            backbone = backbone
                .load_file(path, &CompactRecorder::new(), device)
                .map_err(|e| {
                    PetSegError::Configuration(format!(
                        "failed to load pretrained backbone weights from {:?}: {}",
                        path, e
                    ))
                })?;
        }

        let mut tap_indices = Vec::with_capacity(config.tap_points.len());
        for name in &config.tap_points {
            let index = Backbone::<B>::stage_index(name).ok_or_else(|| {
                PetSegError::UnknownTapPoint {
                    name: name.clone(),
                    available: STAGE_NAMES.iter().map(|s| s.to_string()).collect(),
                }
            })?;
            tap_indices.push(index);
        }

        if !tap_indices.windows(2).all(|w| w[0] < w[1]) {
            return Err(PetSegError::Configuration(format!(
                "tap points must be ordered shallow to deep, got {:?}",
                config.tap_points
            )));
        }

        Ok(Self {
            // frozen: gradients never flow into the backbone
            backbone: backbone.no_grad(),
            tap_indices,
        })
    }

    /// Stride of each tap relative to the input, shallow to deep
    pub fn tap_strides(&self) -> Vec<usize> {
        self.tap_indices.iter().map(|&i| 1 << (i + 1)).collect()
    }

    /// Output channels of each tap, shallow to deep
    pub fn tap_channels(&self) -> Vec<usize> {
        self.tap_indices.iter().map(|&i| STAGE_CHANNELS[i]).collect()
    }

    /// Number of configured tap points
    pub fn num_taps(&self) -> usize {
        self.tap_indices.len()
    }

    /// Produce the feature maps at the configured tap points
    pub fn forward(&self, x: Tensor<B, 4>) -> EncoderFeatures<B> {
        let stages = self.backbone.forward_stages(x);
        let mut taps: Vec<Tensor<B, 4>> = self
            .tap_indices
            .iter()
            .map(|&i| stages[i].clone())
            .collect();

        // tap_indices is validated non-empty at build time
        let bottleneck = taps.pop().expect("encoder has at least one tap");
        EncoderFeatures {
            skips: taps,
            bottleneck,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;

    type B = DefaultBackend;

    #[test]
    fn test_stage_index_lookup() {
        assert_eq!(Backbone::<B>::stage_index("down1_relu"), Some(0));
        assert_eq!(Backbone::<B>::stage_index("down5_relu"), Some(4));
        assert_eq!(Backbone::<B>::stage_index("block_1_expand_relu"), None);
    }

    #[test]
    fn test_encoder_emits_five_resolutions() {
        let device = Default::default();
        let config = ModelConfig::default();
        let encoder = Encoder::<B>::build(&config, &device).unwrap();

        let input = Tensor::<B, 4>::zeros([1, 3, 64, 64], &device);
        let features = encoder.forward(input);

        assert_eq!(features.skips.len(), 4);
        let sizes: Vec<usize> = features.skips.iter().map(|t| t.dims()[2]).collect();
        assert_eq!(sizes, vec![32, 16, 8, 4]);
        assert_eq!(features.bottleneck.dims(), [1, 256, 2, 2]);
    }

    #[test]
    fn test_misspelled_tap_point_fails() {
        let device: <B as Backend>::Device = Default::default();
        let config = ModelConfig {
            tap_points: vec![
                "down1_relu".to_string(),
                "down2_relu".to_string(),
                "down3_relu".to_string(),
                "down4_relu".to_string(),
                "down9_relu".to_string(),
            ],
            ..Default::default()
        };

        let err = Encoder::<B>::build(&config, &device).unwrap_err();
        match err {
            PetSegError::UnknownTapPoint { name, available } => {
                assert_eq!(name, "down9_relu");
                assert_eq!(available.len(), 5);
            }
            other => panic!("expected UnknownTapPoint, got {:?}", other),
        }
    }

    #[test]
    fn test_unordered_taps_fail() {
        let device: <B as Backend>::Device = Default::default();
        let config = ModelConfig {
            tap_points: vec![
                "down2_relu".to_string(),
                "down1_relu".to_string(),
                "down3_relu".to_string(),
            ],
            up_channels: vec![64, 32],
            ..Default::default()
        };

        let err = Encoder::<B>::build(&config, &device).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_tap_strides_and_channels() {
        let device = Default::default();
        let config = ModelConfig::default();
        let encoder = Encoder::<B>::build(&config, &device).unwrap();

        assert_eq!(encoder.tap_strides(), vec![2, 4, 8, 16, 32]);
        assert_eq!(encoder.tap_channels(), vec![32, 64, 128, 192, 256]);
    }
}

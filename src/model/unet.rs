//! U-Net Model Assembly
//!
//! Composes the frozen encoder and the learned decoder stages into a single
//! image-to-pixel-map model: the deepest encoder feature map enters the
//! decoder, each upsampling stage concatenates its output channel-wise with
//! the matching skip feature map, and a final transposed convolution maps to
//! raw per-class scores at full input resolution. No output activation: the
//! loss applies its own normalization.

use burn::{
    module::Module,
    nn::conv::ConvTranspose2d,
    tensor::{backend::Backend, Tensor},
};
use tracing::info;

use crate::config::ModelConfig;
use crate::model::decoder::{upsample_conv, UpBlock};
use crate::model::encoder::Encoder;
use crate::utils::error::{PetSegError, Result};

/// Encoder-decoder segmentation model
#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    encoder: Encoder<B>,
    up_stack: Vec<UpBlock<B>>,
    head: ConvTranspose2d<B>,
    output_classes: usize,
}

impl<B: Backend> UNet<B> {
    /// Assemble the model for a given input resolution.
    ///
    /// All concatenation shapes are validated here by arithmetic over the
    /// encoder tap strides, so a misconfiguration fails before any data is
    /// touched: every upsampled output must exactly match its paired skip
    /// map, and the final stage must land back on the input resolution.
    pub fn build(config: &ModelConfig, image_size: usize, device: &B::Device) -> Result<Self> {
        config.validate()?;

        let encoder = Encoder::build(config, device)?;
        let strides = encoder.tap_strides();
        let channels = encoder.tap_channels();
        let num_taps = encoder.num_taps();

        // spatial size of each tap for this input resolution
        let mut sizes = Vec::with_capacity(num_taps);
        for &stride in &strides {
            if image_size % stride != 0 {
                return Err(PetSegError::Configuration(format!(
                    "image size {} is not divisible by encoder stride {}",
                    image_size, stride
                )));
            }
            sizes.push(image_size / stride);
        }

        // walk the decoder: each stage doubles the running resolution and
        // must meet the next-shallower skip map exactly
        let mut current_size = sizes[num_taps - 1];
        let mut current_channels = channels[num_taps - 1];
        let mut up_stack = Vec::with_capacity(config.up_channels.len());

        for (stage, &out_channels) in config.up_channels.iter().enumerate() {
            let upsampled = current_size * 2;
            let skip_index = num_taps - 2 - stage;
            let skip_size = sizes[skip_index];

            if upsampled != skip_size {
                return Err(PetSegError::ShapeMismatch {
                    stage,
                    upsampled: [upsampled, upsampled],
                    skip: [skip_size, skip_size],
                });
            }

            up_stack.push(UpBlock::new(
                current_channels,
                out_channels,
                config.kernel_size,
                config.dropout,
                device,
            ));
            current_size = upsampled;
            current_channels = out_channels + channels[skip_index];
        }

        let final_size = current_size * 2;
        if final_size != image_size {
            return Err(PetSegError::Configuration(format!(
                "final stage produces {}x{} but the input is {}x{}",
                final_size, final_size, image_size, image_size
            )));
        }

        let head = upsample_conv(
            current_channels,
            config.output_classes,
            config.kernel_size,
            device,
        );

        info!(
            "U-Net assembled: {} decoder stages, {} output classes, input {}x{}",
            up_stack.len(),
            config.output_classes,
            image_size,
            image_size
        );

        Ok(Self {
            encoder,
            up_stack,
            head,
            output_classes: config.output_classes,
        })
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, size, size]
    ///
    /// # Returns
    /// * Raw per-class scores of shape [batch_size, classes, size, size]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let features = self.encoder.forward(x);

        let mut x = features.bottleneck;
        // skip sources run deep to shallow, one per stage
        for (up, skip) in self.up_stack.iter().zip(features.skips.into_iter().rev()) {
            x = up.forward(x);
            x = Tensor::cat(vec![x, skip], 1);
        }

        self.head.forward(x)
    }

    /// Number of per-pixel output classes
    pub fn output_classes(&self) -> usize {
        self.output_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::backend::DefaultBackend;

    type B = DefaultBackend;

    /// Small decoder so tests stay fast
    fn small_config() -> ModelConfig {
        ModelConfig {
            up_channels: vec![48, 32, 24, 16],
            ..Default::default()
        }
    }

    #[test]
    fn test_output_shape_matches_input_resolution() {
        let device = Default::default();
        let model = UNet::<B>::build(&small_config(), 64, &device).unwrap();

        let input = Tensor::<B, 4>::zeros([2, 3, 64, 64], &device);
        let output = model.forward(input);
        assert_eq!(output.dims(), [2, 3, 64, 64]);
        assert_eq!(model.output_classes(), 3);
    }

    #[test]
    fn test_indivisible_image_size_fails() {
        let device: <B as Backend>::Device = Default::default();
        let err = UNet::<B>::build(&small_config(), 100, &device).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_non_consecutive_taps_fail_with_shape_mismatch() {
        let device: <B as Backend>::Device = Default::default();
        // down3 is skipped: tap sizes are [32, 16, 4, 2], so the second
        // upsample lands at 8 while its paired skip map sits at 16
        let config = ModelConfig {
            tap_points: vec![
                "down1_relu".to_string(),
                "down2_relu".to_string(),
                "down4_relu".to_string(),
                "down5_relu".to_string(),
            ],
            up_channels: vec![32, 24, 16],
            ..Default::default()
        };

        let err = UNet::<B>::build(&config, 64, &device).unwrap_err();
        match err {
            PetSegError::ShapeMismatch { stage, upsampled, skip } => {
                assert_eq!(stage, 1);
                assert_eq!(upsampled, [8, 8]);
                assert_eq!(skip, [16, 16]);
            }
            other => panic!("expected ShapeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_misspelled_tap_fails_before_data_is_touched() {
        let device: <B as Backend>::Device = Default::default();
        let config = ModelConfig {
            tap_points: vec![
                "down1_relu".to_string(),
                "down2_relu".to_string(),
                "down3_relu".to_string(),
                "down4_relu".to_string(),
                "block_16_project".to_string(),
            ],
            ..Default::default()
        };

        let err = UNet::<B>::build(&config, 64, &device).unwrap_err();
        assert!(matches!(err, PetSegError::UnknownTapPoint { .. }));
    }

    #[test]
    fn test_custom_output_classes() {
        let device = Default::default();
        let config = ModelConfig {
            output_classes: 5,
            ..small_config()
        };
        let model = UNet::<B>::build(&config, 32, &device).unwrap();

        let input = Tensor::<B, 4>::zeros([1, 3, 32, 32], &device);
        assert_eq!(model.forward(input).dims(), [1, 5, 32, 32]);
    }
}

//! Model module: encoder/decoder assembly and model variants
//!
//! The U-Net is the only concrete segmentation variant; variants form a
//! closed, tagged set of build strategies rather than an open hierarchy,
//! since no polymorphic dispatch occurs at runtime. The LeNet classifier is
//! a standalone exploratory model outside the segmentation pipeline.

pub mod decoder;
pub mod encoder;
pub mod lenet;
pub mod unet;

use serde::{Deserialize, Serialize};

// Re-export main types for convenience
pub use decoder::UpBlock;
pub use encoder::{Backbone, Encoder, EncoderFeatures, STAGE_CHANNELS, STAGE_NAMES};
pub use lenet::{LeNetClassifier, LeNetConfig};
pub use unet::UNet;

/// Closed set of segmentation build strategies
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ModelVariant {
    /// Frozen encoder with learned upsampling decoder
    #[default]
    UNet,
}

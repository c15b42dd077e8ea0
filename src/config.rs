//! Pipeline Configuration Module
//!
//! Strongly-typed, nested configuration for the segmentation pipeline.
//! The configuration is immutable for the duration of one run, created and
//! validated before any component executes; every field access downstream is
//! a compile-time-checked member access.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::{encoder, ModelVariant};
use crate::utils::error::{PetSegError, Result};
use crate::{DEFAULT_IMAGE_SIZE, DEFAULT_MASK_LABEL_OFFSET, DEFAULT_OUTPUT_CLASSES};

/// Top-level configuration for one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    /// Dataset location and preprocessing parameters
    pub data: DataConfig,

    /// Model architecture parameters
    pub model: ModelConfig,

    /// Training loop parameters
    pub train: TrainConfig,
}

impl PipelineConfig {
    /// Validate every section; called once before the pipeline runs
    pub fn validate(&self) -> Result<()> {
        self.data.validate()?;
        self.model.validate()?;
        self.train.validate()
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}

/// Dataset and preprocessing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Name of the dataset (used in error reporting)
    pub name: String,

    /// Root directory of the on-disk dataset
    pub root: PathBuf,

    /// Target square size images and masks are resized to
    pub image_size: usize,

    /// Shift applied to raw mask labels during normalization.
    /// The source trimaps are 1-based; -1 converts them to 0-based class
    /// indices. Explicit and configurable so tests can pin its semantics.
    pub mask_label_offset: i64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            name: "oxford_iiit_pet".to_string(),
            root: PathBuf::from("data/oxford_iiit_pet"),
            image_size: DEFAULT_IMAGE_SIZE,
            mask_label_offset: DEFAULT_MASK_LABEL_OFFSET,
        }
    }
}

impl DataConfig {
    /// Validate the data configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(PetSegError::Configuration(
                "dataset name must not be empty".to_string(),
            ));
        }
        if self.image_size == 0 {
            return Err(PetSegError::Configuration(
                "image_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Model architecture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Which build strategy to use (closed set; U-Net is the only
    /// segmentation variant)
    pub variant: ModelVariant,

    /// Number of input channels (3 for RGB)
    pub input_channels: usize,

    /// Number of per-pixel output classes
    pub output_classes: usize,

    /// Named encoder activation points, ordered shallow to deep.
    /// Must exist in the backbone or `build` fails.
    pub tap_points: Vec<String>,

    /// Output channels of each decoder upsampling stage, deep to shallow
    pub up_channels: Vec<usize>,

    /// Kernel size for transposed convolutions
    pub kernel_size: usize,

    /// Optional dropout rate inside decoder stages
    pub dropout: Option<f64>,

    /// Optional Burn record file with pretrained backbone weights
    pub pretrained_weights: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            variant: ModelVariant::UNet,
            input_channels: 3,
            output_classes: DEFAULT_OUTPUT_CLASSES,
            tap_points: encoder::STAGE_NAMES.iter().map(|s| s.to_string()).collect(),
            up_channels: vec![512, 256, 128, 64],
            kernel_size: 3,
            dropout: None,
            pretrained_weights: None,
        }
    }
}

impl ModelConfig {
    /// Validate the model configuration
    pub fn validate(&self) -> Result<()> {
        if self.input_channels == 0 {
            return Err(PetSegError::Configuration(
                "input_channels must be greater than 0".to_string(),
            ));
        }
        if self.output_classes == 0 {
            return Err(PetSegError::Configuration(
                "output_classes must be greater than 0".to_string(),
            ));
        }
        if self.tap_points.len() < 2 {
            return Err(PetSegError::Configuration(
                "at least two encoder tap points are required".to_string(),
            ));
        }
        if self.up_channels.len() + 1 != self.tap_points.len() {
            return Err(PetSegError::Configuration(format!(
                "{} decoder stages configured for {} tap points (expected one fewer)",
                self.up_channels.len(),
                self.tap_points.len()
            )));
        }
        if self.up_channels.iter().any(|&c| c == 0) {
            return Err(PetSegError::Configuration(
                "decoder stage channel counts must be greater than 0".to_string(),
            ));
        }
        if self.kernel_size < 2 {
            return Err(PetSegError::Configuration(
                "kernel_size must be at least 2 for 2x upsampling".to_string(),
            ));
        }
        if let Some(rate) = self.dropout {
            if !(0.0..1.0).contains(&rate) {
                return Err(PetSegError::Configuration(
                    "dropout must be in range [0.0, 1.0)".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Training loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Batch size for training and validation
    pub batch_size: usize,

    /// Bounded shuffle-buffer size for the training stream
    pub buffer_size: usize,

    /// Number of training epochs
    pub epochs: usize,

    /// Divisor controlling how much of the test split is used per
    /// validation pass within an epoch
    pub val_subsplits: usize,

    /// Learning rate passed to the optimizer
    pub learning_rate: f64,

    /// Optimizer selected by name
    pub optimizer: OptimizerKind,

    /// Metrics computed on the validation pass each epoch
    pub metrics: Vec<MetricKind>,

    /// Random seed for shuffling and augmentation
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            buffer_size: 1000,
            epochs: 20,
            val_subsplits: 5,
            learning_rate: 1e-3,
            optimizer: OptimizerKind::Adam,
            metrics: vec![MetricKind::PixelAccuracy],
            seed: 42,
        }
    }
}

impl TrainConfig {
    /// Validate the training configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PetSegError::Configuration(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(PetSegError::Configuration(
                "buffer_size must be greater than 0".to_string(),
            ));
        }
        if self.epochs == 0 {
            return Err(PetSegError::Configuration(
                "epochs must be greater than 0".to_string(),
            ));
        }
        if self.val_subsplits == 0 {
            return Err(PetSegError::Configuration(
                "val_subsplits must be greater than 0".to_string(),
            ));
        }
        if self.learning_rate <= 0.0 {
            return Err(PetSegError::Configuration(
                "learning_rate must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Supported optimizers, identified by name in configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum OptimizerKind {
    #[default]
    Adam,
    Sgd,
    RmsProp,
}

/// Validation metrics computable by the trainer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MetricKind {
    /// Fraction of pixels assigned the correct class
    PixelAccuracy,
    /// Mean intersection-over-union across classes
    MeanIou,
}

impl MetricKind {
    /// Stable name used in logs and history records
    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::PixelAccuracy => "pixel_accuracy",
            MetricKind::MeanIou => "mean_iou",
        }
    }
}

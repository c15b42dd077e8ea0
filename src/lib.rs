//! # petseg - U-Net Semantic Segmentation Pipeline
//!
//! A Rust library for training an encoder-decoder segmentation model on
//! image/mask pairs using the Burn framework.
//!
//! ## Features
//!
//! - **U-Net architecture** with a frozen convolutional encoder exposing five
//!   named tap points and four learned transposed-convolution decoder stages
//! - **Lazy data pipeline**: cached preprocessing, bounded shuffle buffer,
//!   infinite repeating training stream, single-pass test stream
//! - **Typed configuration** validated once at load time
//! - **Burn framework** for portable tensor computation and autodiff
//!
//! ## Modules
//!
//! - `dataset`: loading, preprocessing, augmentation, and batch streams
//! - `model`: encoder/decoder assembly and the standalone LeNet classifier
//! - `training`: fixed-epoch fit loop with per-epoch loss history
//! - `inference`: single-batch prediction for qualitative inspection
//! - `pipeline`: load -> build -> train -> evaluate orchestration
//! - `utils`: error types, logging, segmentation metrics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use petseg::backend::{default_device, TrainingBackend};
//! use petseg::config::PipelineConfig;
//! use petseg::pipeline::SegmentationPipeline;
//!
//! let config = PipelineConfig::default();
//! let mut pipeline = SegmentationPipeline::<TrainingBackend>::new(config, default_device())?;
//! pipeline.load_data()?;
//! pipeline.build()?;
//! let history = pipeline.train()?;
//! let prediction = pipeline.evaluate()?;
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod pipeline;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::{DataConfig, MetricKind, ModelConfig, OptimizerKind, PipelineConfig, TrainConfig};
pub use dataset::loader::{DatasetInfo, DatasetSplits, SamplePair, SegSample};
pub use dataset::preprocess::SegItem;
pub use dataset::stream::{SegBatch, TestStream, TrainStream};
pub use inference::predictor::{predict_sample, predicted_labels, Prediction};
pub use model::lenet::{LeNetClassifier, LeNetConfig};
pub use model::unet::UNet;
pub use model::ModelVariant;
pub use pipeline::SegmentationPipeline;
pub use training::trainer::{EpochRecord, History, TrainSchedule, Trainer};
pub use utils::error::{PetSegError, Result};
pub use utils::metrics::SegmentationMetrics;

/// Default square input resolution for the segmentation pipeline
pub const DEFAULT_IMAGE_SIZE: usize = 128;

/// Default number of per-pixel output classes (pet / border / background)
pub const DEFAULT_OUTPUT_CLASSES: usize = 3;

/// Default mask label shift applied during normalization.
///
/// The source dataset encodes trimap labels 1-based; the loss expects 0-based
/// class indices. The shift is an explicit, configurable preprocessing step
/// so its semantics can be pinned by tests.
pub const DEFAULT_MASK_LABEL_OFFSET: i64 = -1;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

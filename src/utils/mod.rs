//! Utility modules: error types, logging, segmentation metrics

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{PetSegError, Result};
pub use logging::{init_default_logging, init_logging, LogConfig, LogLevel};
pub use metrics::SegmentationMetrics;

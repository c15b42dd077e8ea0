//! Dataset module for segmentation data handling
//!
//! This module provides:
//! - Loading the on-disk dataset into named train/test splits
//! - Resize / joint-flip / normalize preprocessing of image-mask pairs
//! - Lazy batch streams: an infinite shuffled training stream and a
//!   single-pass test stream
//!
//! Preprocessing is pull-based: batches are materialized on demand, and
//! output ordering is determined solely by the shuffle/caching policy.

pub mod loader;
pub mod preprocess;
pub mod stream;

// Re-export main types for convenience
pub use loader::{DatasetInfo, DatasetSplits, SamplePair, SegSample};
pub use preprocess::{prepare_test, prepare_train, SegItem};
pub use stream::{SegBatch, TestStream, TrainStream};

//! Inference module: single-batch prediction on held-out samples

pub mod predictor;

pub use predictor::{predict_sample, predicted_labels, Prediction};

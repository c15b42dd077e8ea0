//! Backend abstraction - CPU NdArray backend
//!
//! The pipeline is single-threaded and synchronous; the portable NdArray
//! backend keeps training and inference runnable on any machine.

use burn::backend::{Autodiff, NdArray};

/// The default inference backend
pub type DefaultBackend = NdArray<f32>;

/// The default autodiff backend for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Get the default device
pub fn default_device() -> <DefaultBackend as burn::tensor::backend::Backend>::Device {
    burn::backend::ndarray::NdArrayDevice::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    "NdArray (CPU)"
}

//! Error Handling Module
//!
//! Defines custom error types for the petseg library.
//! Uses thiserror for ergonomic error definitions.
//!
//! There are no retries anywhere in this crate: every error is fatal to the
//! current `load`/`build`/`train` call and propagates to the caller with
//! enough context (tap name, shape pair) to diagnose.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for petseg operations
#[derive(Error, Debug)]
pub enum PetSegError {
    /// The named dataset could not be located or is unusable
    #[error("dataset '{name}' unavailable: {reason}")]
    DataUnavailable { name: String, reason: String },

    /// Invalid or inconsistent configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A configured encoder tap-point name does not exist in the backbone
    #[error("unknown encoder tap point '{name}' (available: {available:?})")]
    UnknownTapPoint {
        name: String,
        available: Vec<String>,
    },

    /// Spatial shapes disagree at a decoder concatenation
    #[error(
        "decoder stage {stage}: upsampled shape {upsampled:?} does not match skip shape {skip:?}"
    )]
    ShapeMismatch {
        stage: usize,
        upsampled: [usize; 2],
        skip: [usize; 2],
    },

    /// Out of memory during model construction or batch materialization.
    /// Surfaced, never recovered.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Error loading or decoding an image file
    #[error("failed to load image '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PetSegError {
    /// Whether this error belongs to the configuration family
    /// (bad tap name, shape mismatch, zero-sized step counts, ...)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PetSegError::Configuration(_)
                | PetSegError::UnknownTapPoint { .. }
                | PetSegError::ShapeMismatch { .. }
        )
    }
}

/// Convenience Result type for petseg operations
pub type Result<T> = std::result::Result<T, PetSegError>;

//! Training module: fixed-epoch fit loop and schedule derivation

pub mod trainer;

pub use trainer::{per_pixel_cross_entropy, EpochRecord, History, TrainSchedule, Trainer};

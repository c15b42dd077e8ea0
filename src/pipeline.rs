//! Pipeline Orchestration
//!
//! End-to-end wiring of the segmentation workflow: load and cache the
//! dataset, assemble the model, run the fit loop, and predict one held-out
//! batch. Each stage checks that its prerequisites ran, so calling out of
//! order is a configuration error rather than a panic.

use tracing::info;

use crate::config::PipelineConfig;
use crate::dataset::loader::{self, DatasetInfo};
use crate::dataset::stream::{TestStream, TrainStream};
use crate::inference::predictor::{predict_sample, Prediction};
use crate::model::{ModelVariant, UNet};
use crate::training::trainer::{EpochRecord, History, TrainSchedule, Trainer};
use crate::utils::error::{PetSegError, Result};
use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;

/// Orchestrates load -> build -> train -> evaluate for one configuration
pub struct SegmentationPipeline<B: AutodiffBackend> {
    config: PipelineConfig,
    device: B::Device,
    info: Option<DatasetInfo>,
    train_stream: Option<TrainStream<B>>,
    test_stream: Option<TestStream<B::InnerBackend>>,
    model: Option<UNet<B>>,
    history: Option<History>,
}

impl<B: AutodiffBackend> SegmentationPipeline<B> {
    /// Create a pipeline from a validated configuration
    pub fn new(config: PipelineConfig, device: B::Device) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            device,
            info: None,
            train_stream: None,
            test_stream: None,
            model: None,
            history: None,
        })
    }

    /// Load the dataset from disk and cache both splits as batch streams
    pub fn load_data(&mut self) -> Result<&DatasetInfo> {
        let (splits, info) = loader::load(&self.config.data)?;

        self.train_stream = Some(TrainStream::prepare(
            &splits.train,
            &self.config.data,
            &self.config.train,
            &self.device,
        )?);
        self.test_stream = Some(TestStream::prepare(
            &splits.test,
            &self.config.data,
            &self.config.train,
            &self.device,
        )?);

        info!(
            "Dataset '{}' ready: {} train / {} test examples",
            info.name, info.train_examples, info.test_examples
        );
        Ok(self.info.insert(info))
    }

    /// Assemble the model for the configured variant and input resolution
    pub fn build(&mut self) -> Result<()> {
        let model = match self.config.model.variant {
            ModelVariant::UNet => {
                UNet::build(&self.config.model, self.config.data.image_size, &self.device)?
            }
        };
        self.model = Some(model);
        Ok(())
    }

    /// Train the assembled model on the loaded data
    pub fn train(&mut self) -> Result<&History> {
        self.train_with(|_| {})
    }

    /// Train with a per-epoch callback
    pub fn train_with<F>(&mut self, on_epoch: F) -> Result<&History>
    where
        F: FnMut(&EpochRecord),
    {
        let info = self.info.as_ref().ok_or_else(|| {
            PetSegError::Configuration("train requires load_data to run first".to_string())
        })?;
        let model = self.model.take().ok_or_else(|| {
            PetSegError::Configuration("train requires build to run first".to_string())
        })?;

        let schedule = TrainSchedule::from_info(info, &self.config.train)?;
        let trainer = Trainer::new(self.config.train.clone(), schedule, self.device.clone());

        // streams are present whenever info is
        let train_stream = self.train_stream.as_mut().ok_or_else(|| {
            PetSegError::Configuration("training stream missing".to_string())
        })?;
        let test_stream = self.test_stream.as_mut().ok_or_else(|| {
            PetSegError::Configuration("test stream missing".to_string())
        })?;

        let (trained, history) = trainer.fit(model, train_stream, test_stream, on_epoch)?;
        self.model = Some(trained);
        Ok(self.history.insert(history))
    }

    /// Predict one batch of held-out samples with the current model
    pub fn evaluate(&mut self) -> Result<Prediction<B::InnerBackend>> {
        let model = self.model.as_ref().ok_or_else(|| {
            PetSegError::Configuration("evaluate requires build to run first".to_string())
        })?;
        let test_stream = self.test_stream.as_mut().ok_or_else(|| {
            PetSegError::Configuration("evaluate requires load_data to run first".to_string())
        })?;

        predict_sample(&model.valid(), test_stream)
    }

    /// Configuration this pipeline runs with
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Dataset metadata, once loaded
    pub fn info(&self) -> Option<&DatasetInfo> {
        self.info.as_ref()
    }

    /// Training history, once trained
    pub fn history(&self) -> Option<&History> {
        self.history.as_ref()
    }

    /// Consume the pipeline, returning the model if one was built
    pub fn into_model(self) -> Option<UNet<B>> {
        self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    use crate::backend::TrainingBackend;
    use crate::config::{DataConfig, ModelConfig, TrainConfig};

    fn config_with_missing_root() -> PipelineConfig {
        PipelineConfig {
            data: DataConfig {
                root: PathBuf::from("/nonexistent/petseg-test-dataset"),
                image_size: 32,
                ..Default::default()
            },
            model: ModelConfig {
                up_channels: vec![16, 12, 8, 8],
                ..Default::default()
            },
            train: TrainConfig {
                batch_size: 2,
                buffer_size: 4,
                epochs: 1,
                val_subsplits: 1,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let mut config = config_with_missing_root();
        config.train.batch_size = 0;
        let Err(err) = SegmentationPipeline::<TrainingBackend>::new(config, Default::default())
        else {
            panic!("invalid configuration must be rejected");
        };
        assert!(err.is_configuration());
    }

    #[test]
    fn test_load_data_missing_root_is_data_unavailable() {
        let mut pipeline =
            SegmentationPipeline::<TrainingBackend>::new(config_with_missing_root(), Default::default())
                .unwrap();
        let err = pipeline.load_data().unwrap_err();
        assert!(matches!(err, PetSegError::DataUnavailable { .. }));
    }

    #[test]
    fn test_train_before_load_fails() {
        let mut pipeline =
            SegmentationPipeline::<TrainingBackend>::new(config_with_missing_root(), Default::default())
                .unwrap();
        pipeline.build().unwrap();

        let err = pipeline.train().unwrap_err();
        assert!(err.is_configuration());
        assert!(format!("{}", err).contains("load_data"));
    }

    #[test]
    fn test_evaluate_before_build_fails() {
        let mut pipeline =
            SegmentationPipeline::<TrainingBackend>::new(config_with_missing_root(), Default::default())
                .unwrap();
        let err = pipeline.evaluate().unwrap_err();
        assert!(err.is_configuration());
        assert!(format!("{}", err).contains("build"));
    }

    #[test]
    fn test_build_produces_model() {
        let mut pipeline =
            SegmentationPipeline::<TrainingBackend>::new(config_with_missing_root(), Default::default())
                .unwrap();
        pipeline.build().unwrap();
        assert!(pipeline.into_model().is_some());
    }
}

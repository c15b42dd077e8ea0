//! Training Loop
//!
//! Fixed-epoch fit loop for the segmentation model: per-pixel multi-class
//! cross-entropy on raw logits against integer labels, an optimizer selected
//! by name, and per-epoch training/validation loss history. Each epoch
//! consumes exactly `steps_per_epoch` batches from the infinite training
//! stream and `validation_steps` batches from the test stream.
//!
//! Per-epoch progress is reported through an injected callback; there is no
//! global experiment-tracking state.

use burn::{
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer, RmsPropConfig, SgdConfig},
    tensor::{backend::AutodiffBackend, backend::Backend, ElementConversion, Int, Tensor},
};
use tracing::debug;

use crate::config::{MetricKind, TrainConfig};
use crate::dataset::loader::DatasetInfo;
use crate::dataset::stream::{TestStream, TrainStream};
use crate::model::UNet;
use crate::utils::error::{PetSegError, Result};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::SegmentationMetrics;

/// Batch counts derived from split sizes; validated so a split smaller than
/// one batch fails fast instead of silently training on nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainSchedule {
    /// Training batches consumed per epoch (caps the infinite stream)
    pub steps_per_epoch: usize,
    /// Validation batches evaluated per epoch
    pub validation_steps: usize,
}

impl TrainSchedule {
    /// Derive the schedule from dataset metadata.
    ///
    /// Uses the same integer division as the streams' batch truncation, so
    /// the step counts and the batches actually yielded agree.
    pub fn from_info(info: &DatasetInfo, config: &TrainConfig) -> Result<Self> {
        let steps_per_epoch = info.train_examples / config.batch_size;
        let validation_steps = info.test_examples / config.batch_size / config.val_subsplits;

        if steps_per_epoch == 0 {
            return Err(PetSegError::Configuration(format!(
                "steps_per_epoch is 0: train split of {} examples is smaller than one batch of {}",
                info.train_examples, config.batch_size
            )));
        }
        if validation_steps == 0 {
            return Err(PetSegError::Configuration(format!(
                "validation_steps is 0: test split of {} examples cannot cover batch size {} \
                 with val_subsplits {}",
                info.test_examples, config.batch_size, config.val_subsplits
            )));
        }

        Ok(Self {
            steps_per_epoch,
            validation_steps,
        })
    }
}

/// Losses and metrics of one completed epoch
#[derive(Debug, Clone)]
pub struct EpochRecord {
    /// Epoch index, 0-based
    pub epoch: usize,
    /// Mean training loss over the epoch's steps
    pub train_loss: f64,
    /// Mean validation loss over the validation steps
    pub val_loss: f64,
    /// Configured metric values, in configuration order
    pub metrics: Vec<(&'static str, f64)>,
}

/// Per-epoch history of a completed fit, aligned by epoch index
#[derive(Debug, Clone, Default)]
pub struct History {
    /// Training loss per epoch
    pub train_loss: Vec<f64>,
    /// Validation loss per epoch
    pub val_loss: Vec<f64>,
    /// Metric value sequences, one per configured metric
    pub metrics: Vec<(&'static str, Vec<f64>)>,
}

impl History {
    fn record(&mut self, record: &EpochRecord) {
        self.train_loss.push(record.train_loss);
        self.val_loss.push(record.val_loss);
        for (i, &(name, value)) in record.metrics.iter().enumerate() {
            if self.metrics.len() <= i {
                self.metrics.push((name, Vec::new()));
            }
            self.metrics[i].1.push(value);
        }
    }

    /// Number of completed epochs
    pub fn epochs(&self) -> usize {
        self.train_loss.len()
    }
}

/// Per-pixel multi-class cross-entropy on raw logits and integer labels
pub fn per_pixel_cross_entropy<B: Backend>(
    logits: Tensor<B, 4>,
    targets: Tensor<B, 3, Int>,
) -> Tensor<B, 1> {
    let [n, c, h, w] = logits.dims();
    let flat_logits = logits.permute([0, 2, 3, 1]).reshape([n * h * w, c]);
    let flat_targets = targets.reshape([n * h * w]);

    CrossEntropyLossConfig::new()
        .init(&flat_logits.device())
        .forward(flat_logits, flat_targets)
}

/// Trainer for the segmentation model
pub struct Trainer<B: AutodiffBackend> {
    config: TrainConfig,
    schedule: TrainSchedule,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Create a trainer with a validated schedule
    pub fn new(config: TrainConfig, schedule: TrainSchedule, device: B::Device) -> Self {
        Self {
            config,
            schedule,
            device,
        }
    }

    /// Compile the configured optimizer and run the fit loop.
    ///
    /// Returns the trained model and the per-epoch history; `on_epoch` is
    /// invoked once per completed epoch.
    pub fn fit<F>(
        &self,
        model: UNet<B>,
        train: &mut TrainStream<B>,
        test: &mut TestStream<B::InnerBackend>,
        on_epoch: F,
    ) -> Result<(UNet<B>, History)>
    where
        F: FnMut(&EpochRecord),
    {
        match self.config.optimizer {
            crate::config::OptimizerKind::Adam => {
                self.run(model, AdamConfig::new().init(), train, test, on_epoch)
            }
            crate::config::OptimizerKind::Sgd => {
                self.run(model, SgdConfig::new().init(), train, test, on_epoch)
            }
            crate::config::OptimizerKind::RmsProp => {
                self.run(model, RmsPropConfig::new().init(), train, test, on_epoch)
            }
        }
    }

    fn run<O, F>(
        &self,
        mut model: UNet<B>,
        mut optimizer: O,
        train: &mut TrainStream<B>,
        test: &mut TestStream<B::InnerBackend>,
        mut on_epoch: F,
    ) -> Result<(UNet<B>, History)>
    where
        O: Optimizer<UNet<B>, B>,
        F: FnMut(&EpochRecord),
    {
        let mut history = History::default();
        let mut logger = TrainingLogger::new(self.config.epochs);

        for epoch in 0..self.config.epochs {
            logger.start_epoch(epoch);

            let mut total_loss = 0.0;
            for step in 0..self.schedule.steps_per_epoch {
                // the stream is infinite; the step cap is the epoch boundary
                let batch = train.next().ok_or_else(|| {
                    PetSegError::Configuration("training stream ended unexpectedly".to_string())
                })?;

                let logits = model.forward(batch.images);
                let loss = per_pixel_cross_entropy(logits, batch.masks);
                let loss_value: f64 = loss.clone().into_scalar().elem();
                total_loss += loss_value;

                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optimizer.step(self.config.learning_rate, model, grads);

                debug!(
                    "  step {}/{}: loss = {:.4}",
                    step + 1,
                    self.schedule.steps_per_epoch,
                    loss_value
                );
            }
            let train_loss = total_loss / self.schedule.steps_per_epoch as f64;

            let (val_loss, metrics) = self.validate(&model.valid(), test)?;

            let record = EpochRecord {
                epoch,
                train_loss,
                val_loss,
                metrics,
            };
            history.record(&record);
            logger.end_epoch(train_loss, val_loss);
            on_epoch(&record);
        }

        logger.finish();
        Ok((model, history))
    }

    /// One validation pass: `validation_steps` batches of loss and metrics
    fn validate(
        &self,
        model: &UNet<B::InnerBackend>,
        test: &mut TestStream<B::InnerBackend>,
    ) -> Result<(f64, Vec<(&'static str, f64)>)> {
        test.reset();

        let mut total_loss = 0.0;
        let mut stats = SegmentationMetrics::new(model.output_classes());

        for _ in 0..self.schedule.validation_steps {
            let batch = test.next().ok_or_else(|| {
                PetSegError::Configuration(
                    "test split exhausted before validation_steps batches".to_string(),
                )
            })?;

            let logits = model.forward(batch.images);
            let loss = per_pixel_cross_entropy(logits.clone(), batch.masks.clone());
            let loss_value: f64 = loss.into_scalar().elem();
            total_loss += loss_value;

            if !self.config.metrics.is_empty() {
                let predictions = logits.argmax(1).squeeze::<3>(1);
                let pred_vec: Vec<i64> = predictions.into_data().to_vec().unwrap();
                let target_vec: Vec<i64> = batch.masks.into_data().to_vec().unwrap();
                stats.update(&pred_vec, &target_vec);
            }
        }

        let val_loss = total_loss / self.schedule.validation_steps as f64;
        let metrics = self
            .config
            .metrics
            .iter()
            .map(|kind| {
                let value = match kind {
                    MetricKind::PixelAccuracy => stats.pixel_accuracy(),
                    MetricKind::MeanIou => stats.mean_iou(),
                };
                (kind.name(), value)
            })
            .collect();

        Ok((val_loss, metrics))
    }

    /// The validated schedule this trainer runs with
    pub fn schedule(&self) -> TrainSchedule {
        self.schedule
    }

    /// The device this trainer runs on
    pub fn device(&self) -> &B::Device {
        &self.device
    }
}

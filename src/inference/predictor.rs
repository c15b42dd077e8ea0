//! Single-Batch Prediction
//!
//! Qualitative evaluation of a trained model: run one batch of held-out
//! samples through the forward pass and return the inputs alongside the raw
//! per-class scores, ready for argmax and side-by-side display.

use burn::tensor::{backend::Backend, Int, Tensor};
use tracing::info;

use crate::dataset::stream::TestStream;
use crate::model::UNet;
use crate::utils::error::{PetSegError, Result};

/// One batch of inputs with the model's raw per-class scores
#[derive(Clone, Debug)]
pub struct Prediction<B: Backend> {
    /// Input images, shape [batch_size, 3, size, size]
    pub images: Tensor<B, 4>,
    /// Reference masks, shape [batch_size, size, size]
    pub masks: Tensor<B, 3, Int>,
    /// Raw per-class scores, shape [batch_size, classes, size, size]
    pub scores: Tensor<B, 4>,
}

/// Collapse raw scores to per-pixel class labels by taking the highest
/// scoring class at each position
pub fn predicted_labels<B: Backend>(scores: Tensor<B, 4>) -> Tensor<B, 3, Int> {
    scores.argmax(1).squeeze(1)
}

/// Run exactly one batch from the start of the test stream through the model.
///
/// The stream is rewound first so repeated calls inspect the same samples.
pub fn predict_sample<B: Backend>(
    model: &UNet<B>,
    stream: &mut TestStream<B>,
) -> Result<Prediction<B>> {
    stream.reset();
    let batch = stream.next().ok_or_else(|| {
        PetSegError::Configuration(
            "test stream holds fewer samples than one batch".to_string(),
        )
    })?;

    let [n, _, h, w] = batch.images.dims();
    info!("Predicting one batch of {} samples at {}x{}", n, h, w);

    let scores = model.forward(batch.images.clone());
    Ok(Prediction {
        images: batch.images,
        masks: batch.masks,
        scores,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::backend::DefaultBackend;
    use crate::config::ModelConfig;
    use crate::dataset::preprocess::SegItem;

    type B = DefaultBackend;

    fn items(count: usize, size: usize) -> Vec<SegItem> {
        (0..count)
            .map(|i| SegItem {
                image: vec![i as f32 / count as f32; 3 * size * size],
                mask: vec![(i % 3) as i64; size * size],
                size,
            })
            .collect()
    }

    fn small_model(size: usize) -> UNet<B> {
        let config = ModelConfig {
            up_channels: vec![16, 12, 8, 8],
            ..Default::default()
        };
        UNet::build(&config, size, &Default::default()).unwrap()
    }

    #[test]
    fn test_predict_sample_shapes() {
        let size = 32;
        let model = small_model(size);
        let mut stream = TestStream::<B>::from_items(items(4, size), 2, Default::default()).unwrap();

        let prediction = predict_sample(&model, &mut stream).unwrap();
        assert_eq!(prediction.images.dims(), [2, 3, size, size]);
        assert_eq!(prediction.masks.dims(), [2, size, size]);
        assert_eq!(prediction.scores.dims(), [2, 3, size, size]);

        let labels = predicted_labels(prediction.scores);
        assert_eq!(labels.dims(), [2, size, size]);
        let values: Vec<i64> = labels.into_data().to_vec().unwrap();
        assert!(values.iter().all(|&v| (0..3).contains(&v)));
    }

    #[test]
    fn test_predict_sample_rewinds_to_first_batch() {
        let size = 32;
        let model = small_model(size);
        let mut stream = TestStream::<B>::from_items(items(4, size), 2, Default::default()).unwrap();

        // exhaust the stream, then predict: the rewind makes it succeed
        while stream.next().is_some() {}
        let prediction = predict_sample(&model, &mut stream).unwrap();
        let first: Vec<f32> = prediction.images.into_data().to_vec().unwrap();
        assert_eq!(first[0], 0.0);
    }

    #[test]
    fn test_predict_sample_fails_on_undersized_stream() {
        let size = 32;
        let model = small_model(size);
        let mut stream = TestStream::<B>::from_items(items(1, size), 2, Default::default()).unwrap();

        let err = predict_sample(&model, &mut stream).unwrap_err();
        assert!(err.is_configuration());
    }
}

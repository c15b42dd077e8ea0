//! Batch Streams
//!
//! Lazy, pull-based batch sequences over preprocessed samples.
//!
//! The training stream caches its prepared items once, shuffles through a
//! bounded-size buffer, and repeats indefinitely: it terminates only when the
//! caller stops pulling batches. The test stream batches in order, one pass
//! per reset, with no shuffling or repetition.
//!
//! Both streams truncate remainder batches; steps-per-epoch uses the same
//! integer division, so the step count and the batches actually yielded never
//! drift apart.

use burn::tensor::{backend::Backend, Int, Tensor, TensorData};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::config::{DataConfig, TrainConfig};
use crate::dataset::loader::SamplePair;
use crate::dataset::preprocess::{prepare_test, prepare_train, SegItem};
use crate::utils::error::{PetSegError, Result};
use crate::utils::logging::ProgressLogger;

/// A batch of segmentation samples
#[derive(Clone, Debug)]
pub struct SegBatch<B: Backend> {
    /// Images with shape [batch_size, 3, size, size], values in [0, 1]
    pub images: Tensor<B, 4>,
    /// Per-pixel class labels with shape [batch_size, size, size]
    pub masks: Tensor<B, 3, Int>,
}

/// Stack a slice of prepared items into one batch of tensors
fn collate<B: Backend>(items: &[SegItem], size: usize, device: &B::Device) -> SegBatch<B> {
    let batch_size = items.len();

    let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.clone()).collect();
    let images = Tensor::<B, 4>::from_floats(
        TensorData::new(images_data, [batch_size, 3, size, size]),
        device,
    );

    let masks_data: Vec<i64> = items.iter().flat_map(|item| item.mask.clone()).collect();
    let masks = Tensor::<B, 3, Int>::from_data(
        TensorData::new(masks_data, [batch_size, size, size]),
        device,
    );

    SegBatch { images, masks }
}

/// Load and preprocess a split into cached items, surfacing allocation
/// failure as `ResourceExhausted`
fn materialize<F>(pairs: &[SamplePair], label: &str, mut prepare: F) -> Result<Vec<SegItem>>
where
    F: FnMut(&SamplePair) -> Result<SegItem>,
{
    let mut items = Vec::new();
    items
        .try_reserve_exact(pairs.len())
        .map_err(|e| PetSegError::ResourceExhausted(format!("caching {} split: {}", label, e)))?;

    let mut progress = ProgressLogger::new(&format!("Preparing {} split", label), pairs.len());
    for pair in pairs {
        items.push(prepare(pair)?);
        progress.increment();
    }
    progress.finish();

    Ok(items)
}

/// Infinite, shuffled, repeating stream of training batches.
///
/// Prepared items are cached once (augmentation included, matching the
/// cache-then-shuffle order of the original pipeline). Each pull draws a
/// random slot from a bounded buffer that is refilled from an endlessly
/// cycling pass over the cache.
pub struct TrainStream<B: Backend> {
    items: Vec<SegItem>,
    buffer: Vec<usize>,
    cursor: usize,
    batch_size: usize,
    rng: ChaCha8Rng,
    device: B::Device,
}

impl<B: Backend> TrainStream<B> {
    /// Load, preprocess, and cache a training split
    pub fn prepare(
        pairs: &[SamplePair],
        data: &DataConfig,
        train: &TrainConfig,
        device: &B::Device,
    ) -> Result<Self> {
        let mut rng = ChaCha8Rng::seed_from_u64(train.seed);
        let items = materialize(pairs, "train", |pair| {
            Ok(prepare_train(&pair.load()?, data, &mut rng))
        })?;
        Self::from_items(items, train.batch_size, train.buffer_size, train.seed, device.clone())
    }

    /// Build a stream from already-prepared items
    pub fn from_items(
        items: Vec<SegItem>,
        batch_size: usize,
        buffer_size: usize,
        seed: u64,
        device: B::Device,
    ) -> Result<Self> {
        if items.is_empty() {
            return Err(PetSegError::Configuration(
                "training stream requires at least one sample".to_string(),
            ));
        }
        if batch_size == 0 || buffer_size == 0 {
            return Err(PetSegError::Configuration(
                "batch_size and buffer_size must be greater than 0".to_string(),
            ));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        // pre-fill the shuffle buffer from the cycling source
        let mut cursor = 0usize;
        let mut buffer = Vec::with_capacity(buffer_size);
        for _ in 0..buffer_size {
            buffer.push(cursor);
            cursor = (cursor + 1) % items.len();
        }
        // the initial window is the head of the cache; randomize it
        for i in (1..buffer.len()).rev() {
            buffer.swap(i, rng.gen_range(0..=i));
        }

        info!(
            "Training stream ready: {} cached samples, buffer {}, batch {}",
            items.len(),
            buffer_size,
            batch_size
        );

        Ok(Self {
            items,
            buffer,
            cursor,
            batch_size,
            rng,
            device,
        })
    }

    /// Number of cached samples
    pub fn num_samples(&self) -> usize {
        self.items.len()
    }

    /// Draw one item index from the buffer, replacing it with the next index
    /// from the cycling source
    fn draw(&mut self) -> usize {
        let slot = self.rng.gen_range(0..self.buffer.len());
        let incoming = self.cursor;
        self.cursor = (self.cursor + 1) % self.items.len();
        std::mem::replace(&mut self.buffer[slot], incoming)
    }
}

impl<B: Backend> Iterator for TrainStream<B> {
    type Item = SegBatch<B>;

    /// Always yields a full batch; the sequence never ends on its own
    fn next(&mut self) -> Option<SegBatch<B>> {
        let size = self.items[0].size;
        let picks: Vec<SegItem> = (0..self.batch_size)
            .map(|_| {
                let idx = self.draw();
                self.items[idx].clone()
            })
            .collect();
        Some(collate(&picks, size, &self.device))
    }
}

/// Finite, ordered stream of test batches; one pass per reset.
/// Remainder samples that do not fill a batch are dropped.
pub struct TestStream<B: Backend> {
    items: Vec<SegItem>,
    cursor: usize,
    batch_size: usize,
    device: B::Device,
}

impl<B: Backend> TestStream<B> {
    /// Load, preprocess, and cache a test split
    pub fn prepare(
        pairs: &[SamplePair],
        data: &DataConfig,
        train: &TrainConfig,
        device: &B::Device,
    ) -> Result<Self> {
        let items = materialize(pairs, "test", |pair| Ok(prepare_test(&pair.load()?, data)))?;
        Self::from_items(items, train.batch_size, device.clone())
    }

    /// Build a stream from already-prepared items
    pub fn from_items(items: Vec<SegItem>, batch_size: usize, device: B::Device) -> Result<Self> {
        if batch_size == 0 {
            return Err(PetSegError::Configuration(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            items,
            cursor: 0,
            batch_size,
            device,
        })
    }

    /// Rewind to the start of the pass
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Number of cached samples
    pub fn num_samples(&self) -> usize {
        self.items.len()
    }

    /// Number of full batches one pass yields
    pub fn num_batches(&self) -> usize {
        self.items.len() / self.batch_size
    }
}

impl<B: Backend> Iterator for TestStream<B> {
    type Item = SegBatch<B>;

    fn next(&mut self) -> Option<SegBatch<B>> {
        if self.cursor + self.batch_size > self.items.len() {
            return None;
        }
        let slice = &self.items[self.cursor..self.cursor + self.batch_size];
        self.cursor += self.batch_size;
        Some(collate(slice, slice[0].size, &self.device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;

    type B = DefaultBackend;

    /// Items whose first image value encodes their identity
    fn synthetic_items(count: usize, size: usize) -> Vec<SegItem> {
        (0..count)
            .map(|i| SegItem {
                image: vec![i as f32; 3 * size * size],
                mask: vec![(i % 3) as i64; size * size],
                size,
            })
            .collect()
    }

    #[test]
    fn test_train_stream_is_infinite() {
        let device = Default::default();
        let mut stream =
            TrainStream::<B>::from_items(synthetic_items(4, 4), 2, 8, 42, device).unwrap();

        // 4 samples, batch 2: a finite pass would end after 2 batches
        for _ in 0..5 {
            let batch = stream.next().unwrap();
            assert_eq!(batch.images.dims(), [2, 3, 4, 4]);
            assert_eq!(batch.masks.dims(), [2, 4, 4]);
        }
    }

    #[test]
    fn test_train_stream_seed_reproducible() {
        let device: <B as Backend>::Device = Default::default();
        let mut a =
            TrainStream::<B>::from_items(synthetic_items(6, 2), 3, 4, 7, device.clone()).unwrap();
        let mut b = TrainStream::<B>::from_items(synthetic_items(6, 2), 3, 4, 7, device).unwrap();

        for _ in 0..4 {
            let xa = a.next().unwrap().images.into_data().to_vec::<f32>().unwrap();
            let xb = b.next().unwrap().images.into_data().to_vec::<f32>().unwrap();
            assert_eq!(xa, xb);
        }
    }

    #[test]
    fn test_train_stream_eventually_covers_all_samples() {
        let device = Default::default();
        let mut stream =
            TrainStream::<B>::from_items(synthetic_items(5, 2), 1, 3, 1, device).unwrap();

        let mut seen = [false; 5];
        for _ in 0..50 {
            let batch = stream.next().unwrap();
            let first = batch.images.into_data().to_vec::<f32>().unwrap()[0];
            seen[first as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_empty_train_split_rejected() {
        let device: <B as Backend>::Device = Default::default();
        let Err(err) = TrainStream::<B>::from_items(vec![], 2, 8, 42, device) else {
            panic!("empty training split must be rejected");
        };
        assert!(err.is_configuration());
    }

    #[test]
    fn test_test_stream_single_pass_truncates_remainder() {
        let device = Default::default();
        let mut stream = TestStream::<B>::from_items(synthetic_items(5, 4), 2, device).unwrap();

        assert_eq!(stream.num_batches(), 2);
        assert!(stream.next().is_some());
        assert!(stream.next().is_some());
        // fifth sample does not fill a batch and is dropped
        assert!(stream.next().is_none());

        stream.reset();
        assert_eq!(stream.by_ref().count(), 2);
    }

    #[test]
    fn test_test_stream_preserves_order() {
        let device = Default::default();
        let mut stream = TestStream::<B>::from_items(synthetic_items(4, 2), 2, device).unwrap();

        let first = stream.next().unwrap().images.into_data().to_vec::<f32>().unwrap();
        assert_eq!(first[0], 0.0);
        let second = stream.next().unwrap().images.into_data().to_vec::<f32>().unwrap();
        assert_eq!(second[0], 2.0);
    }
}

//! Image/Mask Preprocessing
//!
//! Resizing, joint horizontal-flip augmentation, and normalization of
//! image/mask pairs. Every transform is applied to image and mask jointly so
//! the mask never desynchronizes from its image; the flip in particular is
//! atomic by construction (one draw decides both).

use image::{imageops::FilterType, DynamicImage};
use rand::Rng;

use crate::config::DataConfig;
use crate::dataset::loader::SegSample;

/// Maximum 8-bit intensity; images are normalized to [0, 1] by this divisor.
const MAX_INTENSITY: f32 = 255.0;

/// A preprocessed sample ready for batching
#[derive(Debug, Clone)]
pub struct SegItem {
    /// Image data as flattened CHW float array [3 * size * size], in [0, 1]
    pub image: Vec<f32>,
    /// Per-pixel class labels as flattened HW array [size * size]
    pub mask: Vec<i64>,
    /// Square spatial size of both arrays
    pub size: usize,
}

/// Resize image and mask to a square target size.
///
/// Both use the same interpolation (nearest neighbor) so mask alignment with
/// the image is preserved and no interpolated, invalid label values appear.
pub fn resize_pair(
    image: &DynamicImage,
    mask: &DynamicImage,
    size: usize,
) -> (DynamicImage, DynamicImage) {
    let s = size as u32;
    (
        image.resize_exact(s, s, FilterType::Nearest),
        mask.resize_exact(s, s, FilterType::Nearest),
    )
}

/// Flip image and mask left-right together. Never call on one without the
/// other; partial flips desynchronize labels from pixels.
pub fn flip_pair(image: &DynamicImage, mask: &DynamicImage) -> (DynamicImage, DynamicImage) {
    (image.fliph(), mask.fliph())
}

/// Normalize image values to [0, 1] as a flat CHW vector
pub fn normalize_image(image: &DynamicImage) -> Vec<f32> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let num_pixels = (width * height) as usize;

    let mut data = vec![0.0f32; 3 * num_pixels];
    for (i, pixel) in rgb.pixels().enumerate() {
        data[i] = pixel[0] as f32 / MAX_INTENSITY;
        data[num_pixels + i] = pixel[1] as f32 / MAX_INTENSITY;
        data[2 * num_pixels + i] = pixel[2] as f32 / MAX_INTENSITY;
    }
    data
}

/// Convert a mask image to per-pixel class labels, applying the configured
/// label shift.
///
/// The shift converts the dataset's 1-based label encoding to the 0-based
/// indices the loss expects. It is bijective on valid labels: adding the
/// offset back recovers the original values exactly.
pub fn shift_mask_labels(mask: &DynamicImage, offset: i64) -> Vec<i64> {
    let gray = mask.to_luma8();
    gray.pixels().map(|p| p[0] as i64 + offset).collect()
}

/// Prepare one training sample: resize, joint random flip (p = 0.5),
/// normalize.
pub fn prepare_train<R: Rng>(sample: &SegSample, config: &DataConfig, rng: &mut R) -> SegItem {
    let (mut image, mut mask) = resize_pair(&sample.image, &sample.mask, config.image_size);

    if rng.gen::<f32>() > 0.5 {
        let flipped = flip_pair(&image, &mask);
        image = flipped.0;
        mask = flipped.1;
    }

    SegItem {
        image: normalize_image(&image),
        mask: shift_mask_labels(&mask, config.mask_label_offset),
        size: config.image_size,
    }
}

/// Prepare one test sample: resize + normalize, no augmentation
pub fn prepare_test(sample: &SegSample, config: &DataConfig) -> SegItem {
    let (image, mask) = resize_pair(&sample.image, &sample.mask, config.image_size);

    SegItem {
        image: normalize_image(&image),
        mask: shift_mask_labels(&mask, config.mask_label_offset),
        size: config.image_size,
    }
}

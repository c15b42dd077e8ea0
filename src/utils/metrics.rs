//! Segmentation Metrics
//!
//! Confusion-matrix-based metrics over per-pixel predictions:
//! pixel accuracy and mean intersection-over-union.

use serde::{Deserialize, Serialize};

/// Accumulator for per-pixel prediction statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationMetrics {
    num_classes: usize,
    /// Row-major confusion counts: `confusion[target * num_classes + pred]`
    confusion: Vec<u64>,
    total: u64,
}

impl SegmentationMetrics {
    /// Create an empty accumulator for the given class count
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            confusion: vec![0; num_classes * num_classes],
            total: 0,
        }
    }

    /// Accumulate a batch of predictions against targets.
    /// Labels outside [0, num_classes) are ignored.
    pub fn update(&mut self, predictions: &[i64], targets: &[i64]) {
        debug_assert_eq!(predictions.len(), targets.len());
        let n = self.num_classes as i64;
        for (&pred, &target) in predictions.iter().zip(targets.iter()) {
            if (0..n).contains(&pred) && (0..n).contains(&target) {
                self.confusion[(target * n + pred) as usize] += 1;
                self.total += 1;
            }
        }
    }

    /// Number of accumulated pixels
    pub fn total_pixels(&self) -> u64 {
        self.total
    }

    /// Fraction of pixels assigned the correct class
    pub fn pixel_accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let correct: u64 = (0..self.num_classes)
            .map(|c| self.confusion[c * self.num_classes + c])
            .sum();
        correct as f64 / self.total as f64
    }

    /// Intersection-over-union for one class; None when the class never
    /// appears in targets or predictions
    pub fn class_iou(&self, class: usize) -> Option<f64> {
        let n = self.num_classes;
        let intersection = self.confusion[class * n + class];
        let target_total: u64 = (0..n).map(|p| self.confusion[class * n + p]).sum();
        let pred_total: u64 = (0..n).map(|t| self.confusion[t * n + class]).sum();
        let union = target_total + pred_total - intersection;

        (union > 0).then(|| intersection as f64 / union as f64)
    }

    /// Mean IoU over classes present in targets or predictions
    pub fn mean_iou(&self) -> f64 {
        let ious: Vec<f64> = (0..self.num_classes)
            .filter_map(|c| self.class_iou(c))
            .collect();
        if ious.is_empty() {
            return 0.0;
        }
        ious.iter().sum::<f64>() / ious.len() as f64
    }
}

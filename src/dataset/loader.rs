//! Oxford-IIIT-Pet Dataset Loader
//!
//! Locates a named segmentation dataset on disk and resolves it into train
//! and test splits of (image, trimap) path pairs. Expected layout:
//!
//! ```text
//! root/
//! ├── images/
//! │   ├── Abyssinian_1.jpg
//! │   └── ...
//! └── annotations/
//!     ├── trainval.txt
//!     ├── test.txt
//!     └── trimaps/
//!         ├── Abyssinian_1.png
//!         └── ...
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageReader};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::DataConfig;
use crate::utils::error::{PetSegError, Result};

/// Image file extensions considered part of the dataset
const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// A raw (image, mask) sample decoded from disk
#[derive(Debug, Clone)]
pub struct SegSample {
    /// 3-channel input image
    pub image: DynamicImage,
    /// Integer-labeled segmentation mask
    pub mask: DynamicImage,
}

/// Paths of one image/mask pair, decoded lazily
#[derive(Debug, Clone)]
pub struct SamplePair {
    /// Path to the input image file
    pub image_path: PathBuf,
    /// Path to the segmentation trimap file
    pub mask_path: PathBuf,
}

impl SamplePair {
    /// Decode both files into a raw sample
    pub fn load(&self) -> Result<SegSample> {
        let image = decode(&self.image_path)?;
        let mask = decode(&self.mask_path)?;
        Ok(SegSample { image, mask })
    }
}

fn decode(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)
        .map_err(|e| PetSegError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .decode()
        .map_err(|e| PetSegError::ImageLoad(path.to_path_buf(), e.to_string()))
}

/// The two named dataset splits
#[derive(Debug, Clone)]
pub struct DatasetSplits {
    /// Training split, consumed by the repeating shuffled stream
    pub train: Vec<SamplePair>,
    /// Test split, consumed by the single-pass stream
    pub test: Vec<SamplePair>,
}

/// Dataset metadata: per-split example counts used to derive
/// steps-per-epoch and validation-steps
#[derive(Debug, Clone)]
pub struct DatasetInfo {
    /// Dataset name from configuration
    pub name: String,
    /// Number of examples in the train split
    pub train_examples: usize,
    /// Number of examples in the test split
    pub test_examples: usize,
}

/// Load the named dataset, returning both splits plus metadata.
///
/// Fails with `DataUnavailable` if the dataset root, the split lists, or the
/// annotation directory cannot be located, or if a split resolves to zero
/// usable samples.
pub fn load(config: &DataConfig) -> Result<(DatasetSplits, DatasetInfo)> {
    let root = &config.root;
    info!("Loading dataset '{}' from {:?}", config.name, root);

    let unavailable = |reason: String| PetSegError::DataUnavailable {
        name: config.name.clone(),
        reason,
    };

    if !root.exists() {
        return Err(unavailable(format!("root directory {:?} does not exist", root)));
    }

    let images_dir = root.join("images");
    let annotations_dir = root.join("annotations");
    let trimaps_dir = annotations_dir.join("trimaps");
    for dir in [&images_dir, &trimaps_dir] {
        if !dir.is_dir() {
            return Err(unavailable(format!("missing directory {:?}", dir)));
        }
    }

    let index = index_images(&images_dir);
    debug!("Indexed {} image files", index.len());

    let train = resolve_split(&annotations_dir.join("trainval.txt"), &index, &trimaps_dir)?;
    let test = resolve_split(&annotations_dir.join("test.txt"), &index, &trimaps_dir)?;

    for (split, pairs) in [("train", &train), ("test", &test)] {
        if pairs.is_empty() {
            return Err(unavailable(format!("split '{}' resolved to zero samples", split)));
        }
    }

    let info = DatasetInfo {
        name: config.name.clone(),
        train_examples: train.len(),
        test_examples: test.len(),
    };
    info!(
        "Dataset ready: {} train / {} test examples",
        info.train_examples, info.test_examples
    );

    Ok((DatasetSplits { train, test }, info))
}

/// Walk the images directory and map file stems to paths
fn index_images(images_dir: &Path) -> HashMap<String, PathBuf> {
    let mut index = HashMap::new();
    for entry in WalkDir::new(images_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path().to_path_buf();
        let Some(ext) = path.extension() else { continue };
        let ext = ext.to_string_lossy().to_lowercase();
        if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            index.insert(stem.to_string(), path);
        }
    }
    index
}

/// Read a split list file and resolve each entry to an image/trimap pair.
/// Entries without a matching image or trimap are skipped with a warning.
fn resolve_split(
    list_path: &Path,
    index: &HashMap<String, PathBuf>,
    trimaps_dir: &Path,
) -> Result<Vec<SamplePair>> {
    if !list_path.is_file() {
        return Err(PetSegError::DataUnavailable {
            name: list_path.to_string_lossy().to_string(),
            reason: "split list file missing".to_string(),
        });
    }

    let contents = std::fs::read_to_string(list_path)?;
    let mut pairs = Vec::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        // list format: "<stem> <class-id> <species> <breed-id>"
        let Some(stem) = line.split_whitespace().next() else { continue };

        let Some(image_path) = index.get(stem) else {
            warn!("No image file for listed sample '{}', skipping", stem);
            continue;
        };
        let mask_path = trimaps_dir.join(format!("{}.png", stem));
        if !mask_path.is_file() {
            warn!("No trimap for listed sample '{}', skipping", stem);
            continue;
        }

        pairs.push(SamplePair {
            image_path: image_path.clone(),
            mask_path,
        });
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    struct Fixture {
        root: PathBuf,
    }

    impl Fixture {
        /// Build a tiny on-disk dataset with the expected layout
        fn new(tag: &str, train: &[&str], test: &[&str]) -> Self {
            let root = std::env::temp_dir().join(format!("petseg_loader_{}_{}", tag, std::process::id()));
            let images = root.join("images");
            let trimaps = root.join("annotations/trimaps");
            std::fs::create_dir_all(&images).unwrap();
            std::fs::create_dir_all(&trimaps).unwrap();

            for stem in train.iter().chain(test.iter()) {
                let image = RgbImage::from_pixel(12, 9, Rgb([120, 80, 40]));
                image.save(images.join(format!("{}.png", stem))).unwrap();
                let mask = GrayImage::from_pixel(12, 9, Luma([2]));
                mask.save(trimaps.join(format!("{}.png", stem))).unwrap();
            }

            let lists = |names: &[&str]| {
                names
                    .iter()
                    .map(|n| format!("{} 1 1 1\n", n))
                    .collect::<String>()
            };
            std::fs::write(root.join("annotations/trainval.txt"), lists(train)).unwrap();
            std::fs::write(root.join("annotations/test.txt"), lists(test)).unwrap();

            Self { root }
        }

        fn config(&self) -> DataConfig {
            DataConfig {
                root: self.root.clone(),
                image_size: 8,
                ..Default::default()
            }
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }

    #[test]
    fn test_missing_root_is_data_unavailable() {
        let config = DataConfig {
            root: PathBuf::from("/nonexistent/petseg_dataset"),
            ..Default::default()
        };
        let err = load(&config).unwrap_err();
        assert!(matches!(err, PetSegError::DataUnavailable { .. }));
    }

    #[test]
    fn test_load_counts_and_pairs() {
        let fixture = Fixture::new("counts", &["cat_1", "cat_2", "dog_1"], &["dog_2"]);
        let (splits, info) = load(&fixture.config()).unwrap();

        assert_eq!(info.train_examples, 3);
        assert_eq!(info.test_examples, 1);
        assert_eq!(splits.train.len(), 3);
        assert_eq!(splits.test.len(), 1);

        let sample = splits.train[0].load().unwrap();
        assert_eq!(sample.image.width(), 12);
        assert_eq!(sample.mask.to_luma8().get_pixel(0, 0)[0], 2);
    }

    #[test]
    fn test_listed_sample_without_trimap_skipped() {
        let fixture = Fixture::new("skips", &["cat_1", "cat_2"], &["dog_1"]);
        std::fs::remove_file(fixture.root.join("annotations/trimaps/cat_2.png")).unwrap();

        let (splits, info) = load(&fixture.config()).unwrap();
        assert_eq!(info.train_examples, 1);
        assert_eq!(splits.train.len(), 1);
    }

    #[test]
    fn test_empty_split_is_data_unavailable() {
        let fixture = Fixture::new("empty", &["cat_1"], &["dog_1"]);
        std::fs::write(fixture.root.join("annotations/test.txt"), "").unwrap();

        let err = load(&fixture.config()).unwrap_err();
        assert!(matches!(err, PetSegError::DataUnavailable { .. }));
    }

    #[test]
    fn test_unreadable_image_is_image_load_error() {
        let fixture = Fixture::new("decode", &["cat_1"], &["dog_1"]);
        std::fs::write(fixture.root.join("images/cat_1.png"), b"not an image").unwrap();

        let (splits, _) = load(&fixture.config()).unwrap();
        let err = splits.train[0].load().unwrap_err();
        assert!(matches!(err, PetSegError::ImageLoad(_, _)));
    }
}

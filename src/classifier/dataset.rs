//! Directory-structured two-class scan dataset and tensor batching.

use anyhow::{bail, Result};
use burn::prelude::*;
use burn::tensor::TensorData;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::preprocess::{has_image_extension, preprocess_path};

/// Class folders and their labels. `yes` scans contain a tumor.
pub const CLASSES: [(&str, u8); 2] = [("yes", 1), ("no", 0)];

/// Default fraction of each class held out for validation.
pub const DEFAULT_VALIDATION_SPLIT: f64 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub struct ScanSample {
    pub path: PathBuf,
    pub label: u8,
}

#[derive(Debug, Clone, Default)]
pub struct DatasetSplit {
    pub train: Vec<ScanSample>,
    pub validation: Vec<ScanSample>,
}

/// List the images of each class folder, sorted by name, and hold out the
/// first `validation_split` fraction of each class for validation.
pub fn split_directory(root: &Path, validation_split: f64) -> Result<DatasetSplit> {
    if !(0.0..1.0).contains(&validation_split) {
        bail!("Validation split must be in [0, 1), got {validation_split}");
    }

    let mut split = DatasetSplit::default();
    for (class, label) in CLASSES {
        let class_dir = root.join(class);
        if !class_dir.is_dir() {
            bail!("Missing class directory {}", class_dir.display());
        }

        let mut paths: Vec<PathBuf> = WalkDir::new(&class_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && has_image_extension(e.path()))
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        let held_out = (validation_split * paths.len() as f64) as usize;
        tracing::info!(
            "Class '{class}': {} images ({} validation)",
            paths.len(),
            held_out
        );
        for (i, path) in paths.into_iter().enumerate() {
            let sample = ScanSample { path, label };
            if i < held_out {
                split.validation.push(sample);
            } else {
                split.train.push(sample);
            }
        }
    }

    if split.train.is_empty() && split.validation.is_empty() {
        bail!("No images found under {}", root.display());
    }
    Ok(split)
}

/// Decoded, normalised images held in memory.
#[derive(Debug, Clone, Default)]
pub struct ImageSet {
    pub side: usize,
    pub images: Vec<Vec<f32>>,
    pub labels: Vec<u8>,
}

impl ImageSet {
    pub fn load(samples: &[ScanSample], side: usize) -> Result<Self> {
        let mut set = Self {
            side,
            ..Self::default()
        };
        for sample in samples {
            set.images.push(preprocess_path(&sample.path, side as u32)?);
            set.labels.push(sample.label);
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ScanBatch<B: Backend> {
    /// Shape `[batch, 1, side, side]`.
    pub images: Tensor<B, 4>,
    /// Shape `[batch]`, 1 for tumor.
    pub targets: Tensor<B, 1, Int>,
}

#[derive(Debug, Clone)]
pub struct ScanBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> ScanBatcher<B> {
    pub const fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Stack the images at `indices` into one batch.
    pub fn batch(&self, set: &ImageSet, indices: &[usize]) -> ScanBatch<B> {
        let side = set.side;
        let mut pixels = Vec::with_capacity(indices.len() * side * side);
        let mut labels = Vec::with_capacity(indices.len());
        for &i in indices {
            pixels.extend_from_slice(&set.images[i]);
            labels.push(i64::from(set.labels[i]));
        }

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [indices.len(), 1, side, side]).convert::<B::FloatElem>(),
            &self.device,
        );
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(labels, [indices.len()]).convert::<B::IntElem>(),
            &self.device,
        );
        ScanBatch { images, targets }
    }
}

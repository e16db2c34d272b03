//! Brain-tumor scan classifier: preprocessing, network, training and the
//! inference handle shared by the API.

pub mod dataset;
pub mod evaluation;
pub mod model;
pub mod preprocess;
pub mod training;

use anyhow::{bail, Context, Result};
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::NdArray;
use burn::prelude::*;
use burn::tensor::TensorData;
use parking_lot::Mutex;
use std::path::Path;

use self::model::{load_weights, ModelConfig, TumorCnn};

/// Probability above which a scan is reported as containing a tumor.
pub const TUMOR_THRESHOLD: f32 = 0.5;

pub fn has_tumor(probability: f32) -> bool {
    probability > TUMOR_THRESHOLD
}

/// A loaded classifier scoring one preprocessed image at a time.
pub trait Classifier: Send + Sync {
    /// Side length the classifier expects its square input to have.
    fn image_size(&self) -> u32;

    /// Tumor probability for `image_size()²` row-major pixels in [0, 1].
    fn predict(&self, pixels: &[f32]) -> Result<f32>;
}

/// CPU inference over the trained burn network.
pub struct BurnClassifier {
    // burn modules are Send but not Sync.
    model: Mutex<TumorCnn<NdArray>>,
    device: NdArrayDevice,
    image_size: usize,
}

impl BurnClassifier {
    /// Load weights saved for the architecture described by `config`.
    pub fn load(path: &Path, config: &ModelConfig) -> Result<Self> {
        let device = NdArrayDevice::default();
        let model = load_weights::<NdArray>(config, path, &device)?;
        Ok(Self::from_model(model, config.image_size as u32))
    }

    pub fn from_model(model: TumorCnn<NdArray>, image_size: u32) -> Self {
        Self {
            model: Mutex::new(model),
            device: NdArrayDevice::default(),
            image_size: image_size as usize,
        }
    }
}

impl Classifier for BurnClassifier {
    fn image_size(&self) -> u32 {
        self.image_size as u32
    }

    fn predict(&self, pixels: &[f32]) -> Result<f32> {
        let side = self.image_size;
        if pixels.len() != side * side {
            bail!(
                "Expected {} pixels for a {side}x{side} image, got {}",
                side * side,
                pixels.len()
            );
        }

        let input = Tensor::<NdArray, 4>::from_data(
            TensorData::new(pixels.to_vec(), [1, 1, side, side]),
            &self.device,
        );
        let output = self.model.lock().forward_probability(input);
        let values: Vec<f32> = output
            .into_data()
            .to_vec()
            .map_err(|e| anyhow::anyhow!("Failed to read classifier output: {e:?}"))?;
        values.first().copied().context("Classifier returned no output")
    }
}

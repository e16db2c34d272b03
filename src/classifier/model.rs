//! Convolutional network for binary tumor classification.

use anyhow::{anyhow, bail, Result};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, Relu};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::activation::sigmoid;
use std::path::Path;

use crate::classifier::preprocess::DEFAULT_IMAGE_SIZE;

/// Channel widths of the three convolution blocks.
pub const DEFAULT_CHANNELS: [usize; 3] = [64, 128, 256];

/// Smallest input side for which the last block still yields one pixel.
pub const MIN_IMAGE_SIZE: usize = 36;

/// Configuration for the tumor classifier architecture.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Side length of the square single-channel input.
    pub image_size: usize,
    /// Output channels of each convolution block.
    pub channels: [usize; 3],
    /// Hidden units in the dense layer.
    pub hidden_size: usize,
    /// Dropout rate before the output layer.
    pub dropout: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            image_size: DEFAULT_IMAGE_SIZE as usize,
            channels: DEFAULT_CHANNELS,
            hidden_size: 512,
            dropout: 0.5,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.channels.contains(&0) {
            bail!("Convolution channels must be non-zero, got {:?}", self.channels);
        }
        if self.image_size < MIN_IMAGE_SIZE {
            bail!(
                "Image size {} is too small; the network needs at least {MIN_IMAGE_SIZE}",
                self.image_size
            );
        }
        Ok(())
    }

    /// Spatial side after all convolution blocks.
    pub fn feature_side(&self) -> usize {
        // Each block: two valid 3x3 convolutions (-4) then a 2x2 pool.
        (0..self.channels.len()).fold(self.image_size, |side, _| side.saturating_sub(4) / 2)
    }

    pub fn flattened_features(&self) -> usize {
        let side = self.feature_side();
        self.channels[self.channels.len() - 1] * side * side
    }
}

/// `Conv → ReLU → BatchNorm → Conv → ReLU → MaxPool`.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv_in: Conv2d<B>,
    norm: BatchNorm<B, 2>,
    conv_out: Conv2d<B>,
    pool: MaxPool2d,
    activation: Relu,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(device: &B::Device, in_channels: usize, out_channels: usize) -> Self {
        Self {
            conv_in: Conv2dConfig::new([in_channels, out_channels], [3, 3]).init(device),
            norm: BatchNormConfig::new(out_channels).init(device),
            conv_out: Conv2dConfig::new([out_channels, out_channels], [3, 3]).init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            activation: Relu::new(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.activation.forward(self.conv_in.forward(input));
        let x = self.norm.forward(x);
        let x = self.activation.forward(self.conv_out.forward(x));
        self.pool.forward(x)
    }
}

/// The tumor classifier: three conv blocks and a dense head producing one logit.
#[derive(Module, Debug)]
pub struct TumorCnn<B: Backend> {
    block1: ConvBlock<B>,
    block2: ConvBlock<B>,
    block3: ConvBlock<B>,
    hidden: Linear<B>,
    dropout: Dropout,
    output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> TumorCnn<B> {
    pub fn new(device: &B::Device, config: &ModelConfig) -> Self {
        let [c1, c2, c3] = config.channels;
        Self {
            block1: ConvBlock::new(device, 1, c1),
            block2: ConvBlock::new(device, c1, c2),
            block3: ConvBlock::new(device, c2, c3),
            hidden: LinearConfig::new(config.flattened_features(), config.hidden_size).init(device),
            dropout: DropoutConfig::new(config.dropout).init(),
            output: LinearConfig::new(config.hidden_size, 1).init(device),
            activation: Relu::new(),
        }
    }

    /// Logits of shape `[batch, 1]` for inputs of shape `[batch, 1, side, side]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.block1.forward(images);
        let x = self.block2.forward(x);
        let x = self.block3.forward(x);
        let x: Tensor<B, 2> = x.flatten(1, 3);
        let x = self.activation.forward(self.hidden.forward(x));
        let x = self.dropout.forward(x);
        self.output.forward(x)
    }

    /// Tumor probabilities of shape `[batch, 1]`.
    pub fn forward_probability(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        sigmoid(self.forward(images))
    }
}

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// Persist weights; the recorder appends its own `.mpk` extension.
pub fn save_weights<B: Backend>(model: TumorCnn<B>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    model
        .save_file(path.to_path_buf(), &recorder())
        .map_err(|e| anyhow!("Failed to save weights to {}: {e:?}", path.display()))
}

pub fn load_weights<B: Backend>(
    config: &ModelConfig,
    path: &Path,
    device: &B::Device,
) -> Result<TumorCnn<B>> {
    config.validate()?;
    TumorCnn::new(device, config)
        .load_file(path.to_path_buf(), &recorder(), device)
        .map_err(|e| anyhow!("Failed to load weights from {}: {e:?}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn small_config() -> ModelConfig {
        ModelConfig {
            image_size: MIN_IMAGE_SIZE,
            channels: [2, 2, 2],
            hidden_size: 8,
            dropout: 0.5,
        }
    }

    #[test]
    fn test_feature_side_for_default_size() {
        let config = ModelConfig::default();
        // 128 -> 62 -> 29 -> 12
        assert_eq!(config.feature_side(), 12);
        assert_eq!(config.flattened_features(), 256 * 12 * 12);
    }

    #[test]
    fn test_validate_rejects_tiny_inputs() {
        let config = ModelConfig {
            image_size: 28,
            ..ModelConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(small_config().validate().is_ok());
        assert_eq!(small_config().feature_side(), 1);

        let no_channels = ModelConfig {
            channels: [2, 0, 2],
            ..small_config()
        };
        assert!(no_channels.validate().is_err());
    }

    #[test]
    fn test_channels_set_flattened_width() {
        let config = small_config();
        assert_eq!(config.flattened_features(), 2);
        let wide = ModelConfig {
            channels: [4, 8, 16],
            ..small_config()
        };
        assert_eq!(wide.flattened_features(), 16);
    }

    #[test]
    fn test_forward_shapes_and_probability_range() {
        let device = Default::default();
        let config = small_config();
        let model: TumorCnn<TestBackend> = TumorCnn::new(&device, &config);
        let side = config.image_size;
        let input = Tensor::<TestBackend, 4>::zeros([2, 1, side, side], &device);

        let logits = model.forward(input.clone());
        assert_eq!(logits.dims(), [2, 1]);

        let probs: Vec<f32> = model
            .forward_probability(input)
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(probs.len(), 2);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_save_and_load_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("classifier");
        let device = Default::default();
        let config = small_config();
        let model: TumorCnn<TestBackend> = TumorCnn::new(&device, &config);
        let side = config.image_size;
        let input = Tensor::<TestBackend, 4>::ones([1, 1, side, side], &device);
        let before: Vec<f32> = model.forward(input.clone()).into_data().to_vec().unwrap();

        save_weights(model, &path).unwrap();
        let loaded: TumorCnn<TestBackend> = load_weights(&config, &path, &device).unwrap();
        let after: Vec<f32> = loaded.forward(input).into_data().to_vec().unwrap();
        assert!((before[0] - after[0]).abs() < 1e-5);
    }

    #[test]
    fn test_load_missing_weights_fails() {
        let device = Default::default();
        let result: Result<TumorCnn<TestBackend>> =
            load_weights(&small_config(), Path::new("/nonexistent/classifier"), &device);
        assert!(result.is_err());
    }
}

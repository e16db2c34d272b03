//! Training loop for the tumor classifier.

use anyhow::{bail, Result};
use burn::module::AutodiffModule;
use burn::nn::loss::BinaryCrossEntropyLossConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::dataset::{ImageSet, ScanBatcher};
use super::evaluation::{binary_cross_entropy, predict_probabilities, ConfusionMatrix};
use super::has_tumor;
use super::model::{ModelConfig, TumorCnn};

/// Configuration for training the classifier.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    /// Seed for per-epoch shuffling.
    pub seed: u64,
    pub model: ModelConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            epochs: 10,
            batch_size: 32,
            seed: 42,
            model: ModelConfig::default(),
        }
    }
}

/// Metrics recorded after each epoch.
#[derive(Debug, Clone)]
pub struct EpochStats {
    pub epoch: usize,
    pub train_loss: f32,
    pub valid_loss: Option<f32>,
    pub valid_accuracy: Option<f64>,
}

/// Train `model` and return the updated weights with per-epoch history.
pub fn train<B: AutodiffBackend>(
    mut model: TumorCnn<B>,
    train_set: &ImageSet,
    valid_set: &ImageSet,
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<(TumorCnn<B>, Vec<EpochStats>)> {
    if train_set.is_empty() {
        bail!("No training samples");
    }
    if config.batch_size == 0 {
        bail!("Batch size must be positive");
    }

    let batcher = ScanBatcher::<B>::new(device.clone());
    let loss_fn = BinaryCrossEntropyLossConfig::new()
        .with_logits(true)
        .init(device);
    let mut optimizer = AdamConfig::new().init();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut indices: Vec<usize> = (0..train_set.len()).collect();
    let mut history = Vec::with_capacity(config.epochs);

    for epoch in 1..=config.epochs {
        indices.shuffle(&mut rng);
        let mut epoch_loss = 0.0f64;
        let mut batch_count = 0usize;

        for chunk in indices.chunks(config.batch_size) {
            let batch = batcher.batch(train_set, chunk);
            let logits: Tensor<B, 1> = model.forward(batch.images).flatten(0, 1);
            let loss = loss_fn.forward(logits, batch.targets);

            epoch_loss += f64::from(loss.clone().into_scalar().elem::<f32>());
            batch_count += 1;

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(config.learning_rate, model, grads);
        }

        let train_loss = (epoch_loss / batch_count.max(1) as f64) as f32;
        let (valid_loss, valid_accuracy) = if valid_set.is_empty() {
            (None, None)
        } else {
            let inner = model.valid();
            let probabilities =
                predict_probabilities(&inner, valid_set, config.batch_size, device)?;
            let predicted: Vec<bool> = probabilities.iter().map(|&p| has_tumor(p)).collect();
            let matrix = ConfusionMatrix::from_predictions(&valid_set.labels, &predicted);
            (
                Some(binary_cross_entropy(&probabilities, &valid_set.labels)),
                Some(matrix.accuracy()),
            )
        };

        match (valid_loss, valid_accuracy) {
            (Some(loss), Some(acc)) => tracing::info!(
                "Epoch {epoch}/{}: train_loss={train_loss:.4} val_loss={loss:.4} val_accuracy={acc:.4}",
                config.epochs
            ),
            _ => tracing::info!("Epoch {epoch}/{}: train_loss={train_loss:.4}", config.epochs),
        }

        history.push(EpochStats {
            epoch,
            train_loss,
            valid_loss,
            valid_accuracy,
        });
    }

    Ok((model, history))
}

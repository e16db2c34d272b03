//! Validation metrics and the plain-text statistics report.

use anyhow::{Context, Result};
use burn::prelude::*;
use std::path::Path;

use super::dataset::{ImageSet, ScanBatcher};
use super::model::TumorCnn;
use super::has_tumor;

/// Binary confusion matrix with tumor as the positive class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(labels: &[u8], predicted: &[bool]) -> Self {
        let mut m = Self::default();
        for (&label, &positive) in labels.iter().zip(predicted) {
            match (label == 1, positive) {
                (true, true) => m.true_positives += 1,
                (false, false) => m.true_negatives += 1,
                (false, true) => m.false_positives += 1,
                (true, false) => m.false_negatives += 1,
            }
        }
        m
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.true_negatives + self.false_positives + self.false_negatives
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }

    /// 0 when nothing was predicted positive.
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    /// 0 when there are no positive labels.
    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn render_report(&self) -> String {
        format!(
            "===== Model Evaluation on Validation Data =====\n\
             Accuracy: {:.4}\n\
             Precision: {:.4}\n\
             Recall: {:.4}\n\
             True Positives: {}\n\
             True Negatives: {}\n\
             False Positives: {}\n\
             False Negatives: {}\n",
            self.accuracy(),
            self.precision(),
            self.recall(),
            self.true_positives,
            self.true_negatives,
            self.false_positives,
            self.false_negatives,
        )
    }

    pub fn write_report(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.render_report())
            .with_context(|| format!("Failed to write report to {}", path.display()))
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Tumor probability for every image in the set, in order.
pub fn predict_probabilities<B: Backend>(
    model: &TumorCnn<B>,
    set: &ImageSet,
    batch_size: usize,
    device: &B::Device,
) -> Result<Vec<f32>> {
    let batcher = ScanBatcher::<B>::new(device.clone());
    let indices: Vec<usize> = (0..set.len()).collect();
    let mut probabilities = Vec::with_capacity(set.len());

    for chunk in indices.chunks(batch_size.max(1)) {
        let batch = batcher.batch(set, chunk);
        let probs = model.forward_probability(batch.images);
        let values: Vec<f32> = probs
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| anyhow::anyhow!("Failed to read classifier output: {e:?}"))?;
        probabilities.extend(values);
    }

    Ok(probabilities)
}

/// Mean binary cross-entropy of probabilities against labels.
pub fn binary_cross_entropy(probabilities: &[f32], labels: &[u8]) -> f32 {
    if probabilities.is_empty() {
        return 0.0;
    }
    const EPS: f32 = 1e-7;
    let total: f32 = probabilities
        .iter()
        .zip(labels)
        .map(|(&p, &y)| {
            let p = p.clamp(EPS, 1.0 - EPS);
            if y == 1 {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum();
    total / probabilities.len() as f32
}

/// Score a model on a labelled set.
pub fn evaluate<B: Backend>(
    model: &TumorCnn<B>,
    set: &ImageSet,
    batch_size: usize,
    device: &B::Device,
) -> Result<ConfusionMatrix> {
    let probabilities = predict_probabilities(model, set, batch_size, device)?;
    let predicted: Vec<bool> = probabilities.iter().map(|&p| has_tumor(p)).collect();
    Ok(ConfusionMatrix::from_predictions(&set.labels, &predicted))
}

//! Offline training and evaluation of the tumor classifier.

use anyhow::Result;
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use burn::module::{AutodiffModule, Module};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tumor_scan::classifier::dataset::{split_directory, ImageSet, DEFAULT_VALIDATION_SPLIT};
use tumor_scan::classifier::evaluation::evaluate;
use tumor_scan::classifier::model::{load_weights, save_weights, ModelConfig, TumorCnn};
use tumor_scan::classifier::preprocess::DEFAULT_IMAGE_SIZE;
use tumor_scan::classifier::training::{train, TrainingConfig};

type TrainBackend = Autodiff<NdArray>;

#[derive(Parser)]
#[command(name = "tumor-train", about = "Train and evaluate the brain-tumor classifier")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train on the dataset and save the weights
    Train(CommonArgs),
    /// Score saved weights on the validation split and write the report
    Evaluate(CommonArgs),
    /// Train, then evaluate
    All(CommonArgs),
}

#[derive(Args, Clone)]
struct CommonArgs {
    /// Dataset root containing `yes/` and `no/` folders
    #[arg(long, env = "TUMOR_DATASET_PATH")]
    dataset: PathBuf,
    /// Weights path, without the `.mpk` extension
    #[arg(long, env = "TUMOR_API_MODEL_PATH", default_value = "model/brain_tumor_classifier")]
    model_path: PathBuf,
    /// Where the evaluation report is written
    #[arg(long, env = "TUMOR_STATS_PATH", default_value = "model/model_statistics.txt")]
    report: PathBuf,
    #[arg(long, default_value_t = DEFAULT_IMAGE_SIZE as usize)]
    image_size: usize,
    #[arg(long, default_value_t = 10)]
    epochs: usize,
    #[arg(long, default_value_t = 32)]
    batch_size: usize,
    #[arg(long, default_value_t = 1e-3)]
    learning_rate: f64,
    #[arg(long, default_value_t = DEFAULT_VALIDATION_SPLIT)]
    validation_split: f64,
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

impl CommonArgs {
    fn training_config(&self) -> TrainingConfig {
        TrainingConfig {
            learning_rate: self.learning_rate,
            epochs: self.epochs,
            batch_size: self.batch_size,
            seed: self.seed,
            model: ModelConfig {
                image_size: self.image_size,
                ..ModelConfig::default()
            },
        }
    }
}

fn run_train(args: &CommonArgs) -> Result<()> {
    let config = args.training_config();
    config.model.validate()?;

    let split = split_directory(&args.dataset, args.validation_split)?;
    tracing::info!(
        "Loading {} training and {} validation images",
        split.train.len(),
        split.validation.len()
    );
    let train_set = ImageSet::load(&split.train, args.image_size)?;
    let valid_set = ImageSet::load(&split.validation, args.image_size)?;

    let device = NdArrayDevice::default();
    let model = TumorCnn::<TrainBackend>::new(&device, &config.model);
    tracing::info!("Model parameters: {}", model.num_params());

    let (model, history) = train(model, &train_set, &valid_set, &config, &device)?;
    if let Some(last) = history.last() {
        tracing::info!("Final train loss: {:.4}", last.train_loss);
    }

    save_weights(model.valid(), &args.model_path)?;
    tracing::info!("Model saved at {}", args.model_path.display());
    Ok(())
}

fn run_evaluate(args: &CommonArgs) -> Result<()> {
    let config = args.training_config();
    let device = NdArrayDevice::default();
    let model = load_weights::<NdArray>(&config.model, &args.model_path, &device)?;

    let split = split_directory(&args.dataset, args.validation_split)?;
    let valid_set = ImageSet::load(&split.validation, args.image_size)?;
    if valid_set.is_empty() {
        anyhow::bail!("Validation split is empty; nothing to evaluate");
    }

    let matrix = evaluate(&model, &valid_set, args.batch_size, &device)?;
    tracing::info!(
        "Accuracy {:.4}, precision {:.4}, recall {:.4}",
        matrix.accuracy(),
        matrix.precision(),
        matrix.recall()
    );
    matrix.write_report(&args.report)?;
    tracing::info!("Model statistics saved at {}", args.report.display());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load .env file so clap's env fallbacks see it
    dotenvy::dotenv().ok();

    match Cli::parse().command {
        Command::Train(args) => run_train(&args),
        Command::Evaluate(args) => run_evaluate(&args),
        Command::All(args) => {
            tracing::info!("Starting model training...");
            run_train(&args)?;
            tracing::info!("Evaluating model on validation data...");
            run_evaluate(&args)
        }
    }
}

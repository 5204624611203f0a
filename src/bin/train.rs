#![recursion_limit = "256"]

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::backend::{Autodiff, Wgpu};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use ml_gan::config::{AppConfig, DatasetKind};
use ml_gan::data::load_images;
use ml_gan::training::trainer::GanTrainer;

type TrainBackend = Autodiff<Wgpu<f32, i32>>;

#[derive(Clone, Copy, ValueEnum)]
enum Dataset {
    Synthetic,
    Mnist,
}

impl From<Dataset> for DatasetKind {
    fn from(d: Dataset) -> Self {
        match d {
            Dataset::Synthetic => DatasetKind::Synthetic,
            Dataset::Mnist => DatasetKind::Mnist,
        }
    }
}

/// Train a GAN to generate images.
#[derive(Parser)]
#[command(name = "train", about = "Train an image GAN")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Override number of epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Override batch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override the learning rate of both players
    #[arg(long)]
    lr: Option<f64>,

    /// Override the image source
    #[arg(long, value_enum)]
    dataset: Option<Dataset>,

    /// Stop after this many batches
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Write a sample grid per epoch into this directory
    #[arg(long)]
    sample_dir: Option<PathBuf>,

    /// Write the run report as JSON to this path
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    print_default_config: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_default_config {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let mut app_config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    // Apply CLI overrides
    if let Some(epochs) = cli.epochs {
        app_config.training.epochs = epochs;
    }
    if let Some(batch_size) = cli.batch_size {
        app_config.training.batch_size = batch_size;
    }
    if let Some(lr) = cli.lr {
        app_config.optim.generator_lr = lr;
        app_config.optim.discriminator_lr = lr;
    }
    if let Some(dataset) = cli.dataset {
        app_config.data.source = dataset.into();
    }
    if cli.max_iterations.is_some() {
        app_config.training.max_iterations = cli.max_iterations;
    }
    if cli.sample_dir.is_some() {
        app_config.training.sample_dir = cli.sample_dir.clone();
    }
    app_config
        .validate()
        .context("invalid configuration after CLI overrides")?;

    let device = Default::default();
    let data = load_images::<TrainBackend>(
        &app_config.data,
        app_config.training.batch_size,
        &device,
    )
    .context("loading training images")?;

    let trainer = GanTrainer::<TrainBackend>::new(&app_config, &device);
    let (_, report) = trainer.train(&data).context("training failed")?;

    if let Some(path) = &cli.summary {
        let json = serde_json::to_string_pretty(&report).context("serializing run report")?;
        std::fs::write(path, json)
            .with_context(|| format!("writing run report to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Wrote run report");
    }

    Ok(())
}

//! Fit the crop classifier on the seeded synthetic dataset and write the
//! JSON artifact loaded by the pipeline.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rscrop::classify::training::{train, TrainingConfig};
use rscrop::collect::global_variables::default_model_path;

#[derive(Parser, Debug)]
#[command(name = "train_model", about = "Train the crop classifier artifact")]
struct Args {
    /// Output path of the artifact
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, default_value_t = 1600)]
    samples: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = 1000)]
    epochs: usize,

    #[arg(long, default_value_t = 1.0)]
    learning_rate: f64,

    #[arg(long, default_value_t = 1e-3)]
    l2: f64,

    #[arg(long, default_value_t = 0.10)]
    label_noise: f64,

    #[arg(long, default_value_t = 0.25)]
    holdout_fraction: f64,

    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = TrainingConfig {
        samples: args.samples,
        holdout_fraction: args.holdout_fraction,
        seed: args.seed,
        label_noise: args.label_noise,
        epochs: args.epochs,
        learning_rate: args.learning_rate,
        l2: args.l2,
        show_progress: !args.quiet,
        ..TrainingConfig::default()
    };

    let model = train(&config).context("Training failed")?;
    let output = args.output.unwrap_or_else(default_model_path);
    model.save(&output)?;

    println!("Model written to {}", output.display());
    println!(
        "Hold-out accuracy {:.2}% (baseline {:.2}%) on {} samples",
        model.training.accuracy, model.training.baseline_accuracy, model.training.holdout_samples
    );
    Ok(())
}

//! Train the shared quantile forecaster over a data directory.
//!
//! Invoked by an external scheduler or by hand; training runs as one
//! blocking job and only persists an artifact on success.
//!
//! Usage:
//!   cargo run --bin train -- --data-dir data --artifact model.json

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;

use quantile_forecast::{
    evaluate_forecaster, BuildConfig, ModelArtifact, ModelConfig, QuantileEvaluation,
    QuantileForecaster, SequenceDataset, Trainer, TrainingConfig, TrainingHistory,
};

#[derive(Parser, Debug)]
#[command(name = "train")]
#[command(about = "Train the multi-asset quantile forecasting model")]
struct Args {
    /// Directory of per-asset histories (data_dir/<asset>/<asset>.csv)
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Output path for the trained artifact
    #[arg(short, long, default_value = "model.json")]
    artifact: PathBuf,

    /// Output path for the training report
    #[arg(short, long, default_value = "training_report.json")]
    report: PathBuf,

    /// Input window length
    #[arg(long, default_value = "30")]
    seq_len: usize,

    /// Recency window in days
    #[arg(long, default_value = "730")]
    lookback_days: usize,

    /// Epoch budget
    #[arg(long, default_value = "20")]
    epochs: usize,

    /// Mini-batch size
    #[arg(long, default_value = "256")]
    batch_size: usize,

    /// Initial learning rate
    #[arg(long, default_value = "0.001")]
    learning_rate: f64,

    /// GRU hidden size
    #[arg(long, default_value = "64")]
    hidden_size: usize,

    /// Asset embedding dimension
    #[arg(long, default_value = "16")]
    embed_dim: usize,
}

/// Everything the run produced besides the artifact itself
#[derive(Serialize)]
struct TrainingReport {
    model_config: ModelConfig,
    training_config: TrainingConfig,
    history: TrainingHistory,
    evaluation: QuantileEvaluation,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    log::info!("building dataset from {}", args.data_dir.display());
    let build_config = BuildConfig {
        seq_len: args.seq_len,
        lookback_days: args.lookback_days,
    };
    let (dataset, registry) = SequenceDataset::build(&args.data_dir, &build_config)?;
    log::info!(
        "{} examples across {} assets: {}",
        dataset.len(),
        registry.len(),
        registry.asset_ids().join(", ")
    );

    let model_config = ModelConfig {
        seq_len: args.seq_len,
        hidden_size: args.hidden_size,
        embed_dim: args.embed_dim,
        ..Default::default()
    }
    .with_num_assets(registry.len());
    let mut model = QuantileForecaster::new(model_config.clone())?;
    log::info!("model has {} parameters", model.num_params());

    let training_config = TrainingConfig {
        epochs: args.epochs,
        batch_size: args.batch_size,
        learning_rate: args.learning_rate,
        ..Default::default()
    };
    let mut trainer = Trainer::new(training_config.clone());
    let history = trainer.train(&mut model, &dataset)?.clone();

    log::info!("evaluating on the full example set");
    let evaluation = evaluate_forecaster(&model, &dataset, &registry)?;
    for (head, metrics) in &evaluation.per_quantile {
        log::info!(
            "{head}: rmse {:.4}, mae {:.4}, mape {:.2}%, r2 {:.4}",
            metrics.rmse,
            metrics.mae,
            metrics.mape,
            metrics.r2
        );
    }
    log::info!(
        "mean interval widths: {:.4} / {:.4} / {:.4}",
        evaluation.intervals.mean_lower_interval,
        evaluation.intervals.mean_upper_interval,
        evaluation.intervals.mean_total_interval
    );

    let artifact = ModelArtifact::new(model, registry)?;
    artifact.save(&args.artifact)?;

    let report = TrainingReport {
        model_config,
        training_config,
        history,
        evaluation,
    };
    std::fs::write(&args.report, serde_json::to_string_pretty(&report)?)?;
    log::info!("training report written to {}", args.report.display());

    Ok(())
}

//! Produce a horizon-adjusted forecast for one asset.
//!
//! Usage:
//!   cargo run --bin forecast -- nifty50 --horizon 7 --artifact model.json

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use quantile_forecast::ForecastService;

#[derive(Parser, Debug)]
#[command(name = "forecast")]
#[command(about = "Forecast quantile price bands for one asset")]
struct Args {
    /// Asset identifier (e.g. 'nifty50', 'reliance', 'gold', 'usdinr')
    asset_id: String,

    /// Days ahead to forecast (clamped to 1-30)
    #[arg(short = 'n', long, default_value = "1")]
    horizon: u32,

    /// Path to the trained artifact
    #[arg(short, long, default_value = "model.json")]
    artifact: PathBuf,

    /// Directory of per-asset histories
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    let service = ForecastService::open(&args.artifact, &args.data_dir)?;
    let forecast = service.forecast(&args.asset_id, args.horizon)?;

    println!("{}", serde_json::to_string_pretty(&forecast)?);
    Ok(())
}

//! End-to-end pipeline tests over synthetic price histories.
//!
//! These drive the public API the way the binaries do: write per-asset
//! CSV files, build the dataset, train briefly, persist the artifact and
//! serve forecasts, checking the output invariants the engine promises.

use std::io::Write;
use std::path::Path;

use quantile_forecast::{
    BuildConfig, ForecastError, ForecastService, ModelArtifact, ModelConfig, QuantileForecaster,
    SequenceDataset, Trainer, TrainingConfig,
};

const SEQ_LEN: usize = 12;

/// Write `data_dir/<asset>/<asset>.csv` with daily timestamps
fn write_history(data_dir: &Path, asset_id: &str, closes: &[f64]) {
    let dir = data_dir.join(asset_id);
    std::fs::create_dir_all(&dir).unwrap();
    let mut file = std::fs::File::create(dir.join(format!("{asset_id}.csv"))).unwrap();
    writeln!(file, "timestamp,close").unwrap();
    let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    for (i, close) in closes.iter().enumerate() {
        let date = start + chrono::Duration::days(i as i64);
        writeln!(file, "{date},{close:.6}").unwrap();
    }
}

/// Gently trending, mildly oscillating synthetic series
fn synthetic_series(start: f64, drift: f64, wobble: f64, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| start + drift * i as f64 + wobble * (i as f64 * 0.61).sin())
        .collect()
}

/// A universe with price scales orders of magnitude apart, like a real
/// mixed universe of an index, an equity and a currency pair.
fn write_universe(data_dir: &Path) {
    write_history(
        data_dir,
        "nifty50",
        &synthetic_series(21000.0, 12.0, 140.0, 90),
    );
    write_history(
        data_dir,
        "reliance",
        &synthetic_series(2400.0, 1.5, 18.0, 90),
    );
    write_history(data_dir, "usdinr", &synthetic_series(82.0, 0.01, 0.4, 90));
}

fn quick_model(num_assets: usize) -> QuantileForecaster {
    let config = ModelConfig {
        seq_len: SEQ_LEN,
        num_assets,
        hidden_size: 8,
        embed_dim: 4,
        trunk_size: 8,
        dropout: 0.0,
        quantiles: vec![0.1, 0.5, 0.9],
    };
    QuantileForecaster::new(config).unwrap()
}

fn build_config() -> BuildConfig {
    BuildConfig {
        seq_len: SEQ_LEN,
        lookback_days: 730,
    }
}

/// Build, train briefly and save an artifact for the universe
fn trained_service(data_dir: &Path, artifact_path: &Path) -> ForecastService {
    let (dataset, registry) = SequenceDataset::build(data_dir, &build_config()).unwrap();

    let mut model = quick_model(registry.len());
    let mut trainer = Trainer::new(TrainingConfig::quick());
    trainer.train(&mut model, &dataset).unwrap();

    let artifact = ModelArtifact::new(model, registry).unwrap();
    artifact.save(artifact_path).unwrap();

    ForecastService::open(artifact_path, data_dir).unwrap()
}

#[test]
fn full_pipeline_trains_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    write_universe(dir.path());

    let (dataset, registry) = SequenceDataset::build(dir.path(), &build_config()).unwrap();
    assert_eq!(registry.len(), 3);
    // 90 rows -> 78 windows per asset
    assert_eq!(dataset.len(), 3 * (90 - SEQ_LEN));
    assert_eq!(dataset.windows.ncols(), SEQ_LEN);

    let mut model = quick_model(3);
    let mut trainer = Trainer::new(TrainingConfig::quick());
    let history = trainer.train(&mut model, &dataset).unwrap();
    assert!(!history.train_loss.is_empty());
    assert!(history.train_loss.iter().all(|l| l.is_finite()));

    let artifact_path = dir.path().join("model.json");
    let artifact = ModelArtifact::new(model, registry).unwrap();
    artifact.save(&artifact_path).unwrap();
    assert!(artifact_path.exists());

    let loaded = ModelArtifact::load(&artifact_path).unwrap();
    assert_eq!(loaded.registry.len(), 3);
}

#[test]
fn forecasts_satisfy_output_invariants() {
    let dir = tempfile::tempdir().unwrap();
    write_universe(dir.path());
    let service = trained_service(dir.path(), &dir.path().join("model.json"));

    for asset in ["nifty50", "reliance", "usdinr"] {
        for horizon in [1, 7, 30] {
            let forecast = service.forecast(asset, horizon).unwrap();

            assert!(
                forecast.q10 <= forecast.q50 && forecast.q50 <= forecast.q90,
                "{asset} h={horizon}: ordering violated: {forecast:?}"
            );
            assert!(forecast.q10 > 0.0, "{asset} h={horizon}: floor violated");

            let current = forecast.current_price;
            for q in [forecast.q10, forecast.q50, forecast.q90] {
                assert!(
                    (q - current).abs() / current <= 0.5 + 1e-9,
                    "{asset} h={horizon}: movement cap violated: {q} vs {current}"
                );
            }
        }
    }
}

#[test]
fn forecast_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    write_universe(dir.path());
    let service = trained_service(dir.path(), &dir.path().join("model.json"));

    let a = service.forecast("reliance", 7).unwrap();
    let b = service.forecast("reliance", 7).unwrap();

    assert_eq!(a.q10, b.q10);
    assert_eq!(a.q50, b.q50);
    assert_eq!(a.q90, b.q90);
    assert_eq!(a.current_price, b.current_price);
}

#[test]
fn interval_widens_with_horizon() {
    let dir = tempfile::tempdir().unwrap();
    write_universe(dir.path());
    // Flat series ending in a dip: the latest price sits below the
    // median, so the projected median moves away from the current price
    // as the horizon grows and the band has room to widen.
    let mut gold = synthetic_series(1900.0, 0.0, 15.0, 85);
    gold.extend([1885.0, 1872.0, 1860.0, 1850.0, 1840.0]);
    write_history(dir.path(), "gold", &gold);

    let service = trained_service(dir.path(), &dir.path().join("model.json"));

    let short = service.forecast("gold", 1).unwrap();
    let long = service.forecast("gold", 7).unwrap();

    let short_width = short.q90 - short.q10;
    let long_width = long.q90 - long.q10;
    assert!(
        long_width >= short_width - 1e-9,
        "width at h=7 ({long_width}) should not be narrower than at h=1 ({short_width})"
    );
}

#[test]
fn horizon_is_clamped_not_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_universe(dir.path());
    let service = trained_service(dir.path(), &dir.path().join("model.json"));

    let clamped = service.forecast("usdinr", 45).unwrap();
    let at_max = service.forecast("usdinr", 30).unwrap();

    assert_eq!(clamped.horizon_days, 30);
    assert_eq!(clamped.q10, at_max.q10);
    assert_eq!(clamped.q50, at_max.q50);
    assert_eq!(clamped.q90, at_max.q90);

    let floor = service.forecast("usdinr", 0).unwrap();
    assert_eq!(floor.horizon_days, 1);
}

#[test]
fn unknown_asset_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_universe(dir.path());
    let service = trained_service(dir.path(), &dir.path().join("model.json"));

    let err = service.forecast("unknown_id", 5).unwrap_err();
    assert!(matches!(err, ForecastError::UnknownAsset(_)));
}

#[test]
fn short_history_asset_skipped_in_build() {
    let dir = tempfile::tempdir().unwrap();
    write_universe(dir.path());
    // Fewer than SEQ_LEN + 1 rows: must be skipped, not fatal
    write_history(dir.path(), "stub", &synthetic_series(10.0, 0.1, 0.0, SEQ_LEN));

    let (dataset, registry) = SequenceDataset::build(dir.path(), &build_config()).unwrap();
    assert_eq!(registry.len(), 3);
    assert!(!registry.contains("stub"));
    assert_eq!(dataset.len(), 3 * (90 - SEQ_LEN));
}

#[test]
fn mismatched_artifact_refuses_to_serve() {
    let dir = tempfile::tempdir().unwrap();
    write_universe(dir.path());

    let (_, registry) = SequenceDataset::build(dir.path(), &build_config()).unwrap();
    // Model sized for a different universe than the registry
    let model = quick_model(registry.len() + 1);

    let err = ModelArtifact::new(model, registry).unwrap_err();
    assert!(matches!(err, ForecastError::ArtifactMismatch(_)));
}

#[test]
fn reload_swaps_the_artifact() {
    let dir = tempfile::tempdir().unwrap();
    write_universe(dir.path());

    let first_path = dir.path().join("model_a.json");
    let mut service = trained_service(dir.path(), &first_path);
    let before = service.forecast("usdinr", 3).unwrap();

    // Retrain into a second artifact and hot-swap
    let second_path = dir.path().join("model_b.json");
    let (dataset, registry) = SequenceDataset::build(dir.path(), &build_config()).unwrap();
    let mut model = quick_model(registry.len());
    let mut trainer = Trainer::new(TrainingConfig::quick());
    trainer.train(&mut model, &dataset).unwrap();
    ModelArtifact::new(model, registry)
        .unwrap()
        .save(&second_path)
        .unwrap();

    service.reload(&second_path).unwrap();
    let after = service.forecast("usdinr", 3).unwrap();

    // Both artifacts serve valid bands; the swap itself must not error
    assert!(before.q10 <= before.q90);
    assert!(after.q10 <= after.q90);
}

#[test]
fn insufficient_serving_history_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_universe(dir.path());
    let service = trained_service(dir.path(), &dir.path().join("model.json"));

    // Truncate one asset's history below the window length after training
    write_history(
        dir.path(),
        "usdinr",
        &synthetic_series(82.0, 0.01, 0.4, SEQ_LEN - 2),
    );

    let err = service.forecast("usdinr", 5).unwrap_err();
    assert!(matches!(err, ForecastError::InsufficientHistory { .. }));
}

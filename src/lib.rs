//! # quantile-forecast
//!
//! Multi-asset price forecasting with calibrated uncertainty bands.
//!
//! One shared GRU model is trained jointly across a fixed universe of
//! instruments (indices, equities, commodities, currency pairs). Each
//! asset gets its own robust normalizer and a learned embedding row, so a
//! single set of weights can serve raw price scales that differ by orders
//! of magnitude. Three output heads trained under the pinball loss yield
//! the 10th/50th/90th conditional quantiles of the next normalized close;
//! at serve time the one-step band is projected to the requested horizon
//! by square-root-of-time scaling and repaired to satisfy ordering and
//! boundedness invariants.
//!
//! ## Modules
//!
//! - `registry` - asset id/index mapping and per-asset normalizers
//! - `data` - history loading and sliding-window dataset construction
//! - `model` - the shared encoder, embedding, heads and optimizers
//! - `training` - pinball loss, training schedule and diagnostics
//! - `inference` - horizon projection, invariant repair, serving context
//! - `artifact` - the versioned model+registry bundle
//!
//! ## Quick start
//!
//! ```no_run
//! use std::path::Path;
//! use quantile_forecast::{
//!     BuildConfig, ForecastService, ModelArtifact, ModelConfig, QuantileForecaster,
//!     SequenceDataset, Trainer, TrainingConfig,
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     // Build the dataset and registry from per-asset CSV histories
//!     let (dataset, registry) =
//!         SequenceDataset::build(Path::new("data"), &BuildConfig::default())?;
//!
//!     // Train one shared model across all assets
//!     let config = ModelConfig::default().with_num_assets(registry.len());
//!     let mut model = QuantileForecaster::new(config)?;
//!     let mut trainer = Trainer::new(TrainingConfig::default());
//!     trainer.train(&mut model, &dataset)?;
//!
//!     // Persist and serve
//!     let artifact = ModelArtifact::new(model, registry)?;
//!     artifact.save(Path::new("model.json"))?;
//!
//!     let service = ForecastService::open(Path::new("model.json"), "data")?;
//!     let forecast = service.forecast("nifty50", 7)?;
//!     println!("{forecast:?}");
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod data;
pub mod error;
pub mod inference;
pub mod model;
pub mod registry;
pub mod training;

pub use artifact::{ModelArtifact, ARTIFACT_VERSION};
pub use data::{Batch, BuildConfig, PriceHistory, SequenceDataset};
pub use error::{ForecastError, Result};
pub use inference::{Forecast, ForecastService, QuantileBands, RepairPolicy};
pub use model::{ModelConfig, QuantileForecaster};
pub use registry::{AssetRegistry, RobustScaler};
pub use training::{
    evaluate_forecaster, QuantileEvaluation, QuantileLoss, Trainer, TrainingConfig,
    TrainingHistory,
};

/// Engine-wide default constants
pub mod defaults {
    /// Input window length
    pub const SEQ_LEN: usize = 30;

    /// Recency window for training data, in days
    pub const LOOKBACK_DAYS: usize = 730;

    /// Quantile levels served by the engine
    pub const QUANTILES: [f64; 3] = [0.1, 0.5, 0.9];

    /// Initial Adam learning rate
    pub const LEARNING_RATE: f64 = 0.001;

    /// Longest horizon the projector serves
    pub const MAX_HORIZON_DAYS: u32 = 30;
}

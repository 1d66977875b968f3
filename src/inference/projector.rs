//! Serving context and horizon projection.
//!
//! [`ForecastService`] is the explicitly constructed, immutable context
//! for inference: a loaded artifact plus the data directory. There are no
//! module-level globals; hot-swapping a freshly trained artifact is an
//! explicit [`ForecastService::reload`] by the surrounding service, and
//! inference keeps serving the previously loaded artifact until then.

use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use super::repair::{repair, scale_to_horizon, QuantileBands, RepairPolicy};
use crate::artifact::ModelArtifact;
use crate::data::PriceHistory;
use crate::error::{ForecastError, Result};
use crate::registry::AssetRegistry;

/// A horizon-adjusted quantile forecast for one asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub asset_id: String,
    pub current_price: f64,
    pub horizon_days: u32,
    pub q10: f64,
    pub q50: f64,
    pub q90: f64,
}

/// Inference context: trained artifact + price data directory.
pub struct ForecastService {
    artifact: ModelArtifact,
    data_dir: PathBuf,
    policy: RepairPolicy,
}

impl ForecastService {
    /// Build a service from an already loaded artifact
    pub fn new(artifact: ModelArtifact, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifact,
            data_dir: data_dir.into(),
            policy: RepairPolicy::default(),
        }
    }

    /// Load the artifact from disk and build the service
    pub fn open(artifact_path: &Path, data_dir: impl Into<PathBuf>) -> Result<Self> {
        let artifact = ModelArtifact::load(artifact_path)?;
        Ok(Self::new(artifact, data_dir))
    }

    /// Override the serving policy
    pub fn with_policy(mut self, policy: RepairPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Swap in a freshly trained artifact. The previous artifact keeps
    /// serving if the load fails.
    pub fn reload(&mut self, artifact_path: &Path) -> Result<()> {
        self.artifact = ModelArtifact::load(artifact_path)?;
        Ok(())
    }

    /// The registry the loaded model was trained against
    pub fn registry(&self) -> &AssetRegistry {
        &self.artifact.registry
    }

    /// Serving policy in effect
    pub fn policy(&self) -> &RepairPolicy {
        &self.policy
    }

    /// Forecast an asset `horizon_days` ahead.
    ///
    /// Horizons outside the served range are clamped, not rejected. The
    /// returned band always satisfies `q10 <= q50 <= q90`, the positive
    /// floor, and the movement cap.
    pub fn forecast(&self, asset_id: &str, horizon_days: u32) -> Result<Forecast> {
        // Single existence check up front; everything after may assume
        // the asset is known.
        let asset_index = self.artifact.registry.index_of(asset_id)?;
        let horizon = self.policy.clamp_horizon(horizon_days);

        let seq_len = self.artifact.model.config.seq_len;
        let closes = self.latest_closes(asset_id)?;
        if closes.len() < seq_len {
            return Err(ForecastError::InsufficientHistory {
                asset: asset_id.to_string(),
                rows: closes.len(),
                needed: seq_len,
            });
        }

        let window = &closes[closes.len() - seq_len..];
        let current_price = closes[closes.len() - 1];

        let normalized = self.artifact.registry.normalize(asset_id, window)?;
        let outputs = self
            .artifact
            .model
            .predict_one(ndarray::ArrayView1::from(&normalized[..]), asset_index);
        let raw = self
            .artifact
            .registry
            .denormalize(asset_id, &outputs.to_vec())?;

        // Lower / median / upper heads in quantile order
        let one_step = QuantileBands {
            q10: raw[0],
            q50: raw[raw.len() / 2],
            q90: raw[raw.len() - 1],
        };
        debug!(
            "{asset_id}: one-step band ({:.4}, {:.4}, {:.4}) at price {current_price:.4}",
            one_step.q10, one_step.q50, one_step.q90
        );

        let projected = if horizon > 1 {
            scale_to_horizon(one_step, current_price, horizon, &self.policy)
        } else {
            one_step
        };
        let bands = repair(projected, current_price, &self.policy);

        Ok(Forecast {
            asset_id: asset_id.to_string(),
            current_price,
            horizon_days: horizon,
            q10: bands.q10,
            q50: bands.q50,
            q90: bands.q90,
        })
    }

    /// Latest closes for an asset, recency-filtered the same way the
    /// training build filters.
    fn latest_closes(&self, asset_id: &str) -> Result<Vec<f64>> {
        let path = PriceHistory::asset_file(&self.data_dir, asset_id);
        let mut history = PriceHistory::from_csv(asset_id, &path)?;
        history.restrict_recent(crate::defaults::LOOKBACK_DAYS);
        Ok(history.closes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forecast_serializes_to_json() {
        let forecast = Forecast {
            asset_id: "nifty50".to_string(),
            current_price: 22150.0,
            horizon_days: 7,
            q10: 21600.0,
            q50: 22300.0,
            q90: 23050.0,
        };

        let json = serde_json::to_string(&forecast).unwrap();
        let back: Forecast = serde_json::from_str(&json).unwrap();
        assert_eq!(back.asset_id, "nifty50");
        assert_eq!(back.horizon_days, 7);
    }
}

//! Versioned model artifact.
//!
//! A trained model is only meaningful against the registry it was trained
//! with: embedding rows are positional and scalers are per-asset, so the
//! two persist and load as one bundle. A cardinality disagreement between
//! the embedding table and the registry is fatal; the artifact refuses to
//! load rather than serve wrong-asset predictions.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::model::QuantileForecaster;
use crate::registry::AssetRegistry;

/// Current on-disk format version
pub const ARTIFACT_VERSION: u32 = 1;

/// Trained model plus the registry it was trained against.
#[derive(Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub model: QuantileForecaster,
    pub registry: AssetRegistry,
}

impl std::fmt::Debug for ModelArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelArtifact")
            .field("version", &self.version)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ModelArtifact {
    /// Bundle a model with its registry, rejecting mismatched pairs.
    pub fn new(model: QuantileForecaster, registry: AssetRegistry) -> Result<Self> {
        let artifact = Self {
            version: ARTIFACT_VERSION,
            model,
            registry,
        };
        artifact.validate()?;
        Ok(artifact)
    }

    /// Check the model/registry pair is consistent.
    pub fn validate(&self) -> Result<()> {
        if self.version != ARTIFACT_VERSION {
            return Err(ForecastError::ArtifactMismatch(format!(
                "unsupported artifact version {} (expected {ARTIFACT_VERSION})",
                self.version
            )));
        }

        let model_assets = self.model.num_assets();
        let registry_assets = self.registry.len();
        if model_assets != registry_assets {
            return Err(ForecastError::ArtifactMismatch(format!(
                "embedding table has {model_assets} assets, registry has {registry_assets}"
            )));
        }

        if self.model.config.seq_len != self.registry.seq_len() {
            return Err(ForecastError::ArtifactMismatch(format!(
                "model window length {} differs from registry window length {}",
                self.model.config.seq_len,
                self.registry.seq_len()
            )));
        }

        Ok(())
    }

    /// Persist the bundle. Writes to a sibling temp file first and renames
    /// into place so a crashed save never leaves a torn artifact behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;

        let tmp = path.with_extension("tmp");
        {
            let file = File::create(&tmp)?;
            let writer = BufWriter::new(file);
            serde_json::to_writer(writer, self)?;
        }
        std::fs::rename(&tmp, path)?;

        info!(
            "saved artifact to {} ({} assets, {} parameters)",
            path.display(),
            self.registry.len(),
            self.model.num_params()
        );
        Ok(())
    }

    /// Load and validate a bundle.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let artifact: Self = serde_json::from_reader(reader)?;
        artifact.validate()?;

        info!(
            "loaded artifact from {} ({} assets)",
            path.display(),
            artifact.registry.len()
        );
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;

    fn fitted_registry(seq_len: usize, assets: &[&str]) -> AssetRegistry {
        let mut registry = AssetRegistry::new(seq_len);
        for (k, id) in assets.iter().enumerate() {
            let prices: Vec<f64> = (0..seq_len + 5)
                .map(|i| 100.0 * (k + 1) as f64 + i as f64)
                .collect();
            registry.register(id, &prices).unwrap();
        }
        registry
    }

    fn small_model(seq_len: usize, num_assets: usize) -> QuantileForecaster {
        let config = ModelConfig {
            seq_len,
            num_assets,
            hidden_size: 6,
            embed_dim: 3,
            trunk_size: 5,
            dropout: 0.0,
            quantiles: vec![0.1, 0.5, 0.9],
        };
        QuantileForecaster::new(config).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let registry = fitted_registry(8, &["gold", "silver"]);
        let model = small_model(8, 2);
        let artifact = ModelArtifact::new(model, registry).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        artifact.save(&path).unwrap();

        let loaded = ModelArtifact::load(&path).unwrap();
        assert_eq!(loaded.registry.len(), 2);
        assert_eq!(loaded.model.num_assets(), 2);
        assert_eq!(loaded.version, ARTIFACT_VERSION);
    }

    #[test]
    fn test_cardinality_mismatch_rejected() {
        let registry = fitted_registry(8, &["gold", "silver", "crudeoil"]);
        let model = small_model(8, 2);

        let err = ModelArtifact::new(model, registry).unwrap_err();
        assert!(matches!(err, ForecastError::ArtifactMismatch(_)));
    }

    #[test]
    fn test_window_length_mismatch_rejected() {
        let registry = fitted_registry(10, &["gold"]);
        let model = small_model(8, 1);

        let err = ModelArtifact::new(model, registry).unwrap_err();
        assert!(matches!(err, ForecastError::ArtifactMismatch(_)));
    }

    #[test]
    fn test_loading_mismatched_pair_from_disk_fails() {
        let registry = fitted_registry(8, &["gold", "silver"]);
        let model = small_model(8, 2);
        let artifact = ModelArtifact::new(model, registry).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        artifact.save(&path).unwrap();

        // Corrupt the pairing on disk: drop one registry entry
        let mut value: serde_json::Value =
            serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        let entries = value["registry"]["entries"].as_array_mut().unwrap();
        entries.pop();
        serde_json::to_writer(File::create(&path).unwrap(), &value).unwrap();

        let err = ModelArtifact::load(&path).unwrap_err();
        assert!(matches!(err, ForecastError::ArtifactMismatch(_)));
    }
}

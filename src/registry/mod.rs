//! Asset registry: identifier/index mapping and per-asset normalizers.
//!
//! The registry owns the dense integer index each asset gets in the model's
//! embedding table and the scaler fitted over that asset's own history.
//! Index assignment is first-seen order and must stay stable for the
//! lifetime of a trained model; the registry is persisted inside the model
//! artifact and never mutated after training.

mod scaler;

pub use scaler::RobustScaler;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AssetEntry {
    id: String,
    scaler: RobustScaler,
}

/// Serialized form: entry order encodes the index assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistrySnapshot {
    seq_len: usize,
    entries: Vec<AssetEntry>,
}

/// Identifier/index mapping plus one fitted [`RobustScaler`] per asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RegistrySnapshot", into = "RegistrySnapshot")]
pub struct AssetRegistry {
    seq_len: usize,
    entries: Vec<AssetEntry>,
    index: HashMap<String, usize>,
}

impl AssetRegistry {
    /// Create an empty registry for the given input window length.
    pub fn new(seq_len: usize) -> Self {
        Self {
            seq_len,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Window length the registry was built for
    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// Register an asset and fit its scaler over the given price history.
    ///
    /// Returns the asset's dense index. Re-registering an existing id
    /// refits its scaler and keeps the index stable. Fails with
    /// [`ForecastError::InsufficientHistory`] when the history cannot
    /// produce a single training example.
    pub fn register(&mut self, asset_id: &str, prices: &[f64]) -> Result<usize> {
        let needed = self.seq_len + 1;
        if prices.len() < needed {
            return Err(ForecastError::InsufficientHistory {
                asset: asset_id.to_string(),
                rows: prices.len(),
                needed,
            });
        }

        let scaler = RobustScaler::fit(prices);

        if let Some(&idx) = self.index.get(asset_id) {
            self.entries[idx].scaler = scaler;
            return Ok(idx);
        }

        let idx = self.entries.len();
        self.entries.push(AssetEntry {
            id: asset_id.to_string(),
            scaler,
        });
        self.index.insert(asset_id.to_string(), idx);
        Ok(idx)
    }

    /// Dense index for an asset id
    pub fn index_of(&self, asset_id: &str) -> Result<usize> {
        self.index
            .get(asset_id)
            .copied()
            .ok_or_else(|| ForecastError::UnknownAsset(asset_id.to_string()))
    }

    /// Asset id for a dense index
    pub fn asset_id(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|e| e.id.as_str())
    }

    /// Whether an asset id is registered
    pub fn contains(&self, asset_id: &str) -> bool {
        self.index.contains_key(asset_id)
    }

    /// Number of registered assets
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered asset ids in index order
    pub fn asset_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }

    /// Scaler for an asset. Single guard point for unknown identifiers:
    /// every per-asset lookup funnels through here.
    pub fn scaler(&self, asset_id: &str) -> Result<&RobustScaler> {
        let idx = self.index_of(asset_id)?;
        Ok(&self.entries[idx].scaler)
    }

    /// Map raw prices onto the asset's normalized scale
    pub fn normalize(&self, asset_id: &str, prices: &[f64]) -> Result<Vec<f64>> {
        Ok(self.scaler(asset_id)?.transform(prices))
    }

    /// Map normalized values back to raw prices
    pub fn denormalize(&self, asset_id: &str, values: &[f64]) -> Result<Vec<f64>> {
        Ok(self.scaler(asset_id)?.inverse(values))
    }
}

impl From<RegistrySnapshot> for AssetRegistry {
    fn from(snapshot: RegistrySnapshot) -> Self {
        let index = snapshot
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
        Self {
            seq_len: snapshot.seq_len,
            entries: snapshot.entries,
            index,
        }
    }
}

impl From<AssetRegistry> for RegistrySnapshot {
    fn from(registry: AssetRegistry) -> Self {
        Self {
            seq_len: registry.seq_len,
            entries: registry.entries,
        }
    }
}

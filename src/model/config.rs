//! Model configuration.

use serde::{Deserialize, Serialize};

/// Configuration of the shared quantile forecaster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Input window length
    pub seq_len: usize,

    /// Number of assets in the embedding table. Set from the registry at
    /// build time; the pair is validated again whenever an artifact loads.
    pub num_assets: usize,

    /// GRU hidden state size
    pub hidden_size: usize,

    /// Asset embedding dimension
    pub embed_dim: usize,

    /// Width of the dense trunk between encoder and heads
    pub trunk_size: usize,

    /// Dropout rate on the trunk during training
    pub dropout: f64,

    /// Quantile levels, one output head each, strictly increasing
    pub quantiles: Vec<f64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            seq_len: crate::defaults::SEQ_LEN,
            num_assets: 0,
            hidden_size: 64,
            embed_dim: 16,
            trunk_size: 64,
            dropout: 0.1,
            quantiles: crate::defaults::QUANTILES.to_vec(),
        }
    }
}

impl ModelConfig {
    /// Small model for quick experiments and tests
    pub fn small() -> Self {
        Self {
            hidden_size: 16,
            embed_dim: 4,
            trunk_size: 16,
            ..Default::default()
        }
    }

    /// Larger model for better fit at higher cost
    pub fn large() -> Self {
        Self {
            hidden_size: 128,
            embed_dim: 32,
            trunk_size: 128,
            ..Default::default()
        }
    }

    /// Set the embedding table size from the registry
    pub fn with_num_assets(mut self, num_assets: usize) -> Self {
        self.num_assets = num_assets;
        self
    }

    /// Set the input window length
    pub fn with_seq_len(mut self, seq_len: usize) -> Self {
        self.seq_len = seq_len;
        self
    }

    /// Number of output heads
    pub fn num_heads(&self) -> usize {
        self.quantiles.len()
    }

    /// Check the configuration is trainable
    pub fn validate(&self) -> Result<(), String> {
        if self.seq_len == 0 {
            return Err("seq_len must be > 0".to_string());
        }
        if self.num_assets == 0 {
            return Err("num_assets must be > 0".to_string());
        }
        if self.hidden_size == 0 || self.embed_dim == 0 || self.trunk_size == 0 {
            return Err("layer sizes must be > 0".to_string());
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err("dropout must be in [0, 1)".to_string());
        }
        if self.quantiles.is_empty() {
            return Err("quantiles must not be empty".to_string());
        }
        for pair in self.quantiles.windows(2) {
            if pair[0] >= pair[1] {
                return Err("quantiles must be strictly increasing".to_string());
            }
        }
        for &q in &self.quantiles {
            if q <= 0.0 || q >= 1.0 {
                return Err(format!("quantile {q} must be in (0, 1)"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_validates_with_assets() {
        let config = ModelConfig::default().with_num_assets(12);
        assert!(config.validate().is_ok());
        assert_eq!(config.num_heads(), 3);
    }

    #[test]
    fn test_zero_assets_rejected() {
        let config = ModelConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unordered_quantiles_rejected() {
        let mut config = ModelConfig::default().with_num_assets(3);
        config.quantiles = vec![0.5, 0.1, 0.9];
        assert!(config.validate().is_err());
    }
}

//! Learned asset embedding.
//!
//! One row per registered asset, concatenated with the pooled sequence
//! representation. This is what lets a single set of shared weights serve
//! heterogeneous instruments: the row gives each asset a distinguishable
//! bias on top of the per-asset normalization done upstream.

use ndarray::{Array1, Array2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use serde::{Deserialize, Serialize};

/// Embedding table `(num_assets, embed_dim)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub num_assets: usize,
    pub embed_dim: usize,
    weights: Array2<f64>,
}

impl Embedding {
    /// Create a table with small uniform initialization
    pub fn new(num_assets: usize, embed_dim: usize) -> Self {
        let limit = (1.0 / embed_dim as f64).sqrt();
        Self {
            num_assets,
            embed_dim,
            weights: Array2::random((num_assets, embed_dim), Uniform::new(-limit, limit)),
        }
    }

    /// Embedding row for one asset index
    pub fn lookup(&self, asset_index: usize) -> Array1<f64> {
        self.weights.row(asset_index).to_owned()
    }

    /// Embedding rows for a batch of asset indices `(batch, embed_dim)`
    pub fn lookup_batch(&self, asset_indices: &[usize]) -> Array2<f64> {
        self.weights.select(Axis(0), asset_indices)
    }

    /// Accumulate per-row gradients for a batch into `grads`
    pub fn accumulate_grads(
        &self,
        asset_indices: &[usize],
        output_gradients: &Array2<f64>,
        grads: &mut Array2<f64>,
    ) {
        for (row, &idx) in asset_indices.iter().enumerate() {
            let mut target = grads.row_mut(idx);
            target += &output_gradients.row(row);
        }
    }

    /// Zero gradient buffer matching the table shape
    pub fn zero_grads(&self) -> Array2<f64> {
        Array2::zeros(self.weights.dim())
    }

    /// Mutable access for the optimizer step
    pub fn weights_mut(&mut self) -> &mut Array2<f64> {
        &mut self.weights
    }

    /// Number of trainable parameters
    pub fn num_params(&self) -> usize {
        self.weights.len()
    }
}

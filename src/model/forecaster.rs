//! The shared quantile forecasting model.
//!
//! One set of weights serves every asset: a GRU encoder pools the
//! normalized price window, the asset's embedding row is concatenated with
//! the pooled state, and a dense trunk feeds three independent linear
//! heads, one per quantile level. All inputs and outputs live on the
//! normalized scale; callers denormalize through the correct asset's
//! scaler. The heads carry no ordering constraint; calibration is learned
//! during training and repaired at serve time.

use ndarray::{concatenate, s, Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use super::config::ModelConfig;
use super::dense::{Activation, Dense};
use super::embedding::Embedding;
use super::gru::{GruEncoder, GruGrads, GruOptimizer, GruStep};
use super::optimizer::{Adam, Optimizer};
use crate::error::{ForecastError, Result};

/// Gradients for every parameter tensor of one training step
pub struct GradientBundle {
    pub encoder: GruGrads,
    pub embedding: Array2<f64>,
    pub trunk_weights: Array2<f64>,
    pub trunk_biases: Array1<f64>,
    pub heads: Vec<(Array2<f64>, Array1<f64>)>,
}

impl GradientBundle {
    fn squared_norm(&self) -> f64 {
        let mut total = self.encoder.squared_norm();
        total += self.embedding.mapv(|v| v * v).sum();
        total += self.trunk_weights.mapv(|v| v * v).sum();
        total += self.trunk_biases.mapv(|v| v * v).sum();
        for (w, b) in &self.heads {
            total += w.mapv(|v| v * v).sum();
            total += b.mapv(|v| v * v).sum();
        }
        total
    }

    fn scale(&mut self, factor: f64) {
        self.encoder.scale(factor);
        self.embedding *= factor;
        self.trunk_weights *= factor;
        self.trunk_biases *= factor;
        for (w, b) in &mut self.heads {
            *w *= factor;
            *b *= factor;
        }
    }

    /// Global L2 norm across all tensors
    pub fn global_norm(&self) -> f64 {
        self.squared_norm().sqrt()
    }
}

struct Optimizers {
    encoder: GruOptimizer,
    embedding: Box<dyn Optimizer>,
    trunk: Box<dyn Optimizer>,
    heads: Vec<Box<dyn Optimizer>>,
}

struct ForwardCache {
    steps: Vec<Vec<GruStep>>,
    asset_indices: Vec<usize>,
}

/// Shared sequence model conditioned on asset identity, emitting one
/// normalized-space estimate per quantile level.
#[derive(Serialize, Deserialize)]
pub struct QuantileForecaster {
    pub config: ModelConfig,
    encoder: GruEncoder,
    embedding: Embedding,
    trunk: Dense,
    heads: Vec<Dense>,

    #[serde(skip)]
    optimizers: Option<Optimizers>,
    #[serde(skip)]
    cache: Option<ForwardCache>,
}

impl QuantileForecaster {
    /// Build a model for a validated configuration
    pub fn new(config: ModelConfig) -> Result<Self> {
        config
            .validate()
            .map_err(ForecastError::InvalidConfig)?;

        let encoder = GruEncoder::new(1, config.hidden_size);
        let embedding = Embedding::new(config.num_assets, config.embed_dim);
        let combined = config.hidden_size + config.embed_dim;
        let trunk =
            Dense::new(combined, config.trunk_size, Activation::Relu).with_dropout(config.dropout);
        let heads = (0..config.num_heads())
            .map(|_| Dense::new(config.trunk_size, 1, Activation::Linear))
            .collect();

        Ok(Self {
            config,
            encoder,
            embedding,
            trunk,
            heads,
            optimizers: None,
            cache: None,
        })
    }

    /// Number of rows in the embedding table; must equal the paired
    /// registry's asset count for the artifact to be servable.
    pub fn num_assets(&self) -> usize {
        self.embedding.num_assets
    }

    /// Total trainable parameters
    pub fn num_params(&self) -> usize {
        self.encoder.num_params()
            + self.embedding.num_params()
            + self.trunk.num_params()
            + self.heads.iter().map(|h| h.num_params()).sum::<usize>()
    }

    /// Predict quantiles for one window (pure, no dropout): the inference
    /// path. Output is `(num_quantiles,)` on the normalized scale.
    pub fn predict_one(&self, window: ArrayView1<f64>, asset_index: usize) -> Array1<f64> {
        let hidden = self.encoder.encode(window);
        let embedded = self.embedding.lookup(asset_index);

        let mut combined = Array2::zeros((1, hidden.len() + embedded.len()));
        combined
            .slice_mut(s![0, ..hidden.len()])
            .assign(&hidden);
        combined
            .slice_mut(s![0, hidden.len()..])
            .assign(&embedded);

        let trunk_out = self.trunk.apply(&combined);
        let mut outputs = Array1::zeros(self.heads.len());
        for (k, head) in self.heads.iter().enumerate() {
            outputs[k] = head.apply(&trunk_out)[[0, 0]];
        }
        outputs
    }

    /// Caching forward pass over a batch: `(batch, num_quantiles)`
    pub fn forward_batch(
        &mut self,
        windows: &Array2<f64>,
        asset_indices: &[usize],
        training: bool,
    ) -> Array2<f64> {
        let batch = windows.nrows();
        let hidden_size = self.encoder.hidden_size();

        let mut hidden = Array2::zeros((batch, hidden_size));
        let mut steps = Vec::with_capacity(batch);
        for (i, window) in windows.axis_iter(Axis(0)).enumerate() {
            let (h, cache) = self.encoder.encode_cached(window);
            hidden.row_mut(i).assign(&h);
            steps.push(cache);
        }

        let embedded = self.embedding.lookup_batch(asset_indices);
        let combined = concatenate![Axis(1), hidden, embedded];

        let trunk_out = self.trunk.forward(&combined, training);

        let mut outputs = Array2::zeros((batch, self.heads.len()));
        for (k, head) in self.heads.iter_mut().enumerate() {
            let col = head.forward(&trunk_out, training);
            outputs.column_mut(k).assign(&col.column(0));
        }

        self.cache = Some(ForwardCache {
            steps,
            asset_indices: asset_indices.to_vec(),
        });
        outputs
    }

    /// Backpropagate from per-head output gradients `(batch, num_quantiles)`
    /// through heads, trunk, embedding and BPTT.
    pub fn backward_batch(&mut self, output_gradients: &Array2<f64>) -> GradientBundle {
        let cache = self
            .cache
            .take()
            .expect("forward_batch must precede backward_batch");
        let hidden_size = self.encoder.hidden_size();
        let batch = output_gradients.nrows();

        let mut d_trunk_out = Array2::zeros((batch, self.config.trunk_size));
        let mut head_grads = Vec::with_capacity(self.heads.len());
        for (k, head) in self.heads.iter().enumerate() {
            let delta = output_gradients
                .column(k)
                .to_owned()
                .insert_axis(Axis(1));
            let (d_input, d_weights, d_biases) = head.backward(&delta);
            d_trunk_out = d_trunk_out + d_input;
            head_grads.push((d_weights, d_biases));
        }

        let (d_combined, trunk_weights, trunk_biases) = self.trunk.backward(&d_trunk_out);

        let d_hidden = d_combined.slice(s![.., ..hidden_size]);
        let d_embedded = d_combined.slice(s![.., hidden_size..]).to_owned();

        let mut embedding = self.embedding.zero_grads();
        self.embedding
            .accumulate_grads(&cache.asset_indices, &d_embedded, &mut embedding);

        let mut encoder = self.encoder.zero_grads();
        for (i, steps) in cache.steps.iter().enumerate() {
            let dh = d_hidden.row(i).to_owned();
            self.encoder.backward(steps, &dh, &mut encoder);
        }

        GradientBundle {
            encoder,
            embedding,
            trunk_weights,
            trunk_biases,
            heads: head_grads,
        }
    }

    /// Install fresh optimizer state cloned from a prototype
    pub fn init_optimizers(&mut self, prototype: &dyn Optimizer) {
        self.optimizers = Some(Optimizers {
            encoder: GruOptimizer::new(prototype),
            embedding: prototype.clone_box(),
            trunk: prototype.clone_box(),
            heads: self.heads.iter().map(|_| prototype.clone_box()).collect(),
        });
    }

    /// Fan a new learning rate out to every optimizer (plateau decay)
    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        if let Some(opt) = self.optimizers.as_mut() {
            opt.encoder.set_learning_rate(learning_rate);
            opt.embedding.set_learning_rate(learning_rate);
            opt.trunk.set_learning_rate(learning_rate);
            for head in &mut opt.heads {
                head.set_learning_rate(learning_rate);
            }
        }
    }

    /// Apply one step of gradients, optionally clipped by global norm.
    /// Falls back to a default Adam if no optimizer was installed.
    pub fn apply_gradients(&mut self, mut grads: GradientBundle, clip_norm: Option<f64>) {
        if let Some(max_norm) = clip_norm {
            let norm = grads.global_norm();
            if norm > max_norm && norm > 0.0 {
                grads.scale(max_norm / norm);
            }
        }

        if self.optimizers.is_none() {
            self.init_optimizers(&Adam::new(crate::defaults::LEARNING_RATE));
        }
        let opt = self.optimizers.as_mut().expect("optimizers installed above");

        self.encoder.apply_gradients(&grads.encoder, &mut opt.encoder);
        opt.embedding
            .update_weights(self.embedding.weights_mut(), &grads.embedding);
        opt.trunk
            .update_weights(&mut self.trunk.weights, &grads.trunk_weights);
        opt.trunk
            .update_biases(&mut self.trunk.biases, &grads.trunk_biases);
        for ((head, head_opt), (dw, db)) in self
            .heads
            .iter_mut()
            .zip(opt.heads.iter_mut())
            .zip(grads.heads.iter())
        {
            head_opt.update_weights(&mut head.weights, dw);
            head_opt.update_biases(&mut head.biases, db);
        }
    }
}

impl Clone for QuantileForecaster {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            encoder: self.encoder.clone(),
            embedding: self.embedding.clone(),
            trunk: self.trunk.clone(),
            heads: self.heads.clone(),
            optimizers: None,
            cache: None,
        }
    }
}

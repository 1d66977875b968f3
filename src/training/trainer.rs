//! Training loop for the shared forecaster.
//!
//! One blocking job over the full multi-asset example set: shuffled
//! mini-batches, per-epoch validation on the trailing split, early
//! stopping on a loss plateau, learning-rate halving on a shorter
//! plateau, and best-validation checkpointing so the shipped weights are
//! the best seen rather than the final epoch's. A non-finite loss aborts
//! the run before anything can be persisted.

use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use serde::{Deserialize, Serialize};

use super::loss::QuantileLoss;
use crate::data::SequenceDataset;
use crate::error::{ForecastError, Result};
use crate::model::{Adam, QuantileForecaster};

/// Training schedule parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Epoch budget
    pub epochs: usize,

    /// Mini-batch size
    pub batch_size: usize,

    /// Initial Adam learning rate
    pub learning_rate: f64,

    /// Trailing fraction of examples held out for validation
    pub validation_split: f64,

    /// Early stopping: epochs without improvement before aborting
    pub patience: usize,

    /// Minimum improvement that resets the plateau counters
    pub min_delta: f64,

    /// Epochs without improvement before the learning rate decays
    pub lr_patience: usize,

    /// Multiplier applied to the learning rate on plateau
    pub lr_factor: f64,

    /// Learning rate floor
    pub min_learning_rate: f64,

    /// Global-norm gradient clip; None disables
    pub gradient_clip: Option<f64>,

    /// Draw an epoch progress bar
    pub show_progress: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 20,
            batch_size: 256,
            learning_rate: crate::defaults::LEARNING_RATE,
            validation_split: 0.1,
            patience: 5,
            min_delta: 1e-4,
            lr_patience: 3,
            lr_factor: 0.5,
            min_learning_rate: 1e-6,
            gradient_clip: Some(1.0),
            show_progress: true,
        }
    }
}

impl TrainingConfig {
    /// Short schedule for tests and smoke runs
    pub fn quick() -> Self {
        Self {
            epochs: 3,
            batch_size: 32,
            show_progress: false,
            ..Default::default()
        }
    }
}

/// Per-epoch losses and checkpoint bookkeeping
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub train_loss: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub best_val_loss: f64,
    pub best_epoch: usize,
    pub stopped_early: bool,
    pub final_learning_rate: f64,
}

/// Fits a [`QuantileForecaster`] against the full example set.
pub struct Trainer {
    config: TrainingConfig,
    history: TrainingHistory,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            history: TrainingHistory::default(),
        }
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    /// Run the full schedule. On success the model holds the
    /// best-validation weights seen during the run.
    pub fn train(
        &mut self,
        model: &mut QuantileForecaster,
        dataset: &SequenceDataset,
    ) -> Result<&TrainingHistory> {
        if dataset.is_empty() {
            return Err(ForecastError::NoUsableAssets);
        }

        let loss = QuantileLoss::new(model.config.quantiles.clone());
        let (train, val) = dataset.split(1.0 - self.config.validation_split);
        let train = if train.is_empty() { dataset.clone() } else { train };

        info!(
            "training on {} examples, validating on {} ({} parameters)",
            train.len(),
            val.len(),
            model.num_params()
        );

        let mut learning_rate = self.config.learning_rate;
        model.init_optimizers(&Adam::new(learning_rate));

        self.history = TrainingHistory::default();
        let mut best: Option<QuantileForecaster> = None;
        let mut best_val = f64::INFINITY;
        let mut stall = 0usize;
        let mut lr_stall = 0usize;

        let bar = if self.config.show_progress {
            let bar = ProgressBar::new(self.config.epochs as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) loss: {msg}",
                    )
                    .unwrap()
                    .progress_chars("#>-"),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        for epoch in 0..self.config.epochs {
            let mut epoch_loss = 0.0;
            let mut batches = 0usize;

            for batch in train.batch_iter(self.config.batch_size, true) {
                let outputs = model.forward_batch(&batch.windows, &batch.asset_indices, true);
                epoch_loss += loss.loss(&batch.targets, &outputs);
                batches += 1;

                let grad = loss.gradient(&batch.targets, &outputs);
                let bundle = model.backward_batch(&grad);
                model.apply_gradients(bundle, self.config.gradient_clip);
            }

            let train_loss = epoch_loss / batches.max(1) as f64;
            let val_loss = if val.is_empty() {
                train_loss
            } else {
                self.evaluate(model, &val, &loss)
            };

            if !train_loss.is_finite() || !val_loss.is_finite() {
                bar.abandon_with_message("diverged");
                return Err(ForecastError::TrainingDiverged { epoch });
            }

            self.history.train_loss.push(train_loss);
            self.history.val_loss.push(val_loss);

            let improved = val_loss < best_val - self.config.min_delta;
            if val_loss < best_val {
                best_val = val_loss;
                self.history.best_val_loss = val_loss;
                self.history.best_epoch = epoch;
                best = Some(model.clone());
            }

            if improved {
                stall = 0;
                lr_stall = 0;
            } else {
                stall += 1;
                lr_stall += 1;
            }

            bar.set_message(format!("{train_loss:.6} (val {val_loss:.6})"));
            bar.inc(1);

            if stall >= self.config.patience {
                info!("early stopping at epoch {} (no improvement)", epoch + 1);
                self.history.stopped_early = true;
                break;
            }

            if lr_stall >= self.config.lr_patience && learning_rate > self.config.min_learning_rate
            {
                learning_rate = (learning_rate * self.config.lr_factor)
                    .max(self.config.min_learning_rate);
                model.set_learning_rate(learning_rate);
                lr_stall = 0;
                info!("plateau: learning rate reduced to {learning_rate:.2e}");
            }
        }

        bar.finish_and_clear();

        // Ship the best checkpoint, not the final epoch's weights
        if let Some(best) = best {
            *model = best;
        }
        self.history.final_learning_rate = learning_rate;

        info!(
            "training complete: best val loss {:.6} at epoch {}",
            self.history.best_val_loss,
            self.history.best_epoch + 1
        );

        Ok(&self.history)
    }

    /// Mean loss over a dataset without touching the weights
    fn evaluate(
        &self,
        model: &mut QuantileForecaster,
        data: &SequenceDataset,
        loss: &QuantileLoss,
    ) -> f64 {
        let mut total = 0.0;
        let mut count = 0usize;

        for batch in data.batch_iter(self.config.batch_size, false) {
            let outputs = model.forward_batch(&batch.windows, &batch.asset_indices, false);
            total += loss.loss(&batch.targets, &outputs) * batch.targets.len() as f64;
            count += batch.targets.len();
        }

        total / count.max(1) as f64
    }
}

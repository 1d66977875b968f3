//! Quantile (pinball) loss.
//!
//! The asymmetric pinball loss is what makes each head converge to a
//! genuine conditional quantile instead of three copies of a mean
//! estimate: under-prediction is weighted by `q`, over-prediction by
//! `1 - q`.

use ndarray::{Array1, Array2};

/// Pinball loss over a fixed set of quantile levels
#[derive(Debug, Clone)]
pub struct QuantileLoss {
    pub quantiles: Vec<f64>,
}

impl Default for QuantileLoss {
    fn default() -> Self {
        Self {
            quantiles: crate::defaults::QUANTILES.to_vec(),
        }
    }
}

impl QuantileLoss {
    pub fn new(quantiles: Vec<f64>) -> Self {
        Self { quantiles }
    }

    /// Pinball loss for one value: `max(q·e, (q-1)·e)` with `e = y - ŷ`
    pub fn pinball(y_true: f64, y_pred: f64, quantile: f64) -> f64 {
        let error = y_true - y_pred;
        if error >= 0.0 {
            quantile * error
        } else {
            (quantile - 1.0) * error
        }
    }

    /// Optimization objective: per-head batch means, summed over heads.
    /// `predictions` is `(batch, num_quantiles)`.
    pub fn loss(&self, targets: &Array1<f64>, predictions: &Array2<f64>) -> f64 {
        let n = targets.len();
        if n == 0 {
            return 0.0;
        }

        let mut total = 0.0;
        for (k, &quantile) in self.quantiles.iter().enumerate() {
            let mut head = 0.0;
            for i in 0..n {
                head += Self::pinball(targets[i], predictions[[i, k]], quantile);
            }
            total += head / n as f64;
        }
        total
    }

    /// Batch mean of the pinball loss per head, in quantile order
    pub fn per_quantile(&self, targets: &Array1<f64>, predictions: &Array2<f64>) -> Vec<f64> {
        let n = targets.len().max(1);
        self.quantiles
            .iter()
            .enumerate()
            .map(|(k, &quantile)| {
                let mut head = 0.0;
                for i in 0..targets.len() {
                    head += Self::pinball(targets[i], predictions[[i, k]], quantile);
                }
                head / n as f64
            })
            .collect()
    }

    /// Subgradient of [`Self::loss`] with respect to the predictions,
    /// `(batch, num_quantiles)`.
    pub fn gradient(&self, targets: &Array1<f64>, predictions: &Array2<f64>) -> Array2<f64> {
        let n = targets.len();
        let mut grad = Array2::zeros(predictions.dim());
        if n == 0 {
            return grad;
        }

        for (k, &quantile) in self.quantiles.iter().enumerate() {
            for i in 0..n {
                let error = targets[i] - predictions[[i, k]];
                let d = if error >= 0.0 { -quantile } else { 1.0 - quantile };
                grad[[i, k]] = d / n as f64;
            }
        }
        grad
    }

    pub fn num_quantiles(&self) -> usize {
        self.quantiles.len()
    }
}

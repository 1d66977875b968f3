//! Diagnostic metrics for trained models.
//!
//! All metrics are computed on the denormalized (raw price) scale so they
//! are comparable across reports, and per quantile head so calibration
//! drift is visible per band.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::SequenceDataset;
use crate::error::Result;
use crate::model::QuantileForecaster;
use crate::registry::AssetRegistry;

/// Root mean squared error
pub fn rmse(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let n = y_true.len();
    if n == 0 {
        return 0.0;
    }
    let mse: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / n as f64;
    mse.sqrt()
}

/// Mean absolute error
pub fn mae(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let n = y_true.len();
    if n == 0 {
        return 0.0;
    }
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / n as f64
}

/// Mean absolute percentage error, skipping zero targets
pub fn mape(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        if t.abs() > 1e-10 {
            sum += ((t - p) / t).abs();
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    sum / count as f64 * 100.0
}

/// Coefficient of determination
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let n = y_true.len();
    if n == 0 {
        return 0.0;
    }
    let mean = y_true.iter().sum::<f64>() / n as f64;

    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        0.0
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// All regression metrics for one prediction series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub rmse: f64,
    pub mae: f64,
    pub mape: f64,
    pub r2: f64,
}

impl RegressionMetrics {
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Self {
        Self {
            rmse: rmse(y_true, y_pred),
            mae: mae(y_true, y_pred),
            mape: mape(y_true, y_pred),
            r2: r2_score(y_true, y_pred),
        }
    }
}

/// Width statistics for the predicted bands, characterizing how sharp the
/// calibration is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalStats {
    pub mean_lower_interval: f64,
    pub mean_upper_interval: f64,
    pub mean_total_interval: f64,
    pub median_lower_interval: f64,
    pub median_upper_interval: f64,
    pub median_total_interval: f64,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

impl IntervalStats {
    /// `q10`/`q50`/`q90` are parallel prediction series
    pub fn compute(q10: &[f64], q50: &[f64], q90: &[f64]) -> Self {
        let lower: Vec<f64> = q50.iter().zip(q10.iter()).map(|(m, l)| m - l).collect();
        let upper: Vec<f64> = q90.iter().zip(q50.iter()).map(|(u, m)| u - m).collect();
        let total: Vec<f64> = q90.iter().zip(q10.iter()).map(|(u, l)| u - l).collect();

        Self {
            mean_lower_interval: mean(&lower),
            mean_upper_interval: mean(&upper),
            mean_total_interval: mean(&total),
            median_lower_interval: median(&lower),
            median_upper_interval: median(&upper),
            median_total_interval: median(&total),
        }
    }
}

/// Full post-training evaluation: per-head regression metrics on the
/// denormalized example set plus interval statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantileEvaluation {
    pub per_quantile: BTreeMap<String, RegressionMetrics>,
    pub intervals: IntervalStats,
    pub num_examples: usize,
}

/// Evaluate a trained model over a dataset, denormalizing predictions and
/// targets through each example's own asset scaler.
pub fn evaluate_forecaster(
    model: &QuantileForecaster,
    dataset: &SequenceDataset,
    registry: &AssetRegistry,
) -> Result<QuantileEvaluation> {
    let num_heads = model.config.num_heads();
    let mut per_head_preds: Vec<Vec<f64>> = vec![Vec::with_capacity(dataset.len()); num_heads];
    let mut targets: Vec<f64> = Vec::with_capacity(dataset.len());

    for i in 0..dataset.len() {
        let asset_index = dataset.asset_indices[i];
        let asset_id = registry
            .asset_id(asset_index)
            .ok_or_else(|| {
                crate::error::ForecastError::ArtifactMismatch(format!(
                    "dataset references asset index {asset_index} absent from the registry"
                ))
            })?
            .to_string();

        let window = dataset.windows.row(i);
        let outputs = model.predict_one(window, asset_index);

        let denorm = registry.denormalize(&asset_id, &outputs.to_vec())?;
        for (k, value) in denorm.iter().enumerate() {
            per_head_preds[k].push(*value);
        }

        let target = registry.denormalize(&asset_id, &[dataset.targets[i]])?[0];
        targets.push(target);
    }

    let labels = ["q10", "q50", "q90"];
    let mut per_quantile = BTreeMap::new();
    for (k, preds) in per_head_preds.iter().enumerate() {
        let label = labels
            .get(k)
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("q{k}"));
        per_quantile.insert(label, RegressionMetrics::compute(&targets, preds));
    }

    let intervals = IntervalStats::compute(
        &per_head_preds[0],
        &per_head_preds[num_heads / 2],
        &per_head_preds[num_heads - 1],
    );

    Ok(QuantileEvaluation {
        per_quantile,
        intervals,
        num_examples: dataset.len(),
    })
}

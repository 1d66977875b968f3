//! Per-asset robust price normalization.
//!
//! Each asset gets its own scaler fitted over its own filtered history,
//! because raw price levels differ by orders of magnitude across the
//! universe (an index in the tens of thousands, a currency pair near 100).

use serde::{Deserialize, Serialize};

/// Robust scaler using median and IQR (less sensitive to outliers).
///
/// Fitted once per asset; `transform` maps raw prices onto the normalized
/// scale the model is trained on, `inverse` maps model outputs back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustScaler {
    /// Median of the fitted series
    center: f64,
    /// IQR (Q3 - Q1) of the fitted series
    scale: f64,
}

impl RobustScaler {
    /// Fit a scaler over a price series.
    ///
    /// A degenerate IQR (constant series) falls back to 1.0 so the
    /// transform stays invertible.
    pub fn fit(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                center: 0.0,
                scale: 1.0,
            };
        }

        let mut sorted: Vec<f64> = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let center = Self::quantile(&sorted, 0.5);
        let q1 = Self::quantile(&sorted, 0.25);
        let q3 = Self::quantile(&sorted, 0.75);

        let mut scale = q3 - q1;
        if scale < 1e-10 {
            scale = 1.0;
        }

        Self { center, scale }
    }

    /// Linear-interpolated quantile of a sorted slice
    fn quantile(sorted: &[f64], q: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }
        let pos = (sorted.len() - 1) as f64 * q;
        let lower = pos.floor() as usize;
        let upper = (lower + 1).min(sorted.len() - 1);
        let frac = pos - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }

    /// Map a single raw price to the normalized scale
    pub fn transform_value(&self, value: f64) -> f64 {
        (value - self.center) / self.scale
    }

    /// Map a single normalized value back to a raw price
    pub fn inverse_value(&self, value: f64) -> f64 {
        value * self.scale + self.center
    }

    /// Map a raw price series to the normalized scale
    pub fn transform(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.transform_value(v)).collect()
    }

    /// Map a normalized series back to raw prices
    pub fn inverse(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.inverse_value(v)).collect()
    }

    /// Fitted center (median)
    pub fn center(&self) -> f64 {
        self.center
    }

    /// Fitted scale (IQR)
    pub fn scale(&self) -> f64 {
        self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_median_iqr() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let scaler = RobustScaler::fit(&values);

        assert_relative_eq!(scaler.center(), 3.0, epsilon = 1e-10);
        assert_relative_eq!(scaler.scale(), 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_round_trip() {
        let values = vec![19500.0, 19820.0, 20010.0, 19750.0, 20300.0, 19990.0];
        let scaler = RobustScaler::fit(&values);

        let normalized = scaler.transform(&values);
        let restored = scaler.inverse(&normalized);

        for (orig, back) in values.iter().zip(restored.iter()) {
            assert_relative_eq!(orig, back, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_constant_series_falls_back() {
        let values = vec![83.2; 50];
        let scaler = RobustScaler::fit(&values);

        assert_relative_eq!(scaler.scale(), 1.0, epsilon = 1e-10);
        assert_relative_eq!(scaler.transform_value(83.2), 0.0, epsilon = 1e-10);
        assert_relative_eq!(scaler.inverse_value(0.0), 83.2, epsilon = 1e-10);
    }

    #[test]
    fn test_scales_differ_per_series() {
        let index = vec![21000.0, 21500.0, 22000.0, 22500.0, 23000.0];
        let fx = vec![82.1, 82.4, 82.9, 83.3, 83.8];

        let scaler_index = RobustScaler::fit(&index);
        let scaler_fx = RobustScaler::fit(&fx);

        // Normalized magnitudes land in the same ballpark despite the raw
        // series being ~250x apart.
        let a = scaler_index.transform_value(23000.0);
        let b = scaler_fx.transform_value(83.8);
        assert!(a.abs() < 5.0 && b.abs() < 5.0);
    }
}

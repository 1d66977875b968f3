//! Invariant repair for served forecasts.
//!
//! The model carries no ordering constraint across its heads and the
//! horizon extrapolation is a heuristic, so every forecast passes through
//! one pure repair function before leaving the engine: floor, ordering
//! margins, then a hard cap on total movement. Repair never fails; an
//! approximate band is more useful to a caller than an error.
//!
//! The constants are serving policy, not a verified financial model; they
//! are fields with defaults rather than literals so deployments can tune
//! them.

use serde::{Deserialize, Serialize};

/// Serving-time policy constants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairPolicy {
    /// Absolute positive floor for every quantile
    pub price_floor: f64,

    /// q10 is forced down to at most this fraction of q50
    pub lower_margin: f64,

    /// q90 is forced up to at least this fraction of q50
    pub upper_margin: f64,

    /// Maximum fractional movement from the current price, either way
    pub max_move: f64,

    /// Served horizons are clamped into `[min_horizon, max_horizon]`;
    /// the volatility scaling factor is capped at `sqrt(max_horizon)`
    pub min_horizon: u32,
    pub max_horizon: u32,
}

impl Default for RepairPolicy {
    fn default() -> Self {
        Self {
            price_floor: 0.01,
            lower_margin: 0.95,
            upper_margin: 1.05,
            max_move: 0.5,
            min_horizon: 1,
            max_horizon: crate::defaults::MAX_HORIZON_DAYS,
        }
    }
}

impl RepairPolicy {
    /// Clamp a requested horizon into the served range
    pub fn clamp_horizon(&self, horizon_days: u32) -> u32 {
        horizon_days.clamp(self.min_horizon, self.max_horizon)
    }
}

/// One (q10, q50, q90) band in raw price space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantileBands {
    pub q10: f64,
    pub q50: f64,
    pub q90: f64,
}

impl QuantileBands {
    pub fn width(&self) -> f64 {
        self.q90 - self.q10
    }
}

/// Square-root-of-time extrapolation: scale each quantile's deviation
/// from the current price by `sqrt(horizon)`, capped at
/// `sqrt(max_horizon)` so horizons beyond the trained range cannot run
/// away. Identity at horizon 1.
pub fn scale_to_horizon(
    bands: QuantileBands,
    current_price: f64,
    horizon_days: u32,
    policy: &RepairPolicy,
) -> QuantileBands {
    let factor = (horizon_days as f64)
        .sqrt()
        .min((policy.max_horizon as f64).sqrt());

    QuantileBands {
        q10: current_price + (bands.q10 - current_price) * factor,
        q50: current_price + (bands.q50 - current_price) * factor,
        q90: current_price + (bands.q90 - current_price) * factor,
    }
}

/// Repair a band so it satisfies the output invariants, in order:
///
/// 1. every quantile is at least the positive floor;
/// 2. `q10 <= lower_margin * q50` and `q90 >= upper_margin * q50`, which
///    restores ordering and rejects degenerate widths;
/// 3. every quantile stays within `max_move` of the current price (the
///    clamp is monotone, so ordering survives).
pub fn repair(bands: QuantileBands, current_price: f64, policy: &RepairPolicy) -> QuantileBands {
    let mut q10 = bands.q10.max(policy.price_floor);
    let mut q50 = bands.q50.max(policy.price_floor);
    let mut q90 = bands.q90.max(policy.price_floor);

    if q10 > policy.lower_margin * q50 {
        q10 = policy.lower_margin * q50;
    }
    if q90 < policy.upper_margin * q50 {
        q90 = policy.upper_margin * q50;
    }

    let low = current_price * (1.0 - policy.max_move);
    let high = current_price * (1.0 + policy.max_move);
    q10 = q10.clamp(low, high);
    q50 = q50.clamp(low, high);
    q90 = q90.clamp(low, high);

    QuantileBands { q10, q50, q90 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn default_policy() -> RepairPolicy {
        RepairPolicy::default()
    }

    #[test]
    fn test_ordering_restored() {
        let policy = default_policy();
        // Heads came out inverted
        let bands = QuantileBands {
            q10: 110.0,
            q50: 100.0,
            q90: 90.0,
        };
        let repaired = repair(bands, 100.0, &policy);

        assert!(repaired.q10 <= repaired.q50);
        assert!(repaired.q50 <= repaired.q90);
        assert_relative_eq!(repaired.q10, 95.0, epsilon = 1e-10);
        assert_relative_eq!(repaired.q90, 105.0, epsilon = 1e-10);
    }

    #[test]
    fn test_narrow_band_widened() {
        let policy = default_policy();
        let bands = QuantileBands {
            q10: 99.9,
            q50: 100.0,
            q90: 100.1,
        };
        let repaired = repair(bands, 100.0, &policy);

        assert!(repaired.q10 <= 0.95 * repaired.q50 + 1e-12);
        assert!(repaired.q90 >= 1.05 * repaired.q50 - 1e-12);
    }

    #[test]
    fn test_floor_applied() {
        let policy = default_policy();
        let bands = QuantileBands {
            q10: -5.0,
            q50: -1.0,
            q90: 0.0,
        };
        let repaired = repair(bands, 0.05, &policy);

        assert!(repaired.q10 >= policy.price_floor * (1.0 - policy.max_move) - 1e-12);
        assert!(repaired.q10 > 0.0 && repaired.q50 > 0.0 && repaired.q90 > 0.0);
        assert!(repaired.q10 <= repaired.q50 && repaired.q50 <= repaired.q90);
    }

    #[test]
    fn test_movement_capped() {
        let policy = default_policy();
        let bands = QuantileBands {
            q10: 10.0,
            q50: 500.0,
            q90: 5000.0,
        };
        let current = 100.0;
        let repaired = repair(bands, current, &policy);

        for q in [repaired.q10, repaired.q50, repaired.q90] {
            assert!((q - current).abs() / current <= policy.max_move + 1e-12);
        }
        assert!(repaired.q10 <= repaired.q50 && repaired.q50 <= repaired.q90);
    }

    #[test]
    fn test_well_formed_band_mostly_untouched() {
        let policy = default_policy();
        let bands = QuantileBands {
            q10: 90.0,
            q50: 100.0,
            q90: 112.0,
        };
        let repaired = repair(bands, 101.0, &policy);

        assert_relative_eq!(repaired.q10, 90.0, epsilon = 1e-10);
        assert_relative_eq!(repaired.q50, 100.0, epsilon = 1e-10);
        assert_relative_eq!(repaired.q90, 112.0, epsilon = 1e-10);
    }

    #[test]
    fn test_horizon_scaling_widens_with_time() {
        let policy = default_policy();
        let bands = QuantileBands {
            q10: 98.0,
            q50: 101.0,
            q90: 104.0,
        };

        let h1 = scale_to_horizon(bands, 100.0, 1, &policy);
        let h7 = scale_to_horizon(bands, 100.0, 7, &policy);

        assert_relative_eq!(h1.q10, bands.q10, epsilon = 1e-12);
        assert!(h7.width() > h1.width());
        assert_relative_eq!(h7.q50 - 100.0, (bands.q50 - 100.0) * 7f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_horizon_scaling_capped() {
        let policy = default_policy();
        let bands = QuantileBands {
            q10: 95.0,
            q50: 100.0,
            q90: 106.0,
        };

        let at_cap = scale_to_horizon(bands, 100.0, 30, &policy);
        let beyond = scale_to_horizon(bands, 100.0, 3000, &policy);

        assert_relative_eq!(at_cap.q10, beyond.q10, epsilon = 1e-12);
        assert_relative_eq!(at_cap.q90, beyond.q90, epsilon = 1e-12);
    }

    #[test]
    fn test_clamp_horizon() {
        let policy = default_policy();
        assert_eq!(policy.clamp_horizon(0), 1);
        assert_eq!(policy.clamp_horizon(7), 7);
        assert_eq!(policy.clamp_horizon(45), 30);
    }
}

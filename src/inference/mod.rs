//! Serve-time projection and invariant repair.

mod projector;
mod repair;

pub use projector::{Forecast, ForecastService};
pub use repair::{repair, scale_to_horizon, QuantileBands, RepairPolicy};

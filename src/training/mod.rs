//! Training protocol: loss, schedule and diagnostics.

mod loss;
mod metrics;
mod trainer;

pub use loss::QuantileLoss;
pub use metrics::{
    evaluate_forecaster, mae, mape, r2_score, rmse, IntervalStats, QuantileEvaluation,
    RegressionMetrics,
};
pub use trainer::{Trainer, TrainingConfig, TrainingHistory};

//! The shared forecasting model and its layers.

mod config;
mod dense;
mod embedding;
mod forecaster;
mod gru;
mod optimizer;

pub use config::ModelConfig;
pub use dense::{Activation, Dense};
pub use embedding::Embedding;
pub use forecaster::{GradientBundle, QuantileForecaster};
pub use gru::{GruCell, GruEncoder, GruGrads, GruOptimizer};
pub use optimizer::{Adam, Optimizer, Sgd};

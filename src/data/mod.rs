//! Data loading and dataset construction.

mod dataset;
mod history;

pub use dataset::{Batch, BatchIterator, BuildConfig, SequenceDataset};
pub use history::{PriceHistory, PriceRow};

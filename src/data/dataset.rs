//! Training dataset construction.
//!
//! Converts a directory of per-asset price histories into the full set of
//! `(window, target, asset index)` training examples, fitting the asset
//! registry as a side effect. Windows are slices of exactly `seq_len`
//! consecutive normalized closes from a single asset; the target is the
//! next normalized close. Windows never span an asset boundary.

use std::path::Path;

use log::{info, warn};
use ndarray::{s, Array1, Array2, Axis};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::history::PriceHistory;
use crate::error::{ForecastError, Result};
use crate::registry::AssetRegistry;

/// Dataset build parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Input window length (model sequence length)
    pub seq_len: usize,
    /// Recency window: calendar days with timestamps, rows without
    pub lookback_days: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            seq_len: crate::defaults::SEQ_LEN,
            lookback_days: crate::defaults::LOOKBACK_DAYS,
        }
    }
}

/// The full multi-asset training set, in normalized space.
#[derive(Debug, Clone)]
pub struct SequenceDataset {
    /// Input windows, one row per example `(n, seq_len)`
    pub windows: Array2<f64>,
    /// One-step-ahead normalized targets `(n,)`
    pub targets: Array1<f64>,
    /// Dense asset index per example
    pub asset_indices: Vec<usize>,
    /// Window length
    pub seq_len: usize,
}

/// One mini-batch of examples
#[derive(Debug, Clone)]
pub struct Batch {
    pub windows: Array2<f64>,
    pub targets: Array1<f64>,
    pub asset_indices: Vec<usize>,
}

impl SequenceDataset {
    /// Build the dataset and its registry from a data directory.
    ///
    /// Each subdirectory of `data_dir` is an asset id holding
    /// `<asset>/<asset>.csv`. Assets with missing or malformed files, or
    /// with fewer than `seq_len + 1` usable rows after the recency filter,
    /// are skipped and logged; they do not abort the build. A build that
    /// produces zero examples is [`ForecastError::NoUsableAssets`].
    pub fn build(data_dir: &Path, config: &BuildConfig) -> Result<(Self, AssetRegistry)> {
        let mut asset_ids: Vec<String> = std::fs::read_dir(data_dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        // First-seen order must not depend on directory iteration order.
        asset_ids.sort();

        let mut registry = AssetRegistry::new(config.seq_len);
        let mut flat_windows: Vec<f64> = Vec::new();
        let mut targets: Vec<f64> = Vec::new();
        let mut asset_indices: Vec<usize> = Vec::new();

        info!(
            "building dataset from {} ({} candidate assets, lookback {} days)",
            data_dir.display(),
            asset_ids.len(),
            config.lookback_days
        );

        for asset_id in &asset_ids {
            let path = PriceHistory::asset_file(data_dir, asset_id);

            let mut history = match PriceHistory::from_csv(asset_id, &path) {
                Ok(history) => history,
                Err(err) => {
                    warn!("skipping {asset_id}: {err}");
                    continue;
                }
            };
            history.restrict_recent(config.lookback_days);

            let closes = history.closes();
            if closes.len() < config.seq_len + 1 {
                warn!(
                    "skipping {asset_id}: insufficient data ({} rows, need {})",
                    closes.len(),
                    config.seq_len + 1
                );
                continue;
            }

            let index = registry.register(asset_id, &closes)?;
            let normalized = registry.normalize(asset_id, &closes)?;

            let num_examples = normalized.len() - config.seq_len;
            for i in 0..num_examples {
                flat_windows.extend_from_slice(&normalized[i..i + config.seq_len]);
                targets.push(normalized[i + config.seq_len]);
                asset_indices.push(index);
            }

            let min = closes.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = closes.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            info!(
                "{asset_id}: {} rows, {num_examples} examples, price range {min:.2} - {max:.2}",
                closes.len()
            );
        }

        if targets.is_empty() {
            return Err(ForecastError::NoUsableAssets);
        }

        let n = targets.len();
        let windows = Array2::from_shape_vec((n, config.seq_len), flat_windows)
            .map_err(|e| ForecastError::MalformedHistory {
                asset: "<dataset>".to_string(),
                reason: e.to_string(),
            })?;

        info!("dataset ready: {n} examples across {} assets", registry.len());

        let dataset = Self {
            windows,
            targets: Array1::from_vec(targets),
            asset_indices,
            seq_len: config.seq_len,
        };
        Ok((dataset, registry))
    }

    /// Number of examples
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the dataset is empty
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Split into leading/trailing parts, preserving example order.
    /// The trailing part serves as the validation set.
    pub fn split(&self, train_ratio: f64) -> (Self, Self) {
        let n = self.len();
        let split = ((n as f64) * train_ratio).round() as usize;
        let split = split.min(n);

        let head = Self {
            windows: self.windows.slice(s![..split, ..]).to_owned(),
            targets: self.targets.slice(s![..split]).to_owned(),
            asset_indices: self.asset_indices[..split].to_vec(),
            seq_len: self.seq_len,
        };
        let tail = Self {
            windows: self.windows.slice(s![split.., ..]).to_owned(),
            targets: self.targets.slice(s![split..]).to_owned(),
            asset_indices: self.asset_indices[split..].to_vec(),
            seq_len: self.seq_len,
        };
        (head, tail)
    }

    /// Materialize a batch from example indices
    pub fn select(&self, indices: &[usize]) -> Batch {
        Batch {
            windows: self.windows.select(Axis(0), indices),
            targets: self.targets.select(Axis(0), indices),
            asset_indices: indices.iter().map(|&i| self.asset_indices[i]).collect(),
        }
    }

    /// Iterate over mini-batches, optionally shuffled
    pub fn batch_iter(&self, batch_size: usize, shuffle: bool) -> BatchIterator<'_> {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        if shuffle {
            indices.shuffle(&mut rand::thread_rng());
        }
        BatchIterator {
            dataset: self,
            indices,
            batch_size: batch_size.max(1),
            cursor: 0,
        }
    }
}

/// Iterator over mini-batches
pub struct BatchIterator<'a> {
    dataset: &'a SequenceDataset,
    indices: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl<'a> Iterator for BatchIterator<'a> {
    type Item = Batch;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.indices.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.indices.len());
        let batch = self.dataset.select(&self.indices[self.cursor..end]);
        self.cursor = end;
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_history(data_dir: &Path, asset_id: &str, closes: &[f64]) {
        let dir = data_dir.join(asset_id);
        std::fs::create_dir_all(&dir).unwrap();
        let mut file = std::fs::File::create(dir.join(format!("{asset_id}.csv"))).unwrap();
        writeln!(file, "timestamp,close").unwrap();
        let start = chrono::NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        for (i, close) in closes.iter().enumerate() {
            let date = start + chrono::Duration::days(i as i64);
            writeln!(file, "{date},{close}").unwrap();
        }
    }

    fn trending(start: f64, step: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| start + step * i as f64 + (i as f64 * 0.7).sin() * step)
            .collect()
    }

    #[test]
    fn test_build_windows_and_targets() {
        let dir = tempfile::tempdir().unwrap();
        write_history(dir.path(), "banknifty", &trending(46000.0, 20.0, 25));
        write_history(dir.path(), "usdinr", &trending(82.0, 0.05, 25));

        let config = BuildConfig {
            seq_len: 10,
            lookback_days: 730,
        };
        let (dataset, registry) = SequenceDataset::build(dir.path(), &config).unwrap();

        assert_eq!(registry.len(), 2);
        // 25 rows -> 15 windows per asset
        assert_eq!(dataset.len(), 30);
        assert_eq!(dataset.windows.ncols(), 10);

        // Windows never cross the asset boundary: examples are grouped by
        // asset index in first-seen (sorted) order.
        let boundary = dataset.asset_indices.iter().filter(|&&i| i == 0).count();
        assert_eq!(boundary, 15);
        assert!(dataset.asset_indices[..15].iter().all(|&i| i == 0));
        assert!(dataset.asset_indices[15..].iter().all(|&i| i == 1));
    }

    #[test]
    fn test_exactly_one_example() {
        let dir = tempfile::tempdir().unwrap();
        write_history(dir.path(), "wipro", &trending(450.0, 1.0, 11));

        let config = BuildConfig {
            seq_len: 10,
            lookback_days: 730,
        };
        let (dataset, _) = SequenceDataset::build(dir.path(), &config).unwrap();
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn test_short_asset_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_history(dir.path(), "cipla", &trending(1200.0, 2.0, 40));
        write_history(dir.path(), "stub", &trending(10.0, 0.1, 5));

        let config = BuildConfig {
            seq_len: 10,
            lookback_days: 730,
        };
        let (dataset, registry) = SequenceDataset::build(dir.path(), &config).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.contains("cipla"));
        assert!(!registry.contains("stub"));
        assert_eq!(dataset.len(), 30);
    }

    #[test]
    fn test_empty_build_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = BuildConfig::default();
        let err = SequenceDataset::build(dir.path(), &config).unwrap_err();
        assert!(matches!(err, ForecastError::NoUsableAssets));
    }

    #[test]
    fn test_split_and_batches() {
        let dir = tempfile::tempdir().unwrap();
        write_history(dir.path(), "hdfcbank", &trending(1500.0, 3.0, 60));

        let config = BuildConfig {
            seq_len: 10,
            lookback_days: 730,
        };
        let (dataset, _) = SequenceDataset::build(dir.path(), &config).unwrap();
        let (train, val) = dataset.split(0.9);
        assert_eq!(train.len() + val.len(), dataset.len());
        assert!(val.len() >= 1);

        let mut seen = 0;
        for batch in train.batch_iter(8, true) {
            assert_eq!(batch.windows.ncols(), 10);
            seen += batch.targets.len();
        }
        assert_eq!(seen, train.len());
    }
}

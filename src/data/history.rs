//! Per-asset price history loading.
//!
//! Histories live as one CSV per asset under `data_dir/<asset>/<asset>.csv`
//! with a `close` column and an optional `timestamp`/`date` column. The
//! builder restricts each history to a recency window before fitting the
//! asset's scaler, so instruments that recently made new all-time highs or
//! lows are not normalized against stale scale regimes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

use crate::error::{ForecastError, Result};

/// A single `(timestamp, close)` observation
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRow {
    pub timestamp: Option<DateTime<Utc>>,
    pub close: f64,
}

/// One asset's ordered close-price series
#[derive(Debug, Clone)]
pub struct PriceHistory {
    pub asset_id: String,
    rows: Vec<PriceRow>,
    has_timestamps: bool,
}

impl PriceHistory {
    /// Conventional file location for an asset's history
    pub fn asset_file(data_dir: &Path, asset_id: &str) -> PathBuf {
        data_dir.join(asset_id).join(format!("{asset_id}.csv"))
    }

    /// Build a history from rows already in time order (for tests and
    /// synthetic data).
    pub fn from_rows(asset_id: &str, rows: Vec<PriceRow>) -> Self {
        let has_timestamps = !rows.is_empty() && rows.iter().all(|r| r.timestamp.is_some());
        Self {
            asset_id: asset_id.to_string(),
            rows,
            has_timestamps,
        }
    }

    /// Load a history from CSV.
    ///
    /// Header names are matched case-insensitively; a missing `close`
    /// column or an unparseable row makes the whole file malformed (the
    /// dataset builder recovers by skipping the asset).
    pub fn from_csv(asset_id: &str, path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;

        let headers = reader.headers()?.clone();
        let close_col = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case("close"))
            .ok_or_else(|| ForecastError::MalformedHistory {
                asset: asset_id.to_string(),
                reason: "no 'close' column".to_string(),
            })?;
        let ts_col = headers.iter().position(|h| {
            let h = h.trim();
            h.eq_ignore_ascii_case("timestamp") || h.eq_ignore_ascii_case("date")
        });

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;

            let close: f64 = record
                .get(close_col)
                .and_then(|s| s.trim().parse().ok())
                .ok_or_else(|| ForecastError::MalformedHistory {
                    asset: asset_id.to_string(),
                    reason: format!("bad close value on data row {}", line + 1),
                })?;

            let timestamp = match ts_col {
                Some(col) => {
                    let raw = record.get(col).unwrap_or("").trim();
                    Some(parse_timestamp(raw).ok_or_else(|| {
                        ForecastError::MalformedHistory {
                            asset: asset_id.to_string(),
                            reason: format!("bad timestamp '{}' on data row {}", raw, line + 1),
                        }
                    })?)
                }
                None => None,
            };

            rows.push(PriceRow { timestamp, close });
        }

        let has_timestamps = ts_col.is_some();
        if has_timestamps {
            rows.sort_by_key(|r| r.timestamp);
        }

        Ok(Self {
            asset_id: asset_id.to_string(),
            rows,
            has_timestamps,
        })
    }

    /// Restrict to the most recent window.
    ///
    /// With timestamps: keep rows within `lookback_days` of the newest
    /// observation. Without: keep the last `lookback_days` rows.
    pub fn restrict_recent(&mut self, lookback_days: usize) {
        if self.has_timestamps {
            let newest = self.rows.iter().filter_map(|r| r.timestamp).max();
            if let Some(newest) = newest {
                let cutoff = newest - Duration::days(lookback_days as i64);
                self.rows.retain(|r| r.timestamp.map_or(false, |t| t >= cutoff));
            }
        } else if self.rows.len() > lookback_days {
            self.rows.drain(..self.rows.len() - lookback_days);
        }
    }

    /// Close prices in time order
    pub fn closes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.close).collect()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the history is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` and bare `YYYY-MM-DD`.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = raw.parse::<DateTime<Utc>>() {
        return Some(ts);
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&ndt));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }
    None
}

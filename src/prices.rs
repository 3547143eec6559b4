use std::collections::HashSet;
use std::sync::Arc;
use time::Date;

use crate::error::{RebalancerError, Result};

/// A synchronized table of asset prices: one row per observation, one column per asset.
///
/// Timestamps are strictly increasing and every row carries a finite price for every
/// asset. The series is validated once on construction and is read-only afterwards.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    assets: Vec<Arc<str>>,
    timestamps: Vec<Date>,
    rows: Vec<Vec<f64>>,
}

impl PriceSeries {
    /// Builds a series, rejecting empty or malformed input.
    pub fn new(assets: Vec<Arc<str>>, timestamps: Vec<Date>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if assets.is_empty() {
            return Err(RebalancerError::empty_data("price series assets"));
        }
        if timestamps.is_empty() || rows.is_empty() {
            return Err(RebalancerError::empty_data("price series observations"));
        }
        if timestamps.len() != rows.len() {
            return Err(RebalancerError::config(format!(
                "{} timestamps but {} price rows",
                timestamps.len(),
                rows.len()
            )));
        }

        let mut seen = HashSet::with_capacity(assets.len());
        for asset in &assets {
            if !seen.insert(asset.clone()) {
                return Err(RebalancerError::config(format!(
                    "duplicate asset column '{}'",
                    asset
                )));
            }
        }

        for (i, (timestamp, row)) in timestamps.iter().zip(&rows).enumerate() {
            if row.len() != assets.len() {
                return Err(RebalancerError::config(format!(
                    "row at {} has {} prices, expected {}",
                    timestamp,
                    row.len(),
                    assets.len()
                )));
            }
            if let Some(j) = row.iter().position(|p| !p.is_finite()) {
                return Err(RebalancerError::config(format!(
                    "missing or non-finite price for '{}' at {}",
                    assets[j], timestamp
                )));
            }
            if i > 0 && timestamps[i - 1] >= *timestamp {
                return Err(RebalancerError::config(format!(
                    "timestamps must be strictly increasing: {} follows {}",
                    timestamp,
                    timestamps[i - 1]
                )));
            }
        }

        Ok(Self {
            assets,
            timestamps,
            rows,
        })
    }

    pub fn assets(&self) -> &[Arc<str>] {
        &self.assets
    }

    pub fn timestamps(&self) -> &[Date] {
        &self.timestamps
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.rows[index]
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    pub fn first_timestamp(&self) -> Date {
        self.timestamps[0]
    }

    pub fn last_timestamp(&self) -> Date {
        self.timestamps[self.timestamps.len() - 1]
    }

    /// Period-over-period percentage changes for rows `0..=index`.
    ///
    /// The first row has no predecessor and is reported as all zeros.
    pub fn pct_changes_until(&self, index: usize) -> Vec<Vec<f64>> {
        let end = index.min(self.len() - 1);
        let mut changes = Vec::with_capacity(end + 1);
        changes.push(vec![0.0; self.n_assets()]);
        for i in 1..=end {
            let prev = &self.rows[i - 1];
            let changes_row = self.rows[i]
                .iter()
                .zip(prev)
                .map(|(price, last)| price / last - 1.0)
                .collect();
            changes.push(changes_row);
        }
        changes
    }
}

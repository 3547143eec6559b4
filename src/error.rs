//! Error types for the rebalancing simulator.

use polars::prelude::PolarsError;
use thiserror::Error;
use time::Date;

/// Result type alias for simulator operations.
pub type Result<T> = std::result::Result<T, RebalancerError>;

/// Everything that can abort a simulation run.
///
/// Configuration errors are raised before the first observation is processed.
/// Numeric degeneracies carry the timestamp and asset that triggered them.
#[derive(Error, Debug)]
pub enum RebalancerError {
    /// Invalid configuration or malformed input table.
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// Empty data error.
    #[error("Empty data provided for {context}")]
    EmptyData { context: String },

    /// Not enough observations to estimate volatility.
    #[error("Insufficient history at {timestamp}: need at least {required} observations, got {available}")]
    InsufficientHistory {
        timestamp: Date,
        required: usize,
        available: usize,
    },

    /// A reference price of zero would make every drift computation divide by zero.
    #[error("Zero reference price for asset '{asset}' at {timestamp}")]
    ZeroReferencePrice { timestamp: Date, asset: String },

    /// Inverse-volatility weighting is undefined for this asset.
    #[error("Degenerate volatility {volatility} for asset '{asset}' at {timestamp}")]
    DegenerateVolatility {
        timestamp: Date,
        asset: String,
        volatility: f64,
    },

    /// Allocation row cannot be normalized.
    #[error("Allocation row at {timestamp} sums to {sum}")]
    DegenerateAllocation { timestamp: Date, sum: f64 },

    /// Timestamp text that matches none of the supported formats.
    #[error("Error parsing date '{value}'")]
    DateParse { value: String },

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RebalancerError {
    /// Create an invalid config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an empty data error.
    pub fn empty_data(context: impl Into<String>) -> Self {
        Self::EmptyData {
            context: context.into(),
        }
    }

    pub fn zero_reference_price(timestamp: Date, asset: impl Into<String>) -> Self {
        Self::ZeroReferencePrice {
            timestamp,
            asset: asset.into(),
        }
    }

    pub fn degenerate_volatility(timestamp: Date, asset: impl Into<String>, volatility: f64) -> Self {
        Self::DegenerateVolatility {
            timestamp,
            asset: asset.into(),
            volatility,
        }
    }

    /// True for errors raised while validating inputs, before any simulation step.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::EmptyData { .. } | Self::DateParse { .. }
        )
    }
}

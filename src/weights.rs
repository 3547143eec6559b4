use std::fmt;
use std::str::FromStr;

use crate::error::{RebalancerError, Result};
use crate::prices::PriceSeries;

/// Tolerance used when checking that a weight vector is normalized.
pub const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Strategy selector for target allocation weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightsType {
    /// A fixed vector chosen once, equal weights if none is given.
    #[default]
    Static,
    /// Inverse-volatility weights recomputed at every rebalance.
    RiskParity,
}

impl FromStr for WeightsType {
    type Err = RebalancerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(WeightsType::Static),
            "risk_parity" | "inverse_volatility" => Ok(WeightsType::RiskParity),
            other => Err(RebalancerError::config(format!(
                "invalid weights_type '{}', use 'risk_parity' or 'static'",
                other
            ))),
        }
    }
}

impl fmt::Display for WeightsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightsType::Static => write!(f, "static"),
            WeightsType::RiskParity => write!(f, "risk_parity"),
        }
    }
}

/// Source of target allocation weights for the simulator.
///
/// The simulator asks once for the seed weights and then again at every rebalance
/// event, passing the full series together with the index of the rebalance row.
/// Implementations must only look at rows `0..=index`.
pub trait WeightProvider {
    fn name(&self) -> &str;

    fn initial_weights(&self, n_assets: usize) -> Vec<f64>;

    fn rebalance_weights(&self, prices: &PriceSeries, index: usize, current: &[f64]) -> Result<Vec<f64>>;
}

pub fn equal_weights(n_assets: usize) -> Vec<f64> {
    vec![1.0 / n_assets as f64; n_assets]
}

/// Fixed weights for the whole simulation.
#[derive(Debug, Clone)]
pub struct StaticWeights {
    weights: Option<Vec<f64>>,
}

impl StaticWeights {
    /// Equal weights across every asset in the series.
    pub fn equal() -> Self {
        Self { weights: None }
    }

    /// Explicit weights, one per asset. The sum is the caller's responsibility.
    pub fn new(weights: Vec<f64>, n_assets: usize) -> Result<Self> {
        if weights.len() != n_assets {
            return Err(RebalancerError::config(format!(
                "static weights have {} entries but the price series has {} assets",
                weights.len(),
                n_assets
            )));
        }
        if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(RebalancerError::config(format!(
                "static weights must be finite and non-negative, got {}",
                w
            )));
        }
        Ok(Self {
            weights: Some(weights),
        })
    }
}

impl WeightProvider for StaticWeights {
    fn name(&self) -> &str {
        "static"
    }

    fn initial_weights(&self, n_assets: usize) -> Vec<f64> {
        match &self.weights {
            Some(weights) => weights.clone(),
            None => equal_weights(n_assets),
        }
    }

    fn rebalance_weights(&self, _prices: &PriceSeries, _index: usize, current: &[f64]) -> Result<Vec<f64>> {
        Ok(current.to_vec())
    }
}

/// Risk parity by inverse volatility: `w_i = (1/σ_i) / Σ_j (1/σ_j)`.
///
/// σ is the sample standard deviation of period-over-period percentage changes
/// over every observation up to and including the rebalance row, with the first
/// change counted as zero.
#[derive(Debug, Clone, Default)]
pub struct InverseVolatility;

impl InverseVolatility {
    pub fn new() -> Self {
        Self
    }
}

/// Sample standard deviation (n - 1 denominator); NaN with fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

impl WeightProvider for InverseVolatility {
    fn name(&self) -> &str {
        "risk_parity"
    }

    fn initial_weights(&self, n_assets: usize) -> Vec<f64> {
        equal_weights(n_assets)
    }

    fn rebalance_weights(&self, prices: &PriceSeries, index: usize, _current: &[f64]) -> Result<Vec<f64>> {
        let timestamp = prices.timestamps()[index];
        let available = index + 1;
        if available < 2 {
            return Err(RebalancerError::InsufficientHistory {
                timestamp,
                required: 2,
                available,
            });
        }

        let changes = prices.pct_changes_until(index);
        let mut inv_volatilities = Vec::with_capacity(prices.n_assets());
        for (j, asset) in prices.assets().iter().enumerate() {
            let column: Vec<f64> = changes.iter().map(|row| row[j]).collect();
            let volatility = sample_std(&column);
            if volatility == 0.0 || !volatility.is_finite() {
                return Err(RebalancerError::degenerate_volatility(
                    timestamp,
                    asset.to_string(),
                    volatility,
                ));
            }
            inv_volatilities.push(1.0 / volatility);
        }

        let total: f64 = inv_volatilities.iter().sum();
        Ok(inv_volatilities.iter().map(|iv| iv / total).collect())
    }
}

/// Resolves the configured strategy into a provider, validating eagerly.
pub fn build_provider(
    weights_type: WeightsType,
    static_weights: Option<&[f64]>,
    n_assets: usize,
) -> Result<Box<dyn WeightProvider>> {
    match (weights_type, static_weights) {
        (WeightsType::RiskParity, Some(_)) => Err(RebalancerError::config(
            "static weights should not be provided for risk parity, use weights_type='static' for static weights",
        )),
        (WeightsType::RiskParity, None) => Ok(Box::new(InverseVolatility::new())),
        (WeightsType::Static, Some(weights)) => {
            Ok(Box::new(StaticWeights::new(weights.to_vec(), n_assets)?))
        }
        (WeightsType::Static, None) => Ok(Box::new(StaticWeights::equal())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prices::tests::make_series;
    use time::macros::date;

    fn sum(weights: &[f64]) -> f64 {
        weights.iter().sum()
    }

    #[test]
    fn test_parse_weights_type() {
        assert_eq!("static".parse::<WeightsType>().unwrap(), WeightsType::Static);
        assert_eq!("Risk_Parity".parse::<WeightsType>().unwrap(), WeightsType::RiskParity);
        let err = "momentum".parse::<WeightsType>().unwrap_err();
        assert!(err.is_config());
        assert_eq!(WeightsType::RiskParity.to_string(), "risk_parity");
    }

    #[test]
    fn test_static_equal_and_explicit() {
        let equal = StaticWeights::equal();
        let w = equal.initial_weights(4);
        assert_eq!(w, vec![0.25; 4]);

        let explicit = StaticWeights::new(vec![0.333, 0.333, 0.334], 3).unwrap();
        assert_eq!(explicit.initial_weights(3), vec![0.333, 0.333, 0.334]);
        assert!(StaticWeights::new(vec![0.5, 0.5], 3).is_err());
        assert!(StaticWeights::new(vec![1.5, -0.5], 2).is_err());
    }

    #[test]
    fn test_static_rebalance_is_noop() {
        let series = make_series(date!(2023 - 01 - 02), vec![("A", vec![1.0, 2.0]), ("B", vec![3.0, 1.0])]);
        let provider = StaticWeights::new(vec![0.7, 0.3], 2).unwrap();
        let current = provider.initial_weights(2);
        let next = provider.rebalance_weights(&series, 1, &current).unwrap();
        assert_eq!(next, vec![0.7, 0.3]);
    }

    #[test]
    fn test_sample_std_matches_pandas() {
        // pandas: pd.Series([0.0, 0.1, -0.1]).std() == 0.1
        assert!((sample_std(&[0.0, 0.1, -0.1]) - 0.1).abs() < 1e-12);
        assert!(sample_std(&[1.0]).is_nan());
    }

    #[test]
    fn test_inverse_volatility_weights() {
        // A: changes [0, 0.1, -0.1] -> std 0.1, B: changes [0, 0.2, -0.2] -> std 0.2 (approximately).
        let series = make_series(
            date!(2023 - 01 - 02),
            vec![
                ("A", vec![100.0, 110.0, 99.0]),
                ("B", vec![100.0, 120.0, 96.0]),
            ],
        );
        let provider = InverseVolatility::new();
        let w = provider.rebalance_weights(&series, 2, &[0.5, 0.5]).unwrap();
        assert!((sum(&w) - 1.0).abs() < WEIGHT_TOLERANCE);
        assert!((w[0] - 2.0 / 3.0).abs() < 1e-9);
        assert!((w[1] - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_inverse_volatility_uses_history_up_to_index_only() {
        let series = make_series(
            date!(2023 - 01 - 02),
            vec![
                ("A", vec![100.0, 110.0, 99.0, 500.0]),
                ("B", vec![100.0, 120.0, 96.0, 96.0]),
            ],
        );
        let w = InverseVolatility::new().rebalance_weights(&series, 2, &[0.5, 0.5]).unwrap();
        assert!((w[0] - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_inverse_volatility_fails_fast_on_degenerate_history() {
        let series = make_series(
            date!(2023 - 01 - 02),
            vec![("A", vec![100.0, 110.0, 99.0]), ("FLAT", vec![10.0, 10.0, 10.0])],
        );
        let provider = InverseVolatility::new();

        let err = provider.rebalance_weights(&series, 0, &[0.5, 0.5]).unwrap_err();
        assert!(matches!(err, RebalancerError::InsufficientHistory { available: 1, .. }));

        let err = provider.rebalance_weights(&series, 2, &[0.5, 0.5]).unwrap_err();
        match err {
            RebalancerError::DegenerateVolatility { asset, timestamp, .. } => {
                assert_eq!(asset, "FLAT");
                assert_eq!(timestamp, date!(2023 - 01 - 04));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_build_provider_rejects_weights_for_risk_parity() {
        let err = build_provider(WeightsType::RiskParity, Some(&[0.5, 0.5]), 2).err().unwrap();
        assert!(err.is_config());

        let provider = build_provider(WeightsType::RiskParity, None, 2).unwrap();
        assert_eq!(provider.name(), "risk_parity");
        assert_eq!(provider.initial_weights(2), vec![0.5, 0.5]);

        let provider = build_provider(WeightsType::Static, Some(&[0.2, 0.8]), 2).unwrap();
        assert_eq!(provider.initial_weights(2), vec![0.2, 0.8]);
        assert!(build_provider(WeightsType::Static, Some(&[1.0]), 2).is_err());
    }
}

use crate::error::{RebalancerError, Result};
use crate::schedule::{Anchor, Frequency};
use crate::weights::WeightsType;

pub const DEFAULT_START_DEPOSIT: f64 = 100.0;

/// Run configuration: strategy, schedule and starting capital.
///
/// Defaults are static equal weights, quarter-end rebalancing and a deposit of 100.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalancerConfig {
    pub weights_type: WeightsType,
    pub rebalance_frequency: Frequency,
    /// Only valid together with `WeightsType::Static`.
    pub static_weights: Option<Vec<f64>>,
    pub start_deposit: f64,
}

impl Default for RebalancerConfig {
    fn default() -> Self {
        Self {
            weights_type: WeightsType::Static,
            rebalance_frequency: Frequency::Quarter(1, Anchor::End),
            static_weights: None,
            start_deposit: DEFAULT_START_DEPOSIT,
        }
    }
}

impl RebalancerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the text descriptors (`"static"`, `"Q"`, ...) and validates the result.
    pub fn from_strs(
        weights_type: &str,
        rebalance_frequency: &str,
        static_weights: Option<Vec<f64>>,
        start_deposit: f64,
    ) -> Result<Self> {
        let config = Self {
            weights_type: weights_type.parse()?,
            rebalance_frequency: rebalance_frequency.parse()?,
            static_weights,
            start_deposit,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn weights_type(mut self, weights_type: WeightsType) -> Self {
        self.weights_type = weights_type;
        self
    }

    pub fn rebalance_frequency(mut self, frequency: Frequency) -> Self {
        self.rebalance_frequency = frequency;
        self
    }

    pub fn static_weights(mut self, weights: Vec<f64>) -> Self {
        self.static_weights = Some(weights);
        self
    }

    pub fn start_deposit(mut self, deposit: f64) -> Self {
        self.start_deposit = deposit;
        self
    }

    /// Checks everything that does not depend on the price data.
    pub fn validate(&self) -> Result<()> {
        if !self.start_deposit.is_finite() || self.start_deposit <= 0.0 {
            return Err(RebalancerError::config(format!(
                "start deposit must be positive, got {}",
                self.start_deposit
            )));
        }
        if self.weights_type == WeightsType::RiskParity && self.static_weights.is_some() {
            return Err(RebalancerError::config(
                "static weights should not be provided for risk parity, use weights_type='static' for static weights",
            ));
        }
        if let Some(weights) = &self.static_weights {
            if weights.is_empty() {
                return Err(RebalancerError::config("static weights are empty"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RebalancerConfig::default();
        assert_eq!(config.weights_type, WeightsType::Static);
        assert_eq!(config.rebalance_frequency.to_string(), "QE");
        assert_eq!(config.start_deposit, 100.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_strs() {
        let config = RebalancerConfig::from_strs("static", "M", Some(vec![0.333, 0.333, 0.334]), 1000.0).unwrap();
        assert_eq!(config.rebalance_frequency, Frequency::Month(1, Anchor::End));
        assert_eq!(config.static_weights.as_deref(), Some(&[0.333, 0.333, 0.334][..]));

        assert!(RebalancerConfig::from_strs("momentum", "Q", None, 100.0).is_err());
        assert!(RebalancerConfig::from_strs("static", "fortnightly", None, 100.0).is_err());
    }

    #[test]
    fn test_rejects_invalid_combinations() {
        let err = RebalancerConfig::new()
            .weights_type(WeightsType::RiskParity)
            .static_weights(vec![0.5, 0.5])
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("risk parity"));

        assert!(RebalancerConfig::new().start_deposit(-1.0).validate().is_err());
        assert!(RebalancerConfig::new().static_weights(vec![]).validate().is_err());
    }
}

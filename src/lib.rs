pub mod config;
pub mod error;
pub mod input_handler;
pub mod metrics;
pub mod prices;
pub mod schedule;
pub mod simulator;
pub mod weights;

pub use config::RebalancerConfig;
pub use error::{RebalancerError, Result};
pub use metrics::BacktestMetrics;
pub use prices::PriceSeries;
pub use schedule::{Frequency, RebalanceSchedule};
pub use simulator::{Rebalancer, SimulationResult, SimulationState};
pub use weights::{build_provider, InverseVolatility, StaticWeights, WeightProvider, WeightsType};

/// Validates `config` against the series and runs one simulation.
pub fn simulate(prices: &PriceSeries, config: &RebalancerConfig) -> Result<SimulationResult> {
    config.validate()?;
    let provider = build_provider(
        config.weights_type,
        config.static_weights.as_deref(),
        prices.n_assets(),
    )?;
    Rebalancer::new(prices, provider, config.rebalance_frequency, config.start_deposit)?.run()
}

#[cfg(feature = "python")]
mod python {
    use polars::prelude::*;
    use pyo3::prelude::*;
    use pyo3::types::PyDict;
    use pyo3_polars::PyDataFrame;

    use crate::input_handler::{allocations_to_df, equity_to_df, parse_price_df};
    use crate::metrics::BacktestMetrics;
    use crate::{simulate, RebalancerConfig};

    /// Python wrapper for the Rust rebalancing simulator
    #[pyclass]
    struct PyRebalancer {
        config: RebalancerConfig,
    }

    #[pymethods]
    impl PyRebalancer {
        /// Create a rebalancer; the configuration is validated immediately.
        #[new]
        #[pyo3(signature = (weights_type="static", rebalance_frequency="Q", static_weights=None, start_deposit=100.0))]
        fn new(
            weights_type: &str,
            rebalance_frequency: &str,
            static_weights: Option<Vec<f64>>,
            start_deposit: f64,
        ) -> PyResult<Self> {
            let config = RebalancerConfig::from_strs(
                weights_type,
                rebalance_frequency,
                static_weights,
                start_deposit,
            )
            .map_err(|e| PyErr::new::<pyo3::exceptions::PyValueError, _>(e.to_string()))?;
            Ok(PyRebalancer { config })
        }

        /// Run the simulation on a price DataFrame
        ///
        /// Args:
        ///     prices_df: Polars DataFrame with a timestamp column and one price column per asset
        ///
        /// Returns:
        ///     Tuple containing:
        ///     - Polars DataFrame with the equity curve
        ///     - Polars DataFrame with daily asset allocations
        ///     - Dictionary with performance metrics
        #[pyo3(text_signature = "(self, prices_df)")]
        fn run<'py>(
            &self,
            py: Python<'py>,
            prices_df: PyDataFrame,
        ) -> PyResult<(PyDataFrame, PyDataFrame, Py<PyDict>)> {
            let prices_df: DataFrame = prices_df.as_ref().clone();

            let prices = parse_price_df(&prices_df).map_err(|e| {
                PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
                    "Error parsing price data: {}",
                    e
                ))
            })?;

            let result = simulate(&prices, &self.config).map_err(|e| {
                if e.is_config() {
                    PyErr::new::<pyo3::exceptions::PyValueError, _>(e.to_string())
                } else {
                    PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!(
                        "Error running simulation: {}",
                        e
                    ))
                }
            })?;

            let to_py_err = |e: crate::RebalancerError| {
                PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(e.to_string())
            };
            let equity_df = equity_to_df(&result).map_err(to_py_err)?;
            let allocations_df = allocations_to_df(&result).map_err(to_py_err)?;
            let metrics = BacktestMetrics::from_result(&result);

            let metrics_dict = PyDict::new(py);
            metrics_dict.set_item("total_return", metrics.total_return)?;
            metrics_dict.set_item("annualized_return", metrics.annualized_return)?;
            metrics_dict.set_item("annualized_volatility", metrics.annualized_volatility)?;
            metrics_dict.set_item("sharpe_ratio", metrics.sharpe_ratio)?;
            metrics_dict.set_item("sortino_ratio", metrics.sortino_ratio)?;
            metrics_dict.set_item("max_drawdown", metrics.max_drawdown)?;
            metrics_dict.set_item("avg_drawdown", metrics.avg_drawdown)?;
            metrics_dict.set_item("avg_period_return", metrics.avg_period_return)?;
            metrics_dict.set_item("win_rate", metrics.win_rate)?;
            metrics_dict.set_item("num_rebalances", metrics.num_rebalances)?;
            metrics_dict.set_item("final_deposit", result.final_deposit)?;

            Ok((
                PyDataFrame(equity_df),
                PyDataFrame(allocations_df),
                metrics_dict.into(),
            ))
        }
    }

    /// A Python module implemented in Rust using PyO3.
    #[pymodule]
    fn portfolio_rebalancer(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_class::<PyRebalancer>()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_simulate_validates_before_running() {
        let prices = PriceSeries::new(
            vec!["A".into(), "B".into()],
            vec![date!(2023 - 03 - 30), date!(2023 - 03 - 31)],
            vec![vec![10.0, 20.0], vec![11.0, 19.0]],
        )
        .unwrap();

        let config = RebalancerConfig::new()
            .weights_type(WeightsType::RiskParity)
            .static_weights(vec![0.5, 0.5]);
        assert!(simulate(&prices, &config).unwrap_err().is_config());

        let config = RebalancerConfig::new().static_weights(vec![1.0]);
        assert!(simulate(&prices, &config).unwrap_err().is_config());

        let result = simulate(&prices, &RebalancerConfig::new()).unwrap();
        assert_eq!(result.rebalance_dates, vec![date!(2023 - 03 - 31)]);
        assert!((result.final_deposit - 102.5).abs() < 1e-9);
    }
}

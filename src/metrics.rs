use time::Date;

use crate::simulator::SimulationResult;

const DAYS_PER_YEAR: f64 = 365.25;

/// Observations per year implied by the spacing of `timestamps`.
///
/// Weekday-only daily data comes out near 261, monthly data near 12. Falls back
/// to one period per year when the series spans less than a day.
pub fn periods_per_year(timestamps: &[Date]) -> f64 {
    match (timestamps.first(), timestamps.last()) {
        (Some(first), Some(last)) if last > first => {
            let span_days = (*last - *first).whole_days() as f64;
            (timestamps.len() - 1) as f64 * DAYS_PER_YEAR / span_days
        }
        _ => 1.0,
    }
}

/// Summary statistics of an equity curve.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BacktestMetrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    /// Zero risk-free rate.
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Largest peak-to-trough loss as a positive fraction.
    pub max_drawdown: f64,
    /// Mean drawdown over the periods spent below a previous peak.
    pub avg_drawdown: f64,
    pub avg_period_return: f64,
    /// Share of periods with a positive return.
    pub win_rate: f64,
    pub num_rebalances: usize,
}

impl BacktestMetrics {
    /// Annualizes with the observation cadence of the simulated series.
    pub fn from_result(result: &SimulationResult) -> Self {
        let mut metrics = Self::from_equity(&result.equity, periods_per_year(&result.timestamps));
        metrics.num_rebalances = result.rebalance_dates.len();
        metrics
    }

    pub fn from_equity(equity: &[f64], periods_per_year: f64) -> Self {
        if equity.len() < 2 || equity[0] <= 0.0 {
            return Self::default();
        }

        let returns: Vec<f64> = equity
            .windows(2)
            .map(|w| if w[0] > 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
            .collect();
        let n = returns.len() as f64;

        let total_return = equity[equity.len() - 1] / equity[0] - 1.0;
        let years = n / periods_per_year;
        let annualized_return = if total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            -1.0
        };

        let avg_period_return = returns.iter().sum::<f64>() / n;
        let variance = returns
            .iter()
            .map(|r| (r - avg_period_return).powi(2))
            .sum::<f64>()
            / n;
        let annualized_volatility = variance.sqrt() * periods_per_year.sqrt();
        let sharpe_ratio = if annualized_volatility > 0.0 {
            avg_period_return * periods_per_year / annualized_volatility
        } else {
            0.0
        };

        let downside = returns
            .iter()
            .map(|r| r.min(0.0).powi(2))
            .sum::<f64>()
            / n;
        let downside_deviation = downside.sqrt() * periods_per_year.sqrt();
        let sortino_ratio = if downside_deviation > 0.0 {
            avg_period_return * periods_per_year / downside_deviation
        } else {
            0.0
        };

        let mut peak = equity[0];
        let mut max_drawdown: f64 = 0.0;
        let mut drawdown_sum = 0.0;
        let mut drawdown_periods = 0usize;
        for value in equity {
            if *value > peak {
                peak = *value;
            } else if peak > 0.0 && *value < peak {
                let drawdown = (peak - value) / peak;
                max_drawdown = max_drawdown.max(drawdown);
                drawdown_sum += drawdown;
                drawdown_periods += 1;
            }
        }
        let avg_drawdown = if drawdown_periods > 0 {
            drawdown_sum / drawdown_periods as f64
        } else {
            0.0
        };

        let wins = returns.iter().filter(|r| **r > 0.0).count();

        Self {
            total_return,
            annualized_return,
            annualized_volatility,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            avg_drawdown,
            avg_period_return,
            win_rate: wins as f64 / n,
            num_rebalances: 0,
        }
    }
}

use std::sync::Arc;
use time::Date;
use tracing::{debug, info};

use crate::error::{RebalancerError, Result};
use crate::prices::PriceSeries;
use crate::schedule::{Frequency, RebalanceSchedule};
use crate::weights::WeightProvider;

/// The state carried from one observation to the next.
///
/// All three fields change only at rebalance events. Between rebalances every
/// observation is marked against `reference_prices` with the frozen weights.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    /// Total portfolio value as of the most recent rebalance.
    pub deposit: f64,
    /// Prices at the most recent rebalance (or at series start).
    pub reference_prices: Vec<f64>,
    pub current_weights: Vec<f64>,
}

/// What a single observation contributes before any rebalance bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Per-asset mark-to-market value since the last rebalance.
    pub unrealized: Vec<f64>,
    /// Value-weighted allocation row, normalized to sum to 1.
    pub allocation: Vec<f64>,
}

impl SimulationState {
    pub fn new(start_deposit: f64, reference_prices: Vec<f64>, current_weights: Vec<f64>) -> Self {
        Self {
            deposit: start_deposit,
            reference_prices,
            current_weights,
        }
    }

    /// Percentage change of each asset since the reference prices.
    pub fn drift(&self, prices: &[f64]) -> Vec<f64> {
        prices
            .iter()
            .zip(&self.reference_prices)
            .map(|(price, reference)| (price - reference) / reference)
            .collect()
    }

    /// Unrealized value per asset: drift × weight × deposit.
    pub fn unrealized(&self, prices: &[f64]) -> Vec<f64> {
        self.value_change(&self.drift(prices))
    }

    fn value_change(&self, drift: &[f64]) -> Vec<f64> {
        drift
            .iter()
            .zip(&self.current_weights)
            .map(|(drift, weight)| drift * weight * self.deposit)
            .collect()
    }

    /// Marks one observation against the current state without mutating it.
    pub fn step(&self, timestamp: Date, prices: &[f64]) -> Result<StepOutcome> {
        let drift = self.drift(prices);
        let unrealized = self.value_change(&drift);

        let mut allocation: Vec<f64> = drift
            .iter()
            .zip(&self.current_weights)
            .map(|(drift, weight)| weight + drift * weight)
            .collect();
        let sum: f64 = allocation.iter().sum();
        if sum == 0.0 || !sum.is_finite() {
            return Err(RebalancerError::DegenerateAllocation { timestamp, sum });
        }
        for value in allocation.iter_mut() {
            *value /= sum;
        }

        Ok(StepOutcome {
            unrealized,
            allocation,
        })
    }

    /// Crystallizes the period's drift into the deposit and resets the reference.
    ///
    /// Returns the realized value per asset. New weights are applied afterwards by
    /// the caller so that the realized value always uses the weights of the period
    /// that just ended.
    pub fn crystallize(&mut self, prices: &[f64]) -> Vec<f64> {
        let realized = self.unrealized(prices);
        self.deposit += realized.iter().sum::<f64>();
        self.reference_prices = prices.to_vec();
        realized
    }
}

/// Output of a simulation run, one entry per input observation.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub assets: Vec<Arc<str>>,
    pub timestamps: Vec<Date>,
    /// Cumulative mark-to-market portfolio value.
    pub equity: Vec<f64>,
    /// Value-weighted allocation per asset, each row sums to 1.
    pub allocations: Vec<Vec<f64>>,
    pub unrealized_totals: Vec<f64>,
    /// Zero except on rebalance rows.
    pub realized_totals: Vec<f64>,
    pub rebalance_dates: Vec<Date>,
    pub final_deposit: f64,
    /// Target weights in force after the last observation.
    pub final_weights: Vec<f64>,
    /// Prices of the last rebalance row, or of the first row if none fired.
    pub final_reference_prices: Vec<f64>,
}

/// Periodically rebalanced portfolio over a synchronized price series.
pub struct Rebalancer<'a> {
    pub prices: &'a PriceSeries,
    pub provider: Box<dyn WeightProvider>,
    pub schedule: RebalanceSchedule,
    pub start_deposit: f64,
}

impl<'a> Rebalancer<'a> {
    /// Schedules rebalances by `frequency` over the span of the series.
    pub fn new(
        prices: &'a PriceSeries,
        provider: Box<dyn WeightProvider>,
        frequency: Frequency,
        start_deposit: f64,
    ) -> Result<Self> {
        let schedule =
            RebalanceSchedule::generate(prices.first_timestamp(), prices.last_timestamp(), frequency);
        Self::with_schedule(prices, provider, schedule, start_deposit)
    }

    pub fn with_schedule(
        prices: &'a PriceSeries,
        provider: Box<dyn WeightProvider>,
        schedule: RebalanceSchedule,
        start_deposit: f64,
    ) -> Result<Self> {
        if !start_deposit.is_finite() || start_deposit <= 0.0 {
            return Err(RebalancerError::config(format!(
                "start deposit must be positive, got {}",
                start_deposit
            )));
        }
        if prices.is_empty() {
            return Err(RebalancerError::empty_data("price series"));
        }
        Ok(Self {
            prices,
            provider,
            schedule,
            start_deposit,
        })
    }

    fn check_reference(&self, index: usize) -> Result<()> {
        let row = self.prices.row(index);
        if let Some(j) = row.iter().position(|p| *p == 0.0) {
            return Err(RebalancerError::zero_reference_price(
                self.prices.timestamps()[index],
                self.prices.assets()[j].to_string(),
            ));
        }
        Ok(())
    }

    fn check_weights(&self, timestamp: Date, weights: &[f64]) -> Result<()> {
        if weights.len() != self.prices.n_assets() {
            return Err(RebalancerError::config(format!(
                "{} provider returned {} weights at {}, expected {}",
                self.provider.name(),
                weights.len(),
                timestamp,
                self.prices.n_assets()
            )));
        }
        Ok(())
    }

    /// Runs the simulation.
    ///
    /// The simulation iterates through each observation in time order. Every
    /// observation is marked against the prices of the last rebalance. When the
    /// observation date is in the schedule, the period's drift is added to the
    /// deposit, the reference prices reset and fresh weights are requested.
    /// Schedule dates without an observation never trigger.
    pub fn run(&self) -> Result<SimulationResult> {
        let n = self.prices.len();
        let n_assets = self.prices.n_assets();
        info!(
            observations = n,
            assets = n_assets,
            strategy = self.provider.name(),
            scheduled = self.schedule.len(),
            start_deposit = self.start_deposit,
            "starting rebalancing simulation"
        );

        self.check_reference(0)?;
        let initial_weights = self.provider.initial_weights(n_assets);
        self.check_weights(self.prices.first_timestamp(), &initial_weights)?;
        let mut state = SimulationState::new(
            self.start_deposit,
            self.prices.row(0).to_vec(),
            initial_weights,
        );

        let mut allocations = Vec::with_capacity(n);
        let mut unrealized_totals = Vec::with_capacity(n);
        let mut realized_totals = Vec::with_capacity(n);
        let mut rebalance_dates = Vec::new();

        for (index, (timestamp, prices)) in self
            .prices
            .timestamps()
            .iter()
            .zip(self.prices.rows())
            .enumerate()
        {
            let outcome = state.step(*timestamp, prices)?;
            unrealized_totals.push(outcome.unrealized.iter().sum::<f64>());
            allocations.push(outcome.allocation);

            if self.schedule.contains(timestamp) {
                self.check_reference(index)?;
                let realized = state.crystallize(prices);
                let realized_total: f64 = realized.iter().sum();
                realized_totals.push(realized_total);

                let weights =
                    self.provider
                        .rebalance_weights(self.prices, index, &state.current_weights)?;
                self.check_weights(*timestamp, &weights)?;
                state.current_weights = weights;
                rebalance_dates.push(*timestamp);

                debug!(
                    %timestamp,
                    realized = realized_total,
                    deposit = state.deposit,
                    weights = ?state.current_weights,
                    "rebalanced"
                );
            } else {
                realized_totals.push(0.0);
            }
        }

        let skipped = self.schedule.len() - rebalance_dates.len();
        if skipped > 0 {
            debug!(skipped, "scheduled rebalance dates without an observation");
        }

        let equity = equity_curve(self.start_deposit, &realized_totals, &unrealized_totals);
        info!(
            rebalances = rebalance_dates.len(),
            final_deposit = state.deposit,
            final_equity = equity.last().copied().unwrap_or(self.start_deposit),
            "simulation finished"
        );

        Ok(SimulationResult {
            assets: self.prices.assets().to_vec(),
            timestamps: self.prices.timestamps().to_vec(),
            equity,
            allocations,
            unrealized_totals,
            realized_totals,
            rebalance_dates,
            final_deposit: state.deposit,
            final_weights: state.current_weights,
            final_reference_prices: state.reference_prices,
        })
    }
}

/// `start + cumsum(realized) + unrealized - realized`, evaluated left to right.
///
/// On a rebalance row the realized and unrealized totals coincide, so the curve
/// moves only with the market and not with the bookkeeping.
pub fn equity_curve(start_deposit: f64, realized_totals: &[f64], unrealized_totals: &[f64]) -> Vec<f64> {
    let mut cumulative = 0.0;
    realized_totals
        .iter()
        .zip(unrealized_totals)
        .map(|(realized, unrealized)| {
            cumulative += realized;
            start_deposit + cumulative + unrealized - realized
        })
        .collect()
}

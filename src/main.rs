//! Command-line runner: loads a price CSV, simulates the rebalanced portfolio and
//! writes the equity curve and allocation table next to each other.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use portfolio_rebalancer::input_handler::{allocations_to_df, equity_to_df, read_price_csv, write_csv};
use portfolio_rebalancer::metrics::BacktestMetrics;
use portfolio_rebalancer::{simulate, RebalancerConfig};

#[derive(Parser)]
#[command(name = "rebalance")]
#[command(about = "Periodically rebalanced portfolio simulator", long_about = None)]
struct Cli {
    /// CSV file with a timestamp column and one price column per asset
    #[arg(short, long)]
    prices: PathBuf,

    /// Weights strategy: static or risk_parity
    #[arg(short, long, default_value = "static")]
    weights_type: String,

    /// Rebalance frequency (D, B, W, W-FRI, M, MS, Q, QS, A, YS, with optional multiplier)
    #[arg(short, long, default_value = "Q")]
    frequency: String,

    /// Comma separated static weights, one per asset column
    #[arg(long, value_delimiter = ',')]
    weights: Option<Vec<f64>>,

    /// Starting portfolio value
    #[arg(short, long, default_value = "100.0")]
    deposit: f64,

    /// Directory for the equity and allocation CSV files
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RebalancerConfig::from_strs(&cli.weights_type, &cli.frequency, cli.weights, cli.deposit)?;
    let prices = read_price_csv(&cli.prices)
        .with_context(|| format!("failed to load prices from {}", cli.prices.display()))?;
    info!(
        assets = prices.n_assets(),
        observations = prices.len(),
        "loaded price series"
    );

    let result = simulate(&prices, &config)?;

    let mut equity = equity_to_df(&result)?;
    let mut allocations = allocations_to_df(&result)?;
    let equity_path = cli.output_dir.join(format!("equity_{}.csv", config.weights_type));
    let allocations_path = cli
        .output_dir
        .join(format!("allocations_{}.csv", config.weights_type));
    write_csv(&mut equity, &equity_path, b';')?;
    write_csv(&mut allocations, &allocations_path, b';')?;
    info!(
        equity = %equity_path.display(),
        allocations = %allocations_path.display(),
        "results written"
    );

    println!("Cumulative Equity:\n{:?}", equity.tail(Some(5)));
    println!("\nAsset Allocations:\n{:?}", allocations.tail(Some(5)));

    let metrics = BacktestMetrics::from_result(&result);
    println!("\nPerformance:\n{:#?}", metrics);
    Ok(())
}

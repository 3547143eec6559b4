use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use time::format_description::{self, BorrowedFormatItem};
use time::Date;

use crate::error::{RebalancerError, Result};
use crate::prices::PriceSeries;
use crate::simulator::SimulationResult;

pub const TIMESTAMP_COLUMN: &str = "timestamp";

fn date_formats() -> Result<Vec<Vec<BorrowedFormatItem<'static>>>> {
    ["[year]-[month]-[day]", "[month]/[day]/[year]"]
        .iter()
        .map(|fmt| {
            format_description::parse(fmt)
                .map_err(|e| RebalancerError::config(format!("Error creating date format: {:?}", e)))
        })
        .collect()
}

/// Parses a date in `YYYY-MM-DD` or `MM/DD/YYYY` form. A trailing time of day is ignored.
pub fn parse_date(value: &str) -> Result<Date> {
    let day_part = value
        .split(|c: char| c == 'T' || c.is_whitespace())
        .next()
        .unwrap_or(value);
    for format in date_formats()? {
        if let Ok(date) = Date::parse(day_part, &format) {
            return Ok(date);
        }
    }
    Err(RebalancerError::DateParse {
        value: value.to_string(),
    })
}

pub fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Parses a price DataFrame into a `PriceSeries`.
///
/// The input DF must include a "timestamp" column (or use its first column as the
/// timestamp) holding `YYYY-MM-DD` or `MM/DD/YYYY` dates, and one numeric column per
/// asset. Rows must already be sorted and synchronized; nulls are rejected.
pub fn parse_price_df(df: &DataFrame) -> Result<PriceSeries> {
    if df.height() == 0 || df.width() < 2 {
        return Err(RebalancerError::empty_data("price table"));
    }

    let column_names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let ts_name = if column_names.iter().any(|name| name == TIMESTAMP_COLUMN) {
        TIMESTAMP_COLUMN.to_string()
    } else {
        column_names[0].clone()
    };

    let ts_series = df.column(&ts_name)?.cast(&DataType::String)?;
    let ts_chunked = ts_series.str()?;
    let mut timestamps = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let ts_str = ts_chunked
            .get(i)
            .ok_or_else(|| RebalancerError::config(format!("Missing timestamp value in row {}", i)))?;
        timestamps.push(parse_date(ts_str)?);
    }

    let asset_names: Vec<&String> = column_names.iter().filter(|name| **name != ts_name).collect();
    let mut rows = vec![Vec::with_capacity(asset_names.len()); df.height()];
    for col_name in &asset_names {
        let col = df.column(col_name.as_str())?;
        for (i, row) in rows.iter_mut().enumerate() {
            let price_val = col.get(i)?;
            let price: f64 = match price_val {
                AnyValue::Float64(p) => p,
                AnyValue::Int64(p) => p as f64,
                AnyValue::Null => {
                    return Err(RebalancerError::config(format!(
                        "missing price for '{}' at {}",
                        col_name, timestamps[i]
                    )))
                }
                other => other.extract::<f64>().ok_or_else(|| {
                    RebalancerError::config(format!(
                        "non-numeric price for '{}' at {}",
                        col_name, timestamps[i]
                    ))
                })?,
            };
            row.push(price);
        }
    }

    let assets = asset_names
        .into_iter()
        .map(|name| Arc::from(name.as_str()))
        .collect();
    PriceSeries::new(assets, timestamps, rows)
}

/// Loads a comma separated price file with a header row.
pub fn read_price_csv(path: &Path) -> Result<PriceSeries> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    parse_price_df(&df)
}

fn timestamp_column(result: &SimulationResult) -> Column {
    let values: Vec<String> = result.timestamps.iter().map(|d| format_date(*d)).collect();
    Column::new(TIMESTAMP_COLUMN.into(), values)
}

/// Equity curve as a two-column frame: `timestamp`, `equity`.
pub fn equity_to_df(result: &SimulationResult) -> Result<DataFrame> {
    let columns = vec![
        timestamp_column(result),
        Column::new("equity".into(), result.equity.clone()),
    ];
    Ok(DataFrame::new(columns)?)
}

/// Allocation table: `timestamp` followed by one column per asset.
pub fn allocations_to_df(result: &SimulationResult) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(result.assets.len() + 1);
    columns.push(timestamp_column(result));
    for (j, asset) in result.assets.iter().enumerate() {
        let values: Vec<f64> = result.allocations.iter().map(|row| row[j]).collect();
        columns.push(Column::new(PlSmallStr::from_str(asset), values));
    }
    Ok(DataFrame::new(columns)?)
}

pub fn write_csv(df: &mut DataFrame, path: &Path, separator: u8) -> Result<()> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(separator)
        .finish(df)?;
    Ok(())
}

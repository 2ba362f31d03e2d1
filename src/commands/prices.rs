use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use std::path::Path;

use crate::data_context::load_prices_csv;

#[derive(Debug, Clone, Copy)]
pub struct PeriodFilter<'a> {
    pub ticker: &'a str,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

pub fn run(prices_path: &Path, period: Option<PeriodFilter<'_>>) -> Result<()> {
    let table = load_prices_csv(prices_path)?;

    if let Some(period) = period {
        let change = table
            .pct_change_between(period.ticker, period.start, period.end)
            .ok_or_else(|| {
                anyhow!(
                    "Fewer than two {} prices between {} and {}",
                    period.ticker,
                    period.start,
                    period.end
                )
            })?;
        println!(
            "{} {} -> {}: {:.2} -> {:.2} ({:+.2}%, {:+.2})",
            period.ticker,
            change.start_date,
            change.end_date,
            change.start_close,
            change.end_close,
            change.pct_change,
            change.abs_change
        );
        return Ok(());
    }

    let summaries = table.summaries();
    if summaries.is_empty() {
        println!("No prices in {}", prices_path.display());
        return Ok(());
    }
    println!(
        "{:<10} {:>6} {:>12} {:>12} {:>12} {:>12}",
        "ticker", "days", "last", "min", "max", "avg chg %"
    );
    for summary in summaries {
        let mean_change = summary
            .mean_daily_change
            .map(|value| format!("{value:+.2}"))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "{:<10} {:>6} {:>12.2} {:>12.2} {:>12.2} {:>12}",
            summary.ticker,
            summary.observations,
            summary.last_close,
            summary.min_close,
            summary.max_close,
            mean_change
        );
    }
    Ok(())
}

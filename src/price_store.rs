use crate::models::PricePoint;
use chrono::NaiveDate;
use serde::Serialize;
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, HashMap};

/// Per-ticker daily price history.
pub trait PriceSeriesStore {
    /// Date-ordered series for `ticker`; empty when the ticker is unknown.
    fn series(&self, ticker: &str) -> &[PricePoint];

    fn tickers(&self) -> Vec<String>;
}

impl PriceSeriesStore for HashMap<String, Vec<PricePoint>> {
    fn series(&self, ticker: &str) -> &[PricePoint] {
        self.get(ticker).map(Vec::as_slice).unwrap_or(&[])
    }

    fn tickers(&self) -> Vec<String> {
        let mut tickers: Vec<String> = self.keys().cloned().collect();
        tickers.sort();
        tickers
    }
}

#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    by_ticker: BTreeMap<String, Vec<PricePoint>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodChange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_close: f64,
    pub end_close: f64,
    pub pct_change: f64,
    pub abs_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSummary {
    pub ticker: String,
    pub observations: usize,
    pub last_close: f64,
    pub min_close: f64,
    pub max_close: f64,
    pub mean_daily_change: Option<f64>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups points by ticker and orders each series by date. The sort is
    /// stable, so points sharing a date keep their input order.
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = PricePoint>,
    {
        let mut by_ticker: BTreeMap<String, Vec<PricePoint>> = BTreeMap::new();
        for point in points {
            by_ticker.entry(point.ticker.clone()).or_default().push(point);
        }
        for series in by_ticker.values_mut() {
            series.sort_by_key(|point| point.date);
        }
        Self { by_ticker }
    }

    /// Builds a series from raw closes, deriving the daily percentage change
    /// against the previous observation. The first observation has no
    /// previous close and gets NaN.
    pub fn from_closes<I>(ticker: &str, closes: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let mut ordered: Vec<(NaiveDate, f64)> = closes.into_iter().collect();
        ordered.sort_by_key(|(date, _)| *date);

        let mut previous: Option<f64> = None;
        let points = ordered
            .into_iter()
            .map(|(date, close)| {
                let daily_pct_change = match previous {
                    Some(prev) if prev != 0.0 => (close - prev) / prev * 100.0,
                    _ => f64::NAN,
                };
                previous = Some(close);
                PricePoint {
                    ticker: ticker.to_string(),
                    date,
                    close,
                    daily_pct_change,
                }
            })
            .collect::<Vec<_>>();

        Self::from_points(points)
    }

    /// Merges another table in, replacing any ticker it also contains.
    pub fn extend(&mut self, other: PriceTable) {
        self.by_ticker.extend(other.by_ticker);
    }

    pub fn is_empty(&self) -> bool {
        self.by_ticker.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_ticker.values().map(Vec::len).sum()
    }

    /// Change between the first and last observation inside `[start, end]`.
    pub fn pct_change_between(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Option<PeriodChange> {
        let window: Vec<&PricePoint> = self
            .series(ticker)
            .iter()
            .filter(|point| point.date >= start && point.date <= end)
            .collect();
        if window.len() < 2 {
            return None;
        }
        let first = window.first()?;
        let last = window.last()?;
        if first.close == 0.0 {
            return None;
        }
        Some(PeriodChange {
            start_date: first.date,
            end_date: last.date,
            start_close: first.close,
            end_close: last.close,
            pct_change: (last.close - first.close) / first.close * 100.0,
            abs_change: last.close - first.close,
        })
    }

    pub fn summaries(&self) -> Vec<PriceSummary> {
        self.by_ticker
            .iter()
            .filter_map(|(ticker, series)| {
                let last = series.last()?;
                let closes: Vec<f64> = series.iter().map(|point| point.close).collect();
                let changes: Vec<f64> = series
                    .iter()
                    .map(|point| point.daily_pct_change)
                    .filter(|value| value.is_finite())
                    .collect();
                let mean_daily_change = if changes.is_empty() {
                    None
                } else {
                    Some(changes.iter().mean())
                };
                Some(PriceSummary {
                    ticker: ticker.clone(),
                    observations: series.len(),
                    last_close: last.close,
                    min_close: closes.iter().copied().fold(f64::INFINITY, f64::min),
                    max_close: closes.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    mean_daily_change,
                })
            })
            .collect()
    }
}

impl PriceSeriesStore for PriceTable {
    fn series(&self, ticker: &str) -> &[PricePoint] {
        self.by_ticker
            .get(ticker)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn tickers(&self) -> Vec<String> {
        self.by_ticker.keys().cloned().collect()
    }
}

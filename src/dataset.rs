//! Aligns scored news with per-ticker price history to produce labeled
//! training examples.
//!
//! No publication date is parsed from the news. Each item is aligned to its
//! ticker's most recent price date, so every item for one ticker in one build
//! receives the same target.

use crate::error::Result;
use crate::models::{NewsItem, PricePoint, SentimentLabel, TrainingExample};
use crate::price_store::PriceSeriesStore;
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::Serialize;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    NoPriceHistory,
    UndefinedTarget,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoPriceHistory => "no price history",
            SkipReason::UndefinedTarget => "undefined target",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlignmentOutcome {
    Kept(TrainingExample),
    Skipped {
        index: usize,
        ticker: String,
        reason: SkipReason,
    },
}

impl AlignmentOutcome {
    pub fn example(&self) -> Option<&TrainingExample> {
        match self {
            AlignmentOutcome::Kept(example) => Some(example),
            AlignmentOutcome::Skipped { .. } => None,
        }
    }

    pub fn is_kept(&self) -> bool {
        matches!(self, AlignmentOutcome::Kept(_))
    }
}

/// Most recent date in the series, used as the stand-in news date.
pub fn reference_date(series: &[PricePoint]) -> Option<NaiveDate> {
    series.iter().map(|point| point.date).max()
}

/// Percentage move after `reference`: towards the first close strictly after
/// it when one exists, otherwise the daily change recorded on `reference`.
pub fn forward_pct_change(series: &[PricePoint], reference: NaiveDate) -> Option<f64> {
    let before_date = series
        .iter()
        .map(|point| point.date)
        .filter(|date| *date <= reference)
        .max()?;
    // Repeated dates resolve to the last point in input order.
    let price_before = series
        .iter()
        .rev()
        .find(|point| point.date == before_date)?
        .close;

    let next_close = series
        .iter()
        .filter(|point| point.date > reference)
        .min_by_key(|point| point.date)
        .map(|point| point.close);

    let target = match next_close {
        Some(after) => {
            if price_before == 0.0 {
                return None;
            }
            (after - price_before) / price_before * 100.0
        }
        None => series
            .iter()
            .rev()
            .find(|point| point.date == reference)
            .map(|point| point.daily_pct_change)?,
    };

    if target.is_finite() {
        Some(target)
    } else {
        None
    }
}

fn align_item<P>(index: usize, item: &NewsItem, prices: &P) -> Result<AlignmentOutcome>
where
    P: PriceSeriesStore + ?Sized,
{
    let label = SentimentLabel::parse(&item.sentiment_label)?;
    let series = prices.series(&item.ticker);

    let Some(reference) = reference_date(series) else {
        return Ok(AlignmentOutcome::Skipped {
            index,
            ticker: item.ticker.clone(),
            reason: SkipReason::NoPriceHistory,
        });
    };

    let Some(target_pct_change) = forward_pct_change(series, reference) else {
        return Ok(AlignmentOutcome::Skipped {
            index,
            ticker: item.ticker.clone(),
            reason: SkipReason::UndefinedTarget,
        });
    };

    Ok(AlignmentOutcome::Kept(TrainingExample {
        ticker: item.ticker.clone(),
        sentiment_label: label,
        sentiment_encoded: label.encode(),
        confidence: item.confidence,
        score_positive: item.score_positive,
        score_negative: item.score_negative,
        score_neutral: item.score_neutral,
        target_pct_change,
    }))
}

/// One outcome per news item, in input order. An unrecognized sentiment
/// label aborts the whole alignment.
pub fn align_news<P>(news: &[NewsItem], prices: &P) -> Result<Vec<AlignmentOutcome>>
where
    P: PriceSeriesStore + ?Sized,
{
    news.iter()
        .enumerate()
        .map(|(index, item)| align_item(index, item, prices))
        .collect()
}

pub fn build_dataset<P>(news: &[NewsItem], prices: &P) -> Result<Vec<TrainingExample>>
where
    P: PriceSeriesStore + ?Sized,
{
    let outcomes = align_news(news, prices)?;

    let mut skipped_by_reason: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut examples = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome {
            AlignmentOutcome::Kept(example) => examples.push(example),
            AlignmentOutcome::Skipped {
                index,
                ticker,
                reason,
            } => {
                debug!("Skipping news item #{} for {}: {}", index, ticker, reason.as_str());
                *skipped_by_reason.entry(reason.as_str()).or_default() += 1;
            }
        }
    }

    if !skipped_by_reason.is_empty() {
        let details = skipped_by_reason
            .iter()
            .map(|(reason, count)| format!("{reason}={count}"))
            .collect::<Vec<_>>()
            .join(", ");
        info!("Skipped news items: {}", details);
    }

    let summary = DatasetSummary::from_examples(&examples);
    let shared: Vec<&String> = summary
        .ticker_counts
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(ticker, _)| ticker)
        .collect();
    if !shared.is_empty() {
        warn!(
            "{} ticker(s) have several news items aligned to the same latest price date; their examples share one target",
            shared.len()
        );
    }
    info!("Dataset prepared: {}", summary.describe());

    Ok(examples)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub row_count: usize,
    pub label_counts: BTreeMap<String, usize>,
    pub ticker_counts: BTreeMap<String, usize>,
    pub target_min: Option<f64>,
    pub target_max: Option<f64>,
    pub target_mean: Option<f64>,
}

impl DatasetSummary {
    pub fn from_examples(examples: &[TrainingExample]) -> Self {
        let mut label_counts: BTreeMap<String, usize> = SentimentLabel::ALL
            .iter()
            .map(|label| (label.as_str().to_string(), 0))
            .collect();
        let mut ticker_counts: BTreeMap<String, usize> = BTreeMap::new();
        for example in examples {
            *label_counts
                .entry(example.sentiment_label.as_str().to_string())
                .or_default() += 1;
            *ticker_counts.entry(example.ticker.clone()).or_default() += 1;
        }

        let targets: Vec<f64> = examples
            .iter()
            .map(|example| example.target_pct_change)
            .collect();
        let (target_min, target_max, target_mean) = if targets.is_empty() {
            (None, None, None)
        } else {
            (
                Some(targets.iter().copied().fold(f64::INFINITY, f64::min)),
                Some(targets.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
                Some(targets.iter().mean()),
            )
        };

        Self {
            row_count: examples.len(),
            label_counts,
            ticker_counts,
            target_min,
            target_max,
            target_mean,
        }
    }

    pub fn describe(&self) -> String {
        let labels = self
            .label_counts
            .iter()
            .map(|(label, count)| format!("{label}={count}"))
            .collect::<Vec<_>>()
            .join(" ");
        let target = match (self.target_min, self.target_max, self.target_mean) {
            (Some(min), Some(max), Some(mean)) => {
                format!("target(min={min:.2}%, max={max:.2}%, mean={mean:.2}%)")
            }
            _ => "target(-)".to_string(),
        };
        format!(
            "{} example(s) across {} ticker(s) [{}] {}",
            self.row_count,
            self.ticker_counts.len(),
            labels,
            target
        )
    }
}

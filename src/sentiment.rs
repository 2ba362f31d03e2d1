use crate::models::{NewsItem, SentimentLabel};
use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

/// Applied to the neutral probability only when picking the label, so that
/// borderline texts lean towards a polarity.
pub const NEUTRAL_SELECTION_WEIGHT: f64 = 0.80;

/// Output contract of a text classifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SentimentScore {
    pub label: SentimentLabel,
    /// Unadjusted probability of `label`, in percent.
    pub confidence_pct: f64,
    pub prob_positive: f64,
    pub prob_negative: f64,
    pub prob_neutral: f64,
}

impl SentimentScore {
    /// Picks the label from raw class probabilities. The reported confidence
    /// and probabilities are the unadjusted values; only the label choice
    /// sees the down-weighted neutral class. Ties go to the first class in
    /// negative, neutral, positive order.
    pub fn from_probabilities(negative: f64, neutral: f64, positive: f64) -> Self {
        let candidates = [
            (SentimentLabel::Negative, negative, negative),
            (
                SentimentLabel::Neutral,
                neutral * NEUTRAL_SELECTION_WEIGHT,
                neutral,
            ),
            (SentimentLabel::Positive, positive, positive),
        ];

        let mut best = candidates[0];
        for candidate in candidates.iter().skip(1) {
            if candidate.1 > best.1 {
                best = *candidate;
            }
        }

        let (label, _, raw_probability) = best;
        Self {
            label,
            confidence_pct: (raw_probability * 1000.0).round() / 10.0,
            prob_positive: positive,
            prob_negative: negative,
            prob_neutral: neutral,
        }
    }

    pub fn into_news_item(self, ticker: &str, headline: Option<String>) -> NewsItem {
        NewsItem {
            ticker: ticker.to_string(),
            sentiment_label: self.label.as_str().to_string(),
            confidence: self.confidence_pct,
            score_positive: self.prob_positive,
            score_negative: self.prob_negative,
            score_neutral: self.prob_neutral,
            headline,
        }
    }
}

/// A text classifier. Implementations wrap whatever model produces the
/// three class probabilities.
pub trait SentimentScorer {
    fn score(&self, text: &str) -> Result<SentimentScore>;
}

/// Scores each headline for `ticker`, in order.
pub fn score_headlines<S, I, T>(scorer: &S, ticker: &str, headlines: I) -> Result<Vec<NewsItem>>
where
    S: SentimentScorer + ?Sized,
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    headlines
        .into_iter()
        .map(|headline| {
            let text = headline.as_ref();
            let score = scorer
                .score(text)
                .with_context(|| format!("Failed to score headline for {ticker}: \"{text}\""))?;
            debug!(
                "Scored {} headline as {} ({:.1}%)",
                ticker, score.label, score.confidence_pct
            );
            Ok(score.into_news_item(ticker, Some(text.to_string())))
        })
        .collect()
}

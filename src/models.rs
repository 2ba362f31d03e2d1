use crate::error::{ImpactError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Feature order shared by training and prediction.
pub const FEATURE_NAMES: [&str; 5] = [
    "sentiment_encoded",
    "confidence",
    "score_positive",
    "score_negative",
    "score_neutral",
];
pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SentimentLabel {
    Negative,
    Neutral,
    Positive,
}

impl SentimentLabel {
    pub const ALL: [SentimentLabel; 3] = [Self::Negative, Self::Neutral, Self::Positive];

    /// Accepts the English names and the Portuguese names found in older news tables.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "positive" | "positivo" => Ok(Self::Positive),
            "negative" | "negativo" => Ok(Self::Negative),
            "neutral" | "neutro" => Ok(Self::Neutral),
            _ => Err(ImpactError::UnknownSentimentLabel {
                label: raw.to_string(),
            }),
        }
    }

    pub fn encode(self) -> i8 {
        match self {
            Self::Negative => -1,
            Self::Neutral => 0,
            Self::Positive => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

impl FromStr for SentimentLabel {
    type Err = ImpactError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encodes a raw label string into the model's numeric sentiment feature.
pub fn encode_sentiment(raw: &str) -> Result<i8> {
    SentimentLabel::parse(raw).map(SentimentLabel::encode)
}

/// A scored news item. The label is kept as read so that an unknown value
/// surfaces only when the item is actually encoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsItem {
    pub ticker: String,
    pub sentiment_label: String,
    pub confidence: f64,
    pub score_positive: f64,
    pub score_negative: f64,
    pub score_neutral: f64,
    #[serde(default)]
    pub headline: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricePoint {
    pub ticker: String,
    pub date: NaiveDate,
    pub close: f64,
    pub daily_pct_change: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingExample {
    pub ticker: String,
    pub sentiment_label: SentimentLabel,
    pub sentiment_encoded: i8,
    pub confidence: f64,
    pub score_positive: f64,
    pub score_negative: f64,
    pub score_neutral: f64,
    pub target_pct_change: f64,
}

impl TrainingExample {
    pub fn features(&self) -> [f64; FEATURE_COUNT] {
        feature_vector(
            self.sentiment_encoded,
            self.confidence,
            self.score_positive,
            self.score_negative,
            self.score_neutral,
        )
    }
}

pub fn feature_vector(
    sentiment_encoded: i8,
    confidence: f64,
    score_positive: f64,
    score_negative: f64,
    score_neutral: f64,
) -> [f64; FEATURE_COUNT] {
    [
        sentiment_encoded as f64,
        confidence,
        score_positive,
        score_negative,
        score_neutral,
    ]
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Zero counts as Down.
    pub fn from_change(pct_change: f64) -> Self {
        if pct_change > 0.0 {
            Direction::Up
        } else {
            Direction::Down
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImpactPrediction {
    pub predicted_pct_change: f64,
    pub direction: Direction,
    pub intensity: f64,
}

impl ImpactPrediction {
    pub fn from_change(predicted_pct_change: f64) -> Self {
        Self {
            predicted_pct_change,
            direction: Direction::from_change(predicted_pct_change),
            intensity: predicted_pct_change.abs(),
        }
    }
}

impl fmt::Display for ImpactPrediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:+.2}% (intensity {:.2})",
            self.direction.as_str(),
            self.predicted_pct_change,
            self.intensity
        )
    }
}

use anyhow::{anyhow, Context, Result};
use std::path::Path;

use crate::context::AppContext;
use crate::models::ImpactPrediction;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentScores {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
}

/// Parses `pos,neg,neu`.
pub fn parse_scores(raw: &str) -> Result<SentimentScores> {
    let values = raw
        .split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<f64>()
                .map_err(|_| anyhow!("Score '{}' is not a number", part))
        })
        .collect::<Result<Vec<f64>>>()?;
    match values.as_slice() {
        [positive, negative, neutral] => Ok(SentimentScores {
            positive: *positive,
            negative: *negative,
            neutral: *neutral,
        }),
        _ => Err(anyhow!(
            "Expected three scores as positive,negative,neutral (got {})",
            values.len()
        )),
    }
}

pub fn run(
    app: &AppContext,
    model_path: &Path,
    label: &str,
    confidence: f64,
    scores: SentimentScores,
) -> Result<ImpactPrediction> {
    let model = app.require_model(model_path)?;
    let prediction = model
        .predict(
            label,
            confidence,
            scores.positive,
            scores.negative,
            scores.neutral,
        )
        .context("Prediction failed")?;

    println!("Predicted impact: {}", prediction);
    println!(
        "{}",
        serde_json::to_string(&prediction).context("Failed to serialize prediction")?
    );
    Ok(prediction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_scores() {
        let scores = parse_scores("80, 5.5,14.5").unwrap();
        assert_eq!(
            scores,
            SentimentScores {
                positive: 80.0,
                negative: 5.5,
                neutral: 14.5
            }
        );
    }

    #[test]
    fn rejects_wrong_arity_and_text() {
        assert!(parse_scores("1,2").is_err());
        assert!(parse_scores("1,2,3,4").is_err());
        let err = parse_scores("1,x,3").unwrap_err();
        assert!(err.to_string().contains("'x'"), "{err}");
    }
}

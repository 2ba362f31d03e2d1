use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::TrainingConfig;
use crate::context::AppContext;
use crate::dataset::{build_dataset, DatasetSummary};
use crate::forest::ForestConfig;
use crate::impact_model::{ImpactModel, TrainingMetrics};

#[derive(Debug, Clone, Default)]
pub struct TrainOptions {
    pub news_path: PathBuf,
    pub prices_path: PathBuf,
    pub output: Option<PathBuf>,
    pub n_trees: Option<usize>,
    pub max_depth: Option<usize>,
    pub seed: Option<u64>,
    pub min_examples: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrainingSummary {
    model_path: String,
    hyperparameters: ForestConfig,
    test_fraction: f64,
    dataset: DatasetSummary,
    metrics: TrainingMetrics,
}

pub fn run(app: &AppContext, options: TrainOptions) -> Result<TrainingMetrics> {
    let config = resolve_training_config(app.training_config(), &options)?;
    let min_examples = options
        .min_examples
        .unwrap_or(app.settings().min_training_examples);
    let destination = app.model_path(options.output.clone());

    let data = app.load_pipeline_data(&options.news_path, &options.prices_path)?;
    for ticker in data.tickers_without_prices() {
        warn!("No price history for {}; its news will be skipped", ticker);
    }

    let examples = build_dataset(data.news(), data.prices())
        .context("Failed to build the training dataset")?;
    if examples.len() < min_examples {
        return Err(anyhow!(
            "Only {} training example(s) could be aligned; at least {} are required",
            examples.len(),
            min_examples
        ));
    }
    let dataset = DatasetSummary::from_examples(&examples);

    let mut model = ImpactModel::new(config);
    let metrics = model.train(&examples)?;
    save_model(&model, &destination)?;

    println!(
        "Impact model trained on {} example(s): MAE={:.2}% R²={:.3}",
        dataset.row_count, metrics.mean_absolute_error, metrics.r_squared
    );
    println!("Saved impact model to {}", destination.display());

    let summary = TrainingSummary {
        model_path: destination.display().to_string(),
        hyperparameters: config.forest,
        test_fraction: config.test_fraction,
        dataset,
        metrics: metrics.clone(),
    };
    match serde_json::to_string(&summary) {
        Ok(payload) => println!("NEWS_IMPACT_TRAIN_SUMMARY={payload}"),
        Err(err) => warn!("Failed to serialize training summary: {err}"),
    }

    Ok(metrics)
}

fn resolve_training_config(base: TrainingConfig, options: &TrainOptions) -> Result<TrainingConfig> {
    let mut config = base;
    if let Some(n_trees) = options.n_trees {
        if n_trees == 0 {
            return Err(anyhow!("--trees must be at least 1"));
        }
        config.forest.n_trees = n_trees;
    }
    if let Some(max_depth) = options.max_depth {
        if max_depth == 0 {
            return Err(anyhow!("--max-depth must be at least 1"));
        }
        config.forest.max_depth = max_depth;
    }
    if let Some(seed) = options.seed {
        config.forest.seed = seed;
        config.split_seed = seed;
    }
    Ok(config)
}

fn save_model(model: &ImpactModel, destination: &Path) -> Result<()> {
    model
        .save_to_file(destination)
        .with_context(|| format!("Failed to save impact model to {}", destination.display()))?;
    info!("Impact model written to {}", destination.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_replace_configured_values() {
        let options = TrainOptions {
            n_trees: Some(12),
            max_depth: Some(3),
            seed: Some(9),
            ..TrainOptions::default()
        };
        let config = resolve_training_config(TrainingConfig::default(), &options).unwrap();
        assert_eq!(config.forest.n_trees, 12);
        assert_eq!(config.forest.max_depth, 3);
        assert_eq!(config.forest.seed, 9);
        assert_eq!(config.split_seed, 9);
        assert_eq!(config.test_fraction, 0.2);
    }

    #[test]
    fn zero_trees_is_rejected() {
        let options = TrainOptions {
            n_trees: Some(0),
            ..TrainOptions::default()
        };
        assert!(resolve_training_config(TrainingConfig::default(), &options).is_err());
    }
}

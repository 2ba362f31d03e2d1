//! Regression model mapping sentiment features to a percentage price change.
//!
//! `ImpactModel` is an explicit handle: it starts untrained, becomes trained
//! after [`ImpactModel::train`] or loaded after reading a persisted artifact,
//! and only then serves predictions. Retraining replaces the fitted state
//! wholesale.
//!
//! Callers are expected to gate training on a minimum number of examples
//! (the application uses 5). Smaller inputs are accepted but the held-out
//! metrics become meaningless.

use crate::config::TrainingConfig;
use crate::error::{ImpactError, Result};
use crate::forest::RandomForestRegressor;
use crate::models::{
    feature_vector, ImpactPrediction, SentimentLabel, TrainingExample, FEATURE_COUNT,
    FEATURE_NAMES,
};
use crate::performance::PerformanceCalculator;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use uuid::Uuid;

const MODEL_FORMAT_VERSION: u32 = 1;
const RELIABLE_SAMPLE_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Untrained,
    Trained,
    Loaded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingMetrics {
    pub mean_absolute_error: f64,
    pub r_squared: f64,
    pub train_rows: usize,
    pub eval_rows: usize,
    /// Sorted by importance, highest first.
    pub feature_importances: Vec<FeatureImportance>,
}

/// Everything a later process needs to serve predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    forest: RandomForestRegressor,
    feature_names: Vec<String>,
    trained_at: DateTime<Utc>,
    metrics: TrainingMetrics,
}

#[derive(Serialize, Deserialize)]
struct ModelEnvelope {
    version: u32,
    model: FittedModel,
}

impl FittedModel {
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }

    pub fn forest(&self) -> &RandomForestRegressor {
        &self.forest
    }

    fn validate(&self) -> Result<()> {
        if self.feature_names.is_empty() {
            return Err(ImpactError::corrupt("feature name list is missing"));
        }
        if self.feature_names.len() != self.forest.num_features() {
            return Err(ImpactError::corrupt(format!(
                "{} feature name(s) recorded but the regressor expects {}",
                self.feature_names.len(),
                self.forest.num_features()
            )));
        }
        if self.feature_names.iter().map(String::as_str).ne(FEATURE_NAMES) {
            return Err(ImpactError::corrupt(format!(
                "feature order [{}] does not match [{}]",
                self.feature_names.join(", "),
                FEATURE_NAMES.join(", ")
            )));
        }
        self.forest.validate().map_err(ImpactError::corrupt)
    }

    /// Arranges the named inputs in the order recorded at fit time.
    fn arrange_features(&self, named: &[f64; FEATURE_COUNT]) -> Result<Vec<f64>> {
        let values = self
            .feature_names
            .iter()
            .map(|name| {
                FEATURE_NAMES
                    .iter()
                    .position(|known| known == name)
                    .map(|idx| named[idx])
                    .ok_or_else(|| ImpactError::corrupt(format!("unknown feature \"{name}\"")))
            })
            .collect::<Result<Vec<f64>>>()?;

        if values.len() != self.forest.num_features() {
            return Err(ImpactError::FeatureMismatch {
                expected: self.forest.num_features(),
                actual: values.len(),
            });
        }
        Ok(values)
    }

    fn predict_change(&self, named: &[f64; FEATURE_COUNT]) -> Result<f64> {
        let features = self.arrange_features(named)?;
        Ok(self.forest.predict(&features))
    }
}

#[derive(Debug, Clone)]
enum ModelSlot {
    Untrained,
    Trained(FittedModel),
    Loaded(FittedModel),
}

#[derive(Debug, Clone)]
pub struct ImpactModel {
    config: TrainingConfig,
    slot: ModelSlot,
}

impl Default for ImpactModel {
    fn default() -> Self {
        Self::new(TrainingConfig::default())
    }
}

impl ImpactModel {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            slot: ModelSlot::Untrained,
        }
    }

    pub fn state(&self) -> ModelState {
        match self.slot {
            ModelSlot::Untrained => ModelState::Untrained,
            ModelSlot::Trained(_) => ModelState::Trained,
            ModelSlot::Loaded(_) => ModelState::Loaded,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.fitted().is_some()
    }

    pub fn fitted(&self) -> Option<&FittedModel> {
        match &self.slot {
            ModelSlot::Untrained => None,
            ModelSlot::Trained(model) | ModelSlot::Loaded(model) => Some(model),
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn train(&mut self, examples: &[TrainingExample]) -> Result<TrainingMetrics> {
        let usable: Vec<&TrainingExample> = examples
            .iter()
            .filter(|example| example.target_pct_change.is_finite())
            .collect();
        if usable.len() < examples.len() {
            warn!(
                "Ignoring {} example(s) with a non-finite target",
                examples.len() - usable.len()
            );
        }
        if usable.is_empty() {
            return Err(ImpactError::EmptyDataset);
        }
        if usable.len() < RELIABLE_SAMPLE_COUNT {
            warn!(
                "Training on only {} example(s); metrics will not be reliable",
                usable.len()
            );
        }

        let (train_idx, eval_idx) =
            split_indices(usable.len(), self.config.test_fraction, self.config.split_seed);
        let train_rows: Vec<Vec<f64>> = train_idx
            .iter()
            .map(|&idx| usable[idx].features().to_vec())
            .collect();
        let train_targets: Vec<f64> = train_idx
            .iter()
            .map(|&idx| usable[idx].target_pct_change)
            .collect();

        info!(
            "Training impact model: {} trees, max depth {}, {} training row(s), {} evaluation row(s)",
            self.config.forest.n_trees,
            self.config.forest.max_depth,
            train_idx.len(),
            eval_idx.len()
        );
        let forest = RandomForestRegressor::fit(self.config.forest, &train_rows, &train_targets)?;

        // A single example leaves nothing to hold out; score it in-sample.
        let scored_idx = if eval_idx.is_empty() {
            &train_idx
        } else {
            &eval_idx
        };
        let actual: Vec<f64> = scored_idx
            .iter()
            .map(|&idx| usable[idx].target_pct_change)
            .collect();
        let predicted: Vec<f64> = scored_idx
            .iter()
            .map(|&idx| forest.predict(&usable[idx].features()))
            .collect();
        let performance = PerformanceCalculator::calculate_regression(&actual, &predicted);

        let mut feature_importances: Vec<FeatureImportance> = FEATURE_NAMES
            .iter()
            .zip(forest.feature_importances())
            .map(|(name, importance)| FeatureImportance {
                feature: name.to_string(),
                importance: *importance,
            })
            .collect();
        feature_importances.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(Ordering::Equal)
        });

        let metrics = TrainingMetrics {
            mean_absolute_error: performance.mean_absolute_error,
            r_squared: performance.r_squared,
            train_rows: train_idx.len(),
            eval_rows: eval_idx.len(),
            feature_importances,
        };

        info!(
            "Impact model trained: MAE={:.2}% R²={:.3}",
            metrics.mean_absolute_error, metrics.r_squared
        );
        for entry in &metrics.feature_importances {
            info!("  {}: {:.3}", entry.feature, entry.importance);
        }

        self.slot = ModelSlot::Trained(FittedModel {
            forest,
            feature_names: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
            trained_at: Utc::now(),
            metrics: metrics.clone(),
        });
        Ok(metrics)
    }

    pub fn predict(
        &self,
        sentiment_label: &str,
        confidence: f64,
        score_positive: f64,
        score_negative: f64,
        score_neutral: f64,
    ) -> Result<ImpactPrediction> {
        let fitted = self.fitted().ok_or(ImpactError::ModelNotReady)?;
        let label = SentimentLabel::parse(sentiment_label)?;
        let named = feature_vector(
            label.encode(),
            confidence,
            score_positive,
            score_negative,
            score_neutral,
        );
        let change = fitted.predict_change(&named)?;
        debug!(
            "Predicted {:+.4}% for {} sentiment at {:.1}% confidence",
            change, label, confidence
        );
        Ok(ImpactPrediction::from_change(change))
    }

    pub fn predict_example(&self, example: &TrainingExample) -> Result<ImpactPrediction> {
        let fitted = self.fitted().ok_or(ImpactError::ModelNotReady)?;
        let change = fitted.predict_change(&example.features())?;
        Ok(ImpactPrediction::from_change(change))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let fitted = self.fitted().ok_or(ImpactError::ModelNotReady)?;
        let envelope = ModelEnvelope {
            version: MODEL_FORMAT_VERSION,
            model: fitted.clone(),
        };
        bincode::serialize(&envelope).map_err(|err| io::Error::new(io::ErrorKind::Other, err).into())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes_with_config(bytes, TrainingConfig::default())
    }

    pub fn from_bytes_with_config(bytes: &[u8], config: TrainingConfig) -> Result<Self> {
        let version: u32 = bincode::deserialize(bytes)
            .map_err(|err| ImpactError::corrupt(format!("unreadable header: {err}")))?;
        if version != MODEL_FORMAT_VERSION {
            return Err(ImpactError::corrupt(format!(
                "format version mismatch (found {}, expected {})",
                version, MODEL_FORMAT_VERSION
            )));
        }
        let envelope: ModelEnvelope = bincode::deserialize(bytes)
            .map_err(|err| ImpactError::corrupt(format!("decode failed: {err}")))?;
        envelope.model.validate()?;

        Ok(Self {
            config,
            slot: ModelSlot::Loaded(envelope.model),
        })
    }

    /// Writes to a sibling temp file first so readers never see a partial
    /// artifact.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;

        let parent = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "impact_model".to_string());
        let temp_path = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        let write_result = (|| -> io::Result<()> {
            let mut writer = BufWriter::new(File::create(&temp_path)?);
            writer.write_all(&bytes)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            Ok(())
        })();
        if let Err(err) = write_result.and_then(|_| fs::rename(&temp_path, path)) {
            let _ = fs::remove_file(&temp_path);
            return Err(err.into());
        }

        info!("Impact model saved to {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_from_file_with_config(path, TrainingConfig::default())
    }

    pub fn load_from_file_with_config(
        path: impl AsRef<Path>,
        config: TrainingConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let model = Self::from_bytes_with_config(&bytes, config)?;
        info!("Impact model loaded from {}", path.display());
        Ok(model)
    }

    /// A missing file is the normal untrained state, not an error.
    pub fn load_if_exists(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No impact model at {}", path.display());
            return Ok(None);
        }
        Self::load_from_file(path).map(Some)
    }
}

/// Deterministic shuffle split. The evaluation side gets
/// `ceil(n * test_fraction)` rows, capped so that training keeps at least one.
fn split_indices(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let fraction = if test_fraction.is_finite() {
        test_fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let eval_count = ((n as f64) * fraction).ceil() as usize;
    let eval_count = eval_count.min(n.saturating_sub(1));

    let train = indices.split_off(eval_count);
    (train, indices)
}

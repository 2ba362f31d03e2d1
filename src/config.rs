use crate::forest::ForestConfig;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::PathBuf;

pub const DEFAULT_MODEL_PATH: &str = "data/impact_model.bin";
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
pub const DEFAULT_MIN_TRAINING_EXAMPLES: usize = 5;

/// Split and forest parameters for one training run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingConfig {
    pub forest: ForestConfig,
    pub test_fraction: f64,
    pub split_seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        let forest = ForestConfig::default();
        Self {
            forest,
            test_fraction: DEFAULT_TEST_FRACTION,
            split_seed: forest.seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSettings {
    pub training: TrainingConfig,
    /// Below this many aligned examples the train command refuses to fit.
    pub min_training_examples: usize,
    pub model_path: PathBuf,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            training: TrainingConfig::default(),
            min_training_examples: DEFAULT_MIN_TRAINING_EXAMPLES,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
        }
    }
}

impl TrainingSettings {
    pub fn from_env() -> Result<Self> {
        let settings: HashMap<String, String> = std::env::vars()
            .filter(|(key, _)| key.starts_with("IMPACT_"))
            .collect();
        Self::from_settings_map(&settings)
    }

    /// Missing keys keep their defaults; present keys must be valid.
    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self> {
        let defaults = Self::default();
        let forest_defaults = defaults.training.forest;

        let n_trees = optional_setting_usize(settings, "IMPACT_N_TREES", 1)?
            .unwrap_or(forest_defaults.n_trees);
        let max_depth = optional_setting_usize(settings, "IMPACT_MAX_DEPTH", 1)?
            .unwrap_or(forest_defaults.max_depth);
        let min_samples_split = optional_setting_usize(settings, "IMPACT_MIN_SAMPLES_SPLIT", 2)?
            .unwrap_or(forest_defaults.min_samples_split);
        let min_samples_leaf = optional_setting_usize(settings, "IMPACT_MIN_SAMPLES_LEAF", 1)?
            .unwrap_or(forest_defaults.min_samples_leaf);
        let max_features = optional_setting_usize(settings, "IMPACT_MAX_FEATURES", 1)?
            .or(forest_defaults.max_features);
        let seed = optional_setting_u64(settings, "IMPACT_SEED")?.unwrap_or(forest_defaults.seed);
        let test_fraction =
            optional_setting_f64(settings, "IMPACT_TEST_FRACTION", Some(0.0), Some(0.9))?
                .unwrap_or(defaults.training.test_fraction);
        let min_training_examples =
            optional_setting_usize(settings, "IMPACT_MIN_TRAINING_EXAMPLES", 1)?
                .unwrap_or(defaults.min_training_examples);
        let model_path = optional_setting(settings, "IMPACT_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.model_path);

        Ok(Self {
            training: TrainingConfig {
                forest: ForestConfig {
                    n_trees,
                    max_depth,
                    min_samples_split,
                    min_samples_leaf,
                    max_features,
                    bootstrap: forest_defaults.bootstrap,
                    seed,
                },
                test_fraction,
                split_seed: seed,
            },
            min_training_examples,
            model_path,
        })
    }
}

fn optional_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn optional_setting_f64(
    settings: &HashMap<String, String>,
    key: &str,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<Option<f64>> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(None);
    };
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Setting {} must be a number (value: {})", key, raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Setting {} must be finite (value: {})", key, raw));
    }
    if let Some(min_value) = min {
        if value < min_value {
            return Err(anyhow!(
                "Setting {} must be >= {} (value: {})",
                key,
                min_value,
                raw
            ));
        }
    }
    if let Some(max_value) = max {
        if value > max_value {
            return Err(anyhow!(
                "Setting {} must be <= {} (value: {})",
                key,
                max_value,
                raw
            ));
        }
    }
    Ok(Some(value))
}

fn optional_setting_usize(
    settings: &HashMap<String, String>,
    key: &str,
    min: usize,
) -> Result<Option<usize>> {
    let Some(value) = optional_setting_f64(settings, key, None, None)? else {
        return Ok(None);
    };
    if value.fract() != 0.0 {
        return Err(anyhow!(
            "Setting {} must be an integer (value: {})",
            key,
            value
        ));
    }
    if value < min as f64 {
        return Err(anyhow!(
            "Setting {} must be >= {} (value: {})",
            key,
            min,
            value
        ));
    }
    Ok(Some(value as usize))
}

fn optional_setting_u64(settings: &HashMap<String, String>, key: &str) -> Result<Option<u64>> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(None);
    };
    raw.parse::<u64>()
        .map(Some)
        .map_err(|_| anyhow!("Setting {} must be a non-negative integer (value: {})", key, raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn empty_map_uses_defaults() {
        let parsed = TrainingSettings::from_settings_map(&HashMap::new()).unwrap();
        assert_eq!(parsed, TrainingSettings::default());
        assert_eq!(parsed.training.forest.n_trees, 100);
        assert_eq!(parsed.training.forest.max_depth, 10);
        assert_eq!(parsed.training.split_seed, 42);
        assert_eq!(parsed.min_training_examples, 5);
    }

    #[test]
    fn overrides_are_applied() {
        let parsed = TrainingSettings::from_settings_map(&settings(&[
            ("IMPACT_N_TREES", "25"),
            ("IMPACT_MAX_DEPTH", " 4 "),
            ("IMPACT_SEED", "7"),
            ("IMPACT_TEST_FRACTION", "0.25"),
            ("IMPACT_MODEL_PATH", "/tmp/model.bin"),
            ("IMPACT_MIN_TRAINING_EXAMPLES", ""),
        ]))
        .unwrap();
        assert_eq!(parsed.training.forest.n_trees, 25);
        assert_eq!(parsed.training.forest.max_depth, 4);
        assert_eq!(parsed.training.forest.seed, 7);
        assert_eq!(parsed.training.split_seed, 7);
        assert_eq!(parsed.training.test_fraction, 0.25);
        assert_eq!(parsed.model_path, PathBuf::from("/tmp/model.bin"));
        assert_eq!(parsed.min_training_examples, 5);
    }

    #[test]
    fn invalid_values_name_the_key() {
        let err = TrainingSettings::from_settings_map(&settings(&[("IMPACT_N_TREES", "2.5")]))
            .unwrap_err();
        assert!(err.to_string().contains("IMPACT_N_TREES"));

        let err = TrainingSettings::from_settings_map(&settings(&[("IMPACT_N_TREES", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains(">= 1"));

        let err =
            TrainingSettings::from_settings_map(&settings(&[("IMPACT_TEST_FRACTION", "0.95")]))
                .unwrap_err();
        assert!(err.to_string().contains("IMPACT_TEST_FRACTION"));

        assert!(TrainingSettings::from_settings_map(&settings(&[("IMPACT_SEED", "-1")])).is_err());
    }
}

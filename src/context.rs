use crate::config::{TrainingConfig, TrainingSettings};
use crate::data_context::PipelineData;
use crate::impact_model::ImpactModel;
use anyhow::{anyhow, Context, Result};
use log::info;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AppContext {
    settings: TrainingSettings,
}

impl AppContext {
    pub fn initialize() -> Result<Self> {
        let settings =
            TrainingSettings::from_env().context("Invalid IMPACT_* environment settings")?;
        Ok(Self::from_settings(settings))
    }

    pub fn from_settings(settings: TrainingSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TrainingSettings {
        &self.settings
    }

    pub fn training_config(&self) -> TrainingConfig {
        self.settings.training
    }

    /// CLI value when given, otherwise the configured default.
    pub fn model_path(&self, cli_value: Option<PathBuf>) -> PathBuf {
        cli_value.unwrap_or_else(|| self.settings.model_path.clone())
    }

    pub fn load_pipeline_data(&self, news_path: &Path, prices_path: &Path) -> Result<PipelineData> {
        PipelineData::load_from_files(news_path, prices_path)
    }

    pub fn load_model(&self, path: &Path) -> Result<Option<ImpactModel>> {
        let model = ImpactModel::load_if_exists(path)
            .with_context(|| format!("Failed to load impact model from {}", path.display()))?;
        if let Some(model) = &model {
            if let Some(fitted) = model.fitted() {
                info!(
                    "Using impact model trained at {} ({} trees)",
                    fitted.trained_at().format("%Y-%m-%d %H:%M:%S UTC"),
                    fitted.forest().num_trees()
                );
            }
        }
        Ok(model)
    }

    pub fn require_model(&self, path: &Path) -> Result<ImpactModel> {
        self.load_model(path)?.ok_or_else(|| {
            anyhow!(
                "No impact model found at {}. Run the train command first.",
                path.display()
            )
        })
    }
}

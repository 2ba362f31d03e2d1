pub mod commands;
pub mod config;
pub mod context;
pub mod data_context;
pub mod dataset;
pub mod error;
pub mod forest;
pub mod impact_model;
pub mod models;
pub mod performance;
pub mod price_store;
pub mod sentiment;

pub use error::{ImpactError, Result};
pub use impact_model::{ImpactModel, ModelState, TrainingMetrics};

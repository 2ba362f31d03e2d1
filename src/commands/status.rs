use anyhow::Result;
use std::path::Path;

use crate::context::AppContext;

/// Returns whether a usable model exists at `model_path`.
pub fn run(app: &AppContext, model_path: &Path) -> Result<bool> {
    let Some(model) = app.load_model(model_path)? else {
        println!("No impact model at {} (untrained)", model_path.display());
        return Ok(false);
    };
    let Some(fitted) = model.fitted() else {
        println!("Impact model at {} is not ready", model_path.display());
        return Ok(false);
    };

    let metrics = fitted.metrics();
    println!("Impact model: {}", model_path.display());
    println!(
        "  trained at: {}",
        fitted.trained_at().format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  trees: {} (max depth reached {})",
        fitted.forest().num_trees(),
        fitted.forest().max_depth()
    );
    println!("  features: {}", fitted.feature_names().join(", "));
    println!(
        "  evaluation: MAE={:.2}% R²={:.3} ({} train / {} eval rows)",
        metrics.mean_absolute_error, metrics.r_squared, metrics.train_rows, metrics.eval_rows
    );
    for entry in &metrics.feature_importances {
        println!("  importance {}: {:.3}", entry.feature, entry.importance);
    }
    Ok(true)
}

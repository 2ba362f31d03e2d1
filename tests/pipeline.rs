use anyhow::Result;
use chrono::{Duration, NaiveDate};
use news_impact::commands::{status, train};
use news_impact::config::TrainingSettings;
use news_impact::context::AppContext;
use news_impact::data_context::PipelineData;
use news_impact::dataset::{align_news, build_dataset, AlignmentOutcome, SkipReason};
use news_impact::forest::ForestConfig;
use news_impact::models::{Direction, SentimentLabel};
use news_impact::{ImpactError, ImpactModel, ModelState};
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;
use uuid::Uuid;

fn ensure_test_env() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn new() -> Self {
        let path = std::env::temp_dir().join(format!("news_impact_pipeline_{}", Uuid::new_v4()));
        fs::create_dir_all(&path).expect("create scratch dir");
        Self { path }
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path.join(name);
        fs::write(&path, contents).expect("write scratch file");
        path
    }

    fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Tickers alternate between rallies after positive news and sell-offs after
/// negative news; every fourth ticker is neutral and flat.
fn write_tables(dir: &ScratchDir, ticker_count: usize) -> (PathBuf, PathBuf) {
    let start = NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date");
    let mut news = String::from(
        "titulo,ticker,sentimento,confianca,score_positivo,score_negativo,score_neutro\n",
    );
    let mut prices = String::from("data,ticker,fechamento,variacao_pct\n");

    for idx in 0..ticker_count {
        let ticker = format!("TCK{idx:02}");
        let strength = 60.0 + (idx % 7) as f64 * 5.0;
        let rest = (100.0 - strength) / 2.0;
        let (label, pos, neg, neu, last_change) = match idx % 4 {
            0 | 2 => ("positivo", strength, rest, rest, 0.5 + strength / 40.0),
            1 => ("negativo", rest, strength, rest, -0.5 - strength / 40.0),
            _ => ("neutro", rest, rest, strength, 0.05),
        };
        writeln!(
            news,
            "Manchete {idx},{ticker},{label},{strength:.1},{pos:.1},{neg:.1},{neu:.1}"
        )
        .unwrap();

        let mut close = 20.0 + idx as f64;
        for day in 0..3 {
            let date = start + Duration::days(day);
            let change = if day == 0 {
                String::new()
            } else if day == 2 {
                format!("{last_change:.4}")
            } else {
                "0.1000".to_string()
            };
            if day > 0 {
                let pct: f64 = change.parse().unwrap();
                close *= 1.0 + pct / 100.0;
            }
            writeln!(prices, "{date},{ticker},{close:.4},{change}").unwrap();
        }
    }

    (
        dir.write("noticias.csv", &news),
        dir.write("precos.csv", &prices),
    )
}

fn fast_settings(model_path: &Path) -> TrainingSettings {
    let mut settings = TrainingSettings::default();
    settings.training.forest = ForestConfig {
        n_trees: 25,
        ..ForestConfig::default()
    };
    settings.model_path = model_path.to_path_buf();
    settings
}

#[test]
fn csv_tables_train_persist_and_predict() -> Result<()> {
    ensure_test_env();
    let dir = ScratchDir::new();
    let (news_path, prices_path) = write_tables(&dir, 24);
    let model_path = dir.join("models/impact_model.bin");

    let data = PipelineData::load_from_files(&news_path, &prices_path)?;
    let examples = build_dataset(data.news(), data.prices())?;
    assert_eq!(examples.len(), 24);
    assert!(examples
        .iter()
        .filter(|example| example.sentiment_label == SentimentLabel::Negative)
        .all(|example| example.target_pct_change < 0.0));

    let mut model = ImpactModel::new(fast_settings(&model_path).training);
    let metrics = model.train(&examples)?;
    assert_eq!(metrics.eval_rows, 5);
    assert_eq!(metrics.train_rows, 19);
    assert!(metrics.mean_absolute_error.is_finite());

    model.save_to_file(&model_path)?;
    assert!(model_path.exists());

    let restored = ImpactModel::load_if_exists(&model_path)?.expect("model was just saved");
    assert_eq!(restored.state(), ModelState::Loaded);
    for example in &examples {
        let live = model.predict_example(example)?;
        let loaded = restored.predict_example(example)?;
        assert_eq!(
            live.predicted_pct_change.to_bits(),
            loaded.predicted_pct_change.to_bits()
        );
    }

    let up = restored.predict("positive", 80.0, 80.0, 10.0, 10.0)?;
    let down = restored.predict("negativo", 80.0, 10.0, 80.0, 10.0)?;
    assert_eq!(up.direction, Direction::Up);
    assert_eq!(down.direction, Direction::Down);
    assert!((down.intensity - down.predicted_pct_change.abs()).abs() < 1e-12);
    Ok(())
}

#[test]
fn train_command_writes_model_and_enforces_minimum() -> Result<()> {
    ensure_test_env();
    let dir = ScratchDir::new();
    let (news_path, prices_path) = write_tables(&dir, 12);
    let model_path = dir.join("impact_model.bin");
    let app = AppContext::from_settings(fast_settings(&model_path));

    let metrics = train::run(
        &app,
        train::TrainOptions {
            news_path: news_path.clone(),
            prices_path: prices_path.clone(),
            ..train::TrainOptions::default()
        },
    )?;
    assert_eq!(metrics.train_rows + metrics.eval_rows, 12);
    assert!(model_path.exists());
    assert!(status::run(&app, &model_path)?);

    let err = train::run(
        &app,
        train::TrainOptions {
            news_path,
            prices_path,
            output: Some(dir.join("never.bin")),
            min_examples: Some(50),
            ..train::TrainOptions::default()
        },
    )
    .unwrap_err();
    assert!(err.to_string().contains("at least 50"), "{err}");
    assert!(!dir.join("never.bin").exists());
    Ok(())
}

#[test]
fn unknown_tickers_are_skipped_and_unknown_labels_abort() -> Result<()> {
    ensure_test_env();
    let dir = ScratchDir::new();
    let (_, prices_path) = write_tables(&dir, 4);
    let news_path = dir.write(
        "news.csv",
        "ticker,sentiment,confidence,score_positive,score_negative,score_neutral\n\
         TCK00,positive,80,80,10,10\n\
         ZZZZ3,negative,70,10,70,20\n",
    );

    let data = PipelineData::load_from_files(&news_path, &prices_path)?;
    let outcomes = align_news(data.news(), data.prices())?;
    assert!(outcomes[0].is_kept());
    assert_eq!(
        outcomes[1],
        AlignmentOutcome::Skipped {
            index: 1,
            ticker: "ZZZZ3".to_string(),
            reason: SkipReason::NoPriceHistory,
        }
    );

    let bad_news = dir.write(
        "bad.csv",
        "ticker,sentiment,confidence,score_positive,score_negative,score_neutral\n\
         TCK00,bullish,80,80,10,10\n",
    );
    let data = PipelineData::load_from_files(&bad_news, &prices_path)?;
    match build_dataset(data.news(), data.prices()) {
        Err(ImpactError::UnknownSentimentLabel { label }) => assert_eq!(label, "bullish"),
        other => panic!("expected unknown label error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn missing_model_file_means_untrained() -> Result<()> {
    ensure_test_env();
    let dir = ScratchDir::new();
    let model_path = dir.join("absent.bin");
    assert!(ImpactModel::load_if_exists(&model_path)?.is_none());

    let app = AppContext::from_settings(fast_settings(&model_path));
    assert!(!status::run(&app, &model_path)?);

    let model = ImpactModel::default();
    assert!(matches!(
        model.predict("neutral", 50.0, 25.0, 25.0, 50.0),
        Err(ImpactError::ModelNotReady)
    ));
    assert!(matches!(
        model.save_to_file(&model_path),
        Err(ImpactError::ModelNotReady)
    ));
    assert!(!model_path.exists());
    Ok(())
}

#[test]
fn corrupt_model_file_is_reported() -> Result<()> {
    ensure_test_env();
    let dir = ScratchDir::new();
    let model_path = dir.write("impact_model.bin", "definitely not a model");
    match ImpactModel::load_if_exists(&model_path) {
        Err(ImpactError::CorruptOrIncompatibleModel { .. }) => {}
        other => panic!("expected corrupt model error, got {other:?}"),
    }

    let app = AppContext::from_settings(fast_settings(&model_path));
    assert!(app.load_model(&model_path).is_err());
    Ok(())
}

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::info;
use news_impact::{
    commands::{predict, prices, status, train},
    context::AppContext,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "news-impact")]
#[command(about = "Relates news sentiment to subsequent stock price changes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Align scored news with price history, fit the impact model and save it
    Train {
        /// News table (CSV) with sentiment label, confidence and class scores
        #[arg(long, value_name = "PATH")]
        news: PathBuf,
        /// Price table (CSV) with date, ticker, close and daily change
        #[arg(long, value_name = "PATH")]
        prices: PathBuf,
        /// Destination for the trained model (defaults to IMPACT_MODEL_PATH or data/impact_model.bin)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Number of trees in the forest
        #[arg(long)]
        trees: Option<usize>,
        /// Maximum tree depth
        #[arg(long)]
        max_depth: Option<usize>,
        /// Seed for the split and the forest
        #[arg(long)]
        seed: Option<u64>,
        /// Refuse to train with fewer aligned examples than this
        #[arg(long)]
        min_examples: Option<usize>,
    },
    /// Predict the price change for one scored news item
    Predict {
        /// Sentiment label (positive, negative, neutral)
        #[arg(long)]
        label: String,
        /// Classifier confidence in percent
        #[arg(long)]
        confidence: f64,
        /// Class scores as positive,negative,neutral
        #[arg(long, value_name = "POS,NEG,NEU", allow_hyphen_values = true)]
        scores: String,
        /// Model file to use
        #[arg(long, value_name = "PATH")]
        model: Option<PathBuf>,
    },
    /// Report whether a trained model is available
    Status {
        /// Model file to inspect
        #[arg(long, value_name = "PATH")]
        model: Option<PathBuf>,
    },
    /// Summarize a price table, or report one ticker's change over a period
    Prices {
        /// Price table (CSV)
        #[arg(long, value_name = "PATH")]
        prices: PathBuf,
        /// Ticker for a period change report
        #[arg(long, requires_all = ["start", "end"])]
        ticker: Option<String>,
        /// Period start (YYYY-MM-DD)
        #[arg(long, requires = "ticker")]
        start: Option<NaiveDate>,
        /// Period end (YYYY-MM-DD)
        #[arg(long, requires = "ticker")]
        end: Option<NaiveDate>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting news-impact. Not financial advice.");
    run(cli)
}

/// Only the model commands read `IMPACT_*` settings.
fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Train {
            news,
            prices,
            output,
            trees,
            max_depth,
            seed,
            min_examples,
        } => {
            let app_context = AppContext::initialize()?;
            train::run(
                &app_context,
                train::TrainOptions {
                    news_path: news,
                    prices_path: prices,
                    output,
                    n_trees: trees,
                    max_depth,
                    seed,
                    min_examples,
                },
            )?;
        }
        Commands::Predict {
            label,
            confidence,
            scores,
            model,
        } => {
            let scores = predict::parse_scores(&scores)?;
            let app_context = AppContext::initialize()?;
            let model_path = app_context.model_path(model);
            predict::run(&app_context, &model_path, &label, confidence, scores)?;
        }
        Commands::Status { model } => {
            let app_context = AppContext::initialize()?;
            let model_path = app_context.model_path(model);
            status::run(&app_context, &model_path)?;
        }
        Commands::Prices {
            prices: prices_path,
            ticker,
            start,
            end,
        } => {
            let period = match (ticker.as_deref(), start, end) {
                (Some(ticker), Some(start), Some(end)) => {
                    if start > end {
                        return Err(anyhow!("--start {} is after --end {}", start, end));
                    }
                    Some(prices::PeriodFilter { ticker, start, end })
                }
                _ => None,
            };
            prices::run(&prices_path, period)?;
        }
    }

    Ok(())
}

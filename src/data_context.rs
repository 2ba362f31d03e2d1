use crate::models::{NewsItem, PricePoint};
use crate::price_store::{PriceSeriesStore, PriceTable};
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use csv::StringRecord;
use log::info;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const NEWS_TICKER: &[&str] = &["ticker"];
const NEWS_LABEL: &[&str] = &["sentimento", "sentiment", "sentiment_label"];
const NEWS_CONFIDENCE: &[&str] = &["confianca", "confiança", "confidence"];
const NEWS_POSITIVE: &[&str] = &["score_positivo", "score_positive"];
const NEWS_NEGATIVE: &[&str] = &["score_negativo", "score_negative"];
const NEWS_NEUTRAL: &[&str] = &["score_neutro", "score_neutral"];
const NEWS_HEADLINE: &[&str] = &["titulo", "título", "headline", "title"];

const PRICE_DATE: &[&str] = &["data", "date"];
const PRICE_TICKER: &[&str] = &["ticker"];
const PRICE_CLOSE: &[&str] = &["fechamento", "close"];
const PRICE_CHANGE: &[&str] = &["variacao_pct", "daily_pct_change"];

/// News and price tables for one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineData {
    news: Vec<NewsItem>,
    prices: PriceTable,
}

impl PipelineData {
    pub fn new(news: Vec<NewsItem>, prices: PriceTable) -> Self {
        Self { news, prices }
    }

    pub fn load_from_files<N, P>(news_path: N, prices_path: P) -> Result<Self>
    where
        N: AsRef<Path>,
        P: AsRef<Path>,
    {
        let news = load_news_csv(news_path)?;
        let prices = load_prices_csv(prices_path)?;
        let data = Self::new(news, prices);
        info!(
            "Loaded {} news item(s) and {} price series with {} point(s) ({} news ticker(s))",
            data.news.len(),
            data.price_series_count(),
            data.prices.len(),
            data.news_tickers().len()
        );
        Ok(data)
    }

    pub fn has_data(&self) -> bool {
        !self.news.is_empty() && !self.prices.is_empty()
    }

    pub fn news(&self) -> &[NewsItem] {
        &self.news
    }

    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }

    /// One series per ticker, regardless of how many points each holds.
    pub fn price_series_count(&self) -> usize {
        self.prices.tickers().len()
    }

    pub fn news_tickers(&self) -> BTreeSet<&str> {
        self.news.iter().map(|item| item.ticker.as_str()).collect()
    }

    /// News tickers that have no price series at all.
    pub fn tickers_without_prices(&self) -> Vec<&str> {
        self.news_tickers()
            .into_iter()
            .filter(|ticker| self.prices.series(ticker).is_empty())
            .collect()
    }
}

pub fn load_news_csv<P: AsRef<Path>>(path: P) -> Result<Vec<NewsItem>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open news table at {}", path.display()))?;
    read_news(file, &path.display().to_string())
}

pub fn load_prices_csv<P: AsRef<Path>>(path: P) -> Result<PriceTable> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open price table at {}", path.display()))?;
    read_prices(file, &path.display().to_string())
}

fn read_news<R: Read>(reader: R, source: &str) -> Result<Vec<NewsItem>> {
    let mut reader = csv_reader(reader);
    let columns = ColumnMap::from_headers(&mut reader, source)?;
    let ticker = columns.require(NEWS_TICKER)?;
    let label = columns.require(NEWS_LABEL)?;
    let confidence = columns.require(NEWS_CONFIDENCE)?;
    let positive = columns.require(NEWS_POSITIVE)?;
    let negative = columns.require(NEWS_NEGATIVE)?;
    let neutral = columns.require(NEWS_NEUTRAL)?;
    let headline = columns.optional(NEWS_HEADLINE);

    let mut items = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let line = idx + 2;
        let record = record.with_context(|| format!("{source}: unreadable row at line {line}"))?;
        let row = Row {
            record: &record,
            source,
            line,
        };
        items.push(NewsItem {
            ticker: row.text(ticker)?.to_string(),
            sentiment_label: row.text(label)?.to_string(),
            confidence: row.number(confidence)?,
            score_positive: row.number(positive)?,
            score_negative: row.number(negative)?,
            score_neutral: row.number(neutral)?,
            headline: headline.and_then(|column| row.optional_text(column).map(str::to_string)),
        });
    }
    Ok(items)
}

fn read_prices<R: Read>(reader: R, source: &str) -> Result<PriceTable> {
    let mut reader = csv_reader(reader);
    let columns = ColumnMap::from_headers(&mut reader, source)?;
    let date = columns.require(PRICE_DATE)?;
    let ticker = columns.require(PRICE_TICKER)?;
    let close = columns.require(PRICE_CLOSE)?;
    let change = columns.require(PRICE_CHANGE)?;

    let mut points = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let line = idx + 2;
        let record = record.with_context(|| format!("{source}: unreadable row at line {line}"))?;
        let row = Row {
            record: &record,
            source,
            line,
        };
        points.push(PricePoint {
            ticker: row.text(ticker)?.to_string(),
            date: row.date(date)?,
            close: row.number(close)?,
            // The first day of a series has no previous close.
            daily_pct_change: match row.optional_text(change) {
                Some(_) => row.number(change)?,
                None => f64::NAN,
            },
        });
    }
    Ok(PriceTable::from_points(points))
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

#[derive(Debug, Clone, Copy)]
struct Column {
    index: usize,
    name: &'static str,
}

struct ColumnMap {
    source: String,
    by_name: HashMap<String, usize>,
}

impl ColumnMap {
    fn from_headers<R: Read>(reader: &mut csv::Reader<R>, source: &str) -> Result<Self> {
        let headers = reader
            .headers()
            .with_context(|| format!("{source}: failed to read CSV headers"))?;
        let by_name = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| (normalize_header(name), idx))
            .collect();
        Ok(Self {
            source: source.to_string(),
            by_name,
        })
    }

    fn optional(&self, aliases: &'static [&'static str]) -> Option<Column> {
        aliases.iter().find_map(|&alias| {
            self.by_name.get(alias).map(|&index| Column {
                index,
                name: alias,
            })
        })
    }

    fn require(&self, aliases: &'static [&'static str]) -> Result<Column> {
        self.optional(aliases).ok_or_else(|| {
            anyhow!(
                "{}: missing required column (expected one of: {})",
                self.source,
                aliases.join(", ")
            )
        })
    }
}

fn normalize_header(name: &str) -> String {
    name.trim_start_matches('\u{feff}').trim().to_lowercase()
}

struct Row<'a> {
    record: &'a StringRecord,
    source: &'a str,
    line: usize,
}

impl<'a> Row<'a> {
    fn optional_text(&self, column: Column) -> Option<&'a str> {
        self.record
            .get(column.index)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn text(&self, column: Column) -> Result<&'a str> {
        self.optional_text(column).ok_or_else(|| {
            anyhow!(
                "{}: line {}: column '{}' is empty",
                self.source,
                self.line,
                column.name
            )
        })
    }

    fn number(&self, column: Column) -> Result<f64> {
        let raw = self.text(column)?;
        raw.parse::<f64>().map_err(|_| {
            anyhow!(
                "{}: line {}: column '{}' must be a number (value: {})",
                self.source,
                self.line,
                column.name,
                raw
            )
        })
    }

    /// Accepts `YYYY-MM-DD` optionally followed by a time component.
    fn date(&self, column: Column) -> Result<NaiveDate> {
        let raw = self.text(column)?;
        raw.get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
            .ok_or_else(|| {
                anyhow!(
                    "{}: line {}: column '{}' must be a YYYY-MM-DD date (value: {})",
                    self.source,
                    self.line,
                    column.name,
                    raw
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use uuid::Uuid;

    fn scratch_file(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("news_impact_{}.csv", Uuid::new_v4()));
        fs::write(&path, contents).unwrap();
        path
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn reads_portuguese_news_columns() {
        let csv = "titulo,ticker,sentimento,confianca,score_positivo,score_negativo,score_neutro\n\
                   Lucro recorde,PETR4,positivo,91.2,91.2,3.1,5.7\n\
                   ,VALE3, Negativo ,70,10,70,20\n";
        let items = read_news(csv.as_bytes(), "news.csv").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].ticker, "PETR4");
        assert_eq!(items[0].sentiment_label, "positivo");
        assert_eq!(items[0].headline.as_deref(), Some("Lucro recorde"));
        assert_eq!(items[0].confidence, 91.2);
        assert_eq!(items[1].sentiment_label, "Negativo");
        assert_eq!(items[1].headline, None);
        assert_eq!(items[1].score_negative, 70.0);
    }

    #[test]
    fn reads_english_news_columns_without_headline() {
        let csv = "ticker,sentiment,confidence,score_positive,score_negative,score_neutral\n\
                   ITUB4,neutral,55.5,20,24.5,55.5\n";
        let items = read_news(csv.as_bytes(), "news.csv").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].score_neutral, 55.5);
        assert_eq!(items[0].headline, None);
    }

    #[test]
    fn missing_column_is_reported() {
        let csv = "ticker,sentiment,confidence,score_positive,score_negative\nA,positive,1,1,0\n";
        let err = read_news(csv.as_bytes(), "news.csv").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("news.csv"), "{message}");
        assert!(message.contains("score_neutral"), "{message}");
    }

    #[test]
    fn bad_number_names_line_and_column() {
        let csv = "ticker,sentiment,confidence,score_positive,score_negative,score_neutral\n\
                   A,positive,high,1,0,0\n";
        let err = read_news(csv.as_bytes(), "news.csv").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("line 2"), "{message}");
        assert!(message.contains("confidence"), "{message}");
    }

    #[test]
    fn reads_prices_with_timestamps_and_empty_change() {
        let csv = "data,ticker,fechamento,variacao_pct\n\
                   2024-03-02 00:00:00-03:00,PETR4,51.0,2.0\n\
                   2024-03-01 00:00:00-03:00,PETR4,50.0,\n\
                   2024-03-01,VALE3,60.0,0.5\n";
        let table = read_prices(csv.as_bytes(), "prices.csv").unwrap();
        let series = table.series("PETR4");
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].date, date(2024, 3, 1));
        assert!(series[0].daily_pct_change.is_nan());
        assert_eq!(series[1].close, 51.0);
        assert_eq!(table.series("VALE3").len(), 1);
    }

    #[test]
    fn bad_date_is_rejected() {
        let csv = "date,ticker,close,daily_pct_change\n03/01/2024,PETR4,50.0,1.0\n";
        let err = read_prices(csv.as_bytes(), "prices.csv").unwrap_err();
        assert!(err.to_string().contains("YYYY-MM-DD"), "{err}");
    }

    #[test]
    fn loads_both_tables_from_files() {
        let news_path = scratch_file(
            "ticker,sentiment,confidence,score_positive,score_negative,score_neutral\n\
             PETR4,positive,80,80,10,10\n\
             MGLU3,negative,75,5,75,20\n",
        );
        let prices_path =
            scratch_file("date,ticker,close,daily_pct_change\n2024-03-01,PETR4,50.0,1.0\n");

        let data = PipelineData::load_from_files(&news_path, &prices_path).unwrap();
        assert!(data.has_data());
        assert_eq!(data.news().len(), 2);
        assert_eq!(data.tickers_without_prices(), vec!["MGLU3"]);

        let prices_path_multi = scratch_file(
            "date,ticker,close,daily_pct_change\n\
             2024-03-01,PETR4,50.0,\n\
             2024-03-04,PETR4,51.0,2.0\n\
             2024-03-05,PETR4,51.5,0.98\n\
             2024-03-01,VALE3,60.0,\n",
        );
        let data = PipelineData::load_from_files(&news_path, &prices_path_multi).unwrap();
        assert_eq!(data.price_series_count(), 2);
        assert_eq!(data.prices().len(), 4);
        let _ = fs::remove_file(prices_path_multi);

        let _ = fs::remove_file(news_path);
        let _ = fs::remove_file(prices_path);
    }

    #[test]
    fn missing_file_names_path() {
        let path = std::env::temp_dir().join(format!("absent_{}.csv", Uuid::new_v4()));
        let err = load_prices_csv(&path).unwrap_err();
        assert!(err.to_string().contains("price table"), "{err}");
    }
}

// CSV storage for candles, sentiment and trade logs
use std::fs::File;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{Candle, SentimentSample, TradeRecord};
use crate::sentiment::SentimentSeries;

const CANDLE_HEADER: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

/// Parse a timestamp cell
///
/// Accepts epoch milliseconds, RFC 3339, `YYYY-MM-DD HH:MM:SS` and
/// `YYYY-MM-DD`. Naive forms are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw
            .parse::<i64>()
            .ok()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn field<'a>(record: &'a csv::StringRecord, idx: usize, row: usize, name: &str) -> Result<&'a str> {
    record
        .get(idx)
        .ok_or_else(|| Error::InvalidCandles(format!("row {}: missing {} column", row, name)))
}

fn number(record: &csv::StringRecord, idx: usize, row: usize, name: &str) -> Result<f64> {
    let raw = field(record, idx, row, name)?;
    raw.trim()
        .parse::<f64>()
        .map_err(|_| Error::InvalidCandles(format!("row {}: bad {} value {:?}", row, name, raw)))
}

/// Load candles from a CSV with a header row, columns read by position
pub fn load_candles_csv(path: &Path) -> Result<Vec<Candle>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut candles = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 2; // 1-based, after the header
        let raw_ts = field(&record, 0, row, "timestamp")?;
        let timestamp = parse_timestamp(raw_ts).ok_or_else(|| {
            Error::InvalidCandles(format!("row {}: unrecognised timestamp {:?}", row, raw_ts))
        })?;

        candles.push(Candle {
            timestamp,
            open: number(&record, 1, row, "open")?,
            high: number(&record, 2, row, "high")?,
            low: number(&record, 3, row, "low")?,
            close: number(&record, 4, row, "close")?,
            volume: number(&record, 5, row, "volume")?,
        });
    }

    tracing::info!("Loaded {} candles from {}", candles.len(), path.display());
    Ok(candles)
}

/// Write candles with epoch-millisecond timestamps
pub fn write_candles_csv(path: &Path, candles: &[Candle]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CANDLE_HEADER)?;
    for c in candles {
        writer.write_record(&[
            c.timestamp.timestamp_millis().to_string(),
            c.open.to_string(),
            c.high.to_string(),
            c.low.to_string(),
            c.close.to_string(),
            c.volume.to_string(),
        ])?;
    }
    writer.flush()?;

    tracing::info!("Wrote {} candles to {}", candles.len(), path.display());
    Ok(())
}

/// Load a timestamp,sentiment_score CSV; a missing file means neutral sentiment
pub fn load_sentiment_csv(path: &Path) -> Result<SentimentSeries> {
    if !path.exists() {
        tracing::warn!(
            "Sentiment file {} not found, using neutral sentiment",
            path.display()
        );
        return Ok(SentimentSeries::neutral());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut samples = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 2;
        let (Some(raw_ts), Some(raw_score)) = (record.get(0), record.get(1)) else {
            return Err(Error::InvalidSentiment(format!("row {}: expected 2 columns", row)));
        };

        let timestamp = parse_timestamp(raw_ts).ok_or_else(|| {
            Error::InvalidSentiment(format!("row {}: unrecognised timestamp {:?}", row, raw_ts))
        })?;
        let score = raw_score.parse::<f64>().map_err(|_| {
            Error::InvalidSentiment(format!("row {}: bad score {:?}", row, raw_score))
        })?;
        samples.push(SentimentSample { timestamp, score });
    }

    tracing::info!("Loaded {} sentiment samples from {}", samples.len(), path.display());
    SentimentSeries::new(samples)
}

pub fn write_trades_csv(path: &Path, trades: &[TradeRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for trade in trades {
        writer.serialize(trade)?;
    }
    writer.flush()?;

    tracing::info!("Wrote {} trades to {}", trades.len(), path.display());
    Ok(())
}

pub fn read_trades_csv(path: &Path) -> Result<Vec<TradeRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let trades = reader
        .deserialize()
        .collect::<std::result::Result<Vec<TradeRecord>, _>>()?;
    Ok(trades)
}

/// Pretty-printed JSON dump
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}

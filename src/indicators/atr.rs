/// Average True Range (ATR) indicator
///
/// Measures market volatility by averaging true ranges over a period.
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
///
/// The average is a simple rolling mean of the last `period` true ranges.

use crate::models::Candle;

/// True range of `candle` given the previous close (if any)
pub fn true_range(candle: &Candle, prev_close: Option<f64>) -> f64 {
    let range = candle.high - candle.low;
    match prev_close {
        Some(prev) => range
            .max((candle.high - prev).abs())
            .max((candle.low - prev).abs()),
        None => range,
    }
}

/// Calculate ATR aligned with `candles`
///
/// The first candle has no previous close, so its true range is high - low.
/// The first ATR value sits at index `period - 1`.
pub fn calculate_atr_series(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let mut series = vec![None; candles.len()];
    if period == 0 || candles.len() < period {
        return series;
    }

    let true_ranges: Vec<f64> = candles
        .iter()
        .enumerate()
        .map(|(i, c)| true_range(c, i.checked_sub(1).map(|p| candles[p].close)))
        .collect();

    for (offset, window) in true_ranges.windows(period).enumerate() {
        series[offset + period - 1] = Some(window.iter().sum::<f64>() / period as f64);
    }

    series
}

/// Calculate Simple Moving Average (SMA), aligned with `values`
pub fn calculate_sma_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut series = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return series;
    }

    for (offset, window) in values.windows(period).enumerate() {
        series[offset + period - 1] = Some(window.iter().sum::<f64>() / period as f64);
    }
    series
}

/// Calculate Exponential Moving Average (EMA), aligned with `values`
///
/// Seeded with the SMA of the first `period` values, so the first EMA sits at
/// index `period - 1`.
pub fn calculate_ema_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut series = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return series;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);

    // Start with SMA
    let mut ema = values[..period].iter().sum::<f64>() / period as f64;
    series[period - 1] = Some(ema);

    for (i, value) in values.iter().enumerate().skip(period) {
        ema = (value - ema) * multiplier + ema;
        series[i] = Some(ema);
    }

    series
}

pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;

/// MACD line (EMA12 - EMA26) and its EMA9 signal line, aligned with `closes`
///
/// The MACD line is defined from index 25, the signal line from index 33.
pub fn calculate_macd_series(closes: &[f64]) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let fast = calculate_ema_series(closes, MACD_FAST);
    let slow = calculate_ema_series(closes, MACD_SLOW);

    let macd: Vec<Option<f64>> = fast
        .iter()
        .zip(&slow)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    let mut signal = vec![None; closes.len()];
    if let Some(first) = macd.iter().position(|v| v.is_some()) {
        let defined: Vec<f64> = macd[first..].iter().flatten().copied().collect();
        for (i, value) in calculate_ema_series(&defined, MACD_SIGNAL).into_iter().enumerate() {
            signal[first + i] = value;
        }
    }

    (macd, signal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        let sma = calculate_sma_series(&prices, 5);
        assert_eq!(sma[4], Some(104.0));
        assert!(sma[3].is_none());
    }

    #[test]
    fn test_sma_insufficient_data() {
        let prices = vec![100.0, 102.0];
        let sma = calculate_sma_series(&prices, 5);
        assert!(sma.iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_ema() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0, 110.0];
        let ema = calculate_ema_series(&prices, 5);
        assert_eq!(ema[4], Some(104.0)); // seeded with SMA
        assert!(ema[5].unwrap() > 104.0); // EMA should be above initial SMA
    }

    #[test]
    fn test_macd_warmup_offsets() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let (macd, signal) = calculate_macd_series(&closes);

        assert!(macd[24].is_none());
        assert!(macd[25].is_some());
        assert!(signal[32].is_none());
        assert!(signal[33].is_some());
    }

    #[test]
    fn test_macd_positive_in_uptrend() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let (macd, signal) = calculate_macd_series(&closes);

        // Fast EMA leads in a steady rise
        assert!(macd[59].unwrap() > 0.0);
        assert!(signal[59].unwrap() > 0.0);
    }
}

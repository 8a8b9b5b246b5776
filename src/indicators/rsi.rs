/// Relative Strength Index (RSI)
///
/// RSI measures the magnitude of recent price changes to evaluate
/// overbought or oversold conditions.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
///
/// Uses Wilder's smoothing: the first average gain/loss is the simple mean of
/// the first `period` changes, then `avg = (avg * (period - 1) + x) / period`.
///
/// Returns a series aligned with `prices`. The first defined value sits at
/// index `period` (one change needs two prices). An average loss of zero
/// yields 100 by convention.
pub fn calculate_rsi_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut series = vec![None; prices.len()];
    if period == 0 || prices.len() < period + 1 {
        return series;
    }

    let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain = changes[..period].iter().map(|c| c.max(0.0)).sum::<f64>() / period as f64;
    let mut avg_loss = changes[..period].iter().map(|c| (-c).max(0.0)).sum::<f64>() / period as f64;
    series[period] = Some(rsi_from_averages(avg_gain, avg_loss));

    let n = period as f64;
    for (i, change) in changes.iter().enumerate().skip(period) {
        avg_gain = (avg_gain * (n - 1.0) + change.max(0.0)) / n;
        avg_loss = (avg_loss * (n - 1.0) + (-change).max(0.0)) / n;
        // changes[i] is the move into prices[i + 1]
        series[i + 1] = Some(rsi_from_averages(avg_gain, avg_loss));
    }

    series
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsi_calculation() {
        let prices = vec![
            44.0, 44.25, 44.5, 43.75, 44.0, 44.5, 45.0, 45.5, 45.25, 45.5, 46.0, 46.5, 46.25,
            46.0, 46.5,
        ];

        let series = calculate_rsi_series(&prices, 14);
        assert_eq!(series.len(), prices.len());
        assert!(series[..14].iter().all(|v| v.is_none()));

        let rsi_value = series[14].unwrap();
        assert!(rsi_value > 0.0 && rsi_value < 100.0);
    }

    #[test]
    fn test_rsi_insufficient_data() {
        let prices = vec![100.0, 102.0, 101.0];
        let series = calculate_rsi_series(&prices, 14);
        assert!(series.iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_rsi_all_gains() {
        let prices = vec![100.0, 101.0, 102.0, 103.0, 104.0, 105.0];
        let series = calculate_rsi_series(&prices, 5);
        assert_eq!(series[5], Some(100.0)); // All gains = RSI 100
    }

    #[test]
    fn test_rsi_flat_prices_is_hundred() {
        // No losses at all, zero average loss convention applies
        let prices = vec![100.0; 10];
        let series = calculate_rsi_series(&prices, 3);
        assert_eq!(series[9], Some(100.0));
    }

    #[test]
    fn test_rsi_wilder_smoothing() {
        // period 2: changes +2, -2, +2
        let prices = vec![100.0, 102.0, 100.0, 102.0];
        let series = calculate_rsi_series(&prices, 2);

        // seed: gain 1, loss 1 => 50
        assert!((series[2].unwrap() - 50.0).abs() < 1e-9);

        // next: gain (1 + 2) / 2 = 1.5, loss (1 + 0) / 2 = 0.5 => rs 3 => 75
        assert!((series[3].unwrap() - 75.0).abs() < 1e-9);
    }
}

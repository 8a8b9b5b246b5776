use crate::models::BollingerBands;

/// Bollinger bands: SMA(window) +/- deviations * population std dev
pub fn calculate_bollinger_series(
    closes: &[f64],
    window: usize,
    deviations: f64,
) -> Vec<Option<BollingerBands>> {
    let mut series = vec![None; closes.len()];
    if window == 0 || closes.len() < window {
        return series;
    }

    for (offset, slice) in closes.windows(window).enumerate() {
        let mean = slice.iter().sum::<f64>() / window as f64;
        let variance = slice.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / window as f64;
        let width = deviations * variance.sqrt();

        series[offset + window - 1] = Some(BollingerBands {
            upper: mean + width,
            middle: mean,
            lower: mean - width,
        });
    }

    series
}

use crate::config::BacktestConfig;
use crate::error::{Error, Result};
use crate::indicators::moving_average::{MACD_SIGNAL, MACD_SLOW};
use crate::indicators::{
    calculate_atr_series, calculate_bollinger_series, calculate_macd_series,
    calculate_rsi_series,
};
use crate::models::{Candle, IndicatorCandle};

/// Periods used to annotate a candle series
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub atr_period: usize,
    pub breakout_lookback: usize,
    /// (window, deviations); `None` disables the bands
    pub bollinger: Option<(usize, f64)>,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            atr_period: 14,
            breakout_lookback: 20,
            bollinger: None,
        }
    }
}

impl From<&BacktestConfig> for IndicatorConfig {
    fn from(config: &BacktestConfig) -> Self {
        Self {
            rsi_period: config.rsi_period,
            atr_period: config.atr_period,
            breakout_lookback: config.breakout_lookback,
            bollinger: config
                .use_bollinger_bands
                .then_some((config.bb_window, config.bb_window_dev)),
        }
    }
}

impl IndicatorConfig {
    /// Index of the first candle at which every enabled indicator is defined
    pub fn warmup(&self) -> usize {
        let macd_signal_start = (MACD_SLOW - 1) + (MACD_SIGNAL - 1);
        let mut warmup = self
            .rsi_period
            .max(self.atr_period.saturating_sub(1))
            .max(self.breakout_lookback.saturating_sub(1))
            .max(macd_signal_start);

        if let Some((window, _)) = self.bollinger {
            warmup = warmup.max(window.saturating_sub(1));
        }
        warmup
    }
}

/// Candles annotated with indicators, plus where the warm-up window ends
#[derive(Debug, Clone)]
pub struct AnnotatedSeries {
    pub candles: Vec<IndicatorCandle>,
    pub warmup: usize,
}

impl AnnotatedSeries {
    /// Candles eligible for simulation (warm-up excluded)
    pub fn tradable(&self) -> &[IndicatorCandle] {
        &self.candles[self.warmup..]
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorPipeline {
    config: IndicatorConfig,
}

impl IndicatorPipeline {
    pub fn new(config: IndicatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    /// Annotate `candles` with every configured indicator
    ///
    /// Fails with `InsufficientData` when no candle survives the warm-up window.
    pub fn annotate(&self, candles: &[Candle]) -> Result<AnnotatedSeries> {
        let warmup = self.config.warmup();
        if candles.len() <= warmup {
            return Err(Error::InsufficientData {
                needed: warmup + 1,
                got: candles.len(),
            });
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let rsi = calculate_rsi_series(&closes, self.config.rsi_period);
        let atr = calculate_atr_series(candles, self.config.atr_period);
        let (macd, macd_signal) = calculate_macd_series(&closes);
        let bollinger = match self.config.bollinger {
            Some((window, deviations)) => calculate_bollinger_series(&closes, window, deviations),
            None => vec![None; candles.len()],
        };

        let lookback = self.config.breakout_lookback;
        let annotated = candles
            .iter()
            .enumerate()
            .map(|(i, candle)| {
                let window = (i + 1 >= lookback).then(|| &candles[i + 1 - lookback..=i]);
                IndicatorCandle {
                    candle: *candle,
                    rsi: rsi[i],
                    atr: atr[i],
                    macd: macd[i],
                    macd_signal: macd_signal[i],
                    bollinger: bollinger[i],
                    rolling_high: window
                        .map(|w| w.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max)),
                    rolling_low: window
                        .map(|w| w.iter().map(|c| c.low).fold(f64::INFINITY, f64::min)),
                }
            })
            .collect();

        tracing::debug!(
            "Annotated {} candles (warm-up {}, {} tradable)",
            candles.len(),
            warmup,
            candles.len() - warmup
        );

        Ok(AnnotatedSeries {
            candles: annotated,
            warmup,
        })
    }
}

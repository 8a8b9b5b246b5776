use crate::config::BacktestConfig;
use crate::models::{BollingerBands, IndicatorCandle, Signal};

/// How many RSI points one unit of sentiment shifts the thresholds
const SENTIMENT_RSI_SHIFT: f64 = 10.0;

/// Thresholds for signal generation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalThresholds {
    pub base_rsi_oversold: f64,
    pub base_rsi_overbought: f64,
    pub sentiment_threshold_positive: f64,
    pub sentiment_threshold_negative: f64,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            base_rsi_oversold: 30.0,
            base_rsi_overbought: 70.0,
            sentiment_threshold_positive: 0.1,
            sentiment_threshold_negative: -0.1,
        }
    }
}

impl From<&BacktestConfig> for SignalThresholds {
    fn from(config: &BacktestConfig) -> Self {
        Self {
            base_rsi_oversold: config.base_rsi_oversold,
            base_rsi_overbought: config.base_rsi_overbought,
            sentiment_threshold_positive: config.sentiment_threshold_positive,
            sentiment_threshold_negative: config.sentiment_threshold_negative,
        }
    }
}

impl SignalThresholds {
    pub fn effective_oversold(&self, sentiment: f64) -> f64 {
        self.base_rsi_oversold - sentiment * SENTIMENT_RSI_SHIFT
    }

    pub fn effective_overbought(&self, sentiment: f64) -> f64 {
        self.base_rsi_overbought - sentiment * SENTIMENT_RSI_SHIFT
    }
}

/// Everything the generator looks at for one candle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalInputs {
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub sentiment: f64,
    pub close: f64,
    /// `None` when Bollinger bands are disabled
    pub bands: Option<BollingerBands>,
}

/// Map indicators and sentiment to a directional signal
///
/// Stateless: identical inputs on consecutive candles produce identical
/// signals. Suppressing repeats is the caller's job.
///
/// Buy (ALL must be true):
/// - MACD above its signal line
/// - RSI below the sentiment-shifted oversold level
/// - Sentiment above the positive threshold
/// - Close below the lower band (skipped when bands are disabled)
///
/// Sell mirrors every condition.
pub fn generate_signal(inputs: &SignalInputs, thresholds: &SignalThresholds) -> Signal {
    let oversold = thresholds.effective_oversold(inputs.sentiment);
    let overbought = thresholds.effective_overbought(inputs.sentiment);

    let below_lower = inputs.bands.map_or(true, |b| inputs.close < b.lower);
    let above_upper = inputs.bands.map_or(true, |b| inputs.close > b.upper);

    let buy = inputs.macd > inputs.macd_signal
        && inputs.rsi < oversold
        && inputs.sentiment > thresholds.sentiment_threshold_positive
        && below_lower;

    let sell = inputs.macd < inputs.macd_signal
        && inputs.rsi > overbought
        && inputs.sentiment < thresholds.sentiment_threshold_negative
        && above_upper;

    if buy {
        tracing::debug!(
            "BUY: RSI={:.1} (<{:.1}), MACD={:.4} > signal {:.4}, sentiment={:.2}",
            inputs.rsi,
            oversold,
            inputs.macd,
            inputs.macd_signal,
            inputs.sentiment
        );
        Signal::Buy
    } else if sell {
        tracing::debug!(
            "SELL: RSI={:.1} (>{:.1}), MACD={:.4} < signal {:.4}, sentiment={:.2}",
            inputs.rsi,
            overbought,
            inputs.macd,
            inputs.macd_signal,
            inputs.sentiment
        );
        Signal::Sell
    } else {
        Signal::Hold
    }
}

/// Signal for an annotated candle; `None` while any required indicator is warming up
pub fn signal_for_candle(
    candle: &IndicatorCandle,
    sentiment: f64,
    thresholds: &SignalThresholds,
) -> Option<Signal> {
    let inputs = SignalInputs {
        rsi: candle.rsi?,
        macd: candle.macd?,
        macd_signal: candle.macd_signal?,
        sentiment,
        close: candle.candle.close,
        bands: candle.bollinger,
    };
    Some(generate_signal(&inputs, thresholds))
}

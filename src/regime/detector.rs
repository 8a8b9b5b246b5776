/// Market regime classifier using volatility relative to price
///
/// Decides which entry logic is eligible on a candle:
/// - Trending: ATR / close > trend threshold → Breakout
/// - Sideways: everything else (ties included) → Grid

use crate::models::IndicatorCandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketContext {
    Trending, // Volatility expansion - use Breakout
    Sideways, // Range-bound - use Grid ladder
}

#[derive(Debug, Clone, Copy)]
pub struct RegimeClassifier {
    trend_threshold: f64,
}

impl Default for RegimeClassifier {
    fn default() -> Self {
        Self {
            trend_threshold: 0.02,
        }
    }
}

impl RegimeClassifier {
    pub fn new(trend_threshold: f64) -> Self {
        Self { trend_threshold }
    }

    pub fn classify(&self, atr: f64, price: f64) -> MarketContext {
        if price > 0.0 && atr / price > self.trend_threshold {
            MarketContext::Trending
        } else {
            MarketContext::Sideways
        }
    }

    /// Classify an annotated candle; `None` while ATR is warming up
    pub fn classify_candle(&self, candle: &IndicatorCandle) -> Option<MarketContext> {
        candle.atr.map(|atr| self.classify(atr, candle.candle.close))
    }
}

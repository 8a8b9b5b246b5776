use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV candlestick data
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Candle annotated with the indicator values computed up to and including it.
///
/// Each indicator is `None` while it is still warming up. Bollinger fields stay
/// `None` for the whole series when bands are disabled.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorCandle {
    pub candle: Candle,
    pub rsi: Option<f64>,
    pub atr: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub bollinger: Option<BollingerBands>,
    pub rolling_high: Option<f64>,
    pub rolling_low: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Sentiment score at a point in time, in [-1, 1]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SentimentSample {
    pub timestamp: DateTime<Utc>,
    pub score: f64,
}

/// Trading signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

/// Which entry logic opened a position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Grid,
    Breakout,
}

/// What a trade log row represents. Everything except `Entry` closes a position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TradeKind {
    Entry,
    TakeProfit,
    StopLoss,
    Invalidation,
    CircuitBreaker,
    EndOfData,
}

impl TradeKind {
    pub fn is_exit(&self) -> bool {
        match self {
            TradeKind::Entry => false,
            TradeKind::TakeProfit
            | TradeKind::StopLoss
            | TradeKind::Invalidation
            | TradeKind::CircuitBreaker
            | TradeKind::EndOfData => true,
        }
    }
}

/// One row of the append-only trade log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeRecord {
    pub symbol: String,
    pub kind: TradeKind,
    pub strategy: StrategyKind,
    pub price: f64,
    pub quantity: f64,
    pub fee: f64,
    pub realized_profit_loss: f64,
    pub balance_after: f64,
    pub timestamp: DateTime<Utc>,
}

/// Exchange lot rules for a symbol
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SymbolRules {
    pub step_size: f64,
    pub min_notional: f64,
}

impl Default for SymbolRules {
    fn default() -> Self {
        // Binance BTCUSDT spot filters
        Self {
            step_size: 0.00001,
            min_notional: 5.0,
        }
    }
}

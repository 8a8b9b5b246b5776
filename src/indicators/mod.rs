// Technical indicators module
// Implements RSI, ATR, MACD and Bollinger bands as candle-aligned series

pub mod atr;
pub mod bollinger;
pub mod moving_average;
pub mod pipeline;
pub mod rsi;

pub use atr::{calculate_atr_series, true_range};
pub use bollinger::calculate_bollinger_series;
pub use moving_average::{calculate_ema_series, calculate_macd_series, calculate_sma_series};
pub use pipeline::{AnnotatedSeries, IndicatorConfig, IndicatorPipeline};
pub use rsi::calculate_rsi_series;

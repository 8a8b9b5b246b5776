// Trading signal module
pub mod signals;

pub use signals::{generate_signal, signal_for_candle, SignalInputs, SignalThresholds};

// Exchange REST clients
pub mod binance;

pub use binance::BinanceClient;

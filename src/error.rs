use crate::config::ConfigError;
use crate::execution::PositionError;

/// Errors that abort a run or a surrounding I/O operation.
///
/// Anything that can be degraded to "no action this cycle" (rejected fills,
/// circuit-breaker trips) is reported as a value instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not enough candles for indicator warm-up: need {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("invalid candle data: {0}")]
    InvalidCandles(String),

    #[error("invalid sentiment data: {0}")]
    InvalidSentiment(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to load configuration: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("position state error: {0}")]
    Position(#[from] PositionError),

    #[error("parameter sweep failed: {0}")]
    Sweep(String),

    #[error("exchange API error: {0}")]
    Api(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

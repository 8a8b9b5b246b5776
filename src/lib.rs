// Core modules
pub mod api;
pub mod backtest;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod persistence;
pub mod regime;
pub mod risk;
pub mod sentiment;
pub mod strategy;

// Re-export commonly used types
pub use backtest::{BacktestEngine, RunStatus, SimulationResult};
pub use config::BacktestConfig;
pub use error::{Error, Result};
pub use models::*;

pub mod metrics;
pub mod runner;
pub mod sweep;
pub mod synthetic;

pub use metrics::TradeStats;
pub use runner::{validate_candles, BacktestEngine, RunStatus, SimulationResult};
pub use sweep::{run_sweep, ParameterSpace, SweepOptions, SweepReport, TrialOutcome};
pub use synthetic::{MarketScenario, SyntheticDataGenerator};

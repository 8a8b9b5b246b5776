use serde::{Deserialize, Serialize};

use crate::config::BacktestConfig;
use crate::risk::RiskState;

/// Run-level stops that force the position flat and end the simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakers {
    pub max_drawdown_pct: f64, // percent from peak, 20.0 = -20%
    pub max_trades: usize,     // completed round trips, 0 = unlimited
}

impl Default for CircuitBreakers {
    fn default() -> Self {
        Self {
            max_drawdown_pct: 20.0,
            max_trades: 0,
        }
    }
}

impl From<&BacktestConfig> for CircuitBreakers {
    fn from(config: &BacktestConfig) -> Self {
        Self {
            max_drawdown_pct: config.max_drawdown_percent,
            max_trades: config.max_trades,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerTrip {
    /// Equity fell below the drawdown floor; the run counts as a failure
    MaxDrawdown,
    /// Trade budget exhausted; a normal stop
    TradeLimit,
}

impl CircuitBreakers {
    /// Balance below which the drawdown breaker trips
    pub fn drawdown_floor(&self, peak_balance: f64) -> f64 {
        peak_balance * (1.0 - self.max_drawdown_pct / 100.0)
    }

    pub fn check(&self, state: &RiskState, closed_trades: usize) -> Result<(), CircuitBreakerTrip> {
        // Check drawdown
        if state.balance < self.drawdown_floor(state.peak_balance) {
            return Err(CircuitBreakerTrip::MaxDrawdown);
        }

        // Check trade budget
        if self.max_trades > 0 && closed_trades >= self.max_trades {
            return Err(CircuitBreakerTrip::TradeLimit);
        }

        Ok(())
    }
}

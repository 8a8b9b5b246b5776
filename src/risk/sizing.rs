use std::collections::VecDeque;

use crate::config::{BacktestConfig, TradeMode};

/// Number of recent closed trades the adaptive throttle looks at
const OUTCOME_WINDOW: usize = 5;
/// Losses within the window that cut risk
const LOSSES_TO_THROTTLE: usize = 3;
/// Floor on the throttled risk rate, in percent
const MIN_RISK_PERCENT: f64 = 0.1;
/// Per-cycle restoration step, in percentage points
const RESTORE_STEP: f64 = 0.1;

/// Per-run account and risk bookkeeping
#[derive(Debug, Clone)]
pub struct RiskState {
    pub balance: f64,
    pub peak_balance: f64,
    pub base_risk_percent: f64,
    pub current_risk_percent: f64,
    pub consecutive_losses: u32,
    recent_outcomes: VecDeque<f64>,
}

impl RiskState {
    pub fn new(starting_balance: f64, base_risk_percent: f64) -> Self {
        Self {
            balance: starting_balance,
            peak_balance: starting_balance,
            base_risk_percent,
            current_risk_percent: base_risk_percent,
            consecutive_losses: 0,
            recent_outcomes: VecDeque::with_capacity(OUTCOME_WINDOW),
        }
    }

    /// Set the balance; the peak only ever moves up
    pub fn update_balance(&mut self, new_balance: f64) {
        self.balance = new_balance;
        if new_balance > self.peak_balance {
            self.peak_balance = new_balance;
        }
    }

    /// Register the realized P&L of a closed trade
    pub fn record_outcome(&mut self, pnl: f64) {
        if self.recent_outcomes.len() == OUTCOME_WINDOW {
            self.recent_outcomes.pop_front();
        }
        self.recent_outcomes.push_back(pnl);

        if pnl < 0.0 {
            self.consecutive_losses += 1;
        } else {
            self.consecutive_losses = 0;
        }
    }

    pub fn recent_losses(&self) -> usize {
        self.recent_outcomes.iter().filter(|&&p| p < 0.0).count()
    }

    /// Throttle or restore `current_risk_percent`; call once per cycle
    pub fn adapt(&mut self) {
        let losses = self.recent_losses();

        if losses >= LOSSES_TO_THROTTLE {
            let throttled = (self.base_risk_percent * 0.5).max(MIN_RISK_PERCENT);
            if throttled != self.current_risk_percent {
                tracing::debug!(
                    "Risk throttled to {:.2}% ({} losses in last {})",
                    throttled,
                    losses,
                    self.recent_outcomes.len()
                );
            }
            self.current_risk_percent = throttled;
        } else if losses == 0 && self.current_risk_percent < self.base_risk_percent {
            self.current_risk_percent =
                (self.current_risk_percent + RESTORE_STEP).min(self.base_risk_percent);
        }
    }
}

/// Converts balance, sentiment and risk state into a trade notional
#[derive(Debug, Clone, Copy)]
pub struct RiskSizer {
    pub mode: TradeMode,
    pub fixed_amount: f64,
    pub sentiment_multiplier: f64,
}

impl From<&BacktestConfig> for RiskSizer {
    fn from(config: &BacktestConfig) -> Self {
        Self {
            mode: config.trade_mode,
            fixed_amount: config.fixed_trade_amount_usdt,
            sentiment_multiplier: config.sentiment_sizing_multiplier,
        }
    }
}

impl RiskSizer {
    /// Notional to commit, never below the fixed amount
    pub fn size(&self, state: &RiskState, sentiment: f64) -> f64 {
        let base = match self.mode {
            TradeMode::Fixed => self.fixed_amount,
            TradeMode::Percentage => {
                (state.balance * state.current_risk_percent / 100.0).max(self.fixed_amount)
            }
        };

        (base * (1.0 + sentiment * self.sentiment_multiplier)).max(self.fixed_amount)
    }
}

use chrono::{DateTime, Utc};

use crate::models::{Candle, StrategyKind, TradeKind};

/// Open grid ladder position
#[derive(Debug, Clone, PartialEq)]
pub struct GridPosition {
    pub filled_levels: Vec<f64>,
    pub entry_price: f64, // notional-weighted average of filled levels
    pub quantity: f64,
    pub cost_basis: f64, // cash spent, fees included
    pub take_profit: f64,
    pub invalidation: f64,
    pub entry_index: usize,
    pub entry_time: DateTime<Utc>,
}

impl GridPosition {
    pub fn take_profit_for(entry_price: f64, profit_target_percent: f64) -> f64 {
        entry_price * (1.0 + profit_target_percent / 100.0)
    }
}

/// Open breakout position
#[derive(Debug, Clone, PartialEq)]
pub struct BreakoutPosition {
    pub quote_price: f64, // pre-slippage reference
    pub entry_price: f64, // execution price
    pub quantity: f64,
    pub cost_basis: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub entry_index: usize,
    pub entry_time: DateTime<Utc>,
}

impl BreakoutPosition {
    /// (stop, take_profit) for a quote: stop sits 2 ATR below, target at `rr` times the risk
    pub fn exit_levels(quote: f64, atr: f64, rr_ratio: f64) -> (f64, f64) {
        let stop = quote - 2.0 * atr;
        (stop, quote + rr_ratio * (quote - stop))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum PositionState {
    #[default]
    Flat,
    GridOpen(GridPosition),
    BreakoutOpen(BreakoutPosition),
}

/// What an exit needs to know about the position being closed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Holding {
    pub strategy: StrategyKind,
    pub quantity: f64,
    pub cost_basis: f64,
}

impl PositionState {
    pub fn holding(&self) -> Option<Holding> {
        match self {
            PositionState::Flat => None,
            PositionState::GridOpen(p) => Some(Holding {
                strategy: StrategyKind::Grid,
                quantity: p.quantity,
                cost_basis: p.cost_basis,
            }),
            PositionState::BreakoutOpen(p) => Some(Holding {
                strategy: StrategyKind::Breakout,
                quantity: p.quantity,
                cost_basis: p.cost_basis,
            }),
        }
    }
}

/// Exit triggered by a candle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitTrigger {
    pub kind: TradeKind,
    pub price: f64, // pre-slippage trigger price
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PositionError {
    #[error("a {0:?} position is already open")]
    AlreadyOpen(StrategyKind),

    #[error("no open position to close")]
    NotOpen,
}

/// Single-position state machine: Flat, GridOpen or BreakoutOpen
#[derive(Debug, Default)]
pub struct PositionManager {
    state: PositionState,
}

impl PositionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &PositionState {
        &self.state
    }

    pub fn is_flat(&self) -> bool {
        matches!(self.state, PositionState::Flat)
    }

    pub fn holding(&self) -> Option<Holding> {
        self.state.holding()
    }

    fn ensure_flat(&self) -> Result<(), PositionError> {
        match self.state.holding() {
            Some(open) => Err(PositionError::AlreadyOpen(open.strategy)),
            None => Ok(()),
        }
    }

    pub fn open_grid(&mut self, position: GridPosition) -> Result<(), PositionError> {
        self.ensure_flat()?;
        tracing::debug!(
            "Grid opened: {} levels, entry {:.4}, TP {:.4}, invalidation {:.4}",
            position.filled_levels.len(),
            position.entry_price,
            position.take_profit,
            position.invalidation
        );
        self.state = PositionState::GridOpen(position);
        Ok(())
    }

    pub fn open_breakout(&mut self, position: BreakoutPosition) -> Result<(), PositionError> {
        self.ensure_flat()?;
        tracing::debug!(
            "Breakout opened: entry {:.4}, SL {:.4}, TP {:.4}",
            position.entry_price,
            position.stop_loss,
            position.take_profit
        );
        self.state = PositionState::BreakoutOpen(position);
        Ok(())
    }

    /// Exit condition hit by the candle at `index`, if any
    ///
    /// The protective level is checked before the take-profit. Gaps fill at
    /// the open when it is already beyond the trigger. Candles at or before
    /// the entry candle never trigger.
    pub fn check_exit(&self, index: usize, candle: &Candle) -> Option<ExitTrigger> {
        match &self.state {
            PositionState::Flat => None,
            PositionState::GridOpen(p) if index > p.entry_index => {
                if candle.low < p.invalidation {
                    Some(ExitTrigger {
                        kind: TradeKind::Invalidation,
                        price: candle.open.min(p.invalidation),
                    })
                } else if candle.high >= p.take_profit {
                    Some(ExitTrigger {
                        kind: TradeKind::TakeProfit,
                        price: candle.open.max(p.take_profit),
                    })
                } else {
                    None
                }
            }
            PositionState::BreakoutOpen(p) if index > p.entry_index => {
                if candle.low <= p.stop_loss {
                    Some(ExitTrigger {
                        kind: TradeKind::StopLoss,
                        price: candle.open.min(p.stop_loss),
                    })
                } else if candle.high >= p.take_profit {
                    Some(ExitTrigger {
                        kind: TradeKind::TakeProfit,
                        price: candle.open.max(p.take_profit),
                    })
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Return to Flat, handing back what was held
    pub fn close(&mut self) -> Result<Holding, PositionError> {
        let holding = self.state.holding().ok_or(PositionError::NotOpen)?;
        self.state = PositionState::Flat;
        Ok(holding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: ts(),
            open,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    fn grid(entry_index: usize) -> GridPosition {
        GridPosition {
            filled_levels: vec![99.0, 98.0],
            entry_price: 98.5,
            quantity: 2.0,
            cost_basis: 197.2,
            take_profit: GridPosition::take_profit_for(98.5, 1.5),
            invalidation: 94.08,
            entry_index,
            entry_time: ts(),
        }
    }

    fn breakout(entry_index: usize) -> BreakoutPosition {
        let (stop_loss, take_profit) = BreakoutPosition::exit_levels(100.0, 2.0, 2.5);
        BreakoutPosition {
            quote_price: 100.0,
            entry_price: 100.05,
            quantity: 1.0,
            cost_basis: 100.15,
            stop_loss,
            take_profit,
            entry_index,
            entry_time: ts(),
        }
    }

    #[test]
    fn test_breakout_exit_levels() {
        let (stop, tp) = BreakoutPosition::exit_levels(100.0, 2.0, 2.5);
        assert_eq!(stop, 96.0);
        assert_eq!(tp, 110.0);
    }

    #[test]
    fn test_grid_take_profit() {
        assert!((GridPosition::take_profit_for(98.5, 1.5) - 99.9775).abs() < 1e-9);
    }

    #[test]
    fn test_reentry_is_an_error() {
        let mut pm = PositionManager::new();
        pm.open_grid(grid(0)).unwrap();

        assert_eq!(
            pm.open_breakout(breakout(0)),
            Err(PositionError::AlreadyOpen(StrategyKind::Grid))
        );
        assert_eq!(
            pm.open_grid(grid(0)),
            Err(PositionError::AlreadyOpen(StrategyKind::Grid))
        );
    }

    #[test]
    fn test_close_returns_holding() {
        let mut pm = PositionManager::new();
        assert_eq!(pm.close(), Err(PositionError::NotOpen));

        pm.open_breakout(breakout(3)).unwrap();
        let holding = pm.close().unwrap();
        assert_eq!(holding.strategy, StrategyKind::Breakout);
        assert_eq!(holding.quantity, 1.0);
        assert!(pm.is_flat());
    }

    #[test]
    fn test_no_exit_on_entry_candle() {
        let mut pm = PositionManager::new();
        pm.open_breakout(breakout(5)).unwrap();

        let crash = candle(100.0, 100.0, 90.0, 91.0);
        assert_eq!(pm.check_exit(5, &crash), None);
        assert!(pm.check_exit(6, &crash).is_some());
    }

    #[test]
    fn test_breakout_stop_checked_first() {
        let mut pm = PositionManager::new();
        pm.open_breakout(breakout(0)).unwrap();

        // wide candle touches both stop and target
        let trigger = pm.check_exit(1, &candle(100.0, 111.0, 95.0, 105.0)).unwrap();
        assert_eq!(trigger.kind, TradeKind::StopLoss);
        assert_eq!(trigger.price, 96.0);
    }

    #[test]
    fn test_gap_through_stop_fills_at_open() {
        let mut pm = PositionManager::new();
        pm.open_breakout(breakout(0)).unwrap();

        let trigger = pm.check_exit(1, &candle(94.0, 95.0, 93.0, 94.5)).unwrap();
        assert_eq!(trigger.kind, TradeKind::StopLoss);
        assert_eq!(trigger.price, 94.0);
    }

    #[test]
    fn test_breakout_take_profit() {
        let mut pm = PositionManager::new();
        pm.open_breakout(breakout(0)).unwrap();

        let trigger = pm.check_exit(1, &candle(105.0, 112.0, 104.0, 111.0)).unwrap();
        assert_eq!(trigger.kind, TradeKind::TakeProfit);
        assert_eq!(trigger.price, 110.0);

        // gap above target fills at the open
        let trigger = pm.check_exit(1, &candle(113.0, 115.0, 112.0, 114.0)).unwrap();
        assert_eq!(trigger.price, 113.0);
    }

    #[test]
    fn test_grid_exits() {
        let mut pm = PositionManager::new();
        pm.open_grid(grid(0)).unwrap();

        assert_eq!(pm.check_exit(1, &candle(98.5, 99.5, 97.0, 99.0)), None);

        let tp = pm.check_exit(1, &candle(99.0, 100.5, 98.8, 100.2)).unwrap();
        assert_eq!(tp.kind, TradeKind::TakeProfit);
        assert!((tp.price - 99.9775).abs() < 1e-9);

        let inv = pm.check_exit(1, &candle(95.0, 101.0, 94.0, 94.5)).unwrap();
        assert_eq!(inv.kind, TradeKind::Invalidation);
        assert_eq!(inv.price, 94.08);
    }

    #[test]
    fn test_grid_invalidation_is_strict() {
        let mut pm = PositionManager::new();
        pm.open_grid(grid(0)).unwrap();

        // low exactly at the invalidation price does not trigger
        assert_eq!(pm.check_exit(1, &candle(95.0, 96.0, 94.08, 95.5)), None);
    }
}

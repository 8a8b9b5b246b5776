use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::config::BacktestConfig;
use crate::models::{Candle, StrategyKind, SymbolRules};

/// A simulated fill
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub price: f64, // execution price, slippage included
    pub quantity: f64,
    pub fee: f64,
    pub timestamp: DateTime<Utc>,
}

impl Fill {
    pub fn value(&self) -> f64 {
        self.price * self.quantity
    }

    /// Cash paid for a buy
    pub fn cost(&self) -> f64 {
        self.value() + self.fee
    }

    /// Cash received for a sell
    pub fn proceeds(&self) -> f64 {
        self.value() - self.fee
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RejectReason {
    #[error("quantity floors to zero at the lot step")]
    ZeroQuantity,

    #[error("notional {notional:.4} below exchange minimum {min:.4}")]
    BelowMinNotional { notional: f64, min: f64 },

    #[error("cost {required:.4} exceeds available balance {available:.4}")]
    InsufficientBalance { required: f64, available: f64 },

    #[error("latency pushes the fill past the last candle")]
    NoNextCandle,
}

/// An entry the simulator refused. Nothing was mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub timestamp: DateTime<Utc>,
    pub strategy: StrategyKind,
    pub reason: RejectReason,
    pub price: f64,
    pub quantity: f64,
}

/// Fill model: fees, dynamic slippage, latency and lot quantization
#[derive(Debug, Clone)]
pub struct ExecutionSimulator {
    pub fee_rate: f64,
    pub base_slippage: f64,
    pub volume_factor: f64,
    pub latency_seconds: u64,
    pub rules: SymbolRules,
}

impl ExecutionSimulator {
    pub fn new(config: &BacktestConfig, rules: SymbolRules) -> Self {
        Self {
            fee_rate: config.fee_rate,
            base_slippage: config.base_slippage_pct,
            volume_factor: config.volume_factor,
            latency_seconds: config.latency_seconds,
            rules,
        }
    }

    /// Floor `quantity` to the lot step
    pub fn quantize(&self, quantity: f64) -> f64 {
        if !quantity.is_finite() || quantity <= 0.0 {
            return 0.0;
        }
        let (Some(qty), Some(step)) = (
            Decimal::from_f64(quantity),
            Decimal::from_f64(self.rules.step_size),
        ) else {
            return 0.0;
        };
        if step <= Decimal::ZERO {
            return quantity;
        }

        qty.checked_div(step)
            .map(|lots| lots.floor() * step)
            .and_then(|q| q.to_f64())
            .unwrap_or(0.0)
    }

    /// Slippage fraction for a market order of `quantity`
    pub fn slippage(&self, quantity: f64) -> f64 {
        self.base_slippage + quantity * self.volume_factor
    }

    /// Quote price and timestamp for a signal-driven market entry on `current`
    ///
    /// With latency the order lands on the next candle's open. `None` means
    /// there is no next candle to fill on.
    pub fn market_entry_quote(
        &self,
        current: &Candle,
        next: Option<&Candle>,
    ) -> Option<(f64, DateTime<Utc>)> {
        if self.latency_seconds == 0 {
            Some((current.close, current.timestamp))
        } else {
            next.map(|c| (c.open, c.timestamp))
        }
    }

    /// Market buy of roughly `notional` worth at `quote`
    pub fn buy_market(
        &self,
        quote: f64,
        notional: f64,
        cash: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Fill, RejectReason> {
        let quantity = self.quantize(notional / quote);
        let price = quote * (1.0 + self.slippage(quantity));
        self.buy_fill(price, quantity, cash, timestamp)
    }

    /// Resting limit buy at `level`; fills at the level, no slippage
    pub fn buy_limit(
        &self,
        level: f64,
        notional: f64,
        cash: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Fill, RejectReason> {
        let quantity = self.quantize(notional / level);
        self.buy_fill(level, quantity, cash, timestamp)
    }

    fn buy_fill(
        &self,
        price: f64,
        quantity: f64,
        cash: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Fill, RejectReason> {
        if quantity <= 0.0 {
            return Err(RejectReason::ZeroQuantity);
        }

        let value = price * quantity;
        if value < self.rules.min_notional {
            return Err(RejectReason::BelowMinNotional {
                notional: value,
                min: self.rules.min_notional,
            });
        }

        let fee = value * self.fee_rate;
        if value + fee > cash {
            return Err(RejectReason::InsufficientBalance {
                required: value + fee,
                available: cash,
            });
        }

        Ok(Fill {
            price,
            quantity,
            fee,
            timestamp,
        })
    }

    /// Market sell of the held quantity. Exits are never rejected.
    pub fn sell_market(&self, price: f64, quantity: f64, timestamp: DateTime<Utc>) -> Fill {
        let price = (price * (1.0 - self.slippage(quantity))).max(0.0);
        let fee = price * quantity * self.fee_rate;
        Fill {
            price,
            quantity,
            fee,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn simulator() -> ExecutionSimulator {
        ExecutionSimulator {
            fee_rate: 0.001,
            base_slippage: 0.0005,
            volume_factor: 0.0,
            latency_seconds: 0,
            rules: SymbolRules {
                step_size: 0.001,
                min_notional: 5.0,
            },
        }
    }

    #[test]
    fn test_quantize_floors_to_step() {
        let sim = simulator();
        assert!((sim.quantize(1.23456) - 1.234).abs() < 1e-12);
        assert_eq!(sim.quantize(0.0009), 0.0);
        assert_eq!(sim.quantize(2.0), 2.0);
        assert_eq!(sim.quantize(-1.0), 0.0);
    }

    #[test]
    fn test_market_buy_pays_slippage_and_fee() {
        let sim = simulator();
        let fill = sim.buy_market(100.0, 500.0, 10_000.0, ts()).unwrap();

        assert!((fill.quantity - 5.0).abs() < 1e-12);
        assert!((fill.price - 100.05).abs() < 1e-9);
        assert!((fill.fee - 0.50025).abs() < 1e-9);
        assert!((fill.cost() - 500.75025).abs() < 1e-9);
    }

    #[test]
    fn test_slippage_grows_with_quantity() {
        let sim = ExecutionSimulator {
            volume_factor: 0.001,
            ..simulator()
        };
        assert!((sim.slippage(0.0) - 0.0005).abs() < 1e-12);
        assert!((sim.slippage(10.0) - 0.0105).abs() < 1e-12);
    }

    #[test]
    fn test_limit_buy_has_no_slippage() {
        let sim = simulator();
        let fill = sim.buy_limit(98.0, 98.0, 10_000.0, ts()).unwrap();
        assert_eq!(fill.price, 98.0);
        assert!((fill.quantity - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejections() {
        let sim = simulator();

        assert_eq!(
            sim.buy_market(100_000.0, 50.0, 10_000.0, ts()),
            Err(RejectReason::ZeroQuantity)
        );
        assert!(matches!(
            sim.buy_limit(100.0, 4.0, 10_000.0, ts()),
            Err(RejectReason::BelowMinNotional { .. })
        ));
        assert!(matches!(
            sim.buy_market(100.0, 500.0, 400.0, ts()),
            Err(RejectReason::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_market_sell_receives_less() {
        let sim = simulator();
        let fill = sim.sell_market(100.0, 2.0, ts());
        assert!((fill.price - 99.95).abs() < 1e-9);
        assert!((fill.proceeds() - (199.9 - 0.1999)).abs() < 1e-9);
    }

    #[test]
    fn test_latency_uses_next_open() {
        let current = Candle {
            timestamp: ts(),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 1.0,
        };
        let next = Candle {
            timestamp: ts() + chrono::Duration::hours(1),
            open: 100.7,
            ..current
        };

        let sim = simulator();
        assert_eq!(
            sim.market_entry_quote(&current, Some(&next)),
            Some((100.5, ts()))
        );

        let delayed = ExecutionSimulator {
            latency_seconds: 2,
            ..simulator()
        };
        assert_eq!(
            delayed.market_entry_quote(&current, Some(&next)),
            Some((100.7, next.timestamp))
        );
        assert_eq!(delayed.market_entry_quote(&current, None), None);
    }
}

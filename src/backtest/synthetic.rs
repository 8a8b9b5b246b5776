use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::Candle;

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MarketScenario {
    /// Steady uptrend with noise (+2% daily average)
    Uptrend,
    /// Steady downtrend with noise (-2% daily average)
    Downtrend,
    /// Mean-reverting chop with tight candles, reads as a sideways regime
    Sideways,
    /// ±5% swings with wide candles, reads as trending
    Volatile,
    /// Quiet range for 60% of the series, then a wide-range rally
    Breakout,
    /// Slow grind up, then a 25% slide over the second half
    Crash,
}

/// Intrabar range for quiet candles
const TIGHT_RANGE: f64 = 0.002;
/// Intrabar range for candles meant to push ATR/close over the trend threshold
const WIDE_RANGE: f64 = 0.03;

/// Deterministic candle generator for tests and demos
///
/// The same seed, scenario and length always produce the same series,
/// timestamps included.
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    base_volume: f64,
    start_time: DateTime<Utc>,
}

impl SyntheticDataGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 100.0,
            base_volume: 1_000.0,
            start_time: Utc
                .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
        }
    }

    pub fn with_base_price(mut self, base_price: f64) -> Self {
        self.base_price = base_price;
        self
    }

    pub fn base_price(&self) -> f64 {
        self.base_price
    }

    /// Generate `num_candles` candles spaced `interval_minutes` apart
    pub fn generate(
        &mut self,
        scenario: MarketScenario,
        num_candles: usize,
        interval_minutes: i64,
    ) -> Vec<Candle> {
        let mut candles = Vec::with_capacity(num_candles);
        let mut close = self.base_price;

        for i in 0..num_candles {
            let open = close;
            let (next, range) = self.step(scenario, i, num_candles, close, interval_minutes);
            // keep prices strictly positive
            close = next.max(self.base_price * 0.01);

            let timestamp = self.start_time + Duration::minutes(i as i64 * interval_minutes);
            candles.push(self.create_candle(open, close, range, timestamp));
        }

        tracing::debug!(
            "Generated {} {:?} candles ({} -> {:.2})",
            candles.len(),
            scenario,
            self.base_price,
            close
        );
        candles
    }

    /// Next close and intrabar range for candle `i`
    fn step(
        &mut self,
        scenario: MarketScenario,
        i: usize,
        num_candles: usize,
        price: f64,
        interval_minutes: i64,
    ) -> (f64, f64) {
        let intervals_per_day = 24.0 * 60.0 / interval_minutes as f64;

        match scenario {
            MarketScenario::Uptrend | MarketScenario::Downtrend => {
                let sign = if scenario == MarketScenario::Uptrend { 1.0 } else { -1.0 };
                let drift = price * sign * 0.02 / intervals_per_day;
                let noise = price * self.rng.gen_range(-0.001..0.001);
                (price + drift + noise, TIGHT_RANGE)
            }
            MarketScenario::Sideways => {
                let reversion = (self.base_price - price) * 0.1;
                let noise = price * self.rng.gen_range(-0.01..0.01);
                (price + reversion + noise, TIGHT_RANGE)
            }
            MarketScenario::Volatile => {
                let change = price * self.rng.gen_range(-0.05..0.05);
                ((price + change).max(self.base_price * 0.5), WIDE_RANGE)
            }
            MarketScenario::Breakout => {
                if i < num_candles * 3 / 5 {
                    let reversion = (self.base_price - price) * 0.2;
                    let noise = price * self.rng.gen_range(-0.003..0.003);
                    (price + reversion + noise, TIGHT_RANGE)
                } else {
                    let change = price * self.rng.gen_range(-0.005..0.02);
                    (price + change, WIDE_RANGE)
                }
            }
            MarketScenario::Crash => {
                if i < num_candles / 2 {
                    (price + price * self.rng.gen_range(-0.005..0.01), TIGHT_RANGE)
                } else {
                    let drop = price * -0.25 / (num_candles as f64 / 2.0);
                    let noise = price * self.rng.gen_range(-0.005..0.005);
                    (price + drop + noise, TIGHT_RANGE)
                }
            }
        }
    }

    fn create_candle(
        &mut self,
        open: f64,
        close: f64,
        range: f64,
        timestamp: DateTime<Utc>,
    ) -> Candle {
        let high = open.max(close) * (1.0 + self.rng.gen_range(0.0..range));
        let low = open.min(close) * (1.0 - self.rng.gen_range(0.0..range));
        let volume = self.base_volume * self.rng.gen_range(0.7..1.3);

        Candle {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

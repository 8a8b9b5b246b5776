use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Environment variable prefix, e.g. `GRIDBOT_FEE_RATE=0.00075`
pub const ENV_PREFIX: &str = "GRIDBOT";

/// How the base trade notional is derived
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeMode {
    /// Always trade `fixed_trade_amount_usdt`
    #[serde(alias = "fixed")]
    Fixed,
    /// Trade a percentage of the balance, never less than the fixed amount
    #[serde(alias = "percentage")]
    Percentage,
}

/// Flat parameter surface of a backtest run
///
/// Every field has a default, so a config file only needs the values it
/// changes. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BacktestConfig {
    pub symbol: String,

    // Account & costs
    pub starting_balance: f64,
    pub fee_rate: f64,          // 0.001 = 0.1% per fill
    pub base_slippage_pct: f64, // fraction, 0.0005 = 0.05%
    pub volume_factor: f64,     // extra slippage per unit of quantity
    pub latency_seconds: u64,   // > 0 fills market entries at the next open

    // Circuit breakers
    pub max_drawdown_percent: f64,
    pub max_trades: usize, // 0 = unlimited

    // Indicators & regime
    pub rsi_period: usize,
    pub atr_period: usize,
    pub atr_trend_threshold: f64, // ATR / close above this = trending
    pub breakout_lookback: usize, // rolling high/low window
    pub use_bollinger_bands: bool,
    pub bb_window: usize,
    pub bb_window_dev: f64,

    // Breakout
    pub breakout_rr_ratio: f64,
    pub breakout_confirmation: bool, // also require close > previous rolling high

    // Grid
    pub grid_levels: usize,
    pub grid_step_percent: f64,
    pub grid_profit_target_percent: f64,
    pub grid_invalidation_percent: f64,

    // Sizing
    pub trade_mode: TradeMode,
    pub risk_per_trade_percent: f64,
    pub fixed_trade_amount_usdt: f64,
    pub sentiment_sizing_multiplier: f64,

    // Signals
    pub sentiment_threshold_positive: f64,
    pub sentiment_threshold_negative: f64,
    pub base_rsi_oversold: f64,
    pub base_rsi_overbought: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            starting_balance: 10_000.0,
            fee_rate: 0.001,
            base_slippage_pct: 0.0005,
            volume_factor: 1e-6,
            latency_seconds: 0,
            max_drawdown_percent: 20.0,
            max_trades: 0,
            rsi_period: 14,
            atr_period: 14,
            atr_trend_threshold: 0.02,
            breakout_lookback: 20,
            use_bollinger_bands: false,
            bb_window: 20,
            bb_window_dev: 2.0,
            breakout_rr_ratio: 2.5,
            breakout_confirmation: false,
            grid_levels: 4,
            grid_step_percent: 1.0,
            grid_profit_target_percent: 1.5,
            grid_invalidation_percent: 2.0,
            trade_mode: TradeMode::Percentage,
            risk_per_trade_percent: 5.0,
            fixed_trade_amount_usdt: 5.0,
            sentiment_sizing_multiplier: 0.5,
            sentiment_threshold_positive: 0.1,
            sentiment_threshold_negative: -0.1,
            base_rsi_oversold: 30.0,
            base_rsi_overbought: 70.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} = {value} is out of range (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("{0}")]
    Inconsistent(String),
}

fn check(field: &'static str, value: f64, ok: bool, expected: &'static str) -> std::result::Result<(), ConfigError> {
    if ok && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected,
        })
    }
}

impl BacktestConfig {
    /// Load from an optional TOML file, then `GRIDBOT_*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values instead of clamping them
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::Inconsistent("symbol must not be empty".into()));
        }

        check("starting_balance", self.starting_balance, self.starting_balance > 0.0, "> 0")?;
        check("fee_rate", self.fee_rate, (0.0..1.0).contains(&self.fee_rate), "0 <= x < 1")?;
        check(
            "base_slippage_pct",
            self.base_slippage_pct,
            (0.0..1.0).contains(&self.base_slippage_pct),
            "0 <= x < 1",
        )?;
        check("volume_factor", self.volume_factor, self.volume_factor >= 0.0, ">= 0")?;
        check(
            "max_drawdown_percent",
            self.max_drawdown_percent,
            self.max_drawdown_percent > 0.0 && self.max_drawdown_percent <= 100.0,
            "0 < x <= 100",
        )?;

        for (field, period) in [
            ("rsi_period", self.rsi_period),
            ("atr_period", self.atr_period),
            ("breakout_lookback", self.breakout_lookback),
            ("grid_levels", self.grid_levels),
        ] {
            check(field, period as f64, period >= 1, ">= 1")?;
        }
        check(
            "atr_trend_threshold",
            self.atr_trend_threshold,
            self.atr_trend_threshold > 0.0,
            "> 0",
        )?;

        if self.use_bollinger_bands {
            check("bb_window", self.bb_window as f64, self.bb_window >= 2, ">= 2")?;
            check("bb_window_dev", self.bb_window_dev, self.bb_window_dev > 0.0, "> 0")?;
        }

        check("breakout_rr_ratio", self.breakout_rr_ratio, self.breakout_rr_ratio > 0.0, "> 0")?;
        check("grid_step_percent", self.grid_step_percent, self.grid_step_percent > 0.0, "> 0")?;
        if self.grid_step_percent * self.grid_levels as f64 >= 100.0 {
            return Err(ConfigError::Inconsistent(format!(
                "grid ladder reaches zero: {} levels x {}% step",
                self.grid_levels, self.grid_step_percent
            )));
        }
        check(
            "grid_profit_target_percent",
            self.grid_profit_target_percent,
            self.grid_profit_target_percent > 0.0,
            "> 0",
        )?;
        check(
            "grid_invalidation_percent",
            self.grid_invalidation_percent,
            self.grid_invalidation_percent > 0.0 && self.grid_invalidation_percent < 100.0,
            "0 < x < 100",
        )?;

        check(
            "risk_per_trade_percent",
            self.risk_per_trade_percent,
            self.risk_per_trade_percent > 0.0 && self.risk_per_trade_percent <= 100.0,
            "0 < x <= 100",
        )?;
        check(
            "fixed_trade_amount_usdt",
            self.fixed_trade_amount_usdt,
            self.fixed_trade_amount_usdt > 0.0,
            "> 0",
        )?;
        check(
            "sentiment_sizing_multiplier",
            self.sentiment_sizing_multiplier,
            self.sentiment_sizing_multiplier >= 0.0,
            ">= 0",
        )?;

        check(
            "sentiment_threshold_positive",
            self.sentiment_threshold_positive,
            (-1.0..=1.0).contains(&self.sentiment_threshold_positive),
            "-1 <= x <= 1",
        )?;
        check(
            "sentiment_threshold_negative",
            self.sentiment_threshold_negative,
            (-1.0..=1.0).contains(&self.sentiment_threshold_negative),
            "-1 <= x <= 1",
        )?;
        check(
            "base_rsi_oversold",
            self.base_rsi_oversold,
            self.base_rsi_oversold > 0.0 && self.base_rsi_oversold < 100.0,
            "0 < x < 100",
        )?;
        check(
            "base_rsi_overbought",
            self.base_rsi_overbought,
            self.base_rsi_overbought > 0.0 && self.base_rsi_overbought < 100.0,
            "0 < x < 100",
        )?;
        if self.base_rsi_oversold >= self.base_rsi_overbought {
            return Err(ConfigError::Inconsistent(format!(
                "base_rsi_oversold ({}) must be below base_rsi_overbought ({})",
                self.base_rsi_oversold, self.base_rsi_overbought
            )));
        }

        Ok(())
    }
}

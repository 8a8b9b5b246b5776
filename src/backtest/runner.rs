use serde::{Deserialize, Serialize};

use crate::backtest::metrics::TradeStats;
use crate::config::{BacktestConfig, ConfigError};
use crate::error::{Error, Result};
use crate::execution::{
    weighted_entry, BreakoutPosition, ExecutionSimulator, Fill, GridLadder, GridPosition,
    PositionManager, RejectReason, Rejection,
};
use crate::indicators::IndicatorPipeline;
use crate::models::{
    Candle, IndicatorCandle, Signal, StrategyKind, SymbolRules, TradeKind, TradeRecord,
};
use crate::regime::{MarketContext, RegimeClassifier};
use crate::risk::{CircuitBreakerTrip, CircuitBreakers, RiskSizer, RiskState};
use crate::sentiment::SentimentSeries;
use crate::strategy::{signal_for_candle, SignalThresholds};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every candle was processed
    Completed,
    /// Trade budget exhausted
    TradeLimitReached,
    /// Equity fell through the drawdown floor
    DrawdownBreached,
}

/// Outcome of a single backtest run
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub symbol: String,
    pub trades: Vec<TradeRecord>,
    pub rejections: Vec<Rejection>,
    pub final_balance: f64,
    pub metrics: TradeStats,
    pub status: RunStatus,
    pub candles_processed: usize,
}

impl SimulationResult {
    /// Balance used to rank runs against each other
    ///
    /// A drawdown breach counts as losing everything.
    pub fn comparison_balance(&self) -> f64 {
        match self.status {
            RunStatus::DrawdownBreached => 0.0,
            RunStatus::Completed | RunStatus::TradeLimitReached => self.final_balance,
        }
    }
}

/// Candle-by-candle simulation of the grid/breakout system
///
/// Immutable once built, so one engine can serve concurrent runs. All mutable
/// state lives inside `run`.
#[derive(Debug, Clone)]
pub struct BacktestEngine {
    config: BacktestConfig,
    pipeline: IndicatorPipeline,
    classifier: RegimeClassifier,
    thresholds: SignalThresholds,
    sizer: RiskSizer,
    breakers: CircuitBreakers,
    simulator: ExecutionSimulator,
}

/// Mutable bookkeeping for one run
struct RunState {
    cash: f64,
    risk: RiskState,
    positions: PositionManager,
    stats: TradeStats,
    trades: Vec<TradeRecord>,
    rejections: Vec<Rejection>,
}

impl RunState {
    fn new(config: &BacktestConfig) -> Self {
        Self {
            cash: config.starting_balance,
            risk: RiskState::new(config.starting_balance, config.risk_per_trade_percent),
            positions: PositionManager::new(),
            stats: TradeStats::new(config.starting_balance),
            trades: Vec::new(),
            rejections: Vec::new(),
        }
    }

    /// Cash plus the open position marked at `price`
    fn equity(&self, price: f64) -> f64 {
        self.cash
            + self
                .positions
                .holding()
                .map_or(0.0, |holding| holding.quantity * price)
    }

    fn record(&mut self, trade: TradeRecord) {
        self.stats.record_trade(&trade);
        self.trades.push(trade);
    }

    fn reject(&mut self, rejection: Rejection) {
        tracing::warn!(
            "{:?} entry rejected at {}: {}",
            rejection.strategy,
            rejection.timestamp,
            rejection.reason
        );
        self.rejections.push(rejection);
    }
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig, rules: SymbolRules) -> Result<Self> {
        config.validate()?;
        if !(rules.step_size.is_finite() && rules.step_size > 0.0) {
            return Err(ConfigError::Inconsistent(format!(
                "step_size must be positive, got {}",
                rules.step_size
            ))
            .into());
        }
        if !(rules.min_notional.is_finite() && rules.min_notional >= 0.0) {
            return Err(ConfigError::Inconsistent(format!(
                "min_notional must be non-negative, got {}",
                rules.min_notional
            ))
            .into());
        }

        Ok(Self {
            pipeline: IndicatorPipeline::new((&config).into()),
            classifier: RegimeClassifier::new(config.atr_trend_threshold),
            thresholds: SignalThresholds::from(&config),
            sizer: RiskSizer::from(&config),
            breakers: CircuitBreakers::from(&config),
            simulator: ExecutionSimulator::new(&config, rules),
            config,
        })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn rules(&self) -> &SymbolRules {
        &self.simulator.rules
    }

    /// Replay `candles` from the end of the indicator warm-up to the last candle
    pub fn run(&self, candles: &[Candle], sentiment: &SentimentSeries) -> Result<SimulationResult> {
        validate_candles(candles)?;
        let series = self.pipeline.annotate(candles)?;
        let bars = &series.candles;

        tracing::info!(
            "Starting backtest for {}: {} candles ({} warm-up), {} sentiment samples",
            self.config.symbol,
            bars.len(),
            series.warmup,
            sentiment.len()
        );

        let mut state = RunState::new(&self.config);
        let mut status = RunStatus::Completed;
        let mut processed = 0;

        for i in series.warmup..bars.len() {
            let candle = &bars[i].candle;
            processed += 1;

            let score = sentiment.as_of(candle.timestamp);
            state.risk.adapt();

            if let Some(trigger) = state.positions.check_exit(i, candle) {
                self.close_position(&mut state, trigger.kind, trigger.price, candle)?;
            }

            if let Some(stopped) = self.check_breakers(&mut state, candle)? {
                status = stopped;
                break;
            }

            // an entry's own costs can push equity through the floor
            if state.positions.is_flat()
                && self.try_enter(&mut state, bars, i, score)?
            {
                if let Some(stopped) = self.check_breakers(&mut state, candle)? {
                    status = stopped;
                    break;
                }
            }

            state.stats.observe_equity(state.equity(candle.close));
        }

        if !state.positions.is_flat() {
            if let Some(last) = candles.last() {
                self.close_position(&mut state, TradeKind::EndOfData, last.close, last)?;
                state.stats.observe_equity(state.cash);
            }
        }

        state.stats.finish(state.cash);

        tracing::info!(
            "Backtest complete ({:?}): {} closed trades, {} rejections, balance ${:.2} ({:+.2}%)",
            status,
            state.stats.closed_trades,
            state.rejections.len(),
            state.cash,
            state.stats.total_return_pct()
        );

        Ok(SimulationResult {
            symbol: self.config.symbol.clone(),
            final_balance: state.cash,
            metrics: state.stats,
            trades: state.trades,
            rejections: state.rejections,
            status,
            candles_processed: processed,
        })
    }

    /// Flat-state entry logic for candle `i`
    ///
    /// Grid limit orders rest through the candle, so their regime comes from
    /// the previous close. Breakouts are decided at this candle's close.
    /// Returns whether a position was filled within candle `i`.
    fn try_enter(
        &self,
        state: &mut RunState,
        bars: &[IndicatorCandle],
        i: usize,
        sentiment: f64,
    ) -> Result<bool> {
        let prior = i
            .checked_sub(1)
            .and_then(|p| self.classifier.classify_candle(&bars[p]));
        if prior == Some(MarketContext::Sideways) {
            return self.enter_grid(state, bars, i, sentiment);
        }

        match self.classifier.classify_candle(&bars[i]) {
            Some(MarketContext::Trending) => self.enter_breakout(state, bars, i, sentiment),
            Some(MarketContext::Sideways) | None => Ok(false),
        }
    }

    /// Refresh the balance and run the breakers at `candle`'s close
    ///
    /// On a trip any open position is closed at the close and the stop
    /// status is returned.
    fn check_breakers(&self, state: &mut RunState, candle: &Candle) -> Result<Option<RunStatus>> {
        state.risk.update_balance(state.equity(candle.close));

        let Err(trip) = self.breakers.check(&state.risk, state.stats.closed_trades) else {
            return Ok(None);
        };

        if !state.positions.is_flat() {
            self.close_position(state, TradeKind::CircuitBreaker, candle.close, candle)?;
        }
        tracing::warn!(
            "Circuit breaker {:?} at {}: equity ${:.2}, peak ${:.2}, {} closed trades",
            trip,
            candle.timestamp,
            state.risk.balance,
            state.risk.peak_balance,
            state.stats.closed_trades
        );
        state.stats.observe_equity(state.equity(candle.close));

        Ok(Some(match trip {
            CircuitBreakerTrip::MaxDrawdown => RunStatus::DrawdownBreached,
            CircuitBreakerTrip::TradeLimit => RunStatus::TradeLimitReached,
        }))
    }

    fn enter_grid(
        &self,
        state: &mut RunState,
        bars: &[IndicatorCandle],
        i: usize,
        sentiment: f64,
    ) -> Result<bool> {
        let Some(previous) = i.checked_sub(1).map(|p| &bars[p].candle) else {
            return Ok(false);
        };
        let candle = &bars[i].candle;

        let ladder = GridLadder::new(
            previous.close,
            self.config.grid_levels,
            self.config.grid_step_percent,
        );
        let per_level = self.sizer.size(&state.risk, sentiment) / self.config.grid_levels as f64;

        let mut cash = state.cash;
        let mut fills: Vec<Fill> = Vec::new();
        for level in ladder.triggered(candle.low) {
            match self
                .simulator
                .buy_limit(level, per_level, cash, candle.timestamp)
            {
                Ok(fill) => {
                    cash -= fill.cost();
                    fills.push(fill);
                }
                Err(reason) => {
                    // all-or-nothing: a partial ladder is never opened
                    state.reject(Rejection {
                        timestamp: candle.timestamp,
                        strategy: StrategyKind::Grid,
                        reason,
                        price: level,
                        quantity: self.simulator.quantize(per_level / level),
                    });
                    return Ok(false);
                }
            }
        }

        let (Some(entry_price), Some(invalidation)) = (
            weighted_entry(&fills),
            ladder.invalidation(self.config.grid_invalidation_percent),
        ) else {
            return Ok(false);
        };

        let quantity: f64 = fills.iter().map(|f| f.quantity).sum();
        let fee: f64 = fills.iter().map(|f| f.fee).sum();
        let cost_basis = state.cash - cash;

        state.positions.open_grid(GridPosition {
            filled_levels: fills.iter().map(|f| f.price).collect(),
            entry_price,
            quantity,
            cost_basis,
            take_profit: GridPosition::take_profit_for(
                entry_price,
                self.config.grid_profit_target_percent,
            ),
            invalidation,
            entry_index: i,
            entry_time: candle.timestamp,
        })?;
        state.cash = cash;

        tracing::debug!(
            "Grid entry at {}: {}/{} levels, avg {:.4}, qty {:.6}",
            candle.timestamp,
            fills.len(),
            self.config.grid_levels,
            entry_price,
            quantity
        );

        state.record(TradeRecord {
            symbol: self.config.symbol.clone(),
            kind: TradeKind::Entry,
            strategy: StrategyKind::Grid,
            price: entry_price,
            quantity,
            fee,
            realized_profit_loss: 0.0,
            balance_after: state.cash,
            timestamp: candle.timestamp,
        });
        Ok(true)
    }

    fn enter_breakout(
        &self,
        state: &mut RunState,
        bars: &[IndicatorCandle],
        i: usize,
        sentiment: f64,
    ) -> Result<bool> {
        let bar = &bars[i];
        let candle = &bar.candle;

        match signal_for_candle(bar, sentiment, &self.thresholds) {
            Some(Signal::Buy) => {}
            Some(Signal::Sell) => {
                tracing::debug!("Sell signal at {} ignored while flat", candle.timestamp);
                return Ok(false);
            }
            Some(Signal::Hold) | None => return Ok(false),
        }

        if self.config.breakout_confirmation {
            let previous_high = i.checked_sub(1).and_then(|p| bars[p].rolling_high);
            if !previous_high.is_some_and(|high| candle.close > high) {
                tracing::debug!(
                    "Buy at {} not confirmed: close {:.4} vs prior high {:?}",
                    candle.timestamp,
                    candle.close,
                    previous_high
                );
                return Ok(false);
            }
        }

        let Some(atr) = bar.atr else {
            return Ok(false);
        };

        let next = bars.get(i + 1).map(|b| &b.candle);
        let Some((quote, timestamp)) = self.simulator.market_entry_quote(candle, next) else {
            state.reject(Rejection {
                timestamp: candle.timestamp,
                strategy: StrategyKind::Breakout,
                reason: RejectReason::NoNextCandle,
                price: candle.close,
                quantity: 0.0,
            });
            return Ok(false);
        };

        let notional = self.sizer.size(&state.risk, sentiment);
        let fill = match self
            .simulator
            .buy_market(quote, notional, state.cash, timestamp)
        {
            Ok(fill) => fill,
            Err(reason) => {
                state.reject(Rejection {
                    timestamp,
                    strategy: StrategyKind::Breakout,
                    reason,
                    price: quote,
                    quantity: self.simulator.quantize(notional / quote),
                });
                return Ok(false);
            }
        };

        let (stop_loss, take_profit) =
            BreakoutPosition::exit_levels(quote, atr, self.config.breakout_rr_ratio);
        // with latency the fill lands at the next open, so that whole candle
        // trades after the fill and is checked for exits
        let deferred = self.simulator.latency_seconds > 0;

        state.positions.open_breakout(BreakoutPosition {
            quote_price: quote,
            entry_price: fill.price,
            quantity: fill.quantity,
            cost_basis: fill.cost(),
            stop_loss,
            take_profit,
            entry_index: i,
            entry_time: timestamp,
        })?;
        state.cash -= fill.cost();

        state.record(TradeRecord {
            symbol: self.config.symbol.clone(),
            kind: TradeKind::Entry,
            strategy: StrategyKind::Breakout,
            price: fill.price,
            quantity: fill.quantity,
            fee: fill.fee,
            realized_profit_loss: 0.0,
            balance_after: state.cash,
            timestamp,
        });
        Ok(!deferred)
    }

    /// Sell the whole position at `price` and return to Flat
    fn close_position(
        &self,
        state: &mut RunState,
        kind: TradeKind,
        price: f64,
        candle: &Candle,
    ) -> Result<()> {
        let holding = state.positions.close()?;
        let fill = self
            .simulator
            .sell_market(price, holding.quantity, candle.timestamp);

        let pnl = fill.proceeds() - holding.cost_basis;
        state.cash += fill.proceeds();
        state.risk.record_outcome(pnl);

        tracing::debug!(
            "{:?} exit ({:?}) at {}: {:.4} x {:.6}, P&L ${:.2}",
            holding.strategy,
            kind,
            candle.timestamp,
            fill.price,
            fill.quantity,
            pnl
        );

        state.record(TradeRecord {
            symbol: self.config.symbol.clone(),
            kind,
            strategy: holding.strategy,
            price: fill.price,
            quantity: fill.quantity,
            fee: fill.fee,
            realized_profit_loss: pnl,
            balance_after: state.cash,
            timestamp: candle.timestamp,
        });
        Ok(())
    }
}

/// Reject series the simulation can't interpret
pub fn validate_candles(candles: &[Candle]) -> Result<()> {
    for (i, c) in candles.iter().enumerate() {
        let prices = [c.open, c.high, c.low, c.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(Error::InvalidCandles(format!(
                "candle {} at {} has a non-positive or non-finite price",
                i, c.timestamp
            )));
        }
        if c.high < c.low {
            return Err(Error::InvalidCandles(format!(
                "candle {} at {} has high {} below low {}",
                i, c.timestamp, c.high, c.low
            )));
        }
        if !c.volume.is_finite() || c.volume < 0.0 {
            return Err(Error::InvalidCandles(format!(
                "candle {} at {} has invalid volume {}",
                i, c.timestamp, c.volume
            )));
        }
    }

    if let Some(pair) = candles
        .windows(2)
        .find(|pair| pair[1].timestamp <= pair[0].timestamp)
    {
        return Err(Error::InvalidCandles(format!(
            "timestamps not strictly increasing: {} then {}",
            pair[0].timestamp, pair[1].timestamp
        )));
    }

    Ok(())
}

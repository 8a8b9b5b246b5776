// Seeded random parameter search
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::backtest::runner::{BacktestEngine, RunStatus, SimulationResult};
use crate::config::BacktestConfig;
use crate::error::{Error, Result};
use crate::models::{Candle, SymbolRules};
use crate::sentiment::SentimentSeries;

/// Draw a value from `lo..=hi` on a grid of `step`
fn stepped<R: Rng>(rng: &mut R, lo: f64, hi: f64, step: f64) -> f64 {
    let steps = ((hi - lo) / step).round() as u32;
    lo + rng.gen_range(0..=steps) as f64 * step
}

/// Search space for the tunable parameters
///
/// Anything not sampled keeps the base config's value.
#[derive(Debug, Clone, Default)]
pub struct ParameterSpace;

impl ParameterSpace {
    pub fn sample<R: Rng>(&self, base: &BacktestConfig, rng: &mut R) -> BacktestConfig {
        let mut config = base.clone();

        config.atr_period = rng.gen_range(10..=20);
        config.atr_trend_threshold = stepped(rng, 0.01, 0.03, 0.01);
        config.breakout_rr_ratio = stepped(rng, 2.0, 3.5, 0.5);
        config.grid_levels = rng.gen_range(3..=5);
        config.grid_step_percent = stepped(rng, 0.5, 1.5, 0.5);
        config.grid_profit_target_percent = stepped(rng, 1.0, 2.0, 0.5);
        config.grid_invalidation_percent = stepped(rng, 1.5, 2.5, 0.5);
        config.risk_per_trade_percent = stepped(rng, 1.0, 10.0, 1.0);
        config.sentiment_threshold_positive = stepped(rng, 0.0, 0.2, 0.1);
        config.sentiment_threshold_negative = stepped(rng, -0.2, 0.0, 0.1);
        // log-uniform over [1e-7, 1e-5]
        config.volume_factor = 10f64.powf(rng.gen_range(-7.0..=-5.0));
        config.latency_seconds = *[0, 60, 300].choose(rng).unwrap_or(&0);
        config.max_drawdown_percent = *[10.0, 20.0, 30.0].choose(rng).unwrap_or(&20.0);
        config.max_trades = *[0, 50, 100].choose(rng).unwrap_or(&0);
        config.sentiment_sizing_multiplier = stepped(rng, 0.0, 1.0, 0.25);
        config.base_rsi_oversold = rng.gen_range(20..=40) as f64;
        config.base_rsi_overbought = rng.gen_range(60..=80) as f64;
        config.use_bollinger_bands = rng.gen_bool(0.5);
        if config.use_bollinger_bands {
            config.bb_window = rng.gen_range(15..=25);
            config.bb_window_dev = stepped(rng, 1.5, 2.5, 0.5);
        } else {
            config.bb_window = 20;
            config.bb_window_dev = 2.0;
        }

        config
    }
}

#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub trials: usize,
    pub concurrency: usize,
    pub seed: u64,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            trials: 50,
            concurrency: 4,
            seed: 42,
        }
    }
}

/// Summary of one trial; the trade log is dropped to keep sweeps small
#[derive(Debug, Clone, Serialize)]
pub struct TrialOutcome {
    pub trial: usize,
    pub config: BacktestConfig,
    pub status: RunStatus,
    pub final_balance: f64,
    pub comparison_balance: f64,
    pub closed_trades: usize,
    pub max_drawdown_pct: f64,
}

#[derive(Debug)]
pub struct SweepReport {
    /// Best first; equal balances keep trial order
    pub ranked: Vec<TrialOutcome>,
    /// Full re-run of the best trial
    pub best: Option<SimulationResult>,
    pub failed: usize,
}

/// Run `options.trials` sampled configs against the same data
///
/// Configs are drawn up front from a seeded RNG, so the set of trials and
/// the ranking don't depend on the order trials finish in.
pub async fn run_sweep(
    base: &BacktestConfig,
    rules: SymbolRules,
    candles: Arc<Vec<Candle>>,
    sentiment: Arc<SentimentSeries>,
    options: &SweepOptions,
) -> Result<SweepReport> {
    let mut rng = StdRng::seed_from_u64(options.seed);
    let space = ParameterSpace;
    let configs: Vec<BacktestConfig> = (0..options.trials)
        .map(|_| space.sample(base, &mut rng))
        .collect();

    tracing::info!(
        "Starting sweep: {} trials, concurrency {}, seed {}",
        configs.len(),
        options.concurrency,
        options.seed
    );

    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut handles = Vec::with_capacity(configs.len());

    for (trial, config) in configs.into_iter().enumerate() {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::Sweep(e.to_string()))?;
        let candles = Arc::clone(&candles);
        let sentiment = Arc::clone(&sentiment);

        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let result = BacktestEngine::new(config.clone(), rules)
                .and_then(|engine| engine.run(&candles, &sentiment));
            (trial, config, result)
        }));
    }

    let mut ranked = Vec::with_capacity(handles.len());
    let mut failed = 0;
    for handle in handles {
        let (trial, config, result) = handle.await.map_err(|e| Error::Sweep(e.to_string()))?;
        match result {
            Ok(result) => {
                tracing::debug!(
                    "Trial {}: {:?}, balance ${:.2}",
                    trial,
                    result.status,
                    result.final_balance
                );
                ranked.push(TrialOutcome {
                    trial,
                    status: result.status,
                    final_balance: result.final_balance,
                    comparison_balance: result.comparison_balance(),
                    closed_trades: result.metrics.closed_trades,
                    max_drawdown_pct: result.metrics.max_drawdown_pct,
                    config,
                });
            }
            Err(e) => {
                tracing::warn!("Trial {} failed: {}", trial, e);
                failed += 1;
            }
        }
    }

    // stable sort: ties stay in trial order
    ranked.sort_by(|a, b| b.comparison_balance.total_cmp(&a.comparison_balance));

    let best = match ranked.first() {
        Some(top) => {
            let engine = BacktestEngine::new(top.config.clone(), rules)?;
            Some(engine.run(&candles, &sentiment)?)
        }
        None => None,
    };

    if let Some(top) = ranked.first() {
        tracing::info!(
            "Sweep complete: best trial {} with ${:.2} ({} failed)",
            top.trial,
            top.comparison_balance,
            failed
        );
    }

    Ok(SweepReport {
        ranked,
        best,
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::synthetic::{MarketScenario, SyntheticDataGenerator};

    #[test]
    fn test_samples_stay_in_range_and_validate() {
        let base = BacktestConfig::default();
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..200 {
            let config = ParameterSpace.sample(&base, &mut rng);
            assert!(config.validate().is_ok(), "{:?}", config);
            assert!((10..=20).contains(&config.atr_period));
            assert!((3..=5).contains(&config.grid_levels));
            assert!((0.99e-7..=1.01e-5).contains(&config.volume_factor));
            assert!([0, 60, 300].contains(&config.latency_seconds));
            assert!((1.0..=10.0).contains(&config.risk_per_trade_percent));
            // untouched fields come from the base
            assert_eq!(config.symbol, base.symbol);
            assert_eq!(config.rsi_period, base.rsi_period);
        }
    }

    #[test]
    fn test_stepped_hits_grid() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let v = stepped(&mut rng, 0.5, 1.5, 0.5);
            assert!([0.5, 1.0, 1.5].iter().any(|g| (g - v).abs() < 1e-12));
        }
    }

    async fn sweep(seed: u64) -> SweepReport {
        let candles = SyntheticDataGenerator::new(21).generate(MarketScenario::Sideways, 300, 60);
        let options = SweepOptions {
            trials: 6,
            concurrency: 3,
            seed,
        };
        run_sweep(
            &BacktestConfig::default(),
            SymbolRules::default(),
            Arc::new(candles),
            Arc::new(SentimentSeries::neutral()),
            &options,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_sweep_ranks_best_first() {
        let report = sweep(7).await;

        assert_eq!(report.ranked.len() + report.failed, 6);
        for pair in report.ranked.windows(2) {
            assert!(pair[0].comparison_balance >= pair[1].comparison_balance);
        }

        let best = report.best.as_ref().unwrap();
        assert_eq!(best.comparison_balance(), report.ranked[0].comparison_balance);
    }

    #[tokio::test]
    async fn test_sweep_is_reproducible() {
        let a = sweep(99).await;
        let b = sweep(99).await;

        let trials = |r: &SweepReport| {
            r.ranked
                .iter()
                .map(|t| (t.trial, t.final_balance))
                .collect::<Vec<_>>()
        };
        assert_eq!(trials(&a), trials(&b));
    }
}

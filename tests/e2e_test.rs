use gridbot::backtest::{MarketScenario, SyntheticDataGenerator, TradeStats};
use gridbot::config::TradeMode;
use gridbot::indicators::IndicatorConfig;
use gridbot::persistence;
use gridbot::sentiment::SentimentSeries;
use gridbot::*;

use chrono::Duration;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter("gridbot=debug")
        .try_init()
        .ok();
}

/// Entries and exits must alternate, one position at a time
fn assert_single_position(trades: &[TradeRecord]) {
    let mut open: Option<StrategyKind> = None;
    for trade in trades {
        match (trade.kind, open) {
            (TradeKind::Entry, None) => open = Some(trade.strategy),
            (TradeKind::Entry, Some(s)) => panic!("entry while {:?} position open", s),
            (_, Some(s)) => {
                assert_eq!(trade.strategy, s, "exit strategy differs from entry");
                open = None;
            }
            (kind, None) => panic!("{:?} exit with no open position", kind),
        }
    }
    assert!(open.is_none(), "position left open at end of run");
}

fn drifting_sentiment(candles: &[Candle]) -> SentimentSeries {
    let samples = candles
        .iter()
        .step_by(24)
        .enumerate()
        .map(|(i, c)| SentimentSample {
            timestamp: c.timestamp - Duration::minutes(1),
            score: ((i as f64) * 0.7).sin() * 0.6,
        })
        .collect();
    SentimentSeries::new(samples).unwrap()
}

#[test]
fn test_e2e_csv_workflow() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();

    println!("=== Starting E2E Test ===\n");

    // 1. Generate and persist candles
    println!("1. Writing synthetic candles...");
    let candles = SyntheticDataGenerator::new(11).generate(MarketScenario::Sideways, 400, 60);
    let candle_path = dir.path().join("candles.csv");
    persistence::write_candles_csv(&candle_path, &candles).unwrap();

    let loaded = persistence::load_candles_csv(&candle_path).unwrap();
    assert_eq!(loaded, candles);
    println!("   ✓ {} candles round-tripped", loaded.len());

    // 2. Backtest from the loaded data
    println!("\n2. Running backtest...");
    let sentiment = persistence::load_sentiment_csv(&dir.path().join("missing.csv")).unwrap();
    let engine = BacktestEngine::new(BacktestConfig::default(), SymbolRules::default()).unwrap();
    let result = engine.run(&loaded, &sentiment).unwrap();

    println!(
        "   ✓ {:?}: {} trades, final balance ${:.2}",
        result.status,
        result.trades.len(),
        result.final_balance
    );
    assert_eq!(result.status, RunStatus::Completed);
    let warmup = IndicatorConfig::default().warmup();
    assert_eq!(result.candles_processed, candles.len() - warmup);
    assert_single_position(&result.trades);

    // 3. Export the trade log and recompute metrics from it
    println!("\n3. Exporting and re-analysing trades...");
    let trades_path = dir.path().join("trades.csv");
    persistence::write_trades_csv(&trades_path, &result.trades).unwrap();
    let reloaded = persistence::read_trades_csv(&trades_path).unwrap();
    assert_eq!(reloaded, result.trades);

    let stats = TradeStats::from_trades(&reloaded, result.metrics.starting_balance);
    assert_eq!(stats.entries, result.metrics.entries);
    assert_eq!(stats.closed_trades, result.metrics.closed_trades);
    assert_eq!(stats.wins, result.metrics.wins);
    assert_eq!(stats.losses, result.metrics.losses);
    assert!((stats.gross_profit - result.metrics.gross_profit).abs() < 1e-9);
    assert!((stats.total_fees - result.metrics.total_fees).abs() < 1e-9);
    assert!((stats.final_balance - result.final_balance).abs() < 1e-9);
    println!("   ✓ Metrics match ({} closed trades)", stats.closed_trades);

    println!("\n=== E2E Test Complete ===");
}

#[test]
fn test_invariants_across_scenarios() {
    init_logging();

    for (seed, scenario) in [
        MarketScenario::Uptrend,
        MarketScenario::Downtrend,
        MarketScenario::Sideways,
        MarketScenario::Volatile,
        MarketScenario::Breakout,
        MarketScenario::Crash,
    ]
    .into_iter()
    .enumerate()
    {
        let candles = SyntheticDataGenerator::new(seed as u64).generate(scenario, 300, 60);
        let sentiment = drifting_sentiment(&candles);
        let engine = BacktestEngine::new(BacktestConfig::default(), SymbolRules::default()).unwrap();
        let result = engine.run(&candles, &sentiment).unwrap();

        assert_single_position(&result.trades);
        assert!(result.final_balance > 0.0, "{:?}", scenario);
        for trade in &result.trades {
            assert!(trade.quantity > 0.0);
            assert!(trade.fee >= 0.0);
            assert!(trade.balance_after >= 0.0);
        }
        if let Some(last) = result.trades.last() {
            assert!(last.kind.is_exit());
            assert_eq!(result.final_balance, last.balance_after, "{:?}", scenario);
        } else {
            assert_eq!(result.final_balance, 10_000.0);
        }
    }
}

#[test]
fn test_runs_are_deterministic() {
    init_logging();
    let candles = SyntheticDataGenerator::new(5).generate(MarketScenario::Volatile, 300, 60);
    let sentiment = drifting_sentiment(&candles);
    let engine = BacktestEngine::new(BacktestConfig::default(), SymbolRules::default()).unwrap();

    let a = engine.run(&candles, &sentiment).unwrap();
    let b = engine.run(&candles, &sentiment).unwrap();
    assert_eq!(a.trades, b.trades);
    assert_eq!(a.final_balance, b.final_balance);
    assert_eq!(a.metrics, b.metrics);
}

#[test]
fn test_config_file_feeds_engine() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gridbot.toml");
    std::fs::write(
        &path,
        "symbol = \"ETHUSDT\"\nstarting_balance = 5000.0\ngrid_levels = 3\ntrade_mode = \"fixed\"\nfixed_trade_amount_usdt = 250.0\n",
    )
    .unwrap();

    let config = BacktestConfig::load(Some(&path)).unwrap();
    assert_eq!(config.symbol, "ETHUSDT");
    assert_eq!(config.grid_levels, 3);
    assert_eq!(config.trade_mode, TradeMode::Fixed);
    // untouched keys keep their defaults
    assert_eq!(config.rsi_period, 14);

    let candles = SyntheticDataGenerator::new(3).generate(MarketScenario::Sideways, 200, 60);
    let engine = BacktestEngine::new(config, SymbolRules::default()).unwrap();
    let result = engine.run(&candles, &SentimentSeries::neutral()).unwrap();
    assert_eq!(result.symbol, "ETHUSDT");
    assert_eq!(result.metrics.starting_balance, 5000.0);
    assert_single_position(&result.trades);
}

#[test]
fn test_config_file_rejections() {
    let dir = tempfile::tempdir().unwrap();

    let unknown = dir.path().join("unknown.toml");
    std::fs::write(&unknown, "grid_levles = 3\n").unwrap();
    assert!(matches!(
        BacktestConfig::load(Some(&unknown)),
        Err(Error::ConfigLoad(_))
    ));

    let out_of_range = dir.path().join("range.toml");
    std::fs::write(&out_of_range, "fee_rate = 1.5\n").unwrap();
    assert!(matches!(
        BacktestConfig::load(Some(&out_of_range)),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_too_few_candles() {
    let candles = SyntheticDataGenerator::new(1).generate(MarketScenario::Sideways, 10, 60);
    let engine = BacktestEngine::new(BacktestConfig::default(), SymbolRules::default()).unwrap();
    assert!(matches!(
        engine.run(&candles, &SentimentSeries::neutral()),
        Err(Error::InsufficientData { got: 10, .. })
    ));
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use gridbot::api::BinanceClient;
use gridbot::backtest::{run_sweep, MarketScenario, SweepOptions, SyntheticDataGenerator};
use gridbot::persistence;
use gridbot::sentiment::SentimentSeries;
use gridbot::{BacktestConfig, BacktestEngine, RunStatus, SimulationResult, SymbolRules};

#[derive(Parser)]
#[command(
    name = "gridbot",
    version,
    about = "Candle-by-candle backtester for a regime-switching grid/breakout strategy",
    propagate_version = true
)]
struct Cli {
    /// TOML config file; GRIDBOT_* environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one backtest over a candle CSV
    Backtest(BacktestArgs),
    /// Generate a synthetic market scenario, optionally backtesting it
    Synthetic(SyntheticArgs),
    /// Seeded random parameter search
    Sweep(SweepArgs),
    /// Download klines from Binance into a candle CSV
    Fetch(FetchArgs),
    /// Show Binance trading rules for a symbol
    Rules {
        symbol: String,
    },
}

#[derive(Args)]
struct RulesArgs {
    /// Lot step size (ignored with --fetch-rules)
    #[arg(long)]
    step_size: Option<f64>,

    /// Minimum order notional (ignored with --fetch-rules)
    #[arg(long)]
    min_notional: Option<f64>,

    /// Look up the symbol's rules on Binance
    #[arg(long, default_value_t = false)]
    fetch_rules: bool,
}

#[derive(Args)]
struct OutputArgs {
    /// Write the trade log to this CSV
    #[arg(long)]
    trades_out: Option<PathBuf>,

    /// Write a JSON summary to this file
    #[arg(long)]
    json: Option<PathBuf>,
}

#[derive(Args)]
struct BacktestArgs {
    /// Candle CSV: timestamp,open,high,low,close,volume
    #[arg(long)]
    data: PathBuf,

    /// Sentiment CSV: timestamp,sentiment_score (missing = neutral)
    #[arg(long)]
    sentiment: Option<PathBuf>,

    #[command(flatten)]
    rules: RulesArgs,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct SyntheticArgs {
    #[arg(long, value_enum, default_value_t = MarketScenario::Sideways)]
    scenario: MarketScenario,

    #[arg(long, default_value_t = 500)]
    candles: usize,

    #[arg(long, default_value_t = 60)]
    interval_minutes: i64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Save the generated candles
    #[arg(long)]
    out: Option<PathBuf>,

    /// Backtest the generated candles with neutral sentiment
    #[arg(long, default_value_t = false)]
    run: bool,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct SweepArgs {
    #[arg(long)]
    data: PathBuf,

    #[arg(long)]
    sentiment: Option<PathBuf>,

    #[arg(long, default_value_t = 50)]
    trials: usize,

    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Trials shown in the ranking table
    #[arg(long, default_value_t = 10)]
    top: usize,

    #[command(flatten)]
    rules: RulesArgs,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct FetchArgs {
    #[arg(long)]
    symbol: String,

    /// Binance interval, e.g. 1m, 15m, 1h, 1d
    #[arg(long, default_value = "1h")]
    interval: String,

    /// Start (epoch ms, RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    start: String,

    /// End, defaults to now
    #[arg(long)]
    end: Option<String>,

    #[arg(long)]
    out: PathBuf,
}

/// JSON summary of one run
#[derive(Serialize)]
struct RunSummary<'a> {
    symbol: &'a str,
    status: RunStatus,
    final_balance: f64,
    comparison_balance: f64,
    candles_processed: usize,
    rejections: usize,
    metrics: &'a gridbot::backtest::TradeStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let config = BacktestConfig::load(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Commands::Backtest(args) => backtest(config, args).await,
        Commands::Synthetic(args) => synthetic(config, args),
        Commands::Sweep(args) => sweep(config, args).await,
        Commands::Fetch(args) => fetch(args).await,
        Commands::Rules { symbol } => {
            let client = BinanceClient::new()?;
            let rules = client
                .symbol_rules(&symbol)
                .await
                .with_context(|| format!("Failed to fetch rules for {}", symbol))?;
            println!("{}", serde_json::to_string_pretty(&rules)?);
            Ok(())
        }
    }
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gridbot=info".into()),
        )
        .init();
}

async fn resolve_rules(args: &RulesArgs, symbol: &str) -> Result<SymbolRules> {
    if args.fetch_rules {
        let client = BinanceClient::new()?;
        return client
            .symbol_rules(symbol)
            .await
            .with_context(|| format!("Failed to fetch rules for {}", symbol));
    }

    let defaults = SymbolRules::default();
    Ok(SymbolRules {
        step_size: args.step_size.unwrap_or(defaults.step_size),
        min_notional: args.min_notional.unwrap_or(defaults.min_notional),
    })
}

fn load_sentiment(path: Option<&Path>) -> Result<SentimentSeries> {
    match path {
        Some(path) => persistence::load_sentiment_csv(path)
            .with_context(|| format!("Failed to load sentiment from {}", path.display())),
        None => Ok(SentimentSeries::neutral()),
    }
}

fn report(result: &SimulationResult, output: &OutputArgs) -> Result<()> {
    result.metrics.print_report();
    println!(
        "Status: {:?} after {} candles ({} rejected orders)\n",
        result.status,
        result.candles_processed,
        result.rejections.len()
    );

    if let Some(path) = &output.trades_out {
        persistence::write_trades_csv(path, &result.trades)
            .with_context(|| format!("Failed to write trades to {}", path.display()))?;
    }
    if let Some(path) = &output.json {
        let summary = RunSummary {
            symbol: &result.symbol,
            status: result.status,
            final_balance: result.final_balance,
            comparison_balance: result.comparison_balance(),
            candles_processed: result.candles_processed,
            rejections: result.rejections.len(),
            metrics: &result.metrics,
        };
        persistence::write_json(path, &summary)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
    }
    Ok(())
}

async fn backtest(config: BacktestConfig, args: BacktestArgs) -> Result<()> {
    let candles = persistence::load_candles_csv(&args.data)
        .with_context(|| format!("Failed to load candles from {}", args.data.display()))?;
    let sentiment = load_sentiment(args.sentiment.as_deref())?;
    let rules = resolve_rules(&args.rules, &config.symbol).await?;

    tracing::info!(
        "Backtesting {} over {} candles (rules: step {}, min notional {})",
        config.symbol,
        candles.len(),
        rules.step_size,
        rules.min_notional
    );

    let engine = BacktestEngine::new(config, rules)?;
    let result = engine.run(&candles, &sentiment)?;
    report(&result, &args.output)
}

fn synthetic(config: BacktestConfig, args: SyntheticArgs) -> Result<()> {
    let candles = SyntheticDataGenerator::new(args.seed).generate(
        args.scenario,
        args.candles,
        args.interval_minutes,
    );

    if let Some(path) = &args.out {
        persistence::write_candles_csv(path, &candles)
            .with_context(|| format!("Failed to write candles to {}", path.display()))?;
    }

    if args.run {
        let engine = BacktestEngine::new(config, SymbolRules::default())?;
        let result = engine.run(&candles, &SentimentSeries::neutral())?;
        report(&result, &args.output)?;
    } else if args.out.is_none() {
        tracing::warn!("Nothing to do: pass --out and/or --run");
    }
    Ok(())
}

async fn sweep(config: BacktestConfig, args: SweepArgs) -> Result<()> {
    let candles = persistence::load_candles_csv(&args.data)
        .with_context(|| format!("Failed to load candles from {}", args.data.display()))?;
    let sentiment = load_sentiment(args.sentiment.as_deref())?;
    let rules = resolve_rules(&args.rules, &config.symbol).await?;

    let options = SweepOptions {
        trials: args.trials,
        concurrency: args.concurrency,
        seed: args.seed,
    };
    let sweep_report = run_sweep(
        &config,
        rules,
        Arc::new(candles),
        Arc::new(sentiment),
        &options,
    )
    .await?;

    println!("\n{:<6} {:<20} {:>14} {:>8} {:>8}", "trial", "status", "balance", "trades", "max dd");
    for outcome in sweep_report.ranked.iter().take(args.top) {
        println!(
            "{:<6} {:<20} {:>14.2} {:>8} {:>7.2}%",
            outcome.trial,
            format!("{:?}", outcome.status),
            outcome.comparison_balance,
            outcome.closed_trades,
            outcome.max_drawdown_pct
        );
    }
    if sweep_report.failed > 0 {
        println!("{} trials failed", sweep_report.failed);
    }

    if let Some(path) = &args.output.json {
        persistence::write_json(path, &sweep_report.ranked)
            .with_context(|| format!("Failed to write ranking to {}", path.display()))?;
    }

    match &sweep_report.best {
        Some(best) => {
            println!("\nBest trial:");
            let output = OutputArgs {
                trades_out: args.output.trades_out.clone(),
                json: None,
            };
            report(best, &output)
        }
        None => {
            tracing::warn!("No trial completed");
            Ok(())
        }
    }
}

async fn fetch(args: FetchArgs) -> Result<()> {
    let start = persistence::parse_timestamp(&args.start)
        .with_context(|| format!("Unrecognised start time {:?}", args.start))?;
    let end = match &args.end {
        Some(raw) => persistence::parse_timestamp(raw)
            .with_context(|| format!("Unrecognised end time {:?}", raw))?,
        None => chrono::Utc::now(),
    };
    anyhow::ensure!(start < end, "start must be before end");

    let client = BinanceClient::new()?;
    let candles = client
        .klines(&args.symbol, &args.interval, start, end)
        .await
        .with_context(|| format!("Failed to download {} klines", args.symbol))?;

    persistence::write_candles_csv(&args.out, &candles)
        .with_context(|| format!("Failed to write candles to {}", args.out.display()))?;
    println!("Saved {} candles to {}", candles.len(), args.out.display());
    Ok(())
}

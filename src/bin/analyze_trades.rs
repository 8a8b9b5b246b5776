use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use gridbot::backtest::TradeStats;
use gridbot::persistence::read_trades_csv;

/// Recompute performance metrics from an exported trade log
#[derive(Parser)]
#[command(name = "analyze_trades", version)]
struct Cli {
    /// Trade CSV written by `gridbot backtest --trades-out`
    trades: PathBuf,

    /// Balance before the first trade
    #[arg(long, default_value_t = 10_000.0)]
    starting_balance: f64,

    /// Also print every trade
    #[arg(long, default_value_t = false)]
    list: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter("gridbot=warn")
        .init();

    let cli = Cli::parse();
    let trades = read_trades_csv(&cli.trades)
        .with_context(|| format!("Failed to read trades from {}", cli.trades.display()))?;

    if trades.is_empty() {
        eprintln!("No trades in {}", cli.trades.display());
        return Ok(());
    }

    println!("\n═══════════════════════════════════════════════════════");
    println!("         TRADE ANALYSIS: {}", trades[0].symbol);
    println!("═══════════════════════════════════════════════════════");
    println!(
        "Period: {} to {}",
        trades[0].timestamp,
        trades[trades.len() - 1].timestamp
    );

    let stats = TradeStats::from_trades(&trades, cli.starting_balance);
    stats.print_report();

    println!("═══════════════════════════════════════════════════════");
    println!("               EXIT REASON BREAKDOWN");
    println!("═══════════════════════════════════════════════════════\n");

    // (strategy, exit kind) -> (count, total pnl)
    let mut breakdown: BTreeMap<(String, String), (usize, f64)> = BTreeMap::new();
    for trade in trades.iter().filter(|t| t.kind.is_exit()) {
        let key = (format!("{:?}", trade.strategy), format!("{:?}", trade.kind));
        let entry = breakdown.entry(key).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += trade.realized_profit_loss;
    }

    for ((strategy, kind), (count, total_pnl)) in &breakdown {
        let avg_pnl = total_pnl / *count as f64;
        println!(
            "{:<10} {:<16} {:>3} trades | Avg: ${:+8.2} | Total: ${:+9.2}",
            strategy, kind, count, avg_pnl, total_pnl
        );
    }

    if cli.list {
        println!("\n═══════════════════════════════════════════════════════");
        println!("                DETAILED TRADE LIST");
        println!("═══════════════════════════════════════════════════════\n");
        println!(
            "{:<5} {:<17} {:<10} {:<16} {:>12} {:>12} {:>10} {:>12}",
            "#", "Time", "Strategy", "Kind", "Price", "Qty", "P&L", "Balance"
        );
        println!("{}", "─".repeat(100));

        for (i, trade) in trades.iter().enumerate() {
            println!(
                "{:<5} {:<17} {:<10} {:<16} {:>12.4} {:>12.6} {:>+10.2} {:>12.2}",
                i + 1,
                trade.timestamp.format("%Y-%m-%d %H:%M"),
                format!("{:?}", trade.strategy),
                format!("{:?}", trade.kind),
                trade.price,
                trade.quantity,
                trade.realized_profit_loss,
                trade.balance_after
            );
        }
    }

    Ok(())
}

use serde::{Deserialize, Serialize};

use crate::models::{TradeKind, TradeRecord};

/// Per-run trade statistics
///
/// Owned by a single run and fed every trade record plus each equity
/// observation. Cloning it gives the metrics snapshot returned with the result.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TradeStats {
    // P&L
    pub starting_balance: f64,
    pub final_balance: f64,
    pub gross_profit: f64,
    pub gross_loss: f64, // magnitude, always >= 0
    pub total_fees: f64,

    // Trade counts
    pub entries: usize,
    pub closed_trades: usize,
    pub wins: usize,
    pub losses: usize,

    // Distribution
    pub largest_win: f64,
    pub largest_loss: f64, // most negative P&L, 0 with no losses
    pub longest_win_streak: usize,
    pub longest_loss_streak: usize,

    // Exit breakdown
    pub take_profits: usize,
    pub stop_losses: usize,
    pub invalidations: usize,
    pub circuit_breaker_exits: usize,
    pub end_of_data_exits: usize,

    // Risk
    pub peak_equity: f64,
    pub max_drawdown_pct: f64,

    #[serde(skip)]
    win_streak: usize,
    #[serde(skip)]
    loss_streak: usize,
}

impl TradeStats {
    pub fn new(starting_balance: f64) -> Self {
        Self {
            starting_balance,
            final_balance: starting_balance,
            peak_equity: starting_balance,
            ..Self::default()
        }
    }

    /// Recompute statistics from a finished trade log
    ///
    /// Equity is sampled at each exit's `balance_after`, where the account is
    /// flat and cash equals equity, so drawdown is exit-to-exit only.
    pub fn from_trades(trades: &[TradeRecord], starting_balance: f64) -> Self {
        let mut stats = Self::new(starting_balance);
        let mut final_balance = starting_balance;

        for trade in trades {
            stats.record_trade(trade);
            if trade.kind.is_exit() {
                stats.observe_equity(trade.balance_after);
                final_balance = trade.balance_after;
            }
        }

        stats.finish(final_balance);
        stats
    }

    pub fn record_trade(&mut self, trade: &TradeRecord) {
        self.total_fees += trade.fee;

        match trade.kind {
            TradeKind::Entry => {
                self.entries += 1;
                return;
            }
            TradeKind::TakeProfit => self.take_profits += 1,
            TradeKind::StopLoss => self.stop_losses += 1,
            TradeKind::Invalidation => self.invalidations += 1,
            TradeKind::CircuitBreaker => self.circuit_breaker_exits += 1,
            TradeKind::EndOfData => self.end_of_data_exits += 1,
        }

        self.closed_trades += 1;
        let pnl = trade.realized_profit_loss;

        if pnl > 0.0 {
            self.wins += 1;
            self.gross_profit += pnl;
            self.largest_win = self.largest_win.max(pnl);
            self.win_streak += 1;
            self.loss_streak = 0;
        } else if pnl < 0.0 {
            self.losses += 1;
            self.gross_loss += -pnl;
            self.largest_loss = self.largest_loss.min(pnl);
            self.loss_streak += 1;
            self.win_streak = 0;
        } else {
            // breakeven ends both streaks
            self.win_streak = 0;
            self.loss_streak = 0;
        }

        self.longest_win_streak = self.longest_win_streak.max(self.win_streak);
        self.longest_loss_streak = self.longest_loss_streak.max(self.loss_streak);
    }

    /// Feed a marked-to-market equity value
    pub fn observe_equity(&mut self, equity: f64) {
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
        if self.peak_equity > 0.0 {
            let drawdown = (self.peak_equity - equity) / self.peak_equity * 100.0;
            self.max_drawdown_pct = self.max_drawdown_pct.max(drawdown);
        }
    }

    pub fn finish(&mut self, final_balance: f64) {
        self.final_balance = final_balance;
    }

    pub fn net_profit(&self) -> f64 {
        self.gross_profit - self.gross_loss
    }

    pub fn win_rate(&self) -> f64 {
        if self.closed_trades > 0 {
            self.wins as f64 / self.closed_trades as f64 * 100.0
        } else {
            0.0
        }
    }

    /// Gross profit over gross loss; `+inf` when there are wins and no losses
    pub fn profit_factor(&self) -> f64 {
        if self.gross_loss > 0.0 {
            self.gross_profit / self.gross_loss
        } else if self.gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }

    pub fn avg_win(&self) -> f64 {
        if self.wins > 0 {
            self.gross_profit / self.wins as f64
        } else {
            0.0
        }
    }

    /// Average loss magnitude
    pub fn avg_loss(&self) -> f64 {
        if self.losses > 0 {
            self.gross_loss / self.losses as f64
        } else {
            0.0
        }
    }

    pub fn total_return_pct(&self) -> f64 {
        if self.starting_balance > 0.0 {
            (self.final_balance - self.starting_balance) / self.starting_balance * 100.0
        } else {
            0.0
        }
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║              BACKTEST PERFORMANCE REPORT              ║");
        println!("╚═══════════════════════════════════════════════════════╝\n");

        println!("📊 P&L SUMMARY");
        println!("  Starting Balance:      ${:.2}", self.starting_balance);
        println!("  Final Balance:         ${:.2}", self.final_balance);
        println!(
            "  Net P&L:               ${:.2} ({:+.2}%)",
            self.final_balance - self.starting_balance,
            self.total_return_pct()
        );
        println!("  Total Fees:            ${:.2}", self.total_fees);

        println!("\n📈 TRADE STATISTICS");
        println!("  Entries:               {}", self.entries);
        println!("  Closed Trades:         {}", self.closed_trades);
        println!(
            "  Winning Trades:        {} ({:.1}%)",
            self.wins,
            self.win_rate()
        );
        println!("  Losing Trades:         {}", self.losses);

        if self.closed_trades > 0 {
            println!("\n💰 WIN/LOSS ANALYSIS");
            println!("  Gross Profit:          ${:.2}", self.gross_profit);
            println!("  Gross Loss:            ${:.2}", self.gross_loss);
            println!("  Average Win:           ${:.2}", self.avg_win());
            println!("  Average Loss:          ${:.2}", self.avg_loss());
            println!("  Largest Win:           ${:.2}", self.largest_win);
            println!("  Largest Loss:          ${:.2}", self.largest_loss);
            println!("  Profit Factor:         {:.2}", self.profit_factor());
            println!("  Longest Win Streak:    {}", self.longest_win_streak);
            println!("  Longest Loss Streak:   {}", self.longest_loss_streak);

            println!("\n🚪 EXITS");
            println!("  Take Profit:           {}", self.take_profits);
            println!("  Stop Loss:             {}", self.stop_losses);
            println!("  Grid Invalidation:     {}", self.invalidations);
            println!("  Circuit Breaker:       {}", self.circuit_breaker_exits);
            println!("  End of Data:           {}", self.end_of_data_exits);
        }

        println!("\n⚠️  RISK METRICS");
        println!("  Peak Equity:           ${:.2}", self.peak_equity);
        println!("  Max Drawdown:          {:.2}%", self.max_drawdown_pct);

        println!("\n═══════════════════════════════════════════════════════\n");
    }
}

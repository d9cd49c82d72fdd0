//! Paper trader — simulated execution against a persisted portfolio.
//!
//! Buying debits the stake immediately. Settlement follows the $1-payout
//! share model: a winner returns `stake / entry_price`, a loser returns
//! nothing. The portfolio is saved after every mutation; a failed save is
//! logged and the in-memory state is kept.

use chrono::Utc;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

use crate::storage::PortfolioStore;
use crate::types::{BotError, Direction, Market, Portfolio, TradeRecord, TradeStatus};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Result of a settlement request. Unknown and repeated settlements are
/// reported, not raised.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    Settled(TradeRecord),
    NotFound,
    AlreadySettled(TradeStatus),
}

/// Portfolio snapshot for logs and the shutdown report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub initial_balance: f64,
    pub current_balance: f64,
    pub total_pnl: f64,
    pub total_pnl_pct: f64,
    pub total_trades: usize,
    pub settled_trades: usize,
    /// Fraction of WON among settled WON/LOST trades.
    pub win_rate: f64,
    pub open_positions: usize,
}

impl fmt::Display for PortfolioSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "balance ${:.2} (start ${:.2}) | PnL ${:+.2} ({:+.1}%) | {} trades, {} settled, {} open | win rate {:.1}%",
            self.current_balance,
            self.initial_balance,
            self.total_pnl,
            self.total_pnl_pct,
            self.total_trades,
            self.settled_trades,
            self.open_positions,
            self.win_rate * 100.0,
        )
    }
}

// ---------------------------------------------------------------------------
// Paper trader
// ---------------------------------------------------------------------------

pub struct PaperTrader {
    portfolio: Portfolio,
    store: Box<dyn PortfolioStore>,
    trade_counter: usize,
}

impl PaperTrader {
    /// Load the saved portfolio, or start fresh with `initial_balance`.
    ///
    /// An unreadable store is not fatal: the trader starts fresh and warns.
    pub fn new(store: Box<dyn PortfolioStore>, initial_balance: f64) -> Self {
        let portfolio = match store.load() {
            Ok(Some(portfolio)) => portfolio,
            Ok(None) => Portfolio::new(initial_balance),
            Err(e) => {
                warn!(error = %e, "Failed to load portfolio, starting fresh");
                Portfolio::new(initial_balance)
            }
        };
        let trade_counter = portfolio.trades.len();

        info!(
            balance = format!("${:.2}", portfolio.current_balance),
            trades = trade_counter,
            "Paper trader initialised"
        );

        Self {
            portfolio,
            store,
            trade_counter,
        }
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn balance(&self) -> f64 {
        self.portfolio.current_balance
    }

    /// Simulate buying the outcome token matching `direction`.
    ///
    /// Fails without touching the portfolio if the direction is neutral,
    /// the token price is outside (0, 1], or the stake exceeds the balance.
    pub fn execute_trade(
        &mut self,
        market: &Market,
        direction: Direction,
        amount_usd: f64,
        spot_price: f64,
    ) -> Result<TradeRecord, BotError> {
        let (outcome, token_id, entry_price) = market
            .target_for(direction)
            .ok_or_else(|| BotError::Schema("cannot trade a NEUTRAL direction".into()))?;

        if !(entry_price > 0.0 && entry_price <= 1.0) {
            return Err(BotError::Schema(format!(
                "{outcome} price {entry_price} for market {} is outside (0, 1]",
                market.id
            )));
        }
        if !(amount_usd > 0.0 && amount_usd.is_finite()) {
            return Err(BotError::Schema(format!("stake must be positive, got {amount_usd}")));
        }
        if amount_usd > self.portfolio.current_balance {
            return Err(BotError::InsufficientFunds {
                needed: amount_usd,
                available: self.portfolio.current_balance,
            });
        }

        self.trade_counter += 1;
        let trade = TradeRecord {
            id: format!("paper_{:06}", self.trade_counter),
            timestamp: Utc::now(),
            market_id: market.id.clone(),
            market_question: market.question.clone(),
            token_id: token_id.to_string(),
            outcome,
            prediction: direction,
            amount_usd,
            entry_price,
            spot_price_at_entry: spot_price,
            status: TradeStatus::Open,
            exit_price: None,
            pnl: None,
            settled_at: None,
        };

        self.portfolio.current_balance -= amount_usd;
        self.portfolio.trades.push(trade.clone());
        self.persist();

        info!(
            trade_id = %trade.id,
            market = %trade.market_question,
            outcome = %outcome,
            prediction = %direction,
            amount = format!("${amount_usd:.2}"),
            entry_price = format!("{entry_price:.4}"),
            btc_price = format!("${spot_price:.2}"),
            balance = format!("${:.2}", self.portfolio.current_balance),
            "PAPER TRADE EXECUTED"
        );

        Ok(trade)
    }

    /// Settle an open trade. `exit_price` defaults to 1.0 for a win and
    /// 0.0 for a loss.
    pub fn settle_trade(
        &mut self,
        trade_id: &str,
        won: bool,
        exit_price: Option<f64>,
    ) -> SettlementOutcome {
        let Some(trade) = self.portfolio.find_trade_mut(trade_id) else {
            warn!(trade_id, "Trade not found, nothing to settle");
            return SettlementOutcome::NotFound;
        };

        if trade.status.is_settled() {
            warn!(trade_id, status = %trade.status, "Trade already settled");
            return SettlementOutcome::AlreadySettled(trade.status);
        }

        let pnl = if won {
            trade.shares() - trade.amount_usd
        } else {
            -trade.amount_usd
        };
        trade.status = if won { TradeStatus::Won } else { TradeStatus::Lost };
        trade.exit_price = Some(exit_price.unwrap_or(if won { 1.0 } else { 0.0 }));
        trade.pnl = Some(pnl);
        trade.settled_at = Some(Utc::now());
        let settled = trade.clone();

        self.portfolio.current_balance += settled.amount_usd + pnl;
        self.persist();

        info!(
            trade_id,
            status = %settled.status,
            pnl = format!("${pnl:+.2}"),
            balance = format!("${:.2}", self.portfolio.current_balance),
            "TRADE SETTLED"
        );

        SettlementOutcome::Settled(settled)
    }

    pub fn summary(&self) -> PortfolioSummary {
        let p = &self.portfolio;
        PortfolioSummary {
            initial_balance: p.initial_balance,
            current_balance: p.current_balance,
            total_pnl: p.total_pnl(),
            total_pnl_pct: p.total_pnl_pct(),
            total_trades: p.trades.len(),
            settled_trades: p.settled_count(),
            win_rate: p.win_rate(),
            open_positions: p.open_positions().count(),
        }
    }

    pub fn open_positions(&self) -> Vec<&TradeRecord> {
        self.portfolio.open_positions().collect()
    }

    /// Newest first, at most `limit`.
    pub fn recent_trades(&self, limit: usize) -> Vec<&TradeRecord> {
        let mut trades: Vec<&TradeRecord> = self.portfolio.trades.iter().collect();
        trades.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        trades.truncate(limit);
        trades
    }

    /// Save the portfolio now. Used at shutdown.
    pub fn flush(&self) -> Result<(), BotError> {
        self.store.save(&self.portfolio)
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.portfolio) {
            warn!(error = %e, "Failed to save portfolio, keeping in-memory state");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

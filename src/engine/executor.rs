//! Trade executor.
//!
//! Gates each signal on direction, confidence and the daily trade cap, then
//! buys the outcome token matching the predicted direction, either against
//! the paper portfolio or on the live venue. Live venue errors become a
//! FAILED outcome and never propagate.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

use crate::config::TradingConfig;
use crate::engine::paper::{PaperTrader, SettlementOutcome};
use crate::platforms::{OrderReceipt, OrderRequest, TradingVenue};
use crate::strategy::scoring::CompositeSignal;
use crate::types::{BotError, Direction, Market, Side, TradeRecord, TradingMode};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a signal did not become a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NeutralSignal,
    LowConfidence,
    DailyLimitReached,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NeutralSignal => write!(f, "neutral_signal"),
            SkipReason::LowConfidence => write!(f, "low_confidence"),
            SkipReason::DailyLimitReached => write!(f, "daily_limit_reached"),
        }
    }
}

/// What the executor did with one signal.
#[derive(Debug)]
pub enum TradeOutcome {
    Skipped(SkipReason),
    /// Paper fill.
    Simulated(TradeRecord),
    /// Live order accepted by the venue.
    Submitted {
        order: OrderRequest,
        receipt: OrderReceipt,
    },
    Failed {
        mode: TradingMode,
        error: BotError,
    },
}

impl TradeOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, TradeOutcome::Simulated(_) | TradeOutcome::Submitted { .. })
    }

    pub fn status(&self) -> &'static str {
        match self {
            TradeOutcome::Skipped(_) => "SKIPPED",
            TradeOutcome::Simulated(_) | TradeOutcome::Submitted { .. } => "EXECUTED",
            TradeOutcome::Failed { .. } => "FAILED",
        }
    }
}

impl fmt::Display for TradeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeOutcome::Skipped(reason) => write!(f, "SKIPPED ({reason})"),
            TradeOutcome::Simulated(trade) => write!(f, "EXECUTED [PAPER] {trade}"),
            TradeOutcome::Submitted { order, receipt } => {
                write!(f, "EXECUTED [LIVE] {order} -> order {} ({})", receipt.order_id, receipt.status)
            }
            TradeOutcome::Failed { mode, error } => write!(f, "FAILED [{mode}] {error}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Where executed trades go.
pub enum ExecutionStrategy {
    Paper(PaperTrader),
    Live(Box<dyn TradingVenue>),
}

impl ExecutionStrategy {
    pub fn mode(&self) -> TradingMode {
        match self {
            ExecutionStrategy::Paper(_) => TradingMode::Paper,
            ExecutionStrategy::Live(_) => TradingMode::Live,
        }
    }
}

pub struct TradeExecutor {
    strategy: ExecutionStrategy,
    trade_amount_usd: f64,
    min_confidence: f64,
    max_daily_trades: u32,
    daily_trades: u32,
    /// UTC day the counter belongs to; `None` until the first roll.
    trading_day: Option<NaiveDate>,
}

impl TradeExecutor {
    pub fn new(strategy: ExecutionStrategy, config: &TradingConfig) -> Self {
        Self {
            strategy,
            trade_amount_usd: config.trade_amount_usd,
            min_confidence: config.min_score_threshold,
            max_daily_trades: config.max_daily_trades,
            daily_trades: 0,
            trading_day: None,
        }
    }

    pub fn mode(&self) -> TradingMode {
        self.strategy.mode()
    }

    pub fn daily_trades(&self) -> u32 {
        self.daily_trades
    }

    /// The paper trader, when running in paper mode.
    pub fn paper(&self) -> Option<&PaperTrader> {
        match &self.strategy {
            ExecutionStrategy::Paper(trader) => Some(trader),
            ExecutionStrategy::Live(_) => None,
        }
    }

    /// Gate, then execute. Only an EXECUTED outcome bumps the daily counter.
    pub async fn execute(
        &mut self,
        market: &Market,
        signal: &CompositeSignal,
        spot_price: f64,
    ) -> TradeOutcome {
        if let Some(reason) = self.gate(signal) {
            return TradeOutcome::Skipped(reason);
        }

        let outcome = match &mut self.strategy {
            ExecutionStrategy::Paper(trader) => {
                match trader.execute_trade(market, signal.direction, self.trade_amount_usd, spot_price) {
                    Ok(trade) => TradeOutcome::Simulated(trade),
                    Err(e) => {
                        error!(market_id = %market.id, error = %e, "Paper trade failed");
                        TradeOutcome::Failed {
                            mode: TradingMode::Paper,
                            error: e,
                        }
                    }
                }
            }
            ExecutionStrategy::Live(venue) => {
                Self::execute_live(venue.as_ref(), market, signal.direction, self.trade_amount_usd).await
            }
        };

        if outcome.is_executed() {
            self.daily_trades += 1;
            info!(
                daily_trades = self.daily_trades,
                max = self.max_daily_trades,
                confidence = format!("{:.2}", signal.confidence),
                reasoning = %signal.reasoning,
                "Trade executed"
            );
        }
        outcome
    }

    fn gate(&self, signal: &CompositeSignal) -> Option<SkipReason> {
        if signal.direction == Direction::Neutral {
            info!("Signal is NEUTRAL, skipping trade");
            return Some(SkipReason::NeutralSignal);
        }
        if signal.confidence < self.min_confidence {
            info!(
                confidence = format!("{:.2}", signal.confidence),
                threshold = self.min_confidence,
                "Confidence below threshold, skipping trade"
            );
            return Some(SkipReason::LowConfidence);
        }
        if self.daily_trades >= self.max_daily_trades {
            warn!(
                daily_trades = self.daily_trades,
                max = self.max_daily_trades,
                "Daily trade limit reached"
            );
            return Some(SkipReason::DailyLimitReached);
        }
        None
    }

    async fn execute_live(
        venue: &dyn TradingVenue,
        market: &Market,
        direction: Direction,
        amount_usd: f64,
    ) -> TradeOutcome {
        let Some((side, token_id, price)) = market.target_for(direction) else {
            return TradeOutcome::Failed {
                mode: TradingMode::Live,
                error: BotError::Schema("cannot trade a NEUTRAL direction".into()),
            };
        };

        let order = OrderRequest {
            token_id: token_id.to_string(),
            side,
            amount_usd,
            price,
        };

        match venue.submit_order(&order).await {
            Ok(receipt) => {
                info!(
                    venue = venue.name(),
                    order_id = %receipt.order_id,
                    status = %receipt.status,
                    outcome = %side_label(side),
                    "Live order accepted"
                );
                TradeOutcome::Submitted { order, receipt }
            }
            Err(e) => {
                let error = match e {
                    BotError::Venue(_) => e,
                    other => BotError::Venue(other.to_string()),
                };
                error!(venue = venue.name(), market_id = %market.id, error = %error, "Live order failed");
                TradeOutcome::Failed {
                    mode: TradingMode::Live,
                    error,
                }
            }
        }
    }

    /// Zero the daily counter. Portfolio and history are untouched.
    pub fn reset_daily_counter(&mut self) {
        info!(was = self.daily_trades, "Resetting daily trade counter");
        self.daily_trades = 0;
    }

    /// Move the counter onto `day`, resetting it if the day changed.
    ///
    /// Idempotent per day, so the midnight timer and the first cycle of a
    /// new day may both call it in either order. Returns whether a reset
    /// happened.
    pub fn roll_day(&mut self, day: NaiveDate) -> bool {
        match self.trading_day {
            // A clock stepping backwards never reopens an earlier day.
            Some(current) if day <= current => false,
            Some(_) => {
                self.reset_daily_counter();
                self.trading_day = Some(day);
                true
            }
            None => {
                self.trading_day = Some(day);
                false
            }
        }
    }

    /// Settle a paper trade. Live mode has nothing to settle locally.
    pub fn settle_trade(&mut self, trade_id: &str, won: bool) -> SettlementOutcome {
        match &mut self.strategy {
            ExecutionStrategy::Paper(trader) => trader.settle_trade(trade_id, won, None),
            ExecutionStrategy::Live(_) => {
                warn!(trade_id, "Settlement requested in live mode, ignoring");
                SettlementOutcome::NotFound
            }
        }
    }

    /// Persist any local state. Used at shutdown.
    pub fn flush(&self) -> Result<(), BotError> {
        match &self.strategy {
            ExecutionStrategy::Paper(trader) => trader.flush(),
            ExecutionStrategy::Live(_) => Ok(()),
        }
    }
}

fn side_label(side: Side) -> &'static str {
    match side {
        Side::Yes => "YES (predict UP)",
        Side::No => "NO (predict DOWN)",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

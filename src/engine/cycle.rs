//! Cycle orchestrator — one pass of fetch → analyse → discover → select →
//! execute.
//!
//! `TradingBot` owns every collaborator for the life of the process. The
//! caller drives it: `run_cycle` on each tick, `roll_day` at midnight,
//! `settle_trade` when a market resolves. Cycles must not overlap;
//! `&mut self` enforces that.
//!
//! A cycle also rolls the daily counter onto its own UTC day before
//! executing, so the first cycle of a day never sees yesterday's count
//! even if it runs before the midnight timer fires.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::engine::executor::{TradeExecutor, TradeOutcome};
use crate::engine::paper::SettlementOutcome;
use crate::engine::selector::MarketSelector;
use crate::platforms::{CandleSource, MarketFilter, MarketSource};
use crate::strategy::scoring::CompositeSignal;
use crate::strategy::SignalPipeline;
use crate::types::{CycleError, Market, Stage};

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// Final status of a cycle that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleStatus {
    NoMarkets,
    NoSuitableMarket,
    Skipped,
    Executed,
    Failed,
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleStatus::NoMarkets => write!(f, "NO_MARKETS"),
            CycleStatus::NoSuitableMarket => write!(f, "NO_SUITABLE_MARKET"),
            CycleStatus::Skipped => write!(f, "SKIPPED"),
            CycleStatus::Executed => write!(f, "EXECUTED"),
            CycleStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Summary of one completed cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub cycle_number: u64,
    pub timestamp: DateTime<Utc>,
    pub spot_price: f64,
    pub signal: CompositeSignal,
    pub markets_found: usize,
    pub selected_market: Option<Market>,
    pub outcome: Option<TradeOutcome>,
    pub status: CycleStatus,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cycle #{} {} | BTC ${:.2} | {} conf {:.2} | {} markets",
            self.cycle_number,
            self.status,
            self.spot_price,
            self.signal.direction,
            self.signal.confidence,
            self.markets_found,
        )?;
        if let Some(market) = &self.selected_market {
            write!(f, " | {}", market.question)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Trading bot
// ---------------------------------------------------------------------------

pub struct TradingBot {
    candles: Box<dyn CandleSource>,
    markets: Box<dyn MarketSource>,
    pipeline: SignalPipeline,
    selector: MarketSelector,
    executor: TradeExecutor,
    symbol: String,
    candle_interval: String,
    candle_count: usize,
    market_filter: MarketFilter,
    cycle_count: u64,
}

impl TradingBot {
    pub fn new(
        config: &AppConfig,
        candles: Box<dyn CandleSource>,
        markets: Box<dyn MarketSource>,
        executor: TradeExecutor,
    ) -> Self {
        Self {
            candles,
            markets,
            pipeline: SignalPipeline::from_config(config),
            selector: MarketSelector,
            executor,
            symbol: config.binance.symbol.clone(),
            candle_interval: config.indicators.candle_interval.clone(),
            candle_count: config.indicators.candle_count,
            market_filter: MarketFilter {
                limit: config.polymarket.market_limit,
            },
            cycle_count: 0,
        }
    }

    pub fn executor(&self) -> &TradeExecutor {
        &self.executor
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// Run one trading cycle at the current wall-clock time.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one trading cycle, judging market timing against `now`.
    ///
    /// Every error is tagged with the stage that produced it; no state is
    /// mutated before execution, so a failed cycle leaves nothing behind.
    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        // Only cycles that produce a report are numbered.
        let cycle_number = self.cycle_count + 1;
        info!(cycle = cycle_number, mode = %self.executor.mode(), "Starting trading cycle");

        let series = self
            .candles
            .fetch_candles(&self.symbol, &self.candle_interval, self.candle_count)
            .await
            .map_err(|e| CycleError::new(Stage::FetchCandles, e))?;

        let spot_price = self
            .candles
            .fetch_spot_price(&self.symbol)
            .await
            .map_err(|e| CycleError::new(Stage::FetchSpotPrice, e))?;

        let analysis = self
            .pipeline
            .analyze(&series)
            .map_err(|e| CycleError::new(Stage::Indicators, e))?;
        let signal = analysis.signal;

        let markets = self
            .markets
            .list_active_markets(&self.market_filter)
            .await
            .map_err(|e| CycleError::new(Stage::MarketDiscovery, e))?;

        self.cycle_count = cycle_number;
        let mut report = CycleReport {
            cycle_number,
            timestamp: now,
            spot_price,
            signal,
            markets_found: markets.len(),
            selected_market: None,
            outcome: None,
            status: CycleStatus::NoMarkets,
        };

        if markets.is_empty() {
            warn!(cycle = cycle_number, "No active Bitcoin markets found");
            return Ok(report);
        }

        let Some(market) = self.selector.select(&markets, now).cloned() else {
            warn!(cycle = cycle_number, markets = markets.len(), "No suitable market found");
            report.status = CycleStatus::NoSuitableMarket;
            return Ok(report);
        };

        self.roll_day(now);
        let outcome = self.executor.execute(&market, &report.signal, spot_price).await;
        report.status = match &outcome {
            TradeOutcome::Skipped(_) => CycleStatus::Skipped,
            TradeOutcome::Failed { .. } => CycleStatus::Failed,
            TradeOutcome::Simulated(_) | TradeOutcome::Submitted { .. } => CycleStatus::Executed,
        };
        report.selected_market = Some(market);
        report.outcome = Some(outcome);

        info!(cycle = cycle_number, status = %report.status, "Cycle complete");
        Ok(report)
    }

    pub fn reset_daily_counter(&mut self) {
        self.executor.reset_daily_counter();
    }

    /// Reset the daily counter if `now` falls on a later UTC day than the
    /// counter's. Safe to call any number of times.
    pub fn roll_day(&mut self, now: DateTime<Utc>) -> bool {
        self.executor.roll_day(now.date_naive())
    }

    pub fn settle_trade(&mut self, trade_id: &str, won: bool) -> SettlementOutcome {
        self.executor.settle_trade(trade_id, won)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Shared types for the BTC oracle bot.
//!
//! These types form the data model used across all modules: candle data,
//! prediction markets, trade records, the paper portfolio, and the error
//! taxonomy surfaced by each pipeline stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Candles
// ---------------------------------------------------------------------------

/// A single OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// An ordered, validated candle series for one cycle.
///
/// Non-empty, strictly increasing in time, every price/volume finite.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    /// Validate and wrap a candle list.
    pub fn new(candles: Vec<Candle>) -> Result<Self, BotError> {
        if candles.is_empty() {
            return Err(BotError::Schema("candle series is empty".into()));
        }

        for (i, c) in candles.iter().enumerate() {
            let fields = [c.open, c.high, c.low, c.close, c.volume];
            if fields.iter().any(|v| !v.is_finite()) {
                return Err(BotError::Schema(format!(
                    "candle {i} has a non-finite price or volume"
                )));
            }
            if i > 0 && c.open_time <= candles[i - 1].open_time {
                return Err(BotError::Schema(format!(
                    "candle {i} is not strictly after its predecessor ({} <= {})",
                    c.open_time,
                    candles[i - 1].open_time
                )));
            }
        }

        Ok(Self { candles })
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    /// Always false for a constructed series; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    /// Close prices in time order.
    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// The most recent candle.
    pub fn last(&self) -> &Candle {
        // Non-empty by construction.
        &self.candles[self.candles.len() - 1]
    }
}

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// Maximum YES+NO deviation from 1.0 for a market to count as liquid.
pub const MAX_LIQUID_SPREAD: f64 = 0.10;

/// A binary Bitcoin prediction market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    /// Condition ID on Polymarket.
    pub id: String,
    pub question: String,
    pub description: String,
    pub yes_token_id: String,
    pub no_token_id: String,
    /// Resolution time; `None` when the source date could not be parsed.
    pub end_date: Option<DateTime<Utc>>,
    /// Current YES price (0.0–1.0)
    pub yes_price: f64,
    /// Current NO price (0.0–1.0)
    pub no_price: f64,
    pub volume: f64,
    pub liquidity: f64,
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (YES: {:.1}¢ | NO: {:.1}¢ | spread: {:.2}% | vol: ${:.0})",
            self.question,
            self.yes_price * 100.0,
            self.no_price * 100.0,
            self.spread() * 100.0,
            self.volume,
        )
    }
}

impl Market {
    /// Deviation of YES + NO from 1.0.
    pub fn spread(&self) -> f64 {
        (self.yes_price + self.no_price - 1.0).abs()
    }

    pub fn is_liquid(&self) -> bool {
        self.spread() < MAX_LIQUID_SPREAD
    }

    /// Time remaining until resolution, if the resolution time is known.
    pub fn time_to_resolution(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.end_date.map(|end| end - now)
    }

    /// Token and price to buy for a predicted direction.
    /// Returns `None` for a neutral direction.
    pub fn target_for(&self, direction: Direction) -> Option<(Side, &str, f64)> {
        match direction {
            Direction::Up => Some((Side::Yes, self.yes_token_id.as_str(), self.yes_price)),
            Direction::Down => Some((Side::No, self.no_token_id.as_str(), self.no_price)),
            Direction::Neutral => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Outcome token side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Yes,
    No,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

/// Predicted BTC price direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
    Neutral,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
            Direction::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Paper vs. real-money execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Paper,
    Live,
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingMode::Paper => write!(f, "PAPER"),
            TradingMode::Live => write!(f, "LIVE"),
        }
    }
}

/// Lifecycle of a trade record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Open,
    Won,
    Lost,
    Expired,
}

impl TradeStatus {
    pub fn is_settled(&self) -> bool {
        !matches!(self, TradeStatus::Open)
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeStatus::Open => write!(f, "OPEN"),
            TradeStatus::Won => write!(f, "WON"),
            TradeStatus::Lost => write!(f, "LOST"),
            TradeStatus::Expired => write!(f, "EXPIRED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Trade records & portfolio
// ---------------------------------------------------------------------------

/// A simulated trade. Mutated only by settlement, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub market_id: String,
    pub market_question: String,
    pub token_id: String,
    pub outcome: Side,
    pub prediction: Direction,
    pub amount_usd: f64,
    pub entry_price: f64,
    pub spot_price_at_entry: f64,
    pub status: TradeStatus,
    #[serde(default)]
    pub exit_price: Option<f64>,
    #[serde(default)]
    pub pnl: Option<f64>,
    #[serde(default)]
    pub settled_at: Option<DateTime<Utc>>,
}

impl fmt::Display for TradeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} ${:.2} @ {:.2}¢ ({})",
            self.id,
            self.outcome,
            self.market_question,
            self.amount_usd,
            self.entry_price * 100.0,
            self.status,
        )?;
        if let Some(pnl) = self.pnl {
            write!(f, " pnl={pnl:+.2}")?;
        }
        Ok(())
    }
}

impl TradeRecord {
    /// Shares bought at entry under the $1-payout model.
    pub fn shares(&self) -> f64 {
        self.amount_usd / self.entry_price
    }
}

/// Paper trading portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub initial_balance: f64,
    pub current_balance: f64,
    #[serde(default)]
    pub trades: Vec<TradeRecord>,
}

impl fmt::Display for Portfolio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "balance=${:.2} | PnL=${:+.2} ({:+.1}%) | trades={} (open {}) | win_rate={:.1}%",
            self.current_balance,
            self.total_pnl(),
            self.total_pnl_pct(),
            self.trades.len(),
            self.open_positions().count(),
            self.win_rate() * 100.0,
        )
    }
}

impl Portfolio {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            initial_balance,
            current_balance: initial_balance,
            trades: Vec::new(),
        }
    }

    pub fn total_pnl(&self) -> f64 {
        self.current_balance - self.initial_balance
    }

    pub fn total_pnl_pct(&self) -> f64 {
        if self.initial_balance == 0.0 {
            0.0
        } else {
            self.total_pnl() / self.initial_balance * 100.0
        }
    }

    /// Fraction of WON among WON + LOST trades. 0.0 if none settled.
    pub fn win_rate(&self) -> f64 {
        let won = self.trades.iter().filter(|t| t.status == TradeStatus::Won).count();
        let lost = self.trades.iter().filter(|t| t.status == TradeStatus::Lost).count();
        if won + lost == 0 {
            0.0
        } else {
            won as f64 / (won + lost) as f64
        }
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &TradeRecord> {
        self.trades.iter().filter(|t| t.status == TradeStatus::Open)
    }

    pub fn settled_count(&self) -> usize {
        self.trades.iter().filter(|t| t.status.is_settled()).count()
    }

    pub fn find_trade_mut(&mut self, trade_id: &str) -> Option<&mut TradeRecord> {
        self.trades.iter_mut().find(|t| t.id == trade_id)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain error taxonomy for the trading pipeline.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Insufficient data: need at least {needed} candles, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Insufficient funds: need ${needed:.2}, have ${available:.2}")]
    InsufficientFunds { needed: f64, available: f64 },

    #[error("Venue error: {0}")]
    Venue(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data source error ({source_name}): {message}")]
    DataSource { source_name: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl BotError {
    pub fn data_source(source_name: &str, message: impl fmt::Display) -> Self {
        BotError::DataSource {
            source_name: source_name.to_string(),
            message: message.to_string(),
        }
    }
}

/// Pipeline stage that produced a cycle error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    FetchCandles,
    FetchSpotPrice,
    Indicators,
    MarketDiscovery,
    Execution,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::FetchCandles => write!(f, "fetch_candles"),
            Stage::FetchSpotPrice => write!(f, "fetch_spot_price"),
            Stage::Indicators => write!(f, "indicators"),
            Stage::MarketDiscovery => write!(f, "market_discovery"),
            Stage::Execution => write!(f, "execution"),
        }
    }
}

/// A cycle-fatal error tagged with the stage that produced it.
#[derive(Debug, thiserror::Error)]
#[error("cycle failed at {stage}: {source}")]
pub struct CycleError {
    pub stage: Stage,
    #[source]
    pub source: BotError,
}

impl CycleError {
    pub fn new(stage: Stage, source: BotError) -> Self {
        Self { stage, source }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

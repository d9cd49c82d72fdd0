//! External data sources and trading venues.
//!
//! Defines the traits the trading cycle depends on and provides
//! implementations for:
//! - Binance — public klines and spot ticker (candle source)
//! - Polymarket — Gamma market discovery, CLOB orders and order book,
//!   Data API positions

pub mod binance;
pub mod polymarket;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::{BotError, CandleSeries, Market, Side};

// ---------------------------------------------------------------------------
// Candle data
// ---------------------------------------------------------------------------

/// Source of BTC candles and the reference spot price.
///
/// Failures are fatal to the current cycle; implementors do not retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Fetch the most recent `count` candles, oldest first.
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        count: usize,
    ) -> Result<CandleSeries, BotError>;

    /// Current spot price for `symbol`.
    async fn fetch_spot_price(&self, symbol: &str) -> Result<f64, BotError>;
}

// ---------------------------------------------------------------------------
// Market discovery
// ---------------------------------------------------------------------------

/// Parameters for a market discovery request.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketFilter {
    /// Maximum number of raw entries to request from the source.
    pub limit: u32,
}

impl Default for MarketFilter {
    fn default() -> Self {
        Self { limit: 100 }
    }
}

/// Source of active Bitcoin prediction markets.
///
/// Malformed entries are dropped by the implementor, never surfaced.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn list_active_markets(&self, filter: &MarketFilter) -> Result<Vec<Market>, BotError>;
}

// ---------------------------------------------------------------------------
// Order execution
// ---------------------------------------------------------------------------

/// A Fill-or-Kill market BUY for one outcome token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub token_id: String,
    pub side: Side,
    /// USD to spend.
    pub amount_usd: f64,
    /// Price observed at decision time; informational for FOK orders.
    pub price: f64,
}

impl fmt::Display for OrderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.token_id.get(..16).unwrap_or(&self.token_id);
        write!(
            f,
            "BUY {} ${:.2} @ {:.2}¢ (token {}…)",
            self.side,
            self.amount_usd,
            self.price * 100.0,
            short,
        )
    }
}

/// Side of a CLOB order on an outcome token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Time in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    /// Fill-or-Kill: fills immediately in full or not at all.
    Fok,
    /// Good-Til-Cancelled: rests on the book until filled or cancelled.
    Gtc,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Fok => "FOK",
            OrderType::Gtc => "GTC",
        }
    }
}

/// A resting (GTC) limit order for a number of outcome shares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrderRequest {
    pub token_id: String,
    pub side: OrderSide,
    /// Limit price per share, strictly between 0 and 1.
    pub price: f64,
    /// Number of shares.
    pub size: f64,
}

impl LimitOrderRequest {
    /// Reject prices outside (0, 1) and non-positive sizes before they
    /// reach the venue.
    pub fn validate(&self) -> Result<(), BotError> {
        if !(self.price.is_finite() && self.price > 0.0 && self.price < 1.0) {
            return Err(BotError::Venue(format!("limit price {} is outside (0, 1)", self.price)));
        }
        if !(self.size.is_finite() && self.size > 0.0) {
            return Err(BotError::Venue(format!("limit size {} must be positive", self.size)));
        }
        Ok(())
    }
}

impl fmt::Display for LimitOrderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.token_id.get(..16).unwrap_or(&self.token_id);
        write!(
            f,
            "{} {:.2} shares @ {:.2}¢ GTC (token {}…)",
            self.side,
            self.size,
            self.price * 100.0,
            short,
        )
    }
}

/// Venue acknowledgement of an accepted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
    pub status: String,
}

/// An order resting on the venue's book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: String,
    pub token_id: String,
    pub side: OrderSide,
    pub price: f64,
    pub original_size: f64,
    pub size_matched: f64,
    pub status: String,
}

impl OpenOrder {
    /// Shares still waiting to be matched.
    pub fn remaining(&self) -> f64 {
        (self.original_size - self.size_matched).max(0.0)
    }
}

/// Outcome tokens held in the venue wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub token_id: String,
    pub market_id: String,
    pub outcome: String,
    pub size: f64,
    pub avg_price: f64,
    pub current_price: f64,
}

impl Position {
    /// Mark-to-market profit at the current price.
    pub fn unrealized_pnl(&self) -> f64 {
        self.size * (self.current_price - self.avg_price)
    }
}

/// Result of a cancellation request. Orders the venue refused to cancel
/// map to the venue's reason.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CancelReport {
    pub canceled: Vec<String>,
    pub not_canceled: BTreeMap<String, String>,
}

/// Real-money order venue (live mode only).
///
/// Rejections and transport failures are `BotError::Venue` throughout.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradingVenue: Send + Sync {
    /// Submit a Fill-or-Kill market BUY.
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderReceipt, BotError>;

    /// Place a Good-Til-Cancelled limit order.
    async fn submit_limit_order(&self, order: &LimitOrderRequest) -> Result<OrderReceipt, BotError>;

    async fn cancel_order(&self, order_id: &str) -> Result<CancelReport, BotError>;

    async fn cancel_all_orders(&self) -> Result<CancelReport, BotError>;

    /// Orders still resting on the book.
    async fn open_orders(&self) -> Result<Vec<OpenOrder>, BotError>;

    /// Current token holdings.
    async fn positions(&self) -> Result<Vec<Position>, BotError>;

    /// Venue name for logging.
    fn name(&self) -> &str;
}

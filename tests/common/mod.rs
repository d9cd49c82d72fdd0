//! In-memory exchange for integration testing.
//!
//! One `MockExchange` plays every external role the cycle talks to:
//! candle source, market discovery and order venue. State lives behind
//! `Arc<Mutex>` so a test can keep a handle after boxing a clone into the
//! bot, then flip errors on and off or read back submitted orders.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use btc_oracle::platforms::{
    CancelReport, CandleSource, LimitOrderRequest, MarketFilter, MarketSource, OpenOrder,
    OrderReceipt, OrderRequest, Position, TradingVenue,
};
use btc_oracle::types::{BotError, Candle, CandleSeries, Market};

/// Fixed clock for deterministic market timing.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 14, 0, 0).unwrap()
}

/// Series oscillating around $45k that ends in a two-bar crash.
///
/// RSI and Bollinger read it as oversold, MACD and the EMA cross as a
/// downtrend.
pub fn crash_series() -> CandleSeries {
    let closes: Vec<f64> = (0..98)
        .map(|i| 45_000.0 + if i % 2 == 0 { 20.0 } else { -20.0 })
        .chain([44_000.0, 42_500.0])
        .collect();
    series_from_closes(&closes)
}

pub fn series_from_closes(closes: &[f64]) -> CandleSeries {
    let start = now() - Duration::minutes(15 * closes.len() as i64);
    let candles = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            open_time: start + Duration::minutes(15 * i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        })
        .collect();
    CandleSeries::new(candles).unwrap()
}

pub fn make_market(id: &str, yes: f64, no: f64, minutes_left: i64, volume: f64) -> Market {
    Market {
        id: id.to_string(),
        question: format!("Will Bitcoin be above $43,000 at 3PM ET? ({id})"),
        description: String::new(),
        yes_token_id: format!("{id}-yes"),
        no_token_id: format!("{id}-no"),
        end_date: Some(now() + Duration::minutes(minutes_left)),
        yes_price: yes,
        no_price: no,
        volume,
        liquidity: 5_000.0,
    }
}

/// A tight hourly market, a wide one and a low-volume daily one.
fn default_markets() -> Vec<Market> {
    vec![
        make_market("MOCK-BTC-WIDE", 0.40, 0.66, 45, 50_000.0),
        make_market("MOCK-BTC-HOURLY", 0.45, 0.56, 45, 20_000.0),
        make_market("MOCK-BTC-DAILY", 0.50, 0.51, 600, 500.0),
    ]
}

#[derive(Clone)]
pub struct MockExchange {
    series: Arc<Mutex<CandleSeries>>,
    spot_price: Arc<Mutex<f64>>,
    markets: Arc<Mutex<Vec<Market>>>,
    orders: Arc<Mutex<Vec<OrderRequest>>>,
    /// Resting limit orders by id.
    book: Arc<Mutex<Vec<OpenOrder>>>,
    /// If set, every call returns a data-source or venue error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::with_markets(default_markets())
    }

    pub fn with_markets(markets: Vec<Market>) -> Self {
        Self {
            series: Arc::new(Mutex::new(crash_series())),
            spot_price: Arc::new(Mutex::new(42_510.0)),
            markets: Arc::new(Mutex::new(markets)),
            orders: Arc::new(Mutex::new(Vec::new())),
            book: Arc::new(Mutex::new(Vec::new())),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_series(&self, series: CandleSeries) {
        *self.series.lock().unwrap() = series;
    }

    pub fn set_markets(&self, markets: Vec<Market>) {
        *self.markets.lock().unwrap() = markets;
    }

    /// Force all subsequent operations to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// Orders accepted so far.
    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().unwrap().clone()
    }

    fn check_error(&self) -> Option<String> {
        self.force_error.lock().unwrap().clone()
    }
}

#[async_trait]
impl CandleSource for MockExchange {
    async fn fetch_candles(
        &self,
        _symbol: &str,
        _interval: &str,
        count: usize,
    ) -> Result<CandleSeries, BotError> {
        if let Some(err) = self.check_error() {
            return Err(BotError::data_source("mock", err));
        }
        let series = self.series.lock().unwrap().clone();
        let skip = series.len().saturating_sub(count);
        CandleSeries::new(series.candles()[skip..].to_vec())
    }

    async fn fetch_spot_price(&self, _symbol: &str) -> Result<f64, BotError> {
        if let Some(err) = self.check_error() {
            return Err(BotError::data_source("mock", err));
        }
        Ok(*self.spot_price.lock().unwrap())
    }
}

#[async_trait]
impl MarketSource for MockExchange {
    async fn list_active_markets(&self, filter: &MarketFilter) -> Result<Vec<Market>, BotError> {
        if let Some(err) = self.check_error() {
            return Err(BotError::data_source("mock", err));
        }
        let markets = self.markets.lock().unwrap();
        Ok(markets.iter().take(filter.limit as usize).cloned().collect())
    }
}

#[async_trait]
impl TradingVenue for MockExchange {
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderReceipt, BotError> {
        if let Some(err) = self.check_error() {
            return Err(BotError::Venue(err));
        }
        self.orders.lock().unwrap().push(order.clone());
        Ok(OrderReceipt {
            order_id: Uuid::new_v4().to_string(),
            status: "matched".to_string(),
        })
    }

    async fn submit_limit_order(&self, order: &LimitOrderRequest) -> Result<OrderReceipt, BotError> {
        if let Some(err) = self.check_error() {
            return Err(BotError::Venue(err));
        }
        order.validate()?;
        let order_id = Uuid::new_v4().to_string();
        self.book.lock().unwrap().push(OpenOrder {
            order_id: order_id.clone(),
            token_id: order.token_id.clone(),
            side: order.side,
            price: order.price,
            original_size: order.size,
            size_matched: 0.0,
            status: "LIVE".to_string(),
        });
        Ok(OrderReceipt {
            order_id,
            status: "live".to_string(),
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<CancelReport, BotError> {
        if let Some(err) = self.check_error() {
            return Err(BotError::Venue(err));
        }
        let mut book = self.book.lock().unwrap();
        let mut report = CancelReport::default();
        match book.iter().position(|o| o.order_id == order_id) {
            Some(idx) => report.canceled.push(book.remove(idx).order_id),
            None => {
                report
                    .not_canceled
                    .insert(order_id.to_string(), "order not found".to_string());
            }
        }
        Ok(report)
    }

    async fn cancel_all_orders(&self) -> Result<CancelReport, BotError> {
        if let Some(err) = self.check_error() {
            return Err(BotError::Venue(err));
        }
        let canceled = self.book.lock().unwrap().drain(..).map(|o| o.order_id).collect();
        Ok(CancelReport {
            canceled,
            ..Default::default()
        })
    }

    async fn open_orders(&self) -> Result<Vec<OpenOrder>, BotError> {
        if let Some(err) = self.check_error() {
            return Err(BotError::Venue(err));
        }
        Ok(self.book.lock().unwrap().clone())
    }

    /// Every accepted market BUY fills in full at its decision price.
    async fn positions(&self) -> Result<Vec<Position>, BotError> {
        if let Some(err) = self.check_error() {
            return Err(BotError::Venue(err));
        }
        Ok(self
            .orders()
            .into_iter()
            .map(|o| Position {
                size: o.amount_usd / o.price,
                avg_price: o.price,
                current_price: o.price,
                outcome: o.side.to_string(),
                market_id: String::new(),
                token_id: o.token_id,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

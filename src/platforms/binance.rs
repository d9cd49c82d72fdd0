//! Binance public market data.
//!
//! Klines: `GET /api/v3/klines?symbol=BTCUSDT&interval=15m&limit=100`
//! Ticker: `GET /api/v3/ticker/price?symbol=BTCUSDT`
//! Auth: none. Public endpoints only.
//!
//! Kline rows are positional arrays; prices and volume arrive as decimal
//! strings: `[open_time_ms, "open", "high", "low", "close", "volume", ...]`.

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::CandleSource;
use crate::config::BinanceConfig;
use crate::types::{BotError, Candle, CandleSeries};

const SOURCE: &str = "binance";
/// Binance caps a single klines request at 1000 rows.
const MAX_KLINES: usize = 1000;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TickerPrice {
    #[serde(default)]
    symbol: String,
    price: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct BinanceClient {
    http: Client,
    base_url: String,
}

impl BinanceClient {
    pub fn new(config: &BinanceConfig) -> Result<Self, BotError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("btc-oracle/0.1.0")
            .build()
            .map_err(|e| BotError::data_source(SOURCE, format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<String, BotError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| BotError::data_source(SOURCE, format!("request to {path} failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(BotError::data_source(SOURCE, format!("{path} returned {status}: {body}")));
        }

        resp.text()
            .await
            .map_err(|e| BotError::data_source(SOURCE, format!("failed to read {path} body: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a klines response body into a validated series.
pub fn parse_klines(body: &str) -> Result<CandleSeries, BotError> {
    let rows: Vec<Vec<Value>> = serde_json::from_str(body)
        .map_err(|e| BotError::Schema(format!("klines body is not an array of rows: {e}")))?;

    let candles = rows
        .iter()
        .enumerate()
        .map(|(i, row)| parse_kline_row(i, row))
        .collect::<Result<Vec<_>, _>>()?;

    CandleSeries::new(candles)
}

fn parse_kline_row(index: usize, row: &[Value]) -> Result<Candle, BotError> {
    if row.len() < 6 {
        return Err(BotError::Schema(format!(
            "kline row {index} has {} columns, expected at least 6",
            row.len()
        )));
    }

    let open_time_ms = row[0]
        .as_i64()
        .ok_or_else(|| BotError::Schema(format!("kline row {index} has no open time")))?;
    let open_time = DateTime::from_timestamp_millis(open_time_ms)
        .ok_or_else(|| BotError::Schema(format!("kline row {index} open time out of range")))?;

    let column = |col: usize, name: &str| {
        numeric(&row[col])
            .ok_or_else(|| BotError::Schema(format!("kline row {index} has a non-numeric {name}")))
    };

    Ok(Candle {
        open_time,
        open: column(1, "open")?,
        high: column(2, "high")?,
        low: column(3, "low")?,
        close: column(4, "close")?,
        volume: column(5, "volume")?,
    })
}

/// Parse a ticker body into a positive, finite price.
pub fn parse_ticker(body: &str) -> Result<f64, BotError> {
    let ticker: TickerPrice = serde_json::from_str(body)
        .map_err(|e| BotError::Schema(format!("ticker body malformed: {e}")))?;

    match ticker.price.parse::<f64>() {
        Ok(price) if price.is_finite() && price > 0.0 => Ok(price),
        _ => Err(BotError::Schema(format!(
            "ticker price for {} is invalid: {:?}",
            ticker.symbol, ticker.price
        ))),
    }
}

/// Binance encodes decimals as strings; accept plain numbers too.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// CandleSource implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl CandleSource for BinanceClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        count: usize,
    ) -> Result<CandleSeries, BotError> {
        let limit = count.clamp(1, MAX_KLINES);
        debug!(symbol, interval, limit, "Fetching Binance klines");

        let body = self
            .get_text(
                "/api/v3/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        let series = parse_klines(&body)?;
        info!(
            count = series.len(),
            latest_close = format!("${:.2}", series.last().close),
            "Fetched klines"
        );
        Ok(series)
    }

    async fn fetch_spot_price(&self, symbol: &str) -> Result<f64, BotError> {
        let body = self
            .get_text("/api/v3/ticker/price", &[("symbol", symbol.to_string())])
            .await?;
        let price = parse_ticker(&body)?;
        debug!(symbol, price = format!("${price:.2}"), "Fetched spot price");
        Ok(price)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

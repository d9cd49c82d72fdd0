//! Polymarket integration.
//!
//! Uses the Gamma API for market discovery (no auth required) and the
//! CLOB API for midpoint prices and order placement.
//!
//! Gamma API: https://gamma-api.polymarket.com
//! CLOB API: https://clob.polymarket.com
//! Data API: https://data-api.polymarket.com
//!
//! Market data, order books and positions are free and unauthenticated.
//! Order placement, cancellation and open-order queries need L2 API
//! credentials (key, secret, passphrase) supplied through the environment.
//! Every L2 request carries an HMAC-SHA256 signature of
//! `timestamp + method + path + body`, keyed with the base64 secret.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use hmac::{Hmac, Mac};
use reqwest::{header::CONTENT_TYPE, Client, Method};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    CancelReport, LimitOrderRequest, MarketFilter, MarketSource, OpenOrder, OrderReceipt,
    OrderRequest, OrderSide, OrderType, Position, TradingVenue,
};
use crate::config::{AppConfig, PolymarketConfig};
use crate::types::{BotError, Market, TradingMode};

const SOURCE: &str = "polymarket";

type HmacSha256 = Hmac<Sha256>;

/// Open-order pagination cursors.
const FIRST_CURSOR: &str = "MA==";
const END_CURSOR: &str = "LTE=";

/// Any of these in the question/description marks a Bitcoin market.
const BTC_KEYWORDS: &[&str] = &["bitcoin", "btc"];
const BTC_TAGS: &[&str] = &["bitcoin", "btc", "crypto", "cryptocurrency"];
/// The market must also be about a price level.
const PRICE_KEYWORDS: &[&str] = &["price", "above", "below", "reach", "hit", "exceed"];

// ---------------------------------------------------------------------------
// Gamma API response types (market discovery)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone, Default)]
pub struct GammaMarket {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "conditionId")]
    pub condition_id: String,
    #[serde(default, rename = "endDate")]
    pub end_date: Option<String>,
    #[serde(default, rename = "end_date_iso")]
    pub end_date_iso: Option<String>,
    #[serde(default)]
    pub closed: bool,
    /// Outcome prices, usually a JSON string: "[\"0.65\",\"0.35\"]"
    #[serde(default, rename = "outcomePrices")]
    pub outcome_prices: Option<Value>,
    /// Token ids in outcome order, usually a JSON string.
    #[serde(default, rename = "clobTokenIds")]
    pub clob_token_ids: Option<Value>,
    /// Gamma sends volume as a string on some endpoints and a number on others.
    #[serde(default)]
    pub volume: Option<Value>,
    #[serde(default, rename = "volumeNum")]
    pub volume_num: Option<f64>,
    #[serde(default)]
    pub liquidity: Option<Value>,
    /// Either tag objects (`{label, slug}`) or bare strings.
    #[serde(default)]
    pub tags: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct MidpointResponse {
    mid: Value,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(default)]
    success: bool,
    #[serde(default, rename = "errorMsg")]
    error_msg: String,
    #[serde(default, rename = "orderID")]
    order_id: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize, Default)]
struct CancelResponse {
    #[serde(default)]
    canceled: Vec<String>,
    #[serde(default)]
    not_canceled: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawOpenOrder {
    #[serde(default)]
    id: String,
    #[serde(default)]
    asset_id: String,
    #[serde(default)]
    side: String,
    #[serde(default)]
    price: Value,
    #[serde(default)]
    original_size: Value,
    #[serde(default)]
    size_matched: Value,
    #[serde(default)]
    status: String,
}

/// `/data/orders` answers with either a bare list or a cursor page.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OpenOrdersResponse {
    List(Vec<Value>),
    Page {
        data: Vec<Value>,
        #[serde(default)]
        next_cursor: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPosition {
    #[serde(default)]
    asset: String,
    #[serde(default)]
    condition_id: String,
    #[serde(default)]
    outcome: String,
    #[serde(default)]
    size: Value,
    #[serde(default)]
    avg_price: Value,
    #[serde(default)]
    cur_price: Value,
}

#[derive(Debug, Deserialize)]
struct RawBook {
    #[serde(default)]
    bids: Vec<Value>,
    #[serde(default)]
    asks: Vec<Value>,
}

/// One price level of an outcome token's book.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

/// CLOB order book, best level first on each side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    /// Mid of best bid and ask; `None` unless both sides are quoted.
    pub fn midpoint(&self) -> Option<f64> {
        Some((self.best_bid()? + self.best_ask()?) / 2.0)
    }

    pub fn spread(&self) -> Option<f64> {
        Some(self.best_ask()? - self.best_bid()?)
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// CLOB L2 API credentials.
#[derive(Clone)]
pub struct ClobCredentials {
    pub api_key: SecretString,
    /// URL-safe base64 HMAC key.
    pub api_secret: SecretString,
    pub passphrase: SecretString,
}

impl std::fmt::Debug for ClobCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ClobCredentials([REDACTED])")
    }
}

impl ClobCredentials {
    /// Resolve credentials from the env-var names in the config.
    pub fn from_env(cfg: &PolymarketConfig) -> Result<Self, BotError> {
        Ok(Self {
            api_key: SecretString::new(AppConfig::resolve_env(&cfg.api_key_env)?),
            api_secret: SecretString::new(AppConfig::resolve_env(&cfg.api_secret_env)?),
            passphrase: SecretString::new(AppConfig::resolve_env(&cfg.api_passphrase_env)?),
        })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PolymarketClient {
    http: Client,
    gamma_host: String,
    clob_host: String,
    data_api_host: String,
    refresh_midpoints: bool,
    credentials: Option<ClobCredentials>,
    signer_address: Option<String>,
    funder_address: Option<String>,
}

impl PolymarketClient {
    pub fn new(cfg: &PolymarketConfig, credentials: Option<ClobCredentials>) -> Result<Self, BotError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("btc-oracle/0.1.0")
            .build()
            .map_err(|e| BotError::data_source(SOURCE, format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            gamma_host: cfg.gamma_host.trim_end_matches('/').to_string(),
            clob_host: cfg.clob_host.trim_end_matches('/').to_string(),
            data_api_host: cfg.data_api_host.trim_end_matches('/').to_string(),
            refresh_midpoints: cfg.refresh_midpoints,
            credentials,
            signer_address: cfg.signer_address.clone(),
            funder_address: cfg.funder_address.clone(),
        })
    }

    /// Build a client for the given mode. Live mode requires credentials.
    pub fn from_config(cfg: &PolymarketConfig, mode: TradingMode) -> Result<Self, BotError> {
        let credentials = match mode {
            TradingMode::Live => Some(ClobCredentials::from_env(cfg)?),
            TradingMode::Paper => None,
        };
        Self::new(cfg, credentials)
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Fetch open markets from the Gamma API (no auth required).
    ///
    /// Entries that fail to deserialize are dropped individually.
    pub async fn fetch_gamma_markets(&self, limit: u32) -> Result<Vec<GammaMarket>, BotError> {
        let url = format!("{}/markets", self.gamma_host);
        debug!(limit, "Fetching Polymarket markets from Gamma API");

        let resp = self
            .http
            .get(&url)
            .query(&[("closed", "false".to_string()), ("limit", limit.to_string())])
            .send()
            .await
            .map_err(|e| BotError::data_source(SOURCE, format!("Gamma API request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(BotError::data_source(SOURCE, format!("Gamma API error {status}: {body}")));
        }

        let raw: Vec<Value> = resp
            .json()
            .await
            .map_err(|e| BotError::Schema(format!("Gamma markets response is not a list: {e}")))?;

        let total = raw.len();
        let markets: Vec<GammaMarket> = raw
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();

        info!(count = markets.len(), dropped = total - markets.len(), "Fetched raw Gamma markets");
        Ok(markets)
    }

    /// Current CLOB midpoint for one outcome token.
    pub async fn fetch_midpoint(&self, token_id: &str) -> Result<f64, BotError> {
        let url = format!("{}/midpoint", self.clob_host);
        let resp = self
            .http
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await
            .map_err(|e| BotError::data_source(SOURCE, format!("midpoint request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(BotError::data_source(
                SOURCE,
                format!("midpoint for {token_id} returned {}", resp.status()),
            ));
        }

        let body: MidpointResponse = resp
            .json()
            .await
            .map_err(|e| BotError::Schema(format!("midpoint response malformed: {e}")))?;

        numeric(&body.mid)
            .filter(|p| is_probability(*p))
            .ok_or_else(|| BotError::Schema(format!("midpoint for {token_id} is not a price")))
    }

    /// Full CLOB order book for one outcome token.
    pub async fn fetch_order_book(&self, token_id: &str) -> Result<OrderBook, BotError> {
        let url = format!("{}/book", self.clob_host);
        let resp = self
            .http
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await
            .map_err(|e| BotError::data_source(SOURCE, format!("order book request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(BotError::data_source(
                SOURCE,
                format!("order book for {token_id} returned {}", resp.status()),
            ));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| BotError::data_source(SOURCE, format!("order book body unreadable: {e}")))?;
        let book = parse_order_book(&text)?;
        debug!(
            token_id,
            bids = book.bids.len(),
            asks = book.asks.len(),
            best_bid = ?book.best_bid(),
            best_ask = ?book.best_ask(),
            "Order book"
        );
        Ok(book)
    }

    /// Replace Gamma prices with CLOB midpoints, concurrently per token.
    /// A market keeps its Gamma prices when either lookup fails.
    async fn apply_midpoints(&self, markets: &mut [Market]) {
        let lookups = markets.iter().map(|m| async move {
            futures::join!(
                self.fetch_midpoint(&m.yes_token_id),
                self.fetch_midpoint(&m.no_token_id)
            )
        });
        let results = join_all(lookups).await;

        for (market, result) in markets.iter_mut().zip(results) {
            match result {
                (Ok(yes), Ok(no)) => {
                    market.yes_price = yes;
                    market.no_price = no;
                }
                (Err(e), _) | (_, Err(e)) => {
                    warn!(market_id = %market.id, error = %e, "Midpoint refresh failed, keeping Gamma prices");
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Parsing
    // -----------------------------------------------------------------------

    /// Whether a Gamma market is a Bitcoin price market.
    pub fn is_bitcoin_price_market(gm: &GammaMarket) -> bool {
        let text = format!("{} {}", gm.question, gm.description).to_lowercase();
        let has_btc_keyword = BTC_KEYWORDS.iter().any(|kw| text.contains(kw));
        let has_btc_tag = gm
            .tags
            .as_deref()
            .map(|tags| tag_names(tags).iter().any(|t| BTC_TAGS.contains(&t.as_str())))
            .unwrap_or(false);
        let has_price_keyword = PRICE_KEYWORDS.iter().any(|kw| text.contains(kw));

        (has_btc_keyword || has_btc_tag) && has_price_keyword
    }

    /// Convert a Gamma market into our internal Market type.
    ///
    /// Returns `None` when the id, either token id, or either price is
    /// missing or unparseable.
    pub fn convert_market(gm: &GammaMarket) -> Option<Market> {
        if gm.condition_id.is_empty() || gm.question.is_empty() || gm.closed {
            return None;
        }

        let tokens = gm.clob_token_ids.as_ref().map(string_list).unwrap_or_default();
        let (yes_token_id, no_token_id) = match tokens.as_slice() {
            [yes, no, ..] if !yes.is_empty() && !no.is_empty() => (yes.clone(), no.clone()),
            _ => return None,
        };

        let prices = gm.outcome_prices.as_ref().map(string_list).unwrap_or_default();
        let (yes_price, no_price) = parse_outcome_prices(&prices)?;

        let end_date = gm
            .end_date
            .as_deref()
            .or(gm.end_date_iso.as_deref())
            .and_then(parse_end_date);

        let volume = gm.volume.as_ref().and_then(numeric).or(gm.volume_num).unwrap_or(0.0);
        let liquidity = gm.liquidity.as_ref().and_then(numeric).unwrap_or(0.0);

        Some(Market {
            id: gm.condition_id.clone(),
            question: gm.question.clone(),
            description: gm.description.clone(),
            yes_token_id,
            no_token_id,
            end_date,
            yes_price,
            no_price,
            volume,
            liquidity,
        })
    }

    // -----------------------------------------------------------------------
    // Authenticated CLOB requests
    // -----------------------------------------------------------------------

    fn credentials(&self) -> Result<&ClobCredentials, BotError> {
        self.credentials
            .as_ref()
            .ok_or_else(|| BotError::Venue("no CLOB API credentials configured".into()))
    }

    /// L2 auth headers for one request. `body` must be the exact string sent.
    fn l2_headers(
        &self,
        timestamp: i64,
        method: &str,
        path: &str,
        body: &str,
    ) -> Result<Vec<(&'static str, String)>, BotError> {
        let creds = self.credentials()?;
        let signature = l2_signature(creds.api_secret.expose_secret(), timestamp, method, path, body)?;
        let mut headers = vec![
            ("POLY_API_KEY", creds.api_key.expose_secret().clone()),
            ("POLY_PASSPHRASE", creds.passphrase.expose_secret().clone()),
            ("POLY_SIGNATURE", signature),
            ("POLY_TIMESTAMP", timestamp.to_string()),
        ];
        if let Some(address) = &self.signer_address {
            headers.push(("POLY_ADDRESS", address.clone()));
        }
        Ok(headers)
    }

    /// Send a signed CLOB request and return the body of a 2xx response.
    ///
    /// The query string is not part of the signed path.
    async fn send_signed(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<String, BotError> {
        let body = body.map(Value::to_string).unwrap_or_default();
        let headers = self.l2_headers(Utc::now().timestamp(), method.as_str(), path, &body)?;

        let mut req = self
            .http
            .request(method, format!("{}{path}", self.clob_host))
            .query(query);
        for (name, value) in headers {
            req = req.header(name, value);
        }
        if !body.is_empty() {
            req = req.header(CONTENT_TYPE, "application/json").body(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| BotError::Venue(format!("{path} request failed: {e}")))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(BotError::Venue(format!("CLOB {path} returned {status}: {text}")));
        }
        Ok(text)
    }

    async fn post_order(
        &self,
        order: Value,
        order_type: OrderType,
        client_order_id: String,
    ) -> Result<OrderReceipt, BotError> {
        let owner = self.credentials()?.api_key.expose_secret().clone();
        let body = order_payload(order, order_type, &owner, &client_order_id);
        let text = self.send_signed(Method::POST, "/order", &[], Some(&body)).await?;

        let parsed: OrderResponse = serde_json::from_str(&text)
            .map_err(|e| BotError::Venue(format!("unreadable order response: {e}")))?;
        receipt_from_response(parsed, client_order_id)
    }
}

/// Base64 HMAC-SHA256 of `timestamp + method + path + body` under the
/// URL-safe base64 `secret`.
pub fn l2_signature(
    secret: &str,
    timestamp: i64,
    method: &str,
    path: &str,
    body: &str,
) -> Result<String, BotError> {
    let key = URL_SAFE
        .decode(secret.trim())
        .map_err(|e| BotError::Config(format!("CLOB API secret is not base64: {e}")))?;
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| BotError::Config(format!("CLOB API secret rejected as HMAC key: {e}")))?;
    mac.update(format!("{timestamp}{method}{path}{body}").as_bytes());
    Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
}

fn order_payload(order: Value, order_type: OrderType, owner: &str, client_order_id: &str) -> Value {
    json!({
        "order": order,
        "owner": owner,
        "orderType": order_type.as_str(),
        "clientOrderId": client_order_id,
    })
}

/// Parse the first two entries as YES/NO prices in [0, 1].
pub fn parse_outcome_prices(parts: &[String]) -> Option<(f64, f64)> {
    match parts {
        [yes, no, ..] => {
            let yes = yes.trim().parse::<f64>().ok().filter(|p| is_probability(*p))?;
            let no = no.trim().parse::<f64>().ok().filter(|p| is_probability(*p))?;
            Some((yes, no))
        }
        _ => None,
    }
}

/// RFC 3339 timestamp, or a bare `YYYY-MM-DD` read as end of that day UTC.
pub fn parse_end_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(23, 59, 59))
                .map(|ndt| ndt.and_utc())
        })
}

/// Gamma list fields arrive as a JSON-encoded string, a plain
/// comma-separated string, or an actual array.
fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Value::String(s) => s
            .replace(['[', ']', '"', '\\'], "")
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn tag_names(tags: &[Value]) -> Vec<String> {
    tags.iter()
        .flat_map(|t| match t {
            Value::String(s) => vec![s.to_lowercase()],
            Value::Object(obj) => ["label", "slug"]
                .iter()
                .filter_map(|k| obj.get(*k).and_then(Value::as_str))
                .map(str::to_lowercase)
                .collect(),
            _ => Vec::new(),
        })
        .collect()
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn is_probability(p: f64) -> bool {
    p.is_finite() && (0.0..=1.0).contains(&p)
}

fn parse_side(side: &str) -> Option<OrderSide> {
    match side.trim().to_ascii_uppercase().as_str() {
        "BUY" => Some(OrderSide::Buy),
        "SELL" => Some(OrderSide::Sell),
        _ => None,
    }
}

/// Book levels with a valid price and a positive size, best first.
pub fn parse_order_book(text: &str) -> Result<OrderBook, BotError> {
    let raw: RawBook = serde_json::from_str(text)
        .map_err(|e| BotError::Schema(format!("order book response malformed: {e}")))?;

    let levels = |side: &[Value]| -> Vec<BookLevel> {
        side.iter()
            .filter_map(|level| {
                let price = level.get("price").and_then(numeric).filter(|p| is_probability(*p))?;
                let size = level.get("size").and_then(numeric).filter(|s| s.is_finite() && *s > 0.0)?;
                Some(BookLevel { price, size })
            })
            .collect()
    };

    let mut bids = levels(&raw.bids);
    let mut asks = levels(&raw.asks);
    bids.sort_by(|a, b| b.price.total_cmp(&a.price));
    asks.sort_by(|a, b| a.price.total_cmp(&b.price));
    Ok(OrderBook { bids, asks })
}

/// One page of open orders plus the cursor for the next, if any.
///
/// Entries without an id, with an unknown side or an unreadable price are
/// dropped.
pub fn parse_open_orders(text: &str) -> Result<(Vec<OpenOrder>, Option<String>), BotError> {
    let resp: OpenOrdersResponse = serde_json::from_str(text)
        .map_err(|e| BotError::Venue(format!("unreadable open orders response: {e}")))?;
    let (raw, next_cursor) = match resp {
        OpenOrdersResponse::Page { data, next_cursor } => (data, next_cursor),
        OpenOrdersResponse::List(data) => (data, None),
    };

    let orders = raw
        .into_iter()
        .filter_map(|v| serde_json::from_value::<RawOpenOrder>(v).ok())
        .filter_map(|o| {
            if o.id.is_empty() {
                return None;
            }
            Some(OpenOrder {
                side: parse_side(&o.side)?,
                price: numeric(&o.price).filter(|p| is_probability(*p))?,
                original_size: numeric(&o.original_size).unwrap_or(0.0),
                size_matched: numeric(&o.size_matched).unwrap_or(0.0),
                order_id: o.id,
                token_id: o.asset_id,
                status: o.status,
            })
        })
        .collect();

    let next_cursor = next_cursor.filter(|c| !c.is_empty() && c != END_CURSOR);
    Ok((orders, next_cursor))
}

/// Data API positions; entries without a token or with no shares are dropped.
pub fn parse_positions(text: &str) -> Result<Vec<Position>, BotError> {
    let raw: Vec<Value> = serde_json::from_str(text)
        .map_err(|e| BotError::Venue(format!("unreadable positions response: {e}")))?;

    Ok(raw
        .into_iter()
        .filter_map(|v| serde_json::from_value::<RawPosition>(v).ok())
        .filter_map(|p| {
            let size = numeric(&p.size).filter(|s| s.is_finite() && *s > 0.0)?;
            if p.asset.is_empty() {
                return None;
            }
            Some(Position {
                token_id: p.asset,
                market_id: p.condition_id,
                outcome: p.outcome,
                size,
                avg_price: numeric(&p.avg_price).unwrap_or(0.0),
                current_price: numeric(&p.cur_price).unwrap_or(0.0),
            })
        })
        .collect())
}

pub fn parse_cancel_response(text: &str) -> Result<CancelReport, BotError> {
    let resp: CancelResponse = serde_json::from_str(text)
        .map_err(|e| BotError::Venue(format!("unreadable cancel response: {e}")))?;
    let not_canceled = resp
        .not_canceled
        .into_iter()
        .map(|(id, reason)| {
            let reason = match reason {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (id, reason)
        })
        .collect();
    Ok(CancelReport {
        canceled: resp.canceled,
        not_canceled,
    })
}

fn log_cancel_report(report: &CancelReport) {
    info!(canceled = report.canceled.len(), refused = report.not_canceled.len(), "Cancel processed");
    for (order_id, reason) in &report.not_canceled {
        warn!(order_id = %order_id, reason = %reason, "Order not cancelled");
    }
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl MarketSource for PolymarketClient {
    async fn list_active_markets(&self, filter: &MarketFilter) -> Result<Vec<Market>, BotError> {
        let gamma_markets = self.fetch_gamma_markets(filter.limit).await?;

        let mut markets: Vec<Market> = gamma_markets
            .iter()
            .filter(|gm| Self::is_bitcoin_price_market(gm))
            .filter_map(Self::convert_market)
            .collect();

        if self.refresh_midpoints && !markets.is_empty() {
            self.apply_midpoints(&mut markets).await;
        }

        markets.sort_by(|a, b| b.volume.total_cmp(&a.volume));
        info!(count = markets.len(), "Active Bitcoin markets");
        Ok(markets)
    }
}

#[async_trait]
impl TradingVenue for PolymarketClient {
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderReceipt, BotError> {
        self.credentials()?;
        let client_order_id = Uuid::new_v4().to_string();
        info!(order = %order, client_order_id = %client_order_id, "Submitting FOK order");

        let body = json!({
            "tokenID": order.token_id,
            "side": OrderSide::Buy,
            "amount": order.amount_usd,
            "price": order.price,
        });
        self.post_order(body, OrderType::Fok, client_order_id).await
    }

    async fn submit_limit_order(&self, order: &LimitOrderRequest) -> Result<OrderReceipt, BotError> {
        order.validate()?;
        self.credentials()?;
        let client_order_id = Uuid::new_v4().to_string();
        info!(order = %order, client_order_id = %client_order_id, "Placing GTC limit order");

        let body = json!({
            "tokenID": order.token_id,
            "side": order.side,
            "price": order.price,
            "size": order.size,
        });
        self.post_order(body, OrderType::Gtc, client_order_id).await
    }

    async fn cancel_order(&self, order_id: &str) -> Result<CancelReport, BotError> {
        info!(order_id, "Cancelling order");
        let body = json!({ "orderID": order_id });
        let text = self.send_signed(Method::DELETE, "/order", &[], Some(&body)).await?;
        let report = parse_cancel_response(&text)?;
        log_cancel_report(&report);
        Ok(report)
    }

    async fn cancel_all_orders(&self) -> Result<CancelReport, BotError> {
        info!("Cancelling all open orders");
        let text = self.send_signed(Method::DELETE, "/cancel-all", &[], None).await?;
        let report = parse_cancel_response(&text)?;
        log_cancel_report(&report);
        Ok(report)
    }

    async fn open_orders(&self) -> Result<Vec<OpenOrder>, BotError> {
        let mut orders = Vec::new();
        let mut cursor = FIRST_CURSOR.to_string();
        loop {
            let query = [("next_cursor", cursor.clone())];
            let text = self.send_signed(Method::GET, "/data/orders", &query, None).await?;
            let (page, next) = parse_open_orders(&text)?;
            orders.extend(page);
            match next {
                Some(next) if next != cursor => cursor = next,
                _ => break,
            }
        }
        info!(count = orders.len(), "Open CLOB orders");
        Ok(orders)
    }

    async fn positions(&self) -> Result<Vec<Position>, BotError> {
        let user = self
            .funder_address
            .as_ref()
            .or(self.signer_address.as_ref())
            .ok_or_else(|| BotError::Venue("no wallet address configured for positions".into()))?;

        let resp = self
            .http
            .get(format!("{}/positions", self.data_api_host))
            .query(&[("user", user.as_str())])
            .send()
            .await
            .map_err(|e| BotError::Venue(format!("positions request failed: {e}")))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(BotError::Venue(format!("Data API returned {status}: {text}")));
        }

        let positions = parse_positions(&text)?;
        info!(count = positions.len(), "Wallet positions");
        Ok(positions)
    }

    fn name(&self) -> &str {
        SOURCE
    }
}

fn receipt_from_response(resp: OrderResponse, client_order_id: String) -> Result<OrderReceipt, BotError> {
    if !resp.success || !resp.error_msg.is_empty() {
        let msg = if resp.error_msg.is_empty() {
            "order rejected".to_string()
        } else {
            resp.error_msg
        };
        return Err(BotError::Venue(msg));
    }

    let order_id = if resp.order_id.is_empty() {
        client_order_id
    } else {
        resp.order_id
    };
    Ok(OrderReceipt {
        order_id,
        status: resp.status,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

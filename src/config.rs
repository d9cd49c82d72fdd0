//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! field has a default, so a missing section falls back to the stock bot
//! parameters. Secrets (CLOB API credentials) are referenced by env-var
//! name in the config and resolved at runtime.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::types::{BotError, TradingMode};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub trading: TradingConfig,
    pub indicators: IndicatorConfig,
    pub weights: WeightsConfig,
    pub binance: BinanceConfig,
    pub polymarket: PolymarketConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TradingConfig {
    pub mode: TradingMode,
    /// Fixed USD stake per trade.
    pub trade_amount_usd: f64,
    pub interval_minutes: u32,
    pub max_daily_trades: u32,
    /// Minimum signal confidence (0–1) required to trade.
    pub min_score_threshold: f64,
    /// Starting balance for a fresh paper portfolio.
    pub initial_balance: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            mode: TradingMode::Paper,
            trade_amount_usd: 10.0,
            interval_minutes: 15,
            max_daily_trades: 96,
            min_score_threshold: 0.6,
            initial_balance: 1000.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub ema_short: usize,
    pub ema_long: usize,
    pub bb_period: usize,
    pub bb_std_dev: f64,
    /// Kline interval requested from the candle source.
    pub candle_interval: String,
    /// Number of candles fetched per cycle.
    pub candle_count: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            ema_short: 9,
            ema_long: 21,
            bb_period: 20,
            bb_std_dev: 2.0,
            candle_interval: "15m".to_string(),
            candle_count: 100,
        }
    }
}

impl IndicatorConfig {
    /// Largest lookback window across all indicators.
    ///
    /// `macd_signal` is left out: it smooths the MACD line rather than the
    /// closes, so a series of exactly this length yields a MACD line with an
    /// undefined signal line, which the indicator engine reports as 0.
    pub fn max_lookback(&self) -> usize {
        [
            self.rsi_period,
            self.macd_fast,
            self.macd_slow,
            self.ema_short,
            self.ema_long,
            self.bb_period,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

/// Per-indicator weights. Renormalized by the scorer if they don't sum to 1.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WeightsConfig {
    pub rsi: f64,
    pub macd: f64,
    pub ema_crossover: f64,
    pub bollinger: f64,
    /// Allowed deviation of the weight sum from 1.0 before a warning.
    pub sum_tolerance: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            rsi: 0.25,
            macd: 0.30,
            ema_crossover: 0.25,
            bollinger: 0.20,
            sum_tolerance: 0.01,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BinanceConfig {
    pub base_url: String,
    pub symbol: String,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            symbol: "BTCUSDT".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PolymarketConfig {
    pub gamma_host: String,
    pub clob_host: String,
    /// Number of markets requested from the Gamma API per cycle.
    pub market_limit: u32,
    /// Refresh YES/NO prices from CLOB midpoints after discovery.
    pub refresh_midpoints: bool,
    pub api_key_env: String,
    pub api_secret_env: String,
    pub api_passphrase_env: String,
    /// Public Data API, used for position lookups.
    pub data_api_host: String,
    /// Wallet that owns the API key; sent as `POLY_ADDRESS` when set.
    pub signer_address: Option<String>,
    /// Wallet holding the positions (proxy wallet). Defaults to the signer.
    pub funder_address: Option<String>,
}

impl Default for PolymarketConfig {
    fn default() -> Self {
        Self {
            gamma_host: "https://gamma-api.polymarket.com".to_string(),
            clob_host: "https://clob.polymarket.com".to_string(),
            market_limit: 100,
            refresh_midpoints: false,
            api_key_env: "POLY_API_KEY".to_string(),
            api_secret_env: "POLY_API_SECRET".to_string(),
            api_passphrase_env: "POLY_API_PASSPHRASE".to_string(),
            data_api_host: "https://data-api.polymarket.com".to_string(),
            signer_address: None,
            funder_address: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub portfolio_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            portfolio_path: "paper_trades.json".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every bound the bot relies on.
    pub fn validate(&self) -> Result<(), BotError> {
        let t = &self.trading;
        check(
            (1.0..=10_000.0).contains(&t.trade_amount_usd),
            format!("trade_amount_usd must be in [1, 10000], got {}", t.trade_amount_usd),
        )?;
        check(
            (1..=60).contains(&t.interval_minutes),
            format!("interval_minutes must be in [1, 60], got {}", t.interval_minutes),
        )?;
        check(t.max_daily_trades >= 1, "max_daily_trades must be at least 1".to_string())?;
        check(
            (0.0..=1.0).contains(&t.min_score_threshold),
            format!("min_score_threshold must be in [0, 1], got {}", t.min_score_threshold),
        )?;
        check(
            t.initial_balance >= 0.0 && t.initial_balance.is_finite(),
            format!("initial_balance must be non-negative, got {}", t.initial_balance),
        )?;

        let i = &self.indicators;
        for (name, period) in [
            ("rsi_period", i.rsi_period),
            ("macd_fast", i.macd_fast),
            ("macd_slow", i.macd_slow),
            ("macd_signal", i.macd_signal),
            ("ema_short", i.ema_short),
            ("ema_long", i.ema_long),
            ("bb_period", i.bb_period),
        ] {
            check(period >= 2, format!("{name} must be at least 2, got {period}"))?;
        }
        check(
            (50.0..=100.0).contains(&i.rsi_overbought),
            format!("rsi_overbought must be in [50, 100], got {}", i.rsi_overbought),
        )?;
        check(
            (0.0..=50.0).contains(&i.rsi_oversold),
            format!("rsi_oversold must be in [0, 50], got {}", i.rsi_oversold),
        )?;
        check(
            (0.5..=4.0).contains(&i.bb_std_dev),
            format!("bb_std_dev must be in [0.5, 4], got {}", i.bb_std_dev),
        )?;
        check(
            i.candle_count >= i.max_lookback(),
            format!(
                "candle_count ({}) must cover the largest lookback ({})",
                i.candle_count,
                i.max_lookback()
            ),
        )?;

        let w = &self.weights;
        let entries = [w.rsi, w.macd, w.ema_crossover, w.bollinger];
        check(
            entries.iter().all(|v| *v >= 0.0 && v.is_finite()),
            "indicator weights must be non-negative".to_string(),
        )?;
        check(
            entries.iter().sum::<f64>() > 0.0,
            "indicator weights must not all be zero".to_string(),
        )?;
        check(
            w.sum_tolerance >= 0.0,
            format!("sum_tolerance must be non-negative, got {}", w.sum_tolerance),
        )?;

        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String, BotError> {
        std::env::var(env_name)
            .map_err(|_| BotError::Config(format!("Environment variable not set: {env_name}")))
    }
}

fn check(ok: bool, message: String) -> Result<(), BotError> {
    if ok {
        Ok(())
    } else {
        Err(BotError::Config(message))
    }
}

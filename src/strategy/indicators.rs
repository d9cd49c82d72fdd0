//! Technical indicator engine.
//!
//! Turns a candle series into an [`IndicatorBundle`]: the latest RSI, MACD
//! (line/signal/histogram), short/long EMA and Bollinger Bands readings over
//! the close prices.
//!
//! Series helpers return one value per input with `NaN` during warm-up.
//! The bundle takes the last defined value of each series and falls back to
//! a neutral default when a series is never defined:
//! RSI → 50, EMA → current close, MACD → 0, Bollinger → close ± 5% around close.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::config::IndicatorConfig;
use crate::types::{BotError, CandleSeries};

/// Neutral RSI reading used before the RSI is defined.
pub const NEUTRAL_RSI: f64 = 50.0;

/// Half-width of the fallback Bollinger band, as a fraction of price.
pub const FALLBACK_BAND_PCT: f64 = 0.05;

// ---------------------------------------------------------------------------
// Indicator bundle
// ---------------------------------------------------------------------------

/// Latest reading of every indicator plus current/previous close.
///
/// Invariants: `bb_lower <= bb_middle <= bb_upper`, `rsi` in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorBundle {
    pub rsi: f64,
    pub macd_line: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub ema_short: f64,
    pub ema_long: f64,
    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
    pub current_price: f64,
    pub previous_price: f64,
}

impl IndicatorBundle {
    /// Percent change of the current close vs. the previous close.
    pub fn price_change_pct(&self) -> f64 {
        if self.previous_price == 0.0 {
            0.0
        } else {
            (self.current_price - self.previous_price) / self.previous_price * 100.0
        }
    }
}

impl fmt::Display for IndicatorBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "price=${:.2} ({:+.2}%) | RSI={:.2} | MACD={:.4}/{:.4}/{:.4} | EMA={:.2}/{:.2} | BB={:.2}/{:.2}/{:.2}",
            self.current_price,
            self.price_change_pct(),
            self.rsi,
            self.macd_line,
            self.macd_signal,
            self.macd_histogram,
            self.ema_short,
            self.ema_long,
            self.bb_lower,
            self.bb_middle,
            self.bb_upper,
        )
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Computes indicator bundles using configured lookback parameters.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    config: IndicatorConfig,
}

impl IndicatorEngine {
    pub fn new(config: IndicatorConfig) -> Self {
        Self { config }
    }

    /// Minimum number of candles required by [`compute`](Self::compute).
    pub fn min_periods(&self) -> usize {
        self.config.max_lookback()
    }

    /// Compute the latest indicator readings for a candle series.
    pub fn compute(&self, series: &CandleSeries) -> Result<IndicatorBundle, BotError> {
        let needed = self.min_periods();
        if series.len() < needed {
            return Err(BotError::InsufficientData {
                needed,
                got: series.len(),
            });
        }

        let closes = series.closes();
        let current = series.last().close;
        let previous = if closes.len() > 1 {
            closes[closes.len() - 2]
        } else {
            current
        };

        let cfg = &self.config;
        let rsi = rsi_series(&closes, cfg.rsi_period);
        let macd = macd_series(&closes, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal);
        let ema_short = ema_series(&closes, cfg.ema_short);
        let ema_long = ema_series(&closes, cfg.ema_long);
        let bands = bollinger_series(&closes, cfg.bb_period, cfg.bb_std_dev);

        let bundle = IndicatorBundle {
            rsi: latest_or(&rsi, NEUTRAL_RSI),
            macd_line: latest_or(&macd.line, 0.0),
            macd_signal: latest_or(&macd.signal, 0.0),
            macd_histogram: latest_or(&macd.histogram, 0.0),
            ema_short: latest_or(&ema_short, current),
            ema_long: latest_or(&ema_long, current),
            bb_upper: latest_or(&bands.upper, current * (1.0 + FALLBACK_BAND_PCT)),
            bb_middle: latest_or(&bands.middle, current),
            bb_lower: latest_or(&bands.lower, current * (1.0 - FALLBACK_BAND_PCT)),
            current_price: current,
            previous_price: previous,
        };

        debug!(indicators = %bundle, "Indicators calculated");
        Ok(bundle)
    }
}

/// Last non-NaN value of a series, or `default` if there is none.
pub fn latest_or(series: &[f64], default: f64) -> f64 {
    series
        .iter()
        .rev()
        .copied()
        .find(|v| !v.is_nan())
        .unwrap_or(default)
}

// ---------------------------------------------------------------------------
// Series math
// ---------------------------------------------------------------------------

/// Simple moving average. Defined from index `period - 1`.
pub fn sma_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut sum: f64 = values[..period].iter().sum();
    result[period - 1] = sum / period as f64;
    for i in period..n {
        sum += values[i] - values[i - period];
        result[i] = sum / period as f64;
    }
    result
}

/// Exponential moving average, seeded with the SMA of the first `period`
/// defined values. Leading NaNs (e.g. a MACD line in warm-up) are skipped.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 {
        return result;
    }

    let Some(start) = values.iter().position(|v| !v.is_nan()) else {
        return result;
    };
    if n - start < period {
        return result;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let seed_end = start + period;
    let seed = values[start..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = seed;

    let mut prev = seed;
    for i in seed_end..n {
        let ema = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = ema;
        prev = ema;
    }
    result
}

/// Wilder's RSI. Defined from index `period`.
pub fn rsi_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n <= period {
        return result;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = values[i] - values[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    result[period] = rsi_from_averages(avg_gain, avg_loss);

    let p = period as f64;
    for i in (period + 1)..n {
        let change = values[i] - values[i - 1];
        let (gain, loss) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        result[i] = rsi_from_averages(avg_gain, avg_loss);
    }
    result
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        // Flat series has no momentum either way.
        if avg_gain == 0.0 {
            return NEUTRAL_RSI;
        }
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// MACD line, signal line and histogram series.
#[derive(Debug, Clone)]
pub struct MacdSeries {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd_series(values: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let fast_ema = ema_series(values, fast);
    let slow_ema = ema_series(values, slow);
    // NaN - x stays NaN, so the line is defined only where both EMAs are.
    let line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema_series(&line, signal);
    let histogram = line.iter().zip(&signal_line).map(|(l, s)| l - s).collect();

    MacdSeries {
        line,
        signal: signal_line,
        histogram,
    }
}

/// Bollinger Band series (middle = SMA, width = `std_dev` population sigmas).
#[derive(Debug, Clone)]
pub struct BollingerSeries {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger_series(values: &[f64], period: usize, std_dev: f64) -> BollingerSeries {
    let n = values.len();
    let middle = sma_series(values, period);
    let mut upper = vec![f64::NAN; n];
    let mut lower = vec![f64::NAN; n];

    for i in 0..n {
        let mean = middle[i];
        if mean.is_nan() {
            continue;
        }
        let window = &values[i + 1 - period..=i];
        let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
        let width = std_dev * variance.sqrt();
        upper[i] = mean + width;
        lower[i] = mean - width;
    }

    BollingerSeries { upper, middle, lower }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Multi-indicator signal scoring.
//!
//! Each indicator independently votes a [`SignalStrength`] from -2 (strong
//! sell) to +2 (strong buy). Votes are combined with per-indicator weights
//! into a score normalized to [-1, 1], which maps to a direction and a
//! confidence.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

use crate::config::{IndicatorConfig, WeightsConfig};
use crate::strategy::indicators::IndicatorBundle;
use crate::types::Direction;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// RSI below this (but not oversold) is a mild buy.
const RSI_MILD_BUY_BELOW: f64 = 40.0;
/// RSI above this (but not overbought) is a mild sell.
const RSI_MILD_SELL_ABOVE: f64 = 60.0;
/// Position-in-band below which Bollinger votes BUY.
const BB_LOWER_ZONE: f64 = 0.3;
/// Position-in-band above which Bollinger votes SELL.
const BB_UPPER_ZONE: f64 = 0.7;
/// |normalized score| must exceed this to leave NEUTRAL.
pub const DIRECTION_THRESHOLD: f64 = 0.1;
/// Largest vote magnitude; divides the weighted sum into [-1, 1].
const MAX_SIGNAL: f64 = 2.0;

// ---------------------------------------------------------------------------
// Signal strength
// ---------------------------------------------------------------------------

/// A single indicator's vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum SignalStrength {
    StrongSell = -2,
    Sell = -1,
    Neutral = 0,
    Buy = 1,
    StrongBuy = 2,
}

impl SignalStrength {
    /// Clamp an arbitrary integer score into the -2..=2 range.
    pub fn clamped(score: i32) -> Self {
        match score.clamp(-2, 2) {
            -2 => SignalStrength::StrongSell,
            -1 => SignalStrength::Sell,
            0 => SignalStrength::Neutral,
            1 => SignalStrength::Buy,
            _ => SignalStrength::StrongBuy,
        }
    }

    pub fn value(self) -> i8 {
        self as i8
    }

    pub fn name(self) -> &'static str {
        match self {
            SignalStrength::StrongSell => "STRONG_SELL",
            SignalStrength::Sell => "SELL",
            SignalStrength::Neutral => "NEUTRAL",
            SignalStrength::Buy => "BUY",
            SignalStrength::StrongBuy => "STRONG_BUY",
        }
    }
}

impl fmt::Display for SignalStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<SignalStrength> for i8 {
    fn from(s: SignalStrength) -> i8 {
        s.value()
    }
}

impl TryFrom<i8> for SignalStrength {
    type Error = String;

    fn try_from(v: i8) -> Result<Self, Self::Error> {
        if (-2..=2).contains(&v) {
            Ok(SignalStrength::clamped(v as i32))
        } else {
            Err(format!("signal strength out of range: {v}"))
        }
    }
}

/// Indicators that take part in scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Rsi,
    Macd,
    EmaCrossover,
    Bollinger,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 4] = [
        IndicatorKind::Rsi,
        IndicatorKind::Macd,
        IndicatorKind::EmaCrossover,
        IndicatorKind::Bollinger,
    ];
}

// ---------------------------------------------------------------------------
// Weights
// ---------------------------------------------------------------------------

/// Effective per-indicator weights, summing to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub rsi: f64,
    pub macd: f64,
    pub ema_crossover: f64,
    pub bollinger: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            rsi: 0.25,
            macd: 0.30,
            ema_crossover: 0.25,
            bollinger: 0.20,
        }
    }
}

impl Weights {
    pub fn get(&self, kind: IndicatorKind) -> f64 {
        match kind {
            IndicatorKind::Rsi => self.rsi,
            IndicatorKind::Macd => self.macd,
            IndicatorKind::EmaCrossover => self.ema_crossover,
            IndicatorKind::Bollinger => self.bollinger,
        }
    }

    pub fn sum(&self) -> f64 {
        self.rsi + self.macd + self.ema_crossover + self.bollinger
    }

    /// Proportionally rescale so the weights sum to 1.0.
    ///
    /// Negative or non-finite entries count as zero. If nothing positive is
    /// left, the default weights are used. A sum further than `tolerance`
    /// from 1.0 is logged as a warning.
    pub fn normalized(self, tolerance: f64) -> Self {
        let clean = |v: f64| if v.is_finite() && v > 0.0 { v } else { 0.0 };
        let cleaned = Self {
            rsi: clean(self.rsi),
            macd: clean(self.macd),
            ema_crossover: clean(self.ema_crossover),
            bollinger: clean(self.bollinger),
        };

        let sum = cleaned.sum();
        if sum <= 0.0 {
            warn!(sum, "Indicator weights have no positive mass, using defaults");
            return Self::default();
        }

        if (sum - 1.0).abs() > tolerance {
            warn!(sum, "Indicator weights do not sum to 1.0, normalizing");
        } else if sum != 1.0 {
            debug!(sum, "Rescaling indicator weights within tolerance");
        }

        Self {
            rsi: cleaned.rsi / sum,
            macd: cleaned.macd / sum,
            ema_crossover: cleaned.ema_crossover / sum,
            bollinger: cleaned.bollinger / sum,
        }
    }
}

impl From<&WeightsConfig> for Weights {
    fn from(cfg: &WeightsConfig) -> Self {
        Self {
            rsi: cfg.rsi,
            macd: cfg.macd,
            ema_crossover: cfg.ema_crossover,
            bollinger: cfg.bollinger,
        }
    }
}

// ---------------------------------------------------------------------------
// Composite signal
// ---------------------------------------------------------------------------

/// The scorer's output for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeSignal {
    pub direction: Direction,
    /// 0.0 to 1.0; zero when neutral.
    pub confidence: f64,
    /// Weighted score normalized to -1.0 to 1.0.
    pub raw_score: f64,
    pub indicator_signals: BTreeMap<IndicatorKind, SignalStrength>,
    /// Audit trail, not used by any decision.
    pub reasoning: String,
}

impl fmt::Display for CompositeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} conf={:.1}% score={:+.3} [{}]",
            self.direction,
            self.confidence * 100.0,
            self.raw_score,
            self.reasoning,
        )
    }
}

/// Oversold / overbought RSI bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringThresholds {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
}

impl Default for ScoringThresholds {
    fn default() -> Self {
        Self {
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
        }
    }
}

impl From<&IndicatorConfig> for ScoringThresholds {
    fn from(cfg: &IndicatorConfig) -> Self {
        Self {
            rsi_oversold: cfg.rsi_oversold,
            rsi_overbought: cfg.rsi_overbought,
        }
    }
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

/// Combines indicator votes into a [`CompositeSignal`].
#[derive(Debug, Clone)]
pub struct SignalScorer {
    thresholds: ScoringThresholds,
    weights: Weights,
}

impl SignalScorer {
    /// Build a scorer. Weights are renormalized here, never rejected.
    pub fn new(thresholds: ScoringThresholds, weights: Weights, tolerance: f64) -> Self {
        Self {
            thresholds,
            weights: weights.normalized(tolerance),
        }
    }

    pub fn from_config(indicators: &IndicatorConfig, weights: &WeightsConfig) -> Self {
        Self::new(
            ScoringThresholds::from(indicators),
            Weights::from(weights),
            weights.sum_tolerance,
        )
    }

    /// Effective (normalized) weights.
    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    pub fn score(&self, ind: &IndicatorBundle) -> CompositeSignal {
        let rsi = score_rsi(ind.rsi, &self.thresholds);
        let macd = score_macd(ind.macd_line, ind.macd_signal, ind.macd_histogram);
        let ema = score_ema_crossover(ind.ema_short, ind.ema_long, ind.current_price);
        let bb = score_bollinger(ind.current_price, ind.bb_upper, ind.bb_lower);

        let mut signals = BTreeMap::new();
        signals.insert(IndicatorKind::Rsi, rsi);
        signals.insert(IndicatorKind::Macd, macd);
        signals.insert(IndicatorKind::EmaCrossover, ema);
        signals.insert(IndicatorKind::Bollinger, bb);

        let reasoning = format!("RSI({:.1}): {rsi} | MACD: {macd} | EMA: {ema} | BB: {bb}", ind.rsi);

        let weighted: f64 = signals
            .iter()
            .map(|(kind, s)| f64::from(s.value()) * self.weights.get(*kind))
            .sum();
        let raw_score = weighted / MAX_SIGNAL;

        let (direction, confidence) = direction_for(raw_score);

        let signal = CompositeSignal {
            direction,
            confidence,
            raw_score,
            indicator_signals: signals,
            reasoning,
        };

        info!(
            direction = %signal.direction,
            confidence = format!("{:.3}", signal.confidence),
            raw_score = format!("{:.3}", signal.raw_score),
            reasoning = %signal.reasoning,
            "Signal calculated"
        );
        signal
    }
}

/// Map a normalized score to a direction and confidence.
pub fn direction_for(raw_score: f64) -> (Direction, f64) {
    if raw_score > DIRECTION_THRESHOLD {
        (Direction::Up, raw_score.abs().min(1.0))
    } else if raw_score < -DIRECTION_THRESHOLD {
        (Direction::Down, raw_score.abs().min(1.0))
    } else {
        (Direction::Neutral, 0.0)
    }
}

// ---------------------------------------------------------------------------
// Per-indicator rules
// ---------------------------------------------------------------------------

/// Oversold is bullish, overbought is bearish.
pub fn score_rsi(rsi: f64, t: &ScoringThresholds) -> SignalStrength {
    if rsi < t.rsi_oversold {
        SignalStrength::StrongBuy
    } else if rsi < RSI_MILD_BUY_BELOW {
        SignalStrength::Buy
    } else if rsi > t.rsi_overbought {
        SignalStrength::StrongSell
    } else if rsi > RSI_MILD_SELL_ABOVE {
        SignalStrength::Sell
    } else {
        SignalStrength::Neutral
    }
}

/// Line vs. signal crossover plus histogram momentum.
pub fn score_macd(line: f64, signal: f64, histogram: f64) -> SignalStrength {
    let mut score = 0;
    if line > signal {
        score += 1;
    } else if line < signal {
        score -= 1;
    }
    if histogram > 0.0 {
        score += 1;
    } else if histogram < 0.0 {
        score -= 1;
    }
    SignalStrength::clamped(score)
}

/// Short/long crossover, plus price stacked above or below both EMAs.
pub fn score_ema_crossover(short: f64, long: f64, price: f64) -> SignalStrength {
    let mut score = 0;
    if short > long {
        score += 1;
    } else if short < long {
        score -= 1;
    }
    if price > short && short > long {
        score += 1;
    } else if price < short && short < long {
        score -= 1;
    }
    SignalStrength::clamped(score)
}

/// Mean reversion against the bands.
///
/// The outside-band checks come before the position checks they overlap
/// with; the evaluation order decides boundary cases.
pub fn score_bollinger(price: f64, upper: f64, lower: f64) -> SignalStrength {
    let width = upper - lower;
    if width == 0.0 {
        return SignalStrength::Neutral;
    }
    let position = (price - lower) / width;

    if price < lower {
        SignalStrength::StrongBuy
    } else if position < BB_LOWER_ZONE {
        SignalStrength::Buy
    } else if price > upper {
        SignalStrength::StrongSell
    } else if position > BB_UPPER_ZONE {
        SignalStrength::Sell
    } else {
        SignalStrength::Neutral
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_scorer() -> SignalScorer {
        SignalScorer::new(ScoringThresholds::default(), Weights::default(), 0.01)
    }

    fn bullish_bundle() -> IndicatorBundle {
        IndicatorBundle {
            rsi: 25.0,
            macd_line: 100.0,
            macd_signal: 80.0,
            macd_histogram: 20.0,
            ema_short: 45_000.0,
            ema_long: 44_500.0,
            bb_upper: 46_000.0,
            bb_middle: 45_000.0,
            bb_lower: 44_000.0,
            current_price: 43_500.0,
            previous_price: 43_600.0,
        }
    }

    fn bearish_bundle() -> IndicatorBundle {
        IndicatorBundle {
            rsi: 80.0,
            macd_line: 80.0,
            macd_signal: 100.0,
            macd_histogram: -20.0,
            ema_short: 44_500.0,
            ema_long: 45_000.0,
            current_price: 47_000.0,
            previous_price: 46_800.0,
            ..bullish_bundle()
        }
    }

    fn neutral_bundle() -> IndicatorBundle {
        IndicatorBundle {
            rsi: 50.0,
            macd_line: 100.0,
            macd_signal: 100.0,
            macd_histogram: 0.0,
            ema_short: 45_000.0,
            ema_long: 45_000.0,
            current_price: 45_000.0,
            previous_price: 45_000.0,
            ..bullish_bundle()
        }
    }

    // -- Composite --

    #[test]
    fn test_bullish_signal() {
        let signal = make_scorer().score(&bullish_bundle());
        assert_eq!(signal.direction, Direction::Up);
        assert!(signal.confidence > 0.5);
        // 2*.25 + 2*.30 + 1*.25 + 2*.20 = 1.75 → 0.875
        assert!((signal.raw_score - 0.875).abs() < 1e-9);
        assert_eq!(signal.indicator_signals[&IndicatorKind::EmaCrossover], SignalStrength::Buy);
    }

    #[test]
    fn test_bearish_signal() {
        let signal = make_scorer().score(&bearish_bundle());
        assert_eq!(signal.direction, Direction::Down);
        assert!(signal.confidence > 0.5);
        assert!(signal.raw_score < 0.0);
    }

    #[test]
    fn test_neutral_signal() {
        let signal = make_scorer().score(&neutral_bundle());
        assert_eq!(signal.direction, Direction::Neutral);
        assert_eq!(signal.confidence, 0.0);
        assert_eq!(signal.raw_score, 0.0);
    }

    #[test]
    fn test_direction_threshold_is_exclusive() {
        assert_eq!(direction_for(0.1), (Direction::Neutral, 0.0));
        assert_eq!(direction_for(-0.1), (Direction::Neutral, 0.0));
        assert_eq!(direction_for(0.125), (Direction::Up, 0.125));
        assert_eq!(direction_for(-0.5), (Direction::Down, 0.5));
    }

    #[test]
    fn test_every_indicator_votes() {
        let signal = make_scorer().score(&neutral_bundle());
        for kind in IndicatorKind::ALL {
            assert_eq!(signal.indicator_signals[&kind], SignalStrength::Neutral);
        }
    }

    #[test]
    fn test_reasoning_lists_every_indicator() {
        let signal = make_scorer().score(&bullish_bundle());
        assert_eq!(
            signal.reasoning,
            "RSI(25.0): STRONG_BUY | MACD: STRONG_BUY | EMA: BUY | BB: STRONG_BUY"
        );
    }

    #[test]
    fn test_signal_serialization() {
        let signal = make_scorer().score(&bullish_bundle());
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["direction"], "UP");
        assert_eq!(json["indicator_signals"]["rsi"], 2);
        let back: CompositeSignal = serde_json::from_value(json).unwrap();
        assert_eq!(back, signal);
    }

    // -- Weights --

    #[test]
    fn test_weights_renormalized() {
        let cases = [
            Weights { rsi: 1.0, macd: 1.0, ema_crossover: 1.0, bollinger: 1.0 },
            Weights { rsi: 0.5, macd: 0.0, ema_crossover: 0.0, bollinger: 0.0 },
            Weights { rsi: 0.3, macd: 0.3, ema_crossover: 0.3, bollinger: 0.3 },
            Weights { rsi: 0.251, macd: 0.3, ema_crossover: 0.25, bollinger: 0.2 },
            Weights { rsi: 7.0, macd: 0.001, ema_crossover: 3.5, bollinger: 12.0 },
        ];
        for w in cases {
            let n = w.normalized(0.01);
            assert!((n.sum() - 1.0).abs() < 1e-6, "{w:?} -> {n:?}");
        }
    }

    #[test]
    fn test_weights_keep_proportions() {
        let n = Weights { rsi: 2.0, macd: 2.0, ema_crossover: 4.0, bollinger: 0.0 }.normalized(0.01);
        assert!((n.rsi - 0.25).abs() < 1e-12);
        assert!((n.ema_crossover - 0.5).abs() < 1e-12);
        assert_eq!(n.bollinger, 0.0);
    }

    #[test]
    fn test_zero_weights_fall_back_to_default() {
        let n = Weights { rsi: 0.0, macd: 0.0, ema_crossover: 0.0, bollinger: 0.0 }.normalized(0.01);
        assert_eq!(n, Weights::default());
    }

    #[test]
    fn test_scorer_uses_normalized_weights() {
        let scorer = SignalScorer::new(
            ScoringThresholds::default(),
            Weights { rsi: 1.0, macd: 1.0, ema_crossover: 1.0, bollinger: 1.0 },
            0.01,
        );
        assert!((scorer.weights().sum() - 1.0).abs() < 1e-12);
        assert!((scorer.weights().macd - 0.25).abs() < 1e-12);
    }

    // -- RSI --

    #[test]
    fn test_rsi_boundaries() {
        let t = ScoringThresholds::default();
        assert_eq!(score_rsi(30.0, &t), SignalStrength::Buy);
        assert_eq!(score_rsi(29.0, &t), SignalStrength::StrongBuy);
        assert_eq!(score_rsi(39.9, &t), SignalStrength::Buy);
        assert_eq!(score_rsi(40.0, &t), SignalStrength::Neutral);
        assert_eq!(score_rsi(60.0, &t), SignalStrength::Neutral);
        assert_eq!(score_rsi(60.1, &t), SignalStrength::Sell);
        assert_eq!(score_rsi(70.0, &t), SignalStrength::Sell);
        assert_eq!(score_rsi(71.0, &t), SignalStrength::StrongSell);
    }

    #[test]
    fn test_rsi_oversold_boundary_is_exclusive() {
        // With oversold below the mild-buy bound the boundary falls through
        // to the mild zone; with oversold at 40 the boundary itself is neutral.
        let t = ScoringThresholds { rsi_oversold: 40.0, rsi_overbought: 70.0 };
        assert_eq!(score_rsi(40.0, &t), SignalStrength::Neutral);
        assert_eq!(score_rsi(39.0, &t), SignalStrength::StrongBuy);
    }

    // -- MACD --

    #[test]
    fn test_macd_rules() {
        assert_eq!(score_macd(100.0, 80.0, 20.0), SignalStrength::StrongBuy);
        assert_eq!(score_macd(80.0, 100.0, -20.0), SignalStrength::StrongSell);
        assert_eq!(score_macd(100.0, 80.0, -1.0), SignalStrength::Neutral);
        assert_eq!(score_macd(100.0, 100.0, 0.0), SignalStrength::Neutral);
        assert_eq!(score_macd(100.0, 100.0, 5.0), SignalStrength::Buy);
    }

    // -- EMA --

    #[test]
    fn test_ema_rules() {
        assert_eq!(score_ema_crossover(45_000.0, 44_500.0, 46_000.0), SignalStrength::StrongBuy);
        assert_eq!(score_ema_crossover(45_000.0, 44_500.0, 43_000.0), SignalStrength::Buy);
        assert_eq!(score_ema_crossover(44_500.0, 45_000.0, 44_000.0), SignalStrength::StrongSell);
        assert_eq!(score_ema_crossover(44_500.0, 45_000.0, 46_000.0), SignalStrength::Sell);
        assert_eq!(score_ema_crossover(45_000.0, 45_000.0, 46_000.0), SignalStrength::Neutral);
    }

    // -- Bollinger --

    #[test]
    fn test_bollinger_rules() {
        assert_eq!(score_bollinger(43_500.0, 46_000.0, 44_000.0), SignalStrength::StrongBuy);
        assert_eq!(score_bollinger(44_500.0, 46_000.0, 44_000.0), SignalStrength::Buy);
        assert_eq!(score_bollinger(45_000.0, 46_000.0, 44_000.0), SignalStrength::Neutral);
        assert_eq!(score_bollinger(45_500.0, 46_000.0, 44_000.0), SignalStrength::Sell);
        assert_eq!(score_bollinger(47_000.0, 46_000.0, 44_000.0), SignalStrength::StrongSell);
    }

    #[test]
    fn test_bollinger_band_edges() {
        // On the lower band: position 0 → BUY, not STRONG_BUY.
        assert_eq!(score_bollinger(44_000.0, 46_000.0, 44_000.0), SignalStrength::Buy);
        // On the upper band: position 1 → SELL, not STRONG_SELL.
        assert_eq!(score_bollinger(46_000.0, 46_000.0, 44_000.0), SignalStrength::Sell);
    }

    #[test]
    fn test_bollinger_degenerate_band_is_neutral() {
        for price in [0.0, 44_000.0, 45_000.0, 1e9] {
            assert_eq!(score_bollinger(price, 45_000.0, 45_000.0), SignalStrength::Neutral);
        }
    }

    // -- SignalStrength --

    #[test]
    fn test_signal_strength_clamp_and_names() {
        assert_eq!(SignalStrength::clamped(5), SignalStrength::StrongBuy);
        assert_eq!(SignalStrength::clamped(-9), SignalStrength::StrongSell);
        assert_eq!(SignalStrength::Buy.value(), 1);
        assert_eq!(SignalStrength::StrongSell.to_string(), "STRONG_SELL");
        assert!(SignalStrength::try_from(3i8).is_err());
    }
}

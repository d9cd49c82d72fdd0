//! Signal strategy — indicator computation and multi-indicator scoring.

pub mod indicators;
pub mod scoring;

use tracing::info;

use crate::config::AppConfig;
use crate::types::{BotError, CandleSeries};
use indicators::{IndicatorBundle, IndicatorEngine};
use scoring::{CompositeSignal, SignalScorer};

/// Indicator bundle plus the signal derived from it.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub indicators: IndicatorBundle,
    pub signal: CompositeSignal,
}

/// Pipelines candle series → indicator bundle → composite signal.
///
/// Pure: holds only static parameters, so one instance serves every cycle.
#[derive(Debug, Clone)]
pub struct SignalPipeline {
    engine: IndicatorEngine,
    scorer: SignalScorer,
}

impl SignalPipeline {
    pub fn new(engine: IndicatorEngine, scorer: SignalScorer) -> Self {
        Self { engine, scorer }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(
            IndicatorEngine::new(cfg.indicators.clone()),
            SignalScorer::from_config(&cfg.indicators, &cfg.weights),
        )
    }

    pub fn scorer(&self) -> &SignalScorer {
        &self.scorer
    }

    /// Compute indicators and score them.
    pub fn analyze(&self, candles: &CandleSeries) -> Result<Analysis, BotError> {
        let indicators = self.engine.compute(candles)?;
        info!(
            price = format!("${:.2}", indicators.current_price),
            change = format!("{:+.2}%", indicators.price_change_pct()),
            rsi = format!("{:.2}", indicators.rsi),
            "Indicators computed"
        );

        let signal = self.scorer.score(&indicators);
        Ok(Analysis { indicators, signal })
    }
}

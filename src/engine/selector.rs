//! Market selector — picks the single best market to trade this cycle.
//!
//! Each candidate earns points for a tight YES/NO spread, a resolution time
//! inside the next day (sooner is better, down to 15 minutes), and volume.
//! Wide-spread and already-resolved markets are never eligible.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::types::{Market, MAX_LIQUID_SPREAD};

/// Volume above which a market earns a bonus point.
pub const HIGH_VOLUME: f64 = 10_000.0;

/// Spread buckets: (exclusive upper bound, points).
const SPREAD_POINTS: [(f64, u32); 3] = [(0.02, 3), (0.05, 2), (MAX_LIQUID_SPREAD, 1)];

/// Time-to-resolution buckets in hours: (exclusive lower, inclusive upper, points).
const TIME_POINTS: [(f64, f64, u32); 3] = [(0.25, 1.0, 3), (1.0, 4.0, 2), (4.0, 24.0, 1)];

/// Score a market, or `None` if it must never be selected.
pub fn score_market(market: &Market, now: DateTime<Utc>) -> Option<u32> {
    let spread = market.spread();
    let spread_points = SPREAD_POINTS
        .iter()
        .find(|(bound, _)| spread < *bound)
        .map(|(_, points)| *points)?;

    let time_points = match market.time_to_resolution(now) {
        // Unknown resolution time scores nothing but stays eligible.
        None => 0,
        Some(remaining) => {
            let hours = remaining.num_milliseconds() as f64 / 3_600_000.0;
            if hours <= 0.0 {
                return None;
            }
            TIME_POINTS
                .iter()
                .find(|(lo, hi, _)| hours > *lo && hours <= *hi)
                .map(|(_, _, points)| *points)
                .unwrap_or(0)
        }
    };

    let volume_points = u32::from(market.volume > HIGH_VOLUME);

    Some(spread_points + time_points + volume_points)
}

/// Stateless selector over a candidate list.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketSelector;

impl MarketSelector {
    /// Highest-scoring eligible market; ties keep the first seen.
    pub fn select<'a>(&self, markets: &'a [Market], now: DateTime<Utc>) -> Option<&'a Market> {
        let mut best: Option<(&Market, u32)> = None;

        for market in markets {
            let Some(score) = score_market(market, now) else {
                debug!(market_id = %market.id, spread = market.spread(), "Market ineligible");
                continue;
            };
            debug!(market_id = %market.id, score, "Market scored");

            if best.map_or(true, |(_, top)| score > top) {
                best = Some((market, score));
            }
        }

        if let Some((market, score)) = best {
            info!(market_id = %market.id, score, market = %market, "Selected market");
        }
        best.map(|(market, _)| market)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

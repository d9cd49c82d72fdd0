//! Core engine — the select → gate → execute path and the cycle that
//! drives it.

pub mod cycle;
pub mod executor;
pub mod paper;
pub mod selector;

pub use cycle::{CycleReport, CycleStatus, TradingBot};
pub use executor::{ExecutionStrategy, SkipReason, TradeExecutor, TradeOutcome};
pub use paper::{PaperTrader, PortfolioSummary, SettlementOutcome};
pub use selector::MarketSelector;

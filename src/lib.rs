//! BTC ORACLE — Bitcoin direction signals traded on Polymarket.
//!
//! Candles come in from Binance, [`strategy`] turns them into a composite
//! UP/DOWN signal, [`engine`] picks a market and trades it (paper or live),
//! and [`storage`] keeps the paper portfolio across restarts.

pub mod config;
pub mod engine;
pub mod platforms;
pub mod schedule;
pub mod storage;
pub mod strategy;
pub mod types;

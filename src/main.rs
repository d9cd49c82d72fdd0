//! BTC ORACLE — Bitcoin direction signals traded on Polymarket.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the data sources and executor, then runs one trading cycle
//! immediately and another on every aligned clock boundary, resetting the
//! daily trade counter at UTC midnight, until Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::time::{sleep_until, Instant};
use tracing::{error, info, warn};

use btc_oracle::config::AppConfig;
use btc_oracle::engine::{CycleReport, ExecutionStrategy, PaperTrader, TradeExecutor, TradingBot};
use btc_oracle::platforms::binance::BinanceClient;
use btc_oracle::platforms::polymarket::PolymarketClient;
use btc_oracle::platforms::TradingVenue;
use btc_oracle::schedule;
use btc_oracle::storage::JsonFileStore;
use btc_oracle::types::TradingMode;

const BANNER: &str = r#"
 ____ _____ ____     ___  ____      _    ____ _     _____
| __ )_   _/ ___|   / _ \|  _ \    / \  / ___| |   | ____|
|  _ \ | || |      | | | | |_) |  / _ \| |   | |   |  _|
| |_) || || |___   | |_| |  _ <  / ___ \ |___| |___| |___
|____/ |_| \____|   \___/|_| \_\/_/   \_\____|_____|_____|

  Bitcoin direction signals on Polymarket
  v0.1.0
"#;

/// Config file path, overridable via `BTC_ORACLE_CONFIG`.
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("BTC_ORACLE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        mode = %cfg.trading.mode,
        stake = format!("${:.2}", cfg.trading.trade_amount_usd),
        interval_minutes = cfg.trading.interval_minutes,
        max_daily_trades = cfg.trading.max_daily_trades,
        min_confidence = cfg.trading.min_score_threshold,
        symbol = %cfg.binance.symbol,
        "BTC ORACLE starting up"
    );

    // -- Initialise components -------------------------------------------

    let candles = BinanceClient::new(&cfg.binance).context("Failed to build Binance client")?;
    let polymarket = PolymarketClient::from_config(&cfg.polymarket, cfg.trading.mode)
        .context("Failed to build Polymarket client")?;

    let strategy = match cfg.trading.mode {
        TradingMode::Paper => {
            let store = JsonFileStore::new(cfg.storage.portfolio_path.clone());
            ExecutionStrategy::Paper(PaperTrader::new(Box::new(store), cfg.trading.initial_balance))
        }
        TradingMode::Live => {
            warn!("LIVE TRADING ENABLED: orders spend real money");
            ExecutionStrategy::Live(Box::new(polymarket.clone()))
        }
    };
    if matches!(cfg.trading.mode, TradingMode::Live) {
        log_venue_state(&polymarket).await;
    }
    let executor = TradeExecutor::new(strategy, &cfg.trading);
    let mut bot = TradingBot::new(&cfg, Box::new(candles), Box::new(polymarket), executor);

    // -- Main loop -------------------------------------------------------

    let interval = cfg.trading.interval_minutes;
    let next_tick = sleep_until(until(schedule::next_aligned_tick(Utc::now(), interval)));
    let midnight = sleep_until(until(schedule::next_midnight(Utc::now())));
    let shutdown = shutdown_signal();
    tokio::pin!(next_tick, midnight, shutdown);

    info!(interval_minutes = interval, "Entering main loop. Press Ctrl+C to stop.");
    run_and_log(&mut bot).await;

    loop {
        // Polled in order: at 00:00 the midnight arm wins over the tick.
        tokio::select! {
            biased;

            signal = &mut shutdown => {
                info!(signal, "Shutdown signal received.");
                break;
            }
            _ = &mut midnight => {
                if bot.roll_day(Utc::now()) {
                    info!("New trading day");
                }
                midnight.as_mut().reset(until(schedule::next_midnight(Utc::now())));
            }
            _ = &mut next_tick => {
                run_and_log(&mut bot).await;
                // Boundaries that passed while the cycle ran are skipped.
                let next = schedule::next_aligned_tick(Utc::now(), interval);
                next_tick.as_mut().reset(until(next));
                info!(next_run = %next, "Next cycle scheduled");
            }
        }
    }

    // Persist final state
    if let Some(paper) = bot.executor().paper() {
        if let Err(e) = bot.executor().flush() {
            error!(error = %e, "Failed to save portfolio on shutdown");
        }
        info!(summary = %paper.summary(), "Paper portfolio");
    }
    info!(
        cycles = bot.cycle_count(),
        daily_trades = bot.executor().daily_trades(),
        "BTC ORACLE shut down cleanly."
    );

    Ok(())
}

/// Startup snapshot of orders and holdings already on the venue.
async fn log_venue_state(venue: &dyn TradingVenue) {
    match venue.open_orders().await {
        Ok(orders) => {
            for order in &orders {
                info!(
                    order_id = %order.order_id,
                    side = %order.side,
                    price = order.price,
                    remaining = order.remaining(),
                    "Resting order"
                );
            }
        }
        Err(e) => warn!(error = %e, "Could not list open orders"),
    }
    match venue.positions().await {
        Ok(positions) => {
            for p in &positions {
                info!(
                    token_id = %p.token_id,
                    outcome = %p.outcome,
                    size = p.size,
                    pnl = format!("{:+.2}", p.unrealized_pnl()),
                    "Open position"
                );
            }
        }
        Err(e) => warn!(error = %e, "Could not fetch positions"),
    }
}

/// Run one cycle; a failed cycle is logged and the loop carries on.
async fn run_and_log(bot: &mut TradingBot) {
    match bot.run_cycle().await {
        Ok(report) => log_cycle_report(&report),
        Err(e) => {
            error!(stage = %e.stage, error = %e.source, "Cycle failed, continuing to next");
        }
    }
}

/// Log a human-readable cycle summary.
fn log_cycle_report(report: &CycleReport) {
    info!(
        cycle = report.cycle_number,
        status = %report.status,
        btc_price = format!("${:.2}", report.spot_price),
        direction = %report.signal.direction,
        confidence = format!("{:.2}", report.signal.confidence),
        markets = report.markets_found,
        market = report.selected_market.as_ref().map(|m| m.question.as_str()).unwrap_or("-"),
        outcome = %report.outcome.as_ref().map(|o| o.to_string()).unwrap_or_default(),
        "Cycle complete"
    );
}

/// Resolves on Ctrl+C, or SIGTERM on unix, naming the signal.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}

fn until(target: chrono::DateTime<Utc>) -> Instant {
    Instant::now() + schedule::delay_until(Utc::now(), target)
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("btc_oracle=info"));

    let json_logging = std::env::var("BTC_ORACLE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

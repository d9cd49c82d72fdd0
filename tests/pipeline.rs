//! End-to-end tests: data in, signal, market selection, gated execution,
//! settlement and persistence, all against the in-memory exchange.

mod common;

use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use btc_oracle::config::AppConfig;
use btc_oracle::engine::{
    CycleStatus, ExecutionStrategy, PaperTrader, SettlementOutcome, SkipReason, TradeExecutor,
    TradeOutcome, TradingBot,
};
use btc_oracle::platforms::{LimitOrderRequest, OrderSide, TradingVenue};
use btc_oracle::storage::{JsonFileStore, MemoryStore, PortfolioStore};
use btc_oracle::strategy::indicators::IndicatorBundle;
use btc_oracle::strategy::scoring::{ScoringThresholds, SignalScorer, Weights};
use btc_oracle::types::{BotError, Direction, Side, Stage, TradeStatus, TradingMode};

use common::{make_market, now, series_from_closes, MockExchange};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// RSI and Bollinger carry the crash series into an UP call.
fn make_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.trading.min_score_threshold = 0.0;
    config.weights.rsi = 0.4;
    config.weights.bollinger = 0.4;
    config.weights.macd = 0.1;
    config.weights.ema_crossover = 0.1;
    config
}

fn make_paper_bot(config: &AppConfig, exchange: &MockExchange) -> (TradingBot, MemoryStore) {
    let store = MemoryStore::new();
    let trader = PaperTrader::new(Box::new(store.clone()), config.trading.initial_balance);
    let executor = TradeExecutor::new(ExecutionStrategy::Paper(trader), &config.trading);
    let bot = TradingBot::new(
        config,
        Box::new(exchange.clone()),
        Box::new(exchange.clone()),
        executor,
    );
    (bot, store)
}

fn temp_path() -> String {
    std::env::temp_dir()
        .join(format!("btc_oracle_it_{}", Uuid::new_v4()))
        .join("paper_trades.json")
        .to_string_lossy()
        .into_owned()
}

// ---------------------------------------------------------------------------
// Signal to trade
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_oversold_bundle_buys_yes_on_selected_market() {
    let bundle = IndicatorBundle {
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
        previous_price: 43_800.0,
    };
    let scorer = SignalScorer::new(ScoringThresholds::default(), Weights::default(), 0.01);
    let signal = scorer.score(&bundle);
    assert_eq!(signal.direction, Direction::Up);
    assert!(signal.confidence > 0.5);
    // RSI +2, MACD +2, EMA +1, BB +2 under 0.25/0.30/0.25/0.20
    assert!((signal.raw_score - 0.875).abs() < 1e-9);

    let config = AppConfig::default();
    let store = MemoryStore::new();
    let trader = PaperTrader::new(Box::new(store.clone()), 1000.0);
    let mut executor = TradeExecutor::new(ExecutionStrategy::Paper(trader), &config.trading);

    let markets = vec![
        make_market("WIDE", 0.40, 0.66, 45, 50_000.0),
        make_market("HOURLY", 0.45, 0.56, 45, 20_000.0),
    ];
    let market = btc_oracle::engine::MarketSelector
        .select(&markets, now())
        .expect("a liquid market");
    assert_eq!(market.id, "HOURLY");

    let outcome = executor.execute(market, &signal, 43_500.0).await;
    let TradeOutcome::Simulated(trade) = outcome else {
        panic!("expected a simulated trade");
    };
    assert_eq!(trade.outcome, Side::Yes);
    assert_eq!(trade.token_id, "HOURLY-yes");
    assert!((trade.entry_price - 0.45).abs() < 1e-9);
    assert!((trade.amount_usd - 10.0).abs() < 1e-9);
    assert_eq!(trade.status, TradeStatus::Open);
    assert_eq!(executor.daily_trades(), 1);

    let paper = executor.paper().unwrap();
    assert!((paper.balance() - 990.0).abs() < 1e-9);
    assert_eq!(store.save_count(), 1);
}

#[test]
fn test_weights_always_renormalize() {
    let cases = [
        Weights { rsi: 0.5, macd: 0.5, ema_crossover: 0.5, bollinger: 0.5 },
        Weights { rsi: 0.1, macd: 0.0, ema_crossover: 0.0, bollinger: 0.0 },
        Weights { rsi: -1.0, macd: 0.3, ema_crossover: f64::NAN, bollinger: 0.3 },
        Weights { rsi: 0.0, macd: 0.0, ema_crossover: 0.0, bollinger: 0.0 },
    ];
    for weights in cases {
        let scorer = SignalScorer::new(ScoringThresholds::default(), weights, 0.01);
        assert!((scorer.weights().sum() - 1.0).abs() < 1e-9, "{weights:?}");
    }
}

// ---------------------------------------------------------------------------
// Full cycles
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_paper_cycle_persists_trade_to_disk() {
    let path = temp_path();
    let config = make_config();
    let exchange = MockExchange::new();

    let trader = PaperTrader::new(Box::new(JsonFileStore::new(path.clone())), 1000.0);
    let executor = TradeExecutor::new(ExecutionStrategy::Paper(trader), &config.trading);
    let mut bot = TradingBot::new(
        &config,
        Box::new(exchange.clone()),
        Box::new(exchange.clone()),
        executor,
    );

    let report = assert_ok!(bot.run_cycle_at(now()).await);
    assert_eq!(report.status, CycleStatus::Executed);
    assert_eq!(report.signal.direction, Direction::Up);
    assert_eq!(report.markets_found, 3);
    assert_eq!(report.selected_market.as_ref().unwrap().id, "MOCK-BTC-HOURLY");
    assert!((report.spot_price - 42_510.0).abs() < 1e-9);

    // A fresh trader over the same file sees the trade.
    let reloaded = PaperTrader::new(Box::new(JsonFileStore::new(path.clone())), 5000.0);
    assert_eq!(reloaded.portfolio().trades.len(), 1);
    assert!((reloaded.balance() - 990.0).abs() < 1e-9);
    assert!((reloaded.portfolio().initial_balance - 1000.0).abs() < 1e-9);
    let trade = &reloaded.portfolio().trades[0];
    assert_eq!(trade.market_id, "MOCK-BTC-HOURLY");
    assert!((trade.spot_price_at_entry - 42_510.0).abs() < 1e-9);

    let dir = std::path::Path::new(&path).parent().unwrap().to_path_buf();
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_daily_limit_then_midnight_reset() {
    let mut config = make_config();
    config.trading.max_daily_trades = 2;
    let exchange = MockExchange::new();
    let (mut bot, _) = make_paper_bot(&config, &exchange);

    for _ in 0..2 {
        let report = assert_ok!(bot.run_cycle_at(now()).await);
        assert_eq!(report.status, CycleStatus::Executed);
    }

    let report = assert_ok!(bot.run_cycle_at(now()).await);
    assert_eq!(report.status, CycleStatus::Skipped);
    assert!(matches!(
        report.outcome,
        Some(TradeOutcome::Skipped(SkipReason::DailyLimitReached))
    ));
    assert_eq!(bot.executor().daily_trades(), 2);

    bot.reset_daily_counter();
    assert_eq!(bot.executor().daily_trades(), 0);
    // History survives the reset.
    assert_eq!(bot.executor().paper().unwrap().portfolio().trades.len(), 2);

    let report = assert_ok!(bot.run_cycle_at(now()).await);
    assert_eq!(report.status, CycleStatus::Executed);
    assert_eq!(bot.cycle_count(), 4);
}

#[tokio::test]
async fn test_low_confidence_skips_without_trading() {
    let mut config = make_config();
    config.trading.min_score_threshold = 0.95;
    let exchange = MockExchange::new();
    let (mut bot, store) = make_paper_bot(&config, &exchange);

    let report = assert_ok!(bot.run_cycle_at(now()).await);
    assert_eq!(report.status, CycleStatus::Skipped);
    assert!(matches!(
        report.outcome,
        Some(TradeOutcome::Skipped(SkipReason::LowConfidence))
    ));
    assert_eq!(bot.executor().daily_trades(), 0);
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn test_no_markets_and_no_suitable_market() {
    let config = make_config();
    let exchange = MockExchange::with_markets(Vec::new());
    let (mut bot, _) = make_paper_bot(&config, &exchange);

    let report = assert_ok!(bot.run_cycle_at(now()).await);
    assert_eq!(report.status, CycleStatus::NoMarkets);
    assert!(report.outcome.is_none());

    // Too wide, expired, and resolving inside 15 minutes.
    exchange.set_markets(vec![
        make_market("WIDE", 0.30, 0.85, 60, 50_000.0),
        make_market("EXPIRED", 0.50, 0.50, -5, 50_000.0),
        make_market("IMMINENT", 0.50, 0.50, 10, 50_000.0),
    ]);
    let report = assert_ok!(bot.run_cycle_at(now()).await);
    assert_eq!(report.status, CycleStatus::NoSuitableMarket);
    assert_eq!(report.markets_found, 3);
    assert!(report.selected_market.is_none());
    assert_eq!(bot.executor().daily_trades(), 0);
}

#[tokio::test]
async fn test_source_failure_aborts_cycle_without_side_effects() {
    let config = make_config();
    let exchange = MockExchange::new();
    let (mut bot, store) = make_paper_bot(&config, &exchange);

    exchange.set_error("connection reset");
    let err = assert_err!(bot.run_cycle_at(now()).await);
    assert_eq!(err.stage, Stage::FetchCandles);
    assert!(matches!(err.source, BotError::DataSource { .. }));
    assert_eq!(store.save_count(), 0);
    assert_eq!(bot.executor().daily_trades(), 0);

    // The next cycle recovers.
    exchange.clear_error();
    let report = assert_ok!(bot.run_cycle_at(now()).await);
    assert_eq!(report.status, CycleStatus::Executed);
    // The aborted cycle did not take a number.
    assert_eq!(report.cycle_number, 1);
    assert_eq!(bot.cycle_count(), 1);
}

#[tokio::test]
async fn test_short_history_fails_at_indicator_stage() {
    let config = make_config();
    let exchange = MockExchange::new();
    exchange.set_series(series_from_closes(&[45_000.0; 10]));
    let (mut bot, _) = make_paper_bot(&config, &exchange);

    let err = assert_err!(bot.run_cycle_at(now()).await);
    assert_eq!(err.stage, Stage::Indicators);
    assert!(matches!(
        err.source,
        BotError::InsufficientData { needed: 26, got: 10 }
    ));
}

#[tokio::test]
async fn test_live_cycle_submits_fok_buy() {
    let mut config = make_config();
    config.trading.mode = TradingMode::Live;
    let exchange = MockExchange::new();
    let venue = MockExchange::new();

    let executor = TradeExecutor::new(ExecutionStrategy::Live(Box::new(venue.clone())), &config.trading);
    let mut bot = TradingBot::new(
        &config,
        Box::new(exchange.clone()),
        Box::new(exchange.clone()),
        executor,
    );
    assert!(bot.executor().paper().is_none());

    venue.set_error("order rejected: not enough liquidity");
    let report = assert_ok!(bot.run_cycle_at(now()).await);
    assert_eq!(report.status, CycleStatus::Failed);
    assert!(matches!(
        report.outcome,
        Some(TradeOutcome::Failed { mode: TradingMode::Live, error: BotError::Venue(_) })
    ));
    assert_eq!(bot.executor().daily_trades(), 0);
    assert!(venue.orders().is_empty());

    venue.clear_error();
    let report = assert_ok!(bot.run_cycle_at(now()).await);
    assert_eq!(report.status, CycleStatus::Executed);
    assert_eq!(bot.executor().daily_trades(), 1);

    let orders = venue.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].side, Side::Yes);
    assert_eq!(orders[0].token_id, "MOCK-BTC-HOURLY-yes");
    assert!((orders[0].amount_usd - 10.0).abs() < 1e-9);

    // Live trades are not tracked locally.
    assert_eq!(bot.settle_trade("paper_000001", true), SettlementOutcome::NotFound);

    let positions = assert_ok!(venue.positions().await);
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].token_id, "MOCK-BTC-HOURLY-yes");
}

#[tokio::test]
async fn test_resting_orders_cancel_individually_and_in_bulk() {
    let mock = MockExchange::new();
    let venue: &dyn TradingVenue = &mock;
    let limit = |token: &str, side, price| LimitOrderRequest {
        token_id: token.to_string(),
        side,
        price,
        size: 20.0,
    };

    let first = assert_ok!(venue.submit_limit_order(&limit("111", OrderSide::Buy, 0.42)).await);
    assert_ok!(venue.submit_limit_order(&limit("222", OrderSide::Sell, 0.61)).await);
    assert_ok!(venue.submit_limit_order(&limit("111", OrderSide::Buy, 0.40)).await);
    assert_err!(venue.submit_limit_order(&limit("111", OrderSide::Buy, 1.0)).await);
    assert_eq!(assert_ok!(venue.open_orders().await).len(), 3);

    let report = assert_ok!(venue.cancel_order(&first.order_id).await);
    assert_eq!(report.canceled, vec![first.order_id.clone()]);
    let report = assert_ok!(venue.cancel_order(&first.order_id).await);
    assert!(report.not_canceled.contains_key(&first.order_id));

    let open = assert_ok!(venue.open_orders().await);
    assert_eq!(open.len(), 2);
    assert!(open.iter().any(|o| o.side == OrderSide::Sell && o.remaining() == 20.0));

    let report = assert_ok!(venue.cancel_all_orders().await);
    assert_eq!(report.canceled.len(), 2);
    assert!(assert_ok!(venue.open_orders().await).is_empty());

    mock.set_error("venue down");
    assert_err!(venue.open_orders().await);
}

// ---------------------------------------------------------------------------
// Settlement & persistence
// ---------------------------------------------------------------------------

#[test]
fn test_settlement_pays_stake_over_entry() {
    let store = MemoryStore::new();
    let mut trader = PaperTrader::new(Box::new(store.clone()), 1000.0);
    let winner = make_market("WIN", 0.40, 0.60, 60, 20_000.0);
    let loser = make_market("LOSE", 0.50, 0.50, 60, 20_000.0);

    let won = assert_ok!(trader.execute_trade(&winner, Direction::Up, 100.0, 43_000.0));
    let lost = assert_ok!(trader.execute_trade(&loser, Direction::Down, 50.0, 43_000.0));
    assert!((trader.balance() - 850.0).abs() < 1e-9);

    let SettlementOutcome::Settled(record) = trader.settle_trade(&won.id, true, None) else {
        panic!("expected settlement");
    };
    assert!((record.pnl.unwrap() - 150.0).abs() < 1e-9);
    assert_eq!(record.exit_price, Some(1.0));
    assert!((trader.balance() - 1100.0).abs() < 1e-9);

    let SettlementOutcome::Settled(record) = trader.settle_trade(&lost.id, false, None) else {
        panic!("expected settlement");
    };
    assert!((record.pnl.unwrap() + 50.0).abs() < 1e-9);
    assert!((trader.balance() - 1100.0).abs() < 1e-9);

    assert_eq!(
        trader.settle_trade(&won.id, false, None),
        SettlementOutcome::AlreadySettled(TradeStatus::Won)
    );
    assert_eq!(trader.settle_trade("paper_999999", true, None), SettlementOutcome::NotFound);

    let summary = trader.summary();
    assert!((summary.win_rate - 0.5).abs() < 1e-9);
    assert!((summary.total_pnl - 100.0).abs() < 1e-9);

    // Execute twice, settle twice.
    assert_eq!(store.save_count(), 4);
    let saved = assert_ok!(store.load()).unwrap();
    assert_eq!(&saved, trader.portfolio());
}

#[test]
fn test_insufficient_funds_leaves_portfolio_untouched() {
    let mut trader = PaperTrader::new(Box::new(MemoryStore::new()), 5.0);
    let market = make_market("M", 0.45, 0.56, 60, 20_000.0);

    let err = assert_err!(trader.execute_trade(&market, Direction::Up, 10.0, 43_000.0));
    assert!(matches!(err, BotError::InsufficientFunds { .. }));
    assert!((trader.balance() - 5.0).abs() < 1e-9);
    assert!(trader.portfolio().trades.is_empty());
}

//! Engine end-to-end tests
//!
//! Config in, simulated venues and strategies running, persisted plan
//! state out.

use hedge_core::{ExecutionStyle, PlanOrder, Side};
use hedge_gateway::RegistryError;
use hedge_order_manager::Error as OrderError;
use hedge_runner::{ChannelAlerter, ConfigError, Engine, EngineConfig, EngineError};
use hedge_strategy::{PlanOrderSink, TargetExposureConfig, TargetExposureStrategy};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

fn config(strategies: &str, order_interval_ms: u64) -> EngineConfig {
    let json = format!(
        r#"{{
            "name": "e2e",
            "venues": [
                {{"name": "a", "kind": "simulator",
                  "params": {{"books": {{"BTCUSDT": {{"bids": [["99", "1000"]], "asks": [["100", "1000"]]}}}}}}}},
                {{"name": "b", "kind": "simulator",
                  "params": {{"books": {{"BTCUSDT": {{"bids": [["120", "1000"]], "asks": [["125", "1000"]]}}}}}}}}
            ],
            "instruments": [
                {{"instrument": "BTC-USDT", "venue": "a", "symbol": "BTCUSDT", "depth_window": "1000"}},
                {{"instrument": "BTC-USDT", "venue": "b", "symbol": "BTCUSDT", "depth_window": "1000"}}
            ],
            "dispatcher": {{"order_interval_ms": {order_interval_ms}, "venue_timeout_ms": 1000}},
            "readiness": {{"retries": 2, "delay_ms": 10}},
            "strategies": [{strategies}],
            "join_timeout_ms": 1000
        }}"#
    );
    EngineConfig::from_json(&json).unwrap()
}

fn hedger(name: &str, target: &str) -> String {
    format!(
        r#"{{"name": "{name}", "kind": "target_exposure",
             "params": {{"instrument": "BTC-USDT", "target": "{target}",
                        "reference_price": "100", "interval_ms": 50}}}}"#
    )
}

fn executed(engine: &Engine, strategy: &str) -> Decimal {
    engine
        .store()
        .plans_for_strategy(strategy)
        .iter()
        .map(|p| p.executed_quantity())
        .sum()
}

async fn wait_for_execution(engine: &Engine, strategy: &str, expected: Decimal) {
    for _ in 0..500 {
        if executed(engine, strategy) == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "{} executed {} instead of {}",
        strategy,
        executed(engine, strategy),
        expected
    );
}

#[tokio::test(start_paused = true)]
async fn test_strategy_reaches_target_across_venues() {
    let _ = env_logger::try_init();
    let engine = Engine::from_config(config(&hedger("long", "2500"), 20)).unwrap();

    let report = engine.start().await.unwrap();
    assert!(report.all_ready());
    assert_eq!(report.ready.len(), 2);
    assert_eq!(engine.dispatcher().running_instruments(), vec!["BTC-USDT".to_string()]);
    assert_eq!(engine.strategies().strategy_names(), vec!["long".to_string()]);

    wait_for_execution(&engine, "long", dec!(2500)).await;

    let plans = engine.store().plans_for_strategy("long");
    assert!(plans.iter().all(|p| p.side == Side::Buy));
    let venues: BTreeSet<String> = plans
        .iter()
        .flat_map(|p| engine.store().ex_orders_for(p.id))
        .map(|stored| stored.order.venue)
        .collect();
    assert!(venues.contains("a"));

    // Target held; no further plans once it is reached
    let count = plans.len();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(engine.store().plans_for_strategy("long").len(), count);
    assert!(engine.audit().received() > 0);

    engine.stop().await;
    assert!(engine.dispatcher().running_instruments().is_empty());
    assert!(engine.strategies().strategy_names().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_opposite_strategies_are_netted_internally() {
    let _ = env_logger::try_init();
    let strategies = format!("{}, {}", hedger("long", "1200"), hedger("short", "-800"));
    let engine = Engine::from_config(config(&strategies, 200)).unwrap();
    engine.start().await.unwrap();

    wait_for_execution(&engine, "long", dec!(1200)).await;
    wait_for_execution(&engine, "short", dec!(800)).await;

    let crosses = engine.store().crosses();
    assert_eq!(crosses.len(), 1);
    assert_eq!(crosses[0].quantity, dec!(800));

    // Only the residual long reached a venue
    let short_orders: usize = engine
        .store()
        .plans_for_strategy("short")
        .iter()
        .map(|p| engine.store().ex_orders_for(p.id).len())
        .sum();
    assert_eq!(short_orders, 0);
    let long_notional: Decimal = engine
        .store()
        .plans_for_strategy("long")
        .iter()
        .flat_map(|p| engine.store().ex_orders_for(p.id))
        .map(|stored| stored.order.notional_quantity)
        .sum();
    assert_eq!(long_notional, dec!(400));

    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_admin_entry_points() {
    let _ = env_logger::try_init();
    let (alerter, _alerts) = ChannelAlerter::new();
    let alerter = Arc::new(alerter);
    let engine = Engine::builder(config("", 20))
        .with_alerter(alerter.clone())
        .build()
        .unwrap();
    engine.start().await.unwrap();

    // A resting limit plan can be withdrawn and its final state read back
    let plan = PlanOrder::new("BTC-USDT", Side::Buy, dec!(500), dec!(100))
        .unwrap()
        .with_style(ExecutionStyle::Limit);
    let outcome = engine.make_order(plan).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let cancelled = engine.cancel_plan(outcome.plan_id).await.unwrap();
    assert_eq!(cancelled.left_quantity(), dec!(500));
    let snapshot = engine.plan(outcome.plan_id).await.unwrap();
    assert!(!snapshot.live);

    let unknown = PlanOrder::new("DOGE-USDT", Side::Sell, dec!(100), dec!(1)).unwrap();
    assert!(matches!(
        engine.make_order(unknown).await,
        Err(EngineError::Order(OrderError::UnknownInstrument(_)))
    ));

    // Removing the last enabled binding stops the worker; re-enabling restarts it
    engine.disable_instrument("BTC-USDT", "a").await.unwrap();
    assert!(engine.dispatcher().is_running("BTC-USDT"));
    engine.disable_instrument("BTC-USDT", "b").await.unwrap();
    assert!(!engine.dispatcher().is_running("BTC-USDT"));
    // No worker would ever execute it
    let stranded = PlanOrder::new("BTC-USDT", Side::Buy, dec!(100), dec!(100)).unwrap();
    assert!(matches!(
        engine.make_order(stranded).await,
        Err(EngineError::Order(OrderError::NoVenueAvailable { .. }))
    ));
    engine.enable_instrument("BTC-USDT", "b").await.unwrap();
    assert!(engine.dispatcher().is_running("BTC-USDT"));
    let routable = PlanOrder::new("BTC-USDT", Side::Buy, dec!(100), dec!(100)).unwrap();
    assert!(engine.make_order(routable).await.is_ok());

    assert!(engine.disable_venue("nowhere").is_err());
    engine.disable_venue("a").unwrap();
    engine.enable_venue("a").unwrap();

    // Strategies started at runtime go through the same sink
    let strategy = TargetExposureStrategy::new(
        "late",
        TargetExposureConfig::new("BTC-USDT", dec!(-300), dec!(100)),
    )
    .unwrap();
    engine.start_strategy(Box::new(strategy)).await.unwrap();
    assert!(engine.strategies().is_running("late"));
    assert!(engine.stop_strategy("late").await);

    // An account with an enabled binding cannot be removed
    assert!(matches!(
        engine.remove_account("b").await,
        Err(EngineError::Registry(RegistryError::VenueInUse { .. }))
    ));
    engine.enable_instrument("BTC-USDT", "a").await.unwrap();
    engine.disable_instrument("BTC-USDT", "b").await.unwrap();
    assert!(engine.dispatcher().is_running("BTC-USDT"));
    engine.remove_account("b").await.unwrap();
    assert!(engine.registry().venue("b").is_none());

    engine.stop().await;
    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_engine_as_plan_sink() {
    let _ = env_logger::try_init();
    let engine = Engine::from_config(config("", 20)).unwrap();
    engine.start().await.unwrap();

    let sink: &dyn PlanOrderSink = &engine;
    let plan = PlanOrder::new("BTC-USDT", Side::Sell, dec!(990), dec!(100)).unwrap();
    let id = sink.make_order(plan).await.unwrap();

    for _ in 0..100 {
        if sink.plan(id).await.map(|s| !s.live).unwrap_or(false) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let snapshot = sink.plan(id).await.unwrap();
    assert!(!snapshot.live);
    assert_eq!(snapshot.plan.left_quantity(), Decimal::ZERO);

    engine.stop().await;
}

#[test]
fn test_unknown_kinds_are_rejected_at_build() {
    let mut cfg = config("", 20);
    cfg.venues[1].kind = "carrier-pigeon".to_string();
    assert!(matches!(
        Engine::from_config(cfg),
        Err(EngineError::Config(ConfigError::UnknownVenueKind { venue, kind }))
            if venue == "b" && kind == "carrier-pigeon"
    ));

    let cfg = config(r#"{"name": "oracle", "kind": "crystal_ball"}"#, 20);
    assert!(matches!(
        Engine::from_config(cfg),
        Err(EngineError::Config(ConfigError::UnknownStrategyKind { strategy, .. }))
            if strategy == "oracle"
    ));

    let mut cfg = config("", 20);
    cfg.instruments[0].depth_window = Decimal::ZERO;
    assert!(matches!(
        Engine::from_config(cfg),
        Err(EngineError::Config(ConfigError::Invalid(_)))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_is_refused() {
    let _ = env_logger::try_init();
    let engine = Engine::from_config(config("", 20)).unwrap();
    engine.start().await.unwrap();
    assert!(engine.is_started());
    assert!(matches!(engine.start().await, Err(EngineError::AlreadyStarted)));
    engine.stop().await;
    assert!(!engine.is_started());
}

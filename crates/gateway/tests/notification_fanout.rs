//! Integration test: venues -> shared queue -> NotificationDispatcher -> instrument queues
//!
//! Several venues push notifications for several instruments concurrently;
//! every instrument queue must see exactly its own notifications, each
//! venue's in submission order, and the audit listener must see them all.

use hedge_core::{ExOrder, OrderType, PlanOrderId, Side, SymbolInfo};
use hedge_gateway::{
    AuditListener, NotificationDispatcher, RegistryConfig, Shutdown, SimulatedVenue, VenueRegistry,
    notification_channel,
};
use hedge_ports::VenueClient;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const INSTRUMENTS: [&str; 3] = ["BTC-USDT", "ETH-USDT", "SOL-USDT"];
const ORDERS_PER_PAIR: usize = 50;

fn symbol(instrument: &str) -> String {
    instrument.replace('-', "")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fanout_under_concurrent_producers() {
    let _ = env_logger::try_init();

    let (tx, rx) = notification_channel();
    let audit = Arc::new(AuditListener::new());
    let dispatcher = Arc::new(NotificationDispatcher::new(audit.clone()));
    let mut queues: HashMap<&str, _> = INSTRUMENTS
        .iter()
        .map(|i| (*i, dispatcher.register(i)))
        .collect();

    let shutdown = Shutdown::new();
    let loop_handle = tokio::spawn(dispatcher.clone().run(rx, shutdown.clone()));

    let venues: Vec<Arc<SimulatedVenue>> = ["sim-a", "sim-b", "sim-c", "sim-d"]
        .iter()
        .map(|name| {
            let venue = SimulatedVenue::new(*name, dec!(0.001), dec!(0)).with_notifications(tx.clone());
            for instrument in INSTRUMENTS {
                venue.set_book(
                    &symbol(instrument),
                    vec![(dec!(99), dec!(1000))],
                    vec![(dec!(101), dec!(1000))],
                );
            }
            Arc::new(venue)
        })
        .collect();
    drop(tx);

    // One producer task per (venue, instrument) pair
    let mut producers = Vec::new();
    for venue in &venues {
        for instrument in INSTRUMENTS {
            let venue = venue.clone();
            producers.push(tokio::spawn(async move {
                let info = SymbolInfo::new(instrument, venue.name(), symbol(instrument));
                for n in 0..ORDERS_PER_PAIR {
                    let order = ExOrder::build(
                        format!("{}-{}-{}", venue.name(), instrument, n),
                        PlanOrderId::new(),
                        &info,
                        Side::Buy,
                        OrderType::Market,
                        dec!(101),
                        dec!(101),
                        dec!(101),
                    )
                    .expect("non-zero size");
                    venue.make_order(&order).await.expect("simulated fill");
                    tokio::task::yield_now().await;
                }
            }));
        }
    }
    for producer in producers {
        producer.await.unwrap();
    }

    let expected_per_instrument = venues.len() * ORDERS_PER_PAIR;
    for instrument in INSTRUMENTS {
        let queue = queues.get_mut(instrument).unwrap();
        let mut per_venue: HashMap<String, Vec<String>> = HashMap::new();
        for _ in 0..expected_per_instrument {
            let n = tokio::time::timeout(Duration::from_secs(5), queue.recv())
                .await
                .expect("notification in time")
                .expect("queue open");
            assert_eq!(n.instrument(), instrument);
            per_venue
                .entry(n.venue().to_string())
                .or_default()
                .push(n.data().client_order_id.clone().unwrap_or_default());
        }
        assert!(queue.try_recv().is_err(), "no extra notifications");

        for (venue, ids) in per_venue {
            let expected: Vec<String> = (0..ORDERS_PER_PAIR)
                .map(|n| format!("{}-{}-{}", venue, instrument, n))
                .collect();
            assert_eq!(ids, expected, "per-venue order preserved");
        }
    }

    assert_eq!(
        audit.received() as usize,
        INSTRUMENTS.len() * venues.len() * ORDERS_PER_PAIR
    );
    assert_eq!(audit.received_from("sim-a") as usize, INSTRUMENTS.len() * ORDERS_PER_PAIR);
    assert_eq!(dispatcher.dropped(), 0);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(1), loop_handle)
        .await
        .expect("dispatcher stops")
        .unwrap();
}

#[tokio::test]
async fn test_registry_start_with_simulated_venues() {
    let _ = env_logger::try_init();

    let (tx, _rx) = notification_channel();
    let registry = VenueRegistry::new(RegistryConfig {
        venue_timeout: Duration::from_millis(100),
        readiness_retries: 2,
        readiness_delay: Duration::from_millis(1),
    });

    let fast = Arc::new(SimulatedVenue::new("fast", dec!(0.001), dec!(0)).with_notifications(tx.clone()));
    fast.set_book("BTCUSDT", vec![(dec!(99), dec!(1))], vec![(dec!(101), dec!(1))]);
    let slow = Arc::new(SimulatedVenue::new("slow", dec!(0.001), dec!(0)).with_notifications(tx));
    slow.set_book("BTCUSDT", vec![(dec!(99), dec!(1))], vec![(dec!(101), dec!(1))]);
    slow.set_latency(Duration::from_millis(20));

    registry.add_account(fast.clone()).unwrap();
    registry.add_account(slow.clone()).unwrap();
    registry
        .register_symbol(SymbolInfo::new("BTC-USDT", "fast", "BTCUSDT"))
        .unwrap();
    registry
        .register_symbol(SymbolInfo::new("BTC-USDT", "slow", "BTCUSDT"))
        .unwrap();

    let report = registry.start().await;
    assert!(report.all_ready(), "{:?}", report);
    assert_eq!(registry.instruments(), vec!["BTC-USDT".to_string()]);

    // Slower than the venue timeout: calls fail but the pair stays registered
    slow.set_latency(Duration::from_millis(300));
    let conn = registry.venue("slow").unwrap();
    assert!(conn.best_price("BTCUSDT", Side::Buy).await.is_err());
    assert_eq!(registry.candidates("BTC-USDT", Side::Buy).len(), 2);

    registry.stop().await;
    assert!(registry.candidates("BTC-USDT", Side::Buy).is_empty());
}

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use hedge_core::{
    ExOrder, Notification, NotificationData, Notional, OrderStatus, OrderType, Price, Quantity,
    Side, VenueOrder,
};
use hedge_ports::{VenueClient, VenueError, VenueResult};
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use super::book::SimBook;
use crate::transport::NotificationSender;

/// Simulator parameters, read from a venue's `params` JSON
///
/// ```json
/// { "books": { "BTCUSDT": { "bids": [["29990", "2"]], "asks": [["30010", "2"]] } },
///   "latency_ms": 0 }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulatedVenueParams {
    #[serde(default)]
    pub books: HashMap<String, SimBook>,
    #[serde(default)]
    pub latency_ms: u64,
}

/// Per-operation call counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimCallCounts {
    pub quotes: u64,
    pub orders: u64,
    pub cancels: u64,
    pub queries: u64,
}

#[derive(Debug, Default)]
struct Counters {
    quotes: AtomicU64,
    orders: AtomicU64,
    cancels: AtomicU64,
    queries: AtomicU64,
}

#[derive(Debug, Clone)]
struct SimOrder {
    instrument: String,
    order: VenueOrder,
}

pub struct SimulatedVenue {
    name: String,
    taker_rate: Decimal,
    maker_rate: Decimal,
    alive: AtomicBool,
    books: DashMap<String, SimBook>,
    orders: DashMap<String, SimOrder>,
    submitted: Mutex<Vec<ExOrder>>,
    next_id: AtomicU64,
    notifications: Option<NotificationSender>,
    fail_orders: AtomicU32,
    fail_cancels: AtomicBool,
    fail_quotes: AtomicBool,
    fail_start: AtomicBool,
    latency_ms: AtomicU64,
    counters: Counters,
}

impl SimulatedVenue {
    pub fn new(name: impl Into<String>, taker_rate: Decimal, maker_rate: Decimal) -> Self {
        Self {
            name: name.into(),
            taker_rate,
            maker_rate,
            alive: AtomicBool::new(true),
            books: DashMap::new(),
            orders: DashMap::new(),
            submitted: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            notifications: None,
            fail_orders: AtomicU32::new(0),
            fail_cancels: AtomicBool::new(false),
            fail_quotes: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    /// Push fills and cancels onto the shared inbound queue
    pub fn with_notifications(mut self, sender: NotificationSender) -> Self {
        self.notifications = Some(sender);
        self
    }

    pub fn with_params(self, params: SimulatedVenueParams) -> Self {
        for (symbol, mut book) in params.books {
            book.normalize();
            self.books.insert(symbol, book);
        }
        self.latency_ms.store(params.latency_ms, Ordering::Relaxed);
        self
    }

    /// Replace the ladder for `symbol`
    pub fn set_book(&self, symbol: &str, bids: Vec<(Price, Quantity)>, asks: Vec<(Price, Quantity)>) {
        self.books
            .insert(symbol.to_string(), SimBook::new(bids, asks));
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Reject the next `n` order submissions with a network error
    pub fn fail_next_orders(&self, n: u32) {
        self.fail_orders.store(n, Ordering::SeqCst);
    }

    pub fn set_fail_cancels(&self, fail: bool) {
        self.fail_cancels.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_quotes(&self, fail: bool) {
        self.fail_quotes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Delay applied to every venue call
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn call_counts(&self) -> SimCallCounts {
        SimCallCounts {
            quotes: self.counters.quotes.load(Ordering::Relaxed),
            orders: self.counters.orders.load(Ordering::Relaxed),
            cancels: self.counters.cancels.load(Ordering::Relaxed),
            queries: self.counters.queries.load(Ordering::Relaxed),
        }
    }

    /// Every order accepted so far, in submission order
    pub fn submitted_orders(&self) -> Vec<ExOrder> {
        self.submitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn order(&self, order_id: &str) -> Option<VenueOrder> {
        self.orders.get(order_id).map(|o| o.order.clone())
    }

    pub fn order_by_client_id(&self, client_order_id: &str) -> Option<VenueOrder> {
        self.orders
            .iter()
            .find(|o| o.order.client_order_id.as_deref() == Some(client_order_id))
            .map(|o| o.order.clone())
    }

    /// Resting (non-terminal) orders for `symbol`
    pub fn open_orders(&self, symbol: &str) -> Vec<VenueOrder> {
        let mut open: Vec<VenueOrder> = self
            .orders
            .iter()
            .filter(|o| o.order.symbol == symbol && o.order.status.is_active())
            .map(|o| o.order.clone())
            .collect();
        open.sort_by(|a, b| a.order_id.cmp(&b.order_id));
        open
    }

    /// Fill up to `size` of a resting order and notify
    pub fn fill_resting(&self, order_id: &str, size: Quantity) -> Option<VenueOrder> {
        self.fill(order_id, size, true)
    }

    /// Fill without notifying, as if the trade event were still in flight
    pub fn fill_resting_silently(&self, order_id: &str, size: Quantity) -> Option<VenueOrder> {
        self.fill(order_id, size, false)
    }

    fn fill(&self, order_id: &str, size: Quantity, notify: bool) -> Option<VenueOrder> {
        let (snapshot, instrument) = {
            let mut entry = self.orders.get_mut(order_id)?;
            if !entry.order.status.is_active() {
                return None;
            }
            let instrument = entry.instrument.clone();
            let order = &mut entry.order;
            let fill = size.min(order.remaining_size());
            order.filled_size += fill;
            order.avg_price = Some(order.price);
            order.status = if order.filled_size >= order.size {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
            (order.clone(), instrument)
        };

        debug!(
            "[VENUE] {} filled {} {}/{}",
            self.name, order_id, snapshot.filled_size, snapshot.size
        );
        if notify {
            self.notify(Notification::trade(self.data(&instrument, &snapshot)));
        }
        Some(snapshot)
    }

    fn data(&self, instrument: &str, order: &VenueOrder) -> NotificationData {
        NotificationData {
            instrument: instrument.to_string(),
            venue: self.name.clone(),
            order_id: order.order_id.clone(),
            client_order_id: order.client_order_id.clone(),
            side: order.side,
            order_type: order.order_type,
            size: order.size,
            price: order.avg_price.unwrap_or(order.price),
            filled_size: order.filled_size,
            timestamp: Utc::now(),
        }
    }

    fn notify(&self, notification: Notification) {
        if let Some(sender) = &self.notifications {
            if sender.send(notification).is_err() {
                warn!("[VENUE] {} notification queue closed", self.name);
            }
        }
    }

    async fn delay(&self) {
        let ms = self.latency_ms.load(Ordering::Relaxed);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn ensure_alive(&self) -> VenueResult<()> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(VenueError::Unavailable(format!("{} is down", self.name)))
        }
    }

    fn take_injected_order_failure(&self) -> bool {
        self.fail_orders
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl VenueClient for SimulatedVenue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> VenueResult<()> {
        self.delay().await;
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(VenueError::Unavailable(format!(
                "{} failed to connect",
                self.name
            )));
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn get_depth_price(
        &self,
        symbol: &str,
        side: Side,
        notional_window: Notional,
    ) -> VenueResult<Price> {
        self.counters.quotes.fetch_add(1, Ordering::Relaxed);
        self.delay().await;
        self.ensure_alive()?;
        if self.fail_quotes.load(Ordering::SeqCst) {
            return Err(VenueError::Network("injected quote failure".to_string()));
        }

        let book = self
            .books
            .get(symbol)
            .ok_or_else(|| VenueError::NotFound(symbol.to_string()))?;
        book.depth_price(side, notional_window)
            .ok_or_else(|| VenueError::NoLiquidity(format!("{} {}", symbol, side)))
    }

    async fn make_order(&self, order: &ExOrder) -> VenueResult<String> {
        self.counters.orders.fetch_add(1, Ordering::Relaxed);
        self.delay().await;
        self.ensure_alive()?;
        if self.take_injected_order_failure() {
            return Err(VenueError::Network("injected order failure".to_string()));
        }

        let fill_price = {
            let book = self
                .books
                .get(&order.symbol)
                .ok_or_else(|| VenueError::NotFound(order.symbol.clone()))?;
            match order.order_type {
                OrderType::Market => Some(
                    book.depth_price(order.side, order.notional_quantity)
                        .ok_or_else(|| VenueError::NoLiquidity(order.symbol.clone()))?,
                ),
                OrderType::Limit => None,
            }
        };

        let order_id = format!(
            "{}-{}",
            self.name,
            self.next_id.fetch_add(1, Ordering::SeqCst)
        );
        let venue_order = VenueOrder {
            order_id: order_id.clone(),
            client_order_id: Some(order.client_order_id.clone()),
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: order.order_type,
            price: fill_price.unwrap_or(order.price),
            size: order.size,
            filled_size: if fill_price.is_some() {
                order.size
            } else {
                Decimal::ZERO
            },
            avg_price: fill_price,
            status: if fill_price.is_some() {
                OrderStatus::Filled
            } else {
                OrderStatus::New
            },
        };

        self.orders.insert(
            order_id.clone(),
            SimOrder {
                instrument: order.instrument.clone(),
                order: venue_order.clone(),
            },
        );
        self.submitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(order.clone());

        debug!(
            "[VENUE] {} accepted {} {} {} {} @ {} -> {}",
            self.name,
            order.order_type.as_str(),
            order.side,
            order.size,
            order.symbol,
            venue_order.price,
            order_id
        );

        let data = self.data(&order.instrument, &venue_order);
        if fill_price.is_some() {
            self.notify(Notification::trade(data));
        } else {
            self.notify(Notification::order(data, OrderStatus::New));
        }
        Ok(order_id)
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> VenueResult<VenueOrder> {
        self.counters.cancels.fetch_add(1, Ordering::Relaxed);
        self.delay().await;
        self.ensure_alive()?;
        if self.fail_cancels.load(Ordering::SeqCst) {
            return Err(VenueError::Network("injected cancel failure".to_string()));
        }

        let (snapshot, instrument, changed) = {
            let mut entry = self
                .orders
                .get_mut(order_id)
                .filter(|o| o.order.symbol == symbol)
                .ok_or_else(|| VenueError::NotFound(order_id.to_string()))?;
            let changed = entry.order.status.is_active();
            if changed {
                entry.order.status = OrderStatus::Canceled;
            }
            (entry.order.clone(), entry.instrument.clone(), changed)
        };

        if changed {
            let data = self.data(&instrument, &snapshot);
            self.notify(Notification::order(data, OrderStatus::Canceled));
        }
        Ok(snapshot)
    }

    async fn get_order(&self, symbol: &str, order_id: &str) -> VenueResult<VenueOrder> {
        self.counters.queries.fetch_add(1, Ordering::Relaxed);
        self.delay().await;
        self.ensure_alive()?;
        self.orders
            .get(order_id)
            .filter(|o| o.order.symbol == symbol)
            .map(|o| o.order.clone())
            .ok_or_else(|| VenueError::NotFound(order_id.to_string()))
    }

    async fn get_current_orders(&self, symbol: &str) -> VenueResult<Vec<VenueOrder>> {
        self.counters.queries.fetch_add(1, Ordering::Relaxed);
        self.delay().await;
        self.ensure_alive()?;
        Ok(self.open_orders(symbol))
    }

    fn taker_rate(&self) -> Decimal {
        self.taker_rate
    }

    fn maker_rate(&self) -> Decimal {
        self.maker_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::notification_channel;
    use hedge_core::{PlanOrderId, SymbolInfo};
    use rust_decimal_macros::dec;

    fn info() -> SymbolInfo {
        SymbolInfo::new("BTC-USDT", "sim", "BTCUSDT").with_precision(2, 4)
    }

    fn venue() -> SimulatedVenue {
        let venue = SimulatedVenue::new("sim", dec!(0.001), dec!(0.0002));
        venue.set_book(
            "BTCUSDT",
            vec![(dec!(99), dec!(10))],
            vec![(dec!(101), dec!(10))],
        );
        venue
    }

    fn order(order_type: OrderType, notional: Decimal, price: Decimal) -> ExOrder {
        ExOrder::build(
            "c-1",
            PlanOrderId::new(),
            &info(),
            Side::Buy,
            order_type,
            notional,
            price,
            price,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_market_order_fills_and_notifies() {
        let (tx, mut rx) = notification_channel();
        let venue = venue().with_notifications(tx);

        let id = venue
            .make_order(&order(OrderType::Market, dec!(202), dec!(101)))
            .await
            .unwrap();
        let observed = venue.get_order("BTCUSDT", &id).await.unwrap();
        assert_eq!(observed.status, OrderStatus::Filled);
        assert_eq!(observed.filled_size, dec!(2));
        assert_eq!(observed.filled_notional(), dec!(202));

        let n = rx.try_recv().unwrap();
        assert!(n.is_trade());
        assert_eq!(n.instrument(), "BTC-USDT");
        assert_eq!(n.status(), OrderStatus::Filled);
    }

    #[tokio::test]
    async fn test_limit_order_rests_until_filled() {
        let (tx, mut rx) = notification_channel();
        let venue = venue().with_notifications(tx);

        let id = venue
            .make_order(&order(OrderType::Limit, dec!(200), dec!(100)))
            .await
            .unwrap();
        assert_eq!(rx.try_recv().unwrap().status(), OrderStatus::New);
        assert_eq!(venue.open_orders("BTCUSDT").len(), 1);

        let partial = venue.fill_resting(&id, dec!(1)).unwrap();
        assert_eq!(partial.status, OrderStatus::PartiallyFilled);
        let n = rx.try_recv().unwrap();
        assert_eq!(n.data().filled_size, dec!(1));

        venue.fill_resting(&id, dec!(5)).unwrap();
        assert_eq!(venue.order(&id).unwrap().filled_size, dec!(2));
        assert!(venue.open_orders("BTCUSDT").is_empty());
        assert!(venue.fill_resting(&id, dec!(1)).is_none());
    }

    #[tokio::test]
    async fn test_cancel_keeps_filled_orders_filled() {
        let venue = venue();
        let id = venue
            .make_order(&order(OrderType::Limit, dec!(200), dec!(100)))
            .await
            .unwrap();
        venue.fill_resting_silently(&id, dec!(2));

        let after = venue.cancel_order("BTCUSDT", &id).await.unwrap();
        assert_eq!(after.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn test_cancel_resting_order() {
        let (tx, mut rx) = notification_channel();
        let venue = venue().with_notifications(tx);
        let id = venue
            .make_order(&order(OrderType::Limit, dec!(200), dec!(100)))
            .await
            .unwrap();
        let _ = rx.try_recv();

        let after = venue.cancel_order("BTCUSDT", &id).await.unwrap();
        assert_eq!(after.status, OrderStatus::Canceled);
        assert_eq!(rx.try_recv().unwrap().status(), OrderStatus::Canceled);
        assert_eq!(venue.call_counts().cancels, 1);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let venue = venue();
        venue.fail_next_orders(1);
        let o = order(OrderType::Market, dec!(101), dec!(101));
        assert!(matches!(
            venue.make_order(&o).await,
            Err(VenueError::Network(_))
        ));
        assert!(venue.make_order(&o).await.is_ok());

        venue.set_fail_cancels(true);
        assert!(venue.cancel_order("BTCUSDT", "nope").await.is_err());

        venue.set_alive(false);
        assert!(matches!(
            venue.get_depth_price("BTCUSDT", Side::Buy, dec!(10)).await,
            Err(VenueError::Unavailable(_))
        ));
        assert_eq!(venue.call_counts().orders, 2);
    }

    #[tokio::test]
    async fn test_unknown_symbol() {
        let venue = venue();
        assert!(matches!(
            venue.get_depth_price("ETHUSDT", Side::Buy, dec!(10)).await,
            Err(VenueError::NotFound(_))
        ));
    }

    #[test]
    fn test_params_from_json() {
        let params: SimulatedVenueParams = serde_json::from_str(
            r#"{"books": {"BTCUSDT": {"bids": [["99", "1"]], "asks": [["101", "1"]]}}}"#,
        )
        .unwrap();
        let venue = SimulatedVenue::new("sim", dec!(0), dec!(0)).with_params(params);
        assert_eq!(
            venue.books.get("BTCUSDT").unwrap().best_ask(),
            Some(dec!(101))
        );
    }
}

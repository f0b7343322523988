//! Timeout-enforcing venue connection
//!
//! Every call into a venue goes through [`VenueConnection`], which bounds it
//! with `tokio::time::timeout` and folds the elapsed case into
//! [`VenueError::Timeout`].

use hedge_core::{ExOrder, Notional, Price, Side, VenueOrder};
use hedge_ports::{VenueClient, VenueError, VenueResult};
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

pub struct VenueConnection {
    client: Arc<dyn VenueClient>,
    timeout: Duration,
    /// Registration order, used for deterministic start-up
    seq: u64,
    enabled: AtomicBool,
    started: AtomicBool,
    timeouts: AtomicU64,
}

impl VenueConnection {
    pub fn new(client: Arc<dyn VenueClient>, timeout: Duration, seq: u64) -> Self {
        Self {
            client,
            timeout,
            seq,
            enabled: AtomicBool::new(true),
            started: AtomicBool::new(false),
            timeouts: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        self.client.name()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn client(&self) -> &Arc<dyn VenueClient> {
        &self.client
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Whether `start()` succeeded for this venue
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Usable for routing: enabled, started and reporting alive
    pub fn is_available(&self) -> bool {
        self.is_enabled() && self.is_started() && self.client.is_alive()
    }

    /// Number of calls that hit the timeout so far
    pub fn timeout_count(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn taker_rate(&self) -> Decimal {
        self.client.taker_rate()
    }

    pub fn maker_rate(&self) -> Decimal {
        self.client.maker_rate()
    }

    async fn timed<T>(&self, call: impl Future<Output = VenueResult<T>>) -> VenueResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                Err(VenueError::Timeout)
            }
        }
    }

    pub async fn start(&self) -> VenueResult<()> {
        let result = self.timed(self.client.start()).await;
        self.started.store(result.is_ok(), Ordering::Release);
        result
    }

    pub async fn stop(&self) {
        if tokio::time::timeout(self.timeout, self.client.stop())
            .await
            .is_err()
        {
            log::warn!("[VENUE] {} stop timed out", self.name());
        }
        self.started.store(false, Ordering::Release);
    }

    pub async fn get_depth_price(
        &self,
        symbol: &str,
        side: Side,
        notional_window: Notional,
    ) -> VenueResult<Price> {
        self.timed(self.client.get_depth_price(symbol, side, notional_window))
            .await
    }

    pub async fn best_price(&self, symbol: &str, side: Side) -> VenueResult<Price> {
        self.timed(self.client.best_price(symbol, side)).await
    }

    pub async fn make_order(&self, order: &ExOrder) -> VenueResult<String> {
        self.timed(self.client.make_order(order)).await
    }

    pub async fn cancel_order(&self, symbol: &str, order_id: &str) -> VenueResult<VenueOrder> {
        self.timed(self.client.cancel_order(symbol, order_id)).await
    }

    pub async fn get_order(&self, symbol: &str, order_id: &str) -> VenueResult<VenueOrder> {
        self.timed(self.client.get_order(symbol, order_id)).await
    }

    pub async fn get_current_orders(&self, symbol: &str) -> VenueResult<Vec<VenueOrder>> {
        self.timed(self.client.get_current_orders(symbol)).await
    }
}

impl std::fmt::Debug for VenueConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueConnection")
            .field("name", &self.name())
            .field("seq", &self.seq)
            .field("enabled", &self.is_enabled())
            .field("started", &self.is_started())
            .finish()
    }
}

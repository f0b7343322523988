use async_trait::async_trait;
use hedge_core::{ExOrder, Notional, Price, Side, VenueOrder};
use rust_decimal::Decimal;

use crate::error::VenueResult;

/// Capability interface of one venue connection (account)
///
/// Implemented once per venue and composed by injection. Every call reports
/// failure through [`VenueError`](crate::VenueError); the adapter decides
/// what is retryable. Continuations of the adapter's own I/O run on its own
/// tasks, never on the caller's dispatch loop.
#[async_trait]
pub trait VenueClient: Send + Sync {
    /// Venue (account) name, unique within the registry
    fn name(&self) -> &str;

    /// Open connections, authenticate, load instrument metadata
    async fn start(&self) -> VenueResult<()> {
        Ok(())
    }

    /// Close connections
    async fn stop(&self) {}

    /// Whether the connection is currently usable
    fn is_alive(&self) -> bool;

    /// Volume-weighted price to execute `notional_window` on `side`
    ///
    /// `Side::Buy` walks the asks, `Side::Sell` walks the bids.
    async fn get_depth_price(
        &self,
        symbol: &str,
        side: Side,
        notional_window: Notional,
    ) -> VenueResult<Price>;

    /// Top-of-book price on the side a `side` order would execute against
    async fn best_price(&self, symbol: &str, side: Side) -> VenueResult<Price> {
        self.get_depth_price(symbol, side, Decimal::ZERO).await
    }

    /// Submit an order, returning the venue-assigned order id
    async fn make_order(&self, order: &ExOrder) -> VenueResult<String>;

    /// Cancel an order, returning its state after the cancel
    async fn cancel_order(&self, symbol: &str, order_id: &str) -> VenueResult<VenueOrder>;

    async fn get_order(&self, symbol: &str, order_id: &str) -> VenueResult<VenueOrder>;

    async fn get_current_orders(&self, symbol: &str) -> VenueResult<Vec<VenueOrder>>;

    /// Fee rate for liquidity-taking orders (0.001 = 10 bps)
    fn taker_rate(&self) -> Decimal;

    /// Fee rate for resting orders (may be negative for rebates)
    fn maker_rate(&self) -> Decimal;
}

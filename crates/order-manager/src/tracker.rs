//! Stop-order tracker
//!
//! Watches resting limit orders and marks them for removal when the market
//! moves through or away from them, or when they have rested too long.
//! Decisions are made here; the instrument worker performs the venue calls
//! and feeds the observed state back.
//!
//! An order leaves `tracking` exactly once. Anything that arrives for it
//! afterwards (a late FILLED racing the cancel) finds nothing to update.

use chrono::{DateTime, Utc};
use hedge_core::{
    Notification, Notional, OrderState, PlanOrderId, Price, Side, TrackStatus, TrackedOrder,
    VenueOrder,
};
use log::{debug, info};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;

/// Tracker configuration
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Maximum resting time before escalation (zero disables)
    pub alive_time: Duration,
    /// Band beyond which the market is considered to have run away (zero disables)
    pub risk_rate: Decimal,
    /// Smallest remainder worth a market replacement
    pub min_order_quantity: Notional,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            alive_time: Duration::from_secs(30),
            risk_rate: Decimal::ZERO,
            min_order_quantity: Decimal::TEN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// The touch crossed the order's price
    Crossed,
    /// The touch moved further than `risk_rate` away
    RanAway,
    Expired,
    /// The plan was cancelled or completed
    Orphaned,
    /// The worker is stopping
    Shutdown,
}

impl RemovalReason {
    /// Whether the unfilled remainder gets a market replacement
    pub fn replaces(self) -> bool {
        !matches!(self, Self::Orphaned | Self::Shutdown)
    }
}

/// An order taken out of tracking this tick
#[derive(Debug, Clone)]
pub struct Removal {
    pub order: TrackedOrder,
    pub reason: RemovalReason,
}

/// Fill or terminal state learned from a notification
#[derive(Debug, Clone, PartialEq)]
pub struct TrackUpdate {
    pub client_order_id: String,
    pub plan_id: PlanOrderId,
    /// Newly filled base size
    pub filled_size: Decimal,
    /// Newly filled notional at the order price
    pub filled_notional: Notional,
    /// Notional still resting after this update
    pub remaining_notional: Notional,
    /// The order left tracking
    pub closed: bool,
}

/// What to do with a removed order once its final state is known
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Completely filled, nothing further
    Filled,
    /// Send exactly one market order for the remainder
    Replace {
        client_order_id: String,
        remainder_notional: Notional,
    },
    /// Remainder too small to bother with
    Drop { remainder_notional: Notional },
}

/// Whether the touch makes a resting order a price risk
///
/// For a buy at `price` the touch is the best ask; for a sell, the best bid.
pub fn is_price_risk(side: Side, price: Price, touch: Price, risk_rate: Decimal) -> Option<RemovalReason> {
    let ran_away = risk_rate > Decimal::ZERO;
    match side {
        Side::Buy if touch < price => Some(RemovalReason::Crossed),
        Side::Buy if ran_away && touch > price * (Decimal::ONE + risk_rate) => {
            Some(RemovalReason::RanAway)
        }
        Side::Sell if touch > price => Some(RemovalReason::Crossed),
        Side::Sell if ran_away && touch < price * (Decimal::ONE - risk_rate) => {
            Some(RemovalReason::RanAway)
        }
        _ => None,
    }
}

pub fn is_expired(order: &TrackedOrder, now: DateTime<Utc>, alive_time: Duration) -> bool {
    if alive_time.is_zero() {
        return false;
    }
    let Ok(alive) = chrono::Duration::from_std(alive_time) else {
        return false;
    };
    now - order.submit_time > alive
}

#[derive(Debug, Default)]
pub struct StopOrderTracker {
    config: TrackerConfig,
    /// client order id -> order
    tracking: HashMap<String, TrackedOrder>,
    removed: Vec<Removal>,
    /// Replacement counter per plan
    replacements: HashMap<PlanOrderId, u32>,
}

impl StopOrderTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.tracking.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracking.is_empty()
    }

    pub fn is_tracking(&self, client_order_id: &str) -> bool {
        self.tracking.contains_key(client_order_id)
    }

    pub fn get(&self, client_order_id: &str) -> Option<&TrackedOrder> {
        self.tracking.get(client_order_id)
    }

    /// Tracked orders, oldest first
    pub fn orders(&self) -> Vec<TrackedOrder> {
        let mut orders: Vec<TrackedOrder> = self.tracking.values().cloned().collect();
        orders.sort_by(|a, b| {
            a.submit_time
                .cmp(&b.submit_time)
                .then_with(|| a.client_order_id.cmp(&b.client_order_id))
        });
        orders
    }

    pub fn track(&mut self, mut order: TrackedOrder) {
        order.state = OrderState::Submitted;
        debug!(
            "[TRACK] tracking {} {} {} @ {} on {}",
            order.client_order_id, order.side, order.size, order.price, order.venue
        );
        self.tracking.insert(order.client_order_id.clone(), order);
    }

    fn find_key(&self, notification: &Notification) -> Option<String> {
        let data = notification.data();
        if let Some(id) = &data.client_order_id {
            if self.tracking.contains_key(id) {
                return Some(id.clone());
            }
        }
        self.tracking
            .values()
            .find(|o| {
                o.venue == data.venue && o.venue_order_id.as_deref() == Some(data.order_id.as_str())
            })
            .map(|o| o.client_order_id.clone())
    }

    /// Apply a venue notification to the order it refers to
    ///
    /// Returns `None` for orders that are not (or no longer) tracked.
    pub fn on_notification(&mut self, notification: &Notification) -> Option<TrackUpdate> {
        let key = self.find_key(notification)?;
        let order = self.tracking.get_mut(&key)?;
        let delta = order.apply_fill(notification.data().filled_size);

        let status = notification.status();
        let closed = order.is_filled() || status.is_terminal();
        let update = TrackUpdate {
            client_order_id: key.clone(),
            plan_id: order.plan_id,
            filled_size: delta,
            filled_notional: delta * order.price,
            remaining_notional: if closed {
                Decimal::ZERO
            } else {
                order.remaining_notional()
            },
            closed,
        };

        if closed {
            if let Some(done) = self.tracking.remove(&key) {
                info!(
                    "[TRACK] {} left tracking ({:?}, filled {}/{})",
                    key, status, done.filled_size, done.size
                );
            }
        }
        Some(update)
    }

    /// Mark orders for removal
    ///
    /// `touches` maps client order id to the current touch on the side the
    /// order would trade against; `live_plans` says whether an order's plan
    /// still exists. Orders without a touch are only checked for expiry.
    pub fn evaluate(
        &mut self,
        now: DateTime<Utc>,
        touches: &HashMap<String, Price>,
        live_plan: impl Fn(PlanOrderId) -> bool,
    ) -> usize {
        let mut marked = Vec::new();
        for order in self.tracking.values() {
            let reason = if !live_plan(order.plan_id) {
                Some(RemovalReason::Orphaned)
            } else if is_expired(order, now, self.config.alive_time) {
                Some(RemovalReason::Expired)
            } else {
                touches.get(&order.client_order_id).and_then(|touch| {
                    is_price_risk(order.side, order.price, *touch, self.config.risk_rate)
                })
            };
            if let Some(reason) = reason {
                marked.push((order.client_order_id.clone(), reason));
            }
        }

        let count = marked.len();
        for (key, reason) in marked {
            self.mark(&key, reason);
        }
        count
    }

    /// Move one order from `tracking` to `removed`
    pub fn mark(&mut self, client_order_id: &str, reason: RemovalReason) -> bool {
        let Some(mut order) = self.tracking.remove(client_order_id) else {
            return false;
        };
        info!(
            "[TRACK] marking {} for removal ({:?})",
            client_order_id, reason
        );
        order.state = OrderState::Cancelling;
        if reason == RemovalReason::Expired {
            order.status = TrackStatus::Expired;
        }
        self.removed.push(Removal { order, reason });
        true
    }

    pub fn take_removed(&mut self) -> Vec<Removal> {
        std::mem::take(&mut self.removed)
    }

    /// Put back an order whose cancel failed; it is reconsidered next tick
    pub fn restore(&mut self, mut order: TrackedOrder) {
        debug!("[TRACK] cancel of {} failed, back to tracking", order.client_order_id);
        order.state = OrderState::Submitted;
        self.tracking.insert(order.client_order_id.clone(), order);
    }

    /// Decide the fate of a removed order from the venue's final view
    ///
    /// Applies any fill not seen yet to `order` and returns it alongside the
    /// decision.
    pub fn resolve(
        &mut self,
        order: &mut TrackedOrder,
        observed: Option<&VenueOrder>,
        replace: bool,
    ) -> (Decimal, Resolution) {
        let delta = observed
            .map(|o| order.apply_fill(o.filled_size))
            .unwrap_or(Decimal::ZERO);
        order.state = OrderState::Cancelled;

        if order.is_filled() {
            order.status = TrackStatus::Filled;
            return (delta, Resolution::Filled);
        }
        if order.status != TrackStatus::Expired {
            order.status = TrackStatus::Cancelled;
        }

        let remainder_notional = order.remaining_notional();
        if !replace || remainder_notional < self.config.min_order_quantity {
            debug!(
                "[TRACK] dropping remainder {} of {}",
                remainder_notional, order.client_order_id
            );
            return (delta, Resolution::Drop { remainder_notional });
        }

        let n = self.replacements.entry(order.plan_id).or_insert(0);
        *n += 1;
        let client_order_id = format!("{}-r{}", order.client_order_id, n);
        (
            delta,
            Resolution::Replace {
                client_order_id,
                remainder_notional,
            },
        )
    }

    /// Stop counting replacements for a finished plan
    pub fn forget_plan(&mut self, plan_id: PlanOrderId) {
        self.replacements.remove(&plan_id);
    }
}

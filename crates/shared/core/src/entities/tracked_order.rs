use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ExOrder, PlanOrderId, Side};
use crate::values::{Notional, Price, Quantity};

/// Submission state of a tracked order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderState {
    #[default]
    None,
    Submitting,
    Submitted,
    Cancelling,
    Cancelled,
}

/// Fill/risk lifecycle of a tracked order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TrackStatus {
    #[default]
    New,
    PartFilled,
    Filled,
    Cancelled,
    Expired,
}

impl TrackStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TrackStatus::Filled | TrackStatus::Cancelled | TrackStatus::Expired
        )
    }
}

/// A resting limit order watched for price risk and expiry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedOrder {
    pub client_order_id: String,
    /// Venue-assigned id, once acknowledged
    pub venue_order_id: Option<String>,
    pub plan_id: PlanOrderId,
    pub venue: String,
    pub instrument: String,
    pub symbol: String,
    pub side: Side,
    pub price: Price,
    pub size: Quantity,
    pub filled_size: Quantity,
    pub submit_time: DateTime<Utc>,
    pub state: OrderState,
    pub status: TrackStatus,
}

impl TrackedOrder {
    /// Start tracking a submitted limit order
    pub fn from_ex_order(order: &ExOrder, venue_order_id: impl Into<String>) -> Self {
        Self {
            client_order_id: order.client_order_id.clone(),
            venue_order_id: Some(venue_order_id.into()),
            plan_id: order.plan_id,
            venue: order.venue.clone(),
            instrument: order.instrument.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            price: order.price,
            size: order.size,
            filled_size: Decimal::ZERO,
            submit_time: order.submitted_at,
            state: OrderState::Submitted,
            status: TrackStatus::New,
        }
    }

    pub fn remaining_size(&self) -> Quantity {
        (self.size - self.filled_size).max(Decimal::ZERO)
    }

    /// Unfilled notional at the order's limit price
    pub fn remaining_notional(&self) -> Notional {
        self.remaining_size() * self.price
    }

    /// Record a cumulative fill, returning the newly filled size
    ///
    /// Stale (non-increasing) cumulative values are ignored, so replaying a
    /// notification never double counts.
    pub fn apply_fill(&mut self, cumulative_filled: Quantity) -> Quantity {
        let cumulative = cumulative_filled.min(self.size);
        if cumulative <= self.filled_size {
            return Decimal::ZERO;
        }
        let delta = cumulative - self.filled_size;
        self.filled_size = cumulative;
        self.status = if self.filled_size >= self.size {
            TrackStatus::Filled
        } else {
            TrackStatus::PartFilled
        };
        delta
    }

    pub fn is_filled(&self) -> bool {
        self.status == TrackStatus::Filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{OrderType, SymbolInfo};
    use rust_decimal_macros::dec;

    fn tracked() -> TrackedOrder {
        let info = SymbolInfo::new("BTC-USDT", "sim-a", "BTCUSDT");
        let order = ExOrder::build(
            "abcd-1",
            PlanOrderId::new(),
            &info,
            Side::Buy,
            OrderType::Limit,
            dec!(1000),
            dec!(100),
            dec!(100),
        )
        .unwrap();
        TrackedOrder::from_ex_order(&order, "v-1")
    }

    #[test]
    fn test_apply_fill_deltas() {
        let mut order = tracked();
        assert_eq!(order.size, dec!(10));

        assert_eq!(order.apply_fill(dec!(4)), dec!(4));
        assert_eq!(order.status, TrackStatus::PartFilled);

        // Replayed notification
        assert_eq!(order.apply_fill(dec!(4)), Decimal::ZERO);
        assert_eq!(order.apply_fill(dec!(3)), Decimal::ZERO);

        assert_eq!(order.apply_fill(dec!(10)), dec!(6));
        assert!(order.is_filled());
        assert_eq!(order.remaining_notional(), Decimal::ZERO);
    }

    #[test]
    fn test_fill_capped_at_size() {
        let mut order = tracked();
        assert_eq!(order.apply_fill(dec!(12)), dec!(10));
        assert!(order.is_filled());
    }
}

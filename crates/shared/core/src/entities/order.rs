use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{OrderStatus, OrderType, PlanOrderId, Side, SymbolInfo};
use crate::values::{Notional, Price, Quantity};

/// One order submitted to one venue on behalf of a plan order
///
/// Immutable once built; every dispatch attempt builds a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExOrder {
    /// Client-assigned id used to correlate venue notifications
    pub client_order_id: String,
    pub plan_id: PlanOrderId,
    pub venue: String,
    /// Logical instrument name
    pub instrument: String,
    /// Venue-native symbol
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    /// Size in base units, rounded down to the binding's size precision
    pub size: Quantity,
    /// Limit price, or the quoted depth price for market orders
    pub price: Price,
    /// `size * price`
    pub notional_quantity: Notional,
    /// Plan reference price at submission time
    pub reference_price: Price,
    pub submitted_at: DateTime<Utc>,
    /// Client id of the order this one replaces (tracker escalation)
    pub replaces: Option<String>,
}

impl ExOrder {
    /// Build an order for `notional` worth of `info`'s symbol at `price`
    ///
    /// Returns `None` when the rounded size is zero.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        client_order_id: impl Into<String>,
        plan_id: PlanOrderId,
        info: &SymbolInfo,
        side: Side,
        order_type: OrderType,
        notional: Notional,
        price: Price,
        reference_price: Price,
    ) -> Option<Self> {
        let price = match order_type {
            OrderType::Limit => info.round_price(price),
            OrderType::Market => price,
        };
        let size = info.size_for(notional, price);
        if size <= Decimal::ZERO {
            return None;
        }

        Some(Self {
            client_order_id: client_order_id.into(),
            plan_id,
            venue: info.venue.clone(),
            instrument: info.instrument.clone(),
            symbol: info.symbol.clone(),
            side,
            order_type,
            size,
            price,
            notional_quantity: size * price,
            reference_price,
            submitted_at: Utc::now(),
            replaces: None,
        })
    }

    pub fn replacing(mut self, client_order_id: impl Into<String>) -> Self {
        self.replaces = Some(client_order_id.into());
        self
    }

    pub fn is_market(&self) -> bool {
        self.order_type == OrderType::Market
    }
}

/// A venue's view of an order (query/cancel result)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueOrder {
    /// Venue-assigned order id
    pub order_id: String,
    pub client_order_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Price,
    pub size: Quantity,
    /// Cumulative filled size
    pub filled_size: Quantity,
    /// Average fill price, if anything filled
    pub avg_price: Option<Price>,
    pub status: OrderStatus,
}

impl VenueOrder {
    pub fn remaining_size(&self) -> Quantity {
        (self.size - self.filled_size).max(Decimal::ZERO)
    }

    /// Notional actually executed, valued at the average fill price
    pub fn filled_notional(&self) -> Notional {
        self.filled_size * self.avg_price.unwrap_or(self.price)
    }

    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled || self.filled_size >= self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn info() -> SymbolInfo {
        SymbolInfo::new("BTC-USDT", "sim-a", "BTCUSDT")
            .with_precision(2, 4)
            .with_depth_window(dec!(5000))
    }

    #[test]
    fn test_build_rounds_size_down() {
        let order = ExOrder::build(
            "p-1",
            PlanOrderId::new(),
            &info(),
            Side::Buy,
            OrderType::Market,
            dec!(1000),
            dec!(30000),
            dec!(29990),
        )
        .unwrap();

        // 1000 / 30000 = 0.033333.. -> 0.0333
        assert_eq!(order.size, dec!(0.0333));
        assert_eq!(order.notional_quantity, dec!(999.0000));
        assert_eq!(order.symbol, "BTCUSDT");
        assert!(order.is_market());
    }

    #[test]
    fn test_build_zero_size() {
        let order = ExOrder::build(
            "p-1",
            PlanOrderId::new(),
            &info(),
            Side::Sell,
            OrderType::Limit,
            dec!(1),
            dec!(30000),
            dec!(30000),
        );
        assert!(order.is_none());
    }

    #[test]
    fn test_venue_order_remaining() {
        let order = VenueOrder {
            order_id: "1".to_string(),
            client_order_id: None,
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            price: dec!(100),
            size: dec!(2),
            filled_size: dec!(0.5),
            avg_price: None,
            status: OrderStatus::PartiallyFilled,
        };
        assert_eq!(order.remaining_size(), dec!(1.5));
        assert_eq!(order.filled_notional(), dec!(50));
        assert!(!order.is_filled());
    }
}

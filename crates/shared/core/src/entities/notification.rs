use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{OrderStatus, OrderType, Side};
use crate::values::{Price, Quantity};

/// Fields shared by every notification kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationData {
    /// Logical instrument name (routing key)
    pub instrument: String,
    pub venue: String,
    /// Venue-assigned order id
    pub order_id: String,
    /// Client order id, when the venue echoes it back
    pub client_order_id: Option<String>,
    pub side: Side,
    pub order_type: OrderType,
    pub size: Quantity,
    pub price: Price,
    /// Cumulative filled size of the order
    pub filled_size: Quantity,
    pub timestamp: DateTime<Utc>,
}

/// Asynchronous event pushed by a venue connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notification {
    /// An execution against one of our orders
    Trade(NotificationData),
    /// A status change of one of our orders
    Order {
        data: NotificationData,
        status: OrderStatus,
    },
}

impl Notification {
    pub fn trade(data: NotificationData) -> Self {
        Self::Trade(data)
    }

    pub fn order(data: NotificationData, status: OrderStatus) -> Self {
        Self::Order { data, status }
    }

    pub fn data(&self) -> &NotificationData {
        match self {
            Self::Trade(data) => data,
            Self::Order { data, .. } => data,
        }
    }

    /// Routing key for per-instrument fan-out
    pub fn instrument(&self) -> &str {
        &self.data().instrument
    }

    pub fn venue(&self) -> &str {
        &self.data().venue
    }

    /// Order status implied by this notification
    pub fn status(&self) -> OrderStatus {
        match self {
            Self::Order { status, .. } => *status,
            Self::Trade(data) if data.filled_size >= data.size => OrderStatus::Filled,
            Self::Trade(_) => OrderStatus::PartiallyFilled,
        }
    }

    pub fn is_trade(&self) -> bool {
        matches!(self, Self::Trade(_))
    }
}

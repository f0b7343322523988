use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PlanOrderId;
use crate::values::{Notional, Price};

/// Zero-cost execution between two opposite plan orders (no venue involved)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalCross {
    pub instrument: String,
    pub buy_plan: PlanOrderId,
    pub sell_plan: PlanOrderId,
    pub quantity: Notional,
    /// Reference price of the plan that was resting first
    pub price: Price,
    pub at: DateTime<Utc>,
}

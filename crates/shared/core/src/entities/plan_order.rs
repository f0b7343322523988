use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ExecutionStyle, Side};
use crate::error::DomainError;
use crate::values::{Notional, Price};

/// Unique identifier for a plan order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanOrderId(pub Uuid);

impl PlanOrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 hex characters, used as a prefix for client order ids
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for PlanOrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlanOrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A target exposure change for one logical instrument
///
/// Quantities are notional (quote currency) and always non-negative; the
/// direction lives in `side`, which never changes after creation.
/// `left_quantity` only ever decreases, and the order is terminal exactly
/// when it reaches zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanOrder {
    pub id: PlanOrderId,
    /// Logical instrument name (e.g. "BTC-USDT")
    pub instrument: String,
    /// Strategy that emitted this plan (for attribution)
    pub strategy: Option<String>,
    pub side: Side,
    pub total_quantity: Notional,
    left_quantity: Notional,
    /// Price the strategy saw when it created the plan
    pub reference_price: Price,
    pub style: ExecutionStyle,
    pub created_at: DateTime<Utc>,
    /// After this time a limit-style plan is worked with market orders
    pub expires_at: Option<DateTime<Utc>>,
}

impl PlanOrder {
    /// Create a new plan order
    pub fn new(
        instrument: impl Into<String>,
        side: Side,
        quantity: Notional,
        reference_price: Price,
    ) -> Result<Self, DomainError> {
        let instrument = instrument.into();
        if instrument.is_empty() {
            return Err(DomainError::EmptyInstrument);
        }
        if quantity <= Decimal::ZERO {
            return Err(DomainError::NonPositiveQuantity(quantity));
        }
        if reference_price <= Decimal::ZERO {
            return Err(DomainError::NonPositivePrice(reference_price));
        }

        Ok(Self {
            id: PlanOrderId::new(),
            instrument,
            strategy: None,
            side,
            total_quantity: quantity,
            left_quantity: quantity,
            reference_price,
            style: ExecutionStyle::default(),
            created_at: Utc::now(),
            expires_at: None,
        })
    }

    /// Create a plan order from a signed quantity (positive = buy)
    pub fn from_signed(
        instrument: impl Into<String>,
        signed_quantity: Notional,
        reference_price: Price,
    ) -> Result<Self, DomainError> {
        let side = Side::from_signed(signed_quantity)
            .ok_or(DomainError::NonPositiveQuantity(signed_quantity))?;
        Self::new(instrument, side, signed_quantity.abs(), reference_price)
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn with_style(mut self, style: ExecutionStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Quantity still to be executed
    pub fn left_quantity(&self) -> Notional {
        self.left_quantity
    }

    /// Quantity executed so far (at venues or netted internally)
    pub fn executed_quantity(&self) -> Notional {
        self.total_quantity - self.left_quantity
    }

    /// Remaining quantity with the plan's sign applied
    pub fn signed_left(&self) -> Notional {
        self.left_quantity * self.side.sign()
    }

    /// Apply an execution, returning the amount actually applied
    ///
    /// Negative amounts are ignored and the result is clamped at zero, so
    /// `left_quantity` is non-increasing.
    pub fn fill(&mut self, quantity: Notional) -> Notional {
        let applied = quantity.max(Decimal::ZERO).min(self.left_quantity);
        self.left_quantity -= applied;
        applied
    }

    pub fn is_terminal(&self) -> bool {
        self.left_quantity.is_zero()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| now > exp).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_plan_order() {
        let plan = PlanOrder::new("BTC-USDT", Side::Buy, dec!(1200), dec!(50000)).unwrap();
        assert_eq!(plan.left_quantity(), dec!(1200));
        assert_eq!(plan.executed_quantity(), Decimal::ZERO);
        assert!(!plan.is_terminal());
    }

    #[test]
    fn test_from_signed() {
        let plan = PlanOrder::from_signed("ETH-USDT", dec!(-300), dec!(3000)).unwrap();
        assert_eq!(plan.side, Side::Sell);
        assert_eq!(plan.total_quantity, dec!(300));
        assert_eq!(plan.signed_left(), dec!(-300));

        assert!(PlanOrder::from_signed("ETH-USDT", Decimal::ZERO, dec!(3000)).is_err());
    }

    #[test]
    fn test_rejects_invalid() {
        assert_eq!(
            PlanOrder::new("", Side::Buy, dec!(1), dec!(1)).unwrap_err(),
            DomainError::EmptyInstrument
        );
        assert!(PlanOrder::new("X", Side::Buy, dec!(-1), dec!(1)).is_err());
        assert!(PlanOrder::new("X", Side::Buy, dec!(1), Decimal::ZERO).is_err());
    }

    #[test]
    fn test_fill_is_monotonic_and_clamped() {
        let mut plan = PlanOrder::new("BTC-USDT", Side::Sell, dec!(100), dec!(10)).unwrap();

        assert_eq!(plan.fill(dec!(40)), dec!(40));
        assert_eq!(plan.left_quantity(), dec!(60));

        // Negative fills never increase the remainder
        assert_eq!(plan.fill(dec!(-10)), Decimal::ZERO);
        assert_eq!(plan.left_quantity(), dec!(60));

        // Overfill is clamped
        assert_eq!(plan.fill(dec!(500)), dec!(60));
        assert_eq!(plan.left_quantity(), Decimal::ZERO);
        assert!(plan.is_terminal());

        assert_eq!(plan.fill(dec!(1)), Decimal::ZERO);
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let plan = PlanOrder::new("BTC-USDT", Side::Buy, dec!(1), dec!(1))
            .unwrap()
            .with_expiry(now + Duration::seconds(5));

        assert!(!plan.is_expired_at(now));
        assert!(plan.is_expired_at(now + Duration::seconds(6)));
    }

    #[test]
    fn test_short_id() {
        let id = PlanOrderId::new();
        assert_eq!(id.short().len(), 8);
    }
}

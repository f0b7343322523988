use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (Buy or Sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Returns the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Side of a signed quantity (zero has no side)
    pub fn from_signed(quantity: Decimal) -> Option<Self> {
        if quantity > Decimal::ZERO {
            Some(Side::Buy)
        } else if quantity < Decimal::ZERO {
            Some(Side::Sell)
        } else {
            None
        }
    }

    /// +1 for Buy, -1 for Sell
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => Decimal::NEGATIVE_ONE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which directions a venue binding may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllowedSide {
    #[default]
    All,
    Buy,
    Sell,
}

impl AllowedSide {
    /// Whether orders on `side` may be routed through this binding
    pub fn permits(&self, side: Side) -> bool {
        matches!(
            (self, side),
            (AllowedSide::All, _) | (AllowedSide::Buy, Side::Buy) | (AllowedSide::Sell, Side::Sell)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_from_signed() {
        assert_eq!(Side::from_signed(dec!(5)), Some(Side::Buy));
        assert_eq!(Side::from_signed(dec!(-0.1)), Some(Side::Sell));
        assert_eq!(Side::from_signed(Decimal::ZERO), None);
    }

    #[test]
    fn test_allowed_side() {
        assert!(AllowedSide::All.permits(Side::Buy));
        assert!(AllowedSide::All.permits(Side::Sell));
        assert!(AllowedSide::Buy.permits(Side::Buy));
        assert!(!AllowedSide::Buy.permits(Side::Sell));
        assert!(!AllowedSide::Sell.permits(Side::Buy));
    }
}

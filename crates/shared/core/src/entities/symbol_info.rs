use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::AllowedSide;
use crate::error::DomainError;
use crate::values::{Notional, Price, Quantity};

/// Binding of a logical instrument to a venue's native symbol
///
/// Read-only to the execution core; the admin layer owns its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    /// Logical instrument name shared across venues
    pub instrument: String,
    /// Venue (account) name
    pub venue: String,
    /// Venue-native symbol
    pub symbol: String,
    /// Decimal places of the venue's price grid
    #[serde(default = "default_price_precision")]
    pub price_precision: u32,
    /// Decimal places of the venue's size grid
    #[serde(default = "default_size_precision")]
    pub size_precision: u32,
    #[serde(default)]
    pub allowed_side: AllowedSide,
    /// Notional window used for depth quotes and per-slice allocation
    pub depth_window: Notional,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_price_precision() -> u32 {
    2
}

fn default_size_precision() -> u32 {
    4
}

fn default_enabled() -> bool {
    true
}

impl SymbolInfo {
    /// Most decimal places a `Decimal` can represent
    pub const MAX_PRECISION: u32 = 28;

    pub fn new(
        instrument: impl Into<String>,
        venue: impl Into<String>,
        symbol: impl Into<String>,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            venue: venue.into(),
            symbol: symbol.into(),
            price_precision: default_price_precision(),
            size_precision: default_size_precision(),
            allowed_side: AllowedSide::All,
            depth_window: Decimal::ONE_THOUSAND,
            enabled: true,
        }
    }

    pub fn with_precision(mut self, price_precision: u32, size_precision: u32) -> Self {
        self.price_precision = price_precision;
        self.size_precision = size_precision;
        self
    }

    pub fn with_allowed_side(mut self, allowed_side: AllowedSide) -> Self {
        self.allowed_side = allowed_side;
        self
    }

    pub fn with_depth_window(mut self, depth_window: Notional) -> Self {
        self.depth_window = depth_window;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Reject bindings the execution core can not size or price
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.instrument.is_empty() {
            return Err(DomainError::EmptyInstrument);
        }
        for precision in [self.price_precision, self.size_precision] {
            if precision > Self::MAX_PRECISION {
                return Err(DomainError::PrecisionTooLarge(precision));
            }
        }
        if self.depth_window <= Decimal::ZERO {
            return Err(DomainError::NonPositiveDepthWindow(self.depth_window));
        }
        Ok(())
    }

    /// Smallest price increment
    pub fn tick_size(&self) -> Price {
        Decimal::new(1, self.price_precision.min(Self::MAX_PRECISION))
    }

    pub fn round_price(&self, price: Price) -> Price {
        price.round_dp_with_strategy(self.price_precision, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Base-unit size for `notional` at `price`, rounded toward zero
    pub fn size_for(&self, notional: Notional, price: Price) -> Quantity {
        if price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (notional / price).round_dp_with_strategy(self.size_precision, RoundingStrategy::ToZero)
    }
}

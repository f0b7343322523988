use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Price value - uses Decimal for precision
pub type Price = Decimal;

/// Base-unit quantity (what a venue order size is expressed in)
pub type Quantity = Decimal;

/// Quote-currency amount (what plan orders and depth windows are expressed in)
pub type Notional = Decimal;

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

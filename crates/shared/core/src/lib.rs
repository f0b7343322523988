//! Hedge Core Domain
//!
//! Pure domain types for the hedge execution engine.
//! This crate contains no async, no I/O, and is 100% unit testable.
//!
//! - [`PlanOrder`]: what a strategy wants executed on a logical instrument
//! - [`ExOrder`]: one order sent to one venue on behalf of a plan
//! - [`SymbolInfo`]: how an instrument is bound to a venue's native symbol
//! - [`Notification`]: fill/order-state events pushed by venue connections
//! - [`TrackedOrder`]: a resting limit order watched for price risk and expiry

pub mod entities;
pub mod error;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{
    AllowedSide, ExOrder, ExecutionStyle, InternalCross, Notification, NotificationData,
    OrderState, OrderStatus, OrderType, PlanOrder, PlanOrderId, Side, SymbolInfo, TrackStatus,
    TrackedOrder, VenueOrder,
};
pub use error::DomainError;
pub use values::{Notional, Price, Quantity, Timestamp};

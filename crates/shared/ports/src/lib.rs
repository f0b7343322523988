//! Hedge Ports
//!
//! Capability traits consumed by the execution core. Venue adapters,
//! persistence, alerting and time sources are injected through these
//! instead of being subclassed or reached through globals.

mod alert;
mod clock;
mod error;
mod store;
mod venue;

pub use alert::{Alert, AlertLevel, Alerter};
pub use clock::Clock;
pub use error::{StoreError, StoreResult, VenueError, VenueResult};
pub use store::{NullStore, OrderStore};
pub use venue::VenueClient;

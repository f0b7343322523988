//! Hedge Gateway
//!
//! Everything between the execution core and the outside venues:
//! - Venue registry with symbol bindings and readiness gating
//! - Timeout-enforcing venue connections
//! - Venue factory (build adapters by configured kind)
//! - Notification fan-out from the shared inbound queue to per-instrument queues
//! - Adapters (in-process simulator)
//!
//! ## Architecture
//!
//! ```text
//!  Venue A   Venue B   Venue C        (VenueClient adapters)
//!     │         │         │
//!     └─────────┼─────────┘ notifications (shared inbound queue)
//!               ▼
//!     ┌───────────────────────┐
//!     │ NotificationDispatcher│──► global listener (audit)
//!     └──────────┬────────────┘
//!                │ per-instrument queues
//!     ┌──────────▼────────────┐
//!     │  Instrument workers   │──► VenueRegistry ──► VenueConnection ──► venue
//!     └───────────────────────┘
//! ```

pub mod adapters;
pub mod connection;
pub mod error;
pub mod factory;
pub mod notification;
pub mod registry;
pub mod transport;

// Re-export commonly used types
pub use adapters::simulator::{SimulatedVenue, SimulatedVenueParams};
pub use connection::VenueConnection;
pub use error::{RegistryError, Result, TransportError};
pub use factory::{VenueConstructor, VenueFactory, VenueSettings};
pub use notification::{AuditListener, NotificationDispatcher, NotificationListener};
pub use registry::{Candidate, ReadinessReport, RegistryConfig, VenueRegistry};
pub use transport::{NotificationReceiver, NotificationSender, Shutdown, notification_channel};

//! Venue adapters
//!
//! Each adapter implements [`hedge_ports::VenueClient`] and pushes its order
//! and trade events onto the shared notification queue.

pub mod simulator;

pub use simulator::{SimulatedVenue, SimulatedVenueParams};

//! In-process simulated venue
//!
//! Used for dry runs, the demo configuration and tests. Books are static
//! price ladders set by the caller; market orders fill against them at
//! once and limit orders rest until [`SimulatedVenue::fill_resting`].

mod book;
mod venue;

pub use book::SimBook;
pub use venue::{SimCallCounts, SimulatedVenue, SimulatedVenueParams};

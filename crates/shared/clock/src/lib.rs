//! Hedge Clock Infrastructure
//!
//! - [`SystemClock`]: wall-clock time for production
//! - [`ManualClock`]: fixed time that only moves when told to, for
//!   deterministic expiry tests
//!
//! ```ignore
//! use hedge_clock::{Clock, ManualClock};
//! use chrono::Duration;
//!
//! let clock = ManualClock::starting_now();
//! let t0 = clock.now();
//! clock.advance(Duration::seconds(30));
//! assert_eq!(clock.now() - t0, Duration::seconds(30));
//! ```

mod manual;
mod system;

pub use manual::ManualClock;
pub use system::SystemClock;

// Re-export the Clock trait for convenience
pub use hedge_ports::Clock;

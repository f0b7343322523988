//! In-process transport
//!
//! Venues push notifications onto one shared unbounded queue; the
//! notification dispatcher is its single consumer. Long-running loops
//! observe a cooperative [`Shutdown`] signal.

pub mod channel;
pub mod shutdown;

pub use channel::{NotificationReceiver, NotificationSender, notification_channel};
pub use shutdown::Shutdown;

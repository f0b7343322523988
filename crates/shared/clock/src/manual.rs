use chrono::{Duration, Utc};
use hedge_core::Timestamp;
use hedge_ports::Clock;
use std::sync::RwLock;

/// Clock frozen at a given instant until explicitly moved
pub struct ManualClock {
    current: RwLock<Timestamp>,
}

impl ManualClock {
    pub fn new(initial_time: Timestamp) -> Self {
        Self {
            current: RwLock::new(initial_time),
        }
    }

    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Jump forward (or backward, for negative durations)
    pub fn advance(&self, by: Duration) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current += by;
    }

    pub fn set(&self, time: Timestamp) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = time;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    fn name(&self) -> &str {
        "ManualClock"
    }
}

use chrono::Utc;
use hedge_core::Timestamp;
use hedge_ports::Clock;

/// Wall-clock time, used by the live engine
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }

    fn name(&self) -> &str {
        "SystemClock"
    }
}

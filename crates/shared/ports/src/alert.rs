use chrono::{DateTime, Utc};

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

/// Message sent to an external alerting channel
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub level: AlertLevel,
    /// Component or strategy that raised the alert
    pub source: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Alert {
    pub fn new(level: AlertLevel, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            source: source.into(),
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// External alerting channel, injected at construction
pub trait Alerter: Send + Sync {
    fn start(&self) {}

    /// Deliver an alert; must not block the caller
    fn send(&self, alert: Alert);

    fn stop(&self) {}
}

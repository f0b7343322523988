//! Alerter implementations

use hedge_ports::{Alert, AlertLevel, Alerter};
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Writes alerts to the log
#[derive(Debug, Default)]
pub struct LogAlerter {
    sent: AtomicU64,
}

impl LogAlerter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

impl Alerter for LogAlerter {
    fn send(&self, alert: Alert) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        match alert.level {
            AlertLevel::Info => info!("[ALERT] {}: {}", alert.source, alert.message),
            AlertLevel::Warning => warn!("[ALERT] {}: {}", alert.source, alert.message),
            AlertLevel::Critical => error!("[ALERT] {}: {}", alert.source, alert.message),
        }
    }
}

/// Forwards alerts to a channel for an external consumer
///
/// Alerts sent before `start` or after `stop` are dropped.
pub struct ChannelAlerter {
    tx: mpsc::UnboundedSender<Alert>,
    running: AtomicBool,
}

impl ChannelAlerter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let alerter = Self {
            tx,
            running: AtomicBool::new(false),
        };
        (alerter, rx)
    }
}

impl Alerter for ChannelAlerter {
    fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    fn send(&self, alert: Alert) {
        if !self.running.load(Ordering::SeqCst) {
            warn!("[ALERT] alerter not running, dropped: {}", alert.message);
            return;
        }
        if self.tx.send(alert).is_err() {
            warn!("[ALERT] alert receiver gone");
        }
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

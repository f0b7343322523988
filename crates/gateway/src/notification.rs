//! Notification fan-out
//!
//! The dispatcher is the single consumer of the shared inbound queue. Each
//! item is shown to the global listener once, then routed to the queue
//! registered for its instrument.

use crate::transport::{NotificationReceiver, Shutdown};
use dashmap::DashMap;
use hedge_core::Notification;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Observer called once for every inbound notification
pub trait NotificationListener: Send + Sync {
    fn on_notification(&self, notification: &Notification);
}

/// Listener that counts and logs everything it sees
#[derive(Debug, Default)]
pub struct AuditListener {
    received: AtomicU64,
    per_venue: DashMap<String, u64>,
}

impl AuditListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn received_from(&self, venue: &str) -> u64 {
        self.per_venue.get(venue).map(|n| *n).unwrap_or(0)
    }
}

impl NotificationListener for AuditListener {
    fn on_notification(&self, notification: &Notification) {
        self.received.fetch_add(1, Ordering::Relaxed);
        *self
            .per_venue
            .entry(notification.venue().to_string())
            .or_insert(0) += 1;
        let data = notification.data();
        debug!(
            "[NOTIFY] {} {} {} order {} {:?} filled {}/{}",
            data.venue,
            data.instrument,
            data.side,
            data.order_id,
            notification.status(),
            data.filled_size,
            data.size
        );
    }
}

pub struct NotificationDispatcher {
    queues: DashMap<String, mpsc::UnboundedSender<Notification>>,
    listener: Arc<dyn NotificationListener>,
    routed: AtomicU64,
    dropped: AtomicU64,
}

impl NotificationDispatcher {
    pub fn new(listener: Arc<dyn NotificationListener>) -> Self {
        Self {
            queues: DashMap::new(),
            listener,
            routed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Open the queue for `instrument`, replacing any previous one
    pub fn register(&self, instrument: &str) -> mpsc::UnboundedReceiver<Notification> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.queues.insert(instrument.to_string(), tx).is_some() {
            debug!("[NOTIFY] replaced queue for {}", instrument);
        }
        rx
    }

    pub fn unregister(&self, instrument: &str) {
        self.queues.remove(instrument);
    }

    pub fn is_registered(&self, instrument: &str) -> bool {
        self.queues.contains_key(instrument)
    }

    pub fn routed(&self) -> u64 {
        self.routed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Route one notification. Returns whether an instrument queue took it.
    pub fn dispatch(&self, notification: Notification) -> bool {
        self.listener.on_notification(&notification);

        let delivered = match self.queues.get(notification.instrument()) {
            Some(queue) => queue.send(notification).is_ok(),
            None => {
                warn!(
                    "[NOTIFY] no queue for {}, dropping {} notification",
                    notification.instrument(),
                    notification.venue()
                );
                false
            }
        };

        if delivered {
            self.routed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        delivered
    }

    /// Consume the inbound queue until shutdown or until every sender is gone
    pub async fn run(self: Arc<Self>, mut inbound: NotificationReceiver, shutdown: Shutdown) {
        info!("[NOTIFY] dispatcher started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                next = inbound.recv() => match next {
                    Some(notification) => {
                        self.dispatch(notification);
                    }
                    None => break,
                },
            }
        }

        // One best-effort pass over whatever is already queued
        let mut drained = 0usize;
        while let Some(notification) = inbound.try_recv() {
            self.dispatch(notification);
            drained += 1;
        }
        info!(
            "[NOTIFY] dispatcher stopped (routed {}, dropped {}, drained {})",
            self.routed(),
            self.dropped(),
            drained
        );
    }
}

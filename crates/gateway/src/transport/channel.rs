//! Tokio channel for venue notifications
//!
//! Unbounded mpsc: venue callbacks never block on a slow consumer.

use crate::error::TransportError;
use hedge_core::Notification;
use tokio::sync::mpsc;

/// Producer side, cloned into every venue adapter
#[derive(Debug, Clone)]
pub struct NotificationSender {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationSender {
    /// Enqueue a notification. Fails only once the receiver is gone.
    pub fn send(&self, notification: Notification) -> Result<(), TransportError> {
        self.tx
            .send(notification)
            .map_err(|_| TransportError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side, owned by the notification dispatcher
#[derive(Debug)]
pub struct NotificationReceiver {
    rx: mpsc::UnboundedReceiver<Notification>,
}

impl NotificationReceiver {
    /// Wait for the next notification, `None` once every sender is dropped
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }

    /// Non-blocking receive, `None` when nothing is queued
    pub fn try_recv(&mut self) -> Option<Notification> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Create a connected sender/receiver pair
pub fn notification_channel() -> (NotificationSender, NotificationReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (NotificationSender { tx }, NotificationReceiver { rx })
}

//! Strategy Manager
//!
//! Every running strategy gets a periodic runner and, when it is bound to
//! an instrument, a notification runner:
//!
//! ```text
//!   sleep(run_interval | next_wake) ──► spawn(run) ──► FailureCounter ──► Alerter
//!   venue notification ──► per-strategy queue ──► spawn(notify)
//! ```
//!
//! Callbacks run in their own task, so an error or a panic only counts
//! against the strategy that raised it.

use crate::error::{EngineError, Result};
use dashmap::DashMap;
use hedge_core::Notification;
use hedge_gateway::Shutdown;
use hedge_order_manager::NotificationForwarder;
use hedge_ports::{Alert, AlertLevel, Alerter};
use hedge_strategy::{Strategy, StrategyContext, StrategyError};
use log::{debug, error, info, warn};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

/// Floor on the wait before a `next_wake` that is already due
const MIN_WAKE_DELAY: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct StrategyManagerConfig {
    /// Consecutive run failures between alerts
    pub failure_threshold: u32,
    /// Bound on joining a runner or waiting for `stop()`
    pub join_timeout: Duration,
}

impl Default for StrategyManagerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 7,
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Counts consecutive failures and says when an alert is due
///
/// An alert is due on every `threshold`-th consecutive failure (7, 14, ...);
/// a success resets the streak.
#[derive(Debug, Clone)]
pub struct FailureCounter {
    threshold: u64,
    consecutive: u64,
    total: u64,
}

impl FailureCounter {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: u64::from(threshold.max(1)),
            consecutive: 0,
            total: 0,
        }
    }

    pub fn success(&mut self) {
        self.consecutive = 0;
    }

    /// Record a failure, returning whether an alert is due
    pub fn failure(&mut self) -> bool {
        self.consecutive += 1;
        self.total += 1;
        self.consecutive % self.threshold == 0
    }

    pub fn consecutive(&self) -> u64 {
        self.consecutive
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

#[derive(Debug, Default)]
struct Stats {
    runs: AtomicU64,
    failures: AtomicU64,
    alerts: AtomicU64,
    notifications: AtomicU64,
    notify_failures: AtomicU64,
}

/// Counters for one running strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrategyStats {
    pub runs: u64,
    pub failures: u64,
    pub alerts: u64,
    pub notifications: u64,
    pub notify_failures: u64,
}

impl From<&Stats> for StrategyStats {
    fn from(stats: &Stats) -> Self {
        Self {
            runs: stats.runs.load(Ordering::Relaxed),
            failures: stats.failures.load(Ordering::Relaxed),
            alerts: stats.alerts.load(Ordering::Relaxed),
            notifications: stats.notifications.load(Ordering::Relaxed),
            notify_failures: stats.notify_failures.load(Ordering::Relaxed),
        }
    }
}

struct Running {
    strategy: Arc<dyn Strategy>,
    ctx: StrategyContext,
    instrument: Option<String>,
    shutdown: Shutdown,
    periodic: JoinHandle<()>,
    notifier: Option<JoinHandle<()>>,
    /// Latch guarding `stop()`
    stopped: Arc<AtomicBool>,
    stats: Arc<Stats>,
}

pub struct StrategyManager {
    config: StrategyManagerConfig,
    alerter: Arc<dyn Alerter>,
    running: DashMap<String, Running>,
    /// instrument -> strategy name -> notification queue
    subscribers: DashMap<String, HashMap<String, mpsc::UnboundedSender<Notification>>>,
}

impl StrategyManager {
    pub fn new(config: StrategyManagerConfig, alerter: Arc<dyn Alerter>) -> Self {
        Self {
            config,
            alerter,
            running: DashMap::new(),
            subscribers: DashMap::new(),
        }
    }

    pub fn config(&self) -> &StrategyManagerConfig {
        &self.config
    }

    /// Call `start()` and launch the strategy's runners
    pub async fn start_strategy(&self, strategy: Box<dyn Strategy>, ctx: StrategyContext) -> Result<()> {
        let strategy: Arc<dyn Strategy> = Arc::from(strategy);
        let name = strategy.name().to_string();
        if self.running.contains_key(&name) {
            return Err(EngineError::DuplicateStrategy(name));
        }

        let starting = {
            let (s, c) = (strategy.clone(), ctx.clone());
            tokio::spawn(async move { s.start(&c).await })
        };
        if let Err(e) = flatten(starting.await) {
            error!("[STRATEGY] {} failed to start: {}", name, e);
            self.alerter.send(Alert::new(
                AlertLevel::Critical,
                &name,
                format!("failed to start: {}", e),
            ));
            return Err(e.into());
        }

        let shutdown = Shutdown::new();
        let stats = Arc::new(Stats::default());
        let instrument = strategy.instrument().map(str::to_string);

        let notifier = instrument.as_ref().map(|instrument| {
            let (tx, rx) = mpsc::unbounded_channel();
            self.subscribers
                .entry(instrument.clone())
                .or_default()
                .insert(name.clone(), tx);
            tokio::spawn(run_notifications(
                strategy.clone(),
                ctx.clone(),
                rx,
                shutdown.clone(),
                stats.clone(),
            ))
        });
        let periodic = tokio::spawn(run_periodic(
            strategy.clone(),
            ctx.clone(),
            shutdown.clone(),
            self.alerter.clone(),
            stats.clone(),
            self.config.failure_threshold,
        ));

        info!(
            "[STRATEGY] {} started (every {:?}{})",
            name,
            strategy.run_interval(),
            instrument
                .as_deref()
                .map(|i| format!(", notifications for {}", i))
                .unwrap_or_default()
        );
        self.running.insert(
            name,
            Running {
                strategy,
                ctx,
                instrument,
                shutdown,
                periodic,
                notifier,
                stopped: Arc::new(AtomicBool::new(false)),
                stats,
            },
        );
        Ok(())
    }

    /// Stop a strategy's runners, then call its `stop()` once
    ///
    /// Returns whether the strategy was running.
    pub async fn stop_strategy(&self, name: &str) -> bool {
        let Some((_, running)) = self.running.remove(name) else {
            return false;
        };
        if let Some(instrument) = &running.instrument {
            if let Some(mut subscribers) = self.subscribers.get_mut(instrument) {
                subscribers.remove(name);
            }
            self.subscribers
                .remove_if(instrument, |_, subscribers| subscribers.is_empty());
        }

        running.shutdown.trigger();
        join_bounded(name, "periodic runner", running.periodic, self.config.join_timeout).await;
        if let Some(notifier) = running.notifier {
            join_bounded(name, "notification runner", notifier, self.config.join_timeout).await;
        }

        if running.stopped.swap(true, Ordering::SeqCst) {
            return true;
        }
        let stopping = {
            let (s, c) = (running.strategy.clone(), running.ctx.clone());
            tokio::spawn(async move { s.stop(&c).await })
        };
        match tokio::time::timeout(self.config.join_timeout, stopping).await {
            Ok(joined) => match flatten(joined) {
                Ok(()) => info!("[STRATEGY] {} stopped", name),
                Err(e) => error!("[STRATEGY] {} stop failed: {}", name, e),
            },
            Err(_) => warn!(
                "[STRATEGY] {} stop did not finish within {:?}",
                name, self.config.join_timeout
            ),
        }
        true
    }

    pub async fn stop_all(&self) {
        for name in self.strategy_names() {
            self.stop_strategy(&name).await;
        }
    }

    pub fn strategy_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.running.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.running.contains_key(name)
    }

    pub fn stats(&self, name: &str) -> Option<StrategyStats> {
        self.running
            .get(name)
            .map(|r| StrategyStats::from(r.stats.as_ref()))
    }

    /// Strategies listening to `instrument`
    pub fn subscriber_count(&self, instrument: &str) -> usize {
        self.subscribers.get(instrument).map(|s| s.len()).unwrap_or(0)
    }
}

impl NotificationForwarder for StrategyManager {
    fn forward(&self, notification: &Notification) {
        let Some(subscribers) = self.subscribers.get(notification.instrument()) else {
            return;
        };
        for (name, tx) in subscribers.iter() {
            if tx.send(notification.clone()).is_err() {
                debug!("[STRATEGY] {} notification queue closed", name);
            }
        }
    }
}

async fn run_periodic(
    strategy: Arc<dyn Strategy>,
    ctx: StrategyContext,
    shutdown: Shutdown,
    alerter: Arc<dyn Alerter>,
    stats: Arc<Stats>,
    failure_threshold: u32,
) {
    let name = strategy.name().to_string();
    let mut failures = FailureCounter::new(failure_threshold);

    loop {
        let delay = next_delay(strategy.as_ref(), &ctx);
        tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        stats.runs.fetch_add(1, Ordering::Relaxed);
        let running = {
            let (s, c) = (strategy.clone(), ctx.clone());
            tokio::spawn(async move { s.run(&c).await })
        };
        match flatten(running.await) {
            Ok(()) => failures.success(),
            Err(e) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                let alert_due = failures.failure();
                warn!(
                    "[STRATEGY] {} run failed ({} in a row): {}",
                    name,
                    failures.consecutive(),
                    e
                );
                if alert_due {
                    stats.alerts.fetch_add(1, Ordering::Relaxed);
                    let message = format!(
                        "{} consecutive failures, last: {}",
                        failures.consecutive(),
                        e
                    );
                    error!("[STRATEGY] {} {}", name, message);
                    alerter.send(Alert::new(AlertLevel::Critical, &name, message));
                }
            }
        }
    }
    debug!("[STRATEGY] {} periodic runner exited", name);
}

async fn run_notifications(
    strategy: Arc<dyn Strategy>,
    ctx: StrategyContext,
    mut queue: mpsc::UnboundedReceiver<Notification>,
    shutdown: Shutdown,
    stats: Arc<Stats>,
) {
    let name = strategy.name().to_string();
    loop {
        let notification = tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            item = queue.recv() => match item {
                Some(notification) => notification,
                None => break,
            },
        };

        stats.notifications.fetch_add(1, Ordering::Relaxed);
        let notifying = {
            let (s, c) = (strategy.clone(), ctx.clone());
            tokio::spawn(async move { s.notify(&c, &notification).await })
        };
        if let Err(e) = flatten(notifying.await) {
            stats.notify_failures.fetch_add(1, Ordering::Relaxed);
            warn!("[STRATEGY] {} notify failed: {}", name, e);
        }
    }
    debug!("[STRATEGY] {} notification runner exited", name);
}

/// Time to sleep before the next `run`
fn next_delay(strategy: &dyn Strategy, ctx: &StrategyContext) -> Duration {
    let now = ctx.now();
    match strategy.next_wake(now) {
        Some(wake) => (wake - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .max(MIN_WAKE_DELAY),
        None => strategy.run_interval(),
    }
}

async fn join_bounded(name: &str, what: &str, mut handle: JoinHandle<()>, timeout: Duration) {
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("[STRATEGY] {} {} failed: {}", name, what, e),
        Err(_) => {
            warn!(
                "[STRATEGY] {} {} did not stop within {:?}, aborting",
                name, what, timeout
            );
            handle.abort();
        }
    }
}

/// Fold a callback task's panic or cancellation into a strategy error
fn flatten(
    joined: std::result::Result<hedge_strategy::Result<()>, JoinError>,
) -> hedge_strategy::Result<()> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(StrategyError::Panicked(panic_message(e.into_panic()))),
        Err(e) => Err(StrategyError::Failed(e.to_string())),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hedge_clock::ManualClock;
    use hedge_core::{PlanOrder, PlanOrderId, Timestamp};
    use hedge_ports::Clock;
    use hedge_strategy::{PlanOrderSink, PlanSnapshot};

    struct NoSink;

    #[async_trait]
    impl PlanOrderSink for NoSink {
        async fn make_order(&self, _plan: PlanOrder) -> hedge_strategy::Result<PlanOrderId> {
            Err(StrategyError::Order("no engine".to_string()))
        }

        async fn plan(&self, _id: PlanOrderId) -> Option<PlanSnapshot> {
            None
        }

        async fn cancel_plan(&self, id: PlanOrderId) -> hedge_strategy::Result<PlanOrder> {
            Err(StrategyError::Order(format!("unknown plan {}", id)))
        }
    }

    struct Waker {
        wake: Option<Timestamp>,
    }

    #[async_trait]
    impl Strategy for Waker {
        fn name(&self) -> &str {
            "waker"
        }

        fn run_interval(&self) -> Duration {
            Duration::from_secs(60)
        }

        fn next_wake(&self, _now: Timestamp) -> Option<Timestamp> {
            self.wake
        }

        async fn run(&self, _ctx: &StrategyContext) -> hedge_strategy::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failure_counter_alerts_every_threshold() {
        let mut counter = FailureCounter::new(7);
        let alerts: Vec<bool> = (0..14).map(|_| counter.failure()).collect();
        assert_eq!(alerts.iter().filter(|a| **a).count(), 2);
        assert!(alerts[6] && alerts[13]);

        counter.success();
        assert_eq!(counter.consecutive(), 0);
        assert_eq!(counter.total(), 14);
        assert!(!counter.failure());
    }

    #[test]
    fn test_next_delay_prefers_next_wake() {
        let clock = Arc::new(ManualClock::starting_now());
        let ctx = StrategyContext::new(Arc::new(NoSink), clock.clone());

        let fixed = Waker { wake: None };
        assert_eq!(next_delay(&fixed, &ctx), Duration::from_secs(60));

        let soon = Waker {
            wake: Some(clock.now() + chrono::Duration::seconds(2)),
        };
        assert_eq!(next_delay(&soon, &ctx), Duration::from_secs(2));

        let overdue = Waker {
            wake: Some(clock.now() - chrono::Duration::seconds(2)),
        };
        assert_eq!(next_delay(&overdue, &ctx), MIN_WAKE_DELAY);
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("bang".to_string())), "bang");
        assert_eq!(panic_message(Box::new(3)), "non-string panic payload");
    }
}

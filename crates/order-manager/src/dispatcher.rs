//! Order Dispatcher
//!
//! One worker task per instrument owns that instrument's plan book and
//! tracker. Every `order_interval` it:
//! 1. drains venue notifications (fills into plans, then on to strategies)
//! 2. evaluates resting limit orders and escalates the ones to remove
//! 3. issues the next slice for every plan with free quantity
//! 4. retires completed plans
//!
//! Market-style (or expired) plans are worked with market orders across
//! venues, best fee-adjusted depth first. Limit-style plans rest one order
//! one tick inside the spread at the best maker venue.

use crate::error::{Error, Result};
use crate::netting::{BookEntry, NettingEngine, PlanBook, PlanState, SubmitOutcome};
use crate::router::{FeeKind, VenueSelector};
use crate::tracker::{Removal, RemovalReason, Resolution, StopOrderTracker, TrackerConfig};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hedge_core::{
    ExOrder, ExecutionStyle, InternalCross, Notification, Notional, OrderType, PlanOrder,
    PlanOrderId, Price, Side, TrackedOrder,
};
use hedge_gateway::{NotificationDispatcher, Shutdown, VenueConnection, VenueRegistry};
use hedge_ports::{Clock, OrderStore, VenueError};
use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Worker tick period
    pub order_interval: Duration,
    /// Resting time after which a limit order is escalated to market
    pub limit_expired_time: Duration,
    /// Run-away band for resting orders (zero disables)
    pub order_risk_rate: Decimal,
    /// Smallest remainder worth a market replacement
    pub min_order_quantity: Notional,
    /// Bound on joining a worker at stop
    pub join_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            order_interval: Duration::from_millis(600),
            limit_expired_time: Duration::from_secs(30),
            order_risk_rate: Decimal::ZERO,
            min_order_quantity: Decimal::TEN,
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl DispatcherConfig {
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            alive_time: self.limit_expired_time,
            risk_rate: self.order_risk_rate,
            min_order_quantity: self.min_order_quantity,
        }
    }
}

/// Receives every venue notification once the worker has applied it
pub trait NotificationForwarder: Send + Sync {
    fn forward(&self, notification: &Notification);
}

/// Forwarder for setups without strategies
#[derive(Debug, Default)]
pub struct NoForwarding;

impl NotificationForwarder for NoForwarding {
    fn forward(&self, _notification: &Notification) {}
}

/// Limit price one tick inside the spread, or at the touch if that would cross
pub fn limit_price(side: Side, bid: Price, ask: Price, tick: Price) -> Price {
    match side {
        Side::Buy => {
            let inside = bid + tick;
            if inside >= ask { bid } else { inside }
        }
        Side::Sell => {
            let inside = ask - tick;
            if inside <= bid { ask } else { inside }
        }
    }
}

async fn persist_plan(store: &dyn OrderStore, plan: &PlanOrder) {
    if let Err(e) = store.save_plan_order(plan).await {
        warn!("[EXEC] failed to save plan {}: {}", plan.id.short(), e);
    }
}

async fn persist_ex_order(store: &dyn OrderStore, order: &ExOrder, venue_order_id: &str) {
    if let Err(e) = store.save_ex_order(order, Some(venue_order_id)).await {
        warn!("[EXEC] failed to save order {}: {}", order.client_order_id, e);
    }
}

async fn persist_cross(store: &dyn OrderStore, cross: &InternalCross) {
    if let Err(e) = store.save_cross(cross).await {
        warn!("[EXEC] failed to save cross on {}: {}", cross.instrument, e);
    }
}

struct WorkerHandle {
    shutdown: Shutdown,
    handle: JoinHandle<()>,
}

pub struct OrderDispatcher {
    config: DispatcherConfig,
    registry: Arc<VenueRegistry>,
    netting: Arc<NettingEngine>,
    notifications: Arc<NotificationDispatcher>,
    store: Arc<dyn OrderStore>,
    clock: Arc<dyn Clock>,
    forwarder: Arc<dyn NotificationForwarder>,
    workers: DashMap<String, WorkerHandle>,
    /// Orders a stopped worker could not cancel, adopted by the next one
    stranded: Arc<DashMap<String, Vec<TrackedOrder>>>,
}

impl OrderDispatcher {
    pub fn new(
        config: DispatcherConfig,
        registry: Arc<VenueRegistry>,
        netting: Arc<NettingEngine>,
        notifications: Arc<NotificationDispatcher>,
        store: Arc<dyn OrderStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            registry,
            netting,
            notifications,
            store,
            clock,
            forwarder: Arc::new(NoForwarding),
            workers: DashMap::new(),
            stranded: Arc::new(DashMap::new()),
        }
    }

    pub fn with_forwarder(mut self, forwarder: Arc<dyn NotificationForwarder>) -> Self {
        self.forwarder = forwarder;
        self
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn netting(&self) -> &Arc<NettingEngine> {
        &self.netting
    }

    /// Accept a plan: persist it, net it, and leave the residual for the worker
    pub async fn submit_plan(&self, plan: PlanOrder) -> Result<SubmitOutcome> {
        let bindings = self.registry.bindings(&plan.instrument);
        if bindings.is_empty() {
            return Err(Error::UnknownInstrument(plan.instrument.clone()));
        }
        // No worker runs for an instrument whose bindings are all disabled
        if !bindings.iter().any(|b| b.enabled) {
            return Err(Error::NoVenueAvailable {
                instrument: plan.instrument.clone(),
                side: plan.side,
            });
        }

        persist_plan(self.store.as_ref(), &plan).await;
        let outcome = self.netting.submit_at(plan, self.clock.now()).await;
        for cross in &outcome.crosses {
            persist_cross(self.store.as_ref(), cross).await;
        }
        for done in &outcome.completed {
            info!(
                "[EXEC] plan {} completed by netting ({} {})",
                done.id.short(),
                done.side,
                done.total_quantity
            );
            persist_plan(self.store.as_ref(), done).await;
        }
        Ok(outcome)
    }

    /// Withdraw a plan; a resting order working it is cancelled on the next tick
    pub async fn cancel_plan(&self, id: PlanOrderId) -> Result<PlanOrder> {
        let entry = self.netting.cancel_plan(id).await?;
        persist_plan(self.store.as_ref(), &entry.plan).await;
        Ok(entry.plan)
    }

    pub async fn plan(&self, id: PlanOrderId) -> Option<PlanOrder> {
        self.netting.plan(id).await
    }

    pub async fn plan_state(&self, id: PlanOrderId) -> Option<PlanState> {
        self.netting.plan_state(id).await
    }

    pub fn running_instruments(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workers.iter().map(|w| w.key().clone()).collect();
        names.sort();
        names
    }

    pub fn is_running(&self, instrument: &str) -> bool {
        self.workers.contains_key(instrument)
    }

    /// Orders still resting at venues for `instrument` with no worker tracking them
    pub fn stranded_orders(&self, instrument: &str) -> Vec<TrackedOrder> {
        self.stranded
            .get(instrument)
            .map(|orders| orders.value().clone())
            .unwrap_or_default()
    }

    /// Build a worker for `instrument` and open its notification queue
    ///
    /// The worker is not spawned; [`spawn_instrument`](Self::spawn_instrument)
    /// does that. Tests drive a worker directly with [`InstrumentWorker::tick`].
    pub fn build_worker(&self, instrument: &str) -> InstrumentWorker {
        let inbox = self.notifications.register(instrument);
        let mut tracker = StopOrderTracker::new(self.config.tracker_config());
        if let Some((_, orders)) = self.stranded.remove(instrument) {
            info!(
                "[EXEC] {} worker adopting {} orders left resting by its predecessor",
                instrument,
                orders.len()
            );
            for order in orders {
                tracker.restore(order);
            }
        }
        InstrumentWorker {
            instrument: instrument.to_string(),
            config: self.config.clone(),
            registry: self.registry.clone(),
            selector: VenueSelector::new(self.registry.clone()),
            netting: self.netting.clone(),
            book: self.netting.book(instrument),
            store: self.store.clone(),
            clock: self.clock.clone(),
            forwarder: self.forwarder.clone(),
            inbox,
            tracker,
            stranded: self.stranded.clone(),
        }
    }

    /// Start the worker task for `instrument` (no-op if already running)
    pub fn spawn_instrument(&self, instrument: &str) -> Result<()> {
        if self.workers.contains_key(instrument) {
            return Ok(());
        }
        if !self.registry.bindings(instrument).iter().any(|b| b.enabled) {
            return Err(Error::UnknownInstrument(instrument.to_string()));
        }

        let worker = self.build_worker(instrument);
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(worker.run(shutdown.clone()));
        self.workers
            .insert(instrument.to_string(), WorkerHandle { shutdown, handle });
        info!("[EXEC] worker started for {}", instrument);
        Ok(())
    }

    /// Stop the worker for `instrument`, returning whether one was running
    pub async fn stop_instrument(&self, instrument: &str) -> bool {
        let Some((_, worker)) = self.workers.remove(instrument) else {
            return false;
        };
        worker.shutdown.trigger();

        let mut handle = worker.handle;
        match tokio::time::timeout(self.config.join_timeout, &mut handle).await {
            Ok(Ok(())) => info!("[EXEC] worker for {} stopped", instrument),
            Ok(Err(e)) => error!("[EXEC] worker for {} failed: {}", instrument, e),
            Err(_) => {
                warn!(
                    "[EXEC] worker for {} did not stop within {:?}, aborting",
                    instrument, self.config.join_timeout
                );
                handle.abort();
            }
        }
        self.notifications.unregister(instrument);
        true
    }

    /// Stop every worker
    pub async fn shutdown(&self) {
        for instrument in self.running_instruments() {
            self.stop_instrument(&instrument).await;
        }
    }
}

/// Single writer for one instrument's plans and resting orders
pub struct InstrumentWorker {
    instrument: String,
    config: DispatcherConfig,
    registry: Arc<VenueRegistry>,
    selector: VenueSelector,
    netting: Arc<NettingEngine>,
    book: Arc<Mutex<PlanBook>>,
    store: Arc<dyn OrderStore>,
    clock: Arc<dyn Clock>,
    forwarder: Arc<dyn NotificationForwarder>,
    inbox: mpsc::UnboundedReceiver<Notification>,
    tracker: StopOrderTracker,
    stranded: Arc<DashMap<String, Vec<TrackedOrder>>>,
}

impl InstrumentWorker {
    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn tracker(&self) -> &StopOrderTracker {
        &self.tracker
    }

    pub async fn run(mut self, shutdown: Shutdown) {
        info!(
            "[EXEC] {} worker ticking every {:?}",
            self.instrument, self.config.order_interval
        );
        let mut ticker = tokio::time::interval(self.config.order_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }

        self.cancel_resting_orders().await;
    }

    /// One full dispatch cycle
    pub async fn tick(&mut self) {
        self.drain_notifications().await;
        self.check_resting_orders().await;
        self.dispatch_plans().await;
        self.retire_plans().await;
    }

    async fn drain_notifications(&mut self) {
        let mut drained = 0usize;
        while let Ok(notification) = self.inbox.try_recv() {
            drained += 1;
            if let Some(update) = self.tracker.on_notification(&notification) {
                let mut book = self.book.lock().await;
                if let Some(entry) = book.get_mut(update.plan_id) {
                    let applied = entry.fill(update.filled_notional);
                    if update.closed {
                        entry.detach();
                    } else {
                        entry.set_working_remainder(update.remaining_notional);
                    }
                    if applied > Decimal::ZERO {
                        info!(
                            "[EXEC] {} plan {} filled {} on {} (left {})",
                            self.instrument,
                            update.plan_id.short(),
                            applied,
                            notification.venue(),
                            entry.plan.left_quantity()
                        );
                    }
                }
            }
            self.forwarder.forward(&notification);
        }
        if drained > 0 {
            debug!("[EXEC] {} drained {} notifications", self.instrument, drained);
        }
    }

    async fn check_resting_orders(&mut self) {
        if self.tracker.is_empty() {
            return;
        }
        let now = self.clock.now();

        let (live, expired_working) = {
            let book = self.book.lock().await;
            let live: HashSet<PlanOrderId> = book.entries().iter().map(|e| e.id()).collect();
            let expired: Vec<String> = book
                .expired(now)
                .into_iter()
                .filter_map(|id| book.get(id).and_then(|e| e.working().map(str::to_string)))
                .collect();
            (live, expired)
        };
        // An expired plan stops waiting on its resting order
        for client_order_id in expired_working {
            self.tracker.mark(&client_order_id, RemovalReason::Expired);
        }

        let mut touches = HashMap::new();
        for order in self.tracker.orders() {
            let Some(conn) = self.registry.venue(&order.venue) else {
                continue;
            };
            match conn.best_price(&order.symbol, order.side).await {
                Ok(touch) => {
                    touches.insert(order.client_order_id.clone(), touch);
                }
                Err(e) => debug!(
                    "[EXEC] no touch for {} on {}: {}",
                    order.client_order_id, order.venue, e
                ),
            }
        }
        self.tracker
            .evaluate(now, &touches, |plan| live.contains(&plan));

        for removal in self.tracker.take_removed() {
            self.process_removal(removal).await;
        }
    }

    /// Cancel, re-query, settle and possibly replace one removed order
    async fn process_removal(&mut self, removal: Removal) {
        let Removal { mut order, reason } = removal;
        let venue_order_id = order.venue_order_id.clone().unwrap_or_default();

        let Some(conn) = self.registry.venue(&order.venue) else {
            warn!(
                "[EXEC] venue {} gone, abandoning order {}",
                order.venue, order.client_order_id
            );
            self.detach(order.plan_id).await;
            return;
        };

        let cancelled = match conn.cancel_order(&order.symbol, &venue_order_id).await {
            Ok(state) => Some(state),
            Err(VenueError::NotFound(_)) => None,
            Err(e) => {
                warn!(
                    "[EXEC] cancel of {} on {} failed: {}",
                    order.client_order_id, order.venue, e
                );
                if reason == RemovalReason::Shutdown {
                    // The plan stays attached to the live order
                    warn!(
                        "[EXEC] {} left resting on {}, handed to the next {} worker",
                        order.client_order_id, order.venue, self.instrument
                    );
                    self.stranded
                        .entry(self.instrument.clone())
                        .or_default()
                        .push(order);
                } else {
                    self.tracker.restore(order);
                }
                return;
            }
        };
        let observed = match conn.get_order(&order.symbol, &venue_order_id).await {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(
                    "[EXEC] could not re-query {} after cancel: {}",
                    order.client_order_id, e
                );
                cancelled
            }
        };

        let replace = reason.replaces();
        let (delta, resolution) = self.tracker.resolve(&mut order, observed.as_ref(), replace);

        let replacement = {
            let mut book = self.book.lock().await;
            let Some(entry) = book.get_mut(order.plan_id) else {
                debug!("[EXEC] order {} settled for a closed plan", order.client_order_id);
                return;
            };
            entry.fill(delta * order.price);
            entry.detach();

            match resolution {
                Resolution::Filled => {
                    info!("[EXEC] {} was filled before the cancel", order.client_order_id);
                    None
                }
                Resolution::Drop { remainder_notional } => {
                    info!(
                        "[EXEC] {} cancelled ({:?}), remainder {} not replaced",
                        order.client_order_id, reason, remainder_notional
                    );
                    None
                }
                Resolution::Replace {
                    client_order_id,
                    remainder_notional,
                } => {
                    let notional = remainder_notional.min(entry.available());
                    entry.reserve(notional);
                    info!(
                        "[EXEC] {} cancelled ({:?}), replacing {} at market as {}",
                        order.client_order_id, reason, notional, client_order_id
                    );
                    Some((client_order_id, notional, entry.plan.reference_price))
                }
            }
        };

        if let Some((client_order_id, notional, reference_price)) = replacement {
            self.submit_replacement(&conn, &order, client_order_id, notional, reference_price)
                .await;
        }
    }

    async fn submit_replacement(
        &mut self,
        conn: &VenueConnection,
        original: &TrackedOrder,
        client_order_id: String,
        notional: Notional,
        reference_price: Price,
    ) {
        let order = self
            .registry
            .binding(&self.instrument, &original.venue)
            .and_then(|info| {
                ExOrder::build(
                    client_order_id,
                    original.plan_id,
                    &info,
                    original.side,
                    OrderType::Market,
                    notional,
                    original.price,
                    reference_price,
                )
            })
            .map(|order| order.replacing(original.client_order_id.clone()));

        let filled = match order {
            Some(mut order) => {
                order.submitted_at = self.clock.now();
                match self.execute_market(conn, &order).await {
                    Ok(filled) => filled,
                    Err(e) => {
                        warn!(
                            "[EXEC] replacement {} on {} failed: {}",
                            order.client_order_id, order.venue, e
                        );
                        Decimal::ZERO
                    }
                }
            }
            None => {
                warn!(
                    "[EXEC] could not build replacement for {}",
                    original.client_order_id
                );
                Decimal::ZERO
            }
        };

        let mut book = self.book.lock().await;
        if let Some(entry) = book.get_mut(original.plan_id) {
            entry.release(notional);
            let applied = entry.fill(filled);
            if applied > Decimal::ZERO {
                info!(
                    "[EXEC] {} plan {} filled {} by replacement (left {})",
                    self.instrument,
                    original.plan_id.short(),
                    applied,
                    entry.plan.left_quantity()
                );
            }
        }
    }

    /// Submit a market order and observe what it filled
    ///
    /// When the observation fails the order is assumed fully filled, as
    /// market orders do not rest.
    async fn execute_market(
        &self,
        conn: &VenueConnection,
        order: &ExOrder,
    ) -> std::result::Result<Notional, VenueError> {
        let venue_order_id = conn.make_order(order).await?;
        persist_ex_order(self.store.as_ref(), order, &venue_order_id).await;

        let filled = match conn.get_order(&order.symbol, &venue_order_id).await {
            Ok(observed) => observed.filled_notional(),
            Err(e) => {
                warn!(
                    "[EXEC] could not observe {} on {} ({}), assuming filled",
                    order.client_order_id, order.venue, e
                );
                order.notional_quantity
            }
        };
        Ok(filled)
    }

    async fn detach(&self, plan_id: PlanOrderId) {
        let mut book = self.book.lock().await;
        if let Some(entry) = book.get_mut(plan_id) {
            entry.detach();
        }
    }

    async fn dispatch_plans(&mut self) {
        let now = self.clock.now();
        let min_order_quantity = self.config.min_order_quantity;
        let (crosses, dust, work) = {
            let mut book = self.book.lock().await;
            let crosses = book.net(now);
            let expired: HashSet<PlanOrderId> = book.expired(now).into_iter().collect();
            let (dust, idle): (Vec<&BookEntry>, Vec<&BookEntry>) = book
                .entries()
                .iter()
                .filter(|e| e.available() > Decimal::ZERO && !e.has_working_order())
                .partition(|e| e.reserved().is_zero() && e.available() < min_order_quantity);
            let dust: Vec<PlanOrderId> = dust.into_iter().map(BookEntry::id).collect();
            let work: Vec<(PlanOrderId, bool)> = idle
                .into_iter()
                .map(|e| {
                    let market =
                        e.plan.style == ExecutionStyle::Market || expired.contains(&e.id());
                    (e.id(), market)
                })
                .collect();
            (crosses, dust, work)
        };

        for cross in &crosses {
            persist_cross(self.store.as_ref(), cross).await;
        }
        for plan_id in dust {
            self.abandon_dust(plan_id, "below the minimum order quantity").await;
        }
        for (plan_id, market) in work {
            if market {
                self.market_round(plan_id, now).await;
            } else {
                self.limit_round(plan_id, now).await;
            }
        }
    }

    /// Snapshot what a round needs: side, free quantity and reference price
    async fn plan_state(&self, plan_id: PlanOrderId) -> Option<(Side, Notional, Price)> {
        let book = self.book.lock().await;
        let entry = book.get(plan_id)?;
        let available = entry.available();
        (available > Decimal::ZERO).then(|| (entry.plan.side, available, entry.plan.reference_price))
    }

    /// Reserve `notional` and hand out the next client order id
    async fn reserve_slice(&self, plan_id: PlanOrderId, notional: Notional) -> Option<String> {
        let mut book = self.book.lock().await;
        let entry = book.get_mut(plan_id)?;
        entry.reserve(notional);
        Some(entry.next_client_order_id())
    }

    async fn release_slice(&self, plan_id: PlanOrderId, notional: Notional) {
        let mut book = self.book.lock().await;
        if let Some(entry) = book.get_mut(plan_id) {
            entry.release(notional);
        }
    }

    /// Close a plan whose residual is not worth an order
    async fn abandon_dust(&mut self, plan_id: PlanOrderId, why: &str) {
        let removed = {
            let mut book = self.book.lock().await;
            book.remove(plan_id)
        };
        if let Some(entry) = removed {
            self.tracker.forget_plan(plan_id);
            warn!(
                "[EXEC] plan {} residual {} is {}, closing",
                plan_id.short(),
                entry.plan.left_quantity(),
                why
            );
            persist_plan(self.store.as_ref(), &entry.plan).await;
        }
    }

    /// Greedy market execution: best venue takes its depth window, the rest
    /// is requoted without the venues already used or failed
    async fn market_round(&mut self, plan_id: PlanOrderId, now: DateTime<Utc>) {
        let mut excluded: HashSet<String> = HashSet::new();
        let mut failures = 0usize;
        let mut unsizable = 0usize;

        loop {
            let Some((side, available, reference_price)) = self.plan_state(plan_id).await else {
                return;
            };
            if available < self.config.min_order_quantity {
                self.abandon_dust(plan_id, "below the minimum order quantity").await;
                return;
            }
            let quotes = self
                .selector
                .requote(&self.instrument, side, FeeKind::Taker, &excluded)
                .await;
            let Some(best) = quotes.into_iter().next() else {
                if excluded.is_empty() {
                    warn!("[EXEC] no venue can take {} {}", side, self.instrument);
                } else if unsizable == excluded.len() {
                    self.abandon_dust(plan_id, "below every venue's size increment").await;
                } else if failures > 0 {
                    warn!(
                        "[EXEC] plan {} exhausted all venues this round, deferring",
                        plan_id.short()
                    );
                }
                return;
            };
            excluded.insert(best.info.venue.clone());

            let slice = available.min(best.info.depth_window);
            let Some(client_order_id) = self.reserve_slice(plan_id, slice).await else {
                return;
            };
            let Some(mut order) = ExOrder::build(
                client_order_id,
                plan_id,
                &best.info,
                side,
                OrderType::Market,
                slice,
                best.price,
                reference_price,
            ) else {
                self.release_slice(plan_id, slice).await;
                unsizable += 1;
                continue;
            };
            order.submitted_at = now;

            let result = self.execute_market(&best.venue, &order).await;
            let mut book = self.book.lock().await;
            let Some(entry) = book.get_mut(plan_id) else {
                return;
            };
            entry.release(slice);
            match result {
                Ok(filled) => {
                    let applied = entry.fill(filled);
                    info!(
                        "[EXEC] {} plan {} market {} {} on {} filled {} (left {})",
                        self.instrument,
                        plan_id.short(),
                        side,
                        order.size,
                        order.venue,
                        applied,
                        entry.plan.left_quantity()
                    );
                }
                Err(e) => {
                    failures += 1;
                    if e.is_retryable() {
                        warn!("[EXEC] market order on {} failed: {}", order.venue, e);
                    } else {
                        error!("[EXEC] market order on {} rejected: {}", order.venue, e);
                    }
                }
            }
        }
    }

    /// Rest one limit order at the best maker venue
    async fn limit_round(&mut self, plan_id: PlanOrderId, now: DateTime<Utc>) {
        let Some((side, available, reference_price)) = self.plan_state(plan_id).await else {
            return;
        };
        let quotes = self
            .selector
            .requote(&self.instrument, side, FeeKind::Maker, &HashSet::new())
            .await;
        if quotes.is_empty() {
            warn!("[EXEC] no venue can rest {} {}", side, self.instrument);
            return;
        }

        let venues = quotes.len();
        let mut unsizable = 0usize;
        for quote in quotes {
            let conn = &quote.venue;
            let symbol = &quote.info.symbol;
            let touch = match (
                conn.best_price(symbol, Side::Sell).await,
                conn.best_price(symbol, Side::Buy).await,
            ) {
                (Ok(bid), Ok(ask)) => (bid, ask),
                (Err(e), _) | (_, Err(e)) => {
                    warn!("[EXEC] no touch on {} for {}: {}", quote.info.venue, symbol, e);
                    continue;
                }
            };
            let price = limit_price(side, touch.0, touch.1, quote.info.tick_size());
            let slice = available.min(quote.info.depth_window);

            let Some(client_order_id) = self.reserve_slice(plan_id, slice).await else {
                return;
            };
            let Some(mut order) = ExOrder::build(
                client_order_id,
                plan_id,
                &quote.info,
                side,
                OrderType::Limit,
                slice,
                price,
                reference_price,
            ) else {
                self.release_slice(plan_id, slice).await;
                unsizable += 1;
                continue;
            };
            order.submitted_at = now;

            match conn.make_order(&order).await {
                Ok(venue_order_id) => {
                    persist_ex_order(self.store.as_ref(), &order, &venue_order_id).await;
                    self.tracker
                        .track(TrackedOrder::from_ex_order(&order, venue_order_id));
                    let mut book = self.book.lock().await;
                    if let Some(entry) = book.get_mut(plan_id) {
                        entry.attach(order.client_order_id.clone(), order.notional_quantity);
                    }
                    info!(
                        "[EXEC] {} plan {} resting {} {} @ {} on {}",
                        self.instrument,
                        plan_id.short(),
                        side,
                        order.size,
                        order.price,
                        order.venue
                    );
                    return;
                }
                Err(e) => {
                    self.release_slice(plan_id, slice).await;
                    warn!("[EXEC] limit order on {} failed: {}", order.venue, e);
                }
            }
        }
        if unsizable == venues {
            self.abandon_dust(plan_id, "below every venue's size increment").await;
            return;
        }
        warn!(
            "[EXEC] no venue accepted a limit order for plan {}, deferring",
            plan_id.short()
        );
    }

    async fn retire_plans(&mut self) {
        let done = {
            let mut book = self.book.lock().await;
            book.take_terminal()
        };
        if done.is_empty() {
            return;
        }
        for plan in done {
            info!(
                "[EXEC] plan {} complete: {} {} {}",
                plan.id.short(),
                plan.side,
                plan.executed_quantity(),
                plan.instrument
            );
            self.tracker.forget_plan(plan.id);
            persist_plan(self.store.as_ref(), &plan).await;
        }
    }

    /// Best-effort cancel of everything still resting, without replacement
    async fn cancel_resting_orders(&mut self) {
        let resting = self.tracker.orders();
        if resting.is_empty() {
            return;
        }
        info!(
            "[EXEC] {} cancelling {} resting orders",
            self.instrument,
            resting.len()
        );
        for order in resting {
            self.tracker
                .mark(&order.client_order_id, RemovalReason::Shutdown);
        }
        for removal in self.tracker.take_removed() {
            self.process_removal(removal).await;
        }
    }
}

//! Plan Netting
//!
//! Opposite-sided plan orders on the same instrument are crossed against
//! each other internally before anything is sent to a venue:
//! - Strategy A: buy 1200
//! - Strategy B: sell 800
//! - Internal cross: 800 at zero cost, only buy 400 goes to venues
//!
//! Quantity committed to a working venue order (`reserved`) is never
//! crossed, so a plan can not be both netted and filled for the same
//! notional.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hedge_core::{InternalCross, Notional, PlanOrder, PlanOrderId};
use log::{debug, info};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// One active plan plus its execution bookkeeping
#[derive(Debug, Clone)]
pub struct BookEntry {
    pub plan: PlanOrder,
    /// Notional committed to an in-flight or resting venue order
    reserved: Notional,
    /// Client id of the resting limit order working this plan
    working: Option<String>,
    /// Slices issued so far, used for client order ids
    slices: u32,
}

impl BookEntry {
    fn new(plan: PlanOrder) -> Self {
        Self {
            plan,
            reserved: Decimal::ZERO,
            working: None,
            slices: 0,
        }
    }

    pub fn id(&self) -> PlanOrderId {
        self.plan.id
    }

    /// Quantity free for netting or a new slice
    pub fn available(&self) -> Notional {
        (self.plan.left_quantity() - self.reserved).max(Decimal::ZERO)
    }

    pub fn reserved(&self) -> Notional {
        self.reserved
    }

    pub fn working(&self) -> Option<&str> {
        self.working.as_deref()
    }

    pub fn has_working_order(&self) -> bool {
        self.working.is_some()
    }

    /// Commit `notional` to an order about to be sent
    pub fn reserve(&mut self, notional: Notional) {
        self.reserved = (self.reserved + notional.max(Decimal::ZERO)).min(self.plan.left_quantity());
    }

    /// Return `notional` of a reservation
    pub fn release(&mut self, notional: Notional) {
        self.reserved = (self.reserved - notional).max(Decimal::ZERO);
    }

    /// Mark a resting order as working this plan with `notional` reserved
    pub fn attach(&mut self, client_order_id: String, notional: Notional) {
        self.working = Some(client_order_id);
        self.reserved = notional.max(Decimal::ZERO).min(self.plan.left_quantity());
    }

    /// Reset the reservation of the working order to what is still resting
    pub fn set_working_remainder(&mut self, notional: Notional) {
        self.reserved = notional.max(Decimal::ZERO).min(self.plan.left_quantity());
    }

    /// The working order left the venue
    pub fn detach(&mut self) {
        self.working = None;
        self.reserved = Decimal::ZERO;
    }

    /// Apply executed notional, keeping the reservation within `left`
    pub fn fill(&mut self, notional: Notional) -> Notional {
        let applied = self.plan.fill(notional);
        self.reserved = self.reserved.min(self.plan.left_quantity());
        applied
    }

    /// Next client order id for a slice of this plan
    pub fn next_client_order_id(&mut self) -> String {
        self.slices += 1;
        format!("{}-{}", self.plan.id.short(), self.slices)
    }
}

/// Closed plans an instrument keeps for lookups by id
pub const DEFAULT_CLOSED_CAPACITY: usize = 4096;

/// FIFO book of active plans for one instrument
///
/// Plans leaving the book are kept in `closed` with their final state, so a
/// lookup by id sees either the live plan or how it ended. Only the most
/// recent `closed_capacity` closed plans are kept.
#[derive(Debug)]
pub struct PlanBook {
    instrument: String,
    entries: Vec<BookEntry>,
    closed: HashMap<PlanOrderId, PlanOrder>,
    /// Archive order, oldest first
    closed_order: VecDeque<PlanOrderId>,
    closed_capacity: usize,
    /// Archived plans dropped since the last `take_evicted`
    evicted: Vec<PlanOrderId>,
}

impl PlanBook {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self::with_closed_capacity(instrument, DEFAULT_CLOSED_CAPACITY)
    }

    pub fn with_closed_capacity(instrument: impl Into<String>, capacity: usize) -> Self {
        Self {
            instrument: instrument.into(),
            entries: Vec::new(),
            closed: HashMap::new(),
            closed_order: VecDeque::new(),
            closed_capacity: capacity.max(1),
            evicted: Vec::new(),
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[BookEntry] {
        &self.entries
    }

    pub fn get(&self, id: PlanOrderId) -> Option<&BookEntry> {
        self.entries.iter().find(|e| e.id() == id)
    }

    pub fn get_mut(&mut self, id: PlanOrderId) -> Option<&mut BookEntry> {
        self.entries.iter_mut().find(|e| e.id() == id)
    }

    pub fn plans(&self) -> Vec<PlanOrder> {
        self.entries.iter().map(|e| e.plan.clone()).collect()
    }

    /// Final state of a plan that left the book
    pub fn closed(&self, id: PlanOrderId) -> Option<&PlanOrder> {
        self.closed.get(&id)
    }

    pub fn closed_len(&self) -> usize {
        self.closed.len()
    }

    /// Ids dropped from the closed archive since the last call
    pub fn take_evicted(&mut self) -> Vec<PlanOrderId> {
        std::mem::take(&mut self.evicted)
    }

    fn archive(&mut self, plan: PlanOrder) {
        let id = plan.id;
        if self.closed.insert(id, plan).is_none() {
            self.closed_order.push_back(id);
        }
        while self.closed_order.len() > self.closed_capacity {
            let Some(oldest) = self.closed_order.pop_front() else {
                break;
            };
            self.closed.remove(&oldest);
            self.evicted.push(oldest);
        }
    }

    /// Cross `plan` against resting opposite plans, oldest first, then add
    /// any residual to the back of the book
    pub fn insert(&mut self, mut plan: PlanOrder, now: DateTime<Utc>) -> Vec<InternalCross> {
        let mut crosses = Vec::new();
        for resting in self.entries.iter_mut() {
            if plan.is_terminal() {
                break;
            }
            if resting.plan.side == plan.side {
                continue;
            }
            let crossed = plan.left_quantity().min(resting.available());
            if crossed <= Decimal::ZERO {
                continue;
            }
            plan.fill(crossed);
            resting.fill(crossed);
            crosses.push(cross(&self.instrument, &resting.plan, &plan, crossed, now));
        }

        if !plan.is_terminal() {
            self.entries.push(BookEntry::new(plan));
        } else {
            debug!("[NET] plan {} fully netted on arrival", plan.id);
            self.archive(plan);
        }
        crosses
    }

    /// Cross every pair of opposite plans with free quantity
    ///
    /// Running it again without new plans or released reservations finds
    /// nothing to cross.
    pub fn net(&mut self, now: DateTime<Utc>) -> Vec<InternalCross> {
        let mut crosses = Vec::new();
        for i in 0..self.entries.len() {
            for j in (i + 1)..self.entries.len() {
                if self.entries[i].plan.side == self.entries[j].plan.side {
                    continue;
                }
                let crossed = self.entries[i]
                    .available()
                    .min(self.entries[j].available());
                if crossed <= Decimal::ZERO {
                    continue;
                }
                let (head, tail) = self.entries.split_at_mut(j);
                let (older, newer) = (&mut head[i], &mut tail[0]);
                older.fill(crossed);
                newer.fill(crossed);
                crosses.push(cross(&self.instrument, &older.plan, &newer.plan, crossed, now));
            }
        }
        crosses
    }

    /// Plans past their expiry, in book order
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<PlanOrderId> {
        self.entries
            .iter()
            .filter(|e| e.plan.is_expired_at(now))
            .map(|e| e.id())
            .collect()
    }

    pub fn remove(&mut self, id: PlanOrderId) -> Option<BookEntry> {
        let idx = self.entries.iter().position(|e| e.id() == id)?;
        let entry = self.entries.remove(idx);
        self.archive(entry.plan.clone());
        Some(entry)
    }

    /// Remove and return plans with nothing left to execute
    pub fn take_terminal(&mut self) -> Vec<PlanOrder> {
        let (done, active): (Vec<BookEntry>, Vec<BookEntry>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| e.plan.is_terminal());
        self.entries = active;
        let done: Vec<PlanOrder> = done.into_iter().map(|e| e.plan).collect();
        for plan in &done {
            self.archive(plan.clone());
        }
        done
    }
}

/// Crossing record priced at the resting (older) plan's reference price
fn cross(
    instrument: &str,
    resting: &PlanOrder,
    incoming: &PlanOrder,
    quantity: Notional,
    at: DateTime<Utc>,
) -> InternalCross {
    let (buy_plan, sell_plan) = match resting.side {
        hedge_core::Side::Buy => (resting.id, incoming.id),
        hedge_core::Side::Sell => (incoming.id, resting.id),
    };
    info!(
        "[NET] {} crossed {} internally (buy {} / sell {})",
        instrument,
        quantity,
        buy_plan.short(),
        sell_plan.short()
    );
    InternalCross {
        instrument: instrument.to_string(),
        buy_plan,
        sell_plan,
        quantity,
        price: resting.reference_price,
        at,
    }
}

/// Where a plan stands, as seen by its book
#[derive(Debug, Clone)]
pub enum PlanState {
    Live(PlanOrder),
    /// Completed, cancelled or abandoned
    Closed(PlanOrder),
}

impl PlanState {
    pub fn plan(&self) -> &PlanOrder {
        match self {
            Self::Live(plan) | Self::Closed(plan) => plan,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }
}

/// Result of submitting a plan
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub plan_id: PlanOrderId,
    pub crosses: Vec<InternalCross>,
    /// Plans (including the submitted one) that netting completed
    pub completed: Vec<PlanOrder>,
}

/// Plan books for all instruments
///
/// Each instrument has its own lock; instruments never contend.
#[derive(Debug)]
pub struct NettingEngine {
    books: DashMap<String, Arc<Mutex<PlanBook>>>,
    /// plan id -> instrument, for lookups by id (live and archived)
    index: DashMap<PlanOrderId, String>,
    closed_capacity: usize,
}

impl Default for NettingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl NettingEngine {
    pub fn new() -> Self {
        Self::with_closed_capacity(DEFAULT_CLOSED_CAPACITY)
    }

    /// Keep at most `capacity` closed plans per instrument
    pub fn with_closed_capacity(capacity: usize) -> Self {
        Self {
            books: DashMap::new(),
            index: DashMap::new(),
            closed_capacity: capacity,
        }
    }

    /// Book for `instrument`, created on first use
    pub fn book(&self, instrument: &str) -> Arc<Mutex<PlanBook>> {
        self.books
            .entry(instrument.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(PlanBook::with_closed_capacity(
                    instrument,
                    self.closed_capacity,
                )))
            })
            .clone()
    }

    /// Plans that can still be looked up by id
    pub fn indexed_plans(&self) -> usize {
        self.index.len()
    }

    fn prune_index(&self, book: &mut PlanBook) {
        for id in book.take_evicted() {
            self.index.remove(&id);
        }
    }

    pub fn instruments(&self) -> Vec<String> {
        let mut names: Vec<String> = self.books.iter().map(|b| b.key().clone()).collect();
        names.sort();
        names
    }

    pub async fn submit(&self, plan: PlanOrder) -> SubmitOutcome {
        self.submit_at(plan, Utc::now()).await
    }

    pub async fn submit_at(&self, plan: PlanOrder, now: DateTime<Utc>) -> SubmitOutcome {
        let plan_id = plan.id;
        let instrument = plan.instrument.clone();
        let book = self.book(&instrument);
        let mut book = book.lock().await;

        info!(
            "[NET] new plan {} {} {} {}",
            plan_id.short(),
            plan.side,
            plan.total_quantity,
            instrument
        );
        let crosses = book.insert(plan, now);
        let netted_on_arrival = match book.get(plan_id) {
            Some(_) => None,
            None => book.closed(plan_id).cloned(),
        };
        let mut completed = book.take_terminal();
        completed.extend(netted_on_arrival);
        self.index.insert(plan_id, instrument);
        self.prune_index(&mut book);

        SubmitOutcome {
            plan_id,
            crosses,
            completed,
        }
    }

    /// Re-run the crossing pass for `instrument`
    pub async fn net(&self, instrument: &str) -> Vec<InternalCross> {
        let Some(book) = self.books.get(instrument).map(|b| b.clone()) else {
            return Vec::new();
        };
        let mut book = book.lock().await;
        book.net(Utc::now())
    }

    /// Snapshot of an active plan
    pub async fn plan(&self, id: PlanOrderId) -> Option<PlanOrder> {
        self.plan_state(id)
            .await
            .filter(PlanState::is_live)
            .map(|state| state.plan().clone())
    }

    /// Live snapshot or final state of any plan submitted here
    pub async fn plan_state(&self, id: PlanOrderId) -> Option<PlanState> {
        let instrument = self.index.get(&id)?.clone();
        let book = self.books.get(&instrument)?.clone();
        let book = book.lock().await;
        match book.get(id) {
            Some(entry) => Some(PlanState::Live(entry.plan.clone())),
            None => book.closed(id).cloned().map(PlanState::Closed),
        }
    }

    /// Active plans of `instrument` in FIFO order
    pub async fn active_plans(&self, instrument: &str) -> Vec<PlanOrder> {
        let Some(book) = self.books.get(instrument).map(|b| b.clone()) else {
            return Vec::new();
        };
        let book = book.lock().await;
        book.plans()
    }

    /// Remove an active plan, returning its final state
    pub async fn cancel_plan(&self, id: PlanOrderId) -> Result<BookEntry> {
        let instrument = self
            .index
            .get(&id)
            .map(|i| i.clone())
            .ok_or(Error::UnknownPlan(id))?;
        let book = self.book(&instrument);
        let mut book = book.lock().await;
        let entry = book.remove(id).ok_or(Error::UnknownPlan(id))?;
        self.prune_index(&mut book);
        info!(
            "[NET] cancelled plan {} with {} left",
            id.short(),
            entry.plan.left_quantity()
        );
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hedge_core::Side;
    use rust_decimal_macros::dec;

    fn plan(side: Side, qty: Decimal) -> PlanOrder {
        PlanOrder::new("BTC-USDT", side, qty, dec!(30000)).unwrap()
    }

    #[tokio::test]
    async fn test_netting_1200_vs_800() {
        let engine = NettingEngine::new();
        let buy = plan(Side::Buy, dec!(1200));
        let sell = plan(Side::Sell, dec!(800));
        let (buy_id, sell_id) = (buy.id, sell.id);

        let first = engine.submit(buy).await;
        assert!(first.crosses.is_empty());

        let second = engine.submit(sell).await;
        assert_eq!(second.crosses.len(), 1);
        let cross = &second.crosses[0];
        assert_eq!(cross.quantity, dec!(800));
        assert_eq!(cross.buy_plan, buy_id);
        assert_eq!(cross.sell_plan, sell_id);
        assert_eq!(cross.price, dec!(30000));

        assert_eq!(second.completed.len(), 1);
        assert_eq!(second.completed[0].id, sell_id);
        assert_eq!(second.completed[0].left_quantity(), dec!(0));

        let active = engine.active_plans("BTC-USDT").await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, buy_id);
        assert_eq!(active[0].left_quantity(), dec!(400));
        assert!(engine.plan(sell_id).await.is_none());
    }

    #[tokio::test]
    async fn test_net_is_idempotent() {
        let engine = NettingEngine::new();
        engine.submit(plan(Side::Buy, dec!(500))).await;
        engine.submit(plan(Side::Sell, dec!(200))).await;
        let before = engine.active_plans("BTC-USDT").await;

        assert!(engine.net("BTC-USDT").await.is_empty());
        assert!(engine.net("BTC-USDT").await.is_empty());
        let after = engine.active_plans("BTC-USDT").await;
        assert_eq!(
            before.iter().map(|p| p.left_quantity()).collect::<Vec<_>>(),
            after.iter().map(|p| p.left_quantity()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_reserved_quantity_is_not_netted() {
        let now = Utc::now();
        let mut book = PlanBook::new("BTC-USDT");
        let buy = plan(Side::Buy, dec!(1000));
        let buy_id = buy.id;
        book.insert(buy, now);
        book.get_mut(buy_id)
            .unwrap()
            .attach("x-1".to_string(), dec!(700));

        let crosses = book.insert(plan(Side::Sell, dec!(500)), now);
        assert_eq!(crosses[0].quantity, dec!(300));
        assert_eq!(book.get(buy_id).unwrap().plan.left_quantity(), dec!(700));
        assert_eq!(book.get(buy_id).unwrap().available(), dec!(0));

        // Releasing the working order frees quantity for the next pass
        book.get_mut(buy_id).unwrap().detach();
        let crosses = book.net(now);
        assert_eq!(crosses.len(), 1);
        assert_eq!(crosses[0].quantity, dec!(200));
        assert!(book.net(now).is_empty());
    }

    #[test]
    fn test_fifo_crossing_order() {
        let now = Utc::now();
        let mut book = PlanBook::new("BTC-USDT");
        let first = plan(Side::Sell, dec!(100));
        let second = plan(Side::Sell, dec!(100));
        let (first_id, second_id) = (first.id, second.id);
        book.insert(first, now);
        book.insert(second, now);

        let crosses = book.insert(plan(Side::Buy, dec!(150)), now);
        assert_eq!(crosses.len(), 2);
        assert_eq!(crosses[0].sell_plan, first_id);
        assert_eq!(crosses[0].quantity, dec!(100));
        assert_eq!(crosses[1].sell_plan, second_id);
        assert_eq!(crosses[1].quantity, dec!(50));

        let done = book.take_terminal();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, first_id);
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_left_never_increases() {
        let mut entry = BookEntry::new(plan(Side::Buy, dec!(100)));
        let mut last = entry.plan.left_quantity();
        for q in [dec!(30), dec!(-10), dec!(0), dec!(50), dec!(40)] {
            entry.fill(q);
            assert!(entry.plan.left_quantity() <= last);
            assert!(entry.plan.left_quantity() >= dec!(0));
            last = entry.plan.left_quantity();
        }
        assert!(entry.plan.is_terminal());
    }

    #[test]
    fn test_reservation_bounds() {
        let mut entry = BookEntry::new(plan(Side::Sell, dec!(100)));
        entry.reserve(dec!(60));
        assert_eq!(entry.available(), dec!(40));
        entry.reserve(dec!(60));
        assert_eq!(entry.reserved(), dec!(100));
        entry.release(dec!(30));
        assert_eq!(entry.available(), dec!(30));
        entry.fill(dec!(50));
        assert_eq!(entry.reserved(), dec!(50));
        assert_eq!(entry.available(), dec!(0));
    }

    #[test]
    fn test_expired_plans() {
        let now = Utc::now();
        let mut book = PlanBook::new("BTC-USDT");
        let stale = plan(Side::Buy, dec!(10)).with_expiry(now - chrono::Duration::seconds(1));
        let stale_id = stale.id;
        book.insert(stale, now);
        book.insert(plan(Side::Buy, dec!(10)), now);
        assert_eq!(book.expired(now), vec![stale_id]);
    }

    #[tokio::test]
    async fn test_cancel_plan() {
        let engine = NettingEngine::new();
        let p = plan(Side::Buy, dec!(100));
        let id = p.id;
        engine.submit(p).await;

        let entry = engine.cancel_plan(id).await.unwrap();
        assert_eq!(entry.plan.left_quantity(), dec!(100));
        assert!(matches!(
            engine.cancel_plan(id).await,
            Err(Error::UnknownPlan(_))
        ));
        assert!(engine.active_plans("BTC-USDT").await.is_empty());

        let state = engine.plan_state(id).await.unwrap();
        assert!(!state.is_live());
        assert_eq!(state.plan().left_quantity(), dec!(100));
    }

    #[test]
    fn test_closed_archive_is_bounded() {
        let now = Utc::now();
        let mut book = PlanBook::with_closed_capacity("BTC-USDT", 2);
        let ids: Vec<PlanOrderId> = (0..3)
            .map(|_| {
                let p = plan(Side::Buy, dec!(10));
                let id = p.id;
                book.insert(p, now);
                book.remove(id);
                id
            })
            .collect();

        assert_eq!(book.closed_len(), 2);
        assert!(book.closed(ids[0]).is_none());
        assert!(book.closed(ids[2]).is_some());
        assert_eq!(book.take_evicted(), vec![ids[0]]);
        assert!(book.take_evicted().is_empty());
    }

    #[tokio::test]
    async fn test_evicted_plans_leave_the_index() {
        let engine = NettingEngine::with_closed_capacity(1);
        let first = plan(Side::Buy, dec!(100));
        let first_id = first.id;
        engine.submit(first).await;
        engine.cancel_plan(first_id).await.unwrap();
        assert!(engine.plan_state(first_id).await.is_some());

        let second = plan(Side::Buy, dec!(100));
        let second_id = second.id;
        engine.submit(second).await;
        engine.cancel_plan(second_id).await.unwrap();

        assert!(engine.plan_state(first_id).await.is_none());
        assert!(!engine.plan_state(second_id).await.unwrap().is_live());
        assert_eq!(engine.indexed_plans(), 1);
    }

    #[tokio::test]
    async fn test_netted_arrival_reported_with_small_archive() {
        let engine = NettingEngine::with_closed_capacity(1);
        let buy = plan(Side::Buy, dec!(100));
        let buy_id = buy.id;
        engine.submit(buy).await;
        let sell = plan(Side::Sell, dec!(100));
        let sell_id = sell.id;

        let outcome = engine.submit(sell).await;
        let completed: Vec<PlanOrderId> = outcome.completed.iter().map(|p| p.id).collect();
        assert_eq!(completed.len(), 2);
        assert!(completed.contains(&buy_id));
        assert!(completed.contains(&sell_id));
    }

    #[test]
    fn test_client_order_ids() {
        let mut entry = BookEntry::new(plan(Side::Buy, dec!(100)));
        let short = entry.plan.id.short();
        assert_eq!(entry.next_client_order_id(), format!("{}-1", short));
        assert_eq!(entry.next_client_order_id(), format!("{}-2", short));
    }
}

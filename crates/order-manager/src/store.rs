//! In-memory order store
//!
//! Keeps the latest state of every plan, every venue order and every
//! internal cross. Used by the engine when no external store is wired in.

use async_trait::async_trait;
use dashmap::DashMap;
use hedge_core::{ExOrder, InternalCross, PlanOrder, PlanOrderId};
use hedge_ports::{OrderStore, StoreError, StoreResult};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone)]
pub struct StoredExOrder {
    pub order: ExOrder,
    pub venue_order_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    plans: DashMap<PlanOrderId, PlanOrder>,
    ex_orders: DashMap<String, StoredExOrder>,
    crosses: Mutex<Vec<InternalCross>>,
    failing: AtomicBool,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail, for exercising error paths
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn plan(&self, id: PlanOrderId) -> Option<PlanOrder> {
        self.plans.get(&id).map(|p| p.clone())
    }

    pub fn plan_count(&self) -> usize {
        self.plans.len()
    }

    /// Plans attributed to `strategy`, oldest first
    pub fn plans_for_strategy(&self, strategy: &str) -> Vec<PlanOrder> {
        let mut plans: Vec<PlanOrder> = self
            .plans
            .iter()
            .filter(|p| p.strategy.as_deref() == Some(strategy))
            .map(|p| p.clone())
            .collect();
        plans.sort_by_key(|p| p.created_at);
        plans
    }

    pub fn ex_order(&self, client_order_id: &str) -> Option<StoredExOrder> {
        self.ex_orders.get(client_order_id).map(|o| o.clone())
    }

    /// Venue orders submitted for `plan`, ordered by submission time
    pub fn ex_orders_for(&self, plan: PlanOrderId) -> Vec<StoredExOrder> {
        let mut orders: Vec<StoredExOrder> = self
            .ex_orders
            .iter()
            .filter(|o| o.order.plan_id == plan)
            .map(|o| o.clone())
            .collect();
        orders.sort_by(|a, b| {
            a.order
                .submitted_at
                .cmp(&b.order.submitted_at)
                .then_with(|| a.order.client_order_id.cmp(&b.order.client_order_id))
        });
        orders
    }

    pub fn crosses(&self) -> Vec<InternalCross> {
        self.crosses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("store marked failing".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn save_plan_order(&self, plan: &PlanOrder) -> StoreResult<()> {
        self.check()?;
        self.plans.insert(plan.id, plan.clone());
        Ok(())
    }

    async fn save_ex_order(
        &self,
        order: &ExOrder,
        venue_order_id: Option<&str>,
    ) -> StoreResult<()> {
        self.check()?;
        self.ex_orders.insert(
            order.client_order_id.clone(),
            StoredExOrder {
                order: order.clone(),
                venue_order_id: venue_order_id.map(str::to_string),
            },
        );
        Ok(())
    }

    async fn save_cross(&self, cross: &InternalCross) -> StoreResult<()> {
        self.check()?;
        self.crosses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(cross.clone());
        Ok(())
    }
}

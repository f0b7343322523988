//! What a strategy can see and do

use crate::error::Result;
use async_trait::async_trait;
use hedge_core::{PlanOrder, PlanOrderId, Timestamp};
use hedge_ports::Clock;
use std::sync::Arc;

/// Latest known state of a plan order
#[derive(Debug, Clone)]
pub struct PlanSnapshot {
    pub plan: PlanOrder,
    /// Still being netted or worked at venues
    pub live: bool,
}

/// Where strategies send plan orders
#[async_trait]
pub trait PlanOrderSink: Send + Sync {
    async fn make_order(&self, plan: PlanOrder) -> Result<PlanOrderId>;

    /// Live state, or the final state of a retired plan
    async fn plan(&self, id: PlanOrderId) -> Option<PlanSnapshot>;

    async fn cancel_plan(&self, id: PlanOrderId) -> Result<PlanOrder>;
}

/// Handle passed to every strategy callback
#[derive(Clone)]
pub struct StrategyContext {
    sink: Arc<dyn PlanOrderSink>,
    clock: Arc<dyn Clock>,
}

impl StrategyContext {
    pub fn new(sink: Arc<dyn PlanOrderSink>, clock: Arc<dyn Clock>) -> Self {
        Self { sink, clock }
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub async fn make_order(&self, plan: PlanOrder) -> Result<PlanOrderId> {
        self.sink.make_order(plan).await
    }

    pub async fn plan(&self, id: PlanOrderId) -> Option<PlanSnapshot> {
        self.sink.plan(id).await
    }

    pub async fn cancel_plan(&self, id: PlanOrderId) -> Result<PlanOrder> {
        self.sink.cancel_plan(id).await
    }
}

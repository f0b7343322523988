use async_trait::async_trait;
use hedge_core::{ExOrder, InternalCross, PlanOrder};

use crate::error::StoreResult;

/// Audit persistence for orders and crosses
///
/// Writes are at-least-once; callers log failures and carry on.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn save_plan_order(&self, plan: &PlanOrder) -> StoreResult<()>;

    async fn save_ex_order(
        &self,
        order: &ExOrder,
        venue_order_id: Option<&str>,
    ) -> StoreResult<()>;

    async fn save_cross(&self, cross: &InternalCross) -> StoreResult<()>;
}

/// Store that discards everything
pub struct NullStore;

#[async_trait]
impl OrderStore for NullStore {
    async fn save_plan_order(&self, _plan: &PlanOrder) -> StoreResult<()> {
        Ok(())
    }

    async fn save_ex_order(
        &self,
        _order: &ExOrder,
        _venue_order_id: Option<&str>,
    ) -> StoreResult<()> {
        Ok(())
    }

    async fn save_cross(&self, _cross: &InternalCross) -> StoreResult<()> {
        Ok(())
    }
}

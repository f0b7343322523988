//! Target exposure strategy against an in-memory plan sink

use async_trait::async_trait;
use hedge_clock::ManualClock;
use hedge_core::{ExecutionStyle, PlanOrder, PlanOrderId, Side};
use hedge_strategy::{
    PlanOrderSink, PlanSnapshot, Strategy, StrategyContext, StrategyError,
    TargetExposureConfig, TargetExposureStrategy,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingSink {
    plans: Mutex<HashMap<PlanOrderId, PlanSnapshot>>,
    order: Mutex<Vec<PlanOrderId>>,
    reject: Mutex<bool>,
}

impl RecordingSink {
    fn sent(&self) -> Vec<PlanOrder> {
        let plans = self.plans.lock().unwrap();
        self.order
            .lock()
            .unwrap()
            .iter()
            .map(|id| plans[id].plan.clone())
            .collect()
    }

    /// Execute `quantity` of a plan, retiring it when nothing is left
    fn execute(&self, id: PlanOrderId, quantity: Decimal) {
        let mut plans = self.plans.lock().unwrap();
        let snapshot = plans.get_mut(&id).unwrap();
        snapshot.plan.fill(quantity);
        snapshot.live = !snapshot.plan.is_terminal();
    }
}

#[async_trait]
impl PlanOrderSink for RecordingSink {
    async fn make_order(&self, plan: PlanOrder) -> hedge_strategy::Result<PlanOrderId> {
        if *self.reject.lock().unwrap() {
            return Err(StrategyError::Order("no venue bound".to_string()));
        }
        let id = plan.id;
        self.order.lock().unwrap().push(id);
        self.plans
            .lock()
            .unwrap()
            .insert(id, PlanSnapshot { plan, live: true });
        Ok(id)
    }

    async fn plan(&self, id: PlanOrderId) -> Option<PlanSnapshot> {
        self.plans.lock().unwrap().get(&id).cloned()
    }

    async fn cancel_plan(&self, id: PlanOrderId) -> hedge_strategy::Result<PlanOrder> {
        let mut plans = self.plans.lock().unwrap();
        let snapshot = plans
            .get_mut(&id)
            .ok_or_else(|| StrategyError::Order(format!("unknown plan {}", id)))?;
        snapshot.live = false;
        Ok(snapshot.plan.clone())
    }
}

fn setup(config: TargetExposureConfig) -> (Arc<RecordingSink>, StrategyContext, TargetExposureStrategy) {
    let _ = env_logger::try_init();
    let sink = Arc::new(RecordingSink::default());
    let ctx = StrategyContext::new(sink.clone(), Arc::new(ManualClock::starting_now()));
    let strategy = TargetExposureStrategy::new("hedger", config).unwrap();
    (sink, ctx, strategy)
}

#[tokio::test]
async fn test_steps_towards_target() {
    let mut config = TargetExposureConfig::new("BTC-USDT", dec!(-2500), dec!(30000));
    config.max_step = Some(dec!(1000));
    config.style = ExecutionStyle::Limit;
    let (sink, ctx, strategy) = setup(config);

    strategy.run(&ctx).await.unwrap();
    let first = sink.sent()[0].clone();
    assert_eq!(first.side, Side::Sell);
    assert_eq!(first.total_quantity, dec!(1000));
    assert_eq!(first.style, ExecutionStyle::Limit);
    assert_eq!(first.strategy.as_deref(), Some("hedger"));

    // Partially executed and still live: credit it, send nothing new
    sink.execute(first.id, dec!(400));
    strategy.run(&ctx).await.unwrap();
    assert_eq!(sink.sent().len(), 1);
    assert_eq!(strategy.exposure().await, dec!(-400));

    sink.execute(first.id, dec!(600));
    strategy.run(&ctx).await.unwrap();
    assert_eq!(strategy.exposure().await, dec!(-1000));
    assert_eq!(sink.sent().len(), 2);

    let second = sink.sent()[1].clone();
    sink.execute(second.id, dec!(1000));
    strategy.run(&ctx).await.unwrap();
    let third = sink.sent()[2].clone();
    assert_eq!(third.total_quantity, dec!(500));

    sink.execute(third.id, dec!(500));
    strategy.run(&ctx).await.unwrap();
    strategy.run(&ctx).await.unwrap();
    assert_eq!(strategy.exposure().await, dec!(-2500));
    assert_eq!(sink.sent().len(), 3, "on target, nothing more to send");
    assert!(strategy.working_plan().await.is_none());
}

#[tokio::test]
async fn test_long_target_buys_the_capped_gap() {
    let mut config = TargetExposureConfig::new("BTC-USDT", dec!(1500), dec!(30000));
    config.max_step = Some(dec!(1000));
    let (sink, ctx, strategy) = setup(config);

    strategy.run(&ctx).await.unwrap();
    let first = sink.sent()[0].clone();
    assert_eq!(first.side, Side::Buy);
    assert_eq!(first.total_quantity, dec!(1000));

    sink.execute(first.id, dec!(1000));
    strategy.run(&ctx).await.unwrap();
    let second = sink.sent()[1].clone();
    assert_eq!(second.side, Side::Buy);
    assert_eq!(second.total_quantity, dec!(500));
}

#[tokio::test]
async fn test_small_gap_is_ignored() {
    let mut config = TargetExposureConfig::new("BTC-USDT", dec!(5), dec!(30000));
    config.min_trade = dec!(10);
    let (sink, ctx, strategy) = setup(config);

    strategy.run(&ctx).await.unwrap();
    assert!(sink.sent().is_empty());
}

#[tokio::test]
async fn test_stop_withdraws_live_plan() {
    let (sink, ctx, strategy) = setup(TargetExposureConfig::new("BTC-USDT", dec!(800), dec!(100)));

    strategy.run(&ctx).await.unwrap();
    let plan = sink.sent()[0].clone();
    sink.execute(plan.id, dec!(300));

    strategy.stop(&ctx).await.unwrap();
    assert!(!sink.plan(plan.id).await.unwrap().live);
    assert_eq!(strategy.exposure().await, dec!(300));
    assert!(strategy.working_plan().await.is_none());
}

#[tokio::test]
async fn test_rejected_order_surfaces_as_error() {
    let (sink, ctx, strategy) = setup(TargetExposureConfig::new("BTC-USDT", dec!(800), dec!(100)));
    *sink.reject.lock().unwrap() = true;

    let err = strategy.run(&ctx).await.unwrap_err();
    assert!(matches!(err, StrategyError::Order(_)));
    assert!(strategy.working_plan().await.is_none());

    *sink.reject.lock().unwrap() = false;
    strategy.run(&ctx).await.unwrap();
    assert_eq!(sink.sent().len(), 1);
}

#[tokio::test]
async fn test_plan_expiry_from_ttl() {
    let mut config = TargetExposureConfig::new("BTC-USDT", dec!(800), dec!(100));
    config.plan_ttl_ms = Some(5_000);
    let (sink, ctx, strategy) = setup(config);

    strategy.run(&ctx).await.unwrap();
    let plan = sink.sent()[0].clone();
    assert_eq!(
        plan.expires_at.unwrap() - plan.created_at,
        chrono::Duration::seconds(5)
    );
}

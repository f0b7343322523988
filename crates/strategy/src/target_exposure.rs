//! Target Exposure Strategy
//!
//! Drives the executed exposure on one instrument towards a signed notional
//! target, one plan order at a time. Each run:
//! 1. credits whatever the working plan executed since the last run
//! 2. waits while that plan is still live
//! 3. otherwise sends a new plan for the gap, capped at `max_step`

use crate::context::StrategyContext;
use crate::error::{Result, StrategyError};
use crate::strategy::Strategy;
use async_trait::async_trait;
use hedge_core::{ExecutionStyle, Notification, Notional, PlanOrder, PlanOrderId, Price};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetExposureConfig {
    pub instrument: String,
    /// Signed notional to hold (positive = long)
    pub target: Notional,
    pub reference_price: Price,
    /// Largest plan sent in one run; unbounded when absent
    #[serde(default)]
    pub max_step: Option<Notional>,
    /// Gaps smaller than this are left alone
    #[serde(default = "default_min_trade")]
    pub min_trade: Notional,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default)]
    pub style: ExecutionStyle,
    /// Plan lifetime before it is worked at market
    #[serde(default)]
    pub plan_ttl_ms: Option<u64>,
}

fn default_min_trade() -> Notional {
    Decimal::TEN
}

fn default_interval_ms() -> u64 {
    1000
}

impl TargetExposureConfig {
    pub fn new(instrument: impl Into<String>, target: Notional, reference_price: Price) -> Self {
        Self {
            instrument: instrument.into(),
            target,
            reference_price,
            max_step: None,
            min_trade: default_min_trade(),
            interval_ms: default_interval_ms(),
            style: ExecutionStyle::default(),
            plan_ttl_ms: None,
        }
    }
}

#[derive(Debug)]
struct Working {
    id: PlanOrderId,
    /// Executed quantity already credited to `exposure`
    credited: Notional,
}

#[derive(Debug, Default)]
struct ExposureState {
    exposure: Notional,
    working: Option<Working>,
}

pub struct TargetExposureStrategy {
    name: String,
    config: TargetExposureConfig,
    state: Mutex<ExposureState>,
    notifications: AtomicUsize,
}

impl TargetExposureStrategy {
    pub fn new(name: impl Into<String>, config: TargetExposureConfig) -> Result<Self> {
        let name = name.into();
        if config.reference_price <= Decimal::ZERO {
            return Err(StrategyError::InvalidParams {
                name,
                reason: format!("reference_price must be positive, got {}", config.reference_price),
            });
        }
        if config.max_step.is_some_and(|step| step <= Decimal::ZERO) {
            return Err(StrategyError::InvalidParams {
                name,
                reason: "max_step must be positive".to_string(),
            });
        }
        Ok(Self {
            name,
            config,
            state: Mutex::new(ExposureState::default()),
            notifications: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &TargetExposureConfig {
        &self.config
    }

    /// Signed notional executed so far
    pub async fn exposure(&self) -> Notional {
        self.state.lock().await.exposure
    }

    pub async fn working_plan(&self) -> Option<PlanOrderId> {
        self.state.lock().await.working.as_ref().map(|w| w.id)
    }

    pub fn notifications_seen(&self) -> usize {
        self.notifications.load(Ordering::Relaxed)
    }

    /// Credit the working plan's progress; returns whether it is still live
    async fn settle_working(&self, state: &mut ExposureState, ctx: &StrategyContext) -> bool {
        let Some(working) = state.working.as_mut() else {
            return false;
        };
        let Some(snapshot) = ctx.plan(working.id).await else {
            warn!(
                "[STRATEGY] {} lost track of plan {}",
                self.name,
                working.id.short()
            );
            state.working = None;
            return false;
        };

        let executed = snapshot.plan.executed_quantity();
        let delta = executed - working.credited;
        if delta > Decimal::ZERO {
            state.exposure += delta * snapshot.plan.side.sign();
            working.credited = executed;
        }
        if !snapshot.live {
            debug!(
                "[STRATEGY] {} plan {} finished, exposure {}",
                self.name,
                working.id.short(),
                state.exposure
            );
            state.working = None;
        }
        snapshot.live
    }
}

#[async_trait]
impl Strategy for TargetExposureStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn instrument(&self) -> Option<&str> {
        Some(&self.config.instrument)
    }

    fn run_interval(&self) -> Duration {
        Duration::from_millis(self.config.interval_ms)
    }

    async fn start(&self, _ctx: &StrategyContext) -> Result<()> {
        info!(
            "[STRATEGY] {} targeting {} {}",
            self.name, self.config.target, self.config.instrument
        );
        Ok(())
    }

    async fn run(&self, ctx: &StrategyContext) -> Result<()> {
        let mut state = self.state.lock().await;
        if self.settle_working(&mut state, ctx).await {
            return Ok(());
        }

        let gap = self.config.target - state.exposure;
        if gap.abs() < self.config.min_trade {
            return Ok(());
        }
        let step = match self.config.max_step {
            Some(max) => gap.abs().min(max),
            None => gap.abs(),
        };

        let signed = if gap.is_sign_negative() { -step } else { step };
        let mut plan = PlanOrder::from_signed(
            self.config.instrument.clone(),
            signed,
            self.config.reference_price,
        )
        .map_err(|e| StrategyError::Failed(e.to_string()))?
        .with_strategy(self.name.clone())
        .with_style(self.config.style)
        .with_created_at(ctx.now());
        if let Some(ttl) = self.config.plan_ttl_ms {
            plan = plan.with_expiry(ctx.now() + chrono::Duration::milliseconds(ttl as i64));
        }

        let side = plan.side;
        let id = ctx.make_order(plan).await?;
        info!(
            "[STRATEGY] {} sent plan {} {} {} (exposure {}, target {})",
            self.name,
            id.short(),
            side,
            step,
            state.exposure,
            self.config.target
        );
        state.working = Some(Working {
            id,
            credited: Decimal::ZERO,
        });
        Ok(())
    }

    async fn notify(&self, _ctx: &StrategyContext, notification: &Notification) -> Result<()> {
        self.notifications.fetch_add(1, Ordering::Relaxed);
        debug!(
            "[STRATEGY] {} saw {:?} from {}",
            self.name,
            notification.status(),
            notification.venue()
        );
        Ok(())
    }

    async fn stop(&self, ctx: &StrategyContext) -> Result<()> {
        let mut state = self.state.lock().await;
        if self.settle_working(&mut state, ctx).await {
            if let Some(working) = state.working.take() {
                ctx.cancel_plan(working.id).await?;
                info!("[STRATEGY] {} withdrew plan {}", self.name, working.id.short());
            }
        }
        info!(
            "[STRATEGY] {} stopped at exposure {}",
            self.name, state.exposure
        );
        Ok(())
    }
}

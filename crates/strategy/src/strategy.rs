//! Strategy Trait
//!
//! A strategy is shared between its periodic runner and its notification
//! runner, so every callback takes `&self` and implementations keep their
//! mutable state behind a lock.

use crate::context::StrategyContext;
use crate::error::Result;
use async_trait::async_trait;
use hedge_core::{Notification, Timestamp};
use std::time::Duration;

#[async_trait]
pub trait Strategy: Send + Sync {
    /// Unique name, used for lookup, logging and plan attribution
    fn name(&self) -> &str;

    /// Instrument whose venue notifications this strategy wants
    ///
    /// Strategies returning `None` get no notification runner.
    fn instrument(&self) -> Option<&str> {
        None
    }

    /// Fixed period between `run` calls
    fn run_interval(&self) -> Duration;

    /// Next time `run` should be called, overriding `run_interval`
    fn next_wake(&self, _now: Timestamp) -> Option<Timestamp> {
        None
    }

    /// Called once before the first `run`
    async fn start(&self, _ctx: &StrategyContext) -> Result<()> {
        Ok(())
    }

    async fn run(&self, ctx: &StrategyContext) -> Result<()>;

    /// Called for each venue notification on `instrument()`
    async fn notify(&self, _ctx: &StrategyContext, _notification: &Notification) -> Result<()> {
        Ok(())
    }

    /// Called exactly once when the strategy is stopped
    async fn stop(&self, _ctx: &StrategyContext) -> Result<()> {
        Ok(())
    }
}

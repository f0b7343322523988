//! Hedge Order Manager
//!
//! The Order Manager sits between strategies and the venues, responsible for:
//! - **Netting**: Crosses opposite plan orders internally at zero cost
//! - **Venue Selection**: Ranks venues by fee-adjusted depth price
//! - **Order Dispatch**: Works residual plans with market and limit orders
//! - **Stop-Order Tracking**: Escalates stale or endangered limit orders
//!
//! ## Architecture
//!
//! ```text
//! Strategies ──► PlanOrders ──► ┌────────────────────────────────────────┐
//!                               │            Order Manager               │
//!                               │  ┌─────────────────────────────────┐   │
//!                               │  │   Netting Engine                │   │
//!                               │  │   - FIFO plan book / instrument │   │
//!                               │  │   - Internal crosses            │   │
//!                               │  └───────────────┬─────────────────┘   │
//!                               │                  │ Residual plans      │
//!                               │  ┌───────────────▼─────────────────┐   │
//!                               │  │   Instrument Worker (per tick)  │   │
//!                               │  │   - Venue selector (requote)    │   │
//!                               │  │   - Market / limit slices       │   │
//!                               │  │   - Stop-order tracker          │   │
//!                               │  └───────────────┬─────────────────┘   │
//!                               │                  │ ExOrders            │
//!                               └──────────────────┼─────────────────────┘
//!                                                  ▼
//!                                           Venue connections
//!
//! Venue notifications ──► Instrument Worker ──► plan fills ──► Strategies
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hedge_order_manager::{DispatcherConfig, NettingEngine, OrderDispatcher};
//!
//! let dispatcher = OrderDispatcher::new(config, registry, netting, notifications, store, clock);
//! dispatcher.submit_plan(PlanOrder::new("BTC-USDT", Side::Buy, dec!(1200), dec!(30000))?).await?;
//! dispatcher.spawn_instrument("BTC-USDT")?;
//! ```

pub mod dispatcher;
pub mod error;
pub mod netting;
pub mod router;
pub mod store;
pub mod tracker;

// Re-export main types
pub use dispatcher::{
    DispatcherConfig, InstrumentWorker, NoForwarding, NotificationForwarder, OrderDispatcher,
    limit_price,
};
pub use error::{Error, Result};
pub use netting::{
    BookEntry, DEFAULT_CLOSED_CAPACITY, NettingEngine, PlanBook, PlanState, SubmitOutcome,
};
pub use router::{FeeKind, Quote, VenueSelector, rank_quotes, score};
pub use store::{InMemoryOrderStore, StoredExOrder};
pub use tracker::{
    RemovalReason, Resolution, StopOrderTracker, TrackUpdate, TrackerConfig, is_price_risk,
};

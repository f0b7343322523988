//! Hedge Runner
//!
//! Wires the execution core into a running engine:
//!
//! - **Config**: One JSON document for venues, bindings, dispatcher and strategies
//! - **Strategy Manager**: Runs each strategy on its own tasks and isolates failures
//! - **Alerting**: Log and channel alerters for operator-facing problems
//! - **Engine**: Builds every component and owns the start/stop order
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     STRATEGY MANAGER                          │
//! │   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐      │
//! │   │  Strategy A  │   │  Strategy B  │   │  Strategy C  │      │
//! │   └──────┬───────┘   └──────┬───────┘   └──────┬───────┘      │
//! │          │ plan orders      │                  │   ▲ fills    │
//! └──────────┼──────────────────┼──────────────────┼───┼──────────┘
//!            └──────────────────┼──────────────────┘   │
//!                               ▼                      │
//!                   ┌───────────────────────┐          │
//!                   │    Order Dispatcher   │──────────┘
//!                   │ (netting + workers)   │
//!                   └───────────┬───────────┘
//!                               │ ex orders
//!                               ▼
//!                   ┌───────────────────────┐
//!                   │    Venue Registry     │
//!                   └───────────┬───────────┘
//!                               ▼
//!                      Venue A  Venue B  ...
//! ```

pub mod alert;
pub mod config;
pub mod engine;
pub mod error;
pub mod manager;

pub use alert::{ChannelAlerter, LogAlerter};
pub use config::{DispatcherSettings, EngineConfig, ReadinessSettings};
pub use engine::{Engine, EngineBuilder, EngineSink};
pub use error::{ConfigError, EngineError, Result};
pub use manager::{FailureCounter, StrategyManager, StrategyManagerConfig, StrategyStats};

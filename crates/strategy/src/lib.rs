//! Hedge Strategy Framework
//!
//! Strategies decide *what* exposure to hold; the engine decides *how* it
//! is executed. A strategy only ever talks to the engine through a
//! [`PlanOrderSink`] handed to it in its [`StrategyContext`].
//!
//! ## Architecture
//!
//! ```text
//!   StrategySettings ──► StrategyRegistry ──► Box<dyn Strategy>
//!                                                   │
//!              periodic runner ── run() ────────────┤
//!          notification runner ── notify() ─────────┤
//!                                                   │ PlanOrder
//!                                                   ▼
//!                                            PlanOrderSink (engine)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hedge_strategy::{StrategyRegistry, StrategySettings};
//!
//! let settings: StrategySettings = serde_json::from_str(json)?;
//! let strategy = StrategyRegistry::new().build(&settings)?;
//! ```

pub mod context;
pub mod error;
pub mod registry;
pub mod strategy;
pub mod target_exposure;

// Re-export main types
pub use context::{PlanOrderSink, PlanSnapshot, StrategyContext};
pub use error::{Result, StrategyError};
pub use registry::{StrategyConstructor, StrategyRegistry, StrategySettings};
pub use strategy::Strategy;
pub use target_exposure::{TargetExposureConfig, TargetExposureStrategy};

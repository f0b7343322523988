//! Engine configuration
//!
//! One JSON document describes the whole engine:
//! - venue accounts and the adapter kind that builds each one
//! - instrument bindings (logical instrument to venue symbol)
//! - dispatcher, readiness and strategy settings

use crate::error::ConfigError;
use crate::manager::StrategyManagerConfig;
use hedge_core::{ExecutionStyle, Notional, SymbolInfo};
use hedge_gateway::{RegistryConfig, VenueSettings};
use hedge_order_manager::{DEFAULT_CLOSED_CAPACITY, DispatcherConfig};
use hedge_strategy::StrategySettings;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Root configuration for the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_name")]
    pub name: String,

    #[serde(default)]
    pub venues: Vec<VenueSettings>,

    /// Symbol bindings; one entry per (instrument, venue)
    #[serde(default)]
    pub instruments: Vec<SymbolInfo>,

    #[serde(default)]
    pub dispatcher: DispatcherSettings,

    #[serde(default)]
    pub readiness: ReadinessSettings,

    #[serde(default)]
    pub strategies: Vec<StrategySettings>,

    /// Consecutive strategy failures between alerts
    #[serde(default = "default_failure_threshold")]
    pub alert_failure_threshold: u32,

    /// Bound on joining any background task at stop
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
}

fn default_engine_name() -> String {
    "hedge-engine".to_string()
}

fn default_failure_threshold() -> u32 {
    7
}

fn default_join_timeout_ms() -> u64 {
    5000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: default_engine_name(),
            venues: Vec::new(),
            instruments: Vec::new(),
            dispatcher: DispatcherSettings::default(),
            readiness: ReadinessSettings::default(),
            strategies: Vec::new(),
            alert_failure_threshold: default_failure_threshold(),
            join_timeout_ms: default_join_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherSettings {
    pub order_interval_ms: u64,
    pub limit_expired_time_ms: u64,
    pub order_risk_rate: Decimal,
    pub min_order_quantity: Notional,
    pub venue_timeout_ms: u64,
    /// Style given to strategies that do not pick one
    pub execution_style_default: ExecutionStyle,
    /// Closed plans kept per instrument for lookups by id
    pub closed_plan_capacity: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            order_interval_ms: 600,
            limit_expired_time_ms: 30_000,
            order_risk_rate: Decimal::ZERO,
            min_order_quantity: Decimal::TEN,
            venue_timeout_ms: 5000,
            execution_style_default: ExecutionStyle::Market,
            closed_plan_capacity: DEFAULT_CLOSED_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessSettings {
    pub retries: u32,
    pub delay_ms: u64,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            retries: 30,
            delay_ms: 1000,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::from_json(&content)
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check cross references and ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut venues = HashSet::new();
        for venue in &self.venues {
            if venue.name.is_empty() {
                return Err(ConfigError::Invalid("venue with empty name".to_string()));
            }
            if !venues.insert(venue.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate venue {}", venue.name)));
            }
        }

        let mut bindings = HashSet::new();
        for info in &self.instruments {
            if !venues.contains(info.venue.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "instrument {} is bound to unknown venue {}",
                    info.instrument, info.venue
                )));
            }
            if !bindings.insert((info.instrument.as_str(), info.venue.as_str())) {
                return Err(ConfigError::Invalid(format!(
                    "instrument {} is bound to {} twice",
                    info.instrument, info.venue
                )));
            }
            info.validate().map_err(|e| {
                ConfigError::Invalid(format!(
                    "binding of {} on {}: {}",
                    info.instrument, info.venue, e
                ))
            })?;
        }

        let mut strategies = HashSet::new();
        for strategy in &self.strategies {
            if !strategies.insert(strategy.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate strategy {}",
                    strategy.name
                )));
            }
        }

        let d = &self.dispatcher;
        if d.order_interval_ms == 0 || d.venue_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "order_interval_ms and venue_timeout_ms must be positive".to_string(),
            ));
        }
        if d.order_risk_rate < Decimal::ZERO || d.order_risk_rate >= Decimal::ONE {
            return Err(ConfigError::Invalid(format!(
                "order_risk_rate {} outside [0, 1)",
                d.order_risk_rate
            )));
        }
        if d.min_order_quantity < Decimal::ZERO {
            return Err(ConfigError::Invalid("min_order_quantity is negative".to_string()));
        }
        if d.closed_plan_capacity == 0 {
            return Err(ConfigError::Invalid(
                "closed_plan_capacity must be positive".to_string(),
            ));
        }
        if self.alert_failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "alert_failure_threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            order_interval: Duration::from_millis(self.dispatcher.order_interval_ms),
            limit_expired_time: Duration::from_millis(self.dispatcher.limit_expired_time_ms),
            order_risk_rate: self.dispatcher.order_risk_rate,
            min_order_quantity: self.dispatcher.min_order_quantity,
            join_timeout: self.join_timeout(),
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            venue_timeout: Duration::from_millis(self.dispatcher.venue_timeout_ms),
            readiness_retries: self.readiness.retries,
            readiness_delay: Duration::from_millis(self.readiness.delay_ms),
        }
    }

    pub fn manager_config(&self) -> StrategyManagerConfig {
        StrategyManagerConfig {
            failure_threshold: self.alert_failure_threshold,
            join_timeout: self.join_timeout(),
        }
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Enabled strategies, with the default execution style filled in
    pub fn enabled_strategies(&self) -> Vec<StrategySettings> {
        let style = serde_json::to_value(self.dispatcher.execution_style_default)
            .unwrap_or(serde_json::Value::Null);
        self.strategies
            .iter()
            .filter(|s| s.enabled)
            .cloned()
            .map(|mut settings| {
                if let Some(params) = settings.params.as_object_mut() {
                    params.entry("style").or_insert_with(|| style.clone());
                }
                settings
            })
            .collect()
    }
}

//! Strategy factory: build strategies by configured kind

use crate::error::{Result, StrategyError};
use crate::strategy::Strategy;
use crate::target_exposure::{TargetExposureConfig, TargetExposureStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One configured strategy instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySettings {
    pub name: String,
    /// Strategy kind, e.g. `"target_exposure"`
    pub kind: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Kind-specific parameters
    #[serde(default)]
    pub params: serde_json::Value,
}

fn default_enabled() -> bool {
    true
}

impl StrategySettings {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            enabled: true,
            params: serde_json::Value::Null,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

pub type StrategyConstructor = fn(&StrategySettings) -> Result<Box<dyn Strategy>>;

pub const TARGET_EXPOSURE_KIND: &str = "target_exposure";

/// Kind name to constructor table
pub struct StrategyRegistry {
    constructors: HashMap<String, StrategyConstructor>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(TARGET_EXPOSURE_KIND, build_target_exposure);
        registry
    }
}

impl StrategyRegistry {
    /// Registry with the built-in strategies
    pub fn new() -> Self {
        Self::default()
    }

    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    pub fn register(&mut self, kind: impl Into<String>, constructor: StrategyConstructor) {
        self.constructors.insert(kind.into(), constructor);
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn build(&self, settings: &StrategySettings) -> Result<Box<dyn Strategy>> {
        let constructor = self
            .constructors
            .get(&settings.kind)
            .ok_or_else(|| StrategyError::UnknownKind(settings.kind.clone()))?;
        constructor(settings)
    }
}

fn build_target_exposure(settings: &StrategySettings) -> Result<Box<dyn Strategy>> {
    let config: TargetExposureConfig =
        serde_json::from_value(settings.params.clone()).map_err(|e| {
            StrategyError::InvalidParams {
                name: settings.name.clone(),
                reason: e.to_string(),
            }
        })?;
    let strategy = TargetExposureStrategy::new(&settings.name, config)?;
    Ok(Box::new(strategy))
}

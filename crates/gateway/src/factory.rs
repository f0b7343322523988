//! Venue factory: build adapters by configured kind

use crate::adapters::simulator::{SimulatedVenue, SimulatedVenueParams};
use crate::error::{RegistryError, Result};
use crate::transport::NotificationSender;
use hedge_ports::VenueClient;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// One configured venue account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueSettings {
    pub name: String,
    /// Adapter kind, e.g. `"simulator"`
    pub kind: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub taker_rate: Decimal,
    #[serde(default)]
    pub maker_rate: Decimal,
    /// Adapter-specific parameters
    #[serde(default)]
    pub params: serde_json::Value,
}

fn default_enabled() -> bool {
    true
}

impl VenueSettings {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            enabled: true,
            taker_rate: Decimal::ZERO,
            maker_rate: Decimal::ZERO,
            params: serde_json::Value::Null,
        }
    }
}

pub type VenueConstructor =
    fn(&VenueSettings, NotificationSender) -> Result<Arc<dyn VenueClient>>;

/// Kind name to constructor table
pub struct VenueFactory {
    constructors: HashMap<String, VenueConstructor>,
}

impl Default for VenueFactory {
    fn default() -> Self {
        let mut factory = Self::empty();
        factory.register(SIMULATOR_KIND, build_simulator);
        factory
    }
}

pub const SIMULATOR_KIND: &str = "simulator";

impl VenueFactory {
    /// Factory with the built-in adapters registered
    pub fn new() -> Self {
        Self::default()
    }

    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register (or replace) the constructor for `kind`
    pub fn register(&mut self, kind: impl Into<String>, constructor: VenueConstructor) {
        self.constructors.insert(kind.into(), constructor);
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn build(
        &self,
        settings: &VenueSettings,
        notifications: NotificationSender,
    ) -> Result<Arc<dyn VenueClient>> {
        let constructor = self
            .constructors
            .get(&settings.kind)
            .ok_or_else(|| RegistryError::UnknownVenueKind(settings.kind.clone()))?;
        constructor(settings, notifications)
    }
}

fn build_simulator(
    settings: &VenueSettings,
    notifications: NotificationSender,
) -> Result<Arc<dyn VenueClient>> {
    let params: SimulatedVenueParams = if settings.params.is_null() {
        SimulatedVenueParams::default()
    } else {
        serde_json::from_value(settings.params.clone()).map_err(|e| {
            RegistryError::InvalidSettings {
                venue: settings.name.clone(),
                reason: e.to_string(),
            }
        })?
    };

    let venue = SimulatedVenue::new(&settings.name, settings.taker_rate, settings.maker_rate)
        .with_params(params)
        .with_notifications(notifications);
    Ok(Arc::new(venue))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::notification_channel;
    use hedge_core::Side;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_build_simulator_from_settings() {
        let settings: VenueSettings = serde_json::from_str(
            r#"{
                "name": "sim-a",
                "kind": "simulator",
                "taker_rate": "0.001",
                "params": {"books": {"BTCUSDT": {"bids": [["99", "1"]], "asks": [["101", "1"]]}}}
            }"#,
        )
        .unwrap();
        assert!(settings.enabled);

        let (tx, _rx) = notification_channel();
        let venue = VenueFactory::new().build(&settings, tx).unwrap();
        assert_eq!(venue.name(), "sim-a");
        assert_eq!(venue.taker_rate(), dec!(0.001));
        assert_eq!(venue.best_price("BTCUSDT", Side::Buy).await.unwrap(), dec!(101));
    }

    #[test]
    fn test_unknown_kind() {
        let (tx, _rx) = notification_channel();
        let err = VenueFactory::new()
            .build(&VenueSettings::new("x", "carrier-pigeon"), tx)
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::UnknownVenueKind(kind) if kind == "carrier-pigeon"));
    }

    #[test]
    fn test_bad_params() {
        let (tx, _rx) = notification_channel();
        let mut settings = VenueSettings::new("sim", SIMULATOR_KIND);
        settings.params = serde_json::json!({"books": 5});
        assert!(matches!(
            VenueFactory::new().build(&settings, tx),
            Err(RegistryError::InvalidSettings { .. })
        ));
    }

    #[test]
    fn test_register_custom_kind() {
        fn build_custom(
            settings: &VenueSettings,
            _tx: NotificationSender,
        ) -> Result<Arc<dyn VenueClient>> {
            Ok(Arc::new(SimulatedVenue::new(&settings.name, dec!(0), dec!(0))))
        }

        let mut factory = VenueFactory::empty();
        factory.register("custom", build_custom);
        assert_eq!(factory.kinds(), vec!["custom"]);
    }
}

//! Venue registry
//!
//! Holds venue connections by name and the symbol bindings that map a
//! logical instrument onto venue-native symbols. Bindings carry a
//! registration sequence used as the routing tie-break.

use crate::connection::VenueConnection;
use crate::error::{RegistryError, Result};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use hedge_core::{Side, SymbolInfo};
use hedge_ports::VenueClient;
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Upper bound on every venue call
    pub venue_timeout: Duration,
    /// Readiness check rounds before giving up on a pair
    pub readiness_retries: u32,
    /// Pause between readiness rounds
    pub readiness_delay: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            venue_timeout: Duration::from_secs(5),
            readiness_retries: 30,
            readiness_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
struct Binding {
    seq: u64,
    info: SymbolInfo,
}

/// A routable binding together with its live connection
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Binding registration sequence (tie-break)
    pub seq: u64,
    pub info: SymbolInfo,
    pub venue: Arc<VenueConnection>,
}

/// Outcome of [`VenueRegistry::start`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadinessReport {
    /// Venues whose `start()` failed
    pub failed_venues: Vec<String>,
    /// `(venue, instrument)` pairs that answered a depth quote
    pub ready: Vec<(String, String)>,
    /// `(venue, instrument)` pairs that never answered
    pub not_ready: Vec<(String, String)>,
}

impl ReadinessReport {
    pub fn all_ready(&self) -> bool {
        self.failed_venues.is_empty() && self.not_ready.is_empty()
    }
}

pub struct VenueRegistry {
    config: RegistryConfig,
    venues: DashMap<String, Arc<VenueConnection>>,
    /// instrument -> bindings in registration order
    bindings: DashMap<String, Vec<Binding>>,
    next_venue_seq: AtomicU64,
    next_binding_seq: AtomicU64,
}

impl Default for VenueRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl VenueRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            venues: DashMap::new(),
            bindings: DashMap::new(),
            next_venue_seq: AtomicU64::new(0),
            next_binding_seq: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Add a venue account, enabled
    pub fn add_account(&self, client: Arc<dyn VenueClient>) -> Result<Arc<VenueConnection>> {
        let name = client.name().to_string();
        match self.venues.entry(name.clone()) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateVenue(name)),
            Entry::Vacant(slot) => {
                let seq = self.next_venue_seq.fetch_add(1, Ordering::SeqCst);
                let conn = Arc::new(VenueConnection::new(client, self.config.venue_timeout, seq));
                slot.insert(conn.clone());
                info!("[VENUE] added account {}", name);
                Ok(conn)
            }
        }
    }

    /// Remove a venue account and its (disabled) bindings, then stop it
    ///
    /// Refused while any enabled binding still routes to the venue.
    pub async fn remove_account(&self, venue: &str) -> Result<()> {
        if !self.venues.contains_key(venue) {
            return Err(RegistryError::UnknownVenue(venue.to_string()));
        }

        let in_use: Vec<String> = self
            .bindings
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .iter()
                    .any(|b| b.info.venue == venue && b.info.enabled)
            })
            .map(|entry| entry.key().clone())
            .collect();
        if !in_use.is_empty() {
            return Err(RegistryError::VenueInUse {
                venue: venue.to_string(),
                instruments: in_use,
            });
        }

        for mut entry in self.bindings.iter_mut() {
            entry.value_mut().retain(|b| b.info.venue != venue);
        }
        self.bindings.retain(|_, bindings| !bindings.is_empty());

        if let Some((_, conn)) = self.venues.remove(venue) {
            conn.stop().await;
        }
        info!("[VENUE] removed account {}", venue);
        Ok(())
    }

    pub fn venue(&self, name: &str) -> Option<Arc<VenueConnection>> {
        self.venues.get(name).map(|v| v.value().clone())
    }

    /// Venue names in registration order
    pub fn venue_names(&self) -> Vec<String> {
        self.connections()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    fn connections(&self) -> Vec<Arc<VenueConnection>> {
        let mut conns: Vec<Arc<VenueConnection>> =
            self.venues.iter().map(|v| v.value().clone()).collect();
        conns.sort_by_key(|c| c.seq());
        conns
    }

    pub fn enable_venue(&self, name: &str) -> Result<()> {
        self.set_venue_enabled(name, true)
    }

    pub fn disable_venue(&self, name: &str) -> Result<()> {
        self.set_venue_enabled(name, false)
    }

    fn set_venue_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let conn = self
            .venue(name)
            .ok_or_else(|| RegistryError::UnknownVenue(name.to_string()))?;
        conn.set_enabled(enabled);
        info!(
            "[VENUE] {} {}",
            name,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    /// Bind an instrument to a venue symbol
    ///
    /// Re-registering the same (instrument, venue) pair updates the binding
    /// in place and keeps its original sequence.
    pub fn register_symbol(&self, info: SymbolInfo) -> Result<()> {
        if !self.venues.contains_key(&info.venue) {
            return Err(RegistryError::UnknownVenue(info.venue.clone()));
        }
        info.validate().map_err(|e| RegistryError::InvalidBinding {
            instrument: info.instrument.clone(),
            venue: info.venue.clone(),
            reason: e.to_string(),
        })?;

        let mut bindings = self.bindings.entry(info.instrument.clone()).or_default();
        if let Some(existing) = bindings.iter_mut().find(|b| b.info.venue == info.venue) {
            debug!(
                "[VENUE] updated binding {} -> {}:{}",
                info.instrument, info.venue, info.symbol
            );
            existing.info = info;
        } else {
            let seq = self.next_binding_seq.fetch_add(1, Ordering::SeqCst);
            info!(
                "[VENUE] bound {} -> {}:{} (seq {})",
                info.instrument, info.venue, info.symbol, seq
            );
            bindings.push(Binding { seq, info });
        }
        Ok(())
    }

    pub fn enable_instrument(&self, instrument: &str, venue: &str) -> Result<()> {
        self.set_binding_enabled(instrument, venue, true)
    }

    pub fn disable_instrument(&self, instrument: &str, venue: &str) -> Result<()> {
        self.set_binding_enabled(instrument, venue, false)
    }

    fn set_binding_enabled(&self, instrument: &str, venue: &str, enabled: bool) -> Result<()> {
        let unknown = || RegistryError::UnknownBinding {
            instrument: instrument.to_string(),
            venue: venue.to_string(),
        };
        let mut bindings = self.bindings.get_mut(instrument).ok_or_else(unknown)?;
        let binding = bindings
            .iter_mut()
            .find(|b| b.info.venue == venue)
            .ok_or_else(unknown)?;
        binding.info.enabled = enabled;
        info!(
            "[VENUE] {} on {} {}",
            instrument,
            venue,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    /// All bindings of `instrument`, enabled or not, in registration order
    pub fn bindings(&self, instrument: &str) -> Vec<SymbolInfo> {
        self.bindings
            .get(instrument)
            .map(|b| b.iter().map(|b| b.info.clone()).collect())
            .unwrap_or_default()
    }

    pub fn binding(&self, instrument: &str, venue: &str) -> Option<SymbolInfo> {
        self.bindings.get(instrument).and_then(|b| {
            b.iter()
                .find(|b| b.info.venue == venue)
                .map(|b| b.info.clone())
        })
    }

    /// Instruments with at least one enabled binding, sorted
    pub fn instruments(&self) -> Vec<String> {
        let set: BTreeSet<String> = self
            .bindings
            .iter()
            .filter(|e| e.value().iter().any(|b| b.info.enabled))
            .map(|e| e.key().clone())
            .collect();
        set.into_iter().collect()
    }

    /// Routable bindings for `instrument` on `side`, in registration order
    ///
    /// A binding is routable when it is enabled, permits `side`, and its
    /// venue is enabled, started and alive.
    pub fn candidates(&self, instrument: &str, side: Side) -> Vec<Candidate> {
        let Some(bindings) = self.bindings.get(instrument) else {
            return Vec::new();
        };
        bindings
            .iter()
            .filter(|b| b.info.enabled && b.info.allowed_side.permits(side))
            .filter_map(|b| {
                let venue = self.venue(&b.info.venue)?;
                venue.is_available().then(|| Candidate {
                    seq: b.seq,
                    info: b.info.clone(),
                    venue,
                })
            })
            .collect()
    }

    /// Start every enabled venue, then wait for bindings to quote
    ///
    /// Venues are started one at a time in registration order. A venue that
    /// fails to start is excluded. The readiness loop checks each enabled
    /// `(venue, instrument)` pair with a depth request until every pair has
    /// answered or the retry budget runs out.
    pub async fn start(&self) -> ReadinessReport {
        let mut report = ReadinessReport::default();

        for conn in self.connections() {
            if !conn.is_enabled() {
                debug!("[VENUE] {} disabled, not starting", conn.name());
                continue;
            }
            match conn.start().await {
                Ok(()) => info!("[VENUE] {} started", conn.name()),
                Err(e) => {
                    error!("[VENUE] {} failed to start: {}", conn.name(), e);
                    report.failed_venues.push(conn.name().to_string());
                }
            }
        }

        let mut pending: Vec<(Arc<VenueConnection>, SymbolInfo)> = Vec::new();
        for entry in self.bindings.iter() {
            for binding in entry.value().iter().filter(|b| b.info.enabled) {
                if let Some(conn) = self.venue(&binding.info.venue) {
                    if conn.is_enabled() && conn.is_started() {
                        pending.push((conn, binding.info.clone()));
                    }
                }
            }
        }
        pending.sort_by(|a, b| (a.0.seq(), &a.1.instrument).cmp(&(b.0.seq(), &b.1.instrument)));

        let rounds = self.config.readiness_retries.max(1);
        for round in 1..=rounds {
            let mut still_pending = Vec::with_capacity(pending.len());
            for (conn, info) in pending {
                match conn
                    .get_depth_price(&info.symbol, Side::Buy, info.depth_window)
                    .await
                {
                    Ok(price) => {
                        debug!(
                            "[VENUE] {} ready for {} (depth {})",
                            conn.name(),
                            info.instrument,
                            price
                        );
                        report
                            .ready
                            .push((conn.name().to_string(), info.instrument.clone()));
                    }
                    Err(e) => {
                        debug!(
                            "[VENUE] {} not ready for {} (round {}): {}",
                            conn.name(),
                            info.instrument,
                            round,
                            e
                        );
                        still_pending.push((conn, info));
                    }
                }
            }
            pending = still_pending;
            if pending.is_empty() {
                break;
            }
            if round < rounds {
                tokio::time::sleep(self.config.readiness_delay).await;
            }
        }

        for (conn, info) in pending {
            error!(
                "[VENUE] {} never became ready for {}",
                conn.name(),
                info.instrument
            );
            report
                .not_ready
                .push((conn.name().to_string(), info.instrument));
        }

        if report.all_ready() {
            info!("[VENUE] all {} bindings ready", report.ready.len());
        } else {
            warn!(
                "[VENUE] started with {} ready, {} not ready, {} failed venues",
                report.ready.len(),
                report.not_ready.len(),
                report.failed_venues.len()
            );
        }
        report
    }

    /// Stop every venue that was started
    pub async fn stop(&self) {
        for conn in self.connections() {
            if conn.is_started() {
                conn.stop().await;
                info!("[VENUE] {} stopped", conn.name());
            }
        }
    }
}

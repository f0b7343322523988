//! Engine facade
//!
//! Owns every long-lived component and their start/stop order:
//! - start: alerter, venues (with readiness), notification loop,
//!   instrument workers, strategies
//! - stop: strategies, instrument workers, notification loop, venues,
//!   alerter

use crate::alert::LogAlerter;
use crate::config::EngineConfig;
use crate::error::{ConfigError, EngineError, Result};
use crate::manager::StrategyManager;
use async_trait::async_trait;
use hedge_clock::SystemClock;
use hedge_core::{PlanOrder, PlanOrderId};
use hedge_gateway::{
    AuditListener, NotificationDispatcher, NotificationReceiver, NotificationSender,
    ReadinessReport, RegistryError, Shutdown, VenueFactory, VenueRegistry, notification_channel,
};
use hedge_order_manager::{InMemoryOrderStore, NettingEngine, OrderDispatcher, SubmitOutcome};
use hedge_ports::{Alert, AlertLevel, Alerter, Clock};
use hedge_strategy::{
    PlanOrderSink, PlanSnapshot, Strategy, StrategyContext, StrategyError, StrategyRegistry,
};
use log::{error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Plan order entry point handed to strategies
pub struct EngineSink {
    dispatcher: Arc<OrderDispatcher>,
}

#[async_trait]
impl PlanOrderSink for EngineSink {
    async fn make_order(&self, plan: PlanOrder) -> hedge_strategy::Result<PlanOrderId> {
        self.dispatcher
            .submit_plan(plan)
            .await
            .map(|outcome| outcome.plan_id)
            .map_err(|e| StrategyError::Order(e.to_string()))
    }

    async fn plan(&self, id: PlanOrderId) -> Option<PlanSnapshot> {
        self.dispatcher.plan_state(id).await.map(|state| PlanSnapshot {
            live: state.is_live(),
            plan: state.plan().clone(),
        })
    }

    async fn cancel_plan(&self, id: PlanOrderId) -> hedge_strategy::Result<PlanOrder> {
        self.dispatcher
            .cancel_plan(id)
            .await
            .map_err(|e| StrategyError::Order(e.to_string()))
    }
}

pub struct EngineBuilder {
    config: EngineConfig,
    venue_factory: VenueFactory,
    strategy_registry: StrategyRegistry,
    alerter: Option<Arc<dyn Alerter>>,
    clock: Option<Arc<dyn Clock>>,
    strategies: Vec<Box<dyn Strategy>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            venue_factory: VenueFactory::new(),
            strategy_registry: StrategyRegistry::new(),
            alerter: None,
            clock: None,
            strategies: Vec::new(),
        }
    }

    pub fn with_venue_factory(mut self, factory: VenueFactory) -> Self {
        self.venue_factory = factory;
        self
    }

    pub fn with_strategy_registry(mut self, registry: StrategyRegistry) -> Self {
        self.strategy_registry = registry;
        self
    }

    pub fn with_alerter(mut self, alerter: Arc<dyn Alerter>) -> Self {
        self.alerter = Some(alerter);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Run a strategy built in code alongside the configured ones
    pub fn with_strategy(mut self, strategy: Box<dyn Strategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn build(self) -> Result<Engine> {
        let config = self.config;
        config.validate()?;

        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let alerter: Arc<dyn Alerter> = match self.alerter {
            Some(alerter) => alerter,
            None => Arc::new(LogAlerter::new()),
        };
        let (sender, inbound) = notification_channel();

        let registry = Arc::new(VenueRegistry::new(config.registry_config()));
        for settings in &config.venues {
            let client = self
                .venue_factory
                .build(settings, sender.clone())
                .map_err(|e| match e {
                    RegistryError::UnknownVenueKind(kind) => {
                        EngineError::from(ConfigError::UnknownVenueKind {
                            venue: settings.name.clone(),
                            kind,
                        })
                    }
                    other => other.into(),
                })?;
            registry.add_account(client)?;
            if !settings.enabled {
                registry.disable_venue(&settings.name)?;
            }
        }
        for info in &config.instruments {
            registry.register_symbol(info.clone())?;
        }

        let mut strategies = self.strategies;
        for settings in config.enabled_strategies() {
            let strategy = self
                .strategy_registry
                .build(&settings)
                .map_err(|e| match e {
                    StrategyError::UnknownKind(kind) => {
                        EngineError::from(ConfigError::UnknownStrategyKind {
                            strategy: settings.name.clone(),
                            kind,
                        })
                    }
                    other => other.into(),
                })?;
            strategies.push(strategy);
        }

        let audit = Arc::new(AuditListener::new());
        let notifications = Arc::new(NotificationDispatcher::new(audit.clone()));
        let store = Arc::new(InMemoryOrderStore::new());
        let manager = Arc::new(StrategyManager::new(config.manager_config(), alerter.clone()));
        let dispatcher = Arc::new(
            OrderDispatcher::new(
                config.dispatcher_config(),
                registry.clone(),
                Arc::new(NettingEngine::with_closed_capacity(
                    config.dispatcher.closed_plan_capacity,
                )),
                notifications.clone(),
                store.clone(),
                clock.clone(),
            )
            .with_forwarder(manager.clone()),
        );
        let sink = Arc::new(EngineSink {
            dispatcher: dispatcher.clone(),
        });
        let context = StrategyContext::new(sink.clone(), clock);

        info!(
            "[ENGINE] {} built: {} venues, {} bindings, {} strategies",
            config.name,
            config.venues.len(),
            config.instruments.len(),
            strategies.len()
        );
        Ok(Engine {
            config,
            registry,
            dispatcher,
            notifications,
            audit,
            manager,
            store,
            alerter,
            sink,
            context,
            sender,
            inbound: Mutex::new(Some(inbound)),
            pending: Mutex::new(strategies),
            notification_loop: Mutex::new(None),
            started: AtomicBool::new(false),
        })
    }
}

pub struct Engine {
    config: EngineConfig,
    registry: Arc<VenueRegistry>,
    dispatcher: Arc<OrderDispatcher>,
    notifications: Arc<NotificationDispatcher>,
    audit: Arc<AuditListener>,
    manager: Arc<StrategyManager>,
    store: Arc<InMemoryOrderStore>,
    alerter: Arc<dyn Alerter>,
    sink: Arc<EngineSink>,
    context: StrategyContext,
    sender: NotificationSender,
    inbound: Mutex<Option<NotificationReceiver>>,
    /// Strategies waiting for `start`
    pending: Mutex<Vec<Box<dyn Strategy>>>,
    notification_loop: Mutex<Option<(Shutdown, JoinHandle<()>)>>,
    started: AtomicBool,
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Build venues and strategies with the built-in factories
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        EngineBuilder::new(config).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<VenueRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<OrderDispatcher> {
        &self.dispatcher
    }

    pub fn strategies(&self) -> &Arc<StrategyManager> {
        &self.manager
    }

    pub fn store(&self) -> &Arc<InMemoryOrderStore> {
        &self.store
    }

    pub fn audit(&self) -> &AuditListener {
        &self.audit
    }

    /// Sender venues report on; adapters added later take a clone
    pub fn notification_sender(&self) -> NotificationSender {
        self.sender.clone()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub async fn start(&self) -> Result<ReadinessReport> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyStarted);
        }
        info!("[ENGINE] {} starting", self.config.name);
        self.alerter.start();

        let report = self.registry.start().await;
        if !report.all_ready() {
            let message = format!(
                "failed venues {:?}, not ready {:?}",
                report.failed_venues, report.not_ready
            );
            warn!("[ENGINE] {}", message);
            self.alerter
                .send(Alert::new(AlertLevel::Warning, "venue-registry", message));
        }

        if let Some(inbound) = self.inbound.lock().await.take() {
            let shutdown = Shutdown::new();
            let handle = tokio::spawn(self.notifications.clone().run(inbound, shutdown.clone()));
            *self.notification_loop.lock().await = Some((shutdown, handle));
        }

        for instrument in self.registry.instruments() {
            self.dispatcher.spawn_instrument(&instrument)?;
        }

        let pending: Vec<Box<dyn Strategy>> = self.pending.lock().await.drain(..).collect();
        for strategy in pending {
            let name = strategy.name().to_string();
            if let Err(e) = self.manager.start_strategy(strategy, self.context.clone()).await {
                error!("[ENGINE] strategy {} not started: {}", name, e);
            }
        }

        info!(
            "[ENGINE] {} started: {} instruments, strategies {:?}",
            self.config.name,
            self.dispatcher.running_instruments().len(),
            self.manager.strategy_names()
        );
        Ok(report)
    }

    /// Cooperative shutdown; safe to call more than once
    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("[ENGINE] {} stopping", self.config.name);

        self.manager.stop_all().await;
        self.dispatcher.shutdown().await;

        if let Some((shutdown, mut handle)) = self.notification_loop.lock().await.take() {
            shutdown.trigger();
            let timeout = self.config.join_timeout();
            if tokio::time::timeout(timeout, &mut handle).await.is_err() {
                warn!("[ENGINE] notification loop did not stop within {:?}", timeout);
                handle.abort();
            }
        }

        self.registry.stop().await;
        self.alerter.stop();
        info!(
            "[ENGINE] {} stopped ({} notifications, {} plans)",
            self.config.name,
            self.audit.received(),
            self.store.plan_count()
        );
    }

    pub async fn make_order(&self, plan: PlanOrder) -> Result<SubmitOutcome> {
        Ok(self.dispatcher.submit_plan(plan).await?)
    }

    pub async fn cancel_plan(&self, id: PlanOrderId) -> Result<PlanOrder> {
        Ok(self.dispatcher.cancel_plan(id).await?)
    }

    pub async fn plan(&self, id: PlanOrderId) -> Option<PlanSnapshot> {
        self.sink.plan(id).await
    }

    /// Enable a binding, starting the instrument's worker if needed
    pub async fn enable_instrument(&self, instrument: &str, venue: &str) -> Result<()> {
        self.registry.enable_instrument(instrument, venue)?;
        if self.is_started() && !self.dispatcher.is_running(instrument) {
            self.dispatcher.spawn_instrument(instrument)?;
        }
        Ok(())
    }

    /// Disable a binding, stopping the worker once no venue is left
    pub async fn disable_instrument(&self, instrument: &str, venue: &str) -> Result<()> {
        self.registry.disable_instrument(instrument, venue)?;
        let still_routable = self.registry.instruments().iter().any(|i| i == instrument);
        if !still_routable && self.dispatcher.stop_instrument(instrument).await {
            info!("[ENGINE] {} has no enabled venue left, worker stopped", instrument);
        }
        Ok(())
    }

    pub fn enable_venue(&self, venue: &str) -> Result<()> {
        Ok(self.registry.enable_venue(venue)?)
    }

    pub fn disable_venue(&self, venue: &str) -> Result<()> {
        Ok(self.registry.disable_venue(venue)?)
    }

    pub async fn remove_account(&self, venue: &str) -> Result<()> {
        Ok(self.registry.remove_account(venue).await?)
    }

    pub async fn start_strategy(&self, strategy: Box<dyn Strategy>) -> Result<()> {
        self.manager
            .start_strategy(strategy, self.context.clone())
            .await
    }

    pub async fn stop_strategy(&self, name: &str) -> bool {
        self.manager.stop_strategy(name).await
    }
}

#[async_trait]
impl PlanOrderSink for Engine {
    async fn make_order(&self, plan: PlanOrder) -> hedge_strategy::Result<PlanOrderId> {
        self.sink.make_order(plan).await
    }

    async fn plan(&self, id: PlanOrderId) -> Option<PlanSnapshot> {
        self.sink.plan(id).await
    }

    async fn cancel_plan(&self, id: PlanOrderId) -> hedge_strategy::Result<PlanOrder> {
        self.sink.cancel_plan(id).await
    }
}

//! # State Machine Manager
//!
//! Registry of `(machine, interval, mode)` entries plus the wiring between
//! tag changes and the machines that care about them. The manager owns one
//! [`TagObserver`] bound to a shared [`DeliveryQueue`]; every tag it attaches
//! feeds that queue, and the router task fans entries out to per-machine
//! inboxes according to each machine's subscription set.
//!
//! Registrations take effect immediately: appending to a started manager
//! spawns the machine's driver at once, and dropping a machine waits for any
//! in-flight step before the driver is stopped. Tags left without a
//! subscribed machine after a drop are detached.
//!
//! Every change to the attached set happens under one async lock that is held
//! across the matching tag store call, so the set always mirrors what the tag
//! store has recorded for the manager's observer.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::errors::{ManagerError, ManagerResult};
use super::machine::StateMachine;
use super::registration::{MachineRegistration, SharedMachine};
use super::scheduler::{self, DriverHandle, Registry};
use super::states::{ExecutionMode, MachineState};
use crate::config::{AutomationConfig, ConfigResult, SchedulerConfig};
use crate::logging::{log_error, log_machine_operation};
use crate::tags::{CvtEngine, DeliveryQueue, TagObserver};

/// `{length, state_machines}` view of the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerSummary {
    pub length: usize,
    pub state_machines: Vec<String>,
}

struct ManagerInner {
    cvt: CvtEngine,
    scheduler: SchedulerConfig,
    registry: Registry,
    tag_queue: Arc<DeliveryQueue>,
    observer: TagObserver,
    attached: Mutex<HashSet<String>>,
    attachments: tokio::sync::Mutex<()>,
    drivers: Mutex<HashMap<String, DriverHandle>>,
    sync_group: Mutex<Option<DriverHandle>>,
    router: Mutex<Option<DriverHandle>>,
    sync_wake: Arc<Notify>,
    started: AtomicBool,
    shut_down: AtomicBool,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        // Tasks hold no reference back to the manager; tell them to exit
        self.tag_queue.close();
        for driver in self.drivers.get_mut().values() {
            driver.signal();
        }
        if let Some(group) = self.sync_group.get_mut() {
            group.signal();
        }
        if let Some(router) = self.router.get_mut() {
            router.signal();
        }
    }
}

/// Cloneable handle to one scheduler instance
#[derive(Clone)]
pub struct StateMachineManager {
    inner: Arc<ManagerInner>,
}

impl StateMachineManager {
    /// Manager with default scheduler settings
    pub fn new(cvt: CvtEngine) -> Self {
        Self::build(cvt, &AutomationConfig::default())
    }

    /// Manager using the scheduler and queue settings of a validated `config`
    pub fn with_config(cvt: CvtEngine, config: &AutomationConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::build(cvt, config))
    }

    fn build(cvt: CvtEngine, config: &AutomationConfig) -> Self {
        let tag_queue = Arc::new(DeliveryQueue::new(config.tags.observer_queue_capacity));
        let observer = TagObserver::new(Arc::clone(&tag_queue));

        Self {
            inner: Arc::new(ManagerInner {
                cvt,
                scheduler: config.scheduler.clone(),
                registry: Arc::new(RwLock::new(Vec::new())),
                tag_queue,
                observer,
                attached: Mutex::new(HashSet::new()),
                attachments: tokio::sync::Mutex::new(()),
                drivers: Mutex::new(HashMap::new()),
                sync_group: Mutex::new(None),
                router: Mutex::new(None),
                sync_wake: Arc::new(Notify::new()),
                started: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn cvt(&self) -> &CvtEngine {
        &self.inner.cvt
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    /// Register a machine; `None` uses the configured default interval.
    ///
    /// Tags the machine declares through [`super::TagSubscriber`] are attached
    /// and routed to it before it is driven for the first time.
    pub async fn append_machine<M: StateMachine>(
        &self,
        machine: M,
        interval: Option<Duration>,
        mode: ExecutionMode,
    ) -> ManagerResult<()> {
        let mut machine: Box<dyn StateMachine> = Box::new(machine);
        let name = machine.name().to_string();
        let interval = interval.unwrap_or_else(|| self.inner.scheduler.default_interval());

        let min_interval = self.inner.scheduler.min_interval();
        if interval.is_zero() || interval < min_interval {
            return Err(ManagerError::InvalidInterval {
                name,
                interval_ms: interval.as_millis() as u64,
                min_interval_ms: min_interval.as_millis() as u64,
            });
        }
        if self.contains(&name) {
            return Err(ManagerError::DuplicateMachine { name });
        }

        let declared = machine
            .as_tag_subscriber()
            .map(|subscriber| subscriber.subscriptions())
            .unwrap_or_default();
        let registration = MachineRegistration::new(
            machine,
            interval,
            mode,
            declared.clone(),
            self.inner.scheduler.machine_inbox_capacity,
        );

        {
            // Held until the registration is visible, so a concurrent drop
            // cannot treat the declared tags as orphaned in between
            let _attachments = self.inner.attachments.lock().await;
            for tag_name in &declared {
                self.attach_locked(tag_name).await?;
            }

            let mut registry = self.inner.registry.write();
            if registry.iter().any(|existing| existing.name() == name) {
                return Err(ManagerError::DuplicateMachine { name });
            }
            registry.push(registration.clone());
        }

        if self.is_started() {
            self.activate(&registration);
        }

        let mode_name = mode.to_string();
        log_machine_operation("append_machine", &name, Some(&mode_name), "registered", None);
        Ok(())
    }

    /// Remove a machine, waiting for any step it is executing to finish
    pub async fn drop_machine(&self, name: &str) -> ManagerResult<()> {
        let registration = {
            let mut registry = self.inner.registry.write();
            let index = registry
                .iter()
                .position(|registration| registration.name() == name)
                .ok_or_else(|| ManagerError::not_found(name))?;
            registry.remove(index)
        };

        let machine = registration.machine();
        {
            let _in_flight = machine.lock().await;
            registration.mark_stopped();
        }

        let driver = self.inner.drivers.lock().remove(name);
        if let Some(driver) = driver {
            driver.stop(name).await;
        }

        self.detach_orphaned(&registration.subscriptions()).await;

        let mode_name = registration.mode().to_string();
        log_machine_operation("drop_machine", name, Some(&mode_name), "stopped", None);
        Ok(())
    }

    pub fn get_machine(&self, name: &str) -> Option<SharedMachine> {
        self.get_registration(name)
            .map(|registration| registration.machine())
    }

    pub fn get_registration(&self, name: &str) -> Option<MachineRegistration> {
        self.inner
            .registry
            .read()
            .iter()
            .find(|registration| registration.name() == name)
            .cloned()
    }

    /// Every registration in registration order
    pub fn get_machines(&self) -> Vec<MachineRegistration> {
        self.inner.registry.read().clone()
    }

    pub fn summary(&self) -> ManagerSummary {
        let state_machines: Vec<String> = self
            .inner
            .registry
            .read()
            .iter()
            .map(|registration| registration.name().to_string())
            .collect();

        ManagerSummary {
            length: state_machines.len(),
            state_machines,
        }
    }

    /// `serialize()` of every machine, in registration order
    pub async fn serialize_machines(&self) -> Vec<Value> {
        let mut serialized = Vec::new();
        for registration in self.get_machines() {
            let machine = registration.machine();
            let machine = machine.lock().await;
            serialized.push(machine.serialize());
        }
        serialized
    }

    pub fn exist_machines(&self) -> bool {
        !self.inner.registry.read().is_empty()
    }

    pub fn machine_state(&self, name: &str) -> Option<MachineState> {
        self.get_registration(name)
            .map(|registration| registration.state())
    }

    /// Ask every machine that tracks subscriptions to forget `tag_name`.
    ///
    /// Returns how many machines were told; the rest are skipped.
    pub async fn unsubscribe_tag(&self, tag_name: &str) -> usize {
        let mut unsubscribed = 0;

        for registration in self.get_machines() {
            let machine = registration.machine();
            let mut machine = machine.lock().await;
            if let Some(subscriber) = machine.as_tag_subscriber() {
                subscriber.unsubscribe_to(tag_name);
                registration.remove_subscription(tag_name);
                unsubscribed += 1;
            }
        }

        debug!(
            tag_name = tag_name,
            machines = unsubscribed,
            "Tag unsubscribed"
        );
        unsubscribed
    }

    /// Feed changes of `tag_name` into the manager's shared queue
    pub async fn attach(&self, tag_name: &str) -> ManagerResult<()> {
        let _attachments = self.inner.attachments.lock().await;
        self.attach_locked(tag_name).await
    }

    /// Stop receiving changes of `tag_name`; a no-op when not attached
    pub async fn detach(&self, tag_name: &str) -> ManagerResult<()> {
        let _attachments = self.inner.attachments.lock().await;
        self.detach_locked(tag_name).await
    }

    /// Tags currently attached by this manager, sorted
    pub fn attached_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.inner.attached.lock().iter().cloned().collect();
        tags.sort();
        tags
    }

    /// Route changes of `tag_name` to the machine named `machine_name`
    pub async fn subscribe(&self, machine_name: &str, tag_name: &str) -> ManagerResult<()> {
        let registration = self
            .get_registration(machine_name)
            .ok_or_else(|| ManagerError::not_found(machine_name))?;

        {
            let _attachments = self.inner.attachments.lock().await;
            self.attach_locked(tag_name).await?;
            registration.add_subscription(tag_name);
        }

        let machine = registration.machine();
        let mut machine = machine.lock().await;
        if let Some(subscriber) = machine.as_tag_subscriber() {
            subscriber.subscribe_to(tag_name);
        }

        debug!(
            machine = machine_name,
            tag_name = tag_name,
            "Machine subscribed to tag"
        );
        Ok(())
    }

    /// Spawn the router, the sync group and every async driver.
    ///
    /// Must be called from within a tokio runtime. A manager that has been
    /// shut down cannot be started again.
    pub fn start(&self) {
        if self.inner.shut_down.load(Ordering::Acquire) {
            warn!("State machine manager already shut down, not starting");
            return;
        }
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return;
        }

        *self.inner.router.lock() = Some(scheduler::spawn_router(
            Arc::clone(&self.inner.tag_queue),
            Arc::clone(&self.inner.registry),
            Arc::clone(&self.inner.sync_wake),
        ));
        *self.inner.sync_group.lock() = Some(scheduler::spawn_sync_group(
            Arc::clone(&self.inner.registry),
            self.inner.cvt.clone(),
            Arc::clone(&self.inner.sync_wake),
            self.inner.scheduler.sync_idle_poll(),
        ));

        let machines = self.get_machines();
        for registration in &machines {
            self.activate(registration);
        }

        info!(machines = machines.len(), "State machine manager started");
    }

    /// Stop every driver, close the shared queue and detach from the tag store
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.started.store(false, Ordering::Release);

        let machines = self.get_machines();
        for registration in &machines {
            let machine = registration.machine();
            let _in_flight = machine.lock().await;
            registration.mark_stopped();
        }

        let drivers: Vec<(String, DriverHandle)> = self.inner.drivers.lock().drain().collect();
        for (name, driver) in drivers {
            driver.stop(&name).await;
        }

        let sync_group = self.inner.sync_group.lock().take();
        if let Some(sync_group) = sync_group {
            sync_group.stop("sync_group").await;
        }

        self.inner.tag_queue.close();
        let router = self.inner.router.lock().take();
        if let Some(router) = router {
            router.stop("router").await;
        }

        let _attachments = self.inner.attachments.lock().await;
        for tag_name in self.attached_tags() {
            if let Err(e) = self.detach_locked(&tag_name).await {
                debug!(tag_name = %tag_name, error = %e, "Detach during shutdown failed");
            }
        }
        self.inner.attached.lock().clear();

        info!(machines = machines.len(), "State machine manager shut down");
    }

    fn contains(&self, name: &str) -> bool {
        self.inner
            .registry
            .read()
            .iter()
            .any(|registration| registration.name() == name)
    }

    /// Caller holds `attachments`
    async fn attach_locked(&self, tag_name: &str) -> ManagerResult<()> {
        if self.inner.attached.lock().contains(tag_name) {
            return Ok(());
        }

        let tag = self.inner.cvt.get_tag_by_name(tag_name).await?;
        self.inner
            .cvt
            .attach_observer(&tag.name, &self.inner.observer)
            .await?;
        self.inner.attached.lock().insert(tag.name.clone());

        debug!(
            tag_name = %tag.name,
            observer_id = %self.inner.observer.id(),
            "Manager attached to tag"
        );
        Ok(())
    }

    /// Caller holds `attachments`
    async fn detach_locked(&self, tag_name: &str) -> ManagerResult<()> {
        if !self.inner.attached.lock().contains(tag_name) {
            return Ok(());
        }

        self.inner
            .cvt
            .detach_observer(tag_name, &self.inner.observer)
            .await?;
        self.inner.attached.lock().remove(tag_name);

        debug!(tag_name = tag_name, "Manager detached from tag");
        Ok(())
    }

    /// Detach each of `tags` that no remaining registration subscribes to
    async fn detach_orphaned(&self, tags: &[String]) {
        let _attachments = self.inner.attachments.lock().await;
        for tag_name in tags {
            let still_routed = self
                .inner
                .registry
                .read()
                .iter()
                .any(|registration| registration.is_subscribed(tag_name));
            if still_routed {
                continue;
            }
            if let Err(e) = self.detach_locked(tag_name).await {
                log_error("state_machine", "detach", &e.to_string(), Some(tag_name.as_str()));
            }
        }
    }

    /// Put a registration under the scheduler of a started manager
    fn activate(&self, registration: &MachineRegistration) {
        match registration.mode() {
            ExecutionMode::Async => {
                let mut drivers = self.inner.drivers.lock();
                if !drivers.contains_key(registration.name()) && !registration.state().is_terminal()
                {
                    drivers.insert(
                        registration.name().to_string(),
                        scheduler::spawn_async_driver(registration.clone(), self.inner.cvt.clone()),
                    );
                }
            }
            ExecutionMode::Sync => self.inner.sync_wake.notify_one(),
        }
    }
}

impl fmt::Debug for StateMachineManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachineManager")
            .field("machines", &self.summary().state_machines)
            .field("attached", &self.attached_tags())
            .field("started", &self.is_started())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{MachineContext, MachineResult, TagSubscriber};
    use crate::tags::{DataType, TagDefinition};

    struct Idle {
        name: String,
        subscriptions: Vec<String>,
    }

    impl Idle {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                subscriptions: Vec::new(),
            }
        }
    }

    #[async_trait::async_trait]
    impl StateMachine for Idle {
        fn name(&self) -> &str {
            &self.name
        }

        fn serialize(&self) -> Value {
            serde_json::json!({ "name": self.name })
        }

        async fn step(&mut self, _ctx: &MachineContext) -> MachineResult {
            Ok(())
        }

        fn as_tag_subscriber(&mut self) -> Option<&mut dyn TagSubscriber> {
            Some(self)
        }
    }

    impl TagSubscriber for Idle {
        fn subscribe_to(&mut self, tag_name: &str) {
            self.subscriptions.push(tag_name.to_string());
        }

        fn unsubscribe_to(&mut self, tag_name: &str) {
            self.subscriptions.retain(|tag| tag != tag_name);
        }

        fn subscriptions(&self) -> Vec<String> {
            self.subscriptions.clone()
        }
    }

    #[tokio::test]
    async fn test_empty_registry_queries() {
        let manager = StateMachineManager::new(CvtEngine::new());
        let summary = manager.summary();
        assert_eq!(summary.length, 0);
        assert!(summary.state_machines.is_empty());
        assert!(!manager.exist_machines());
        assert!(manager.get_machines().is_empty());
        assert!(manager.serialize_machines().await.is_empty());
        assert!(manager.get_machine("pump1").is_none());
    }

    #[tokio::test]
    async fn test_append_rejects_duplicates_and_short_intervals() {
        let manager = StateMachineManager::new(CvtEngine::new());
        manager
            .append_machine(Idle::new("pump1"), None, ExecutionMode::Sync)
            .await
            .unwrap();

        let err = manager
            .append_machine(Idle::new("pump1"), None, ExecutionMode::Async)
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::DuplicateMachine { .. }));

        let err = manager
            .append_machine(
                Idle::new("pump2"),
                Some(Duration::from_millis(1)),
                ExecutionMode::Async,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::InvalidInterval { .. }));

        assert_eq!(manager.summary().state_machines, vec!["pump1"]);
        assert_eq!(manager.machine_state("pump1"), Some(MachineState::Registered));
        assert_eq!(
            manager.get_registration("pump1").unwrap().interval(),
            Duration::from_secs(1)
        );
    }

    #[tokio::test]
    async fn test_drop_missing_machine_is_not_found() {
        let manager = StateMachineManager::new(CvtEngine::new());
        let err = manager.drop_machine("ghost").await.unwrap_err();
        assert_eq!(err, ManagerError::not_found("ghost"));
    }

    #[tokio::test]
    async fn test_attach_unknown_tag_propagates_not_found() {
        let manager = StateMachineManager::new(CvtEngine::new());
        let err = manager.attach("missing").await.unwrap_err();
        assert!(matches!(err, ManagerError::Engine(ref e) if e.is_not_found()));
        assert!(manager.attached_tags().is_empty());
    }

    #[tokio::test]
    async fn test_attach_is_deduplicated_and_detach_reverses_it() {
        let cvt = CvtEngine::new();
        cvt.create_tag(TagDefinition::new("sensor.level", DataType::Float))
            .await
            .unwrap();
        let manager = StateMachineManager::new(cvt);

        manager.attach("sensor.level").await.unwrap();
        manager.attach("sensor.level").await.unwrap();
        assert_eq!(manager.attached_tags(), vec!["sensor.level"]);

        manager.detach("sensor.level").await.unwrap();
        manager.detach("sensor.level").await.unwrap();
        assert!(manager.attached_tags().is_empty());
    }

    #[tokio::test]
    async fn test_declared_subscriptions_are_attached_on_append() {
        let cvt = CvtEngine::new();
        cvt.create_tag(TagDefinition::new("sensor.level", DataType::Float))
            .await
            .unwrap();
        let manager = StateMachineManager::new(cvt);

        let mut machine = Idle::new("pump1");
        machine.subscribe_to("sensor.level");
        manager
            .append_machine(machine, None, ExecutionMode::Async)
            .await
            .unwrap();

        let registration = manager.get_registration("pump1").unwrap();
        assert!(registration.is_subscribed("sensor.level"));
        assert_eq!(manager.attached_tags(), vec!["sensor.level"]);

        assert_eq!(manager.unsubscribe_tag("sensor.level").await, 1);
        assert!(!registration.is_subscribed("sensor.level"));
    }

    #[tokio::test]
    async fn test_with_config_rejects_invalid_scheduler_settings() {
        let mut config = AutomationConfig::default();
        config.scheduler.min_interval_ms = 0;

        let err = StateMachineManager::with_config(CvtEngine::new(), &config).unwrap_err();
        assert!(matches!(
            err,
            crate::config::ConfigurationError::InvalidValue { ref field, .. }
                if field == "scheduler.min_interval_ms"
        ));
    }

    #[tokio::test]
    async fn test_zero_interval_is_always_rejected() {
        let mut config = AutomationConfig::default();
        config.scheduler.min_interval_ms = 0;
        let manager = StateMachineManager::build(CvtEngine::new(), &config);

        for mode in [ExecutionMode::Sync, ExecutionMode::Async] {
            let err = manager
                .append_machine(Idle::new("pump1"), Some(Duration::ZERO), mode)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                ManagerError::InvalidInterval { interval_ms: 0, .. }
            ));
        }
        assert!(!manager.exist_machines());
    }

    #[tokio::test]
    async fn test_drop_detaches_tags_without_remaining_subscribers() {
        let cvt = CvtEngine::new();
        cvt.create_tag(TagDefinition::new("sensor.level", DataType::Float))
            .await
            .unwrap();
        cvt.create_tag(TagDefinition::new("valve.open", DataType::Bool))
            .await
            .unwrap();
        let manager = StateMachineManager::new(cvt.clone());

        let mut pump = Idle::new("pump1");
        pump.subscribe_to("sensor.level");
        pump.subscribe_to("valve.open");
        let mut gauge = Idle::new("gauge");
        gauge.subscribe_to("sensor.level");
        manager
            .append_machine(pump, None, ExecutionMode::Async)
            .await
            .unwrap();
        manager
            .append_machine(gauge, None, ExecutionMode::Sync)
            .await
            .unwrap();

        manager.drop_machine("pump1").await.unwrap();
        assert_eq!(manager.attached_tags(), vec!["sensor.level"]);

        cvt.write("valve.open", true).await.unwrap();
        assert!(manager.inner.tag_queue.is_empty());
        cvt.write("sensor.level", 1.0).await.unwrap();
        assert_eq!(manager.inner.tag_queue.len(), 1);

        manager.drop_machine("gauge").await.unwrap();
        assert!(manager.attached_tags().is_empty());
        cvt.write("sensor.level", 2.0).await.unwrap();
        assert_eq!(manager.inner.tag_queue.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_attach_and_detach_match_the_tag_store() {
        let cvt = CvtEngine::new();
        cvt.create_tag(TagDefinition::new("sensor.level", DataType::Float))
            .await
            .unwrap();
        let manager = StateMachineManager::new(cvt.clone());

        for round in 0..25 {
            let attach = tokio::spawn({
                let manager = manager.clone();
                async move { manager.attach("sensor.level").await }
            });
            let detach = tokio::spawn({
                let manager = manager.clone();
                async move { manager.detach("sensor.level").await }
            });
            attach.await.unwrap().unwrap();
            detach.await.unwrap().unwrap();

            let attached = manager.attached_tags() == vec!["sensor.level"];
            let queued_before = manager.inner.tag_queue.len();
            cvt.write("sensor.level", f64::from(round)).await.unwrap();
            let delivered = manager.inner.tag_queue.len() > queued_before;
            assert_eq!(attached, delivered, "attached set diverged in round {round}");
        }
    }
}

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::machine::StateMachine;
use super::states::{ExecutionMode, MachineState};
use crate::tags::DeliveryQueue;

/// A registered machine; the mutex makes every step single-flight
pub type SharedMachine = Arc<tokio::sync::Mutex<Box<dyn StateMachine>>>;

#[derive(Debug, Default)]
struct MachineCounters {
    steps: AtomicU64,
    notifications: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time execution counters for one machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MachineStats {
    pub steps: u64,
    pub notifications: u64,
    pub errors: u64,
}

/// One `(machine, interval, mode)` entry of the manager's registry.
///
/// Cloning shares the machine, its lifecycle state, routing set and inbox.
#[derive(Clone)]
pub struct MachineRegistration {
    name: String,
    machine: SharedMachine,
    interval: Duration,
    mode: ExecutionMode,
    state: Arc<RwLock<MachineState>>,
    subscriptions: Arc<RwLock<HashSet<String>>>,
    inbox: Arc<DeliveryQueue>,
    counters: Arc<MachineCounters>,
}

impl MachineRegistration {
    pub(crate) fn new(
        machine: Box<dyn StateMachine>,
        interval: Duration,
        mode: ExecutionMode,
        subscriptions: Vec<String>,
        inbox_capacity: usize,
    ) -> Self {
        Self {
            name: machine.name().to_string(),
            machine: Arc::new(tokio::sync::Mutex::new(machine)),
            interval,
            mode,
            state: Arc::new(RwLock::new(MachineState::Registered)),
            subscriptions: Arc::new(RwLock::new(subscriptions.into_iter().collect())),
            inbox: Arc::new(DeliveryQueue::new(inbox_capacity)),
            counters: Arc::new(MachineCounters::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn machine(&self) -> SharedMachine {
        Arc::clone(&self.machine)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn state(&self) -> MachineState {
        *self.state.read()
    }

    /// Tags routed to this machine, sorted
    pub fn subscriptions(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.subscriptions.read().iter().cloned().collect();
        tags.sort();
        tags
    }

    pub fn is_subscribed(&self, tag_name: &str) -> bool {
        self.subscriptions.read().contains(tag_name)
    }

    /// Notifications routed but not yet handed to the machine
    pub fn pending_notifications(&self) -> usize {
        self.inbox.len()
    }

    pub fn stats(&self) -> MachineStats {
        MachineStats {
            steps: self.counters.steps.load(Ordering::Acquire),
            notifications: self.counters.notifications.load(Ordering::Acquire),
            errors: self.counters.errors.load(Ordering::Acquire),
        }
    }

    pub(crate) fn inbox(&self) -> &Arc<DeliveryQueue> {
        &self.inbox
    }

    pub(crate) fn add_subscription(&self, tag_name: &str) {
        self.subscriptions.write().insert(tag_name.to_string());
    }

    pub(crate) fn remove_subscription(&self, tag_name: &str) -> bool {
        self.subscriptions.write().remove(tag_name)
    }

    /// Registered -> Running; a stopped machine stays stopped
    pub(crate) fn mark_running(&self) {
        let mut state = self.state.write();
        if *state == MachineState::Registered {
            *state = MachineState::Running;
        }
    }

    pub(crate) fn mark_stopped(&self) {
        *self.state.write() = MachineState::Stopped;
        self.inbox.close();
    }

    pub(crate) fn record_step(&self) {
        self.counters.steps.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_notification(&self) {
        self.counters.notifications.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_error(&self) {
        self.counters.errors.fetch_add(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for MachineRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineRegistration")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("mode", &self.mode)
            .field("state", &self.state())
            .field("subscriptions", &self.subscriptions())
            .field("stats", &self.stats())
            .finish()
    }
}

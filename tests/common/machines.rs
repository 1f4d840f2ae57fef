use async_trait::async_trait;
use automation_core::state_machine::{MachineContext, MachineResult, StateMachine, TagSubscriber};
use automation_core::tags::{Notification, TagValue};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub enum MachineEvent {
    Step {
        machine: String,
        at: Instant,
    },
    Notification {
        machine: String,
        tag_name: String,
        value: TagValue,
        at: Instant,
    },
}

impl MachineEvent {
    pub fn machine(&self) -> &str {
        match self {
            Self::Step { machine, .. } | Self::Notification { machine, .. } => machine,
        }
    }
}

/// Event log that several machines may share
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<MachineEvent>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event: MachineEvent) {
        self.0.lock().push(event);
    }

    pub fn events(&self) -> Vec<MachineEvent> {
        self.0.lock().clone()
    }

    pub fn steps(&self, machine: &str) -> usize {
        self.0
            .lock()
            .iter()
            .filter(|e| matches!(e, MachineEvent::Step { .. }) && e.machine() == machine)
            .count()
    }

    /// Machine names of every step, in execution order
    pub fn step_order(&self) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter(|e| matches!(e, MachineEvent::Step { .. }))
            .map(|e| e.machine().to_string())
            .collect()
    }

    /// `(tag_name, value, steps taken before it arrived)` for one machine
    pub fn notifications(&self, machine: &str) -> Vec<(String, TagValue, usize)> {
        let mut steps = 0;
        let mut received = Vec::new();
        for event in self.0.lock().iter().filter(|e| e.machine() == machine) {
            match event {
                MachineEvent::Step { .. } => steps += 1,
                MachineEvent::Notification {
                    tag_name, value, ..
                } => received.push((tag_name.clone(), value.clone(), steps)),
            }
        }
        received
    }
}

/// Test machine that records every step and notification it sees
pub struct RecordingMachine {
    name: String,
    log: EventLog,
    step_delay: Option<Duration>,
    fail_steps: bool,
    panic_steps: bool,
    tracks_subscriptions: bool,
    subscriptions: Vec<String>,
}

impl RecordingMachine {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            step_delay: None,
            fail_steps: false,
            panic_steps: false,
            tracks_subscriptions: false,
            subscriptions: Vec::new(),
        }
    }

    /// Each step takes `delay` before completing
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_steps = true;
        self
    }

    /// Each step panics after it is recorded
    pub fn panicking(mut self) -> Self {
        self.panic_steps = true;
        self
    }

    /// Expose the subscription capability, starting with `tags`
    pub fn tracking(mut self, tags: &[&str]) -> Self {
        self.tracks_subscriptions = true;
        self.subscriptions = tags.iter().map(|tag| tag.to_string()).collect();
        self
    }
}

#[async_trait]
impl StateMachine for RecordingMachine {
    fn name(&self) -> &str {
        &self.name
    }

    fn serialize(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "subscriptions": self.subscriptions,
        })
    }

    async fn step(&mut self, _ctx: &MachineContext) -> MachineResult {
        if let Some(delay) = self.step_delay {
            tokio::time::sleep(delay).await;
        }
        self.log.record(MachineEvent::Step {
            machine: self.name.clone(),
            at: Instant::now(),
        });
        if self.panic_steps {
            panic!("{} step panicked", self.name);
        }
        if self.fail_steps {
            return Err(format!("{} step failed", self.name).into());
        }
        Ok(())
    }

    async fn on_notification(
        &mut self,
        notification: Notification,
        _ctx: &MachineContext,
    ) -> MachineResult {
        self.log.record(MachineEvent::Notification {
            machine: self.name.clone(),
            tag_name: notification.tag_name,
            value: notification.value,
            at: Instant::now(),
        });
        Ok(())
    }

    fn as_tag_subscriber(&mut self) -> Option<&mut dyn TagSubscriber> {
        if self.tracks_subscriptions {
            Some(self)
        } else {
            None
        }
    }
}

impl TagSubscriber for RecordingMachine {
    fn subscribe_to(&mut self, tag_name: &str) {
        if !self.subscriptions.iter().any(|tag| tag == tag_name) {
            self.subscriptions.push(tag_name.to_string());
        }
    }

    fn unsubscribe_to(&mut self, tag_name: &str) {
        self.subscriptions.retain(|tag| tag != tag_name);
    }

    fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.clone()
    }
}

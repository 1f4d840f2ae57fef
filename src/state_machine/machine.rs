//! Capability interfaces a state machine exposes to the manager.

use async_trait::async_trait;
use serde_json::Value;

use crate::tags::{CvtEngine, Notification};

/// Outcome of one step or notification; errors are logged, never fatal
pub type MachineResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Handles a machine receives on every step
#[derive(Debug, Clone)]
pub struct MachineContext {
    cvt: CvtEngine,
    machine_name: String,
}

impl MachineContext {
    pub fn new(cvt: CvtEngine, machine_name: impl Into<String>) -> Self {
        Self {
            cvt,
            machine_name: machine_name.into(),
        }
    }

    /// Tag store the machine reads from and writes back to
    pub fn cvt(&self) -> &CvtEngine {
        &self.cvt
    }

    pub fn machine_name(&self) -> &str {
        &self.machine_name
    }
}

/// A machine the manager can schedule.
///
/// The manager serializes every call on one machine: a step and a
/// notification for the same machine never run concurrently.
#[async_trait]
pub trait StateMachine: Send + 'static {
    /// Unique name among the manager's registrations
    fn name(&self) -> &str;

    /// Plain structured summary of the machine
    fn serialize(&self) -> Value;

    /// One interval-driven execution
    async fn step(&mut self, ctx: &MachineContext) -> MachineResult;

    /// React to a change of a subscribed tag, ahead of the next tick
    async fn on_notification(
        &mut self,
        _notification: Notification,
        _ctx: &MachineContext,
    ) -> MachineResult {
        Ok(())
    }

    /// Machines that track tag subscriptions return themselves here
    fn as_tag_subscriber(&mut self) -> Option<&mut dyn TagSubscriber> {
        None
    }
}

/// Optional capability: the machine keeps its own set of subscribed tags
pub trait TagSubscriber: Send {
    fn subscribe_to(&mut self, tag_name: &str);

    fn unsubscribe_to(&mut self, tag_name: &str);

    /// Tags the machine wants routed to it, attached when it is appended
    fn subscriptions(&self) -> Vec<String>;
}

//! # State Machines
//!
//! Scheduling of user-defined state machines against the tag store. A
//! machine is anything implementing [`StateMachine`]; the
//! [`StateMachineManager`] registers it with an interval and an
//! [`ExecutionMode`], drives its steps and routes tag changes to it.

pub mod errors;
pub mod machine;
pub mod manager;
pub mod registration;
mod scheduler;
pub mod states;

pub use errors::{ManagerError, ManagerResult};
pub use machine::{MachineContext, MachineResult, StateMachine, TagSubscriber};
pub use manager::{ManagerSummary, StateMachineManager};
pub use registration::{MachineRegistration, MachineStats, SharedMachine};
pub use states::{ExecutionMode, MachineState};

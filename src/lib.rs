#![allow(clippy::doc_markdown)] // Allow technical terms like SQLite, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Automation Core
//!
//! Concurrency backbone for an industrial automation runtime: serialized
//! access to shared resources, a live tag store with change fan-out, and a
//! scheduler that drives user-defined state machines from timers and tag
//! changes.
//!
//! ## Architecture
//!
//! Every shared resource (the current value table, each database logger)
//! lives inside an [`engine::ActionEngine`]: one worker task owns it and
//! executes queued [`engine::Action`]s strictly in enqueue order. Callers on
//! any task or thread hold cheap cloneable handles.
//!
//! ```text
//!  callers ──► ActionEngine ──► worker ──► CurrentValueTable
//!                                               │ write
//!                                               ▼
//!                              TagObserver ──► DeliveryQueue
//!                                               │
//!                       StateMachineManager ◄───┘ router ──► machine inboxes
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - Action queue engine and handler trait
//! - [`tags`] - Tags, observers and the current value table
//! - [`logger`] - Transactional SQLite loggers behind action engines
//! - [`state_machine`] - Machine capability traits and the scheduler
//! - [`config`] - YAML configuration with environment overrides
//! - [`logging`] - Structured tracing setup
//! - [`error`] - Crate-level error aggregation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use automation_core::state_machine::{ExecutionMode, StateMachineManager};
//! use automation_core::tags::{CvtEngine, DataType, TagDefinition};
//!
//! # async fn example() -> automation_core::Result<()> {
//! automation_core::logging::init_structured_logging();
//!
//! let cvt = CvtEngine::new();
//! cvt.create_tag(TagDefinition::new("sensor.level", DataType::Float))
//!     .await?;
//!
//! let manager = StateMachineManager::new(cvt.clone());
//! manager.attach("sensor.level").await?;
//! manager.start();
//!
//! cvt.write("sensor.level", 42.0).await?;
//!
//! manager.shutdown().await;
//! cvt.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod logger;
pub mod logging;
pub mod state_machine;
pub mod tags;

pub use config::{AutomationConfig, ConfigManager, ConfigurationError};
pub use engine::{Action, ActionEngine, ActionHandler, EngineError, EngineResult, EngineStats};
pub use error::{AutomationError, Result};
pub use logger::{MachinesLogger, MachinesLoggerEngine};
pub use state_machine::{
    ExecutionMode, MachineContext, MachineState, ManagerError, StateMachine, StateMachineManager,
    TagSubscriber,
};
pub use tags::{CvtEngine, DataType, Notification, Tag, TagDefinition, TagObserver, TagValue};

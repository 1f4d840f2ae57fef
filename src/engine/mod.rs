//! # Action Queue Engine
//!
//! Single-worker actor that serializes every operation on a protected
//! resource. Used by the current value table and by every resource logger.
//!
//! ```rust
//! use automation_core::engine::{Action, ActionEngine, ActionHandler, EngineResult};
//! use async_trait::async_trait;
//! use serde_json::{json, Value};
//!
//! struct Counter(i64);
//!
//! #[async_trait]
//! impl ActionHandler for Counter {
//!     type Value = Value;
//!     type Output = Value;
//!
//!     fn resource_name(&self) -> &'static str { "counter" }
//!     fn operations(&self) -> &'static [&'static str] { &["increment"] }
//!
//!     async fn handle(&mut self, _action: Action) -> EngineResult<Value> {
//!         self.0 += 1;
//!         Ok(json!(self.0))
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let engine = ActionEngine::spawn(Counter(0));
//! assert_eq!(engine.submit(Action::new("increment")).await.unwrap(), json!(1));
//! # });
//! ```

pub mod action;
pub mod errors;
pub mod worker;

pub use action::Action;
pub use errors::{EngineError, EngineResult};
pub use worker::{ActionEngine, ActionHandler, EngineStats};

//! # Action Queue Engine
//!
//! Turns concurrent calls from any number of tasks or threads into a single
//! ordered stream of operations against one protected resource. The handler
//! owning the resource lives inside a dedicated worker task; callers only ever
//! hold an [`ActionEngine`] handle and talk to it through [`Action`]s.
//!
//! ## Guarantees
//!
//! - Actions execute in enqueue order, one at a time (total order per engine).
//! - A failed or panicking handler is rolled back and reported to its caller;
//!   the worker keeps serving subsequent actions.
//! - A caller that times out leaves its action queued; the result is discarded.

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::action::Action;
use super::errors::{EngineError, EngineResult};

/// The protected resource behind an [`ActionEngine`].
///
/// Only the engine's worker ever calls these methods, so implementations need
/// no internal synchronization.
#[async_trait]
pub trait ActionHandler: Send + 'static {
    /// Parameter value type carried by actions for this handler
    type Value: Send + fmt::Debug + 'static;
    /// Reply payload returned to callers
    type Output: Send + 'static;

    /// Name used in logs and errors
    fn resource_name(&self) -> &'static str;

    /// Every operation name this handler accepts
    fn operations(&self) -> &'static [&'static str];

    /// Execute one action against the resource
    async fn handle(&mut self, action: Action<Self::Value>) -> EngineResult<Self::Output>;

    /// Undo whatever a failed `handle` call left behind
    async fn rollback(&mut self) {}
}

struct Envelope<H: ActionHandler> {
    action: Action<H::Value>,
    reply: oneshot::Sender<EngineResult<H::Output>>,
    enqueued_at: Instant,
}

enum Message<H: ActionHandler> {
    Execute(Envelope<H>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct EngineCounters {
    submitted: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time counters for one engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub submitted: u64,
    pub processed: u64,
    pub failed: u64,
}

impl EngineStats {
    /// Actions accepted but not yet answered
    pub fn pending(&self) -> u64 {
        self.submitted
            .saturating_sub(self.processed)
            .saturating_sub(self.failed)
    }
}

/// Cloneable handle to a single-worker action queue
pub struct ActionEngine<H: ActionHandler> {
    resource: &'static str,
    sender: mpsc::UnboundedSender<Message<H>>,
    counters: Arc<EngineCounters>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<H: ActionHandler> Clone for ActionEngine<H> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource,
            sender: self.sender.clone(),
            counters: Arc::clone(&self.counters),
            worker: Arc::clone(&self.worker),
        }
    }
}

impl<H: ActionHandler> fmt::Debug for ActionEngine<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionEngine")
            .field("resource", &self.resource)
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<H: ActionHandler> ActionEngine<H> {
    /// Move `handler` into a new worker task and return a handle to it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(handler: H) -> Self {
        let resource = handler.resource_name();
        let (sender, receiver) = mpsc::unbounded_channel();
        let counters = Arc::new(EngineCounters::default());

        let worker = tokio::spawn(run_worker(handler, receiver, Arc::clone(&counters)));

        info!(resource = resource, "Action engine started");

        Self {
            resource,
            sender,
            counters,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    pub fn resource_name(&self) -> &'static str {
        self.resource
    }

    /// Submit an action and wait for the worker to execute it
    pub async fn submit(&self, action: Action<H::Value>) -> EngineResult<H::Output> {
        let reply = self.enqueue(action)?;
        reply.await.map_err(|_| self.closed_error())?
    }

    /// Submit an action, giving up after `timeout`.
    ///
    /// On timeout the action stays queued and runs; its result is dropped.
    pub async fn submit_with_timeout(
        &self,
        action: Action<H::Value>,
        timeout: Duration,
    ) -> EngineResult<H::Output> {
        let operation = action.operation().to_string();
        let reply = self.enqueue(action)?;

        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(self.closed_error()),
            Err(_) => {
                warn!(
                    resource = self.resource,
                    operation = %operation,
                    timeout_ms = timeout.as_millis() as u64,
                    "Caller stopped waiting for queued action"
                );
                Err(EngineError::Timeout {
                    resource: self.resource.to_string(),
                    operation,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Submit from a thread that is not driven by the async runtime.
    ///
    /// Panics if called from within an async execution context, like
    /// `oneshot::Receiver::blocking_recv`.
    pub fn blocking_submit(&self, action: Action<H::Value>) -> EngineResult<H::Output> {
        let reply = self.enqueue(action)?;
        reply.blocking_recv().map_err(|_| self.closed_error())?
    }

    /// Stop accepting actions, let the worker drain what is queued, and wait for it
    pub async fn shutdown(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(Message::Shutdown(ack)).is_ok() {
            let _ = done.await;
        }

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(resource = self.resource, error = %e, "Action engine worker ended abnormally");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            submitted: self.counters.submitted.load(Ordering::Acquire),
            processed: self.counters.processed.load(Ordering::Acquire),
            failed: self.counters.failed.load(Ordering::Acquire),
        }
    }

    fn enqueue(
        &self,
        action: Action<H::Value>,
    ) -> EngineResult<oneshot::Receiver<EngineResult<H::Output>>> {
        let (reply, receiver) = oneshot::channel();
        let envelope = Envelope {
            action,
            reply,
            enqueued_at: Instant::now(),
        };

        self.sender
            .send(Message::Execute(envelope))
            .map_err(|_| self.closed_error())?;
        self.counters.submitted.fetch_add(1, Ordering::AcqRel);

        Ok(receiver)
    }

    fn closed_error(&self) -> EngineError {
        EngineError::Closed {
            resource: self.resource.to_string(),
        }
    }
}

async fn run_worker<H: ActionHandler>(
    mut handler: H,
    mut receiver: mpsc::UnboundedReceiver<Message<H>>,
    counters: Arc<EngineCounters>,
) {
    let resource = handler.resource_name();
    let mut shutdown_acks = Vec::new();

    while let Some(message) = receiver.recv().await {
        match message {
            Message::Execute(envelope) => execute(&mut handler, envelope, &counters).await,
            Message::Shutdown(ack) => {
                debug!(resource = resource, "Shutdown requested, draining queued actions");
                receiver.close();
                shutdown_acks.push(ack);
            }
        }
    }

    info!(
        resource = resource,
        processed = counters.processed.load(Ordering::Acquire),
        failed = counters.failed.load(Ordering::Acquire),
        "Action engine stopped"
    );

    for ack in shutdown_acks {
        let _ = ack.send(());
    }
}

async fn execute<H: ActionHandler>(
    handler: &mut H,
    envelope: Envelope<H>,
    counters: &EngineCounters,
) {
    let resource = handler.resource_name();
    let operation = envelope.action.operation().to_string();
    let queued_us = envelope.enqueued_at.elapsed().as_micros() as u64;

    if !handler.operations().contains(&operation.as_str()) {
        counters.failed.fetch_add(1, Ordering::AcqRel);
        warn!(resource = resource, operation = %operation, "Rejected unknown operation");
        let _ = envelope.reply.send(Err(EngineError::UnknownOperation {
            resource: resource.to_string(),
            operation,
        }));
        return;
    }

    let started = Instant::now();
    let outcome = AssertUnwindSafe(handler.handle(envelope.action))
        .catch_unwind()
        .await;

    let result = match outcome {
        Ok(result) => result,
        Err(panic) => Err(EngineError::HandlerPanicked {
            resource: resource.to_string(),
            operation: operation.clone(),
            message: panic_message(panic.as_ref()),
        }),
    };

    let elapsed_us = started.elapsed().as_micros() as u64;

    match &result {
        Ok(_) => {
            counters.processed.fetch_add(1, Ordering::AcqRel);
            debug!(
                resource = resource,
                operation = %operation,
                queued_us = queued_us,
                elapsed_us = elapsed_us,
                "Action executed"
            );
        }
        Err(error) => {
            handler.rollback().await;
            counters.failed.fetch_add(1, Ordering::AcqRel);
            warn!(
                resource = resource,
                operation = %operation,
                error = %error,
                elapsed_us = elapsed_us,
                "Action failed and was rolled back"
            );
        }
    }

    if envelope.reply.send(result).is_err() {
        debug!(
            resource = resource,
            operation = %operation,
            "Caller no longer waiting, result discarded"
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

//! # Machine Drivers
//!
//! The tasks that move registered machines forward:
//!
//! - the **router** drains the manager's shared queue and forwards each
//!   notification to the inbox of every machine subscribed to its tag;
//! - the **sync group** runs every sync machine on one task, in registration
//!   order, each step to completion before the next;
//! - an **async driver** per async machine owns its own timer.
//!
//! All of them hand pending inbox notifications to a machine before its next
//! tick, and all of them lock the machine for the duration of a call, so
//! ticks never overlap and dropping a machine waits out an in-flight tick.

use futures::FutureExt;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::machine::MachineContext;
use super::registration::MachineRegistration;
use super::states::{ExecutionMode, MachineState};
use crate::logging::log_error;
use crate::tags::{CvtEngine, DeliveryQueue, Notification, PushOutcome};

pub(crate) type Registry = Arc<RwLock<Vec<MachineRegistration>>>;

/// A spawned driver task and the signal that stops it
#[derive(Debug)]
pub(crate) struct DriverHandle {
    stop: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl DriverHandle {
    fn spawn<F>(build: impl FnOnce(Arc<Notify>) -> F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let stop = Arc::new(Notify::new());
        let handle = tokio::spawn(build(Arc::clone(&stop)));
        Self { stop, handle }
    }

    /// Ask the task to exit without waiting for it
    pub(crate) fn signal(&self) {
        // notify_one stores a permit if the task is not waiting yet
        self.stop.notify_one();
    }

    /// Signal the task and wait for it to finish its current call
    pub(crate) async fn stop(self, name: &str) {
        self.signal();
        if let Err(e) = self.handle.await {
            warn!(driver = name, error = %e, "Driver task ended abnormally");
        }
    }
}

pub(crate) fn spawn_router(
    queue: Arc<DeliveryQueue>,
    registry: Registry,
    sync_wake: Arc<Notify>,
) -> DriverHandle {
    DriverHandle::spawn(move |stop| run_router(queue, registry, sync_wake, stop))
}

pub(crate) fn spawn_sync_group(
    registry: Registry,
    cvt: CvtEngine,
    wake: Arc<Notify>,
    idle_poll: Duration,
) -> DriverHandle {
    DriverHandle::spawn(move |stop| run_sync_group(registry, cvt, wake, stop, idle_poll))
}

pub(crate) fn spawn_async_driver(registration: MachineRegistration, cvt: CvtEngine) -> DriverHandle {
    DriverHandle::spawn(move |stop| run_async_driver(registration, cvt, stop))
}

async fn run_router(
    queue: Arc<DeliveryQueue>,
    registry: Registry,
    sync_wake: Arc<Notify>,
    stop: Arc<Notify>,
) {
    debug!("Notification router started");

    loop {
        let notification = tokio::select! {
            biased;
            _ = stop.notified() => break,
            notification = queue.recv() => match notification {
                Some(notification) => notification,
                None => break,
            },
        };

        if route(&notification, &registry) {
            sync_wake.notify_one();
        }
    }

    debug!(dropped = queue.dropped(), "Notification router stopped");
}

/// Forward one notification; true when a sync machine received it
fn route(notification: &Notification, registry: &Registry) -> bool {
    let targets: Vec<MachineRegistration> = registry
        .read()
        .iter()
        .filter(|registration| registration.is_subscribed(&notification.tag_name))
        .cloned()
        .collect();

    let mut wake_sync = false;
    for registration in targets {
        match registration.inbox().push(notification.clone()) {
            PushOutcome::Queued => {}
            PushOutcome::DroppedOldest => warn!(
                machine = registration.name(),
                tag_name = %notification.tag_name,
                "Machine inbox full, oldest notification dropped"
            ),
            PushOutcome::Closed => continue,
        }
        if registration.mode() == ExecutionMode::Sync {
            wake_sync = true;
        }
    }

    trace!(tag_name = %notification.tag_name, "Notification routed");
    wake_sync
}

async fn run_async_driver(registration: MachineRegistration, cvt: CvtEngine, stop: Arc<Notify>) {
    let ctx = MachineContext::new(cvt, registration.name());
    let mut ticker = tokio::time::interval(registration.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        machine = registration.name(),
        interval_ms = registration.interval().as_millis() as u64,
        "Async machine driver started"
    );

    loop {
        let keep_running = tokio::select! {
            biased;
            _ = stop.notified() => false,
            notification = registration.inbox().recv() => match notification {
                Some(notification) => deliver(&registration, notification, &ctx).await,
                None => false,
            },
            _ = ticker.tick() => run_step(&registration, &ctx).await,
        };

        if !keep_running {
            break;
        }
    }

    info!(machine = registration.name(), "Async machine driver stopped");
}

async fn run_sync_group(
    registry: Registry,
    cvt: CvtEngine,
    wake: Arc<Notify>,
    stop: Arc<Notify>,
    idle_poll: Duration,
) {
    let mut next_due: HashMap<String, Instant> = HashMap::new();

    info!("Sync machine group started");

    loop {
        let machines: Vec<MachineRegistration> = registry
            .read()
            .iter()
            .filter(|registration| registration.mode() == ExecutionMode::Sync)
            .cloned()
            .collect();
        next_due.retain(|name, _| machines.iter().any(|m| m.name() == name.as_str()));

        // Machines due at the start of the pass all run in this pass
        let pass_started = Instant::now();

        for registration in &machines {
            let ctx = MachineContext::new(cvt.clone(), registration.name());

            while let Some(notification) = registration.inbox().try_recv() {
                if !deliver(registration, notification, &ctx).await {
                    break;
                }
            }

            let due = *next_due
                .entry(registration.name().to_string())
                .or_insert(pass_started);
            if pass_started < due {
                continue;
            }

            run_step(registration, &ctx).await;

            let finished = Instant::now();
            let mut next = due + registration.interval();
            if next <= finished {
                next = finished + registration.interval();
            }
            next_due.insert(registration.name().to_string(), next);
        }

        let wake_at = next_due
            .values()
            .min()
            .copied()
            .unwrap_or_else(|| Instant::now() + idle_poll);

        tokio::select! {
            biased;
            _ = stop.notified() => break,
            _ = wake.notified() => {}
            _ = tokio::time::sleep_until(wake_at) => {}
        }
    }

    info!("Sync machine group stopped");
}

/// Run one interval step; false once the machine has been stopped
async fn run_step(registration: &MachineRegistration, ctx: &MachineContext) -> bool {
    let machine = registration.machine();
    let mut machine = machine.lock().await;
    if registration.state() == MachineState::Stopped {
        return false;
    }
    registration.mark_running();

    let started = Instant::now();
    let outcome = AssertUnwindSafe(machine.step(ctx)).catch_unwind().await;

    match outcome {
        Ok(Ok(())) => {
            registration.record_step();
            trace!(
                machine = registration.name(),
                elapsed_us = started.elapsed().as_micros() as u64,
                "Machine step completed"
            );
        }
        Ok(Err(e)) => {
            registration.record_step();
            registration.record_error();
            warn!(machine = registration.name(), error = %e, "Machine step failed");
        }
        Err(panic) => {
            registration.record_error();
            log_error(
                "state_machine",
                "step",
                &panic_message(panic.as_ref()),
                Some(registration.name()),
            );
        }
    }
    true
}

/// Hand one notification to the machine; false once it has been stopped
async fn deliver(
    registration: &MachineRegistration,
    notification: Notification,
    ctx: &MachineContext,
) -> bool {
    let machine = registration.machine();
    let mut machine = machine.lock().await;
    if registration.state() == MachineState::Stopped {
        return false;
    }
    registration.mark_running();

    let tag_name = notification.tag_name.clone();
    let outcome = AssertUnwindSafe(machine.on_notification(notification, ctx))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => registration.record_notification(),
        Ok(Err(e)) => {
            registration.record_notification();
            registration.record_error();
            warn!(
                machine = registration.name(),
                tag_name = %tag_name,
                error = %e,
                "Machine failed to handle notification"
            );
        }
        Err(panic) => {
            registration.record_error();
            let context = format!("{} <- {tag_name}", registration.name());
            log_error(
                "state_machine",
                "on_notification",
                &panic_message(panic.as_ref()),
                Some(&context),
            );
        }
    }
    true
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

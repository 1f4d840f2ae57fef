//! # Tag Observers
//!
//! Notifications leave the current value table by value and land in a
//! [`DeliveryQueue`] owned by the subscriber. Pushing never blocks the
//! table's worker: when a queue is full its oldest entry is evicted.
//!
//! ```text
//!  write("sensor.level", 42)
//!        │
//!        ├──► observer A ──► [DeliveryQueue A] ──► consumer A
//!        └──► observer B ──► [DeliveryQueue B] ──► consumer B
//! ```

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

use super::tag::{DataType, TagValue};

/// Copy of a tag's state right after a successful write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub tag_name: String,
    pub value: TagValue,
    pub data_type: DataType,
    pub timestamp: DateTime<Utc>,
}

/// Result of pushing onto a [`DeliveryQueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queue was full; the oldest entry was evicted to make room
    DroppedOldest,
    /// Queue was closed; the notification was discarded
    Closed,
}

/// Bounded FIFO of notifications with drop-oldest overflow
pub struct DeliveryQueue {
    entries: Mutex<VecDeque<Notification>>,
    capacity: usize,
    available: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl DeliveryQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            available: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue without blocking
    pub fn push(&self, notification: Notification) -> PushOutcome {
        if self.closed.load(Ordering::Acquire) {
            return PushOutcome::Closed;
        }

        let outcome = {
            let mut entries = self.entries.lock();
            let outcome = if entries.len() >= self.capacity {
                entries.pop_front();
                self.dropped.fetch_add(1, Ordering::AcqRel);
                PushOutcome::DroppedOldest
            } else {
                PushOutcome::Queued
            };
            entries.push_back(notification);
            outcome
        };

        self.available.notify_one();
        outcome
    }

    pub fn try_recv(&self) -> Option<Notification> {
        self.entries.lock().pop_front()
    }

    /// Wait for the next notification; `None` once closed and empty
    pub async fn recv(&self) -> Option<Notification> {
        loop {
            let available = self.available.notified();

            if let Some(notification) = self.try_recv() {
                return Some(notification);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }

            available.await;
        }
    }

    /// Take every queued notification in FIFO order
    pub fn drain(&self) -> Vec<Notification> {
        self.entries.lock().drain(..).collect()
    }

    /// Stop accepting notifications and wake any waiting consumer
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.available.notify_waiters();
        self.available.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of notifications evicted because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Acquire)
    }
}

impl fmt::Debug for DeliveryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("dropped", &self.dropped())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Subscription handle bound to a delivery queue.
///
/// Two observers are the same subscription when their ids match; cloning an
/// observer keeps its id.
#[derive(Clone)]
pub struct TagObserver {
    id: Uuid,
    queue: Arc<DeliveryQueue>,
}

impl TagObserver {
    pub fn new(queue: Arc<DeliveryQueue>) -> Self {
        Self {
            id: Uuid::new_v4(),
            queue,
        }
    }

    /// Observer with its own private queue
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(Arc::new(DeliveryQueue::new(capacity)))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn queue(&self) -> &Arc<DeliveryQueue> {
        &self.queue
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    pub(crate) fn update(&self, notification: Notification) -> PushOutcome {
        self.queue.push(notification)
    }
}

impl PartialEq for TagObserver {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TagObserver {}

impl fmt::Debug for TagObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagObserver")
            .field("id", &self.id)
            .field("queue", &self.queue)
            .finish()
    }
}

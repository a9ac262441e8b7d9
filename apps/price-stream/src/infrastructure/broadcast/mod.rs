//! Broadcast Hub
//!
//! Single-owner fan-out of price changes to every connected subscriber.
//!
//! # Architecture
//!
//! The `BroadcastHub` runs one control loop that owns the subscriber set
//! outright. Everything else talks to it through a cloneable `HubHandle`
//! over three channels:
//!
//! - **register**: add a subscriber's outbound queue (acknowledged)
//! - **remove**: retire a subscriber and close its queue (idempotent)
//! - **ingress**: price changes from the price makers
//!
//! Each loop iteration handles exactly one ready input, in no fixed
//! priority order. Because only the loop touches the set, it needs no lock.
//!
//! Fan-out never waits on a subscriber: each queue is bounded and drops its
//! oldest event when full. Chronically slow subscribers are evicted by their
//! own write deadline, not by the hub.

mod queue;

pub use queue::{OutboundQueue, PushOutcome};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::BroadcastSettings;
use crate::domain::pricing::PriceChanged;
use crate::infrastructure::metrics;

// =============================================================================
// Identifiers
// =============================================================================

/// Unique identifier for a registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why a subscriber asked to be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Client closed the connection.
    ClientClosed,
    /// Reading from the transport failed.
    ReadFailed,
    /// Client sent application data on a push-only stream.
    UnexpectedInbound,
    /// Writing to the transport failed.
    WriteFailed,
    /// A write did not finish within the deadline.
    WriteDeadline,
}

impl RemovalReason {
    /// Metric and log label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::ReadFailed => "read_failed",
            Self::UnexpectedInbound => "unexpected_inbound",
            Self::WriteFailed => "write_failed",
            Self::WriteDeadline => "write_deadline",
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Channel and queue sizes for the hub.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastConfig {
    /// Capacity of the price change ingress channel.
    pub ingress_capacity: usize,
    /// Capacity of the register and remove channels.
    pub control_capacity: usize,
    /// Capacity of each subscriber's outbound queue.
    pub queue_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            ingress_capacity: 1024,
            control_capacity: 256,
            queue_capacity: 1,
        }
    }
}

impl From<BroadcastSettings> for BroadcastConfig {
    fn from(settings: BroadcastSettings) -> Self {
        Self {
            ingress_capacity: settings.ingress_capacity,
            control_capacity: settings.control_capacity,
            queue_capacity: settings.queue_capacity,
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
struct HubCounters {
    running: AtomicBool,
    subscribers: AtomicUsize,
    events_published: AtomicU64,
    events_replaced: AtomicU64,
    subscribers_removed: AtomicU64,
}

/// Point-in-time view of the hub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Whether the control loop is running.
    pub running: bool,
    /// Live subscribers.
    pub subscribers: usize,
    /// Price changes fanned out since start.
    pub events_published: u64,
    /// Queued events dropped to make room for newer ones.
    pub events_replaced: u64,
    /// Subscribers retired since start.
    pub subscribers_removed: u64,
}

// =============================================================================
// Handle
// =============================================================================

#[derive(Debug)]
struct Registration {
    id: SubscriberId,
    queue: Arc<OutboundQueue>,
    ack: oneshot::Sender<()>,
}

#[derive(Debug)]
struct Removal {
    id: SubscriberId,
    reason: RemovalReason,
}

/// Hub errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The control loop has stopped.
    #[error("broadcast hub is not running")]
    Closed,
}

/// Cloneable entry point to a running hub.
#[derive(Debug, Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<Registration>,
    remove_tx: mpsc::Sender<Removal>,
    ingress_tx: mpsc::Sender<PriceChanged>,
    counters: Arc<HubCounters>,
    queue_capacity: usize,
}

impl HubHandle {
    /// Create an outbound queue sized for this hub.
    #[must_use]
    pub fn new_queue(&self) -> Arc<OutboundQueue> {
        Arc::new(OutboundQueue::new(self.queue_capacity))
    }

    /// Add `queue` to the live set.
    ///
    /// Resolves once the hub has applied the registration, so a later
    /// `remove` for the returned id can never overtake it.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Closed` if the hub has stopped.
    pub async fn register(&self, queue: Arc<OutboundQueue>) -> Result<SubscriberId, HubError> {
        let id = SubscriberId::new();
        let (ack, acked) = oneshot::channel();
        self.register_tx
            .send(Registration { id, queue, ack })
            .await
            .map_err(|_| HubError::Closed)?;
        acked.await.map_err(|_| HubError::Closed)?;
        Ok(id)
    }

    /// Ask the hub to retire a subscriber.
    ///
    /// Removing an unknown or already-retired subscriber is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Closed` if the hub has stopped.
    pub async fn remove(&self, id: SubscriberId, reason: RemovalReason) -> Result<(), HubError> {
        self.remove_tx
            .send(Removal { id, reason })
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Submit a price change for fan-out.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Closed` if the hub has stopped.
    pub async fn publish(&self, event: PriceChanged) -> Result<(), HubError> {
        self.ingress_tx
            .send(event)
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Sender half of the ingress channel, for price makers.
    #[must_use]
    pub fn ingress(&self) -> mpsc::Sender<PriceChanged> {
        self.ingress_tx.clone()
    }

    /// Current hub statistics.
    #[must_use]
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            running: self.counters.running.load(Ordering::Acquire),
            subscribers: self.counters.subscribers.load(Ordering::Acquire),
            events_published: self.counters.events_published.load(Ordering::Relaxed),
            events_replaced: self.counters.events_replaced.load(Ordering::Relaxed),
            subscribers_removed: self.counters.subscribers_removed.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Hub
// =============================================================================

/// Owner of the live subscriber set.
#[derive(Debug)]
pub struct BroadcastHub {
    subscribers: HashMap<SubscriberId, Arc<OutboundQueue>>,
    register_rx: mpsc::Receiver<Registration>,
    remove_rx: mpsc::Receiver<Removal>,
    ingress_rx: mpsc::Receiver<PriceChanged>,
    counters: Arc<HubCounters>,
}

impl BroadcastHub {
    /// Create a hub and the handle used to reach it.
    ///
    /// The hub does nothing until [`run`](Self::run) is awaited.
    #[must_use]
    pub fn new(config: BroadcastConfig) -> (Self, HubHandle) {
        let (register_tx, register_rx) = mpsc::channel(config.control_capacity.max(1));
        let (remove_tx, remove_rx) = mpsc::channel(config.control_capacity.max(1));
        let (ingress_tx, ingress_rx) = mpsc::channel(config.ingress_capacity.max(1));
        let counters = Arc::new(HubCounters::default());

        let hub = Self {
            subscribers: HashMap::new(),
            register_rx,
            remove_rx,
            ingress_rx,
            counters: Arc::clone(&counters),
        };
        let handle = HubHandle {
            register_tx,
            remove_tx,
            ingress_tx,
            counters,
            queue_capacity: config.queue_capacity,
        };
        (hub, handle)
    }

    /// Run the control loop until cancelled or every ingress sender is dropped.
    ///
    /// On exit every remaining subscriber queue is closed.
    pub async fn run(mut self, cancel: CancellationToken) {
        self.counters.running.store(true, Ordering::Release);
        tracing::info!("Broadcast hub started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("Broadcast hub cancelled");
                    break;
                }
                Some(registration) = self.register_rx.recv() => self.register(registration),
                Some(removal) = self.remove_rx.recv() => self.remove(removal),
                event = self.ingress_rx.recv() => match event {
                    Some(event) => self.publish(event),
                    None => break,
                },
            }
        }

        self.shutdown();
    }

    fn register(&mut self, registration: Registration) {
        let Registration { id, queue, ack } = registration;
        self.subscribers.insert(id, queue);
        self.sync_subscriber_count();
        tracing::info!(
            subscriber = %id,
            subscribers = self.subscribers.len(),
            "Subscriber registered"
        );
        // Caller may have given up waiting; its connection will never remove.
        if ack.send(()).is_err() {
            self.remove(Removal {
                id,
                reason: RemovalReason::ClientClosed,
            });
        }
    }

    fn remove(&mut self, removal: Removal) {
        let Removal { id, reason } = removal;
        let Some(queue) = self.subscribers.remove(&id) else {
            tracing::debug!(
                subscriber = %id,
                reason = reason.as_str(),
                "Subscriber already retired"
            );
            return;
        };

        self.counters
            .subscribers_removed
            .fetch_add(1, Ordering::Relaxed);
        self.sync_subscriber_count();
        queue.close();
        metrics::record_subscriber_removed(reason.as_str());
        tracing::info!(
            subscriber = %id,
            reason = reason.as_str(),
            subscribers = self.subscribers.len(),
            "Subscriber removed"
        );
    }

    fn publish(&mut self, event: PriceChanged) {
        let started = Instant::now();
        let event = Arc::new(event);

        let mut replaced = 0_u64;
        for queue in self.subscribers.values() {
            if queue.push(Arc::clone(&event)) == PushOutcome::ReplacedOldest {
                replaced += 1;
            }
        }

        self.counters
            .events_published
            .fetch_add(1, Ordering::Relaxed);
        if replaced > 0 {
            self.counters
                .events_replaced
                .fetch_add(replaced, Ordering::Relaxed);
            metrics::record_events_replaced(replaced);
        }
        metrics::record_event_published();
        metrics::record_fanout_duration(started.elapsed());

        tracing::trace!(
            asset = %event.asset,
            value = %event.value,
            subscribers = self.subscribers.len(),
            replaced,
            "Price change fanned out"
        );
    }

    fn shutdown(&mut self) {
        for queue in self.subscribers.values() {
            queue.close();
        }
        self.subscribers.clear();
        self.sync_subscriber_count();
        self.counters.running.store(false, Ordering::Release);
        tracing::info!("Broadcast hub stopped");
    }

    fn sync_subscriber_count(&self) {
        let count = self.subscribers.len();
        self.counters.subscribers.store(count, Ordering::Release);
        metrics::set_subscribers(count);
    }
}

// =============================================================================
// Tests
// =============================================================================

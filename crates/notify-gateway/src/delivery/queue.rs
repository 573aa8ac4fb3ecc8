//! Delivery event queue
//!
//! Control-plane calls record what they did as [`DeliveryEvent`]s on a bounded
//! channel. A single worker drains it into counters and structured logs, so the
//! request path never waits on bookkeeping. When the channel is full the event is
//! dropped and counted.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What kind of control-plane call produced the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
    User,
    Users,
    Room,
    Disconnect,
}

/// Outcome of one control-plane call
#[derive(Debug, Clone)]
pub struct DeliveryEvent {
    pub kind: DeliveryKind,
    /// User id, room id, or a comma-joined user list
    pub target: String,
    pub event_type: Option<String>,
    /// Connections the call addressed
    pub recipients: usize,
    /// Connections whose outbound queue accepted the frame
    pub sent: usize,
    pub at: DateTime<Utc>,
}

impl DeliveryEvent {
    #[must_use]
    pub fn new(
        kind: DeliveryKind,
        target: impl Into<String>,
        event_type: Option<&str>,
        recipients: usize,
        sent: usize,
    ) -> Self {
        Self {
            kind,
            target: target.into(),
            event_type: event_type.map(str::to_string),
            recipients,
            sent,
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    recorded: AtomicU64,
    dropped: AtomicU64,
    messages_emitted: AtomicU64,
    send_failures: AtomicU64,
}

/// Snapshot of the queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStats {
    /// Events processed by the worker
    pub recorded: u64,
    /// Events discarded because the queue was full or closed
    pub dropped: u64,
    /// Frames accepted by connection queues, summed over recorded events
    pub messages_emitted: u64,
    /// Per-recipient send failures, summed over recorded events
    pub send_failures: u64,
}

/// Bounded queue of delivery events with a draining worker
#[derive(Debug)]
pub struct DeliveryQueue {
    sender: Mutex<Option<mpsc::Sender<DeliveryEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl DeliveryQueue {
    /// Create the queue and spawn its worker on the current runtime
    #[must_use]
    pub fn start(capacity: usize) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let worker = tokio::spawn(run_worker(receiver, Arc::clone(&counters)));

        Arc::new(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            counters,
        })
    }

    /// Hand an event to the worker without waiting
    ///
    /// Returns false if the event was dropped.
    pub fn record(&self, event: DeliveryEvent) -> bool {
        let result = match self.sender.lock().as_ref() {
            Some(sender) => sender.try_send(event).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => "full",
                mpsc::error::TrySendError::Closed(_) => "closed",
            }),
            None => Err("closed"),
        };

        match result {
            Ok(()) => true,
            Err(state) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(queue = state, "Delivery event dropped");
                false
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            recorded: self.counters.recorded.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            messages_emitted: self.counters.messages_emitted.load(Ordering::Relaxed),
            send_failures: self.counters.send_failures.load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Close the queue and wait for the worker to drain what is left
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());
        let worker = self.worker.lock().take();

        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Delivery worker panicked");
            }
            tracing::info!(stats = ?self.stats(), "Delivery queue drained");
        }
    }
}

async fn run_worker(mut receiver: mpsc::Receiver<DeliveryEvent>, counters: Arc<Counters>) {
    while let Some(event) = receiver.recv().await {
        counters.recorded.fetch_add(1, Ordering::Relaxed);
        counters
            .messages_emitted
            .fetch_add(event.sent as u64, Ordering::Relaxed);
        counters.send_failures.fetch_add(
            event.recipients.saturating_sub(event.sent) as u64,
            Ordering::Relaxed,
        );

        tracing::info!(
            kind = ?event.kind,
            delivery_target = %event.target,
            event_type = event.event_type.as_deref().unwrap_or(""),
            recipients = event.recipients,
            sent = event.sent,
            at = %event.at,
            "Delivery recorded"
        );
    }
}

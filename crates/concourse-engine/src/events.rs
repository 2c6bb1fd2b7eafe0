//! # Domain Events
//!
//! Everything the engine wants the outside world to know about, from
//! admissions to SLA breaches. The engine never decides how an alert is
//! delivered; it hands events to an [`EventSink`] and moves on.
//!
//! ## Event Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Admission ─┐                                                           │
//! │  Transition ├──► EventSink::publish ──┬──► NoOpSink (default)           │
//! │  Refund    ─┤                         ├──► BroadcastSink ──► dashboard  │
//! │  SLA tick  ─┘                         └──► MemorySink (tests)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sinks are called after the mutation committed and after every record
//! lock is released, so a slow sink cannot stall other orders.

use chrono::{DateTime, Utc};
use concourse_core::{
    CapacitySettings, Money, OrderStatus, RefundRequestStatus, SlaKind,
};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Something that happened inside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    OrderAdmitted {
        order_id: String,
        order_number: String,
        sla_accept_by: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    AdmissionDenied {
        order_number: String,
        reason: String,
        at: DateTime<Utc>,
    },
    OrderTransitioned {
        order_id: String,
        order_number: String,
        from: OrderStatus,
        to: OrderStatus,
        action: String,
        actor: String,
        at: DateTime<Utc>,
    },
    /// A monitored deadline passed while the order was still in its
    /// monitored status. Emitted once per clock.
    SlaBreached {
        order_id: String,
        kind: SlaKind,
        deadline: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    RefundSubmitted {
        refund_id: String,
        order_id: String,
        amount: Money,
        requires_ops_approval: bool,
        status: RefundRequestStatus,
        at: DateTime<Utc>,
    },
    RefundResolved {
        refund_id: String,
        order_id: String,
        status: RefundRequestStatus,
        reviewer: String,
        at: DateTime<Utc>,
    },
    CapacityChanged {
        settings: CapacitySettings,
        changed_by: String,
        at: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::OrderAdmitted { .. } => "order_admitted",
            DomainEvent::AdmissionDenied { .. } => "admission_denied",
            DomainEvent::OrderTransitioned { .. } => "order_transitioned",
            DomainEvent::SlaBreached { .. } => "sla_breached",
            DomainEvent::RefundSubmitted { .. } => "refund_submitted",
            DomainEvent::RefundResolved { .. } => "refund_resolved",
            DomainEvent::CapacityChanged { .. } => "capacity_changed",
        }
    }
}

// =============================================================================
// Event Sink Trait
// =============================================================================

/// Receives domain events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// Discards everything.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn publish(&self, _event: DomainEvent) {}
}

/// Fans events out to any number of async subscribers.
///
/// Slow subscribers lag and lose the oldest events; publishing never waits.
pub struct BroadcastSink {
    tx: broadcast::Sender<DomainEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        BroadcastSink { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, event: DomainEvent) {
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }
}

/// Keeps every event in memory. Handy in tests and the demo harness.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<DomainEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Events with the given [`DomainEvent::name`].
    pub fn named(&self, name: &str) -> Vec<DomainEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.name() == name)
            .collect()
    }
}

impl EventSink for MemorySink {
    fn publish(&self, event: DomainEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

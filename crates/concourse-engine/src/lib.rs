//! # concourse-engine: Fulfillment Runtime for Concourse
//!
//! Owns the order and refund records for one merchant, serializes every
//! mutation per order, and runs the single SLA tick loop.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       FulfillmentEngine (service)                       │
//! │                                                                         │
//! │   staff / runner / ops calls ──► policy::authorize                      │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Admission      │  │ OrderState     │  │ RefundWorkflow         │    │
//! │  │ Controller     │  │ Machine        │  │                        │    │
//! │  │                │  │                │  │ auto-approve ≤ limit   │    │
//! │  │ validate,      │  │ transition     │  │ ops review above it    │    │
//! │  │ reserve slot   │  │ graph + audit  │  │                        │    │
//! │  └───────┬────────┘  └───────┬────────┘  └───────────┬────────────┘    │
//! │          │                   │                       │                  │
//! │          ▼                   ▼                       ▼                  │
//! │  ┌────────────────┐  ┌─────────────────────────────────────────────┐   │
//! │  │ Capacity       │  │ OrderRepository (per-order Mutex records)   │   │
//! │  │ Controller     │  └─────────────────────────────────────────────┘   │
//! │  │ (atomic queue) │  ┌─────────────────────────────────────────────┐   │
//! │  └────────────────┘  │ SlaClockEngine ◄── SlaScheduler (1 Hz task) │   │
//! │                      └─────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  EVENTS (EventSink): order_admitted, admission_denied,                 │
//! │  order_transitioned, sla_breached, refund_submitted,                   │
//! │  refund_resolved, capacity_changed                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`service`] - `FulfillmentEngine` facade and builder
//! - [`admission`] - Admission Controller
//! - [`state_machine`] - Order State Machine
//! - [`refund`] - Refund Workflow
//! - [`sla_clock`] - SLA Clock Engine and scheduler
//! - [`capacity`] - Queue counter and store status
//! - [`repository`] - Order and refund storage
//! - [`ingestion`] - Inbound "order submitted" adapter
//! - [`policy`] - Roles and capability checks
//! - [`events`] - Domain events and sinks
//! - [`clock`] - Injectable time source
//! - [`config`] - Engine configuration
//! - [`error`] - Engine error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use concourse_engine::{EngineConfig, FulfillmentEngine, Actor, Role};
//!
//! let engine = FulfillmentEngine::new(EngineConfig::load_or_default(None))?;
//! let scheduler = engine.spawn_scheduler();
//!
//! let staff = Actor::new("staff-1", "Sam", Role::Staff);
//! let order = engine.submit_order(submission, &staff)?;
//! engine.accept_order(&order.id, &staff)?;
//!
//! scheduler.shutdown().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod admission;
pub mod capacity;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod ingestion;
pub mod policy;
pub mod refund;
pub mod repository;
pub mod service;
pub mod sla_clock;
pub mod state_machine;

// =============================================================================
// Re-exports
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use events::{BroadcastSink, DomainEvent, EventSink, MemorySink, NoOpSink};
pub use ingestion::{IngestionAdapter, PumpStats};
pub use policy::{Actor, Capability, Role};
pub use repository::{OrderFilter, RefundFilter};
pub use service::{FulfillmentEngine, FulfillmentEngineBuilder};
pub use sla_clock::{ClockView, SlaSchedulerHandle};

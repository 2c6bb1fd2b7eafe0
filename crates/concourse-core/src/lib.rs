//! # concourse-core: Pure Business Logic for Concourse
//!
//! This crate holds the rules of the merchant order fulfillment lifecycle as
//! pure functions over plain data. Nothing here reads the clock, takes a lock
//! or performs I/O; callers pass `now` in.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Concourse Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        Collaborators (staff dashboard, runner devices, POS)      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ synchronous calls                      │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │      concourse-engine (repository, admission, SLA scheduler)    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ concourse-core (THIS CRATE) ★                   │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │ lifecycle │  │    sla    │  │  reasons  │  │   │
//! │  │   │   Order   │  │ transition│  │  urgency  │  │ reject /  │  │   │
//! │  │   │  Refund   │  │   graph   │  │  snapshot │  │  refund   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO LOCKS • NO WALL CLOCK • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Order, RefundRequest, CapacitySettings, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`lifecycle`] - Order transition graph and event-log discipline
//! - [`sla`] - Deadline urgency classification
//! - [`reasons`] - Reject and refund reason-code taxonomy
//! - [`validation`] - Intake and refund validation
//! - [`error`] - Domain error taxonomy
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use concourse_core::sla::{SlaSnapshot, UrgencyLevel};
//!
//! let now = Utc::now();
//! let deadline = now + Duration::seconds(45);
//!
//! let snapshot = SlaSnapshot::compute(deadline, now, 90);
//! assert_eq!(snapshot.urgency_level, UrgencyLevel::Warning);
//! assert!(!snapshot.is_expired);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod lifecycle;
pub mod money;
pub mod reasons;
pub mod sla;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use lifecycle::OrderAction;
pub use money::Money;
pub use reasons::{ReasonCode, RefundReason, RejectReason};
pub use sla::{SlaKind, SlaSnapshot, UrgencyLevel};
pub use types::*;
pub use validation::ValidationResult;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default acceptance window: a merchant has 90 seconds to accept a new order.
pub const DEFAULT_ACCEPTANCE_WINDOW_SECS: i64 = 90;

/// Default delivery window: 30 minutes from admission to handoff at the gate.
pub const DEFAULT_DELIVERY_WINDOW_SECS: i64 = 1800;

/// Refunds strictly above this amount need ops review (100.00 currency units).
pub const DEFAULT_OPS_APPROVAL_THRESHOLD: Money = Money::from_cents(10_000);

/// Reviewer recorded on refunds that were approved without ops review.
pub const AUTO_REVIEWER: &str = "auto";

/// Maximum line items accepted in a single order.
pub const MAX_ORDER_ITEMS: usize = 100;

/// Maximum quantity of a single line item.
pub const MAX_ITEM_QUANTITY: u32 = 999;

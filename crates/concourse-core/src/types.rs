//! # Domain Types
//!
//! Core domain types shared by the engine and every collaborator.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Order       │   │   OrderItem     │   │  RefundRequest  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │◄──│  quantity ≥ 1   │   │  id (UUID)      │       │
//! │  │  order_number   │   │  unit_price     │   │  order_id (FK)  │       │
//! │  │  status         │   │  modifiers      │   │  amount         │       │
//! │  │  event_log      │   │  status         │   │  status         │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  OrderStatus    │   │  StoreStatus    │   │CapacitySettings │       │
//! │  │  new → ... →    │   │  open           │   │  queue length   │       │
//! │  │  delivered      │   │  busy           │   │  max queue      │       │
//! │  │  + failure /    │   │  closed         │   │  prep time      │       │
//! │  │    refund exits │   └─────────────────┘   └─────────────────┘       │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! - `id`: UUID v4, immutable, used for all references
//! - `order_number`: human-readable ("GC-0412"), unique per merchant

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::reasons::{RefundReason, RejectReason};

// =============================================================================
// Order Status
// =============================================================================

/// Where an order sits in the fulfillment lifecycle.
///
/// ```text
///  new ──► accepted ──► preparing ──► ready ──► in_transit ──► delivered
///   │          │            │           │            │
///   ├──► rejected           └───────────┴────────────┴──► failed
///   │
///   └── any non-terminal ──► refund_requested ──► refunded
///                                   │
///                                   └──(declined)──► prior status
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, Default)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    New,
    Accepted,
    Preparing,
    Ready,
    InTransit,
    Delivered,
    Rejected,
    Failed,
    RefundRequested,
    Refunded,
}

impl OrderStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered
                | OrderStatus::Rejected
                | OrderStatus::Failed
                | OrderStatus::Refunded
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Failed => "failed",
            OrderStatus::RefundRequested => "refund_requested",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Order Items
// =============================================================================

/// Per-item availability as tracked by the kitchen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Default)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Available,
    OutOfStock,
    Substituted,
    #[default]
    Pending,
}

/// A paid add-on or change to a line item ("extra shot", "no onions").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Modifier {
    pub name: String,
    /// May be zero or negative ("no cheese, -0.50").
    pub price_delta: Money,
}

/// A line item in an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderItem {
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

impl OrderItem {
    /// Unit price plus every modifier delta. `None` on overflow.
    pub fn unit_price_with_modifiers(&self) -> Option<Money> {
        self.modifiers
            .iter()
            .try_fold(self.unit_price, |acc, m| acc.checked_add(m.price_delta))
    }

    /// (unit price + modifiers) × quantity. `None` on overflow.
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price_with_modifiers()?
            .checked_mul_quantity(self.quantity)
    }
}

// =============================================================================
// Order Attributes
// =============================================================================

/// Where the runner hands the order over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Destination {
    pub gate: String,
    #[serde(default)]
    pub zone: Option<String>,
}

/// Payment state as reported by the order source. Recorded, never acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Authorized,
    Captured,
    Failed,
}

/// Which kind of producer submitted the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderChannel {
    PointOfSale,
    PassengerApp,
    Synthetic,
}

/// Refund state mirrored onto the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Default)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    #[default]
    None,
    PendingApproval,
    Approved,
    Declined,
}

/// One audit record. Never edited or removed once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct EventLogEntry {
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub details: Option<String>,
}

// =============================================================================
// Order Submission (inbound payload)
// =============================================================================

/// The "order submitted" message: the full order shape minus the fields the
/// core assigns (`id`, deadlines, `status`, timestamps, event log).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderSubmission {
    pub order_number: String,
    pub channel: OrderChannel,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    #[serde(default)]
    pub discount: Money,
    #[serde(default)]
    pub service_fee: Money,
    pub total: Money,
    pub destination: Destination,
    pub payment_status: PaymentStatus,
}

impl OrderSubmission {
    /// Σ line totals. `None` when the payload's amounts overflow.
    pub fn computed_subtotal(&self) -> Option<Money> {
        self.items
            .iter()
            .try_fold(Money::zero(), |acc, item| acc.checked_add(item.line_total()?))
    }

    /// subtotal − discount + service_fee. `None` on overflow.
    pub fn computed_total(&self) -> Option<Money> {
        self.subtotal
            .checked_sub(self.discount)?
            .checked_add(self.service_fee)
    }
}

// =============================================================================
// Order
// =============================================================================

/// A merchant order and its full audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub merchant_id: String,
    pub order_number: String,
    pub channel: OrderChannel,
    pub customer_name: Option<String>,
    pub status: OrderStatus,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub preparing_started_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub ready_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub picked_up_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub delivered_at: Option<DateTime<Utc>>,

    #[ts(as = "String")]
    pub sla_accept_by: DateTime<Utc>,
    #[ts(as = "String")]
    pub sla_deliver_by: DateTime<Utc>,

    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub discount: Money,
    pub service_fee: Money,
    pub total: Money,
    pub destination: Destination,
    pub payment_status: PaymentStatus,

    pub reject_reason: Option<RejectReason>,
    pub reject_notes: Option<String>,
    pub failure_details: Option<String>,

    pub refund_status: RefundStatus,
    /// Approved plus pending refund amounts; never exceeds `total`.
    pub refund_committed: Money,
    /// Status to restore if a pending refund is declined.
    pub status_before_refund: Option<OrderStatus>,

    pub runner_id: Option<String>,
    pub runner_name: Option<String>,

    /// True once this order has given its queue slot back.
    pub queue_released: bool,

    pub event_log: Vec<EventLogEntry>,
}

impl Order {
    /// Builds a `new` order from an admitted submission.
    ///
    /// Deadlines are absolute: `now + window`.
    pub fn from_submission(
        id: String,
        merchant_id: impl Into<String>,
        submission: OrderSubmission,
        now: DateTime<Utc>,
        acceptance_window: Duration,
        delivery_window: Duration,
    ) -> Self {
        Order {
            id,
            merchant_id: merchant_id.into(),
            order_number: submission.order_number,
            channel: submission.channel,
            customer_name: submission.customer_name,
            status: OrderStatus::New,
            created_at: now,
            accepted_at: None,
            preparing_started_at: None,
            ready_at: None,
            picked_up_at: None,
            delivered_at: None,
            sla_accept_by: now + acceptance_window,
            sla_deliver_by: now + delivery_window,
            items: submission.items,
            subtotal: submission.subtotal,
            discount: submission.discount,
            service_fee: submission.service_fee,
            total: submission.total,
            destination: submission.destination,
            payment_status: submission.payment_status,
            reject_reason: None,
            reject_notes: None,
            failure_details: None,
            refund_status: RefundStatus::None,
            refund_committed: Money::zero(),
            status_before_refund: None,
            runner_id: None,
            runner_name: None,
            queue_released: false,
            event_log: Vec::new(),
        }
    }

    /// Amount still available for refunds.
    pub fn refundable_balance(&self) -> Money {
        self.total.saturating_sub(self.refund_committed)
    }

    /// Timestamp of the most recent log entry, if any.
    pub fn last_event_at(&self) -> Option<DateTime<Utc>> {
        self.event_log.last().map(|e| e.timestamp)
    }
}

// =============================================================================
// Refund Request
// =============================================================================

/// Resolution state of a single refund request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RefundRequestStatus {
    PendingApproval,
    Approved,
    Declined,
}

impl fmt::Display for RefundRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefundRequestStatus::PendingApproval => f.write_str("pending_approval"),
            RefundRequestStatus::Approved => f.write_str("approved"),
            RefundRequestStatus::Declined => f.write_str("declined"),
        }
    }
}

/// A request to refund part or all of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RefundRequest {
    pub id: String,
    pub order_id: String,
    pub order_number: String,
    pub amount: Money,
    pub reason: RefundReason,
    pub notes: Option<String>,
    pub status: RefundRequestStatus,
    /// Derived from the threshold at submission; not settable by callers.
    pub requires_ops_approval: bool,
    pub requested_by: String,
    #[ts(as = "String")]
    pub requested_at: DateTime<Utc>,
    pub reviewed_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl RefundRequest {
    pub fn is_resolved(&self) -> bool {
        self.status != RefundRequestStatus::PendingApproval
    }

    /// Resolves a pending request. Fails without mutating if already resolved.
    pub fn resolve(
        &mut self,
        approved: bool,
        reviewer: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        if self.is_resolved() {
            return Err(CoreError::invalid_transition(
                "refund",
                self.id.clone(),
                self.status,
                if approved { "approve" } else { "decline" },
            ));
        }

        self.status = if approved {
            RefundRequestStatus::Approved
        } else {
            RefundRequestStatus::Declined
        };
        self.reviewed_by = Some(reviewer.to_string());
        self.reviewed_at = Some(now);
        Ok(())
    }
}

// =============================================================================
// Capacity
// =============================================================================

/// Merchant-set store status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Default)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StoreStatus {
    #[default]
    Open,
    /// Throttle/ranking signal only; does not block admission.
    Busy,
    Closed,
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreStatus::Open => f.write_str("open"),
            StoreStatus::Busy => f.write_str("busy"),
            StoreStatus::Closed => f.write_str("closed"),
        }
    }
}

impl std::str::FromStr for StoreStatus {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(StoreStatus::Open),
            "busy" => Ok(StoreStatus::Busy),
            "closed" => Ok(StoreStatus::Closed),
            other => Err(crate::error::ValidationError::Unknown {
                field: "store status".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Point-in-time view of a merchant's capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CapacitySettings {
    pub current_queue_length: u32,
    pub max_queue_length: u32,
    pub avg_prep_time_minutes: u32,
    pub is_accepting_orders: bool,
    pub store_status: StoreStatus,
}

impl CapacitySettings {
    /// Admission decision, evaluated in order: closed, not accepting, full.
    ///
    /// ```rust
    /// use concourse_core::{CapacitySettings, CoreError, StoreStatus};
    ///
    /// let settings = CapacitySettings {
    ///     current_queue_length: 20,
    ///     max_queue_length: 20,
    ///     avg_prep_time_minutes: 10,
    ///     is_accepting_orders: true,
    ///     store_status: StoreStatus::Busy,
    /// };
    /// assert_eq!(
    ///     settings.check_admission(),
    ///     Err(CoreError::CapacityExceeded { current: 20, max: 20 })
    /// );
    /// ```
    pub fn check_admission(&self) -> CoreResult<()> {
        if self.store_status == StoreStatus::Closed {
            return Err(CoreError::StoreClosed);
        }
        if !self.is_accepting_orders {
            return Err(CoreError::NotAccepting);
        }
        if self.current_queue_length >= self.max_queue_length {
            return Err(CoreError::CapacityExceeded {
                current: self.current_queue_length,
                max: self.max_queue_length,
            });
        }
        Ok(())
    }

    /// Rough wait a new order would see: queue × average prep time.
    pub fn estimated_wait_minutes(&self) -> u32 {
        self.current_queue_length
            .saturating_mul(self.avg_prep_time_minutes)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

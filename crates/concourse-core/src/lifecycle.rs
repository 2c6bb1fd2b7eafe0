//! # Order Lifecycle
//!
//! The order transition graph and the event-log discipline that goes with it.
//!
//! ## Transition Graph
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  from              │ accept  prepare  ready  pick_up  deliver  reject   │
//! │────────────────────┼──────────────────────────────────────────────────  │
//! │  new               │   ✓                                        ✓       │
//! │  accepted          │          ✓                                         │
//! │  preparing         │                   ✓                                │
//! │  ready             │                          ✓                         │
//! │  in_transit        │                                  ✓                 │
//! │                                                                         │
//! │  fail:            any non-terminal → failed                             │
//! │  request refund:  any non-terminal except refund_requested              │
//! │                   → refund_requested (prior status remembered)          │
//! │  approve refund:  refund_requested → refunded                           │
//! │  decline refund:  refund_requested → prior status                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Apply Discipline
//! Every mutation runs in two phases. Phase one checks the edge and the
//! payload and may fail; phase two writes and cannot fail. An order that
//! returns `Err` is therefore untouched: same status, same timestamps, same
//! event log.

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::reasons::RejectReason;
use crate::types::{EventLogEntry, Order, OrderStatus, RefundRequest, RefundRequestStatus, RefundStatus};
use crate::validation;

// =============================================================================
// Order Actions
// =============================================================================

/// A status change requested by staff, a runner, ops or the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderAction {
    Accept,
    Reject {
        reason: RejectReason,
        notes: Option<String>,
    },
    StartPreparing,
    MarkReady,
    PickUp {
        runner_id: String,
        runner_name: String,
    },
    Deliver,
    Fail {
        details: String,
    },
}

impl OrderAction {
    /// Name recorded in the event log.
    pub fn name(&self) -> &'static str {
        match self {
            OrderAction::Accept => "accept",
            OrderAction::Reject { .. } => "reject",
            OrderAction::StartPreparing => "start_preparing",
            OrderAction::MarkReady => "mark_ready",
            OrderAction::PickUp { .. } => "picked_up",
            OrderAction::Deliver => "deliver",
            OrderAction::Fail { .. } => "fail",
        }
    }

    /// Destination status when the action is legal from `from`.
    pub fn target(&self, from: OrderStatus) -> Option<OrderStatus> {
        use OrderStatus::*;

        match (self, from) {
            (OrderAction::Accept, New) => Some(Accepted),
            (OrderAction::Reject { .. }, New) => Some(Rejected),
            (OrderAction::StartPreparing, Accepted) => Some(Preparing),
            (OrderAction::MarkReady, Preparing) => Some(Ready),
            (OrderAction::PickUp { .. }, Ready) => Some(InTransit),
            (OrderAction::Deliver, InTransit) => Some(Delivered),
            (OrderAction::Fail { .. }, s) if !s.is_terminal() => Some(Failed),
            _ => None,
        }
    }

    /// Payload checks that do not depend on the order.
    fn validate(&self) -> CoreResult<()> {
        match self {
            OrderAction::Reject { reason, notes } => {
                validation::validate_reason_notes(
                    reason.code(),
                    reason.requires_notes(),
                    notes.as_deref(),
                )?;
            }
            OrderAction::PickUp {
                runner_id,
                runner_name,
            } => {
                validation::require_non_empty("runner_id", runner_id)?;
                validation::require_non_empty("runner_name", runner_name)?;
            }
            OrderAction::Fail { details } => {
                validation::require_non_empty("failure details", details)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn details(&self) -> Option<String> {
        match self {
            OrderAction::Reject { reason, notes } => Some(match notes {
                Some(n) if !n.trim().is_empty() => format!("{}: {}", reason.code(), n.trim()),
                _ => reason.code().to_string(),
            }),
            OrderAction::PickUp {
                runner_id,
                runner_name,
            } => Some(format!("runner {} ({})", runner_name, runner_id)),
            OrderAction::Fail { details } => Some(details.trim().to_string()),
            _ => None,
        }
    }
}

// =============================================================================
// Order Mutations
// =============================================================================

impl Order {
    /// Applies a status-graph action.
    ///
    /// Returns the status the order left. On error the order is unchanged.
    pub fn apply(
        &mut self,
        action: OrderAction,
        actor: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<OrderStatus> {
        let target = action
            .target(self.status)
            .ok_or_else(|| CoreError::invalid_transition("order", self.id.clone(), self.status, action.name()))?;
        action.validate()?;

        // Nothing below can fail.
        let at = self.next_timestamp(now);
        let name = action.name();
        let details = action.details();
        let previous = self.status;

        match action {
            OrderAction::Accept => set_once(&mut self.accepted_at, at),
            OrderAction::StartPreparing => set_once(&mut self.preparing_started_at, at),
            OrderAction::MarkReady => set_once(&mut self.ready_at, at),
            OrderAction::Deliver => set_once(&mut self.delivered_at, at),
            OrderAction::Reject { reason, notes } => {
                self.reject_reason = Some(reason);
                self.reject_notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
            }
            OrderAction::PickUp {
                runner_id,
                runner_name,
            } => {
                set_once(&mut self.picked_up_at, at);
                self.runner_id = Some(runner_id);
                self.runner_name = Some(runner_name);
            }
            OrderAction::Fail { details } => {
                self.failure_details = Some(details.trim().to_string());
            }
        }

        self.status = target;
        self.push_log(at, actor, name, details);
        Ok(previous)
    }

    /// Records a new refund request against this order.
    ///
    /// On a live order the status moves to `refund_requested`; on a terminal
    /// order only `refund_status` changes. A request that was auto-approved
    /// is resolved immediately, producing a second log entry.
    pub fn open_refund(&mut self, refund: &RefundRequest, now: DateTime<Utc>) -> CoreResult<()> {
        if self.refund_status == RefundStatus::PendingApproval {
            return Err(CoreError::invalid_transition(
                "order",
                self.id.clone(),
                "awaiting refund review",
                "request_refund",
            ));
        }
        validation::validate_refund_amount(refund.amount, self.total, self.refund_committed)?;

        let at = self.next_timestamp(now);
        let details = Some(format!("{} {} ({})", refund.id, refund.amount, refund.reason.code()));

        if !self.status.is_terminal() {
            self.status_before_refund = Some(self.status);
            self.status = OrderStatus::RefundRequested;
        }
        self.refund_status = RefundStatus::PendingApproval;
        self.refund_committed += refund.amount;
        self.push_log(at, &refund.requested_by, "refund_requested", details);

        if refund.status != RefundRequestStatus::PendingApproval {
            self.settle_refund(refund, now)?;
        }
        Ok(())
    }

    /// Mirrors a resolved refund onto the order.
    ///
    /// Approval moves a `refund_requested` order to `refunded`. Decline
    /// restores the status the order had before the request and frees the
    /// committed amount.
    pub fn settle_refund(&mut self, refund: &RefundRequest, now: DateTime<Utc>) -> CoreResult<()> {
        let approved = match refund.status {
            RefundRequestStatus::Approved => true,
            RefundRequestStatus::Declined => false,
            RefundRequestStatus::PendingApproval => {
                return Err(CoreError::invalid_transition(
                    "refund",
                    refund.id.clone(),
                    refund.status,
                    "settle",
                ))
            }
        };
        if self.refund_status != RefundStatus::PendingApproval {
            return Err(CoreError::invalid_transition(
                "order",
                self.id.clone(),
                "not awaiting refund review",
                if approved { "approve_refund" } else { "decline_refund" },
            ));
        }

        let at = self.next_timestamp(now);
        let reviewer = refund.reviewed_by.as_deref().unwrap_or(crate::AUTO_REVIEWER);

        if self.status == OrderStatus::RefundRequested {
            self.status = if approved {
                OrderStatus::Refunded
            } else {
                self.status_before_refund.unwrap_or(OrderStatus::New)
            };
        }
        if approved {
            self.refund_status = RefundStatus::Approved;
        } else {
            self.refund_status = RefundStatus::Declined;
            self.refund_committed = self.refund_committed.saturating_sub(refund.amount);
        }

        let action = if approved { "refund_approved" } else { "refund_declined" };
        self.push_log(at, reviewer, action, Some(refund.id.clone()));
        Ok(())
    }

    /// True exactly once: the first time the order reaches a status that
    /// frees its slot in the active pipeline.
    pub fn take_queue_release(&mut self) -> bool {
        let frees_slot = matches!(
            self.status,
            OrderStatus::Ready | OrderStatus::Rejected | OrderStatus::Failed | OrderStatus::Refunded
        );
        if frees_slot && !self.queue_released {
            self.queue_released = true;
            true
        } else {
            false
        }
    }

    /// Amount approved or awaiting review, for cumulative checks.
    pub fn committed_refunds(&self) -> Money {
        self.refund_committed
    }

    /// `now`, clamped so the log never goes backwards.
    fn next_timestamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.last_event_at() {
            Some(last) if last > now => last,
            _ => now,
        }
    }

    fn push_log(&mut self, at: DateTime<Utc>, actor: &str, action: &str, details: Option<String>) {
        self.event_log.push(EventLogEntry {
            timestamp: at,
            actor: actor.to_string(),
            action: action.to_string(),
            details,
        });
    }
}

fn set_once(slot: &mut Option<DateTime<Utc>>, at: DateTime<Utc>) {
    if slot.is_none() {
        *slot = Some(at);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

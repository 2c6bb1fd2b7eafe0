//! # Refund Workflow
//!
//! Threshold-based auto-approval vs. manual ops review.
//!
//! ## Decision
//! ```text
//! submit(order, amount, reason, notes)
//!      │
//!      ├── notes missing for a notes-required reason ──► ValidationError
//!      ├── amount ≤ 0 or > order total − committed    ──► ValidationError
//!      │
//!      ▼
//! requires_ops_approval = amount > threshold
//!                         OR today's refunds + amount > daily limit (if set)
//!      │
//!      ├── false ──► RefundRequest approved, reviewed_by = "auto"
//!      │             order.refund_status = approved
//!      │
//!      └── true  ──► RefundRequest pending_approval
//!                    order.refund_status = pending_approval
//!                    (waits for approve / decline by ops)
//! ```
//!
//! The order and its refund are updated under the order's lock, with the
//! refund's own lock nested inside, so an order never shows a refund state
//! its request does not.

use std::sync::Arc;

use concourse_core::validation::{validate_reason_notes, validate_refund_amount};
use concourse_core::{
    Money, OrderStatus, RefundReason, RefundRequest, RefundRequestStatus, AUTO_REVIEWER,
};
use tracing::info;
use uuid::Uuid;

use crate::capacity::CapacityController;
use crate::clock::Clock;
use crate::config::{RefundSettings, SlaSettings};
use crate::error::EngineResult;
use crate::events::{DomainEvent, EventSink};
use crate::policy::Actor;
use crate::repository::{lock, OrderRepository};
use crate::sla_clock::SlaClockEngine;
use crate::state_machine::settle_side_effects;

pub struct RefundWorkflow {
    settings: RefundSettings,
    sla: SlaSettings,
    repository: Arc<OrderRepository>,
    capacity: Arc<CapacityController>,
    clocks: Arc<SlaClockEngine>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
}

impl RefundWorkflow {
    pub fn new(
        settings: RefundSettings,
        sla: SlaSettings,
        repository: Arc<OrderRepository>,
        capacity: Arc<CapacityController>,
        clocks: Arc<SlaClockEngine>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        RefundWorkflow {
            settings,
            sla,
            repository,
            capacity,
            clocks,
            clock,
            sink,
        }
    }

    pub fn submit(
        &self,
        order_id: &str,
        amount: Money,
        reason: RefundReason,
        notes: Option<String>,
        requested_by: &Actor,
    ) -> EngineResult<RefundRequest> {
        validate_reason_notes(reason.code(), reason.requires_notes(), notes.as_deref())?;

        // Bounds the amount before it is summed; rechecked under the lock.
        let current = self.repository.get_order(order_id)?;
        validate_refund_amount(amount, current.total, current.committed_refunds())?;

        let now = self.clock.now();
        let over_threshold = amount > self.settings.ops_approval_threshold();
        let over_daily_limit = match self.settings.daily_limit() {
            Some(limit) => self
                .repository
                .refunds_committed_on(now.date_naive())?
                .checked_add(amount)
                .map_or(true, |day_total| day_total > limit),
            None => false,
        };
        let requires_ops_approval = over_threshold || over_daily_limit;

        let (refund, from, to, order_number) = self.repository.with_order_mut(order_id, |order| {
            let mut refund = RefundRequest {
                id: Uuid::new_v4().to_string(),
                order_id: order.id.clone(),
                order_number: order.order_number.clone(),
                amount,
                reason,
                notes: notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
                status: RefundRequestStatus::PendingApproval,
                requires_ops_approval,
                requested_by: requested_by.id.clone(),
                requested_at: now,
                reviewed_by: None,
                reviewed_at: None,
            };
            if !requires_ops_approval {
                refund.resolve(true, AUTO_REVIEWER, now)?;
            }

            let from = order.status;
            order.open_refund(&refund, now)?;
            // Nothing outside the draft changes until the record is stored.
            self.repository.insert_refund(refund.clone())?;
            settle_side_effects(order, from, &self.sla, &self.capacity, &self.clocks)?;

            Ok((refund, from, order.status, order.order_number.clone()))
        })?;

        info!(
            refund_id = %refund.id,
            order_id = %refund.order_id,
            amount = %refund.amount,
            reason = %refund.reason,
            requires_ops_approval,
            over_daily_limit,
            status = %refund.status,
            "Refund submitted"
        );

        self.sink.publish(DomainEvent::RefundSubmitted {
            refund_id: refund.id.clone(),
            order_id: refund.order_id.clone(),
            amount: refund.amount,
            requires_ops_approval,
            status: refund.status,
            at: now,
        });
        if refund.is_resolved() {
            self.publish_resolved(&refund, now);
        }
        if from != to {
            let action = if to == OrderStatus::Refunded {
                "refund_approved"
            } else {
                "refund_requested"
            };
            self.publish_transition(&refund.order_id, &order_number, from, to, action, &requested_by.id, now);
        }

        Ok(refund)
    }

    pub fn approve(&self, refund_id: &str, reviewer: &Actor) -> EngineResult<RefundRequest> {
        self.resolve(refund_id, true, reviewer)
    }

    pub fn decline(&self, refund_id: &str, reviewer: &Actor) -> EngineResult<RefundRequest> {
        self.resolve(refund_id, false, reviewer)
    }

    fn resolve(&self, refund_id: &str, approved: bool, reviewer: &Actor) -> EngineResult<RefundRequest> {
        let record = self.repository.refund_record(refund_id)?;
        let order_id = lock(&record)?.order_id.clone();
        let now = self.clock.now();

        let (refund, from, to, order_number) = self.repository.with_order_mut(&order_id, |order| {
            let mut stored = lock(&record)?;
            let mut draft = stored.clone();
            draft.resolve(approved, &reviewer.id, now)?;

            let from = order.status;
            order.settle_refund(&draft, now)?;
            settle_side_effects(order, from, &self.sla, &self.capacity, &self.clocks)?;

            *stored = draft.clone();
            Ok((draft, from, order.status, order.order_number.clone()))
        })?;

        info!(
            refund_id = %refund.id,
            order_id = %refund.order_id,
            reviewer = %reviewer.id,
            status = %refund.status,
            "Refund resolved"
        );

        self.publish_resolved(&refund, now);
        if from != to {
            let action = if approved { "refund_approved" } else { "refund_declined" };
            self.publish_transition(&refund.order_id, &order_number, from, to, action, &reviewer.id, now);
        }
        Ok(refund)
    }

    fn publish_resolved(&self, refund: &RefundRequest, at: chrono::DateTime<chrono::Utc>) {
        self.sink.publish(DomainEvent::RefundResolved {
            refund_id: refund.id.clone(),
            order_id: refund.order_id.clone(),
            status: refund.status,
            reviewer: refund
                .reviewed_by
                .clone()
                .unwrap_or_else(|| AUTO_REVIEWER.to_string()),
            at,
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn publish_transition(
        &self,
        order_id: &str,
        order_number: &str,
        from: OrderStatus,
        to: OrderStatus,
        action: &str,
        actor: &str,
        at: chrono::DateTime<chrono::Utc>,
    ) {
        self.sink.publish(DomainEvent::OrderTransitioned {
            order_id: order_id.to_string(),
            order_number: order_number.to_string(),
            from,
            to,
            action: action.to_string(),
            actor: actor.to_string(),
            at,
        });
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::AdmissionController;
    use crate::clock::ManualClock;
    use crate::events::MemorySink;
    use crate::policy::Role;
    use crate::state_machine::OrderStateMachine;
    use chrono::Duration;
    use concourse_core::{
        CapacitySettings, CoreError, Destination, Order, OrderChannel, OrderItem,
        OrderSubmission, PaymentStatus, RefundStatus, RejectReason, SlaKind, StoreStatus,
        ValidationError,
    };
    use crate::error::EngineError;
    use crate::repository::RefundFilter;

    struct Fixture {
        clock: Arc<ManualClock>,
        sink: Arc<MemorySink>,
        capacity: Arc<CapacityController>,
        clocks: Arc<SlaClockEngine>,
        repository: Arc<OrderRepository>,
        admission: AdmissionController,
        machine: OrderStateMachine,
        refunds: RefundWorkflow,
    }

    fn fixture(settings: RefundSettings) -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let sink = Arc::new(MemorySink::new());
        let repository = Arc::new(OrderRepository::new());
        let capacity = Arc::new(CapacityController::new(CapacitySettings {
            current_queue_length: 0,
            max_queue_length: 20,
            avg_prep_time_minutes: 10,
            is_accepting_orders: true,
            store_status: StoreStatus::Open,
        }));
        let clocks = Arc::new(SlaClockEngine::new(clock.clone(), sink.clone()));
        let sla = SlaSettings::default();
        let admission = AdmissionController::new(
            "m-1",
            sla.clone(),
            repository.clone(),
            capacity.clone(),
            clocks.clone(),
            clock.clone(),
            sink.clone(),
        );
        let machine = OrderStateMachine::new(
            sla.clone(),
            repository.clone(),
            capacity.clone(),
            clocks.clone(),
            clock.clone(),
            sink.clone(),
        );
        let refunds = RefundWorkflow::new(
            settings,
            sla,
            repository.clone(),
            capacity.clone(),
            clocks.clone(),
            clock.clone(),
            sink.clone(),
        );
        Fixture {
            clock,
            sink,
            capacity,
            clocks,
            repository,
            admission,
            machine,
            refunds,
        }
    }

    fn admit(f: &Fixture, number: &str, total_units: i64) -> Order {
        let price = Money::from_units(total_units);
        f.admission
            .admit(OrderSubmission {
                order_number: number.to_string(),
                channel: OrderChannel::PassengerApp,
                customer_name: None,
                items: vec![OrderItem {
                    name: "Catering tray".to_string(),
                    sku: None,
                    quantity: 1,
                    unit_price: price,
                    modifiers: vec![],
                    status: Default::default(),
                    notes: None,
                }],
                subtotal: price,
                discount: Money::zero(),
                service_fee: Money::zero(),
                total: price,
                destination: Destination {
                    gate: "E2".to_string(),
                    zone: None,
                },
                payment_status: PaymentStatus::Captured,
            })
            .unwrap()
    }

    fn staff() -> Actor {
        Actor::new("staff-1", "Sam", Role::Staff)
    }

    fn ops() -> Actor {
        Actor::new("ops-1", "Priya", Role::Ops)
    }

    #[test]
    fn test_at_threshold_auto_approves() {
        let f = fixture(RefundSettings::default());
        let order = admit(&f, "GC-1", 42);

        let refund = f
            .refunds
            .submit(&order.id, Money::from_units(42), RefundReason::OrderFailed, None, &staff())
            .unwrap();
        assert!(!refund.requires_ops_approval);
        assert_eq!(refund.status, RefundRequestStatus::Approved);
        assert_eq!(refund.reviewed_by.as_deref(), Some("auto"));
        assert!(refund.reviewed_at.is_some());

        let order = f.repository.get_order(&order.id).unwrap();
        assert_eq!(order.refund_status, RefundStatus::Approved);
        assert_eq!(order.status, OrderStatus::Refunded);
        assert_eq!(f.capacity.snapshot().unwrap().current_queue_length, 0);
        assert_eq!(f.clocks.active_count().unwrap(), 0);
    }

    #[test]
    fn test_above_threshold_waits_for_ops() {
        let f = fixture(RefundSettings::default());
        let order = admit(&f, "GC-1", 220);

        let refund = f
            .refunds
            .submit(&order.id, Money::from_units(150), RefundReason::OrderFailed, None, &staff())
            .unwrap();
        assert!(refund.requires_ops_approval);
        assert_eq!(refund.status, RefundRequestStatus::PendingApproval);
        assert!(refund.reviewed_by.is_none());
        assert!(refund.reviewed_at.is_none());

        let order = f.repository.get_order(&order.id).unwrap();
        assert_eq!(order.refund_status, RefundStatus::PendingApproval);
        assert_eq!(order.status, OrderStatus::RefundRequested);
        assert_eq!(f.clocks.active_count().unwrap(), 0);
    }

    #[test]
    fn test_second_approval_fails_and_keeps_reviewed_at() {
        let f = fixture(RefundSettings::default());
        let order = admit(&f, "GC-1", 220);
        let refund = f
            .refunds
            .submit(&order.id, Money::from_units(150), RefundReason::OrderFailed, None, &staff())
            .unwrap();

        let approved = f.refunds.approve(&refund.id, &ops()).unwrap();
        f.clock.advance(Duration::seconds(30));
        let err = f.refunds.approve(&refund.id, &ops()).unwrap_err();

        assert!(matches!(err.domain(), Some(CoreError::InvalidTransition { .. })));
        let stored = f.repository.get_refund(&refund.id).unwrap();
        assert_eq!(stored.reviewed_at, approved.reviewed_at);
        assert_eq!(f.repository.get_order(&order.id).unwrap().status, OrderStatus::Refunded);
    }

    #[test]
    fn test_decline_restores_status_and_clock() {
        let f = fixture(RefundSettings::default());
        let order = admit(&f, "GC-1", 220);
        f.machine.accept(&order.id, &staff()).unwrap();

        let refund = f
            .refunds
            .submit(&order.id, Money::from_units(150), RefundReason::OrderFailed, None, &staff())
            .unwrap();
        assert_eq!(f.clocks.active_count().unwrap(), 0);

        let declined = f.refunds.decline(&refund.id, &ops()).unwrap();
        assert_eq!(declined.status, RefundRequestStatus::Declined);

        let order = f.repository.get_order(&order.id).unwrap();
        assert_eq!(order.status, OrderStatus::Accepted);
        assert_eq!(order.refund_status, RefundStatus::Declined);
        assert_eq!(
            f.clocks.snapshot(&order.id).unwrap().unwrap().kind,
            SlaKind::Delivery
        );
        assert_eq!(f.capacity.snapshot().unwrap().current_queue_length, 1);
    }

    #[test]
    fn test_amount_out_of_range() {
        let f = fixture(RefundSettings::default());
        let order = admit(&f, "GC-1", 42);

        for cents in [0, -100, 4201] {
            let err = f
                .refunds
                .submit(&order.id, Money::from_cents(cents), RefundReason::OrderFailed, None, &staff())
                .unwrap_err();
            assert!(matches!(
                err.domain(),
                Some(CoreError::Validation(ValidationError::OutOfRange { .. }))
            ));
        }
        assert_eq!(f.repository.get_order(&order.id).unwrap().status, OrderStatus::New);
    }

    #[test]
    fn test_oversized_amount_is_refused_before_daily_sum() {
        let f = fixture(RefundSettings {
            ops_approval_threshold_cents: 10_000,
            daily_limit_cents: Some(100_000),
        });
        let order = admit(&f, "GC-1", 42);
        f.refunds
            .submit(&order.id, Money::from_units(10), RefundReason::OrderFailed, None, &staff())
            .unwrap();

        let err = f
            .refunds
            .submit(&order.id, Money::from_cents(i64::MAX), RefundReason::OrderFailed, None, &staff())
            .unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));
        assert_eq!(f.repository.list_refunds(&RefundFilter::all()).unwrap().len(), 1);
    }

    #[test]
    fn test_failed_record_write_leaves_slot_and_clock_alone() {
        let f = fixture(RefundSettings {
            ops_approval_threshold_cents: 10_000,
            daily_limit_cents: None,
        });
        let a = admit(&f, "GC-1", 42);
        admit(&f, "GC-2", 42);
        f.repository.poison_refund_index();

        let err = f
            .refunds
            .submit(&a.id, Money::from_units(42), RefundReason::OrderFailed, None, &staff())
            .unwrap_err();
        assert!(matches!(err, EngineError::LockPoisoned(_)));

        let stored = f.repository.get_order(&a.id).unwrap();
        assert_eq!(stored.status, OrderStatus::New);
        assert_eq!(stored.refund_status, RefundStatus::None);
        assert_eq!(f.capacity.snapshot().unwrap().current_queue_length, 2);
        assert_eq!(
            f.clocks.snapshot(&a.id).unwrap().unwrap().kind,
            SlaKind::Acceptance
        );

        // The slot is released exactly once, by the real transition.
        f.machine
            .reject(&a.id, RejectReason::TooBusy, None, &staff())
            .unwrap();
        assert_eq!(f.capacity.snapshot().unwrap().current_queue_length, 1);
    }

    #[test]
    fn test_notes_required_reason() {
        let f = fixture(RefundSettings::default());
        let order = admit(&f, "GC-1", 42);
        let err = f
            .refunds
            .submit(&order.id, Money::from_units(5), RefundReason::QualityIssue, None, &staff())
            .unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(CoreError::Validation(ValidationError::NotesRequired { .. }))
        ));
    }

    #[test]
    fn test_daily_limit_routes_to_review() {
        let f = fixture(RefundSettings {
            ops_approval_threshold_cents: 10_000,
            daily_limit_cents: Some(6_000),
        });
        let a = admit(&f, "GC-1", 40);
        let b = admit(&f, "GC-2", 40);

        let first = f
            .refunds
            .submit(&a.id, Money::from_units(40), RefundReason::OrderFailed, None, &staff())
            .unwrap();
        assert_eq!(first.status, RefundRequestStatus::Approved);

        let second = f
            .refunds
            .submit(&b.id, Money::from_units(30), RefundReason::OrderFailed, None, &staff())
            .unwrap();
        assert!(second.requires_ops_approval);
        assert_eq!(second.status, RefundRequestStatus::PendingApproval);
    }

    #[test]
    fn test_refund_on_delivered_order_only_touches_refund_status() {
        let f = fixture(RefundSettings::default());
        let order = admit(&f, "GC-1", 42);
        let runner = Actor::new("r-7", "Dana", Role::Runner);
        f.machine.accept(&order.id, &staff()).unwrap();
        f.machine.start_preparing(&order.id, &staff()).unwrap();
        f.machine.mark_ready(&order.id, &staff()).unwrap();
        f.machine.mark_picked_up(&order.id, "r-7", "Dana", &staff()).unwrap();
        f.machine.mark_delivered(&order.id, &runner).unwrap();

        f.refunds
            .submit(
                &order.id,
                Money::from_units(8),
                RefundReason::WrongItem,
                Some("Got decaf".to_string()),
                &staff(),
            )
            .unwrap();

        let order = f.repository.get_order(&order.id).unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.refund_status, RefundStatus::Approved);
        assert_eq!(f.sink.named("refund_resolved").len(), 1);
        assert!(f
            .sink
            .named("order_transitioned")
            .iter()
            .all(|e| !matches!(e, DomainEvent::OrderTransitioned { action, .. } if action.starts_with("refund"))));
    }
}

//! # Order State Machine
//!
//! Staff, runner and system-triggered status changes.
//!
//! ## One Transition
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  lock order ─► draft = clone ─► Order::apply(action) ──✗──► unchanged   │
//! │                                        │                                │
//! │                                        ▼                                │
//! │                     first of ready/rejected/failed/refunded?            │
//! │                          └─► CapacityController::release                │
//! │                                        │                                │
//! │                                        ▼                                │
//! │                     sync SLA clock with the new status                  │
//! │                                        │                                │
//! │                                        ▼                                │
//! │                     commit draft ─► unlock ─► OrderTransitioned event   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Concurrent calls on the same order queue on its mutex. The first one wins
//! the edge; the rest see the new status and fail with `InvalidTransition`.

use std::sync::Arc;

use concourse_core::sla::monitored_kind;
use concourse_core::{Order, OrderAction, OrderStatus, RejectReason, SlaKind};
use tracing::{debug, info};

use crate::capacity::CapacityController;
use crate::clock::Clock;
use crate::config::SlaSettings;
use crate::error::EngineResult;
use crate::events::{DomainEvent, EventSink};
use crate::policy::Actor;
use crate::repository::OrderRepository;
use crate::sla_clock::SlaClockEngine;

pub struct OrderStateMachine {
    sla: SlaSettings,
    repository: Arc<OrderRepository>,
    capacity: Arc<CapacityController>,
    clocks: Arc<SlaClockEngine>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
}

impl OrderStateMachine {
    pub fn new(
        sla: SlaSettings,
        repository: Arc<OrderRepository>,
        capacity: Arc<CapacityController>,
        clocks: Arc<SlaClockEngine>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        OrderStateMachine {
            sla,
            repository,
            capacity,
            clocks,
            clock,
            sink,
        }
    }

    pub fn accept(&self, order_id: &str, actor: &Actor) -> EngineResult<Order> {
        self.transition(order_id, OrderAction::Accept, actor)
    }

    /// Notes are required when the reason code says so.
    pub fn reject(
        &self,
        order_id: &str,
        reason: RejectReason,
        notes: Option<String>,
        actor: &Actor,
    ) -> EngineResult<Order> {
        self.transition(order_id, OrderAction::Reject { reason, notes }, actor)
    }

    pub fn start_preparing(&self, order_id: &str, actor: &Actor) -> EngineResult<Order> {
        self.transition(order_id, OrderAction::StartPreparing, actor)
    }

    pub fn mark_ready(&self, order_id: &str, actor: &Actor) -> EngineResult<Order> {
        self.transition(order_id, OrderAction::MarkReady, actor)
    }

    pub fn mark_picked_up(
        &self,
        order_id: &str,
        runner_id: impl Into<String>,
        runner_name: impl Into<String>,
        actor: &Actor,
    ) -> EngineResult<Order> {
        self.transition(
            order_id,
            OrderAction::PickUp {
                runner_id: runner_id.into(),
                runner_name: runner_name.into(),
            },
            actor,
        )
    }

    pub fn mark_delivered(&self, order_id: &str, actor: &Actor) -> EngineResult<Order> {
        self.transition(order_id, OrderAction::Deliver, actor)
    }

    /// Unrecoverable processing error. Legal from any non-terminal status.
    pub fn mark_failed(
        &self,
        order_id: &str,
        details: impl Into<String>,
        actor: &Actor,
    ) -> EngineResult<Order> {
        self.transition(
            order_id,
            OrderAction::Fail {
                details: details.into(),
            },
            actor,
        )
    }

    fn transition(&self, order_id: &str, action: OrderAction, actor: &Actor) -> EngineResult<Order> {
        let now = self.clock.now();
        let action_name = action.name();

        let (order, from) = self.repository.with_order_mut(order_id, |order| {
            let from = order.apply(action, &actor.id, now)?;
            settle_side_effects(order, from, &self.sla, &self.capacity, &self.clocks)?;
            Ok((order.clone(), from))
        })?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            from = %from,
            to = %order.status,
            actor = %actor.id,
            "Order {}",
            action_name
        );
        self.sink.publish(DomainEvent::OrderTransitioned {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            from,
            to: order.status,
            action: action_name.to_string(),
            actor: actor.id.clone(),
            at: now,
        });

        Ok(order)
    }
}

/// Queue-slot release and SLA clock upkeep after `order` left `from`.
///
/// Called with the order's lock held so clock changes are ordered like the
/// transitions that caused them.
pub(crate) fn settle_side_effects(
    order: &mut Order,
    from: OrderStatus,
    sla: &SlaSettings,
    capacity: &CapacityController,
    clocks: &SlaClockEngine,
) -> EngineResult<()> {
    if order.take_queue_release() {
        let queue = capacity.release();
        debug!(order_id = %order.id, queue, "Queue slot released");
    }

    match order.active_deadline() {
        Some((kind, deadline)) => {
            if monitored_kind(from) != Some(kind) {
                let window = match kind {
                    SlaKind::Acceptance => sla.acceptance_window_secs,
                    SlaKind::Delivery => sla.delivery_window_secs,
                };
                clocks.start(&order.id, kind, deadline, window)?;
            }
        }
        None if order.status.is_terminal() => clocks.forget(&order.id)?,
        None => {
            clocks.stop(&order.id)?;
        }
    }
    Ok(())
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
    use concourse_core::{
        CapacitySettings, CoreError, Destination, Money, OrderChannel, OrderItem,
        OrderSubmission, PaymentStatus, StoreStatus,
    };

    struct Fixture {
        capacity: Arc<CapacityController>,
        clocks: Arc<SlaClockEngine>,
        sink: Arc<MemorySink>,
        admission: AdmissionController,
        machine: OrderStateMachine,
    }

    fn fixture() -> Fixture {
        let clock: Arc<ManualClock> = Arc::new(ManualClock::default());
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
        let admission = AdmissionController::new(
            "m-1",
            SlaSettings::default(),
            repository.clone(),
            capacity.clone(),
            clocks.clone(),
            clock.clone(),
            sink.clone(),
        );
        let machine = OrderStateMachine::new(
            SlaSettings::default(),
            repository,
            capacity.clone(),
            clocks.clone(),
            clock,
            sink.clone(),
        );
        Fixture {
            capacity,
            clocks,
            sink,
            admission,
            machine,
        }
    }

    fn admit(f: &Fixture, number: &str) -> Order {
        f.admission
            .admit(OrderSubmission {
                order_number: number.to_string(),
                channel: OrderChannel::PointOfSale,
                customer_name: None,
                items: vec![OrderItem {
                    name: "Noodle bowl".to_string(),
                    sku: None,
                    quantity: 1,
                    unit_price: Money::from_cents(1450),
                    modifiers: vec![],
                    status: Default::default(),
                    notes: None,
                }],
                subtotal: Money::from_cents(1450),
                discount: Money::zero(),
                service_fee: Money::zero(),
                total: Money::from_cents(1450),
                destination: Destination {
                    gate: "D9".to_string(),
                    zone: None,
                },
                payment_status: PaymentStatus::Captured,
            })
            .unwrap()
    }

    fn staff() -> Actor {
        Actor::new("staff-1", "Sam", Role::Staff)
    }

    fn queue(f: &Fixture) -> u32 {
        f.capacity.snapshot().unwrap().current_queue_length
    }

    #[test]
    fn test_accept_swaps_acceptance_clock_for_delivery() {
        let f = fixture();
        let order = admit(&f, "GC-1");
        f.machine.accept(&order.id, &staff()).unwrap();

        let view = f.clocks.snapshot(&order.id).unwrap().unwrap();
        assert_eq!(view.kind, SlaKind::Delivery);
        assert_eq!(view.deadline, order.sla_deliver_by);
    }

    #[test]
    fn test_ready_releases_slot_once() {
        let f = fixture();
        let order = admit(&f, "GC-1");
        assert_eq!(queue(&f), 1);

        f.machine.accept(&order.id, &staff()).unwrap();
        f.machine.start_preparing(&order.id, &staff()).unwrap();
        f.machine.mark_ready(&order.id, &staff()).unwrap();
        assert_eq!(queue(&f), 0);

        let runner = Actor::new("r-7", "Dana", Role::Runner);
        f.machine.mark_picked_up(&order.id, "r-7", "Dana", &staff()).unwrap();
        let done = f.machine.mark_delivered(&order.id, &runner).unwrap();
        assert_eq!(done.status, OrderStatus::Delivered);
        assert_eq!(queue(&f), 0);
        assert!(f.clocks.snapshot(&order.id).unwrap().is_none());
    }

    #[test]
    fn test_reject_stops_clock_and_frees_slot() {
        let f = fixture();
        let order = admit(&f, "GC-1");
        let rejected = f
            .machine
            .reject(&order.id, RejectReason::TooBusy, None, &staff())
            .unwrap();
        assert_eq!(rejected.reject_reason, Some(RejectReason::TooBusy));
        assert_eq!(queue(&f), 0);
        assert_eq!(f.clocks.active_count().unwrap(), 0);
    }

    #[test]
    fn test_illegal_transition_has_no_side_effects() {
        let f = fixture();
        let order = admit(&f, "GC-1");
        let before = f.sink.events().len();

        let err = f.machine.mark_ready(&order.id, &staff()).unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::InvalidTransition { .. })));
        assert_eq!(queue(&f), 1);
        assert_eq!(f.sink.events().len(), before);
        assert_eq!(
            f.clocks.snapshot(&order.id).unwrap().unwrap().kind,
            SlaKind::Acceptance
        );
    }

    #[test]
    fn test_fail_from_preparing() {
        let f = fixture();
        let order = admit(&f, "GC-1");
        f.machine.accept(&order.id, &staff()).unwrap();
        f.machine.start_preparing(&order.id, &staff()).unwrap();

        let failed = f
            .machine
            .mark_failed(&order.id, "Fryer fire alarm", &Actor::system())
            .unwrap();
        assert_eq!(failed.status, OrderStatus::Failed);
        assert_eq!(failed.failure_details.as_deref(), Some("Fryer fire alarm"));
        assert_eq!(queue(&f), 0);
    }
}

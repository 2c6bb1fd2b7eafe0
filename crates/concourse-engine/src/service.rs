//! # Fulfillment Engine
//!
//! The one object collaborators talk to. It owns every component, checks
//! the caller's capability before each mutation, and otherwise delegates.
//!
//! ## Wiring
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         FulfillmentEngine                               │
//! │                                                                         │
//! │   caller ──► policy::authorize ──✗──► PermissionDenied                  │
//! │                    │                                                    │
//! │        ┌───────────┼──────────────┬─────────────────┐                   │
//! │        ▼           ▼              ▼                 ▼                   │
//! │   Admission   StateMachine   RefundWorkflow   CapacityController        │
//! │        │           │              │                 │                   │
//! │        └───────────┴──────┬───────┴─────────────────┘                   │
//! │                           ▼                                             │
//! │          OrderRepository + SlaClockEngine + EventSink                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads need no capability. All calls are synchronous; only the SLA
//! scheduler runs in the background.

use std::sync::Arc;

use concourse_core::{
    CapacitySettings, Money, Order, OrderSubmission, ReasonCode, RefundReason, RefundRequest,
    RejectReason, StoreStatus,
};
use tracing::info;

use crate::admission::AdmissionController;
use crate::capacity::CapacityController;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::events::{DomainEvent, EventSink, NoOpSink};
use crate::policy::{authorize, Actor, Capability};
use crate::refund::RefundWorkflow;
use crate::repository::{OrderFilter, OrderRepository, RefundFilter};
use crate::sla_clock::{ClockView, SlaClockEngine, SlaScheduler, SlaSchedulerHandle};
use crate::state_machine::OrderStateMachine;

pub struct FulfillmentEngine {
    config: EngineConfig,
    repository: Arc<OrderRepository>,
    capacity: Arc<CapacityController>,
    clocks: Arc<SlaClockEngine>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    admission: AdmissionController,
    machine: OrderStateMachine,
    refunds: RefundWorkflow,
}

impl FulfillmentEngine {
    /// Engine on the system clock with events discarded.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        FulfillmentEngineBuilder::new(config).build()
    }

    pub fn builder(config: EngineConfig) -> FulfillmentEngineBuilder {
        FulfillmentEngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Intake
    // =========================================================================

    pub fn submit_order(&self, submission: OrderSubmission, actor: &Actor) -> EngineResult<Order> {
        authorize(actor, Capability::SubmitOrder)?;
        self.admission.admit(submission)
    }

    // =========================================================================
    // Order Transitions
    // =========================================================================

    pub fn accept_order(&self, order_id: &str, actor: &Actor) -> EngineResult<Order> {
        authorize(actor, Capability::AcceptOrder)?;
        self.machine.accept(order_id, actor)
    }

    pub fn reject_order(
        &self,
        order_id: &str,
        reason: RejectReason,
        notes: Option<String>,
        actor: &Actor,
    ) -> EngineResult<Order> {
        authorize(actor, Capability::RejectOrder)?;
        self.machine.reject(order_id, reason, notes, actor)
    }

    pub fn start_preparing(&self, order_id: &str, actor: &Actor) -> EngineResult<Order> {
        authorize(actor, Capability::PrepareOrder)?;
        self.machine.start_preparing(order_id, actor)
    }

    pub fn mark_ready(&self, order_id: &str, actor: &Actor) -> EngineResult<Order> {
        authorize(actor, Capability::PrepareOrder)?;
        self.machine.mark_ready(order_id, actor)
    }

    pub fn mark_picked_up(
        &self,
        order_id: &str,
        runner_id: &str,
        runner_name: &str,
        actor: &Actor,
    ) -> EngineResult<Order> {
        authorize(actor, Capability::HandOff)?;
        self.machine.mark_picked_up(order_id, runner_id, runner_name, actor)
    }

    pub fn mark_delivered(&self, order_id: &str, actor: &Actor) -> EngineResult<Order> {
        authorize(actor, Capability::Deliver)?;
        self.machine.mark_delivered(order_id, actor)
    }

    pub fn mark_failed(&self, order_id: &str, details: &str, actor: &Actor) -> EngineResult<Order> {
        authorize(actor, Capability::FailOrder)?;
        self.machine.mark_failed(order_id, details, actor)
    }

    // =========================================================================
    // Refunds
    // =========================================================================

    pub fn submit_refund(
        &self,
        order_id: &str,
        amount: Money,
        reason: RefundReason,
        notes: Option<String>,
        requested_by: &Actor,
    ) -> EngineResult<RefundRequest> {
        authorize(requested_by, Capability::RequestRefund)?;
        self.refunds.submit(order_id, amount, reason, notes, requested_by)
    }

    pub fn approve_refund(&self, refund_id: &str, reviewer: &Actor) -> EngineResult<RefundRequest> {
        authorize(reviewer, Capability::ReviewRefund)?;
        self.refunds.approve(refund_id, reviewer)
    }

    pub fn decline_refund(&self, refund_id: &str, reviewer: &Actor) -> EngineResult<RefundRequest> {
        authorize(reviewer, Capability::ReviewRefund)?;
        self.refunds.decline(refund_id, reviewer)
    }

    // =========================================================================
    // Capacity Management
    // =========================================================================

    pub fn set_store_status(&self, status: StoreStatus, actor: &Actor) -> EngineResult<CapacitySettings> {
        authorize(actor, Capability::ManageCapacity)?;
        let settings = self.capacity.set_store_status(status)?;
        self.capacity_changed(&settings, actor, "store_status");
        Ok(settings)
    }

    pub fn set_accepting_orders(&self, accepting: bool, actor: &Actor) -> EngineResult<CapacitySettings> {
        authorize(actor, Capability::ManageCapacity)?;
        let settings = self.capacity.set_accepting_orders(accepting)?;
        self.capacity_changed(&settings, actor, "accepting_orders");
        Ok(settings)
    }

    pub fn set_max_queue_length(&self, max: u32, actor: &Actor) -> EngineResult<CapacitySettings> {
        authorize(actor, Capability::ManageCapacity)?;
        let settings = self.capacity.set_max_queue_length(max)?;
        self.capacity_changed(&settings, actor, "max_queue_length");
        Ok(settings)
    }

    pub fn set_avg_prep_time(&self, minutes: u32, actor: &Actor) -> EngineResult<CapacitySettings> {
        authorize(actor, Capability::ManageCapacity)?;
        let settings = self.capacity.set_avg_prep_time(minutes)?;
        self.capacity_changed(&settings, actor, "avg_prep_time_minutes");
        Ok(settings)
    }

    fn capacity_changed(&self, settings: &CapacitySettings, actor: &Actor, field: &str) {
        info!(
            field,
            actor = %actor.id,
            store_status = %settings.store_status,
            accepting = settings.is_accepting_orders,
            max_queue = settings.max_queue_length,
            "Capacity settings changed"
        );
        self.sink.publish(DomainEvent::CapacityChanged {
            settings: settings.clone(),
            changed_by: actor.id.clone(),
            at: self.clock.now(),
        });
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn get_order(&self, order_id: &str) -> EngineResult<Order> {
        self.repository.get_order(order_id)
    }

    pub fn find_order_by_number(&self, order_number: &str) -> EngineResult<Order> {
        self.repository.find_by_number(order_number)
    }

    pub fn list_orders(&self, filter: &OrderFilter) -> EngineResult<Vec<Order>> {
        self.repository.list_orders(filter)
    }

    pub fn get_refund(&self, refund_id: &str) -> EngineResult<RefundRequest> {
        self.repository.get_refund(refund_id)
    }

    pub fn list_refunds(&self, filter: &RefundFilter) -> EngineResult<Vec<RefundRequest>> {
        self.repository.list_refunds(filter)
    }

    pub fn get_capacity(&self) -> EngineResult<CapacitySettings> {
        self.capacity.snapshot()
    }

    /// Current clock for an order, or `None` when nothing is monitored.
    /// Unknown orders are `NotFound`.
    pub fn snapshot_sla(&self, order_id: &str) -> EngineResult<Option<ClockView>> {
        self.repository.get_order(order_id)?;
        self.clocks.snapshot(order_id)
    }

    /// Every running clock, most urgent first.
    pub fn active_clocks(&self) -> EngineResult<Vec<ClockView>> {
        self.clocks.active_clocks()
    }

    pub fn reject_reasons(&self) -> Vec<ReasonCode> {
        RejectReason::table()
    }

    pub fn refund_reasons(&self) -> Vec<ReasonCode> {
        RefundReason::table()
    }

    // =========================================================================
    // Background
    // =========================================================================

    pub fn clocks(&self) -> Arc<SlaClockEngine> {
        Arc::clone(&self.clocks)
    }

    /// Starts the SLA tick loop at the configured period. Must be called
    /// inside a tokio runtime.
    pub fn spawn_scheduler(&self) -> SlaSchedulerHandle {
        SlaScheduler::spawn(self.clocks(), self.config.sla.tick_interval())
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`FulfillmentEngine`] with an injectable clock and sink.
pub struct FulfillmentEngineBuilder {
    config: EngineConfig,
    clock: Option<Arc<dyn Clock>>,
    sink: Option<Arc<dyn EventSink>>,
}

impl FulfillmentEngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        FulfillmentEngineBuilder {
            config,
            clock: None,
            sink: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validates the config and wires every component.
    pub fn build(self) -> EngineResult<FulfillmentEngine> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let sink = self.sink.unwrap_or_else(|| Arc::new(NoOpSink));
        let config = self.config;

        let repository = Arc::new(OrderRepository::new());
        let capacity = Arc::new(CapacityController::new(config.capacity.initial_settings()));
        let clocks = Arc::new(SlaClockEngine::new(clock.clone(), sink.clone()));

        let admission = AdmissionController::new(
            config.merchant_id(),
            config.sla.clone(),
            repository.clone(),
            capacity.clone(),
            clocks.clone(),
            clock.clone(),
            sink.clone(),
        );
        let machine = OrderStateMachine::new(
            config.sla.clone(),
            repository.clone(),
            capacity.clone(),
            clocks.clone(),
            clock.clone(),
            sink.clone(),
        );
        let refunds = RefundWorkflow::new(
            config.refunds.clone(),
            config.sla.clone(),
            repository.clone(),
            capacity.clone(),
            clocks.clone(),
            clock.clone(),
            sink.clone(),
        );

        info!(
            merchant = %config.merchant_id(),
            max_queue = config.capacity.max_queue_length,
            "Fulfillment engine ready"
        );

        Ok(FulfillmentEngine {
            config,
            repository,
            capacity,
            clocks,
            clock,
            sink,
            admission,
            machine,
            refunds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::MemorySink;
    use crate::policy::Role;
    use concourse_core::CoreError;

    fn engine() -> (Arc<MemorySink>, FulfillmentEngine) {
        let sink = Arc::new(MemorySink::new());
        let engine = FulfillmentEngine::builder(EngineConfig::default())
            .with_clock(Arc::new(ManualClock::default()))
            .with_sink(sink.clone())
            .build()
            .unwrap();
        (sink, engine)
    }

    #[test]
    fn test_capacity_change_requires_manager() {
        let (sink, engine) = engine();
        let staff = Actor::new("staff-1", "Sam", Role::Staff);
        let err = engine.set_store_status(StoreStatus::Busy, &staff).unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::PermissionDenied { .. })));
        assert!(sink.named("capacity_changed").is_empty());

        let manager = Actor::new("mgr-1", "Lee", Role::Manager);
        let settings = engine.set_store_status(StoreStatus::Busy, &manager).unwrap();
        assert_eq!(settings.store_status, StoreStatus::Busy);
        assert_eq!(engine.get_capacity().unwrap().store_status, StoreStatus::Busy);
        assert_eq!(sink.named("capacity_changed").len(), 1);
    }

    #[test]
    fn test_snapshot_sla_unknown_order() {
        let (_, engine) = engine();
        let err = engine.snapshot_sla("nope").unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::NotFound { .. })));
    }

    #[test]
    fn test_reason_tables() {
        let (_, engine) = engine();
        assert_eq!(engine.reject_reasons().len(), 5);
        assert_eq!(engine.refund_reasons().len(), 7);
    }

    #[test]
    fn test_invalid_config_refused() {
        let mut config = EngineConfig::default();
        config.capacity.max_queue_length = 0;
        assert!(FulfillmentEngine::new(config).is_err());
    }
}

//! # Admission Controller
//!
//! Decides whether a submitted order may enter the pipeline.
//!
//! ## Admission Flow
//! ```text
//! OrderSubmission
//!      │
//!      ▼
//! validate_submission ──✗──► ValidationError (nothing reserved)
//!      │
//!      ▼
//! order_number unused? ──✗──► Duplicate
//!      │
//!      ▼
//! CapacityController::try_reserve
//!      ├── closed        ──► StoreClosed      ┐
//!      ├── not accepting ──► NotAccepting     ├─► AdmissionDenied event
//!      └── queue full    ──► CapacityExceeded ┘
//!      │
//!      ▼
//! insert Order (status new, deadlines = now + windows)
//!      │
//!      ▼
//! start acceptance clock ──► OrderAdmitted event
//! ```

use std::sync::Arc;

use concourse_core::validation::validate_submission;
use concourse_core::{CoreError, Order, OrderSubmission, SlaKind, ValidationError};
use tracing::{info, warn};
use uuid::Uuid;

use crate::capacity::CapacityController;
use crate::clock::Clock;
use crate::config::SlaSettings;
use crate::error::{EngineError, EngineResult};
use crate::events::{DomainEvent, EventSink};
use crate::repository::OrderRepository;
use crate::sla_clock::SlaClockEngine;

pub struct AdmissionController {
    merchant_id: String,
    sla: SlaSettings,
    repository: Arc<OrderRepository>,
    capacity: Arc<CapacityController>,
    clocks: Arc<SlaClockEngine>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
}

impl AdmissionController {
    pub fn new(
        merchant_id: impl Into<String>,
        sla: SlaSettings,
        repository: Arc<OrderRepository>,
        capacity: Arc<CapacityController>,
        clocks: Arc<SlaClockEngine>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        AdmissionController {
            merchant_id: merchant_id.into(),
            sla,
            repository,
            capacity,
            clocks,
            clock,
            sink,
        }
    }

    /// Admits `submission` or says exactly why not.
    pub fn admit(&self, submission: OrderSubmission) -> EngineResult<Order> {
        validate_submission(&submission)?;

        if self.repository.contains_order_number(&submission.order_number)? {
            return Err(ValidationError::Duplicate {
                field: "order_number".to_string(),
                value: submission.order_number,
            }
            .into());
        }

        let now = self.clock.now();

        let queue_length = match self.capacity.try_reserve() {
            Ok(len) => len,
            Err(EngineError::Domain(denial)) if denial.is_admission_denial() => {
                warn!(
                    order_number = %submission.order_number,
                    reason = %denial,
                    "Order denied admission"
                );
                self.sink.publish(DomainEvent::AdmissionDenied {
                    order_number: submission.order_number,
                    reason: denial.to_string(),
                    at: now,
                });
                return Err(denial.into());
            }
            Err(other) => return Err(other),
        };

        let order = Order::from_submission(
            Uuid::new_v4().to_string(),
            self.merchant_id.clone(),
            submission,
            now,
            self.sla.acceptance_window(),
            self.sla.delivery_window(),
        );

        // Start the clock before the order is visible so a concurrent accept
        // always supersedes it.
        if let Err(e) = self.clocks.start(
            &order.id,
            SlaKind::Acceptance,
            order.sla_accept_by,
            self.sla.acceptance_window_secs,
        ) {
            self.capacity.release();
            return Err(e);
        }

        if let Err(e) = self.repository.insert_order(order.clone()) {
            // Lost a race on the order number; hand the slot back.
            let _ = self.clocks.forget(&order.id);
            self.capacity.release();
            return Err(e);
        }

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total,
            queue = queue_length,
            "Order admitted"
        );
        self.sink.publish(DomainEvent::OrderAdmitted {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            sla_accept_by: order.sla_accept_by,
            at: now,
        });

        Ok(order)
    }
}

/// True when `err` is one of the three capacity-side denials.
pub fn is_denial(err: &EngineError) -> bool {
    err.domain().map_or(false, CoreError::is_admission_denial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::MemorySink;
    use chrono::Duration;
    use concourse_core::{
        CapacitySettings, Destination, Money, OrderChannel, OrderItem, OrderStatus,
        PaymentStatus, StoreStatus,
    };

    struct Fixture {
        clock: Arc<ManualClock>,
        sink: Arc<MemorySink>,
        capacity: Arc<CapacityController>,
        clocks: Arc<SlaClockEngine>,
        admission: AdmissionController,
    }

    fn fixture(current: u32, max: u32) -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let sink = Arc::new(MemorySink::new());
        let capacity = Arc::new(CapacityController::new(CapacitySettings {
            current_queue_length: current,
            max_queue_length: max,
            avg_prep_time_minutes: 10,
            is_accepting_orders: true,
            store_status: StoreStatus::Open,
        }));
        let clocks = Arc::new(SlaClockEngine::new(clock.clone(), sink.clone()));
        let admission = AdmissionController::new(
            "m-1",
            SlaSettings::default(),
            Arc::new(OrderRepository::new()),
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
            admission,
        }
    }

    fn submission(number: &str) -> OrderSubmission {
        OrderSubmission {
            order_number: number.to_string(),
            channel: OrderChannel::PassengerApp,
            customer_name: None,
            items: vec![OrderItem {
                name: "Croissant".to_string(),
                sku: None,
                quantity: 1,
                unit_price: Money::from_cents(395),
                modifiers: vec![],
                status: Default::default(),
                notes: None,
            }],
            subtotal: Money::from_cents(395),
            discount: Money::zero(),
            service_fee: Money::zero(),
            total: Money::from_cents(395),
            destination: Destination {
                gate: "A3".to_string(),
                zone: None,
            },
            payment_status: PaymentStatus::Authorized,
        }
    }

    #[test]
    fn test_admit_sets_deadlines_and_starts_clock() {
        let f = fixture(0, 20);
        let order = f.admission.admit(submission("GC-1")).unwrap();

        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.sla_accept_by, f.clock.now() + Duration::seconds(90));
        assert_eq!(order.sla_deliver_by, f.clock.now() + Duration::seconds(1800));
        assert!(order.event_log.is_empty());
        assert_eq!(f.capacity.snapshot().unwrap().current_queue_length, 1);
        assert_eq!(
            f.clocks.snapshot(&order.id).unwrap().unwrap().kind,
            SlaKind::Acceptance
        );
        assert_eq!(f.sink.named("order_admitted").len(), 1);
    }

    #[test]
    fn test_full_queue_denies_and_reports() {
        let f = fixture(20, 20);
        let err = f.admission.admit(submission("GC-1")).unwrap_err();
        assert!(is_denial(&err));
        assert_eq!(f.capacity.snapshot().unwrap().current_queue_length, 20);
        assert_eq!(f.sink.named("admission_denied").len(), 1);
    }

    #[test]
    fn test_invalid_submission_reserves_nothing() {
        let f = fixture(0, 20);
        let mut bad = submission("GC-1");
        bad.total = Money::from_cents(1);
        assert!(f.admission.admit(bad).is_err());
        assert_eq!(f.capacity.snapshot().unwrap().current_queue_length, 0);
        assert!(f.sink.events().is_empty());
    }

    #[test]
    fn test_duplicate_order_number_rejected() {
        let f = fixture(0, 20);
        f.admission.admit(submission("GC-1")).unwrap();
        let err = f.admission.admit(submission("GC-1")).unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(CoreError::Validation(ValidationError::Duplicate { .. }))
        ));
        assert_eq!(f.capacity.snapshot().unwrap().current_queue_length, 1);
    }
}

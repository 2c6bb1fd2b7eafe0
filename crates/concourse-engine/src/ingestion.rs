//! # Ingestion Adapter
//!
//! The inbound boundary for "order submitted" messages. A source (point of
//! sale, passenger app, synthetic generator) hands over a fully populated
//! submission; the adapter forwards it unchanged to admission under the
//! source's identity.
//!
//! ```text
//! JSON payload ──► submit_json ──┐
//!                                ├──► FulfillmentEngine::submit_order
//! mpsc channel ──► pump ─────────┘
//! ```

use std::sync::Arc;

use concourse_core::{Order, OrderSubmission};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::admission::is_denial;
use crate::error::EngineResult;
use crate::policy::Actor;
use crate::service::FulfillmentEngine;

/// Running totals from a [`IngestionAdapter::pump`] session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub admitted: u64,
    pub denied: u64,
    pub invalid: u64,
}

pub struct IngestionAdapter {
    engine: Arc<FulfillmentEngine>,
    source: Actor,
}

impl IngestionAdapter {
    /// `source` is the identity submissions are made under; it needs the
    /// submit capability.
    pub fn new(engine: Arc<FulfillmentEngine>, source: Actor) -> Self {
        IngestionAdapter { engine, source }
    }

    pub fn submit(&self, submission: OrderSubmission) -> EngineResult<Order> {
        self.engine.submit_order(submission, &self.source)
    }

    /// Parses an "order submitted" JSON message and submits it.
    pub fn submit_json(&self, payload: &str) -> EngineResult<Order> {
        let submission: OrderSubmission = serde_json::from_str(payload)?;
        self.submit(submission)
    }

    /// Drains `rx` until every sender is dropped.
    ///
    /// Rejections are logged and counted; they never stop the pump.
    pub async fn pump(&self, mut rx: mpsc::Receiver<OrderSubmission>) -> PumpStats {
        info!(source = %self.source, "Ingestion pump started");
        let mut stats = PumpStats::default();

        while let Some(submission) = rx.recv().await {
            let order_number = submission.order_number.clone();
            match self.submit(submission) {
                Ok(order) => {
                    stats.admitted += 1;
                    debug!(order_id = %order.id, order_number = %order.order_number, "Ingested order");
                }
                Err(e) if is_denial(&e) => {
                    stats.denied += 1;
                    info!(order_number = %order_number, reason = %e, "Submission turned away");
                }
                Err(e) => {
                    stats.invalid += 1;
                    warn!(order_number = %order_number, error = %e, "Submission failed");
                }
            }
        }

        info!(
            admitted = stats.admitted,
            denied = stats.denied,
            invalid = stats.invalid,
            "Ingestion pump stopped"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::policy::Role;
    use concourse_core::{CoreError, Money, OrderChannel, OrderStatus, ValidationError};

    const PAYLOAD: &str = r#"{
        "order_number": "PA-1001",
        "channel": "passenger_app",
        "customer_name": "R. Okafor",
        "items": [
            {
                "name": "Flat white",
                "quantity": 2,
                "unit_price": 450,
                "modifiers": [{ "name": "Oat milk", "price_delta": 60 }]
            }
        ],
        "subtotal": 1020,
        "discount": 0,
        "service_fee": 100,
        "total": 1120,
        "destination": { "gate": "B12" },
        "payment_status": "captured"
    }"#;

    fn engine(max_queue: u32) -> Arc<FulfillmentEngine> {
        let mut config = EngineConfig::default();
        config.capacity.max_queue_length = max_queue;
        Arc::new(
            FulfillmentEngine::builder(config)
                .with_clock(Arc::new(ManualClock::default()))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_submit_json_admits() {
        let adapter = IngestionAdapter::new(engine(20), Actor::new("app", "Passenger app", Role::System));
        let order = adapter.submit_json(PAYLOAD).unwrap();
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.channel, OrderChannel::PassengerApp);
        assert_eq!(order.destination.gate, "B12");
    }

    #[test]
    fn test_malformed_json() {
        let adapter = IngestionAdapter::new(engine(20), Actor::system());
        let err = adapter.submit_json("{\"order_number\":").unwrap_err();
        assert!(!err.is_domain());
    }

    #[test]
    fn test_source_without_submit_capability() {
        let adapter = IngestionAdapter::new(engine(20), Actor::new("r-7", "Dana", Role::Runner));
        let err = adapter.submit_json(PAYLOAD).unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::PermissionDenied { .. })));
    }

    #[test]
    fn test_overflowing_amounts_are_a_typed_error() {
        let engine = engine(20);
        let adapter = IngestionAdapter::new(engine.clone(), Actor::system());
        let payload = PAYLOAD
            .replace("\"quantity\": 2", "\"quantity\": 3")
            .replace("\"unit_price\": 450", "\"unit_price\": 4611686018427387904");

        let err = adapter.submit_json(&payload).unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));
        assert_eq!(engine.get_capacity().unwrap().current_queue_length, 0);
    }

    #[tokio::test]
    async fn test_pump_survives_overflowing_submission() {
        let engine = engine(20);
        let adapter = IngestionAdapter::new(engine.clone(), Actor::system());
        let (tx, rx) = mpsc::channel(8);

        let good: OrderSubmission = serde_json::from_str(PAYLOAD).unwrap();
        let mut huge = good.clone();
        huge.order_number = "PA-1002".to_string();
        huge.items[0].unit_price = Money::from_cents(i64::MAX);

        tx.send(huge).await.unwrap();
        tx.send(good).await.unwrap();
        drop(tx);

        let stats = adapter.pump(rx).await;
        assert_eq!(
            stats,
            PumpStats {
                admitted: 1,
                denied: 0,
                invalid: 1
            }
        );
    }

    #[tokio::test]
    async fn test_pump_counts_outcomes() {
        let engine = engine(1);
        let adapter = IngestionAdapter::new(engine.clone(), Actor::system());
        let (tx, rx) = mpsc::channel(8);

        let first: OrderSubmission = serde_json::from_str(PAYLOAD).unwrap();
        let mut second = first.clone();
        second.order_number = "PA-1002".to_string();
        let mut broken = first.clone();
        broken.order_number = "PA-1003".to_string();
        broken.items.clear();

        tx.send(first).await.unwrap();
        tx.send(second).await.unwrap();
        tx.send(broken).await.unwrap();
        drop(tx);

        let stats = adapter.pump(rx).await;
        assert_eq!(
            stats,
            PumpStats {
                admitted: 1,
                denied: 1,
                invalid: 1
            }
        );
        assert_eq!(engine.get_capacity().unwrap().current_queue_length, 1);
    }
}

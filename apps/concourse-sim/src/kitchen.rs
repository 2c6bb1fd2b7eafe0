//! Stand-in for the staff at the counter.
//!
//! Every period, with some probability, accepts the oldest `new` order and
//! moves the oldest `accepted` order to `preparing`. Everything else is left
//! alone so the SLA scheduler has breaches to report.

use std::sync::Arc;
use std::time::Duration;

use concourse_core::{Order, OrderStatus};
use concourse_engine::{Actor, EngineResult, FulfillmentEngine, OrderFilter};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

pub struct Kitchen {
    engine: Arc<FulfillmentEngine>,
    actor: Actor,
    probability: f64,
    period: Duration,
    rng: StdRng,
}

impl Kitchen {
    pub fn new(engine: Arc<FulfillmentEngine>, probability: f64, period: Duration) -> Self {
        Kitchen {
            engine,
            actor: Actor::system(),
            probability: probability.clamp(0.0, 1.0),
            period,
            rng: StdRng::from_entropy(),
        }
    }

    /// One round. Returns the orders that moved.
    pub fn step(&mut self) -> EngineResult<Vec<Order>> {
        let mut moved = Vec::new();

        if self.rng.gen_bool(self.probability) {
            if let Some(order) = self.oldest(OrderStatus::New)? {
                moved.push(self.engine.accept_order(&order.id, &self.actor)?);
            }
        }

        if self.rng.gen_bool(self.probability) {
            if let Some(order) = self.oldest(OrderStatus::Accepted)? {
                moved.push(self.engine.start_preparing(&order.id, &self.actor)?);
            }
        }

        Ok(moved)
    }

    fn oldest(&self, status: OrderStatus) -> EngineResult<Option<Order>> {
        let mut orders = self
            .engine
            .list_orders(&OrderFilter::all().with_status(status))?;
        Ok(orders.pop())
    }

    pub async fn run(mut self, mut shutdown_rx: mpsc::Receiver<()>) {
        info!(
            period_secs = self.period.as_secs(),
            probability = self.probability,
            "Kitchen simulator started"
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.step() {
                        Ok(moved) => {
                            for order in moved {
                                debug!(order_number = %order.order_number, status = %order.status, "Kitchen moved order");
                            }
                        }
                        // Staff may have raced us to the same order.
                        Err(e) => warn!(error = %e, "Kitchen step failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }

        info!("Kitchen simulator stopped");
    }
}

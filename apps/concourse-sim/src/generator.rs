//! Synthetic order source.
//!
//! Produces plausible airside orders at a fixed period and pushes them into
//! the ingestion channel. Totals are always internally consistent so the
//! only rejections come from capacity.

use std::time::Duration;

use concourse_core::{
    Destination, Modifier, Money, OrderChannel, OrderItem, OrderSubmission, PaymentStatus,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// (name, sku, unit price in cents)
const MENU: &[(&str, &str, i64)] = &[
    ("Flat white", "BEV-FW", 450),
    ("Cold brew", "BEV-CB", 495),
    ("Bacon roll", "FD-BR", 725),
    ("Chicken wrap", "FD-CW", 995),
    ("Ramen bowl", "FD-RB", 1650),
    ("Fruit cup", "FD-FC", 550),
    ("Croissant", "BK-CR", 395),
];

const MODIFIERS: &[(&str, i64)] = &[("Oat milk", 60), ("Extra shot", 80), ("No onions", 0)];

const GATES: &[&str] = &["A2", "A14", "B5", "B9", "C1", "C22", "D7", "E3"];

const CUSTOMERS: &[&str] = &["M. Haddad", "J. Chen", "A. Novak", "S. Ortiz", "K. Mensah"];

pub struct OrderGenerator {
    rng: StdRng,
    next_number: u64,
    period: Duration,
}

impl OrderGenerator {
    pub fn new(period: Duration) -> Self {
        OrderGenerator {
            rng: StdRng::from_entropy(),
            next_number: 1,
            period,
        }
    }

    /// Reproducible sequence for tests.
    pub fn seeded(seed: u64, period: Duration) -> Self {
        OrderGenerator {
            rng: StdRng::seed_from_u64(seed),
            next_number: 1,
            period,
        }
    }

    pub fn next_submission(&mut self) -> OrderSubmission {
        let order_number = format!("SIM-{:04}", self.next_number);
        self.next_number += 1;

        let line_count = self.rng.gen_range(1..=3);
        let items: Vec<OrderItem> = (0..line_count).map(|_| self.item()).collect();
        let subtotal: Money = items.iter().filter_map(OrderItem::line_total).sum();

        let discount = if self.rng.gen_bool(0.15) {
            Money::from_cents(subtotal.cents() / 10)
        } else {
            Money::zero()
        };
        let service_fee = Money::from_cents(199);

        OrderSubmission {
            order_number,
            channel: OrderChannel::Synthetic,
            customer_name: CUSTOMERS.choose(&mut self.rng).map(|c| c.to_string()),
            items,
            subtotal,
            discount,
            service_fee,
            total: subtotal - discount + service_fee,
            destination: Destination {
                gate: GATES.choose(&mut self.rng).unwrap_or(&"A1").to_string(),
                zone: None,
            },
            payment_status: if self.rng.gen_bool(0.8) {
                PaymentStatus::Captured
            } else {
                PaymentStatus::Authorized
            },
        }
    }

    fn item(&mut self) -> OrderItem {
        let &(name, sku, cents) = MENU.choose(&mut self.rng).unwrap_or(&MENU[0]);
        let modifiers = if self.rng.gen_bool(0.3) {
            MODIFIERS
                .choose(&mut self.rng)
                .map(|&(name, delta)| Modifier {
                    name: name.to_string(),
                    price_delta: Money::from_cents(delta),
                })
                .into_iter()
                .collect()
        } else {
            Vec::new()
        };

        OrderItem {
            name: name.to_string(),
            sku: Some(sku.to_string()),
            quantity: self.rng.gen_range(1..=2),
            unit_price: Money::from_cents(cents),
            modifiers,
            status: Default::default(),
            notes: None,
        }
    }

    /// Emits one submission per period until shutdown or the receiver goes
    /// away. Dropping `tx` on return ends the ingestion pump.
    pub async fn run(mut self, tx: mpsc::Sender<OrderSubmission>, mut shutdown_rx: mpsc::Receiver<()>) {
        info!(period_secs = self.period.as_secs(), "Order generator started");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let submission = self.next_submission();
                    debug!(order_number = %submission.order_number, total = %submission.total, "Generated order");
                    if tx.send(submission).await.is_err() {
                        warn!("Ingestion channel closed");
                        break;
                    }
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }

        info!(generated = self.next_number - 1, "Order generator stopped");
    }
}

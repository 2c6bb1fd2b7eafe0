//! # Order Repository
//!
//! The canonical collection of orders and refund requests. CRUD and queries
//! only; every rule lives in the workflows above it.
//!
//! ## Locking Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  RwLock<OrderIndex>                   RwLock<RefundIndex>               │
//! │   ├── by_id:     id ──► Arc<Mutex<Order>>    id ──► Arc<Mutex<Refund>> │
//! │   └── by_number: order_number ──► id                                    │
//! │                                                                         │
//! │  Index locks are held only long enough to clone an Arc.                 │
//! │  Record mutexes serialize writers per order; different orders never     │
//! │  contend.                                                               │
//! │                                                                         │
//! │  Acquisition order when two records are involved:                       │
//! │      order mutex ──► refund index ──► refund mutex                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Commit Discipline
//! `with_order_mut` hands the closure a draft copy and stores it back only
//! on `Ok`. A failed operation leaves the stored order exactly as it was.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use concourse_core::{
    CoreError, Money, Order, OrderStatus, RefundRequest, RefundRequestStatus,
    ValidationError,
};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Filters
// =============================================================================

/// Query for [`OrderRepository::list_orders`]. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub statuses: Vec<OrderStatus>,
    pub gate: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl OrderFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn at_gate(mut self, gate: impl Into<String>) -> Self {
        self.gate = Some(gate.into());
        self
    }

    pub fn created_after(mut self, at: DateTime<Utc>) -> Self {
        self.created_after = Some(at);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&order.status) {
            return false;
        }
        if let Some(ref gate) = self.gate {
            if !order.destination.gate.eq_ignore_ascii_case(gate) {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if order.created_at <= after {
                return false;
            }
        }
        true
    }
}

/// Query for [`OrderRepository::list_refunds`].
#[derive(Debug, Clone, Default)]
pub struct RefundFilter {
    pub order_id: Option<String>,
    pub status: Option<RefundRequestStatus>,
}

impl RefundFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_status(mut self, status: RefundRequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, refund: &RefundRequest) -> bool {
        self.order_id.as_deref().map_or(true, |id| refund.order_id == id)
            && self.status.map_or(true, |s| refund.status == s)
    }
}

// =============================================================================
// Repository
// =============================================================================

type Record<T> = Arc<Mutex<T>>;

#[derive(Default)]
struct OrderIndex {
    by_id: HashMap<String, Record<Order>>,
    by_number: HashMap<String, String>,
}

#[derive(Default)]
pub struct OrderRepository {
    orders: RwLock<OrderIndex>,
    refunds: RwLock<HashMap<String, Record<RefundRequest>>>,
}

impl OrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Stores a new order. Fails on a reused id or order number.
    pub fn insert_order(&self, order: Order) -> EngineResult<()> {
        let mut index = self.orders.write()?;

        if index.by_number.contains_key(&order.order_number) {
            return Err(ValidationError::Duplicate {
                field: "order_number".to_string(),
                value: order.order_number.clone(),
            }
            .into());
        }
        if index.by_id.contains_key(&order.id) {
            return Err(ValidationError::Duplicate {
                field: "order id".to_string(),
                value: order.id.clone(),
            }
            .into());
        }

        index.by_number.insert(order.order_number.clone(), order.id.clone());
        index.by_id.insert(order.id.clone(), Arc::new(Mutex::new(order)));
        Ok(())
    }

    pub fn contains_order_number(&self, order_number: &str) -> EngineResult<bool> {
        Ok(self.orders.read()?.by_number.contains_key(order_number))
    }

    pub fn get_order(&self, id: &str) -> EngineResult<Order> {
        let record = self.order_record(id)?;
        let order = lock(&record)?;
        Ok(order.clone())
    }

    pub fn find_by_number(&self, order_number: &str) -> EngineResult<Order> {
        let id = self
            .orders
            .read()?
            .by_number
            .get(order_number)
            .cloned()
            .ok_or_else(|| CoreError::not_found("order", order_number))?;
        self.get_order(&id)
    }

    /// Runs `f` against a draft of the order while holding its lock.
    ///
    /// The draft replaces the stored order only if `f` returns `Ok`. Side
    /// effects `f` performs on other components happen under the same lock,
    /// so they are ordered exactly like the order's own transitions.
    pub fn with_order_mut<T, F>(&self, id: &str, f: F) -> EngineResult<T>
    where
        F: FnOnce(&mut Order) -> EngineResult<T>,
    {
        let record = self.order_record(id)?;
        let mut stored = lock(&record)?;

        let mut draft = stored.clone();
        let out = f(&mut draft)?;
        *stored = draft;
        Ok(out)
    }

    /// Orders matching `filter`, newest first.
    pub fn list_orders(&self, filter: &OrderFilter) -> EngineResult<Vec<Order>> {
        let records: Vec<Record<Order>> = self.orders.read()?.by_id.values().cloned().collect();

        let mut orders = Vec::new();
        for record in records {
            let order = lock(&record)?;
            if filter.matches(&order) {
                orders.push(order.clone());
            }
        }

        orders.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.order_number.cmp(&a.order_number))
        });
        if let Some(limit) = filter.limit {
            orders.truncate(limit);
        }
        Ok(orders)
    }

    pub fn order_count(&self) -> EngineResult<usize> {
        Ok(self.orders.read()?.by_id.len())
    }

    pub(crate) fn order_record(&self, id: &str) -> EngineResult<Record<Order>> {
        self.orders
            .read()?
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("order", id).into())
    }

    // =========================================================================
    // Refunds
    // =========================================================================

    pub fn insert_refund(&self, refund: RefundRequest) -> EngineResult<()> {
        let mut refunds = self.refunds.write()?;
        if refunds.contains_key(&refund.id) {
            return Err(ValidationError::Duplicate {
                field: "refund id".to_string(),
                value: refund.id.clone(),
            }
            .into());
        }
        refunds.insert(refund.id.clone(), Arc::new(Mutex::new(refund)));
        Ok(())
    }

    pub fn get_refund(&self, id: &str) -> EngineResult<RefundRequest> {
        let record = self.refund_record(id)?;
        let refund = lock(&record)?;
        Ok(refund.clone())
    }

    /// Refunds matching `filter`, newest first.
    pub fn list_refunds(&self, filter: &RefundFilter) -> EngineResult<Vec<RefundRequest>> {
        let records: Vec<Record<RefundRequest>> = self.refunds.read()?.values().cloned().collect();

        let mut refunds = Vec::new();
        for record in records {
            let refund = lock(&record)?;
            if filter.matches(&refund) {
                refunds.push(refund.clone());
            }
        }
        refunds.sort_by(|a, b| b.requested_at.cmp(&a.requested_at).then_with(|| b.id.cmp(&a.id)));
        Ok(refunds)
    }

    /// Sum of approved and pending refunds requested on `day` (UTC).
    pub fn refunds_committed_on(&self, day: NaiveDate) -> EngineResult<Money> {
        let committed = self
            .list_refunds(&RefundFilter::all())?
            .into_iter()
            .filter(|r| r.requested_at.date_naive() == day)
            .filter(|r| r.status != RefundRequestStatus::Declined)
            .fold(Money::zero(), |acc, r| acc.saturating_add(r.amount));
        Ok(committed)
    }

    pub(crate) fn refund_record(&self, id: &str) -> EngineResult<Record<RefundRequest>> {
        self.refunds
            .read()?
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("refund", id).into())
    }
}

/// Locks a record, surfacing poisoning as an engine error.
pub(crate) fn lock<T>(record: &Mutex<T>) -> EngineResult<MutexGuard<'_, T>> {
    record
        .lock()
        .map_err(|e| EngineError::LockPoisoned(e.to_string()))
}

#[cfg(test)]
impl OrderRepository {
    /// Leaves the refund index poisoned, as a writer panicking mid-update would.
    pub(crate) fn poison_refund_index(&self) {
        std::thread::scope(|s| {
            let _ = s
                .spawn(|| {
                    let _guard = self.refunds.write();
                    panic!("refund index writer panicked");
                })
                .join();
        });
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

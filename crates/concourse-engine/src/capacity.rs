//! # Capacity Controller
//!
//! The merchant's `CapacitySettings` as live, shared state.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  queue: AtomicU32           policy: RwLock<CapacityPolicy>              │
//! │  ────────────────           ──────────────────────────────              │
//! │  +1  admission (CAS,        max_queue_length                            │
//! │      only while < max)      avg_prep_time_minutes                       │
//! │  −1  ready / rejected /     is_accepting_orders                         │
//! │      failed / refunded      store_status                                │
//! │      (saturating at 0)                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The queue counter is never read-modify-written outside a CAS loop, so
//! concurrent admissions and completions cannot lose updates. A reservation
//! holds the policy read lock while it runs, so a manager lowering the limit
//! cannot interleave with the comparison.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

use concourse_core::{CapacitySettings, CoreError, StoreStatus, ValidationError};
use tracing::{debug, warn};

use crate::error::EngineResult;

#[derive(Debug, Clone)]
struct CapacityPolicy {
    max_queue_length: u32,
    avg_prep_time_minutes: u32,
    is_accepting_orders: bool,
    store_status: StoreStatus,
}

pub struct CapacityController {
    queue: AtomicU32,
    policy: RwLock<CapacityPolicy>,
}

impl CapacityController {
    pub fn new(initial: CapacitySettings) -> Self {
        CapacityController {
            queue: AtomicU32::new(initial.current_queue_length),
            policy: RwLock::new(CapacityPolicy {
                max_queue_length: initial.max_queue_length,
                avg_prep_time_minutes: initial.avg_prep_time_minutes,
                is_accepting_orders: initial.is_accepting_orders,
                store_status: initial.store_status,
            }),
        }
    }

    pub fn snapshot(&self) -> EngineResult<CapacitySettings> {
        let policy = self.policy.read()?;
        Ok(Self::settings(&policy, self.queue.load(Ordering::SeqCst)))
    }

    /// Applies the admission rule and, if it passes, takes one queue slot.
    ///
    /// Returns the queue length after the reservation.
    pub fn try_reserve(&self) -> EngineResult<u32> {
        let policy = self.policy.read()?;

        // Closed and not-accepting are reported before capacity.
        Self::settings(&policy, 0).check_admission()?;

        let max = policy.max_queue_length;
        let previous = self
            .queue
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < max).then(|| current + 1)
            })
            .map_err(|current| CoreError::CapacityExceeded { current, max })?;

        debug!(queue = previous + 1, max, "Queue slot reserved");
        Ok(previous + 1)
    }

    /// Gives one slot back. Never drops below zero.
    pub fn release(&self) -> u32 {
        match self
            .queue
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_sub(1)
            }) {
            Ok(previous) => previous - 1,
            Err(_) => {
                warn!("Queue release with an empty queue; ignoring");
                0
            }
        }
    }

    // =========================================================================
    // Manager Controls
    // =========================================================================

    pub fn set_store_status(&self, status: StoreStatus) -> EngineResult<CapacitySettings> {
        self.update(|p| p.store_status = status)
    }

    pub fn set_accepting_orders(&self, accepting: bool) -> EngineResult<CapacitySettings> {
        self.update(|p| p.is_accepting_orders = accepting)
    }

    /// Lowering the limit below the current queue blocks admission until
    /// enough orders complete; it never evicts.
    pub fn set_max_queue_length(&self, max: u32) -> EngineResult<CapacitySettings> {
        if max == 0 {
            return Err(ValidationError::MustBePositive {
                field: "max_queue_length".to_string(),
            }
            .into());
        }
        self.update(|p| p.max_queue_length = max)
    }

    pub fn set_avg_prep_time(&self, minutes: u32) -> EngineResult<CapacitySettings> {
        if minutes == 0 {
            return Err(ValidationError::MustBePositive {
                field: "avg_prep_time_minutes".to_string(),
            }
            .into());
        }
        self.update(|p| p.avg_prep_time_minutes = minutes)
    }

    fn update(&self, f: impl FnOnce(&mut CapacityPolicy)) -> EngineResult<CapacitySettings> {
        let mut policy = self.policy.write()?;
        f(&mut policy);
        Ok(Self::settings(&policy, self.queue.load(Ordering::SeqCst)))
    }

    fn settings(policy: &CapacityPolicy, current: u32) -> CapacitySettings {
        CapacitySettings {
            current_queue_length: current,
            max_queue_length: policy.max_queue_length,
            avg_prep_time_minutes: policy.avg_prep_time_minutes,
            is_accepting_orders: policy.is_accepting_orders,
            store_status: policy.store_status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn controller(current: u32, max: u32) -> CapacityController {
        CapacityController::new(CapacitySettings {
            current_queue_length: current,
            max_queue_length: max,
            avg_prep_time_minutes: 10,
            is_accepting_orders: true,
            store_status: StoreStatus::Open,
        })
    }

    #[test]
    fn test_full_queue_is_unchanged() {
        let c = controller(20, 20);
        let err = c.try_reserve().unwrap_err();
        assert_eq!(err.domain(), Some(&CoreError::CapacityExceeded { current: 20, max: 20 }));
        assert_eq!(c.snapshot().unwrap().current_queue_length, 20);
    }

    #[test]
    fn test_last_slot_is_taken() {
        let c = controller(19, 20);
        assert_eq!(c.try_reserve().unwrap(), 20);
        assert_eq!(c.snapshot().unwrap().current_queue_length, 20);
    }

    #[test]
    fn test_closed_beats_full() {
        let c = controller(20, 20);
        c.set_store_status(StoreStatus::Closed).unwrap();
        assert_eq!(c.try_reserve().unwrap_err().domain(), Some(&CoreError::StoreClosed));

        c.set_store_status(StoreStatus::Busy).unwrap();
        c.set_accepting_orders(false).unwrap();
        assert_eq!(c.try_reserve().unwrap_err().domain(), Some(&CoreError::NotAccepting));
    }

    #[test]
    fn test_release_saturates() {
        let c = controller(1, 20);
        assert_eq!(c.release(), 0);
        assert_eq!(c.release(), 0);
        assert_eq!(c.snapshot().unwrap().current_queue_length, 0);
    }

    #[test]
    fn test_concurrent_reservations_never_overfill() {
        let c = Arc::new(controller(0, 25));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&c);
                thread::spawn(move || (0..10).filter(|_| c.try_reserve().is_ok()).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 25);
        assert_eq!(c.snapshot().unwrap().current_queue_length, 25);
    }

    #[test]
    fn test_manager_setters_validate() {
        let c = controller(0, 20);
        assert!(c.set_max_queue_length(0).is_err());
        assert!(c.set_avg_prep_time(0).is_err());
        let s = c.set_avg_prep_time(7).unwrap();
        assert_eq!(s.avg_prep_time_minutes, 7);
    }
}

//! # SLA Clock Engine
//!
//! Tracks one deadline per monitored order and reports breaches from a
//! single shared tick.
//!
//! ## Structure
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SlaClockEngine                                  │
//! │                                                                         │
//! │  clocks: order_id ──► ClockEntry { kind, deadline, window, generation } │
//! │                                                                         │
//! │  heap:   min-heap of (deadline, generation, order_id)                   │
//! │          ┌─────────┐                                                    │
//! │          │ 12:00:30│ ◄── tick pops everything due                       │
//! │          │ 12:01:10│                                                    │
//! │          │ 12:29:55│                                                    │
//! │          └─────────┘                                                    │
//! │                                                                         │
//! │  stop() only removes from `clocks`. A popped heap entry whose           │
//! │  generation no longer matches is stale and dropped (lazy deletion).     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduler
//! [`SlaScheduler`] is the one background task. It calls
//! [`SlaClockEngine::tick`] every period; callers never wait on it.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use concourse_core::{SlaKind, SlaSnapshot};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};
use crate::events::{DomainEvent, EventSink};

/// Rebuild the heap once stale entries outnumber live ones by this much.
const HEAP_COMPACTION_SLACK: usize = 64;

#[derive(Debug, Clone)]
struct ClockEntry {
    kind: SlaKind,
    deadline: DateTime<Utc>,
    total_window_secs: i64,
    generation: u64,
}

#[derive(Default)]
struct ClockTable {
    clocks: HashMap<String, ClockEntry>,
    heap: BinaryHeap<Reverse<(DateTime<Utc>, u64, String)>>,
    /// (order, kind, deadline) triples that already raised a breach.
    breached: HashSet<(String, SlaKind, DateTime<Utc>)>,
    next_generation: u64,
}

impl ClockTable {
    fn compact_if_needed(&mut self) {
        if self.heap.len() <= self.clocks.len() * 2 + HEAP_COMPACTION_SLACK {
            return;
        }
        let live: BinaryHeap<_> = self
            .clocks
            .iter()
            .map(|(id, c)| Reverse((c.deadline, c.generation, id.clone())))
            .collect();
        debug!(before = self.heap.len(), after = live.len(), "Compacted SLA heap");
        self.heap = live;
    }
}

/// One active clock, as shown to the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockView {
    pub order_id: String,
    pub kind: SlaKind,
    pub deadline: DateTime<Utc>,
    pub snapshot: SlaSnapshot,
}

pub struct SlaClockEngine {
    table: Mutex<ClockTable>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
}

impl SlaClockEngine {
    pub fn new(clock: Arc<dyn Clock>, sink: Arc<dyn EventSink>) -> Self {
        SlaClockEngine {
            table: Mutex::new(ClockTable::default()),
            clock,
            sink,
        }
    }

    /// Starts (or replaces) the clock for `order_id`.
    pub fn start(
        &self,
        order_id: &str,
        kind: SlaKind,
        deadline: DateTime<Utc>,
        total_window_secs: i64,
    ) -> EngineResult<()> {
        let mut table = self.lock()?;
        table.next_generation += 1;
        let generation = table.next_generation;

        table.clocks.insert(
            order_id.to_string(),
            ClockEntry {
                kind,
                deadline,
                total_window_secs,
                generation,
            },
        );
        table
            .heap
            .push(Reverse((deadline, generation, order_id.to_string())));
        table.compact_if_needed();

        debug!(order_id = %order_id, kind = %kind, deadline = %deadline, "SLA clock started");
        Ok(())
    }

    /// Stops the clock, whether or not it already expired. Returns whether
    /// one was running.
    pub fn stop(&self, order_id: &str) -> EngineResult<bool> {
        let mut table = self.lock()?;
        let stopped = table.clocks.remove(order_id).is_some();
        if stopped {
            debug!(order_id = %order_id, "SLA clock stopped");
        }
        Ok(stopped)
    }

    /// Drops all state for an order that will never be monitored again.
    pub fn forget(&self, order_id: &str) -> EngineResult<()> {
        let mut table = self.lock()?;
        table.clocks.remove(order_id);
        table.breached.retain(|(id, _, _)| id != order_id);
        Ok(())
    }

    pub fn snapshot(&self, order_id: &str) -> EngineResult<Option<ClockView>> {
        let now = self.clock.now();
        let table = self.lock()?;
        Ok(table
            .clocks
            .get(order_id)
            .map(|entry| Self::view(order_id, entry, now)))
    }

    /// Every active clock, most urgent first.
    pub fn active_clocks(&self) -> EngineResult<Vec<ClockView>> {
        let now = self.clock.now();
        let table = self.lock()?;
        let mut views: Vec<ClockView> = table
            .clocks
            .iter()
            .map(|(id, entry)| Self::view(id, entry, now))
            .collect();
        views.sort_by(|a, b| a.deadline.cmp(&b.deadline).then_with(|| a.order_id.cmp(&b.order_id)));
        Ok(views)
    }

    pub fn active_count(&self) -> EngineResult<usize> {
        Ok(self.lock()?.clocks.len())
    }

    /// Pops every due deadline and publishes one `SlaBreached` per clock.
    ///
    /// Events are published after the table lock is released.
    pub fn tick(&self) -> EngineResult<Vec<DomainEvent>> {
        let now = self.clock.now();
        let mut breaches = Vec::new();

        {
            let mut table = self.lock()?;
            while let Some(Reverse((deadline, generation, _))) = table.heap.peek() {
                if *deadline > now {
                    break;
                }
                let live_generation = *generation;
                let Some(Reverse((deadline, _, order_id))) = table.heap.pop() else {
                    break;
                };

                let kind = match table.clocks.get(&order_id) {
                    Some(entry) if entry.generation == live_generation => entry.kind,
                    _ => continue, // stale
                };

                if table.breached.insert((order_id.clone(), kind, deadline)) {
                    breaches.push(DomainEvent::SlaBreached {
                        order_id,
                        kind,
                        deadline,
                        at: now,
                    });
                }
            }
        }

        for event in &breaches {
            if let DomainEvent::SlaBreached {
                order_id,
                kind,
                deadline,
                ..
            } = event
            {
                warn!(order_id = %order_id, kind = %kind, deadline = %deadline, "SLA breached");
            }
            self.sink.publish(event.clone());
        }
        Ok(breaches)
    }

    fn view(order_id: &str, entry: &ClockEntry, now: DateTime<Utc>) -> ClockView {
        ClockView {
            order_id: order_id.to_string(),
            kind: entry.kind,
            deadline: entry.deadline,
            snapshot: SlaSnapshot::compute(entry.deadline, now, entry.total_window_secs),
        }
    }

    fn lock(&self) -> EngineResult<std::sync::MutexGuard<'_, ClockTable>> {
        self.table
            .lock()
            .map_err(|e| EngineError::LockPoisoned(e.to_string()))
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// The single background task driving [`SlaClockEngine::tick`].
pub struct SlaScheduler;

/// Handle for stopping a running scheduler.
pub struct SlaSchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SlaScheduler {
    /// Spawns the tick loop on the current tokio runtime.
    pub fn spawn(engine: Arc<SlaClockEngine>, period: Duration) -> SlaSchedulerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(Self::run(engine, period, shutdown_rx));
        SlaSchedulerHandle { shutdown_tx, task }
    }

    async fn run(engine: Arc<SlaClockEngine>, period: Duration, mut shutdown_rx: mpsc::Receiver<()>) {
        info!(period_ms = period.as_millis() as u64, "SLA scheduler started");

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match engine.tick() {
                        Ok(breaches) if !breaches.is_empty() => {
                            debug!(count = breaches.len(), "SLA tick raised breaches");
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "SLA tick failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("SLA scheduler received shutdown");
                    break;
                }
            }
        }
    }
}

impl SlaSchedulerHandle {
    /// Signals the loop to stop and waits for it to exit.
    pub async fn shutdown(self) -> EngineResult<()> {
        let _ = self.shutdown_tx.send(()).await;
        self.task
            .await
            .map_err(|e| EngineError::ChannelClosed(format!("SLA scheduler task failed: {}", e)))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

//! Admission gate bounding how many jobs run their transform at once.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::metrics;

/// Error returned when the gate no longer admits jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Admission gate is closed")]
pub struct GateClosed;

/// Snapshot of gate bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateStatus {
    /// Maximum concurrently admitted jobs.
    pub capacity: usize,
    /// Jobs waiting for a slot.
    pub queued: u64,
    /// Jobs holding a slot.
    pub active: u64,
    /// Jobs admitted since start.
    pub total_admitted: u64,
}

impl GateStatus {
    /// Queued plus running jobs.
    pub fn live(&self) -> u64 {
        self.queued + self.active
    }
}

/// Counters are advisory and never used for admission decisions.
#[derive(Default)]
struct GateStats {
    queued: AtomicU64,
    active: AtomicU64,
    total_admitted: AtomicU64,
}

/// Decrements the queued count however the wait ends.
struct QueuedGuard<'a>(&'a GateStats);

impl Drop for QueuedGuard<'_> {
    fn drop(&mut self) {
        self.0.queued.fetch_sub(1, Ordering::Relaxed);
        metrics::GATE_QUEUED.dec();
    }
}

/// A held slot. Dropping it frees the slot.
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
    stats: Arc<GateStats>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.stats.active.fetch_sub(1, Ordering::Relaxed);
        metrics::GATE_ACTIVE.dec();
    }
}

impl std::fmt::Debug for AdmissionPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionPermit").finish_non_exhaustive()
    }
}

/// Capacity-bounded gate, created once per process and shared by handle.
///
/// Waiters are woken roughly in arrival order; strict FIFO is not promised.
pub struct AdmissionGate {
    capacity: usize,
    semaphore: Arc<Semaphore>,
    stats: Arc<GateStats>,
}

impl AdmissionGate {
    /// Creates a gate with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            stats: Arc::new(GateStats::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether a new job would have to wait.
    pub fn is_saturated(&self) -> bool {
        self.semaphore.available_permits() == 0
    }

    /// Waits for a free slot.
    pub async fn acquire(&self) -> Result<AdmissionPermit, GateClosed> {
        self.stats.queued.fetch_add(1, Ordering::Relaxed);
        metrics::GATE_QUEUED.inc();
        let queued = QueuedGuard(&self.stats);

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GateClosed)?;
        drop(queued);

        self.stats.active.fetch_add(1, Ordering::Relaxed);
        let total = self.stats.total_admitted.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::GATE_ACTIVE.inc();
        debug!(total, "Job admitted");

        Ok(AdmissionPermit {
            _permit: permit,
            stats: self.stats.clone(),
        })
    }

    /// Stops admitting. Waiting and future acquires fail; held permits stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn status(&self) -> GateStatus {
        GateStatus {
            capacity: self.capacity,
            queued: self.stats.queued.load(Ordering::Relaxed),
            active: self.stats.active.load(Ordering::Relaxed),
            total_admitted: self.stats.total_admitted.load(Ordering::Relaxed),
        }
    }
}

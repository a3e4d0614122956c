use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::observability::{GATE_IN_FLIGHT, GATE_WAIT_SECONDS};

/// Bounds how many client-initiated allocation operations run at once,
/// independent of which event they target.
///
/// Waiters are admitted in arrival order (tokio's semaphore is FIFO), so
/// every waiter eventually enters as long as admitted operations finish.
/// Dropping an `enter()` future before it resolves gives up its place in
/// line without consuming a slot.
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    size: usize,
    peak: AtomicUsize,
}

/// Proof of admission. The slot is released when the token is dropped.
#[derive(Debug)]
#[must_use = "the gate slot is released as soon as the token is dropped"]
pub struct GateToken {
    _permit: OwnedSemaphorePermit,
}

impl Drop for GateToken {
    fn drop(&mut self) {
        metrics::gauge!(GATE_IN_FLIGHT).decrement(1.0);
    }
}

impl AdmissionGate {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
            peak: AtomicUsize::new(0),
        }
    }

    /// Wait for a free slot. Never fails.
    pub async fn enter(&self) -> GateToken {
        let started = Instant::now();
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("admission gate semaphore is never closed");
        metrics::histogram!(GATE_WAIT_SECONDS).record(started.elapsed().as_secs_f64());
        metrics::gauge!(GATE_IN_FLIGHT).increment(1.0);
        self.peak.fetch_max(self.in_flight(), Ordering::Relaxed);
        GateToken { _permit: permit }
    }

    /// Release a slot explicitly. Equivalent to dropping the token.
    pub fn leave(&self, token: GateToken) {
        drop(token);
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Operations currently admitted.
    pub fn in_flight(&self) -> usize {
        self.size - self.semaphore.available_permits()
    }

    /// Highest number of operations ever admitted at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_GATE_SIZE)
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::model::{ClientId, EventId};

/// One pending reservation's timer key.
pub type TimerKey = (EventId, ClientId);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    AlreadyArmed(TimerKey),
}

impl std::fmt::Display for TimerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerError::AlreadyArmed((event_id, client_id)) => {
                write!(f, "timer already armed for {client_id} on {event_id}")
            }
        }
    }
}

impl std::error::Error for TimerError {}

struct Armed {
    generation: u64,
    handle: AbortHandle,
}

/// Keyed, cancellable hold timers.
///
/// When a sleep elapses the timer first claims its key by removing it from
/// the armed table, then sends the key on the fired channel. Whichever of
/// `cancel` and the claim removes the entry first wins, so a hold is either
/// cancelled or fired, never both.
pub struct ReservationTimer {
    armed: Arc<DashMap<TimerKey, Armed>>,
    next_generation: AtomicU64,
    fired_tx: mpsc::UnboundedSender<TimerKey>,
}

impl ReservationTimer {
    /// Create a timer and the receiving end of its fired channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerKey>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let timer = Self {
            armed: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
            fired_tx,
        };
        (timer, fired_rx)
    }

    /// Schedule one fire for `key` after `duration`. Must run inside a tokio runtime.
    pub fn arm(&self, key: TimerKey, duration: Duration) -> Result<(), TimerError> {
        match self.armed.entry(key) {
            Entry::Occupied(e) => Err(TimerError::AlreadyArmed(e.key().clone())),
            Entry::Vacant(slot) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let armed = self.armed.clone();
                let fired_tx = self.fired_tx.clone();
                let key = slot.key().clone();
                // The spawned task can't observe the table before `slot.insert`
                // returns: it needs this shard's lock to claim.
                let task = tokio::spawn(async move {
                    tokio::time::sleep(duration).await;
                    let claimed = armed
                        .remove_if(&key, |_, a| a.generation == generation)
                        .is_some();
                    if claimed {
                        let _ = fired_tx.send(key);
                    }
                });
                slot.insert(Armed {
                    generation,
                    handle: task.abort_handle(),
                });
                Ok(())
            }
        }
    }

    /// Stop a timer before it fires. Returns false if nothing was armed for
    /// `key`, including when the timer has already fired.
    pub fn cancel(&self, key: &TimerKey) -> bool {
        match self.armed.remove(key) {
            Some((_, armed)) => {
                armed.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, key: &TimerKey) -> bool {
        self.armed.contains_key(key)
    }

    /// Number of timers currently armed.
    pub fn armed(&self) -> usize {
        self.armed.len()
    }
}

impl Drop for ReservationTimer {
    fn drop(&mut self) {
        for entry in self.armed.iter() {
            entry.value().handle.abort();
        }
    }
}

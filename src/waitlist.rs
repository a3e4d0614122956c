use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::model::{ClientId, EventId, Ms};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub event_id: EventId,
    pub client_id: ClientId,
    pub enqueued_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitlistError {
    Duplicate(ClientId),
}

impl std::fmt::Display for WaitlistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitlistError::Duplicate(client) => write!(f, "{client} is already waitlisted"),
        }
    }
}

impl std::error::Error for WaitlistError {}

/// FIFO of clients waiting for a seat on one event. A client appears at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitlistQueue {
    event_id: EventId,
    entries: VecDeque<WaitlistEntry>,
}

impl WaitlistQueue {
    pub fn new(event_id: EventId) -> Self {
        Self {
            event_id,
            entries: VecDeque::new(),
        }
    }

    /// Append a client, returning its 1-based position.
    pub fn enqueue(&mut self, client_id: ClientId, now: Ms) -> Result<usize, WaitlistError> {
        if self.contains(&client_id) {
            return Err(WaitlistError::Duplicate(client_id));
        }
        self.entries.push_back(WaitlistEntry {
            event_id: self.event_id,
            client_id,
            enqueued_at: now,
        });
        Ok(self.entries.len())
    }

    /// Remove and return the earliest entry.
    pub fn dequeue_next(&mut self) -> Option<WaitlistEntry> {
        self.entries.pop_front()
    }

    /// Client identities in promotion order.
    pub fn snapshot(&self) -> Vec<ClientId> {
        self.entries.iter().map(|e| e.client_id.clone()).collect()
    }

    /// Withdraw a client from anywhere in the queue.
    pub fn remove(&mut self, client_id: &str) -> bool {
        if let Some(pos) = self.entries.iter().position(|e| e.client_id == client_id) {
            self.entries.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.entries.iter().any(|e| e.client_id == client_id)
    }

    /// 1-based position of a client, if queued.
    pub fn position(&self, client_id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.client_id == client_id)
            .map(|p| p + 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

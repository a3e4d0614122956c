use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds.
pub type Ms = i64;

/// Opaque event identity.
pub type EventId = Ulid;

/// Opaque client identity (a user name, session id, ...).
pub type ClientId = String;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// A seat granted to a client but not yet confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingReservation {
    pub event_id: EventId,
    pub client_id: ClientId,
    pub granted_at: Ms,
    pub deadline: Ms,
}

impl PendingReservation {
    /// Milliseconds left before the hold lapses, zero once past the deadline.
    pub fn remaining_ms(&self, now: Ms) -> u64 {
        (self.deadline - now).max(0) as u64
    }
}

/// Persisted form of a pending hold inside an [`EventRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRecord {
    pub client_id: ClientId,
    pub granted_at: Ms,
    pub deadline: Ms,
}

/// What the event store keeps per event. Holders not listed in `pending`
/// are confirmed. Waitlists are not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub name: String,
    pub total_seats: u32,
    pub available_seats: u32,
    pub holders: Vec<ClientId>,
    pub pending: Vec<PendingRecord>,
}

impl EventRecord {
    pub fn new(name: String, total_seats: u32) -> Self {
        Self {
            name,
            total_seats,
            available_seats: total_seats,
            holders: Vec::new(),
            pending: Vec::new(),
        }
    }
}

/// Result of a reserve call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    Granted(PendingReservation),
    /// 1-based position in the event's waitlist.
    Waitlisted { position: usize },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInfo {
    pub id: EventId,
    pub name: String,
    pub total_seats: u32,
    pub available_seats: u32,
    pub holders: Vec<ClientId>,
    pub pending: usize,
    pub waitlisted: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ClientStatus {
    Pending { deadline: Ms },
    Confirmed,
    Waitlisted { position: usize },
}

use std::collections::HashMap;
use std::time::Duration;

use crate::ledger::{LedgerError, SeatLedger};
use crate::limits::{MAX_LAPSED_PER_EVENT, MAX_WAITLIST_LEN};
use crate::model::*;
use crate::notify::Notification;
use crate::waitlist::WaitlistQueue;

use super::EngineError;

fn hold_ms(hold: Duration) -> Ms {
    Ms::try_from(hold.as_millis()).unwrap_or(Ms::MAX)
}

/// Outcome of running one client through `Requested`.
pub(super) enum Admission {
    Granted(PendingReservation),
    Waitlisted { position: usize },
}

/// Everything the engine knows about one event. Lives behind that event's
/// lock; every field changes only while the write lock is held.
#[derive(Debug, Clone)]
pub struct EventState {
    pub id: EventId,
    pub name: String,
    pub ledger: SeatLedger,
    pub waitlist: WaitlistQueue,
    /// Holders whose seat still awaits confirmation. Always a subset of the
    /// ledger's holders.
    pub pending: HashMap<ClientId, PendingReservation>,
    /// Clients whose hold lapsed and who have not asked again since, with
    /// when it lapsed. Forgotten after one hold period.
    pub(super) lapsed: HashMap<ClientId, Ms>,
}

impl EventState {
    pub fn new(id: EventId, name: String, total_seats: u32) -> Self {
        Self {
            id,
            name,
            ledger: SeatLedger::new(total_seats),
            waitlist: WaitlistQueue::new(id),
            pending: HashMap::new(),
            lapsed: HashMap::new(),
        }
    }

    pub fn from_record(id: EventId, record: EventRecord) -> Result<Self, EngineError> {
        let violation = |detail| EngineError::CapacityInvariantViolation { event_id: id, detail };
        let ledger =
            SeatLedger::from_parts(record.total_seats, record.available_seats, record.holders)
                .map_err(violation)?;

        let mut pending = HashMap::with_capacity(record.pending.len());
        for p in record.pending {
            if !ledger.is_holder(&p.client_id) {
                return Err(violation(LedgerError::Inconsistent {
                    total: ledger.total_seats(),
                    available: ledger.available_seats(),
                    holders: ledger.holders().count(),
                }));
            }
            pending.insert(
                p.client_id.clone(),
                PendingReservation {
                    event_id: id,
                    client_id: p.client_id,
                    granted_at: p.granted_at,
                    deadline: p.deadline,
                },
            );
        }

        Ok(Self {
            id,
            name: record.name,
            ledger,
            waitlist: WaitlistQueue::new(id),
            pending,
            lapsed: HashMap::new(),
        })
    }

    pub fn record(&self) -> EventRecord {
        let mut pending: Vec<PendingRecord> = self
            .pending
            .values()
            .map(|p| PendingRecord {
                client_id: p.client_id.clone(),
                granted_at: p.granted_at,
                deadline: p.deadline,
            })
            .collect();
        pending.sort_by(|a, b| (a.granted_at, &a.client_id).cmp(&(b.granted_at, &b.client_id)));

        EventRecord {
            name: self.name.clone(),
            total_seats: self.ledger.total_seats(),
            available_seats: self.ledger.available_seats(),
            holders: self.ledger.holders().cloned().collect(),
            pending,
        }
    }

    pub fn info(&self) -> EventInfo {
        EventInfo {
            id: self.id,
            name: self.name.clone(),
            total_seats: self.ledger.total_seats(),
            available_seats: self.ledger.available_seats(),
            holders: self.ledger.holders().cloned().collect(),
            pending: self.pending.len(),
            waitlisted: self.waitlist.len(),
        }
    }

    pub fn status(&self, client_id: &str) -> Option<ClientStatus> {
        if let Some(p) = self.pending.get(client_id) {
            return Some(ClientStatus::Pending { deadline: p.deadline });
        }
        if self.ledger.is_holder(client_id) {
            return Some(ClientStatus::Confirmed);
        }
        self.waitlist
            .position(client_id)
            .map(|position| ClientStatus::Waitlisted { position })
    }

    pub(super) fn changed(&self) -> Notification {
        Notification::Changed {
            event_id: self.id,
            available_seats: self.ledger.available_seats(),
            total_seats: self.ledger.total_seats(),
            waitlist: self.waitlist.snapshot(),
        }
    }

    /// `Requested → Granted-Pending` if a seat is free, else `Requested → Waitlisted`.
    pub(super) fn request(
        &mut self,
        client_id: ClientId,
        now: Ms,
        hold: Duration,
    ) -> Result<Admission, EngineError> {
        self.lapsed.remove(&client_id);

        if self.ledger.try_grant() {
            self.ledger.record_holder(client_id.clone());
            let pending = PendingReservation {
                event_id: self.id,
                client_id: client_id.clone(),
                granted_at: now,
                deadline: now.saturating_add(hold_ms(hold)),
            };
            self.pending.insert(client_id, pending.clone());
            return Ok(Admission::Granted(pending));
        }

        if self.waitlist.len() >= MAX_WAITLIST_LEN {
            return Err(EngineError::LimitExceeded("waitlist full"));
        }
        let position = self
            .waitlist
            .enqueue(client_id.clone(), now)
            .map_err(|_| EngineError::AlreadyWaitlisted {
                event_id: self.id,
                client_id,
            })?;
        Ok(Admission::Waitlisted { position })
    }

    /// Remember that `client_id`'s hold lapsed at `now`, dropping lapses
    /// older than one hold period.
    pub(super) fn mark_lapsed(&mut self, client_id: &str, now: Ms, hold: Duration) {
        let horizon = now.saturating_sub(hold_ms(hold));
        self.lapsed.retain(|_, at| *at >= horizon);
        if self.lapsed.len() >= MAX_LAPSED_PER_EVENT {
            let oldest = self
                .lapsed
                .iter()
                .min_by_key(|(_, at)| **at)
                .map(|(c, _)| c.clone());
            if let Some(oldest) = oldest {
                self.lapsed.remove(&oldest);
            }
        }
        self.lapsed.insert(client_id.to_string(), now);
    }

    /// Whether `client_id`'s hold lapsed within the last hold period.
    pub(super) fn recently_lapsed(&self, client_id: &str, now: Ms, hold: Duration) -> bool {
        self.lapsed
            .get(client_id)
            .is_some_and(|at| now.saturating_sub(*at) <= hold_ms(hold))
    }

    /// Return `released`'s seat to the pool and hand it straight to the head
    /// of the waitlist, if anyone is waiting. The caller has already dropped
    /// any pending entry for `released`.
    pub(super) fn reclaim_and_promote(
        &mut self,
        released: &str,
        now: Ms,
        hold: Duration,
    ) -> Result<Option<PendingReservation>, EngineError> {
        self.ledger.remove_holder(released);
        self.ledger
            .reclaim()
            .map_err(|detail| EngineError::CapacityInvariantViolation {
                event_id: self.id,
                detail,
            })?;

        let Some(next) = self.waitlist.dequeue_next() else {
            return Ok(None);
        };
        match self.request(next.client_id, now, hold)? {
            Admission::Granted(pending) => Ok(Some(pending)),
            Admission::Waitlisted { .. } => Ok(None),
        }
    }
}

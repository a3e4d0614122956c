use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::{Notification, Topic};
use crate::observability::{CONFIRMATIONS_TOTAL, EVENTS_ACTIVE, RESERVATIONS_TOTAL};

use super::state::{Admission, EventState};
use super::{AllocationEngine, EngineError, timer_key};

fn validate_client(client_id: &str) -> Result<(), EngineError> {
    if client_id.trim().is_empty() {
        return Err(EngineError::LimitExceeded("empty client id"));
    }
    if client_id.len() > MAX_CLIENT_ID_LEN {
        return Err(EngineError::LimitExceeded("client id too long"));
    }
    Ok(())
}

impl AllocationEngine {
    /// Register a new event with every seat available.
    pub async fn create_event(
        &self,
        name: impl Into<String>,
        total_seats: u32,
    ) -> Result<EventId, EngineError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(EngineError::LimitExceeded("empty event name"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("event name too long"));
        }
        if total_seats > MAX_SEATS_PER_EVENT {
            return Err(EngineError::LimitExceeded("too many seats"));
        }
        // Take an event slot before the name so racing creates cannot both
        // land on the last one. Every failure below hands it back.
        self.event_slots
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < MAX_EVENTS).then_some(n + 1)
            })
            .map_err(|_| EngineError::LimitExceeded("too many events"))?;

        let id = Ulid::new();
        match self.names.entry(name.clone()) {
            Entry::Occupied(_) => {
                self.event_slots.fetch_sub(1, Ordering::AcqRel);
                return Err(EngineError::AlreadyExists(name));
            }
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let es = EventState::new(id, name.clone(), total_seats);
        if let Err(e) = self.store.save(id, &es.record()).await {
            self.names.remove(&name);
            self.event_slots.fetch_sub(1, Ordering::AcqRel);
            return Err(e.into());
        }
        let changed = es.changed();
        self.state.insert(id, Arc::new(RwLock::new(es)));
        metrics::gauge!(EVENTS_ACTIVE).set(self.state.len() as f64);
        info!("created event {id} ({name}) with {total_seats} seats");
        self.notify.publish(Topic::Changed, &changed);
        Ok(id)
    }

    /// Ask for a seat. Grants one if free (the client must confirm before the
    /// hold timeout), otherwise puts the client at the back of the waitlist.
    pub async fn reserve(
        &self,
        event_id: EventId,
        client_id: impl Into<ClientId>,
    ) -> Result<Reservation, EngineError> {
        let client_id = client_id.into();
        validate_client(&client_id)?;

        let _token = self.gate.enter().await;
        let result = self.reserve_admitted(event_id, client_id).await;
        let outcome = match &result {
            Ok(Reservation::Granted(_)) => "granted",
            Ok(Reservation::Waitlisted { .. }) => "waitlisted",
            Err(_) => "error",
        };
        metrics::counter!(RESERVATIONS_TOTAL, "outcome" => outcome).increment(1);
        result
    }

    async fn reserve_admitted(
        &self,
        event_id: EventId,
        client_id: ClientId,
    ) -> Result<Reservation, EngineError> {
        let rs = self.resolve(&event_id)?;
        let mut guard = rs.write().await;
        if guard.pending.contains_key(&client_id) || guard.ledger.is_holder(&client_id) {
            return Err(EngineError::AlreadyHolding { event_id, client_id });
        }
        if guard.waitlist.contains(&client_id) {
            return Err(EngineError::AlreadyWaitlisted { event_id, client_id });
        }

        let mut next = guard.clone();
        let admission = next.request(client_id.clone(), now_ms(), self.config.hold_timeout)?;
        self.commit(&mut guard, next).await?;

        match admission {
            Admission::Granted(pending) => {
                self.arm_hold(&pending, pending.granted_at)?;
                info!("granted seat on {event_id} to {client_id}");
                self.publish_granted(&pending);
                self.notify.publish(Topic::Changed, &guard.changed());
                Ok(Reservation::Granted(pending))
            }
            Admission::Waitlisted { position } => {
                info!("waitlisted {client_id} on {event_id} at position {position}");
                self.notify.publish(
                    Topic::Waitlisted,
                    &Notification::Waitlisted {
                        event_id,
                        client_id,
                        queue: guard.waitlist.snapshot(),
                    },
                );
                self.notify.publish(Topic::Changed, &guard.changed());
                Ok(Reservation::Waitlisted { position })
            }
        }
    }

    /// Turn a pending hold into a confirmed seat. Confirming an already
    /// confirmed seat is a no-op.
    pub async fn confirm(&self, event_id: EventId, client_id: &str) -> Result<(), EngineError> {
        let _token = self.gate.enter().await;
        let rs = self.resolve(&event_id)?;
        let mut guard = rs.write().await;

        if let Some(pending) = guard.pending.get(client_id).cloned() {
            if !self.timer.cancel(&timer_key(event_id, client_id)) {
                // The timer already fired; the reaper owns this seat now.
                return Err(EngineError::StaleConfirmation {
                    event_id,
                    client_id: client_id.to_string(),
                });
            }
            let mut next = guard.clone();
            next.pending.remove(client_id);
            if let Err(e) = self.commit(&mut guard, next).await {
                self.restore_hold(&pending);
                return Err(e);
            }
            metrics::counter!(CONFIRMATIONS_TOTAL).increment(1);
            info!("{client_id} confirmed seat on {event_id}");
            self.notify.publish(Topic::Changed, &guard.changed());
            return Ok(());
        }

        if guard.ledger.is_holder(client_id) {
            return Ok(());
        }
        let client_id = client_id.to_string();
        if guard.recently_lapsed(&client_id, now_ms(), self.config.hold_timeout) {
            Err(EngineError::StaleConfirmation { event_id, client_id })
        } else {
            Err(EngineError::NoReservation { event_id, client_id })
        }
    }

    /// Give up a pending or confirmed seat (promoting the waitlist head into
    /// it), or leave the waitlist.
    pub async fn release(&self, event_id: EventId, client_id: &str) -> Result<(), EngineError> {
        let _token = self.gate.enter().await;
        let rs = self.resolve(&event_id)?;
        let mut guard = rs.write().await;
        let now = now_ms();
        let hold = self.config.hold_timeout;

        if let Some(pending) = guard.pending.get(client_id).cloned() {
            if !self.timer.cancel(&timer_key(event_id, client_id)) {
                debug!("release of {client_id} on {event_id} overtaken by expiry");
                return Ok(());
            }
            let mut next = guard.clone();
            next.pending.remove(client_id);
            let promoted = match next.reclaim_and_promote(client_id, now, hold) {
                Ok(promoted) => promoted,
                Err(e) => {
                    error!("release of {client_id} on {event_id}: {e}");
                    self.restore_hold(&pending);
                    return Err(e);
                }
            };
            if let Err(e) = self.commit(&mut guard, next).await {
                self.restore_hold(&pending);
                return Err(e);
            }
            info!("{client_id} released pending seat on {event_id}");
            self.after_reclaim(&guard, promoted, "released");
            return Ok(());
        }

        if guard.ledger.is_holder(client_id) {
            let mut next = guard.clone();
            let promoted = next
                .reclaim_and_promote(client_id, now, hold)
                .inspect_err(|e| error!("release of {client_id} on {event_id}: {e}"))?;
            self.commit(&mut guard, next).await?;
            info!("{client_id} released confirmed seat on {event_id}");
            self.after_reclaim(&guard, promoted, "released");
            return Ok(());
        }

        if guard.waitlist.contains(client_id) {
            let mut next = guard.clone();
            next.waitlist.remove(client_id);
            self.commit(&mut guard, next).await?;
            info!("{client_id} left the waitlist on {event_id}");
            self.notify.publish(Topic::Changed, &guard.changed());
            return Ok(());
        }

        Err(EngineError::NoReservation {
            event_id,
            client_id: client_id.to_string(),
        })
    }

    /// Reclaim a hold whose timer fired and promote the waitlist head. Runs on
    /// the reaper, outside the admission gate.
    pub(crate) async fn expire(&self, event_id: EventId, client_id: &str) -> Result<(), EngineError> {
        let rs = self.resolve(&event_id)?;
        let mut guard = rs.write().await;
        if !guard.pending.contains_key(client_id) {
            debug!("hold for {client_id} on {event_id} no longer pending");
            return Ok(());
        }

        let now = now_ms();
        let hold = self.config.hold_timeout;
        let mut next = guard.clone();
        next.pending.remove(client_id);
        next.mark_lapsed(client_id, now, hold);
        let promoted = next
            .reclaim_and_promote(client_id, now, hold)
            .inspect_err(|e| error!("expiry of {client_id} on {event_id}: {e}"))?;

        if let Err(e) = self.commit(&mut guard, next).await {
            warn!("expiry of {client_id} on {event_id} not saved, retrying");
            let retry = Duration::from_millis(EXPIRY_RETRY_MS);
            if let Err(arm_err) = self.timer.arm(timer_key(event_id, client_id), retry) {
                error!("could not schedule expiry retry for {client_id} on {event_id}: {arm_err}");
            }
            return Err(e);
        }
        info!("hold for {client_id} on {event_id} expired");
        self.after_reclaim(&guard, promoted, "expired");
        Ok(())
    }
}

mod error;
mod mutations;
mod queries;
mod state;

pub use error::EngineError;
pub use state::EventState;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::gate::AdmissionGate;
use crate::limits::MAX_HOLD_TIMEOUT;
use crate::model::*;
use crate::notify::{Notification, NotificationPort, Topic};
use crate::observability::{EVENTS_ACTIVE, PROMOTIONS_TOTAL, RECLAIMS_TOTAL};
use crate::reaper;
use crate::store::EventStore;
use crate::timer::{ReservationTimer, TimerKey};

pub type SharedEventState = Arc<RwLock<EventState>>;

/// Admission, allocation, hold expiry and waitlist promotion for every event
/// in one process.
///
/// Client commands (`reserve`, `confirm`, `release`) pass the admission gate
/// first, then take the target event's write lock. Expired holds come back
/// through the reaper, which takes the same event lock but no gate slot, so
/// the gate bounds new contention and not the promotions it triggers.
pub struct AllocationEngine {
    state: DashMap<EventId, SharedEventState>,
    /// Event name → id, for duplicate-name checks.
    names: DashMap<String, EventId>,
    /// Events registered plus creates still being saved. Bounded by `MAX_EVENTS`.
    event_slots: AtomicUsize,
    gate: AdmissionGate,
    timer: ReservationTimer,
    store: Arc<dyn EventStore>,
    notify: Arc<dyn NotificationPort>,
    config: EngineConfig,
}

fn timer_key(event_id: EventId, client_id: &str) -> TimerKey {
    (event_id, client_id.to_string())
}

impl AllocationEngine {
    /// Rebuild every stored event, re-arm the holds that were pending when the
    /// records were saved, and start the reaper. Holds whose deadline passed
    /// while the process was down fire right away.
    pub async fn open(
        config: EngineConfig,
        store: Arc<dyn EventStore>,
        notify: Arc<dyn NotificationPort>,
    ) -> Result<Arc<Self>, EngineError> {
        let mut config = config;
        config.hold_timeout = config.hold_timeout.min(MAX_HOLD_TIMEOUT);
        let records = store.load_all().await?;
        let (timer, fired) = ReservationTimer::new();
        let engine = Arc::new(Self {
            state: DashMap::new(),
            names: DashMap::new(),
            event_slots: AtomicUsize::new(0),
            gate: AdmissionGate::new(config.gate_size),
            timer,
            store,
            notify,
            config,
        });

        let now = now_ms();
        let mut restored_holds = 0usize;
        for (id, record) in records {
            let es = EventState::from_record(id, record).inspect_err(|e| {
                error!("refusing to load event {id}: {e}");
            })?;
            for pending in es.pending.values() {
                engine.arm_hold(pending, now)?;
                restored_holds += 1;
            }
            engine.names.insert(es.name.clone(), id);
            engine.state.insert(id, Arc::new(RwLock::new(es)));
        }
        engine
            .event_slots
            .store(engine.state.len(), Ordering::Release);
        metrics::gauge!(EVENTS_ACTIVE).set(engine.state.len() as f64);
        if !engine.state.is_empty() {
            info!(
                "restored {} events, {restored_holds} pending holds",
                engine.state.len()
            );
        }

        tokio::spawn(reaper::run_reaper(Arc::downgrade(&engine), fired));
        Ok(engine)
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of hold timers currently armed.
    pub fn armed_holds(&self) -> usize {
        self.timer.armed()
    }

    pub fn get_event(&self, id: &EventId) -> Option<SharedEventState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    fn resolve(&self, id: &EventId) -> Result<SharedEventState, EngineError> {
        self.get_event(id).ok_or(EngineError::NotFound(*id))
    }

    /// Save `next` and, only if that succeeds, make it the live state.
    async fn commit(
        &self,
        current: &mut EventState,
        next: EventState,
    ) -> Result<(), EngineError> {
        if let Err(e) = self.store.save(next.id, &next.record()).await {
            warn!("save of event {} failed, state unchanged: {e}", next.id);
            return Err(e.into());
        }
        *current = next;
        Ok(())
    }

    /// Arm the timer for a hold, for whatever is left of it at `now`.
    fn arm_hold(&self, pending: &PendingReservation, now: Ms) -> Result<(), EngineError> {
        let remaining = Duration::from_millis(pending.remaining_ms(now));
        self.timer
            .arm(timer_key(pending.event_id, &pending.client_id), remaining)
            .map_err(EngineError::from_timer)
    }

    /// Put back a timer that was cancelled for an operation that then failed.
    fn restore_hold(&self, pending: &PendingReservation) {
        if let Err(e) = self.arm_hold(pending, now_ms()) {
            error!(
                "could not re-arm hold for {} on {}: {e}",
                pending.client_id, pending.event_id
            );
        }
    }

    /// Side effects of a committed reclaim: arm the promoted client's hold and
    /// tell everyone.
    fn after_reclaim(
        &self,
        es: &EventState,
        promoted: Option<PendingReservation>,
        reason: &'static str,
    ) {
        metrics::counter!(RECLAIMS_TOTAL, "reason" => reason).increment(1);
        if let Some(pending) = promoted {
            if let Err(e) = self.arm_hold(&pending, pending.granted_at) {
                error!("promoted {} on {} without a timer: {e}", pending.client_id, es.id);
            }
            metrics::counter!(PROMOTIONS_TOTAL).increment(1);
            info!("promoted {} from waitlist on {}", pending.client_id, es.id);
            self.publish_granted(&pending);
        }
        self.notify.publish(Topic::Changed, &es.changed());
    }

    fn publish_granted(&self, pending: &PendingReservation) {
        self.notify.publish(
            Topic::Granted,
            &Notification::Granted {
                event_id: pending.event_id,
                client_id: pending.client_id.clone(),
                deadline: pending.deadline,
            },
        );
    }
}

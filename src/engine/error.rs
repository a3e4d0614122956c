use crate::ledger::LedgerError;
use crate::model::{ClientId, EventId};
use crate::store::StoreError;
use crate::timer::TimerError;

#[derive(Debug)]
pub enum EngineError {
    NotFound(EventId),
    AlreadyExists(String),
    AlreadyPending {
        event_id: EventId,
        client_id: ClientId,
    },
    AlreadyHolding {
        event_id: EventId,
        client_id: ClientId,
    },
    AlreadyWaitlisted {
        event_id: EventId,
        client_id: ClientId,
    },
    NoReservation {
        event_id: EventId,
        client_id: ClientId,
    },
    StaleConfirmation {
        event_id: EventId,
        client_id: ClientId,
    },
    CapacityInvariantViolation {
        event_id: EventId,
        detail: LedgerError,
    },
    LimitExceeded(&'static str),
    StoreError(String),
}

impl EngineError {
    /// Stable machine-readable code, used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::AlreadyPending { .. } => "already_pending",
            EngineError::AlreadyHolding { .. } => "already_holding",
            EngineError::AlreadyWaitlisted { .. } => "already_waitlisted",
            EngineError::NoReservation { .. } => "no_reservation",
            EngineError::StaleConfirmation { .. } => "stale_confirmation",
            EngineError::CapacityInvariantViolation { .. } => "capacity_invariant_violation",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::StoreError(_) => "store_error",
        }
    }

    pub(super) fn from_timer(e: TimerError) -> Self {
        match e {
            TimerError::AlreadyArmed((event_id, client_id)) => {
                EngineError::AlreadyPending { event_id, client_id }
            }
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "event not found: {id}"),
            EngineError::AlreadyExists(name) => write!(f, "event already exists: {name}"),
            EngineError::AlreadyPending { event_id, client_id } => {
                write!(f, "hold timer already armed for {client_id} on {event_id}")
            }
            EngineError::AlreadyHolding { event_id, client_id } => {
                write!(f, "{client_id} already holds a seat on {event_id}")
            }
            EngineError::AlreadyWaitlisted { event_id, client_id } => {
                write!(f, "{client_id} is already waitlisted on {event_id}")
            }
            EngineError::NoReservation { event_id, client_id } => {
                write!(f, "{client_id} has no reservation on {event_id}")
            }
            EngineError::StaleConfirmation { event_id, client_id } => {
                write!(f, "hold for {client_id} on {event_id} expired and was reclaimed")
            }
            EngineError::CapacityInvariantViolation { event_id, detail } => {
                write!(f, "capacity invariant violated on {event_id}: {detail}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::StoreError(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::StoreError(e.to_string())
    }
}

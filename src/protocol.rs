//! JSON-lines protocol: one request object per line in, one response object
//! per line out, with notifications interleaved as `notification` responses.

use serde::{Deserialize, Serialize};

use crate::engine::EngineError;
use crate::model::*;
use crate::notify::{Notification, Topic};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    CreateEvent { name: String, seats: u32 },
    Reserve { event_id: EventId, client: ClientId },
    Confirm { event_id: EventId, client: ClientId },
    Release { event_id: EventId, client: ClientId },
    ListEvents,
    Waitlist { event_id: EventId },
    Pending { event_id: EventId },
    Status { event_id: EventId, client: ClientId },
}

impl Request {
    /// The client identity a request acts for, if any. Status lookups only
    /// read, so they do not count.
    pub fn client(&self) -> Option<&str> {
        match self {
            Request::Reserve { client, .. }
            | Request::Confirm { client, .. }
            | Request::Release { client, .. } => Some(client.as_str()),
            Request::CreateEvent { .. }
            | Request::ListEvents
            | Request::Waitlist { .. }
            | Request::Pending { .. }
            | Request::Status { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    EventCreated {
        event_id: EventId,
    },
    Granted {
        event_id: EventId,
        client: ClientId,
        deadline: Ms,
    },
    Waitlisted {
        event_id: EventId,
        client: ClientId,
        position: usize,
    },
    Confirmed {
        event_id: EventId,
        client: ClientId,
    },
    Released {
        event_id: EventId,
        client: ClientId,
    },
    Events {
        events: Vec<EventInfo>,
    },
    Waitlist {
        event_id: EventId,
        queue: Vec<ClientId>,
    },
    /// Unconfirmed holds, soonest deadline first.
    Pending {
        event_id: EventId,
        holds: Vec<PendingReservation>,
    },
    /// `status` is absent when the client holds nothing on the event.
    Status {
        event_id: EventId,
        client: ClientId,
        status: Option<ClientStatus>,
    },
    Notification {
        topic: String,
        payload: Notification,
    },
    Error {
        code: String,
        message: String,
    },
}

impl Response {
    pub fn notification(topic: Topic, payload: Notification) -> Self {
        Response::Notification {
            topic: topic.as_str().to_string(),
            payload,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Response::Error {
            code: "bad_request".into(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }
}

impl From<&EngineError> for Response {
    fn from(e: &EngineError) -> Self {
        Response::Error {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

pub fn parse(line: &str) -> Result<Request, serde_json::Error> {
    serde_json::from_str(line.trim())
}

pub fn encode(resp: &Response) -> Result<String, serde_json::Error> {
    serde_json::to_string(resp)
}

use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::warn;

use crate::engine::AllocationEngine;
use crate::limits::MAX_LINE_LEN;
use crate::model::*;
use crate::notify::{Notification, NotifyHub, Topic};
use crate::observability::{command_label, REQUEST_DURATION_SECONDS, REQUESTS_TOTAL};
use crate::protocol::{self, Request, Response};

type Lines<S> = Framed<S, LinesCodec>;

fn codec_error(e: LinesCodecError) -> io::Error {
    match e {
        LinesCodecError::Io(e) => e,
        LinesCodecError::MaxLineLengthExceeded => {
            io::Error::new(io::ErrorKind::InvalidData, "line too long")
        }
    }
}

async fn send<S>(lines: &mut Lines<S>, resp: &Response) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let json = protocol::encode(resp).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    lines.send(json).await.map_err(codec_error)
}

/// Serve one client connection until it closes.
///
/// Every `allocation.changed` notification is pushed to the connection;
/// `granted` and `waitlisted` ones only when addressed to a client identity
/// this connection has issued a command for.
pub async fn process_connection<S>(
    socket: S,
    engine: Arc<AllocationEngine>,
    hub: Arc<NotifyHub>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut granted = hub.subscribe(Topic::Granted);
    let mut waitlisted = hub.subscribe(Topic::Waitlisted);
    let mut changed = hub.subscribe(Topic::Changed);
    let mut lines = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    let mut clients: HashSet<ClientId> = HashSet::new();

    loop {
        tokio::select! {
            line = lines.next() => {
                let resp = match line {
                    None => break,
                    Some(Ok(line)) if line.trim().is_empty() => continue,
                    Some(Ok(line)) => handle_line(&engine, &mut clients, &line).await,
                    // The codec skips the rest of an over-long line and carries on.
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        Response::bad_request("line too long")
                    }
                    Some(Err(LinesCodecError::Io(e))) => return Err(e),
                };
                send(&mut lines, &resp).await?;
            }
            n = granted.recv() => forward(&mut lines, &clients, Topic::Granted, n).await?,
            n = waitlisted.recv() => forward(&mut lines, &clients, Topic::Waitlisted, n).await?,
            n = changed.recv() => forward(&mut lines, &clients, Topic::Changed, n).await?,
        }
    }
    Ok(())
}

async fn forward<S>(
    lines: &mut Lines<S>,
    clients: &HashSet<ClientId>,
    topic: Topic,
    received: Result<Notification, broadcast::error::RecvError>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match received {
        Ok(n) => {
            if n.recipient().is_none_or(|c| clients.contains(c)) {
                send(lines, &Response::notification(topic, n)).await?;
            }
        }
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
            warn!("connection lagging, dropped {skipped} {topic} notifications");
        }
        // The hub outlives every connection, so this only happens at shutdown.
        Err(broadcast::error::RecvError::Closed) => {}
    }
    Ok(())
}

async fn handle_line(
    engine: &AllocationEngine,
    clients: &mut HashSet<ClientId>,
    line: &str,
) -> Response {
    let req = match protocol::parse(line) {
        Ok(req) => req,
        Err(e) => return Response::bad_request(format!("invalid request: {e}")),
    };
    if let Some(client) = req.client() {
        clients.insert(client.to_string());
    }

    let label = command_label(&req);
    let start = Instant::now();
    let resp = execute(engine, req).await;
    let status = if resp.is_error() { "error" } else { "ok" };
    metrics::counter!(REQUESTS_TOTAL, "command" => label, "status" => status).increment(1);
    metrics::histogram!(REQUEST_DURATION_SECONDS, "command" => label)
        .record(start.elapsed().as_secs_f64());
    resp
}

async fn execute(engine: &AllocationEngine, req: Request) -> Response {
    let result = match req {
        Request::CreateEvent { name, seats } => engine
            .create_event(name, seats)
            .await
            .map(|event_id| Response::EventCreated { event_id }),
        Request::Reserve { event_id, client } => {
            let result = engine.reserve(event_id, client.clone()).await;
            result.map(|r| match r {
                Reservation::Granted(pending) => Response::Granted {
                    event_id,
                    client,
                    deadline: pending.deadline,
                },
                Reservation::Waitlisted { position } => Response::Waitlisted {
                    event_id,
                    client,
                    position,
                },
            })
        }
        Request::Confirm { event_id, client } => {
            let result = engine.confirm(event_id, &client).await;
            result.map(|()| Response::Confirmed { event_id, client })
        }
        Request::Release { event_id, client } => {
            let result = engine.release(event_id, &client).await;
            result.map(|()| Response::Released { event_id, client })
        }
        Request::ListEvents => Ok(Response::Events {
            events: engine.events().await,
        }),
        Request::Waitlist { event_id } => engine
            .waitlist(event_id)
            .await
            .map(|queue| Response::Waitlist { event_id, queue }),
        Request::Pending { event_id } => engine
            .pending(event_id)
            .await
            .map(|holds| Response::Pending { event_id, holds }),
        Request::Status { event_id, client } => {
            let result = engine.status(event_id, &client).await;
            result.map(|status| Response::Status {
                event_id,
                client,
                status,
            })
        }
    };
    result.unwrap_or_else(|e| Response::from(&e))
}

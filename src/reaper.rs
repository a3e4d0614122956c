use std::sync::Weak;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::AllocationEngine;
use crate::timer::TimerKey;

/// Background task that reclaims holds as their timers fire.
///
/// Holds only a weak handle so a dropped engine stops its reaper. Each fired
/// key is processed to completion before the next is taken.
pub async fn run_reaper(
    engine: Weak<AllocationEngine>,
    mut fired: mpsc::UnboundedReceiver<TimerKey>,
) {
    while let Some((event_id, client_id)) = fired.recv().await {
        let Some(engine) = engine.upgrade() else { break };
        if let Err(e) = engine.expire(event_id, &client_id).await {
            warn!("reaper: expiry of {client_id} on {event_id} failed: {e}");
        }
    }
    debug!("reaper stopped");
}

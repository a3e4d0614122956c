use crate::model::*;

use super::{AllocationEngine, EngineError, SharedEventState};

impl AllocationEngine {
    pub fn event_count(&self) -> usize {
        self.state.len()
    }

    pub async fn event(&self, id: EventId) -> Result<EventInfo, EngineError> {
        let rs = self.resolve(&id)?;
        let guard = rs.read().await;
        Ok(guard.info())
    }

    /// All events, ordered by id. Ids are ULIDs, so this is creation order
    /// down to the millisecond.
    pub async fn events(&self) -> Vec<EventInfo> {
        // Collect the Arcs first so no map guard is held across an await.
        let mut shared: Vec<(EventId, SharedEventState)> = self
            .state
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        shared.sort_by_key(|(id, _)| *id);

        let mut infos = Vec::with_capacity(shared.len());
        for (_, rs) in shared {
            infos.push(rs.read().await.info());
        }
        infos
    }

    /// Waiting clients in promotion order.
    pub async fn waitlist(&self, id: EventId) -> Result<Vec<ClientId>, EngineError> {
        let rs = self.resolve(&id)?;
        let guard = rs.read().await;
        Ok(guard.waitlist.snapshot())
    }

    /// Unconfirmed holds, soonest deadline first.
    pub async fn pending(&self, id: EventId) -> Result<Vec<PendingReservation>, EngineError> {
        let rs = self.resolve(&id)?;
        let guard = rs.read().await;
        let mut pending: Vec<PendingReservation> = guard.pending.values().cloned().collect();
        pending.sort_by(|a, b| (a.deadline, &a.client_id).cmp(&(b.deadline, &b.client_id)));
        Ok(pending)
    }

    /// Where a client stands on an event, or `None` if it has nothing there.
    pub async fn status(
        &self,
        id: EventId,
        client_id: &str,
    ) -> Result<Option<ClientStatus>, EngineError> {
        let rs = self.resolve(&id)?;
        let guard = rs.read().await;
        Ok(guard.status(client_id))
    }
}

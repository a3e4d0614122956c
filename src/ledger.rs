use std::collections::BTreeSet;

use crate::model::ClientId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A reclaim would push available seats past the event's capacity.
    Overflow { total: u32 },
    /// Persisted counters disagree with each other or with the holder set.
    Inconsistent {
        total: u32,
        available: u32,
        holders: usize,
    },
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::Overflow { total } => {
                write!(f, "reclaim would exceed capacity of {total} seats")
            }
            LedgerError::Inconsistent {
                total,
                available,
                holders,
            } => write!(
                f,
                "inconsistent ledger: total={total}, available={available}, holders={holders}"
            ),
        }
    }
}

impl std::error::Error for LedgerError {}

/// Seat counters and the set of clients holding a seat for one event.
///
/// Callers keep `holders.len() == total - available` by pairing
/// `try_grant` with `record_holder` and `remove_holder` with `reclaim`.
/// Exclusion comes from the owning event's lock; the ledger itself is
/// plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatLedger {
    total_seats: u32,
    available_seats: u32,
    holders: BTreeSet<ClientId>,
}

impl SeatLedger {
    pub fn new(total_seats: u32) -> Self {
        Self {
            total_seats,
            available_seats: total_seats,
            holders: BTreeSet::new(),
        }
    }

    /// Rebuild a ledger from persisted parts, rejecting anything that breaks
    /// the seat-count invariant.
    pub fn from_parts(
        total_seats: u32,
        available_seats: u32,
        holders: impl IntoIterator<Item = ClientId>,
    ) -> Result<Self, LedgerError> {
        let holders: BTreeSet<ClientId> = holders.into_iter().collect();
        let ledger = Self {
            total_seats,
            available_seats,
            holders,
        };
        ledger.check()?;
        Ok(ledger)
    }

    fn check(&self) -> Result<(), LedgerError> {
        let held = self.total_seats.checked_sub(self.available_seats);
        if held.map(|h| h as usize) != Some(self.holders.len()) {
            return Err(LedgerError::Inconsistent {
                total: self.total_seats,
                available: self.available_seats,
                holders: self.holders.len(),
            });
        }
        Ok(())
    }

    /// Take one seat if any is free. Returns false and changes nothing otherwise.
    pub fn try_grant(&mut self) -> bool {
        if self.available_seats == 0 {
            return false;
        }
        self.available_seats -= 1;
        true
    }

    /// Return one seat to the pool.
    pub fn reclaim(&mut self) -> Result<(), LedgerError> {
        if self.available_seats >= self.total_seats {
            return Err(LedgerError::Overflow {
                total: self.total_seats,
            });
        }
        self.available_seats += 1;
        Ok(())
    }

    pub fn record_holder(&mut self, client_id: ClientId) -> bool {
        self.holders.insert(client_id)
    }

    pub fn remove_holder(&mut self, client_id: &str) -> bool {
        self.holders.remove(client_id)
    }

    pub fn is_holder(&self, client_id: &str) -> bool {
        self.holders.contains(client_id)
    }

    pub fn total_seats(&self) -> u32 {
        self.total_seats
    }

    pub fn available_seats(&self) -> u32 {
        self.available_seats
    }

    pub fn holders(&self) -> impl Iterator<Item = &ClientId> {
        self.holders.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_until_exhausted() {
        let mut ledger = SeatLedger::new(2);
        assert!(ledger.try_grant());
        assert!(ledger.try_grant());
        assert!(!ledger.try_grant());
        assert_eq!(ledger.available_seats(), 0);
    }

    #[test]
    fn failed_grant_changes_nothing() {
        let mut ledger = SeatLedger::new(0);
        let before = ledger.clone();
        assert!(!ledger.try_grant());
        assert_eq!(ledger, before);
    }

    #[test]
    fn reclaim_past_capacity_is_reported() {
        let mut ledger = SeatLedger::new(1);
        assert_eq!(ledger.reclaim(), Err(LedgerError::Overflow { total: 1 }));
        assert_eq!(ledger.available_seats(), 1); // not clamped, not changed

        assert!(ledger.try_grant());
        assert!(ledger.reclaim().is_ok());
        assert_eq!(ledger.available_seats(), 1);
    }

    #[test]
    fn holders_track_grants() {
        let mut ledger = SeatLedger::new(3);
        assert!(ledger.try_grant());
        assert!(ledger.record_holder("alice".into()));
        assert!(!ledger.record_holder("alice".into())); // already there
        assert!(ledger.is_holder("alice"));

        assert!(ledger.remove_holder("alice"));
        ledger.reclaim().unwrap();
        assert!(!ledger.is_holder("alice"));
        assert_eq!(ledger.available_seats(), 3);
    }

    #[test]
    fn from_parts_accepts_consistent_ledger() {
        let ledger =
            SeatLedger::from_parts(3, 1, vec!["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(ledger.total_seats(), 3);
        assert_eq!(ledger.holders().count(), 2);
    }

    #[test]
    fn from_parts_rejects_available_above_total() {
        let err = SeatLedger::from_parts(2, 3, Vec::new()).unwrap_err();
        assert!(matches!(err, LedgerError::Inconsistent { .. }));
    }

    #[test]
    fn from_parts_rejects_holder_count_mismatch() {
        let err = SeatLedger::from_parts(2, 1, Vec::new()).unwrap_err();
        assert_eq!(
            err,
            LedgerError::Inconsistent {
                total: 2,
                available: 1,
                holders: 0
            }
        );
    }
}

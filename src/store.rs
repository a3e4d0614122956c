use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::model::{EventId, EventRecord};
use crate::observability::{
    WAL_COMPACTION_FAILURES_TOTAL, WAL_FLUSH_BATCH_SIZE, WAL_FLUSH_DURATION_SECONDS,
};
use crate::wal::{LogEntry, Wal};

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "store I/O error: {e}"),
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(e)
    }
}

/// Durable home of event records. The engine keeps the live state in memory
/// and saves a full record after every mutation.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn load(&self, event_id: EventId) -> Result<Option<EventRecord>, StoreError>;
    async fn save(&self, event_id: EventId, record: &EventRecord) -> Result<(), StoreError>;
    /// Every stored record, used to rebuild the engine at startup.
    async fn load_all(&self) -> Result<Vec<(EventId, EventRecord)>, StoreError>;
}

/// Volatile store for tests and throwaway instances.
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<EventId, EventRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn load(&self, event_id: EventId) -> Result<Option<EventRecord>, StoreError> {
        Ok(self.records.get(&event_id).map(|r| r.value().clone()))
    }

    async fn save(&self, event_id: EventId, record: &EventRecord) -> Result<(), StoreError> {
        self.records.insert(event_id, record.clone());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<(EventId, EventRecord)>, StoreError> {
        Ok(self
            .records
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect())
    }
}

// ── Group-commit writer ─────────────────────────────────────────

enum WalCommand {
    Append {
        entry: LogEntry,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (LogEntry, oneshot::Sender<io::Result<()>>);

/// Owns the log. Appends that arrive together share one fsync; each caller
/// hears back only after its entry is durable and `records` reflects it.
async fn wal_writer_loop(
    mut wal: Wal,
    mut rx: mpsc::Receiver<WalCommand>,
    records: Arc<DashMap<EventId, EventRecord>>,
    compact_threshold: u64,
) {
    while let Some(cmd) = rx.recv().await {
        let (entry, response) = match cmd {
            WalCommand::Append { entry, response } => (entry, response),
            WalCommand::AppendsSinceCompact { response } => {
                let _ = response.send(wal.appends_since_compact());
                continue;
            }
        };

        let mut batch = vec![(entry, response)];
        let mut deferred = None;
        while let Ok(cmd) = rx.try_recv() {
            match cmd {
                WalCommand::Append { entry, response } => batch.push((entry, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        metrics::histogram!(WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(WAL_FLUSH_DURATION_SECONDS).record(flush_start.elapsed().as_secs_f64());

        if result.is_ok() {
            for (entry, _) in &batch {
                records.insert(entry.event_id, entry.record.clone());
            }
            if wal.appends_since_compact() >= compact_threshold {
                compact(&mut wal, &records);
            }
        }
        respond_batch(batch, &result);

        if let Some(WalCommand::AppendsSinceCompact { response }) = deferred {
            let _ = response.send(wal.appends_since_compact());
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err = None;
    for (entry, _) in batch {
        if let Err(e) = wal.append_buffered(entry) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an encode error so no half batch lingers in the buffer.
    let flush_err = wal.flush_sync().err();
    match append_err.or(flush_err) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn respond_batch(batch: Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

/// Rewrite the log with the latest record per event. The appends that
/// triggered this are already durable, so a failure only leaves the log
/// long; the next batch tries again.
fn compact(wal: &mut Wal, records: &DashMap<EventId, EventRecord>) {
    let entries: Vec<LogEntry> = records
        .iter()
        .map(|e| LogEntry {
            event_id: *e.key(),
            record: e.value().clone(),
        })
        .collect();
    match Wal::write_compact_file(wal.path(), &entries).and_then(|()| wal.swap_compact_file()) {
        Ok(()) => debug!("{}: compacted to {} entries", wal.path().display(), entries.len()),
        Err(e) => {
            metrics::counter!(WAL_COMPACTION_FAILURES_TOTAL).increment(1);
            warn!("{}: compaction failed, keeping full log: {e}", wal.path().display());
        }
    }
}

/// Store backed by an append-only log. Every save appends the full record;
/// once `compact_threshold` appends pile up the log is rewritten with just
/// the latest record per event. Must be opened inside a tokio runtime.
pub struct WalStore {
    wal_tx: mpsc::Sender<WalCommand>,
    records: Arc<DashMap<EventId, EventRecord>>,
}

impl WalStore {
    pub fn open(path: &Path, compact_threshold: u64) -> io::Result<Self> {
        let entries = Wal::replay(path)?;
        let replayed = entries.len();
        let records = Arc::new(DashMap::new());
        for entry in entries {
            records.insert(entry.event_id, entry.record);
        }
        info!(
            "{}: replayed {replayed} entries, {} events",
            path.display(),
            records.len()
        );

        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(
            wal,
            wal_rx,
            records.clone(),
            compact_threshold.max(1),
        ));
        Ok(Self { wal_tx, records })
    }

    /// Appends written since the log was last compacted.
    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl EventStore for WalStore {
    async fn load(&self, event_id: EventId) -> Result<Option<EventRecord>, StoreError> {
        Ok(self.records.get(&event_id).map(|r| r.value().clone()))
    }

    async fn save(&self, event_id: EventId, record: &EventRecord) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        let entry = LogEntry {
            event_id,
            record: record.clone(),
        };
        self.wal_tx
            .send(WalCommand::Append { entry, response: tx })
            .await
            .map_err(|_| StoreError::Unavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("WAL writer dropped response".into()))??;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<(EventId, EventRecord)>, StoreError> {
        Ok(self
            .records
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect())
    }
}

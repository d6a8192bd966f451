use std::io;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::journal::Journal;
use crate::model::Event;

use super::EngineError;

/// Persistence boundary for the engine. The engine rebuilds its books from
/// `recorded()` at construction and calls `record()` before any mutation
/// becomes visible; substituting `MemStore` gives tests and embedders an
/// engine with no real database underneath.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Events persisted by previous runs, in append order.
    fn recorded(&self) -> Vec<Event>;

    /// Durably record an event. Completes before the mutation is applied or
    /// announced; failure aborts the transition.
    async fn record(&self, event: &Event) -> Result<(), EngineError>;

    /// Records appended since the journal was last compacted.
    async fn records_since_compact(&self) -> u64;

    /// Rewrite the journal to a minimal event set recreating current state.
    async fn compact(&self, events: Vec<Event>) -> Result<(), EngineError>;
}

// ── Journal-backed store with group commit ───────────────────────

enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    RecordsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and batches appends for group
/// commit:
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(JournalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush the batch first, then the non-append command
                            flush_and_respond(&mut journal, &mut batch);
                            handle_non_append(&mut journal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut journal, &mut batch);
                }
            }
            other => handle_non_append(&mut journal, other),
        }
    }
}

fn flush_and_respond(
    journal: &mut Journal,
    batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>,
) {
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE)
        .record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(journal, batch);
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(
    journal: &mut Journal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = journal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = journal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Journal::write_compact_file(journal.path(), &events)
                .and_then(|()| journal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::RecordsSinceCompact { response } => {
            let _ = response.send(journal.records_since_compact());
        }
        JournalCommand::Append { .. } => unreachable!(),
    }
}

/// Store backed by the append-only journal file. Must be opened inside a
/// tokio runtime: the group-commit writer runs as a background task.
pub struct WalStore {
    tx: mpsc::Sender<JournalCommand>,
    bootstrap: Vec<Event>,
}

impl WalStore {
    pub fn open(path: &Path) -> io::Result<Self> {
        let bootstrap = Journal::replay(path)?;
        let journal = Journal::open(path)?;
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, rx));
        Ok(Self { tx, bootstrap })
    }
}

#[async_trait]
impl ReservationStore for WalStore {
    fn recorded(&self) -> Vec<Event> {
        self.bootstrap.clone()
    }

    async fn record(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Storage("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("journal writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    async fn records_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .tx
            .send(JournalCommand::RecordsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    async fn compact(&self, events: Vec<Event>) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(JournalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Storage("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("journal writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))
    }
}

// ── In-memory store ──────────────────────────────────────────────

/// Keeps the event log in memory. Reusing the same `Arc<MemStore>` across
/// engine restarts exercises replay without touching disk.
#[derive(Default)]
pub struct MemStore {
    events: Mutex<Vec<Event>>,
    since_compact: Mutex<u64>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReservationStore for MemStore {
    fn recorded(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    async fn record(&self, event: &Event) -> Result<(), EngineError> {
        self.events.lock().unwrap().push(event.clone());
        *self.since_compact.lock().unwrap() += 1;
        Ok(())
    }

    async fn records_since_compact(&self) -> u64 {
        *self.since_compact.lock().unwrap()
    }

    async fn compact(&self, events: Vec<Event>) -> Result<(), EngineError> {
        *self.events.lock().unwrap() = events;
        *self.since_compact.lock().unwrap() = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn retired(id: Ulid) -> Event {
        Event::ResourceRetired { id }
    }

    #[tokio::test]
    async fn mem_store_records_and_replays() {
        let store = MemStore::new();
        let a = retired(Ulid::new());
        let b = retired(Ulid::new());
        store.record(&a).await.unwrap();
        store.record(&b).await.unwrap();
        assert_eq!(store.recorded(), vec![a, b]);
        assert_eq!(store.records_since_compact().await, 2);
    }

    #[tokio::test]
    async fn mem_store_compact_resets_counter() {
        let store = MemStore::new();
        for _ in 0..5 {
            store.record(&retired(Ulid::new())).await.unwrap();
        }
        let keep = vec![retired(Ulid::new())];
        store.compact(keep.clone()).await.unwrap();
        assert_eq!(store.recorded(), keep);
        assert_eq!(store.records_since_compact().await, 0);
    }

    #[tokio::test]
    async fn wal_store_round_trips_through_disk() {
        let dir = std::env::temp_dir().join("berth_test_store");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("roundtrip.journal");
        let _ = std::fs::remove_file(&path);

        let a = retired(Ulid::new());
        {
            let store = WalStore::open(&path).unwrap();
            assert!(store.recorded().is_empty());
            store.record(&a).await.unwrap();
            assert_eq!(store.records_since_compact().await, 1);
        }

        let reopened = WalStore::open(&path).unwrap();
        assert_eq!(reopened.recorded(), vec![a]);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn wal_store_concurrent_records_group_commit() {
        let dir = std::env::temp_dir().join("berth_test_store");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("group_commit.journal");
        let _ = std::fs::remove_file(&path);

        let store = std::sync::Arc::new(WalStore::open(&path).unwrap());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.record(&retired(Ulid::new())).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.records_since_compact().await, 32);

        let _ = std::fs::remove_file(&path);
    }
}

use std::io;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::model::Event;
use crate::wal::Wal;

/// Durable home of the ledger. The engine replays `load` once at startup and
/// records every mutation through `append` before applying it in memory.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Every committed event, oldest first.
    async fn load(&self) -> io::Result<Vec<Event>>;

    async fn append(&self, event: &Event) -> io::Result<()>;

    /// Replace the stored history with an equivalent, shorter one.
    async fn compact(&self, events: Vec<Event>) -> io::Result<()>;

    async fn appends_since_compact(&self) -> u64;
}

// ── File-backed storage with group commit ────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Single owner of the log file. Waits for one append, drains whatever else
/// is already queued, then fsyncs once for the whole batch.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        commit_batch(&mut wal, &mut batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let mut result = Ok(());
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            result = Err(e);
            break;
        }
    }
    let result = result.and_then(|()| wal.flush_sync());
    if let Err(e) = &result {
        tracing::error!("ledger batch of {} failed: {e}", batch.len());
        // Cut the log back so a partial frame can't shadow later batches.
        if let Err(e) = wal.rollback() {
            tracing::error!("ledger rollback failed: {e}");
        }
    }

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

fn writer_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "ledger writer shut down")
}

pub struct WalStorage {
    tx: mpsc::Sender<WalCommand>,
    path: std::path::PathBuf,
}

impl WalStorage {
    /// Open the log and start its writer task. Must run inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let wal = Wal::open(path)?;
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, rx));
        Ok(Self {
            tx,
            path: path.to_path_buf(),
        })
    }

    async fn request<T>(
        &self,
        cmd: WalCommand,
        rx: oneshot::Receiver<T>,
    ) -> io::Result<T> {
        self.tx.send(cmd).await.map_err(|_| writer_gone())?;
        rx.await.map_err(|_| writer_gone())
    }
}

#[async_trait]
impl Storage for WalStorage {
    async fn load(&self) -> io::Result<Vec<Event>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Wal::replay(&path))
            .await
            .map_err(io::Error::other)?
    }

    async fn append(&self, event: &Event) -> io::Result<()> {
        let (response, rx) = oneshot::channel();
        let cmd = WalCommand::Append {
            event: event.clone(),
            response,
        };
        self.request(cmd, rx).await?
    }

    async fn compact(&self, events: Vec<Event>) -> io::Result<()> {
        let (response, rx) = oneshot::channel();
        self.request(WalCommand::Compact { events, response }, rx)
            .await?
    }

    async fn appends_since_compact(&self) -> u64 {
        let (response, rx) = oneshot::channel();
        self.request(WalCommand::AppendsSinceCompact { response }, rx)
            .await
            .unwrap_or(0)
    }
}

// ── In-process storage ───────────────────────────────────

/// Keeps the ledger in a vector. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryLog>,
}

#[derive(Default)]
struct MemoryLog {
    events: Vec<Event>,
    appends_since_compact: u64,
    fail_appends: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following append fail, to exercise storage error paths.
    pub fn fail_appends(&self, fail: bool) {
        if let Ok(mut log) = self.inner.lock() {
            log.fail_appends = fail;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|log| log.events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> io::Error {
    io::Error::other("memory ledger lock poisoned")
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn load(&self) -> io::Result<Vec<Event>> {
        Ok(self.inner.lock().map_err(|_| poisoned())?.events.clone())
    }

    async fn append(&self, event: &Event) -> io::Result<()> {
        let mut log = self.inner.lock().map_err(|_| poisoned())?;
        if log.fail_appends {
            return Err(io::Error::other("injected append failure"));
        }
        log.events.push(event.clone());
        log.appends_since_compact += 1;
        Ok(())
    }

    async fn compact(&self, events: Vec<Event>) -> io::Result<()> {
        let mut log = self.inner.lock().map_err(|_| poisoned())?;
        log.events = events;
        log.appends_since_compact = 0;
        Ok(())
    }

    async fn appends_since_compact(&self) -> u64 {
        self.inner
            .lock()
            .map(|log| log.appends_since_compact)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("fleetbook_test_storage");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn wal_storage_group_commits_concurrent_appends() {
        let path = tmp_path("group_commit.wal");
        let storage = std::sync::Arc::new(WalStorage::open(&path).unwrap());

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let s = storage.clone();
                tokio::spawn(async move { s.append(&Event::VehicleRetired { id: Ulid::new() }).await })
            })
            .collect();
        for t in futures::future::join_all(tasks).await {
            t.unwrap().unwrap();
        }

        assert_eq!(storage.load().await.unwrap().len(), 32);
        assert_eq!(storage.appends_since_compact().await, 32);
    }

    #[tokio::test]
    async fn wal_storage_compact_resets_counter() {
        let path = tmp_path("compact_counter.wal");
        let storage = WalStorage::open(&path).unwrap();
        for _ in 0..5 {
            storage
                .append(&Event::VehicleRetired { id: Ulid::new() })
                .await
                .unwrap();
        }
        let keep = Event::VehicleRetired { id: Ulid::new() };
        storage.compact(vec![keep.clone()]).await.unwrap();

        assert_eq!(storage.appends_since_compact().await, 0);
        assert_eq!(storage.load().await.unwrap(), vec![keep]);
    }

    #[tokio::test]
    async fn wal_storage_keeps_appends_made_after_a_crash() {
        use std::io::Write;

        let path = tmp_path("crash_restart.wal");
        let first = Event::VehicleRetired { id: Ulid::new() };
        let second = Event::VehicleRetired { id: Ulid::new() };
        {
            let storage = WalStorage::open(&path).unwrap();
            storage.append(&first).await.unwrap();
        }
        {
            let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[0xFF; 5]).unwrap();
        }
        {
            let storage = WalStorage::open(&path).unwrap();
            assert_eq!(storage.load().await.unwrap(), vec![first.clone()]);
            storage.append(&second).await.unwrap();
        }
        let storage = WalStorage::open(&path).unwrap();
        assert_eq!(storage.load().await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn memory_storage_injected_failure() {
        let storage = MemoryStorage::new();
        storage.fail_appends(true);
        let res = storage.append(&Event::VehicleRetired { id: Ulid::new() }).await;
        assert!(res.is_err());
        assert!(storage.is_empty());

        storage.fail_appends(false);
        storage
            .append(&Event::VehicleRetired { id: Ulid::new() })
            .await
            .unwrap();
        assert_eq!(storage.len(), 1);
    }
}

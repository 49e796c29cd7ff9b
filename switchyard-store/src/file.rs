//! File-backed store for single-node deployments that must keep their
//! blacklist and recent access history across restarts.
//!
//! Two files sit side by side:
//! * the blacklist snapshot at `path`, rewritten atomically (tmp file, then
//!   rename) whenever an entry is added;
//! * the access journal next to it (`<stem>.access.jsonl`), one JSON line per
//!   insert or status update, only ever appended to.
//!
//! Opening replays the journal, drops records older than the retention and
//! rewrites the journal with what is left. The same compaction runs in the
//! background once enough lines have been appended since the last one.
//!
//! Every mutation is written to its file before it is applied in memory. A
//! failed write fails the operation and leaves memory untouched.

use crate::memory::MemoryStore;
use crate::schema::{AccessLogRecord, BlacklistEntry};
use crate::{AccessStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Journal lines appended between background compactions.
const COMPACT_EVERY: usize = 10_000;

/// The shape of the blacklist snapshot file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BlacklistSnapshot {
    #[serde(default)]
    pub ip_black_list: Vec<BlacklistEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalLine<'a> {
    Insert {
        record: Cow<'a, AccessLogRecord>,
    },
    Update {
        id: Uuid,
        code: u16,
        at: DateTime<Utc>,
    },
}

impl JournalLine<'_> {
    fn encode(&self) -> Result<Vec<u8>, StoreError> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Append handle plus the file length up to the last complete line.
struct Journal {
    file: File,
    len: u64,
}

impl Journal {
    async fn append(&mut self, line: &[u8]) -> Result<(), StoreError> {
        if let Err(e) = self.write(line).await {
            // Cut off a torn line so the next append starts clean.
            if let Err(trunc) = self.file.set_len(self.len).await {
                warn!(error = %trunc, "store: could not truncate torn journal line");
            }
            return Err(e.into());
        }
        self.len += line.len() as u64;
        Ok(())
    }

    async fn write(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.file.write_all(line).await?;
        self.file.flush().await
    }
}

pub struct FileStore {
    shared: Arc<Shared>,
}

struct Shared {
    memory: MemoryStore,
    snapshot_path: PathBuf,
    journal_path: PathBuf,
    retention: TimeDelta,
    compact_every: usize,
    /// Held across each append and the matching memory update.
    journal: Mutex<Journal>,
    /// Serializes snapshot writes so two never race on the tmp file.
    snapshot_lock: Mutex<()>,
    appended: AtomicUsize,
    compacting: AtomicBool,
}

impl FileStore {
    /// Open the store at `path`, restoring what a previous run left behind.
    ///
    /// * Missing files → starts empty (first run).
    /// * A malformed blacklist snapshot → error.
    /// * Unreadable journal lines → skipped with a warning.
    pub async fn open(path: &Path, retention: Duration) -> Result<Self, StoreError> {
        Self::open_with(path, retention, COMPACT_EVERY).await
    }

    async fn open_with(
        path: &Path,
        retention: Duration,
        compact_every: usize,
    ) -> Result<Self, StoreError> {
        let retention = TimeDelta::from_std(retention)
            .map_err(|e| StoreError::Unavailable(format!("store.retention_secs: {e}")))?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let journal_path = path.with_extension("access.jsonl");
        let entries = read_snapshot(path).await?;
        let replayed = replay(&journal_path).await?;

        let total = replayed.len();
        let cutoff = Utc::now() - retention;
        let records: Vec<AccessLogRecord> =
            replayed.into_iter().filter(|r| r.created_at >= cutoff).collect();
        info!(
            access = records.len(),
            expired = total - records.len(),
            blacklist = entries.len(),
            path = %path.display(),
            "store: state restored from file"
        );

        let journal = write_journal(&journal_path, &records).await?;
        let memory = MemoryStore::new();
        memory.load(records, entries);

        Ok(Self {
            shared: Arc::new(Shared {
                memory,
                snapshot_path: path.to_path_buf(),
                journal_path,
                retention,
                compact_every,
                journal: Mutex::new(journal),
                snapshot_lock: Mutex::new(()),
                appended: AtomicUsize::new(0),
                compacting: AtomicBool::new(false),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.shared.snapshot_path
    }

    pub fn journal_path(&self) -> &Path {
        &self.shared.journal_path
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.shared.memory
    }

    /// Drop records past the retention and rewrite the journal with the rest.
    /// Returns how many records were dropped.
    pub async fn compact(&self) -> Result<usize, StoreError> {
        self.shared.compact().await
    }
}

impl Shared {
    async fn compact(&self) -> Result<usize, StoreError> {
        let mut journal = self.journal.lock().await;
        self.appended.store(0, Ordering::Relaxed);

        let pruned = self.memory.prune_before(Utc::now() - self.retention);
        let records = self.memory.access_records();
        *journal = write_journal(&self.journal_path, &records).await?;

        info!(
            kept = records.len(),
            pruned,
            path = %self.journal_path.display(),
            "store: access journal compacted"
        );
        Ok(pruned)
    }

    /// Count an append and start a background compaction when due.
    fn note_append(self: &Arc<Self>) {
        let appended = self.appended.fetch_add(1, Ordering::Relaxed) + 1;
        if appended < self.compact_every || self.compacting.swap(true, Ordering::AcqRel) {
            return;
        }
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = shared.compact().await {
                warn!(error = %e, "store: access journal compaction failed");
            }
            shared.compacting.store(false, Ordering::Release);
        });
    }
}

async fn read_snapshot(path: &Path) -> Result<Vec<BlacklistEntry>, StoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(data) => Ok(serde_json::from_str::<BlacklistSnapshot>(&data)?.ip_black_list),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "store: no blacklist snapshot, starting fresh");
            Ok(Vec::new())
        }
        Err(e) => Err(e.into()),
    }
}

/// Records in insertion order with their updates applied.
async fn replay(path: &Path) -> Result<Vec<AccessLogRecord>, StoreError> {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut order = Vec::new();
    let mut records: HashMap<Uuid, AccessLogRecord> = HashMap::new();
    let mut skipped = 0usize;
    for line in data.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<JournalLine<'static>>(line) {
            Ok(JournalLine::Insert { record }) => {
                let record = record.into_owned();
                order.push(record.id);
                records.insert(record.id, record);
            }
            Ok(JournalLine::Update { id, code, at }) => {
                if let Some(record) = records.get_mut(&id) {
                    record.response_code = code;
                    record.updated_at = at;
                }
            }
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(path = %path.display(), skipped, "store: skipped unreadable journal lines");
    }

    Ok(order.into_iter().filter_map(|id| records.remove(&id)).collect())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Atomic write: tmp file → rename
async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Replace the journal with one insert line per record and reopen it for
/// appending.
async fn write_journal(path: &Path, records: &[AccessLogRecord]) -> Result<Journal, StoreError> {
    let mut data = Vec::new();
    for record in records {
        data.extend(JournalLine::Insert { record: Cow::Borrowed(record) }.encode()?);
    }
    write_atomic(path, &data).await?;

    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(Journal {
        file,
        len: data.len() as u64,
    })
}

#[async_trait]
impl AccessStore for FileStore {
    async fn find_active_block(
        &self,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BlacklistEntry>, StoreError> {
        self.shared.memory.find_active_block(ip, now).await
    }

    async fn count_responses(
        &self,
        ip: &str,
        code: u16,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.shared.memory.count_responses(ip, code, since).await
    }

    async fn insert_access(&self, record: AccessLogRecord) -> Result<(), StoreError> {
        let line = JournalLine::Insert { record: Cow::Borrowed(&record) }.encode()?;
        {
            let mut journal = self.shared.journal.lock().await;
            journal.append(&line).await?;
            self.shared.memory.insert_access(record).await?;
        }
        self.shared.note_append();
        Ok(())
    }

    async fn update_response_code(
        &self,
        id: Uuid,
        code: u16,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let line = JournalLine::Update { id, code, at }.encode()?;
        {
            let mut journal = self.shared.journal.lock().await;
            if !self.shared.memory.contains_access(&id) {
                return Err(StoreError::RecordNotFound(id));
            }
            journal.append(&line).await?;
            self.shared.memory.update_response_code(id, code, at).await?;
        }
        self.shared.note_append();
        Ok(())
    }

    async fn insert_blacklist(&self, entry: BlacklistEntry) -> Result<(), StoreError> {
        let _guard = self.shared.snapshot_lock.lock().await;

        let mut snapshot = BlacklistSnapshot {
            ip_black_list: self.shared.memory.blacklist_entries(),
        };
        snapshot.ip_black_list.push(entry.clone());
        write_atomic(&self.shared.snapshot_path, &serde_json::to_vec_pretty(&snapshot)?).await?;

        debug!(path = %self.shared.snapshot_path.display(), "store: blacklist saved");
        self.shared.memory.insert_blacklist(entry).await
    }
}

//! File-backed queue store.
//!
//! Each queue is persisted as `<queue_id>.jsonl` (one task record per line)
//! under a base directory. Files are loaded when the store opens and a queue's
//! file is rewritten after every mutation of that queue, through a temporary
//! file and a rename so a crash never leaves a half-written queue behind.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::memory::InMemoryQueueStore;
use crate::core::{FilterRequest, QueueStore, SchedulerError, Task};

const EXTENSION: &str = "jsonl";

/// Durable store of JSON-lines files, one per queue.
pub struct FileQueueStore {
    dir: PathBuf,
    records: InMemoryQueueStore,
    write_lock: Mutex<()>,
}

fn backend<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> SchedulerError + '_ {
    move |e| SchedulerError::Backend(format!("{context}: {e}"))
}

impl FileQueueStore {
    /// Open (or create) a store rooted at `dir`, loading every queue file in it.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Backend` if the directory cannot be created or a
    /// queue file cannot be read or parsed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(backend("create store directory"))?;

        let mut loaded: HashMap<String, Vec<Task>> = HashMap::new();
        for entry in fs::read_dir(&dir).map_err(backend("read store directory"))? {
            let path = entry.map_err(backend("read store directory"))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(queue_id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_owned) else {
                warn!(path = %path.display(), "skipping queue file with non-UTF-8 name");
                continue;
            };
            let tasks = Self::load_file(&path)?;
            debug!(queue_id = %queue_id, records = tasks.len(), "loaded queue file");
            loaded.insert(queue_id, tasks);
        }

        let records = InMemoryQueueStore::with_records(loaded);
        info!(dir = %dir.display(), records = records.record_count(), "file queue store opened");
        Ok(Self {
            dir,
            records,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory holding the queue files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, queue_id: &str) -> PathBuf {
        self.dir.join(format!("{queue_id}.{EXTENSION}"))
    }

    fn load_file(path: &Path) -> Result<Vec<Task>, SchedulerError> {
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(backend("open queue file"))?;
        let mut tasks = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(backend("read queue file"))?;
            if line.trim().is_empty() {
                continue;
            }
            let task: Task = serde_json::from_str(&line).map_err(backend("parse queue file"))?;
            tasks.push(task);
        }
        Ok(tasks)
    }

    /// Rewrite the file of `queue_id` from the in-memory records.
    fn flush(&self, queue_id: &str) -> Result<(), SchedulerError> {
        let path = self.file_path(queue_id);
        let tasks = self.records.list(queue_id, None)?;
        if tasks.is_empty() {
            if path.exists() {
                fs::remove_file(&path).map_err(backend("remove queue file"))?;
            }
            return Ok(());
        }

        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)
                .map_err(backend("open queue file"))?;
            let mut writer = BufWriter::new(file);
            for task in &tasks {
                let line = serde_json::to_string(task).map_err(backend("serialize task"))?;
                writeln!(writer, "{line}").map_err(backend("write queue file"))?;
            }
            writer.flush().map_err(backend("write queue file"))?;
            writer
                .get_ref()
                .sync_all()
                .map_err(backend("sync queue file"))?;
        }
        fs::rename(&tmp, &path).map_err(backend("replace queue file"))
    }

    /// Apply `change` to the records of `queue_id` and persist them. If the
    /// change reports nothing changed the file is left alone; if the write
    /// fails the queue's previous records are restored.
    fn commit<T>(
        &self,
        queue_id: &str,
        change: impl FnOnce(&InMemoryQueueStore) -> Result<(T, bool), SchedulerError>,
    ) -> Result<T, SchedulerError> {
        let _guard = self.write_lock.lock();
        let before = self.records.queue_records(queue_id);
        let (out, changed) = change(&self.records)?;
        if changed {
            if let Err(e) = self.flush(queue_id) {
                warn!(queue_id = %queue_id, error = %e, "queue write failed, rolling back");
                self.records.restore_queue(queue_id, before);
                return Err(e);
            }
        }
        Ok(out)
    }
}

impl QueueStore for FileQueueStore {
    fn push(&self, task: Task) -> Result<Task, SchedulerError> {
        let queue_id = task.queue_id.clone();
        self.commit(&queue_id, |records| records.push(task).map(|stored| (stored, true)))
    }

    fn pop(&self, queue_id: &str, filters: Option<&FilterRequest>) -> Result<Option<Task>, SchedulerError> {
        self.commit(queue_id, |records| {
            records.pop(queue_id, filters).map(|popped| {
                let changed = popped.is_some();
                (popped, changed)
            })
        })
    }

    fn peek(&self, queue_id: &str, index: usize) -> Result<Option<Task>, SchedulerError> {
        self.records.peek(queue_id, index)
    }

    fn update(&self, task: &Task) -> Result<(), SchedulerError> {
        self.commit(&task.queue_id, |records| records.update(task).map(|()| ((), true)))
    }

    fn remove(&self, queue_id: &str, id: Uuid) -> Result<Option<Task>, SchedulerError> {
        self.commit(queue_id, |records| {
            records.remove(queue_id, id).map(|removed| {
                let changed = removed.is_some();
                (removed, changed)
            })
        })
    }

    fn get_by_hash(&self, queue_id: &str, hash: &str) -> Result<Option<Task>, SchedulerError> {
        self.records.get_by_hash(queue_id, hash)
    }

    fn get_by_id(&self, queue_id: &str, id: Uuid) -> Result<Option<Task>, SchedulerError> {
        self.records.get_by_id(queue_id, id)
    }

    fn list(&self, queue_id: &str, filters: Option<&FilterRequest>) -> Result<Vec<Task>, SchedulerError> {
        self.records.list(queue_id, filters)
    }

    fn size(&self, queue_id: &str) -> Result<usize, SchedulerError> {
        self.records.size(queue_id)
    }

    fn clear(&self, queue_id: &str) -> Result<(), SchedulerError> {
        self.commit(queue_id, |records| records.clear(queue_id).map(|()| ((), true)))
    }

    fn queue_ids(&self) -> Result<Vec<String>, SchedulerError> {
        self.records.queue_ids()
    }
}

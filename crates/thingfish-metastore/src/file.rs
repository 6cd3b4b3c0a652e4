use std::cell::RefCell;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thingfish_types::{Logger, Oid, PropertyMap, PropertyValue, Scalar};
use tracing::{debug, warn};

use crate::error::{MetastoreError, Result};
use crate::lock::{LockFile, LockGuard};
use crate::table::{Entry, Table};
use crate::traits::Metastore;

/// File holding the serialized table.
pub const DATA_FILE: &str = "metastore.json";

/// Lock file guarding writers across processes.
pub const LOCK_FILE: &str = "metastore.lock";

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    entries: Vec<Entry>,
}

/// State of the transaction open on the current thread, if any.
#[derive(Default)]
struct Session {
    depth: usize,
    table: Option<Table>,
    dirty: bool,
    guard: Option<LockGuard>,
}

impl Session {
    fn reset(&mut self) {
        *self = Session::default();
    }
}

/// File-backed metastore.
///
/// The whole table lives in `<dir>/metastore.json`. Reads load the file
/// without locking, since every write replaces it with an atomic rename.
/// Writes take the `<dir>/metastore.lock` file lock, load, mutate, and
/// persist.
///
/// [`Metastore::run_in_transaction`] holds the lock for the whole body and
/// works on one loaded copy of the table: the copy is persisted once if the
/// body succeeds and dropped if it fails. Transactions nest; only the
/// outermost one touches the file.
pub struct FileMetastore {
    dir: PathBuf,
    data_path: PathBuf,
    lock: LockFile,
    session: ReentrantMutex<RefCell<Session>>,
    logger: Logger,
}

impl FileMetastore {
    /// Open (or create) a store in `dir`.
    pub fn open(dir: impl Into<PathBuf>, logger: Logger) -> Result<Self> {
        Self::open_with_timing(
            dir,
            crate::lock::DEFAULT_MAX_WAIT,
            crate::lock::DEFAULT_RETRY_INTERVAL,
            logger,
        )
    }

    pub fn open_with_timing(
        dir: impl Into<PathBuf>,
        max_wait: Duration,
        retry_interval: Duration,
        logger: Logger,
    ) -> Result<Self> {
        let dir = dir.into();
        if dir.as_os_str().is_empty() {
            return Err(MetastoreError::Configuration(
                "metastore directory must not be empty".into(),
            ));
        }
        fs::create_dir_all(&dir)?;
        let store = Self {
            data_path: dir.join(DATA_FILE),
            lock: LockFile::new(dir.join(LOCK_FILE)).with_timing(max_wait, retry_interval),
            dir,
            session: ReentrantMutex::new(RefCell::new(Session::default())),
            logger,
        };
        // Surface a corrupt file at open rather than on first use.
        let size = store.load()?.len();
        store
            .logger
            .scope(|| debug!(dir = %store.dir.display(), size, "opened file metastore"));
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load(&self) -> Result<Table> {
        let bytes = match fs::read(&self.data_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Table::new()),
            Err(e) => return Err(e.into()),
        };
        let file: StoreFile = serde_json::from_slice(&bytes).map_err(|e| {
            MetastoreError::Serialization(format!("{}: {e}", self.data_path.display()))
        })?;
        if file.version != FORMAT_VERSION {
            return Err(MetastoreError::Serialization(format!(
                "{}: unsupported format version {}",
                self.data_path.display(),
                file.version
            )));
        }
        Ok(Table::from_entries(file.entries))
    }

    fn persist(&self, table: &Table) -> Result<()> {
        let file = StoreFile {
            version: FORMAT_VERSION,
            entries: table.to_entries(),
        };
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, &file)
                .map_err(|e| MetastoreError::Serialization(e.to_string()))?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.data_path)
            .map_err(|e| MetastoreError::Io(e.error))?;
        self.logger
            .scope(|| debug!(rows = table.len(), "persisted file metastore"));
        Ok(())
    }

    /// Run `f` against the transaction's table, or a freshly loaded one.
    fn read_with<T>(&self, f: impl FnOnce(&Table) -> T) -> Result<T> {
        let session = self.session.lock();
        {
            let state = session.borrow();
            if let Some(table) = state.table.as_ref() {
                return Ok(f(table));
            }
        }
        let table = self.load()?;
        Ok(f(&table))
    }

    /// Apply `f` to the transaction's table, or lock, load, apply, persist.
    fn write_with<T>(&self, f: impl FnOnce(&mut Table) -> T) -> Result<T> {
        let session = self.session.lock();
        {
            let mut state = session.borrow_mut();
            if let Some(table) = state.table.as_mut() {
                let output = f(table);
                state.dirty = true;
                return Ok(output);
            }
        }
        let _guard = self.lock.acquire()?;
        let mut table = self.load()?;
        let output = f(&mut table);
        self.persist(&table)?;
        Ok(output)
    }
}

/// Clears the session if the transaction body panics.
struct UnwindReset<'a> {
    session: &'a RefCell<Session>,
}

impl Drop for UnwindReset<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            if let Ok(mut state) = self.session.try_borrow_mut() {
                state.reset();
            }
        }
    }
}

impl Metastore for FileMetastore {
    fn save(&self, oid: &Oid, properties: PropertyMap) -> Result<()> {
        self.write_with(|table| table.save(*oid, properties))
    }

    fn merge(&self, oid: &Oid, properties: PropertyMap) -> Result<()> {
        self.write_with(|table| table.merge(*oid, properties))
    }

    fn fetch(&self, oid: &Oid) -> Result<Option<PropertyMap>> {
        self.read_with(|table| table.get(oid).cloned())
    }

    fn fetch_value(&self, oid: &Oid, key: &str) -> Result<Option<PropertyValue>> {
        self.read_with(|table| table.value(oid, key).cloned())
    }

    fn remove(&self, oid: &Oid) -> Result<bool> {
        self.write_with(|table| table.remove(oid))
    }

    fn remove_property(&self, oid: &Oid, key: &str) -> Result<()> {
        self.write_with(|table| {
            table.remove_property(oid, key);
        })
    }

    fn remove_except(&self, oid: &Oid, keep: &[&str]) -> Result<()> {
        self.write_with(|table| table.remove_except(oid, keep))
    }

    fn append_value(&self, oid: &Oid, key: &str, value: Scalar) -> Result<()> {
        self.write_with(|table| table.append(*oid, key, value))
    }

    fn contains(&self, oid: &Oid) -> Result<bool> {
        self.read_with(|table| table.contains(oid))
    }

    fn size(&self) -> Result<usize> {
        self.read_with(Table::len)
    }

    fn oids(&self) -> Result<Vec<Oid>> {
        self.read_with(Table::oids)
    }

    fn snapshot(&self) -> Result<Vec<(Oid, PropertyMap)>> {
        self.read_with(Table::snapshot)
    }

    fn run_in_transaction(&self, body: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let session = self.session.lock();
        let outermost = session.borrow().depth == 0;
        if outermost {
            let guard = self.lock.acquire()?;
            let table = self.load()?;
            let mut state = session.borrow_mut();
            state.guard = Some(guard);
            state.table = Some(table);
            state.dirty = false;
        }
        session.borrow_mut().depth += 1;

        let reset = UnwindReset { session: &session };
        let result = body();
        drop(reset);

        let mut state = session.borrow_mut();
        state.depth -= 1;
        if state.depth > 0 {
            return result;
        }
        let table = state.table.take();
        let dirty = std::mem::take(&mut state.dirty);
        let guard = state.guard.take();
        drop(state);

        let outcome = match (&result, table) {
            (Ok(()), Some(table)) if dirty => self.persist(&table),
            (Err(e), Some(_)) if dirty => {
                self.logger
                    .scope(|| warn!(error = %e, "discarding file metastore transaction"));
                Ok(())
            }
            _ => Ok(()),
        };
        drop(guard);
        result.and(outcome)
    }
}

impl std::fmt::Debug for FileMetastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileMetastore")
            .field("dir", &self.dir)
            .finish()
    }
}

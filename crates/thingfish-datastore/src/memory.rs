use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thingfish_types::{Logger, Oid};
use tracing::{debug, warn};

use crate::error::{DatastoreError, Result};
use crate::traits::{read_and_rewind, BlobReader, BlobSource, Datastore, OidIter};

#[derive(Default)]
struct Blobs {
    by_oid: HashMap<Oid, Arc<[u8]>>,
    used: u64,
}

/// In-memory, HashMap-based datastore.
///
/// Blobs are held behind a `RwLock` as shared slices; every `fetch` gets its
/// own cursor over the shared bytes. An optional `maxsize` caps the total
/// number of bytes stored.
pub struct MemoryDatastore {
    blobs: RwLock<Blobs>,
    maxsize: Option<u64>,
    logger: Logger,
}

impl MemoryDatastore {
    /// Create a new empty store with no quota.
    pub fn new() -> Self {
        Self::with_options(None, Logger::default())
    }

    /// Create a store that refuses writes once `maxsize` bytes are stored.
    pub fn with_quota(maxsize: u64) -> Self {
        Self::with_options(Some(maxsize), Logger::default())
    }

    pub fn with_options(maxsize: Option<u64>, logger: Logger) -> Self {
        Self {
            blobs: RwLock::new(Blobs::default()),
            maxsize,
            logger,
        }
    }

    /// The configured byte limit, if any.
    pub fn maxsize(&self) -> Option<u64> {
        self.maxsize
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.by_oid.len())
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.by_oid.is_empty())
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> Result<u64> {
        Ok(self.read()?.used)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Blobs>> {
        self.blobs
            .read()
            .map_err(|e| DatastoreError::Internal(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Blobs>> {
        self.blobs
            .write()
            .map_err(|e| DatastoreError::Internal(format!("lock poisoned: {e}")))
    }

    /// Insert `data` under `oid`, enforcing the quota against the size the
    /// store would have after the write.
    fn store(&self, oid: Oid, data: Vec<u8>) -> Result<()> {
        let requested = data.len() as u64;
        let mut blobs = self.write()?;
        let previous = blobs.by_oid.get(&oid).map_or(0, |b| b.len() as u64);
        let would_use = blobs.used - previous + requested;

        if let Some(limit) = self.maxsize {
            if would_use > limit {
                self.logger.scope(|| {
                    warn!(%oid, requested, would_use, limit, "memory datastore quota exceeded");
                });
                return Err(DatastoreError::QuotaExceeded {
                    requested,
                    would_use,
                    limit,
                });
            }
        }

        blobs.by_oid.insert(oid, Arc::from(data));
        blobs.used = would_use;
        self.logger.scope(|| debug!(%oid, bytes = requested, "stored blob in memory"));
        Ok(())
    }
}

impl Default for MemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

impl Datastore for MemoryDatastore {
    fn save(&self, content: &mut dyn BlobSource) -> Result<Oid> {
        let data = read_and_rewind(content)?;
        let oid = Oid::generate();
        self.store(oid, data)?;
        Ok(oid)
    }

    fn replace(&self, oid: &Oid, content: &mut dyn BlobSource) -> Result<()> {
        let data = read_and_rewind(content)?;
        self.store(*oid, data)
    }

    fn fetch(&self, oid: &Oid) -> Result<Option<BlobReader>> {
        let blobs = self.read()?;
        Ok(blobs
            .by_oid
            .get(oid)
            .map(|data| Box::new(Cursor::new(Arc::clone(data))) as BlobReader))
    }

    fn remove(&self, oid: &Oid) -> Result<bool> {
        let mut blobs = self.write()?;
        match blobs.by_oid.remove(oid) {
            Some(data) => {
                blobs.used -= data.len() as u64;
                self.logger.scope(|| debug!(%oid, "removed blob from memory"));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn contains(&self, oid: &Oid) -> Result<bool> {
        Ok(self.read()?.by_oid.contains_key(oid))
    }

    fn each_oid(&self) -> Result<OidIter> {
        let oids: Vec<Oid> = self.read()?.by_oid.keys().copied().collect();
        Ok(Box::new(oids.into_iter()))
    }
}

impl std::fmt::Debug for MemoryDatastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len().unwrap_or(0);
        f.debug_struct("MemoryDatastore")
            .field("blob_count", &count)
            .field("maxsize", &self.maxsize)
            .finish()
    }
}

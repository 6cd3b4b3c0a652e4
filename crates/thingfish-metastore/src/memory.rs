use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use thingfish_types::{Logger, Oid, PropertyMap, PropertyValue, Scalar};
use tracing::debug;

use crate::error::{MetastoreError, Result};
use crate::table::Table;
use crate::traits::Metastore;

/// In-memory metastore.
///
/// Holds a [`Table`] behind a `RwLock`. Transactions run the body directly,
/// so concurrent writers may interleave between the steps of a transaction.
pub struct MemoryMetastore {
    table: RwLock<Table>,
    logger: Logger,
}

impl MemoryMetastore {
    pub fn new() -> Self {
        Self::with_logger(Logger::default())
    }

    pub fn with_logger(logger: Logger) -> Self {
        Self {
            table: RwLock::new(Table::new()),
            logger,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Table>> {
        self.table
            .read()
            .map_err(|e| MetastoreError::Internal(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Table>> {
        self.table
            .write()
            .map_err(|e| MetastoreError::Internal(format!("lock poisoned: {e}")))
    }
}

impl Default for MemoryMetastore {
    fn default() -> Self {
        Self::new()
    }
}

impl Metastore for MemoryMetastore {
    fn save(&self, oid: &Oid, properties: PropertyMap) -> Result<()> {
        let count = properties.len();
        self.write()?.save(*oid, properties);
        self.logger.scope(|| debug!(%oid, count, "saved properties"));
        Ok(())
    }

    fn merge(&self, oid: &Oid, properties: PropertyMap) -> Result<()> {
        let count = properties.len();
        self.write()?.merge(*oid, properties);
        self.logger.scope(|| debug!(%oid, count, "merged properties"));
        Ok(())
    }

    fn fetch(&self, oid: &Oid) -> Result<Option<PropertyMap>> {
        Ok(self.read()?.get(oid).cloned())
    }

    fn fetch_value(&self, oid: &Oid, key: &str) -> Result<Option<PropertyValue>> {
        Ok(self.read()?.value(oid, key).cloned())
    }

    fn remove(&self, oid: &Oid) -> Result<bool> {
        let removed = self.write()?.remove(oid);
        if removed {
            self.logger.scope(|| debug!(%oid, "removed properties"));
        }
        Ok(removed)
    }

    fn remove_property(&self, oid: &Oid, key: &str) -> Result<()> {
        self.write()?.remove_property(oid, key);
        Ok(())
    }

    fn remove_except(&self, oid: &Oid, keep: &[&str]) -> Result<()> {
        self.write()?.remove_except(oid, keep);
        Ok(())
    }

    fn append_value(&self, oid: &Oid, key: &str, value: Scalar) -> Result<()> {
        self.write()?.append(*oid, key, value);
        Ok(())
    }

    fn contains(&self, oid: &Oid) -> Result<bool> {
        Ok(self.read()?.contains(oid))
    }

    fn size(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    fn oids(&self) -> Result<Vec<Oid>> {
        Ok(self.read()?.oids())
    }

    fn snapshot(&self) -> Result<Vec<(Oid, PropertyMap)>> {
        Ok(self.read()?.snapshot())
    }
}

impl std::fmt::Debug for MemoryMetastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMetastore")
            .field("size", &self.size().unwrap_or(0))
            .finish()
    }
}

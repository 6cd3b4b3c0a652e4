use std::fs::{self, File};
use std::io::{self, BufReader, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tempfile::NamedTempFile;
use thingfish_types::{Logger, Oid};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{DatastoreError, Result};
use crate::traits::{BlobReader, BlobSource, Datastore, OidIter};

/// Name of the default spool directory inside the data directory.
pub const DEFAULT_SPOOL_DIR: &str = ".spool";

/// Filesystem datastore: one file per object.
///
/// On-disk layout:
/// ```text
/// <datadir>/<first two hex chars of oid>/<oid>
/// <spooldir>/.tmpXXXXXX            (in-flight writes)
/// ```
///
/// Content is first written to a temporary file in the spool directory and
/// then renamed into place, so readers only ever see complete blobs. The
/// spool directory must live on the same filesystem as the data directory.
pub struct FileDatastore {
    datadir: PathBuf,
    spooldir: PathBuf,
    maxsize: Option<u64>,
    /// Bytes currently stored; also serializes writers for quota checks.
    used: Mutex<u64>,
    logger: Logger,
}

impl FileDatastore {
    /// Open (or create) a store rooted at `datadir`.
    ///
    /// `spooldir` defaults to `<datadir>/.spool`.
    pub fn open(
        datadir: impl AsRef<Path>,
        spooldir: Option<PathBuf>,
        maxsize: Option<u64>,
        logger: Logger,
    ) -> Result<Self> {
        let datadir = datadir.as_ref().to_path_buf();
        if datadir.as_os_str().is_empty() {
            return Err(DatastoreError::Configuration(
                "file datastore requires a data directory".into(),
            ));
        }
        let spooldir = spooldir.unwrap_or_else(|| datadir.join(DEFAULT_SPOOL_DIR));
        fs::create_dir_all(&datadir)?;
        fs::create_dir_all(&spooldir)?;

        let used: u64 = blob_files(&datadir)
            .filter_map(|(_, entry)| entry.metadata().ok())
            .map(|meta| meta.len())
            .sum();

        logger.scope(|| {
            debug!(datadir = %datadir.display(), spooldir = %spooldir.display(), used, "opened file datastore");
        });

        Ok(Self {
            datadir,
            spooldir,
            maxsize,
            used: Mutex::new(used),
            logger,
        })
    }

    pub fn datadir(&self) -> &Path {
        &self.datadir
    }

    pub fn spooldir(&self) -> &Path {
        &self.spooldir
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> Result<u64> {
        Ok(*self.used()?)
    }

    /// Path of the file holding `oid`'s content.
    pub fn blob_path(&self, oid: &Oid) -> PathBuf {
        let name = oid.to_canonical();
        self.datadir.join(&name[..2]).join(name)
    }

    fn used(&self) -> Result<MutexGuard<'_, u64>> {
        self.used
            .lock()
            .map_err(|e| DatastoreError::Internal(format!("lock poisoned: {e}")))
    }

    fn write_blob(&self, oid: &Oid, content: &mut dyn BlobSource) -> Result<()> {
        let start = content.stream_position()?;
        let mut spooled = NamedTempFile::new_in(&self.spooldir)?;
        let copied = io::copy(&mut *content, &mut spooled);
        content.seek(SeekFrom::Start(start))?;
        let requested = copied?;
        spooled.flush()?;
        spooled.as_file().sync_all()?;

        let path = self.blob_path(oid);
        let mut used = self.used()?;
        let previous = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        let would_use = used.saturating_sub(previous) + requested;

        if let Some(limit) = self.maxsize {
            if would_use > limit {
                self.logger.scope(|| {
                    warn!(%oid, requested, would_use, limit, "file datastore quota exceeded");
                });
                return Err(DatastoreError::QuotaExceeded {
                    requested,
                    would_use,
                    limit,
                });
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        spooled.persist(&path).map_err(|e| DatastoreError::Io(e.error))?;
        *used = would_use;

        self.logger.scope(|| debug!(%oid, bytes = requested, path = %path.display(), "stored blob"));
        Ok(())
    }
}

impl Datastore for FileDatastore {
    fn save(&self, content: &mut dyn BlobSource) -> Result<Oid> {
        let oid = Oid::generate();
        self.write_blob(&oid, content)?;
        Ok(oid)
    }

    fn replace(&self, oid: &Oid, content: &mut dyn BlobSource) -> Result<()> {
        self.write_blob(oid, content)
    }

    fn fetch(&self, oid: &Oid) -> Result<Option<BlobReader>> {
        match File::open(self.blob_path(oid)) {
            Ok(file) => Ok(Some(Box::new(BufReader::new(file)))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, oid: &Oid) -> Result<bool> {
        let path = self.blob_path(oid);
        let mut used = self.used()?;
        let size = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        match fs::remove_file(&path) {
            Ok(()) => {
                *used = used.saturating_sub(size);
                self.logger.scope(|| debug!(%oid, "removed blob"));
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, oid: &Oid) -> Result<bool> {
        Ok(self.blob_path(oid).is_file())
    }

    fn each_oid(&self) -> Result<OidIter> {
        Ok(Box::new(blob_files(&self.datadir).map(|(oid, _)| oid)))
    }
}

impl std::fmt::Debug for FileDatastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDatastore")
            .field("datadir", &self.datadir)
            .field("spooldir", &self.spooldir)
            .field("maxsize", &self.maxsize)
            .finish()
    }
}

/// Walk the fan-out directories of `datadir`, yielding only files whose
/// name is a canonical oid sitting in the matching fan-out directory.
fn blob_files(datadir: &Path) -> impl Iterator<Item = (Oid, walkdir::DirEntry)> + Send {
    WalkDir::new(datadir)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let name = e.file_name().to_str()?;
            let oid = Oid::parse(name).ok()?;
            let canonical = oid.to_canonical();
            let fanout = e.path().parent()?.file_name()?.to_str()?;
            (name == canonical && fanout == &canonical[..2]).then_some((oid, e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::{Cursor, Read};
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> FileDatastore {
        FileDatastore::open(dir.path(), None, None, Logger::default()).unwrap()
    }

    #[test]
    fn save_and_fetch() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let oid = store.save_bytes(b"on disk").unwrap();
        assert_eq!(store.fetch_bytes(&oid).unwrap().unwrap(), b"on disk");
        assert!(store.blob_path(&oid).is_file());
    }

    #[test]
    fn layout_uses_two_char_fanout() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let oid = store.save_bytes(b"x").unwrap();
        let name = oid.to_string();
        assert_eq!(store.blob_path(&oid), dir.path().join(&name[..2]).join(&name));
    }

    #[test]
    fn save_rewinds_the_source() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let mut source = Cursor::new(b"stream body".to_vec());
        store.save(&mut source).unwrap();
        assert_eq!(source.position(), 0);
    }

    #[test]
    fn replace_overwrites_and_upserts() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let oid = store.save_bytes(b"old").unwrap();
        store.replace_bytes(&oid, b"newer content").unwrap();
        assert_eq!(store.fetch_bytes(&oid).unwrap().unwrap(), b"newer content");

        let fresh = Oid::generate();
        store.replace_bytes(&fresh, b"created by replace").unwrap();
        assert!(store.contains(&fresh).unwrap());
        assert_eq!(store.total_bytes().unwrap(), 13 + 18);
    }

    #[test]
    fn remove_is_noop_for_missing() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let oid = store.save_bytes(b"bye").unwrap();
        assert!(store.remove(&oid).unwrap());
        assert!(!store.remove(&oid).unwrap());
        assert!(store.fetch(&oid).unwrap().is_none());
        assert_eq!(store.total_bytes().unwrap(), 0);
    }

    #[test]
    fn each_oid_skips_spool_and_foreign_files() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let a = store.save_bytes(b"a").unwrap();
        let b = store.save_bytes(b"b").unwrap();
        fs::create_dir_all(dir.path().join("zz")).unwrap();
        fs::write(dir.path().join("zz").join("not-an-oid"), b"junk").unwrap();
        fs::write(store.spooldir().join("leftover"), b"junk").unwrap();

        let mut oids: Vec<Oid> = store.each_oid().unwrap().collect();
        oids.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(oids, expected);
    }

    #[test]
    fn reopen_sees_existing_blobs_and_usage() {
        let dir = TempDir::new().unwrap();
        let oid = open(&dir).save_bytes(b"persisted").unwrap();

        let store = open(&dir);
        assert!(store.contains(&oid).unwrap());
        assert_eq!(store.total_bytes().unwrap(), 9);
    }

    #[test]
    fn quota_rejection_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let store = FileDatastore::open(dir.path(), None, Some(2048), Logger::default()).unwrap();
        let err = store.save_bytes(&[7u8; 3072]).unwrap_err();
        assert!(matches!(err, DatastoreError::QuotaExceeded { .. }));
        assert_eq!(store.each_oid().unwrap().count(), 0);
        assert_eq!(fs::read_dir(store.spooldir()).unwrap().count(), 0);

        store.save_bytes(&[7u8; 1024]).unwrap();
        assert!(store.save_bytes(&[7u8; 1025]).is_err());
    }

    #[test]
    fn readers_are_independent() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let oid = store.save_bytes(b"0123456789").unwrap();
        let mut r1 = store.fetch(&oid).unwrap().unwrap();
        let mut r2 = store.fetch(&oid).unwrap().unwrap();
        let mut first = [0u8; 3];
        r1.read_exact(&mut first).unwrap();
        let mut second = Vec::new();
        r2.read_to_end(&mut second).unwrap();
        assert_eq!(&first, b"012");
        assert_eq!(second, b"0123456789");
    }

    #[test]
    fn empty_datadir_is_a_configuration_error() {
        let err = FileDatastore::open("", None, None, Logger::default()).unwrap_err();
        assert!(matches!(err, DatastoreError::Configuration(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn fetch_returns_saved_bytes(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let dir = TempDir::new().unwrap();
            let store = open(&dir);
            let oid = store.save_bytes(&data).unwrap();
            prop_assert_eq!(store.fetch_bytes(&oid).unwrap().unwrap(), data);
        }
    }
}

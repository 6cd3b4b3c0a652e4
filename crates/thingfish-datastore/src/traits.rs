use std::io::{Cursor, Read, Seek, SeekFrom};

use thingfish_types::Oid;

use crate::error::{DatastoreError, Result};

/// Input accepted by `save` and `replace`: any seekable byte stream.
///
/// Backends read from the current position to the end, then seek back to
/// where they started so the caller can reuse the stream.
pub trait BlobSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> BlobSource for T {}

/// An independent reader over one stored blob.
pub type BlobReader = Box<dyn Read + Send>;

/// A finite iterator over stored object ids.
pub type OidIter = Box<dyn Iterator<Item = Oid> + Send>;

/// Blob storage keyed by object id.
///
/// All implementations must satisfy these invariants:
/// - `fetch` returns exactly the bytes of the last successful `save` or
///   `replace` for that id, and `Ok(None)` for an unknown id.
/// - A write that fails (including a quota rejection) leaves no partial
///   content visible.
/// - Readers handed out by `fetch` never interfere with one another.
/// - Ids are compared in canonical form, so case variants of the same UUID
///   address the same blob.
pub trait Datastore: Send + Sync {
    /// Store new content under a freshly generated id and return the id.
    fn save(&self, content: &mut dyn BlobSource) -> Result<Oid>;

    /// Overwrite the content stored under `oid`.
    ///
    /// Creates the blob if `oid` is not yet stored.
    fn replace(&self, oid: &Oid, content: &mut dyn BlobSource) -> Result<()>;

    /// Open a reader over the content stored under `oid`.
    ///
    /// Returns `Ok(None)` if nothing is stored under `oid`.
    fn fetch(&self, oid: &Oid) -> Result<Option<BlobReader>>;

    /// Delete the content stored under `oid`. Returns `true` if it existed.
    fn remove(&self, oid: &Oid) -> Result<bool>;

    /// Check whether content is stored under `oid`.
    fn contains(&self, oid: &Oid) -> Result<bool>;

    /// Iterate over every stored id.
    ///
    /// Each call starts a fresh pass. Order is backend-defined.
    fn each_oid(&self) -> Result<OidIter>;

    /// Run `body` as one unit of work.
    ///
    /// The default runs `body` directly and provides no isolation. Backends
    /// with real multi-step atomicity override this.
    fn run_in_transaction(&self, body: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        body()
    }

    /// Store a byte slice. See [`Datastore::save`].
    fn save_bytes(&self, data: &[u8]) -> Result<Oid> {
        self.save(&mut Cursor::new(data))
    }

    /// Replace with a byte slice. See [`Datastore::replace`].
    fn replace_bytes(&self, oid: &Oid, data: &[u8]) -> Result<()> {
        self.replace(oid, &mut Cursor::new(data))
    }

    /// Read the whole blob into memory.
    fn fetch_bytes(&self, oid: &Oid) -> Result<Option<Vec<u8>>> {
        let Some(mut reader) = self.fetch(oid)? else {
            return Ok(None);
        };
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Some(data))
    }
}

/// Run `body` inside the store's transaction scope and return its value.
pub fn transaction<T, D>(store: &D, body: impl FnOnce() -> Result<T>) -> Result<T>
where
    D: Datastore + ?Sized,
{
    let mut body = Some(body);
    let mut output = None;
    store.run_in_transaction(&mut || {
        if let Some(body) = body.take() {
            output = Some(body()?);
        }
        Ok(())
    })?;
    output.ok_or_else(|| DatastoreError::Internal("transaction body was not run".into()))
}

/// Read `content` from its current position to the end, then seek back.
pub(crate) fn read_and_rewind(content: &mut dyn BlobSource) -> Result<Vec<u8>> {
    let start = content.stream_position()?;
    let mut data = Vec::new();
    let read = content.read_to_end(&mut data);
    content.seek(SeekFrom::Start(start))?;
    read?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatastore;

    #[test]
    fn read_and_rewind_restores_position() {
        let mut cursor = Cursor::new(b"0123456789".to_vec());
        cursor.seek(SeekFrom::Start(4)).unwrap();
        let data = read_and_rewind(&mut cursor).unwrap();
        assert_eq!(data, b"456789");
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn default_transaction_runs_body_once() {
        let store = MemoryDatastore::new();
        let mut calls = 0;
        let oid = transaction(&store, || {
            calls += 1;
            store.save_bytes(b"in a transaction")
        })
        .unwrap();
        assert_eq!(calls, 1);
        assert!(store.contains(&oid).unwrap());
    }

    #[test]
    fn transaction_propagates_body_error() {
        let store = MemoryDatastore::new();
        let result: Result<()> =
            transaction(&store, || Err(DatastoreError::Internal("boom".into())));
        assert!(matches!(result, Err(DatastoreError::Internal(_))));
    }

    #[test]
    fn fetch_bytes_of_missing_is_none() {
        let store = MemoryDatastore::new();
        assert!(store.fetch_bytes(&Oid::generate()).unwrap().is_none());
    }
}

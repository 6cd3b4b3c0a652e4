use std::fmt;
use std::sync::Arc;

use thingfish_datastore::{digest_source, BlobReader, BlobSource, Datastore, DatastoreError, Digest};
use thingfish_metastore::{transaction, Metastore, RequestContext, ResourceProxy, SearchQuery};
use thingfish_types::{keys, Logger, Oid, PropertyMap};
use tracing::{debug, warn};

use crate::error::{HandlerError, HandlerResult};

/// Where a store operation has got to. Only used for logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreStage {
    Pending,
    BlobWritten,
    Complete,
    FailedQuota,
    FailedMetadata,
}

impl fmt::Display for StoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreStage::Pending => "pending",
            StoreStage::BlobWritten => "blob_written",
            StoreStage::Complete => "complete",
            StoreStage::FailedQuota => "failed_quota",
            StoreStage::FailedMetadata => "failed_metadata",
        })
    }
}

/// An object's content plus the properties it was fetched with.
pub struct Resource {
    pub oid: Oid,
    pub metadata: PropertyMap,
    pub content: BlobReader,
}

impl Resource {
    pub fn format(&self) -> Option<String> {
        self.metadata.get(keys::FORMAT).map(|v| v.to_string())
    }

    pub fn checksum(&self) -> Option<String> {
        self.metadata.get(keys::CHECKSUM).map(|v| v.to_string())
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("oid", &self.oid)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Result of a conditional fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    Content(Resource),
    /// The caller's entity tag matches the stored checksum.
    NotModified { checksum: String },
}

/// Coordinates a datastore and a metastore so that every object's blob and
/// properties are written, read, and removed together.
#[derive(Clone)]
pub struct Handler {
    datastore: Arc<dyn Datastore>,
    metastore: Arc<dyn Metastore>,
    logger: Logger,
}

impl Handler {
    pub fn new(datastore: Arc<dyn Datastore>, metastore: Arc<dyn Metastore>) -> Self {
        Self::with_logger(datastore, metastore, Logger::default())
    }

    pub fn with_logger(datastore: Arc<dyn Datastore>, metastore: Arc<dyn Metastore>, logger: Logger) -> Self {
        Self {
            datastore,
            metastore,
            logger,
        }
    }

    pub fn datastore(&self) -> &dyn Datastore {
        &*self.datastore
    }

    pub fn metastore(&self) -> &dyn Metastore {
        &*self.metastore
    }

    /// A property view of `oid`.
    pub fn proxy(&self, oid: Oid) -> ResourceProxy<'_> {
        ResourceProxy::new(oid, &*self.metastore)
    }

    fn stage(&self, oid: Option<&Oid>, stage: StoreStage) {
        self.logger.scope(|| match oid {
            Some(oid) => debug!(%oid, %stage, "store"),
            None => debug!(%stage, "store"),
        });
    }

    // ---- content ----

    /// Store new content and its metadata; returns the new id.
    ///
    /// A quota rejection leaves both stores untouched. If the metadata
    /// cannot be written, the new blob and any properties already merged
    /// are removed again; should that also fail, the result is
    /// [`HandlerError::Integrity`].
    pub fn store(
        &self,
        body: &mut dyn BlobSource,
        metadata: PropertyMap,
        ctx: &RequestContext,
    ) -> HandlerResult<Oid> {
        self.stage(None, StoreStage::Pending);
        let digest = digest_source(body).map_err(DatastoreError::from)?;
        let oid = match self.datastore.save(body) {
            Ok(oid) => oid,
            Err(err) => return Err(self.blob_write_failed(None, err)),
        };
        self.stage(Some(&oid), StoreStage::BlobWritten);

        if let Err(err) = self.write_metadata(&oid, metadata, ctx, &digest) {
            self.stage(Some(&oid), StoreStage::FailedMetadata);
            return Err(self.discard_new_object(oid, err));
        }

        self.stage(Some(&oid), StoreStage::Complete);
        Ok(oid)
    }

    /// Undo a store whose metadata write failed part way. Properties
    /// merged before the failure go along with the blob.
    fn discard_new_object(&self, oid: Oid, err: HandlerError) -> HandlerError {
        let mut failures = Vec::new();
        if let Err(cleanup) = self.metastore.remove(&oid) {
            failures.push(format!("metadata cleanup failed ({cleanup})"));
        }
        if let Err(cleanup) = self.datastore.remove(&oid) {
            failures.push(format!("blob cleanup failed ({cleanup})"));
        }
        if failures.is_empty() {
            return err;
        }
        self.logger.scope(|| {
            warn!(%oid, failures = ?failures, "could not roll back a failed store")
        });
        HandlerError::Integrity {
            oid,
            reason: format!("metadata write failed ({err}); {}", failures.join("; ")),
        }
    }

    /// Replace the content of an existing object and merge `metadata`.
    ///
    /// If the metadata write fails the new blob stays in place, since the
    /// object was valid before the call, and the error is reported as
    /// [`HandlerError::Integrity`].
    pub fn replace(
        &self,
        oid: &Oid,
        body: &mut dyn BlobSource,
        metadata: PropertyMap,
        ctx: &RequestContext,
    ) -> HandlerResult<()> {
        if !self.exists(oid)? {
            return Err(HandlerError::NotFound(*oid));
        }
        self.stage(Some(oid), StoreStage::Pending);
        let digest = digest_source(body).map_err(DatastoreError::from)?;
        if let Err(err) = self.datastore.replace(oid, body) {
            return Err(self.blob_write_failed(Some(oid), err));
        }
        self.stage(Some(oid), StoreStage::BlobWritten);

        if let Err(err) = self.write_metadata(oid, metadata, ctx, &digest) {
            self.stage(Some(oid), StoreStage::FailedMetadata);
            return Err(HandlerError::Integrity {
                oid: *oid,
                reason: format!("content replaced but metadata write failed: {err}"),
            });
        }

        self.stage(Some(oid), StoreStage::Complete);
        Ok(())
    }

    fn blob_write_failed(&self, oid: Option<&Oid>, err: DatastoreError) -> HandlerError {
        match err {
            DatastoreError::QuotaExceeded { requested, limit, .. } => {
                self.stage(oid, StoreStage::FailedQuota);
                HandlerError::QuotaExceeded { requested, limit }
            }
            other => other.into(),
        }
    }

    fn write_metadata(
        &self,
        oid: &Oid,
        metadata: PropertyMap,
        ctx: &RequestContext,
        digest: &Digest,
    ) -> HandlerResult<()> {
        let caller = self.sanitize(oid, metadata);
        let ctx = RequestContext {
            content_length: Some(digest.extent),
            ..ctx.clone()
        };
        transaction(&*self.metastore, || {
            self.metastore.merge(oid, caller)?;
            let proxy = self.proxy(*oid);
            proxy.extract_default_metadata(&ctx)?;
            proxy.set(keys::CHECKSUM, digest.checksum.as_str())
        })?;
        Ok(())
    }

    /// Drop operational keys from caller-supplied metadata.
    fn sanitize(&self, oid: &Oid, mut metadata: PropertyMap) -> PropertyMap {
        metadata.retain(|key, _| {
            let keep = !keys::is_operational(key);
            if !keep {
                self.logger
                    .scope(|| debug!(%oid, key = key.as_str(), "ignoring operational key from caller"));
            }
            keep
        });
        metadata
    }

    /// Fetch content and metadata.
    ///
    /// With `if_none_match` equal to the stored checksum the datastore is
    /// not consulted and [`FetchOutcome::NotModified`] is returned.
    pub fn fetch(&self, oid: &Oid, if_none_match: Option<&str>) -> HandlerResult<FetchOutcome> {
        let metadata = self.metastore.fetch(oid)?;

        if let (Some(tag), Some(props)) = (if_none_match, metadata.as_ref()) {
            if let Some(checksum) = props.get(keys::CHECKSUM).map(|v| v.to_string()) {
                if tag.trim().trim_matches('"') == checksum {
                    return Ok(FetchOutcome::NotModified { checksum });
                }
            }
        }

        let Some(content) = self.datastore.fetch(oid)? else {
            if metadata.is_some() {
                self.logger
                    .scope(|| warn!(%oid, "metadata present but blob missing"));
            }
            return Err(HandlerError::NotFound(*oid));
        };
        Ok(FetchOutcome::Content(Resource {
            oid: *oid,
            metadata: metadata.unwrap_or_default(),
            content,
        }))
    }

    /// Remove the object from both stores.
    ///
    /// Fails with [`HandlerError::NotFound`] only when neither store had it.
    pub fn delete(&self, oid: &Oid) -> HandlerResult<()> {
        let had_metadata = self.metastore.remove(oid)?;
        let had_blob = self.datastore.remove(oid)?;
        if !had_metadata && !had_blob {
            return Err(HandlerError::NotFound(*oid));
        }
        if had_metadata != had_blob {
            self.logger
                .scope(|| warn!(%oid, had_metadata, had_blob, "deleted a half-stored object"));
        }
        self.logger.scope(|| debug!(%oid, "deleted"));
        Ok(())
    }

    /// Whether either store knows `oid`.
    pub fn exists(&self, oid: &Oid) -> HandlerResult<bool> {
        Ok(self.metastore.contains(oid)? || self.datastore.contains(oid)?)
    }

    // ---- metadata ----

    pub fn fetch_metadata(&self, oid: &Oid) -> HandlerResult<PropertyMap> {
        self.metastore
            .fetch(oid)?
            .ok_or(HandlerError::NotFound(*oid))
    }

    fn require_metadata(&self, oid: &Oid) -> HandlerResult<()> {
        if self.metastore.contains(oid)? {
            Ok(())
        } else {
            Err(HandlerError::NotFound(*oid))
        }
    }

    /// Merge caller keys into the object's properties.
    pub fn merge_metadata(&self, oid: &Oid, metadata: PropertyMap) -> HandlerResult<()> {
        self.require_metadata(oid)?;
        let caller = self.sanitize(oid, metadata);
        self.metastore.merge(oid, caller)?;
        Ok(())
    }

    /// Replace every caller key, keeping the operational ones.
    pub fn replace_metadata(&self, oid: &Oid, metadata: PropertyMap) -> HandlerResult<()> {
        self.require_metadata(oid)?;
        let caller = self.sanitize(oid, metadata);
        transaction(&*self.metastore, || {
            self.metastore.remove_except(oid, keys::OPERATIONAL)?;
            self.metastore.merge(oid, caller)
        })?;
        Ok(())
    }

    /// Drop every caller key, keeping the operational ones.
    pub fn reset_metadata(&self, oid: &Oid) -> HandlerResult<()> {
        self.require_metadata(oid)?;
        self.metastore.remove_except(oid, keys::OPERATIONAL)?;
        Ok(())
    }

    /// Remove one caller key. Removing an absent key succeeds.
    pub fn remove_property(&self, oid: &Oid, key: &str) -> HandlerResult<()> {
        if keys::is_operational(key) {
            return Err(HandlerError::InvalidArgument(format!(
                "{key} is an operational property"
            )));
        }
        self.require_metadata(oid)?;
        self.metastore.remove_property(oid, key)?;
        Ok(())
    }

    /// Objects whose `relation` names `oid`.
    pub fn related(&self, oid: &Oid) -> HandlerResult<Vec<Oid>> {
        Ok(self.metastore.fetch_related_oids(oid)?)
    }

    pub fn search(&self, query: &SearchQuery) -> HandlerResult<Vec<Oid>> {
        Ok(self.metastore.search(query)?)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use thingfish_datastore::MemoryDatastore;
    use thingfish_metastore::MemoryMetastore;
    use thingfish_types::PropertyValue;

    fn handler() -> Handler {
        Handler::new(Arc::new(MemoryDatastore::new()), Arc::new(MemoryMetastore::new()))
    }

    fn ctx() -> RequestContext {
        RequestContext::new().content_type("text/plain").user_agent("test")
    }

    #[test]
    fn store_writes_operational_metadata() {
        let h = handler();
        let oid = h
            .store(&mut Cursor::new(b"hello".to_vec()), PropertyMap::new(), &ctx())
            .unwrap();
        let meta = h.fetch_metadata(&oid).unwrap();
        assert_eq!(meta.get(keys::FORMAT), Some(&PropertyValue::text("text/plain")));
        assert_eq!(meta.get(keys::EXTENT), Some(&PropertyValue::integer(5)));
        assert_eq!(
            meta.get(keys::CHECKSUM).map(|v| v.to_string()),
            Some(thingfish_datastore::digest(b"hello").checksum)
        );
        assert!(meta.contains_key(keys::CREATED));
        assert!(meta.contains_key(keys::MODIFIED));
    }

    #[test]
    fn extent_comes_from_the_content_not_the_header() {
        let h = handler();
        let lying = ctx().content_length(999);
        let oid = h
            .store(&mut Cursor::new(b"four".to_vec()), PropertyMap::new(), &lying)
            .unwrap();
        assert_eq!(h.proxy(oid).extent().unwrap(), Some(4));
    }

    #[test]
    fn caller_cannot_set_operational_keys() {
        let h = handler();
        let mut meta = PropertyMap::new();
        meta.insert("Checksum".into(), PropertyValue::text("forged"));
        meta.insert("title".into(), PropertyValue::text("kept"));
        let oid = h
            .store(&mut Cursor::new(b"x".to_vec()), meta, &ctx())
            .unwrap();
        let stored = h.fetch_metadata(&oid).unwrap();
        assert!(!stored.contains_key("Checksum"));
        assert_eq!(stored.get("title"), Some(&PropertyValue::text("kept")));
    }

    #[test]
    fn conditional_fetch() {
        let h = handler();
        let oid = h
            .store(&mut Cursor::new(b"etag me".to_vec()), PropertyMap::new(), &ctx())
            .unwrap();
        let checksum = h.proxy(oid).checksum().unwrap().unwrap();

        let quoted = format!("\"{checksum}\"");
        assert!(matches!(
            h.fetch(&oid, Some(quoted.as_str())).unwrap(),
            FetchOutcome::NotModified { .. }
        ));
        match h.fetch(&oid, Some("stale")).unwrap() {
            FetchOutcome::Content(mut resource) => {
                let mut body = String::new();
                resource.content.read_to_string(&mut body).unwrap();
                assert_eq!(body, "etag me");
                assert_eq!(resource.checksum(), Some(checksum));
                assert_eq!(resource.format().as_deref(), Some("text/plain"));
            }
            other => panic!("expected content, got {other:?}"),
        }
    }

    #[test]
    fn replace_of_unknown_object_is_not_found() {
        let h = handler();
        let err = h
            .replace(&Oid::generate(), &mut Cursor::new(b"x".to_vec()), PropertyMap::new(), &ctx())
            .unwrap_err();
        assert!(matches!(err, HandlerError::NotFound(_)));
    }

    #[test]
    fn metadata_ops_require_an_object() {
        let h = handler();
        let oid = Oid::generate();
        assert!(matches!(h.fetch_metadata(&oid), Err(HandlerError::NotFound(_))));
        assert!(matches!(
            h.merge_metadata(&oid, PropertyMap::new()),
            Err(HandlerError::NotFound(_))
        ));
        assert!(matches!(h.reset_metadata(&oid), Err(HandlerError::NotFound(_))));
    }

    #[test]
    fn operational_property_cannot_be_removed() {
        let h = handler();
        let oid = h
            .store(&mut Cursor::new(b"x".to_vec()), PropertyMap::new(), &ctx())
            .unwrap();
        let err = h.remove_property(&oid, "format").unwrap_err();
        assert_eq!(err.kind().http_status(), 400);
    }

    #[test]
    fn stage_names() {
        assert_eq!(StoreStage::BlobWritten.to_string(), "blob_written");
        assert_eq!(StoreStage::FailedQuota.to_string(), "failed_quota");
    }
}

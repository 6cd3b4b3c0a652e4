//! Per-object view over a metastore.

use chrono::{DateTime, Utc};
use thingfish_types::{keys, Oid, PropertyMap, PropertyValue, Scalar};

use crate::error::Result;
use crate::traits::{transaction, Metastore};

/// Inbound request details that become operational metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub user_agent: Option<String>,
    pub remote_addr: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_type(mut self, value: impl Into<String>) -> Self {
        self.content_type = Some(value.into());
        self
    }

    pub fn content_length(mut self, value: u64) -> Self {
        self.content_length = Some(value);
        self
    }

    pub fn user_agent(mut self, value: impl Into<String>) -> Self {
        self.user_agent = Some(value.into());
        self
    }

    pub fn remote_addr(mut self, value: impl Into<String>) -> Self {
        self.remote_addr = Some(value.into());
        self
    }
}

/// A view of one object's properties.
///
/// Holds only the binding; every call goes to the store, so reads always
/// reflect live data. Two proxies are equal when they name the same object.
#[derive(Clone, Copy)]
pub struct ResourceProxy<'a> {
    oid: Oid,
    store: &'a dyn Metastore,
}

impl<'a> ResourceProxy<'a> {
    pub fn new(oid: Oid, store: &'a dyn Metastore) -> Self {
        Self { oid, store }
    }

    pub fn oid(&self) -> Oid {
        self.oid
    }

    pub fn exists(&self) -> Result<bool> {
        self.store.contains(&self.oid)
    }

    pub fn get(&self, key: &str) -> Result<Option<PropertyValue>> {
        self.store.fetch_value(&self.oid, key)
    }

    pub fn set(&self, key: &str, value: impl Into<PropertyValue>) -> Result<()> {
        let mut single = PropertyMap::new();
        single.insert(key.to_string(), value.into());
        self.store.merge(&self.oid, single)
    }

    pub fn has(&self, key: &str) -> Result<bool> {
        self.store.has_property(&self.oid, key)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.store.remove_property(&self.oid, key)
    }

    pub fn append(&self, key: &str, value: impl Into<Scalar>) -> Result<()> {
        self.store.append_value(&self.oid, key, value.into())
    }

    /// The live property set; empty if the object has none.
    pub fn properties(&self) -> Result<PropertyMap> {
        Ok(self.store.fetch(&self.oid)?.unwrap_or_default())
    }

    /// Iterate over the live property set.
    pub fn each(&self) -> Result<impl Iterator<Item = (String, PropertyValue)>> {
        Ok(self.properties()?.into_iter())
    }

    /// Merge `properties` into the live set.
    pub fn update(&self, properties: PropertyMap) -> Result<()> {
        self.store.merge(&self.oid, properties)
    }

    // ---- operational accessors ----

    fn text(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key)?.map(|v| v.to_string()))
    }

    pub fn format(&self) -> Result<Option<String>> {
        self.text(keys::FORMAT)
    }

    pub fn extent(&self) -> Result<Option<u64>> {
        Ok(self
            .get(keys::EXTENT)?
            .and_then(|v| v.as_integer())
            .and_then(|n| u64::try_from(n).ok()))
    }

    pub fn checksum(&self) -> Result<Option<String>> {
        self.text(keys::CHECKSUM)
    }

    pub fn created(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.get(keys::CREATED)?.and_then(|v| v.as_timestamp()))
    }

    pub fn modified(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.get(keys::MODIFIED)?.and_then(|v| v.as_timestamp()))
    }

    pub fn useragent(&self) -> Result<Option<String>> {
        self.text(keys::USERAGENT)
    }

    pub fn uploadaddress(&self) -> Result<Option<String>> {
        self.text(keys::UPLOADADDRESS)
    }

    pub fn title(&self) -> Result<Option<String>> {
        self.text(keys::TITLE)
    }

    /// The related object named by `relation`, if it parses as an id.
    pub fn relation(&self) -> Result<Option<Oid>> {
        Ok(self
            .get(keys::RELATION)?
            .and_then(|v| v.values().first().and_then(|s| Oid::parse(&s.to_string()).ok())))
    }

    /// Record operational metadata from an inbound request.
    ///
    /// Sets `format`, `extent`, `useragent`, and `uploadaddress` from
    /// whatever `ctx` carries. `created` is only set when absent; `modified`
    /// is always refreshed.
    pub fn extract_default_metadata(&self, ctx: &RequestContext) -> Result<()> {
        self.extract_default_metadata_at(ctx, Utc::now())
    }

    /// [`extract_default_metadata`](Self::extract_default_metadata) with an
    /// explicit clock reading.
    pub fn extract_default_metadata_at(&self, ctx: &RequestContext, now: DateTime<Utc>) -> Result<()> {
        let mut defaults = PropertyMap::new();
        if let Some(format) = &ctx.content_type {
            defaults.insert(keys::FORMAT.into(), PropertyValue::text(format.as_str()));
        }
        if let Some(length) = ctx.content_length {
            let length = i64::try_from(length).unwrap_or(i64::MAX);
            defaults.insert(keys::EXTENT.into(), PropertyValue::integer(length));
        }
        if let Some(agent) = &ctx.user_agent {
            defaults.insert(keys::USERAGENT.into(), PropertyValue::text(agent.as_str()));
        }
        if let Some(addr) = &ctx.remote_addr {
            defaults.insert(keys::UPLOADADDRESS.into(), PropertyValue::text(addr.as_str()));
        }
        defaults.insert(keys::MODIFIED.into(), PropertyValue::timestamp(now));

        transaction(self.store, || {
            if !self.store.has_property(&self.oid, keys::CREATED)? {
                defaults.insert(keys::CREATED.into(), PropertyValue::timestamp(now));
            }
            self.store.merge(&self.oid, std::mem::take(&mut defaults))
        })
    }
}

impl PartialEq for ResourceProxy<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.oid == other.oid
    }
}

impl Eq for ResourceProxy<'_> {}

impl std::fmt::Debug for ResourceProxy<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceProxy").field("oid", &self.oid).finish()
    }
}

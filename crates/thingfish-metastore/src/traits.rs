use std::collections::BTreeMap;

use thingfish_types::{Oid, PropertyMap, PropertyValue, Scalar};

use crate::error::{MetastoreError, Result};
use crate::search::{self, SearchQuery};

/// Property storage keyed by object id.
///
/// Implementations must uphold:
/// - `save` replaces the whole property set; `merge` touches only the keys
///   it is given.
/// - Removing an object removes every property it had.
/// - Ids are compared in canonical form.
/// - Enumeration and search results come back in first-save order unless a
///   sort order is requested.
///
/// Searching, relation lookup, and the catalog helpers are provided on top of
/// [`Metastore::snapshot`]. Backends only override them when they can answer
/// faster.
pub trait Metastore: Send + Sync {
    /// Replace the property set of `oid` with `properties`.
    fn save(&self, oid: &Oid, properties: PropertyMap) -> Result<()>;

    /// Overwrite the keys of `oid` named in `properties`, keeping the rest.
    fn merge(&self, oid: &Oid, properties: PropertyMap) -> Result<()>;

    /// The full property set of `oid`, or `None` if it has none.
    fn fetch(&self, oid: &Oid) -> Result<Option<PropertyMap>>;

    fn fetch_value(&self, oid: &Oid, key: &str) -> Result<Option<PropertyValue>>;

    /// Drop the property set of `oid`. Returns `true` if there was one.
    fn remove(&self, oid: &Oid) -> Result<bool>;

    /// Drop one property of `oid`. A missing property is not an error.
    fn remove_property(&self, oid: &Oid, key: &str) -> Result<()>;

    /// Drop every property of `oid` whose name is not in `keep`.
    fn remove_except(&self, oid: &Oid, keep: &[&str]) -> Result<()>;

    /// Add `value` under `key`, upgrading a single value to a list.
    fn append_value(&self, oid: &Oid, key: &str, value: Scalar) -> Result<()>;

    fn contains(&self, oid: &Oid) -> Result<bool>;

    /// Number of objects with a property set.
    fn size(&self) -> Result<usize>;

    /// Every id, in first-save order.
    fn oids(&self) -> Result<Vec<Oid>>;

    /// A copy of every row, in first-save order.
    fn snapshot(&self) -> Result<Vec<(Oid, PropertyMap)>>;

    /// Run `body` as one unit of work.
    ///
    /// The default runs `body` directly with no isolation.
    fn run_in_transaction(&self, body: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        body()
    }

    /// The subset of `keys` that `oid` has. Absent keys are omitted.
    fn fetch_keys(&self, oid: &Oid, keys: &[&str]) -> Result<PropertyMap> {
        let mut found = PropertyMap::new();
        if let Some(mut properties) = self.fetch(oid)? {
            for key in keys {
                if let Some(value) = properties.remove(*key) {
                    found.insert((*key).to_string(), value);
                }
            }
        }
        Ok(found)
    }

    fn has_property(&self, oid: &Oid, key: &str) -> Result<bool> {
        Ok(self.fetch_value(oid, key)?.is_some())
    }

    /// Iterate over every id. Each call starts a fresh pass.
    fn each_oid(&self) -> Result<Box<dyn Iterator<Item = Oid> + Send>> {
        Ok(Box::new(self.oids()?.into_iter()))
    }

    /// Ids whose `relation` property names `oid`.
    fn fetch_related_oids(&self, oid: &Oid) -> Result<Vec<Oid>> {
        Ok(search::related(&self.snapshot()?, oid))
    }

    /// Ids matching every criterion of `query`, ordered and truncated as
    /// requested.
    fn search(&self, query: &SearchQuery) -> Result<Vec<Oid>> {
        Ok(search::run(&self.snapshot()?, query))
    }

    /// Ids whose properties equal every entry of `criteria`. Empty criteria
    /// match nothing.
    fn find_by_exact_properties(&self, criteria: &PropertyMap) -> Result<Vec<Oid>> {
        if criteria.is_empty() {
            return Ok(Vec::new());
        }
        Ok(search::exact(&self.snapshot()?, criteria))
    }

    /// Ids whose properties match every case-insensitive `*` glob in
    /// `patterns`. Empty patterns match nothing.
    fn find_by_matching_properties(&self, patterns: &BTreeMap<String, String>) -> Result<Vec<Oid>> {
        if patterns.is_empty() {
            return Ok(Vec::new());
        }
        search::matching(&self.snapshot()?, patterns)
    }

    /// Every property name in use, sorted.
    fn property_keys(&self) -> Result<Vec<String>> {
        Ok(search::property_keys(&self.snapshot()?))
    }

    /// Every distinct value stored under `key`, sorted.
    fn property_values(&self, key: &str) -> Result<Vec<Scalar>> {
        Ok(search::property_values(&self.snapshot()?, key))
    }
}

/// Run `body` inside the store's transaction scope and return its value.
pub fn transaction<T, M>(store: &M, body: impl FnOnce() -> Result<T>) -> Result<T>
where
    M: Metastore + ?Sized,
{
    let mut body = Some(body);
    let mut output = None;
    store.run_in_transaction(&mut || {
        if let Some(body) = body.take() {
            output = Some(body()?);
        }
        Ok(())
    })?;
    output.ok_or_else(|| MetastoreError::Internal("transaction body was not run".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryMetastore;

    fn props(pairs: &[(&str, &str)]) -> PropertyMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), PropertyValue::text(*v)))
            .collect()
    }

    #[test]
    fn fetch_keys_omits_absent() {
        let store = MemoryMetastore::new();
        let oid = Oid::generate();
        store.save(&oid, props(&[("a", "1"), ("b", "2")])).unwrap();
        let got = store.fetch_keys(&oid, &["a", "missing"]).unwrap();
        assert_eq!(got, props(&[("a", "1")]));
        assert!(store.fetch_keys(&Oid::generate(), &["a"]).unwrap().is_empty());
    }

    #[test]
    fn has_property_reports_presence() {
        let store = MemoryMetastore::new();
        let oid = Oid::generate();
        store.save(&oid, props(&[("a", "1")])).unwrap();
        assert!(store.has_property(&oid, "a").unwrap());
        assert!(!store.has_property(&oid, "b").unwrap());
    }

    #[test]
    fn each_oid_follows_first_save_order() {
        let store = MemoryMetastore::new();
        let ids: Vec<Oid> = (0..4).map(|_| Oid::generate()).collect();
        for oid in &ids {
            store.save(oid, PropertyMap::new()).unwrap();
        }
        assert_eq!(store.each_oid().unwrap().collect::<Vec<_>>(), ids);
        assert_eq!(store.each_oid().unwrap().count(), 4);
    }

    #[test]
    fn transaction_returns_body_value() {
        let store = MemoryMetastore::new();
        let oid = Oid::generate();
        let size = transaction(&store, || {
            store.save(&oid, props(&[("a", "1")]))?;
            store.size()
        })
        .unwrap();
        assert_eq!(size, 1);
    }

    #[test]
    fn transaction_propagates_body_error() {
        let store = MemoryMetastore::new();
        let result: Result<()> = transaction(&store, || Err(MetastoreError::Internal("boom".into())));
        assert!(matches!(result, Err(MetastoreError::Internal(_))));
    }
}

//! Insertion-ordered property table.
//!
//! [`Table`] holds every object's property set and remembers the order in
//! which objects were first saved. Both bundled backends keep their data in
//! a `Table`: the memory backend behind a lock, the file backend by loading
//! and persisting it around each operation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thingfish_types::{Oid, PropertyMap, PropertyValue, Scalar};

/// One object's row in serialized form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub oid: Oid,
    pub properties: PropertyMap,
}

/// Property sets keyed by object id, iterated in first-save order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    order: Vec<Oid>,
    rows: HashMap<Oid, PropertyMap>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a table from serialized entries, keeping their order.
    ///
    /// A repeated oid keeps its first position; the later properties win.
    pub fn from_entries(entries: Vec<Entry>) -> Self {
        let mut table = Self::new();
        for entry in entries {
            table.save(entry.oid, entry.properties);
        }
        table
    }

    /// Serialize in first-save order.
    pub fn to_entries(&self) -> Vec<Entry> {
        self.iter()
            .map(|(oid, properties)| Entry {
                oid: *oid,
                properties: properties.clone(),
            })
            .collect()
    }

    /// Rows in first-save order.
    pub fn iter(&self) -> impl Iterator<Item = (&Oid, &PropertyMap)> {
        self.order
            .iter()
            .filter_map(move |oid| self.rows.get(oid).map(|props| (oid, props)))
    }

    /// Clone every row, in first-save order.
    pub fn snapshot(&self) -> Vec<(Oid, PropertyMap)> {
        self.iter().map(|(oid, props)| (*oid, props.clone())).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, oid: &Oid) -> bool {
        self.rows.contains_key(oid)
    }

    pub fn oids(&self) -> Vec<Oid> {
        self.order.clone()
    }

    pub fn get(&self, oid: &Oid) -> Option<&PropertyMap> {
        self.rows.get(oid)
    }

    pub fn value(&self, oid: &Oid, key: &str) -> Option<&PropertyValue> {
        self.rows.get(oid).and_then(|props| props.get(key))
    }

    fn row_mut(&mut self, oid: Oid) -> &mut PropertyMap {
        if !self.rows.contains_key(&oid) {
            self.order.push(oid);
        }
        self.rows.entry(oid).or_default()
    }

    /// Replace the whole property set of `oid`.
    pub fn save(&mut self, oid: Oid, properties: PropertyMap) {
        *self.row_mut(oid) = properties;
    }

    /// Overwrite only the keys present in `properties`.
    pub fn merge(&mut self, oid: Oid, properties: PropertyMap) {
        self.row_mut(oid).extend(properties);
    }

    /// Add `value` under `key`, turning a single value into a list.
    pub fn append(&mut self, oid: Oid, key: &str, value: Scalar) {
        let row = self.row_mut(oid);
        match row.get_mut(key) {
            Some(existing) => existing.push(value),
            None => {
                row.insert(key.to_string(), PropertyValue::Single(value));
            }
        }
    }

    /// Drop the whole property set. Returns `true` if it existed.
    pub fn remove(&mut self, oid: &Oid) -> bool {
        if self.rows.remove(oid).is_some() {
            self.order.retain(|o| o != oid);
            true
        } else {
            false
        }
    }

    /// Drop one property. Returns `true` if it existed.
    pub fn remove_property(&mut self, oid: &Oid, key: &str) -> bool {
        self.rows
            .get_mut(oid)
            .is_some_and(|props| props.remove(key).is_some())
    }

    /// Drop every property of `oid` whose name is not in `keep`.
    pub fn remove_except(&mut self, oid: &Oid, keep: &[&str]) {
        if let Some(props) = self.rows.get_mut(oid) {
            props.retain(|key, _| keep.contains(&key.as_str()));
        }
    }
}

//! Metadata search.
//!
//! Every function here works on a snapshot of rows in first-save order, so
//! backends only have to hand over their rows; the matching, ordering, and
//! truncation rules live in one place.
//!
//! - [`run`]: AND of exact criteria, optional ordering by property tuple
//!   (ties broken by oid), optional limit.
//! - [`exact`]: AND of exact criteria, no ordering.
//! - [`matching`]: AND of case-insensitive `*` glob patterns.
//!
//! `exact` and `matching` return nothing for empty criteria. `run` with no
//! criteria returns every row.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use thingfish_types::{keys, Oid, PropertyMap, PropertyValue, Scalar};

use crate::error::{MetastoreError, Result};

/// A search request: criteria, sort keys, and an optional limit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchQuery {
    /// Property name to expected value; every entry must match.
    pub criteria: PropertyMap,
    /// Property names to sort by, most significant first.
    pub order: Vec<String>,
    pub limit: Option<usize>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn criterion(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.criteria.insert(key.into(), value.into());
        self
    }

    pub fn order_by(mut self, key: impl Into<String>) -> Self {
        self.order.push(key.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Returns `true` if `properties` satisfies every criterion.
pub fn matches_all(properties: &PropertyMap, criteria: &PropertyMap) -> bool {
    criteria.iter().all(|(key, expected)| {
        properties
            .get(key)
            .is_some_and(|actual| actual.matches(expected))
    })
}

/// Answer a [`SearchQuery`] over `rows`.
pub fn run(rows: &[(Oid, PropertyMap)], query: &SearchQuery) -> Vec<Oid> {
    let mut hits: Vec<&(Oid, PropertyMap)> = rows
        .iter()
        .filter(|(_, props)| matches_all(props, &query.criteria))
        .collect();

    if !query.order.is_empty() {
        hits.sort_by(|a, b| compare_rows(a, b, &query.order));
    }

    let oids = hits.into_iter().map(|(oid, _)| *oid);
    match query.limit {
        Some(limit) => oids.take(limit).collect(),
        None => oids.collect(),
    }
}

fn compare_rows(a: &(Oid, PropertyMap), b: &(Oid, PropertyMap), order: &[String]) -> Ordering {
    for key in order {
        let left = a.1.get(key).map(PropertyValue::values);
        let right = b.1.get(key).map(PropertyValue::values);
        match left.cmp(&right) {
            Ordering::Equal => continue,
            unequal => return unequal,
        }
    }
    a.0.cmp(&b.0)
}

/// Oids whose properties exactly match every criterion, in first-save order.
pub fn exact(rows: &[(Oid, PropertyMap)], criteria: &PropertyMap) -> Vec<Oid> {
    if criteria.is_empty() {
        return Vec::new();
    }
    rows.iter()
        .filter(|(_, props)| matches_all(props, criteria))
        .map(|(oid, _)| *oid)
        .collect()
}

/// A compiled case-insensitive glob where `*` matches any run of characters.
#[derive(Clone, Debug)]
pub struct Glob {
    regex: Regex,
}

impl Glob {
    pub fn new(pattern: &str) -> Result<Self> {
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("(?is)^{body}$")).map_err(|e| MetastoreError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { regex })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Returns `true` if any value held by `value` matches.
    pub fn matches_value(&self, value: &PropertyValue) -> bool {
        value.values().iter().any(|v| self.is_match(&v.to_string()))
    }
}

/// Oids whose properties match every glob pattern, in first-save order.
pub fn matching(rows: &[(Oid, PropertyMap)], patterns: &BTreeMap<String, String>) -> Result<Vec<Oid>> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }
    let globs = patterns
        .iter()
        .map(|(key, pattern)| Ok((key.as_str(), Glob::new(pattern)?)))
        .collect::<Result<Vec<_>>>()?;

    Ok(rows
        .iter()
        .filter(|(_, props)| {
            globs.iter().all(|(key, glob)| {
                props.get(*key).is_some_and(|value| glob.matches_value(value))
            })
        })
        .map(|(oid, _)| *oid)
        .collect())
}

/// Oids whose `relation` property names `target`, ignoring case.
pub fn related(rows: &[(Oid, PropertyMap)], target: &Oid) -> Vec<Oid> {
    rows.iter()
        .filter(|(_, props)| {
            props.get(keys::RELATION).is_some_and(|value| {
                value.values().iter().any(|v| target.matches_str(&v.to_string()))
            })
        })
        .map(|(oid, _)| *oid)
        .collect()
}

/// Every distinct property name, sorted.
pub fn property_keys(rows: &[(Oid, PropertyMap)]) -> Vec<String> {
    let keys: BTreeSet<&String> = rows.iter().flat_map(|(_, props)| props.keys()).collect();
    keys.into_iter().cloned().collect()
}

/// Every distinct value stored under `key`, sorted.
pub fn property_values(rows: &[(Oid, PropertyMap)], key: &str) -> Vec<Scalar> {
    let values: BTreeSet<&Scalar> = rows
        .iter()
        .filter_map(|(_, props)| props.get(key))
        .flat_map(PropertyValue::values)
        .collect();
    values.into_iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn row(pairs: &[(&str, PropertyValue)]) -> (Oid, PropertyMap) {
        (
            Oid::generate(),
            pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        )
    }

    fn oids(rows: &[(Oid, PropertyMap)], idx: &[usize]) -> Vec<Oid> {
        idx.iter().map(|&i| rows[i].0).collect()
    }

    // ---- criteria ----

    #[test]
    fn criteria_are_anded() {
        let rows = vec![
            row(&[("format", "audio/mp3".into()), ("artist", "a".into())]),
            row(&[("format", "audio/mp3".into()), ("artist", "b".into())]),
            row(&[("format", "text/plain".into()), ("artist", "a".into())]),
            row(&[("title", "no format".into())]),
        ];
        let q = SearchQuery::new().criterion("format", "audio/mp3");
        assert_eq!(run(&rows, &q), oids(&rows, &[0, 1]));

        let q = q.criterion("artist", "a");
        assert_eq!(run(&rows, &q), oids(&rows, &[0]));
    }

    #[test]
    fn criteria_are_exact_not_substring() {
        let rows = vec![row(&[("format", "audio/mp3".into())])];
        let q = SearchQuery::new().criterion("format", "audio");
        assert!(run(&rows, &q).is_empty());
    }

    #[test]
    fn unset_property_never_matches() {
        let rows = vec![row(&[("title", "x".into())])];
        let q = SearchQuery::new().criterion("format", "");
        assert!(run(&rows, &q).is_empty());
    }

    #[test]
    fn no_criteria_returns_everything_in_insertion_order() {
        let rows = vec![row(&[]), row(&[]), row(&[])];
        assert_eq!(run(&rows, &SearchQuery::new()), oids(&rows, &[0, 1, 2]));
    }

    #[test]
    fn textual_criterion_matches_integer_property() {
        let rows = vec![row(&[("extent", PropertyValue::integer(1024))])];
        let q = SearchQuery::new().criterion("extent", "1024");
        assert_eq!(run(&rows, &q).len(), 1);
    }

    // ---- ordering and limits ----

    #[test]
    fn order_by_title_then_created() {
        let t = |y| PropertyValue::timestamp(Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap());
        let rows = vec![
            row(&[("title", "beta".into()), ("created", t(2008))]),
            row(&[("title", "alpha".into()), ("created", t(2009))]),
            row(&[("title", "beta".into()), ("created", t(2007))]),
            row(&[("title", "alpha".into()), ("created", t(2006))]),
        ];
        let q = SearchQuery::new().order_by("title").order_by("created");
        assert_eq!(run(&rows, &q), oids(&rows, &[3, 1, 2, 0]));
    }

    #[test]
    fn numeric_properties_sort_numerically() {
        let rows = vec![
            row(&[("extent", PropertyValue::integer(100))]),
            row(&[("extent", PropertyValue::integer(9))]),
            row(&[("extent", PropertyValue::integer(20))]),
        ];
        let q = SearchQuery::new().order_by("extent");
        assert_eq!(run(&rows, &q), oids(&rows, &[1, 2, 0]));
    }

    #[test]
    fn missing_sort_key_sorts_first_and_ties_break_by_oid() {
        let rows = vec![
            row(&[("title", "b".into())]),
            row(&[]),
            row(&[("title", "a".into())]),
            row(&[("title", "a".into())]),
        ];
        let result = run(&rows, &SearchQuery::new().order_by("title"));
        assert_eq!(result[0], rows[1].0);
        let (x, y) = (rows[2].0, rows[3].0);
        assert_eq!(&result[1..3], &[x.min(y), x.max(y)]);
        assert_eq!(result[3], rows[0].0);
    }

    #[test]
    fn limit_truncates_default_order() {
        let rows = vec![row(&[]), row(&[]), row(&[]), row(&[])];
        assert_eq!(run(&rows, &SearchQuery::new().limit(2)), oids(&rows, &[0, 1]));
        assert!(run(&rows, &SearchQuery::new().limit(0)).is_empty());
        assert_eq!(run(&rows, &SearchQuery::new().limit(10)).len(), 4);
    }

    #[test]
    fn limit_applies_after_sort() {
        let rows = vec![
            row(&[("title", "c".into())]),
            row(&[("title", "a".into())]),
            row(&[("title", "b".into())]),
        ];
        let q = SearchQuery::new().order_by("title").limit(2);
        assert_eq!(run(&rows, &q), oids(&rows, &[1, 2]));
    }

    // ---- exact / matching ----

    #[test]
    fn exact_with_empty_criteria_is_empty() {
        let rows = vec![row(&[("a", "1".into())])];
        assert!(exact(&rows, &PropertyMap::new()).is_empty());
    }

    #[test]
    fn exact_intersects_keys() {
        let rows = vec![
            row(&[("a", "1".into()), ("b", "2".into())]),
            row(&[("a", "1".into()), ("b", "3".into())]),
        ];
        let mut criteria = PropertyMap::new();
        criteria.insert("a".into(), "1".into());
        assert_eq!(exact(&rows, &criteria).len(), 2);
        criteria.insert("b".into(), "3".into());
        assert_eq!(exact(&rows, &criteria), oids(&rows, &[1]));
    }

    #[test]
    fn glob_is_case_insensitive_and_anchored() {
        let glob = Glob::new("*.MP3").unwrap();
        assert!(glob.is_match("song.mp3"));
        assert!(glob.is_match(".mp3"));
        assert!(!glob.is_match("song.mp3.bak"));

        let glob = Glob::new("a.c").unwrap();
        assert!(glob.is_match("A.C"));
        assert!(!glob.is_match("abc"));
    }

    #[test]
    fn matching_intersects_patterns() {
        let rows = vec![
            row(&[("title", "Holiday Photo".into()), ("format", "image/jpeg".into())]),
            row(&[("title", "holiday video".into()), ("format", "video/mpeg".into())]),
            row(&[("title", "work".into()), ("format", "image/png".into())]),
        ];
        let mut patterns = BTreeMap::new();
        patterns.insert("title".to_string(), "holiday*".to_string());
        assert_eq!(matching(&rows, &patterns).unwrap(), oids(&rows, &[0, 1]));
        patterns.insert("format".to_string(), "image/*".to_string());
        assert_eq!(matching(&rows, &patterns).unwrap(), oids(&rows, &[0]));
    }

    #[test]
    fn matching_with_empty_patterns_is_empty() {
        let rows = vec![row(&[("a", "1".into())])];
        assert!(matching(&rows, &BTreeMap::new()).unwrap().is_empty());
    }

    #[test]
    fn matching_checks_every_value_of_a_list() {
        let rows = vec![row(&[(
            "tags",
            PropertyValue::Multi(vec!["red".into(), "Blue".into()]),
        )])];
        let mut patterns = BTreeMap::new();
        patterns.insert("tags".to_string(), "bl*".to_string());
        assert_eq!(matching(&rows, &patterns).unwrap().len(), 1);
    }

    // ---- relations and catalogs ----

    #[test]
    fn related_matches_any_case() {
        let target = Oid::generate();
        let rows = vec![
            row(&[("relation", target.to_string().to_uppercase().into())]),
            row(&[("relation", target.to_string().into())]),
            row(&[("relation", Oid::generate().to_string().into())]),
            row(&[("title", "unrelated".into())]),
        ];
        assert_eq!(related(&rows, &target), oids(&rows, &[0, 1]));
    }

    #[test]
    fn catalogs_are_sorted_and_distinct() {
        let rows = vec![
            row(&[("format", "b".into()), ("title", "x".into())]),
            row(&[("format", "a".into())]),
            row(&[("format", PropertyValue::Multi(vec!["a".into(), "c".into()]))]),
        ];
        assert_eq!(property_keys(&rows), vec!["format".to_string(), "title".to_string()]);
        assert_eq!(
            property_values(&rows, "format"),
            vec![Scalar::from("a"), Scalar::from("b"), Scalar::from("c")]
        );
        assert!(property_values(&rows, "missing").is_empty());
    }
}

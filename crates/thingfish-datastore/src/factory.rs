//! Build a datastore backend from a configured name and an options map.

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thingfish_types::Logger;

use crate::error::{DatastoreError, Result};
use crate::file::FileDatastore;
use crate::memory::MemoryDatastore;
use crate::traits::Datastore;

/// Options for the `memory` backend.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryDatastoreOptions {
    /// Maximum total bytes stored; unlimited when absent.
    #[serde(default)]
    pub maxsize: Option<u64>,
}

/// Options for the `filestore` backend.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileDatastoreOptions {
    pub datadir: PathBuf,
    #[serde(default)]
    pub spooldir: Option<PathBuf>,
    #[serde(default)]
    pub maxsize: Option<u64>,
}

/// Instantiate the backend registered under `name`.
///
/// `"datastore"` names the abstract interface itself and is refused with
/// [`DatastoreError::NotImplemented`].
pub fn create(name: &str, options: &serde_json::Value, logger: Logger) -> Result<Box<dyn Datastore>> {
    match name.to_ascii_lowercase().as_str() {
        "datastore" => Err(DatastoreError::NotImplemented(
            "datastore is an abstract interface; configure a concrete backend".into(),
        )),
        "memory" | "memorystore" => {
            let opts: MemoryDatastoreOptions = parse_options(options)?;
            Ok(Box::new(MemoryDatastore::with_options(opts.maxsize, logger)))
        }
        "file" | "filestore" => {
            let opts: FileDatastoreOptions = parse_options(options)?;
            Ok(Box::new(FileDatastore::open(
                opts.datadir,
                opts.spooldir,
                opts.maxsize,
                logger,
            )?))
        }
        other => Err(DatastoreError::UnknownBackend(other.to_string())),
    }
}

fn parse_options<T: DeserializeOwned>(options: &serde_json::Value) -> Result<T> {
    let options = match options {
        serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(options).map_err(|e| DatastoreError::Configuration(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn memory_backend_with_quota() {
        let store = create("memory", &json!({ "maxsize": 16 }), Logger::default()).unwrap();
        assert!(store.save_bytes(&[0u8; 32]).is_err());
        assert!(store.save_bytes(&[0u8; 16]).is_ok());
    }

    #[test]
    fn memory_backend_without_options() {
        let store = create("Memory", &serde_json::Value::Null, Logger::default()).unwrap();
        let oid = store.save_bytes(b"x").unwrap();
        assert!(store.contains(&oid).unwrap());
    }

    #[test]
    fn filestore_backend() {
        let dir = TempDir::new().unwrap();
        let store = create(
            "filestore",
            &json!({ "datadir": dir.path().join("data") }),
            Logger::default(),
        )
        .unwrap();
        let oid = store.save_bytes(b"on disk").unwrap();
        assert_eq!(store.fetch_bytes(&oid).unwrap().unwrap(), b"on disk");
    }

    #[test]
    fn filestore_requires_datadir() {
        let err = create("filestore", &json!({}), Logger::default()).err().unwrap();
        assert!(matches!(err, DatastoreError::Configuration(_)));
    }

    #[test]
    fn unknown_option_is_rejected() {
        let err = create("memory", &json!({ "max_size": 1 }), Logger::default()).err().unwrap();
        assert!(matches!(err, DatastoreError::Configuration(_)));
    }

    #[test]
    fn abstract_interface_cannot_be_built() {
        let err = create("datastore", &json!({}), Logger::default()).err().unwrap();
        assert!(matches!(err, DatastoreError::NotImplemented(_)));
    }

    #[test]
    fn unknown_backend() {
        let err = create("s3", &json!({}), Logger::default()).err().unwrap();
        assert!(matches!(err, DatastoreError::UnknownBackend(name) if name == "s3"));
    }
}

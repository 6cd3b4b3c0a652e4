//! Build a metastore backend from a configured name and an options map.

use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thingfish_types::Logger;

use crate::error::{MetastoreError, Result};
use crate::file::FileMetastore;
use crate::lock::{DEFAULT_MAX_WAIT, DEFAULT_RETRY_INTERVAL};
use crate::memory::MemoryMetastore;
use crate::traits::Metastore;

/// Options for the `file` backend.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileMetastoreOptions {
    pub dir: PathBuf,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_lock_retry_ms")]
    pub lock_retry_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_MAX_WAIT.as_millis() as u64
}

fn default_lock_retry_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL.as_millis() as u64
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoOptions {}

/// Instantiate the backend registered under `name`.
///
/// `"metastore"` names the abstract interface and is refused with
/// [`MetastoreError::NotImplemented`].
pub fn create(name: &str, options: &serde_json::Value, logger: Logger) -> Result<Box<dyn Metastore>> {
    match name.to_ascii_lowercase().as_str() {
        "metastore" => Err(MetastoreError::NotImplemented(
            "metastore is an abstract interface; configure a concrete backend".into(),
        )),
        "memory" => {
            let _: NoOptions = parse_options(options)?;
            Ok(Box::new(MemoryMetastore::with_logger(logger)))
        }
        "file" | "marshalled" => {
            let opts: FileMetastoreOptions = parse_options(options)?;
            Ok(Box::new(FileMetastore::open_with_timing(
                opts.dir,
                Duration::from_millis(opts.lock_timeout_ms),
                Duration::from_millis(opts.lock_retry_ms),
                logger,
            )?))
        }
        other => Err(MetastoreError::UnknownBackend(other.to_string())),
    }
}

fn parse_options<T: DeserializeOwned>(options: &serde_json::Value) -> Result<T> {
    let options = match options {
        serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(options).map_err(|e| MetastoreError::Configuration(e.to_string()))
}

use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3474;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_level: String,
    pub log_json: bool,
    /// Largest accepted request body, in bytes.
    pub max_body_size: usize,
    pub datastore: BackendConfig,
    pub metastore: BackendConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            log_level: "info".into(),
            log_json: false,
            max_body_size: 64 * 1024 * 1024,
            datastore: BackendConfig::memory(),
            metastore: BackendConfig::memory(),
        }
    }
}

impl ServerConfig {
    /// Read a TOML config file.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }
}

/// A storage backend chosen by name, with backend-specific options.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    #[serde(default)]
    pub options: serde_json::Value,
}

impl BackendConfig {
    pub fn memory() -> Self {
        Self {
            name: "memory".into(),
            options: serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:3474".parse::<SocketAddr>().unwrap());
        assert_eq!(c.datastore.name, "memory");
        assert_eq!(c.metastore.name, "memory");
        assert!(!c.log_json);
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let c = ServerConfig::from_toml("").unwrap();
        assert_eq!(c.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(c.log_level, "info");
    }

    #[test]
    fn backends_with_options() {
        let c = ServerConfig::from_toml(
            r#"
            bind_addr = "0.0.0.0:8080"
            log_json = true

            [datastore]
            name = "filestore"
            options = { datadir = "/var/lib/thingfish/data", maxsize = 1048576 }

            [metastore]
            name = "marshalled"

            [metastore.options]
            dir = "/var/lib/thingfish/meta"
            lock_timeout_ms = 2000
            "#,
        )
        .unwrap();
        assert_eq!(c.bind_addr.port(), 8080);
        assert!(c.log_json);
        assert_eq!(c.datastore.name, "filestore");
        assert_eq!(c.datastore.options["maxsize"], 1048576);
        assert_eq!(c.metastore.options["dir"], "/var/lib/thingfish/meta");
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = ServerConfig::from_toml("bind_addr = ").unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }
}

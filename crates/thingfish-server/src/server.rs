use std::net::SocketAddr;
use std::sync::Arc;

use thingfish_handler::Handler;
use thingfish_types::Logger;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;

/// ThingFish HTTP server.
pub struct ThingfishServer {
    config: ServerConfig,
    handler: Handler,
}

impl ThingfishServer {
    /// Build both storage backends named in `config`.
    ///
    /// Backend errors surface here, before anything is bound.
    pub fn new(config: ServerConfig, logger: Logger) -> ServerResult<Self> {
        let datastore = thingfish_datastore::create(
            &config.datastore.name,
            &config.datastore.options,
            logger.clone(),
        )?;
        let metastore = thingfish_metastore::create(
            &config.metastore.name,
            &config.metastore.options,
            logger.clone(),
        )?;
        let handler = Handler::with_logger(Arc::from(datastore), Arc::from(metastore), logger);
        Ok(Self { config, handler })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.handler.clone(), self.config.max_body_size)
    }

    /// Serve until Ctrl-C.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            datastore = %self.config.datastore.name,
            metastore = %self.config.metastore.name,
            "ThingFish server listening"
        );
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use serde_json::json;

    #[test]
    fn server_construction() {
        let server = ThingfishServer::new(ServerConfig::default(), Logger::default()).unwrap();
        assert_eq!(server.config().bind_addr, "127.0.0.1:3474".parse().unwrap());
        let _router = server.router();
    }

    #[test]
    fn file_backends_from_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ServerConfig {
            datastore: BackendConfig {
                name: "filestore".into(),
                options: json!({ "datadir": dir.path().join("data") }),
            },
            metastore: BackendConfig {
                name: "marshalled".into(),
                options: json!({ "dir": dir.path().join("meta") }),
            },
            ..ServerConfig::default()
        };
        ThingfishServer::new(config, Logger::default()).unwrap();
        assert!(dir.path().join("meta").is_dir());
    }

    #[test]
    fn unknown_backend_fails_at_startup() {
        let config = ServerConfig {
            datastore: BackendConfig {
                name: "s3".into(),
                options: serde_json::Value::Null,
            },
            ..ServerConfig::default()
        };
        let err = ThingfishServer::new(config, Logger::default()).err().unwrap();
        assert!(matches!(err, ServerError::Datastore(_)));
    }
}

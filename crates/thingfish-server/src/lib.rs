//! HTTP server for ThingFish.
//!
//! Exposes a [`thingfish_handler::Handler`] over a small REST surface:
//!
//! | route                       | methods                  |
//! |-----------------------------|--------------------------|
//! | `/`                         | `POST` (upload)          |
//! | `/{oid}`                    | `GET`, `PUT`, `DELETE`   |
//! | `/{oid}/metadata`           | `GET`, `PUT`, `POST`, `DELETE` |
//! | `/{oid}/metadata/{key}`     | `DELETE`                 |
//! | `/{oid}/related`            | `GET`                    |
//! | `/search`                   | `GET`                    |
//! | `/v1/health`                | `GET`                    |

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::{BackendConfig, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use server::ThingfishServer;

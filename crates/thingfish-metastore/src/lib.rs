//! Property storage for ThingFish.
//!
//! A metastore keeps a property set (a [`PropertyMap`]) for each [`Oid`]:
//! operational fields such as `format`, `extent`, and `checksum`, plus any
//! metadata the uploader supplied. It answers exact, pattern, and ordered
//! searches over those properties and resolves `relation` links between
//! objects.
//!
//! # Modules
//!
//! - [`error`] -- Error types for metastore operations
//! - [`traits`] -- The [`Metastore`] trait and the [`transaction`] helper
//! - [`table`] -- Insertion-ordered in-memory property table shared by backends
//! - [`search`] -- Criteria matching, glob patterns, ordering, and limits
//! - [`memory`] -- [`MemoryMetastore`], a `RwLock`-guarded table
//! - [`file`] -- [`FileMetastore`], a serialized table guarded by a lock file
//! - [`lock`] -- Cross-process lock file with a bounded wait
//! - [`proxy`] -- [`ResourceProxy`], a per-object view over a metastore
//! - [`factory`] -- Build a backend from a configured name

pub mod error;
pub mod factory;
pub mod file;
pub mod lock;
pub mod memory;
pub mod proxy;
pub mod search;
pub mod table;
pub mod traits;

pub use error::{MetastoreError, Result};
pub use factory::{create, FileMetastoreOptions};
pub use file::FileMetastore;
pub use lock::{LockFile, LockGuard};
pub use memory::MemoryMetastore;
pub use proxy::{RequestContext, ResourceProxy};
pub use search::SearchQuery;
pub use table::Table;
pub use traits::{transaction, Metastore};

pub use thingfish_types::{Oid, PropertyMap, PropertyValue, Scalar};

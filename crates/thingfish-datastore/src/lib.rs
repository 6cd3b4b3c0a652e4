//! Blob storage for ThingFish.
//!
//! A datastore holds the raw bytes of each object, keyed by its [`Oid`].
//! It knows nothing about properties; pairing a blob with its metadata is
//! the request handler's job.
//!
//! # Storage Backends
//!
//! All backends implement the [`Datastore`] trait:
//!
//! - [`MemoryDatastore`] -- `HashMap`-based store with an optional byte quota
//! - [`FileDatastore`] -- one file per object under a fan-out directory,
//!   staged through a spool directory
//!
//! Backends are usually built by name through [`create`].
//!
//! # Design Rules
//!
//! 1. A write is all-or-nothing: a failed or rejected write leaves nothing
//!    readable behind.
//! 2. `save` and `replace` hand the input stream back at the position it
//!    was given in.
//! 3. Readers returned by `fetch` are independent of each other.
//! 4. Removing an absent object is a no-op.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod checksum;
pub mod error;
pub mod factory;
pub mod file;
pub mod memory;
pub mod traits;

pub use checksum::{digest, digest_source, Digest};
pub use error::{DatastoreError, Result};
pub use factory::{create, FileDatastoreOptions, MemoryDatastoreOptions};
pub use file::FileDatastore;
pub use memory::MemoryDatastore;
pub use traits::{transaction, BlobReader, BlobSource, Datastore, OidIter};

pub use thingfish_types::Oid;

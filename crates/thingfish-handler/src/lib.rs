//! Request coordination for ThingFish.
//!
//! A [`Handler`] owns one datastore and one metastore and keeps them in
//! step: storing an object writes its blob, then its checksum, request
//! defaults, and caller metadata; deleting removes it from both. Transport
//! layers call the handler with already-decoded values and map
//! [`HandlerError::kind`] onto their own status codes.
//!
//! # Store sequence
//!
//! 1. Checksum the inbound stream and rewind it.
//! 2. Write the blob. A quota rejection stops here with no metadata written.
//! 3. Merge caller metadata, request defaults, and the checksum inside one
//!    metastore transaction.
//! 4. If step 3 fails for a new object, remove its blob again.

pub mod coordinator;
pub mod error;

pub use coordinator::{FetchOutcome, Handler, Resource, StoreStage};
pub use error::{ErrorKind, HandlerError, HandlerResult};

pub use thingfish_metastore::{RequestContext, SearchQuery};
pub use thingfish_types::{Oid, PropertyMap, PropertyValue};

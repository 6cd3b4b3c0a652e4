//! Foundation types for ThingFish.
//!
//! Every other ThingFish crate depends on `thingfish-types`. It carries the
//! identifiers and property representation shared by the blob store
//! (datastore) and the property store (metastore), which otherwise know
//! nothing about each other.
//!
//! # Key Types
//!
//! - [`Oid`] -- Object identifier (UUID, case-normalized)
//! - [`Scalar`] -- A single typed property value (text, integer, timestamp)
//! - [`PropertyValue`] -- One value or an ordered list of values
//! - [`PropertyMap`] -- The property set of one object
//! - [`Logger`] -- Injected `tracing` dispatch handle for store backends
//! - [`keys`] -- Operational (reserved) property names

pub mod error;
pub mod keys;
pub mod logger;
pub mod oid;
pub mod value;

pub use error::TypeError;
pub use logger::Logger;
pub use oid::Oid;
pub use value::{PropertyMap, PropertyValue, Scalar};

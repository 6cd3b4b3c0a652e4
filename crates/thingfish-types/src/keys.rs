//! Well-known property names.
//!
//! The operational keys are written by the storage layer from request
//! context and the stored content itself. Caller-supplied metadata never
//! sets them directly.

pub const FORMAT: &str = "format";
pub const EXTENT: &str = "extent";
pub const CHECKSUM: &str = "checksum";
pub const CREATED: &str = "created";
pub const MODIFIED: &str = "modified";
pub const USERAGENT: &str = "useragent";
pub const UPLOADADDRESS: &str = "uploadaddress";

/// Property holding the OID of a related object.
pub const RELATION: &str = "relation";
pub const TITLE: &str = "title";

/// Every reserved operational key.
pub const OPERATIONAL: &[&str] = &[FORMAT, EXTENT, CHECKSUM, CREATED, MODIFIED, USERAGENT, UPLOADADDRESS];

/// Returns `true` for reserved operational keys, ignoring ASCII case.
pub fn is_operational(key: &str) -> bool {
    OPERATIONAL.iter().any(|k| k.eq_ignore_ascii_case(key))
}

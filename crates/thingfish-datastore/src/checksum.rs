//! Content checksums.
//!
//! The checksum of a blob is its BLAKE3 digest, hex-encoded. It is stored
//! with the object's properties and doubles as the entity tag for
//! conditional fetches.

use std::io::{self, SeekFrom};

use crate::traits::BlobSource;

/// Digest and length of a piece of content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Digest {
    pub checksum: String,
    pub extent: u64,
}

/// Checksum of an in-memory byte slice.
pub fn digest(data: &[u8]) -> Digest {
    Digest {
        checksum: blake3::hash(data).to_hex().to_string(),
        extent: data.len() as u64,
    }
}

/// Checksum a stream from its current position to the end, then seek back
/// so the same stream can be handed to a datastore.
pub fn digest_source(content: &mut dyn BlobSource) -> io::Result<Digest> {
    let start = content.stream_position()?;
    let mut hasher = blake3::Hasher::new();
    let copied = io::copy(&mut *content, &mut hasher);
    content.seek(SeekFrom::Start(start))?;
    Ok(Digest {
        checksum: hasher.finalize().to_hex().to_string(),
        extent: copied?,
    })
}

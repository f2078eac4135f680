//! Storage Layer - best-effort disk cache under the working directory
//!
//! On-disk state is advisory, never a source of truth; the page store plus
//! the link extractor can always rebuild it. Layout:
//! - `linkgraph.snap`: whole-file graph snapshot
//! - `<blake3-hex-of-page-name>.attr`: one attribute cache file per page
//!
//! Every file starts with an 8-byte little-endian version tag and an
//! 8-byte little-endian unix-millis timestamp. Unknown versions are
//! treated as "file absent".

pub mod attributes;
pub mod snapshot;

pub use attributes::AttributeStore;
pub use snapshot::SnapshotStore;

use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub(crate) fn encode_header(version: u64, timestamp: u64, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + payload.len());
    buf.extend_from_slice(&version.to_le_bytes());
    buf.extend_from_slice(&timestamp.to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Split a stored file into (version, timestamp, payload). A file too
/// short to carry the header reports version 0, which never matches.
pub(crate) fn decode_header(bytes: &[u8]) -> (u64, u64, &[u8]) {
    if bytes.len() < 16 {
        return (0, 0, &[]);
    }
    let version = u64::from_le_bytes(bytes[0..8].try_into().expect("8 bytes"));
    let timestamp = u64::from_le_bytes(bytes[8..16].try_into().expect("8 bytes"));
    (version, timestamp, &bytes[16..])
}

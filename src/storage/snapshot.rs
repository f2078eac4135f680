//! Graph snapshot - whole-file serialization of both indexes
//!
//! Writes are full rewrites; there is no append log and no partial update.
//! A snapshot that fails to load for any reason costs nothing but a full
//! rebuild from the page store.

use crate::graph::ReferenceGraph;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Bump when the payload layout changes; old files are then rebuilt away.
const SNAPSHOT_VERSION: u64 = 1;

const SNAPSHOT_FILE: &str = "linkgraph.snap";

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotPayload {
    refers_to: BTreeMap<String, BTreeSet<String>>,
    referred_by: BTreeMap<String, BTreeSet<String>>,
}

/// Reads and writes the graph snapshot under a working directory.
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    /// Serialize the whole graph. Returns the embedded write timestamp.
    pub fn save(&self, graph: &ReferenceGraph) -> Result<u64> {
        std::fs::create_dir_all(&self.dir)?;
        let (refers_to, referred_by) = graph.parts();
        let payload = serde_json::to_vec(&SnapshotPayload {
            refers_to: refers_to.clone(),
            referred_by: referred_by.clone(),
        })?;
        let timestamp = super::now_millis();
        let bytes = super::encode_header(SNAPSHOT_VERSION, timestamp, &payload);
        std::fs::write(self.path(), bytes)?;
        Ok(timestamp)
    }

    /// Deserialize a prior snapshot, returning the graph and its write
    /// timestamp. Any failure here is recoverable by rebuilding:
    /// missing file or read error ⇒ [`Error::Io`], unknown or truncated
    /// header ⇒ [`Error::SnapshotFormat`], bad payload ⇒ [`Error::Serde`].
    pub fn load(&self) -> Result<(ReferenceGraph, u64)> {
        let bytes = std::fs::read(self.path())?;
        let (version, timestamp, payload) = super::decode_header(&bytes);
        if version != SNAPSHOT_VERSION {
            return Err(Error::SnapshotFormat {
                expected: SNAPSHOT_VERSION,
                found: version,
            });
        }
        let payload: SnapshotPayload = serde_json::from_slice(payload)?;
        let graph = ReferenceGraph::from_parts(payload.refers_to, payload.referred_by);
        Ok((graph, timestamp))
    }

    /// Remove the snapshot file if present.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a snapshot file is currently on disk.
    pub fn exists(&self) -> bool {
        self.path().is_file()
    }
}

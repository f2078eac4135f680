//! Per-page attribute cache - small externally-set key/value pairs
//!
//! Independent of the graph snapshot and piggybacked on the same working
//! directory. One file per page, named by the blake3 hex digest of the
//! page name so arbitrary names stay filesystem-safe. The payload embeds
//! the page name; a digest collision or stale file is detected on load
//! and silently discarded.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const ATTR_VERSION: u64 = 1;

const ATTR_EXT: &str = "attr";

#[derive(Debug, Serialize, Deserialize)]
struct AttributePayload {
    page: String,
    attributes: BTreeMap<String, String>,
}

/// Reads and writes per-page attribute cache files.
pub struct AttributeStore {
    dir: PathBuf,
}

impl AttributeStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_for(&self, page: &str) -> PathBuf {
        let digest = blake3::hash(page.as_bytes()).to_hex();
        self.dir.join(format!("{}.{}", digest, ATTR_EXT))
    }

    /// Persist a page's attribute map, replacing the prior file.
    pub fn save(&self, page: &str, attributes: &BTreeMap<String, String>) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let payload = serde_json::to_vec(&AttributePayload {
            page: page.to_string(),
            attributes: attributes.clone(),
        })?;
        let bytes = super::encode_header(ATTR_VERSION, super::now_millis(), &payload);
        std::fs::write(self.file_for(page), bytes)?;
        Ok(())
    }

    /// Load a page's attributes. Returns `None` (and removes the stale
    /// file) when the version tag or the embedded page name does not
    /// match; a cache miss is never an error.
    pub fn load(&self, page: &str) -> Option<BTreeMap<String, String>> {
        let path = self.file_for(page);
        let bytes = std::fs::read(&path).ok()?;
        let (version, _, payload) = super::decode_header(&bytes);
        if version != ATTR_VERSION {
            tracing::debug!("discarding attribute cache with version {}", version);
            discard(&path);
            return None;
        }
        match serde_json::from_slice::<AttributePayload>(payload) {
            Ok(parsed) if parsed.page == page => Some(parsed.attributes),
            Ok(parsed) => {
                tracing::debug!(
                    "attribute cache for {:?} names {:?}, discarding",
                    page,
                    parsed.page
                );
                discard(&path);
                None
            }
            Err(e) => {
                tracing::debug!("unreadable attribute cache for {:?}: {}", page, e);
                discard(&path);
                None
            }
        }
    }

    /// Delete a page's attribute cache file, if any.
    pub fn delete(&self, page: &str) -> Result<()> {
        match std::fs::remove_file(self.file_for(page)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn discard(path: &Path) {
    std::fs::remove_file(path).ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_round_trip() {
        let dir = tempdir().unwrap();
        let store = AttributeStore::new(dir.path());

        let saved = attrs(&[("author", "alice"), ("lock", "1")]);
        store.save("Main page", &saved).unwrap();

        assert_eq!(store.load("Main page"), Some(saved));
        assert_eq!(store.load("Other"), None);
    }

    #[test]
    fn test_version_mismatch_discarded() {
        let dir = tempdir().unwrap();
        let store = AttributeStore::new(dir.path());
        store.save("Main", &attrs(&[("k", "v")])).unwrap();

        let path = store.file_for("Main");
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0..8].copy_from_slice(&7u64.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        assert_eq!(store.load("Main"), None);
        // the stale file is gone
        assert!(!path.exists());
    }

    #[test]
    fn test_wrong_page_name_discarded() {
        let dir = tempdir().unwrap();
        let store = AttributeStore::new(dir.path());
        store.save("Main", &attrs(&[("k", "v")])).unwrap();

        // copy Main's file onto Other's digest, simulating a collision
        let main = store.file_for("Main");
        let other = store.file_for("Other");
        std::fs::copy(&main, &other).unwrap();

        assert_eq!(store.load("Other"), None);
        assert!(!other.exists());
        // Main itself is untouched
        assert!(store.load("Main").is_some());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = AttributeStore::new(dir.path());
        store.save("Main", &attrs(&[("k", "v")])).unwrap();

        store.delete("Main").unwrap();
        store.delete("Main").unwrap();
        assert_eq!(store.load("Main"), None);
    }
}

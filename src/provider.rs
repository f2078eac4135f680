//! Page providers - the page store seam
//!
//! The reference engine never owns page content. It reads everything it
//! needs (page list, raw text, existence, modification times) through the
//! [`PageProvider`] trait so any page store can sit behind it.
//!
//! Two implementations ship with the crate:
//! - [`FilePageProvider`]: one `<Name>.txt` file per page in a flat
//!   directory, attachments under `<Name>-att/`
//! - [`MemoryPageProvider`]: in-memory store for tests and embedding

use crate::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::UNIX_EPOCH;

/// A known page and when it last changed (unix millis).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub name: String,
    pub last_modified: u64,
}

/// Read-only view of a page store.
pub trait PageProvider: Send + Sync {
    /// Every page the store currently holds.
    fn all_pages(&self) -> Result<Vec<PageInfo>>;

    /// The raw text of a page. Fails with [`Error::Provider`] when the
    /// content cannot be read.
    fn page_text(&self, name: &str) -> Result<String>;

    /// Existence predicate for pages and attachments.
    fn page_exists(&self, name: &str) -> bool;

    /// Unix-millis modification time, or `None` for unknown pages.
    fn last_modified(&self, name: &str) -> Option<u64>;
}

const PAGE_EXT: &str = "txt";

/// File-backed page store: `<Name>.txt` per page, `<Name>-att/<file>` per
/// attachment.
pub struct FilePageProvider {
    root: PathBuf,
}

impl FilePageProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn page_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, PAGE_EXT))
    }

    fn attachment_path(&self, page: &str, file: &str) -> PathBuf {
        self.root.join(format!("{}-att", page)).join(file)
    }
}

impl PageProvider for FilePageProvider {
    fn all_pages(&self) -> Result<Vec<PageInfo>> {
        let entries = std::fs::read_dir(&self.root)
            .map_err(|e| Error::Provider(format!("cannot list {}: {}", self.root.display(), e)))?;

        let mut pages = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::Provider(e.to_string()))?;
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(PAGE_EXT) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            pages.push(PageInfo {
                name: name.to_string(),
                last_modified: mtime_millis(&path).unwrap_or(0),
            });
        }
        pages.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(pages)
    }

    fn page_text(&self, name: &str) -> Result<String> {
        std::fs::read_to_string(self.page_path(name))
            .map_err(|e| Error::Provider(format!("cannot read page {}: {}", name, e)))
    }

    fn page_exists(&self, name: &str) -> bool {
        match name.split_once('/') {
            Some((page, file)) => self.attachment_path(page, file).is_file(),
            None => self.page_path(name).is_file(),
        }
    }

    fn last_modified(&self, name: &str) -> Option<u64> {
        mtime_millis(&self.page_path(name))
    }
}

fn mtime_millis(path: &Path) -> Option<u64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let since = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(since.as_millis() as u64)
}

#[derive(Debug, Clone)]
struct MemoryPage {
    text: String,
    last_modified: u64,
}

/// In-memory page store. Shared freely (interior mutability) so tests can
/// save and delete pages while an engine holds the provider.
#[derive(Debug, Default)]
pub struct MemoryPageProvider {
    pages: RwLock<BTreeMap<String, MemoryPage>>,
}

impl MemoryPageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save page text with an explicit modification time.
    pub fn put_page_at(&self, name: &str, text: &str, last_modified: u64) {
        let mut pages = self.pages.write().unwrap_or_else(|e| e.into_inner());
        pages.insert(
            name.to_string(),
            MemoryPage {
                text: text.to_string(),
                last_modified,
            },
        );
    }

    /// Save page text, bumping the modification time past the previous one.
    pub fn put_page(&self, name: &str, text: &str) {
        let next = {
            let pages = self.pages.read().unwrap_or_else(|e| e.into_inner());
            pages.values().map(|p| p.last_modified).max().unwrap_or(0) + 1
        };
        self.put_page_at(name, text, next);
    }

    pub fn remove_page(&self, name: &str) {
        let mut pages = self.pages.write().unwrap_or_else(|e| e.into_inner());
        pages.remove(name);
    }
}

impl PageProvider for MemoryPageProvider {
    fn all_pages(&self) -> Result<Vec<PageInfo>> {
        let pages = self.pages.read().unwrap_or_else(|e| e.into_inner());
        Ok(pages
            .iter()
            .map(|(name, page)| PageInfo {
                name: name.clone(),
                last_modified: page.last_modified,
            })
            .collect())
    }

    fn page_text(&self, name: &str) -> Result<String> {
        let pages = self.pages.read().unwrap_or_else(|e| e.into_inner());
        pages
            .get(name)
            .map(|p| p.text.clone())
            .ok_or_else(|| Error::Provider(format!("no such page: {}", name)))
    }

    fn page_exists(&self, name: &str) -> bool {
        let pages = self.pages.read().unwrap_or_else(|e| e.into_inner());
        pages.contains_key(name)
    }

    fn last_modified(&self, name: &str) -> Option<u64> {
        let pages = self.pages.read().unwrap_or_else(|e| e.into_inner());
        pages.get(name).map(|p| p.last_modified)
    }
}

//! Reference graph - the dual index at the heart of the engine
//!
//! Two mutually-derived maps, kept in lockstep on every mutation:
//! - `refers_to`: page -> the targets its current content links to
//! - `referred_by`: target -> the pages currently linking to it
//!
//! Both maps live behind this one type; nothing outside can touch them
//! except through mutations that preserve the invariants:
//! - `q in refers_to[p]` iff `p in referred_by[q]`, after every mutation
//! - a `referred_by` entry is dropped only when it is empty AND its key
//!   is not a real page
//! - the key set of `refers_to` is exactly the set of known pages
//! - plural matching never reaches this type; it is read-time only

use crate::{Error, Result};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

/// The page reference graph.
///
/// Deterministic by construction: BTree collections give ordered sets and
/// a stable structural hash. Targets of outgoing edges need not exist as
/// real pages (dangling references).
#[derive(Debug)]
pub struct ReferenceGraph {
    /// page -> complete outgoing target set, replaced wholesale on update
    refers_to: BTreeMap<String, BTreeSet<String>>,

    /// target -> pages linking to it; may be empty, may outlive the target
    referred_by: BTreeMap<String, BTreeSet<String>>,

    /// Structural hash over both maps, refreshed on every mutation.
    /// Changes iff observable graph content changes.
    hash: u64,
}

impl Default for ReferenceGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceGraph {
    /// Creates a new empty graph.
    pub fn new() -> Self {
        let mut graph = Self {
            refers_to: BTreeMap::new(),
            referred_by: BTreeMap::new(),
            hash: 0,
        };
        graph.rehash();
        graph
    }

    /// Rebuilds a graph from deserialized snapshot maps.
    pub(crate) fn from_parts(
        refers_to: BTreeMap<String, BTreeSet<String>>,
        referred_by: BTreeMap<String, BTreeSet<String>>,
    ) -> Self {
        let mut graph = Self {
            refers_to,
            referred_by,
            hash: 0,
        };
        graph.rehash();
        graph
    }

    /// The raw maps, for snapshot serialization only.
    pub(crate) fn parts(&self) -> (&BTreeMap<String, BTreeSet<String>>, &BTreeMap<String, BTreeSet<String>>) {
        (&self.refers_to, &self.referred_by)
    }

    /// Ensure pages are keys of both maps (empty sets), without touching
    /// existing entries. Used when seeding a rebuild.
    pub fn seed_all<I, S>(&mut self, pages: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for page in pages {
            let page = page.into();
            self.refers_to.entry(page.clone()).or_default();
            self.referred_by.entry(page).or_default();
        }
        self.rehash();
    }

    /// Replace `page`'s outgoing edges wholesale and mirror the diff into
    /// the inverse index.
    ///
    /// `targets` is deduplicated into an ordered set. `is_page` is the
    /// external existence predicate consulted before an emptied inverse
    /// entry is garbage-collected.
    pub fn set_links<I, F>(&mut self, page: &str, targets: I, is_page: F) -> Result<()>
    where
        I: IntoIterator<Item = String>,
        F: Fn(&str) -> bool,
    {
        let new: BTreeSet<String> = targets.into_iter().collect();
        let old = self
            .refers_to
            .insert(page.to_string(), new.clone())
            .unwrap_or_default();

        // Having outgoing edges implies the page exists
        self.referred_by.entry(page.to_string()).or_default();

        for removed in old.difference(&new) {
            self.unlink(page, removed, &is_page)?;
        }
        for target in &new {
            self.referred_by
                .entry(target.clone())
                .or_default()
                .insert(page.to_string());
        }

        self.rehash();
        Ok(())
    }

    /// Remove a deleted page from both indexes.
    ///
    /// Incoming links to the deleted page survive as a (possibly dangling)
    /// `referred_by` entry so they stay visible as broken links; the entry
    /// is dropped only if nobody links here anymore.
    pub fn remove_page<F>(&mut self, page: &str, is_page: F) -> Result<()>
    where
        F: Fn(&str) -> bool,
    {
        let old = self.refers_to.remove(page).unwrap_or_default();
        for target in &old {
            self.unlink(page, target, &is_page)?;
        }

        if self
            .referred_by
            .get(page)
            .is_some_and(|referrers| referrers.is_empty())
        {
            self.referred_by.remove(page);
        }

        self.rehash();
        Ok(())
    }

    /// Administrative removal of a page from both indexes, without the
    /// usual garbage-collection rule: emptied inverse entries are left in
    /// place.
    pub fn clear_entries(&mut self, page: &str) {
        if let Some(old) = self.refers_to.remove(page) {
            for target in &old {
                if let Some(referrers) = self.referred_by.get_mut(target) {
                    referrers.remove(page);
                }
            }
        }
        self.referred_by.remove(page);
        self.rehash();
    }

    // Drop `page` from `target`'s inverse entry, collecting the entry if
    // it empties and its key is not a real page. A missing entry means
    // the indexes already disagreed.
    fn unlink<F>(&mut self, page: &str, target: &str, is_page: &F) -> Result<()>
    where
        F: Fn(&str) -> bool,
    {
        let Some(referrers) = self.referred_by.get_mut(target) else {
            return Err(Error::InternalInconsistency(format!(
                "outgoing edge {} -> {} has no incoming entry",
                page, target
            )));
        };
        referrers.remove(page);
        if referrers.is_empty() && !is_page(target) {
            self.referred_by.remove(target);
        }
        Ok(())
    }

    /// Pages linking to `name`, if the inverse index has an entry for it.
    pub fn referred_by(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.referred_by.get(name)
    }

    /// Current outgoing targets of `name`, if it is a known page.
    pub fn refers_to(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.refers_to.get(name)
    }

    /// Whether `name` is a known page (a key of the outgoing index).
    pub fn contains_page(&self, name: &str) -> bool {
        self.refers_to.contains_key(name)
    }

    /// Targets nothing links to anymore: inverse-index keys with empty sets.
    pub fn unreferenced(&self) -> Vec<String> {
        self.referred_by
            .iter()
            .filter(|(_, referrers)| referrers.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Every distinct link target that is not a real page.
    pub fn uncreated<F>(&self, is_page: F) -> Vec<String>
    where
        F: Fn(&str) -> bool,
    {
        let distinct: BTreeSet<&String> = self.refers_to.values().flatten().collect();
        distinct
            .into_iter()
            .filter(|target| !is_page(target))
            .cloned()
            .collect()
    }

    /// Snapshot copy of the known-page set.
    pub fn created(&self) -> BTreeSet<String> {
        self.refers_to.keys().cloned().collect()
    }

    /// The structural hash maintained across mutations. Two graphs with
    /// equal observable content report the same hash.
    pub fn deep_hash(&self) -> u64 {
        self.hash
    }

    /// Returns the number of known pages.
    pub fn page_count(&self) -> usize {
        self.refers_to.len()
    }

    /// Returns the number of outgoing edges.
    pub fn link_count(&self) -> usize {
        self.refers_to.values().map(|targets| targets.len()).sum()
    }

    /// Verify that the two indexes agree in both directions. Mutations
    /// uphold this internally; the check exists for tests and
    /// post-restore sanity.
    pub fn check_consistency(&self) -> Result<()> {
        for (page, targets) in &self.refers_to {
            for target in targets {
                let ok = self
                    .referred_by
                    .get(target)
                    .is_some_and(|referrers| referrers.contains(page));
                if !ok {
                    return Err(Error::InternalInconsistency(format!(
                        "{} -> {} missing from incoming index",
                        page, target
                    )));
                }
            }
        }
        for (target, referrers) in &self.referred_by {
            for referrer in referrers {
                let ok = self
                    .refers_to
                    .get(referrer)
                    .is_some_and(|targets| targets.contains(target));
                if !ok {
                    return Err(Error::InternalInconsistency(format!(
                        "{} <- {} missing from outgoing index",
                        target, referrer
                    )));
                }
            }
        }
        Ok(())
    }

    fn rehash(&mut self) {
        let mut hasher = DefaultHasher::new();
        self.refers_to.hash(&mut hasher);
        self.referred_by.hash(&mut hasher);
        self.hash = hasher.finish();
    }

    /// Returns graph statistics.
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            pages: self.page_count(),
            links: self.link_count(),
            targets: self.referred_by.len(),
        }
    }
}

/// Statistics about a reference graph
#[derive(Debug, Clone)]
pub struct GraphStats {
    pub pages: usize,
    pub links: usize,
    pub targets: usize,
}

impl std::fmt::Display for GraphStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Reference Graph Statistics:")?;
        writeln!(f, "  Pages: {}", self.pages)?;
        writeln!(f, "  Links: {}", self.links)?;
        writeln!(f, "  Link targets: {}", self.targets)
    }
}

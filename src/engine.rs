//! Reference engine - owns the graph, the lock, and the lifecycle
//!
//! One explicitly constructed engine per running wiki (no global lookup):
//! collaborators receive a handle at startup. The engine wires together a
//! [`PageProvider`], a [`LinkExtractor`] and a [`NameResolver`], guards the
//! [`ReferenceGraph`] with a single reader/writer lock, and keeps the disk
//! snapshot in step with every mutation.
//!
//! Lifecycle notifications (page saved / page deleted) reach the engine
//! through [`crate::watcher::EventBridge`].

use crate::extract::LinkExtractor;
use crate::graph::{GraphStats, ReferenceGraph};
use crate::name::{self, NameResolver};
use crate::plural;
use crate::provider::PageProvider;
use crate::storage::{AttributeStore, SnapshotStore};
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Engine settings, usually taken from `wikigraph.toml`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding the snapshot and attribute cache files.
    pub work_dir: PathBuf,
    /// Treat "Cats" and "Cat" as the same lookup key at read time.
    pub match_english_plurals: bool,
}

/// The wiki reference-graph engine.
///
/// All mutating operations serialize on one exclusive lock per instance;
/// the snapshot write happens inside that lock, so a page save's latency
/// includes it. Reads run concurrently and return point-in-time copies.
pub struct ReferenceEngine {
    graph: RwLock<ReferenceGraph>,
    snapshots: SnapshotStore,
    attributes: AttributeStore,
    provider: Arc<dyn PageProvider>,
    extractor: Arc<dyn LinkExtractor>,
    resolver: Arc<dyn NameResolver>,
    match_plurals: bool,
}

impl ReferenceEngine {
    pub fn new(
        provider: Arc<dyn PageProvider>,
        extractor: Arc<dyn LinkExtractor>,
        resolver: Arc<dyn NameResolver>,
        config: EngineConfig,
    ) -> Self {
        Self {
            graph: RwLock::new(ReferenceGraph::new()),
            snapshots: SnapshotStore::new(&config.work_dir),
            attributes: AttributeStore::new(&config.work_dir),
            provider,
            extractor,
            resolver,
            match_plurals: config.match_english_plurals,
        }
    }

    /// Bring the graph up: restore the snapshot if possible, rebuild from
    /// the page store otherwise, and finish with a fresh snapshot write.
    ///
    /// Every snapshot problem self-heals here at O(all pages) cost. A page
    /// whose content cannot be read during a forced rebuild fails the call
    /// with [`Error::Provider`].
    pub fn initialize(&self) -> Result<()> {
        if let Err(e) = self.try_restore() {
            tracing::info!("snapshot unusable ({}), rebuilding reference graph", e);
            self.rebuild_all()?;
        }
        let graph = self.read_graph()?;
        self.persist(&graph);
        tracing::info!(
            "reference graph ready: {} pages, {} links",
            graph.page_count(),
            graph.link_count()
        );
        Ok(())
    }

    /// Force a full rebuild from the page store, then snapshot it.
    pub fn rebuild(&self) -> Result<()> {
        self.rebuild_all()?;
        let graph = self.read_graph()?;
        self.persist(&graph);
        Ok(())
    }

    // Restore the snapshot and reconcile it against the current page list:
    // pages touched after the snapshot was written (or unknown to it) are
    // re-extracted, pages deleted while the engine was down are dropped.
    fn try_restore(&self) -> Result<()> {
        let (restored, timestamp) = self.snapshots.load()?;
        restored.check_consistency()?;
        let pages = self.provider.all_pages()?;

        let known = restored.created();
        {
            let mut graph = self.write_graph()?;
            *graph = restored;
        }

        let mut current = BTreeSet::new();
        for info in &pages {
            let page = self.resolver.resolve(&info.name);
            if name::is_attachment(&page) {
                continue;
            }
            let changed = info.last_modified > timestamp || !known.contains(&page);
            current.insert(page.clone());
            if changed {
                tracing::debug!("re-extracting {} (changed since snapshot)", page);
                self.refresh_page(&page)?;
            }
        }
        for stale in known.difference(&current) {
            tracing::debug!("dropping {} (deleted while engine was down)", stale);
            let mut graph = self.write_graph()?;
            graph.remove_page(stale, |n| self.provider.page_exists(n))?;
        }
        Ok(())
    }

    fn rebuild_all(&self) -> Result<()> {
        let pages = self.provider.all_pages()?;
        tracing::info!("rebuilding reference graph from {} pages", pages.len());

        let mut rebuilt = ReferenceGraph::new();
        let names: Vec<String> = pages
            .iter()
            .map(|info| self.resolver.resolve(&info.name))
            .collect();
        rebuilt.seed_all(names.iter().cloned());

        for page in &names {
            if name::is_attachment(page) {
                continue;
            }
            let text = self.provider.page_text(page)?;
            let targets = self.canonical_targets(self.extractor.extract(page, &text));
            rebuilt.set_links(page, targets, |n| self.provider.page_exists(n))?;
        }

        let mut graph = self.write_graph()?;
        *graph = rebuilt;
        Ok(())
    }

    // Re-extract one page from provider content, without persisting.
    fn refresh_page(&self, page: &str) -> Result<()> {
        let text = self.provider.page_text(page)?;
        let targets = self.canonical_targets(self.extractor.extract(page, &text));
        let mut graph = self.write_graph()?;
        graph.set_links(page, targets, |n| self.provider.page_exists(n))
    }

    /// A page was saved with the given content: extract its links and
    /// replace its outgoing edge set.
    pub fn page_saved(&self, page: &str, text: &str) -> Result<()> {
        let page = self.resolver.resolve(page);
        let targets = self.extractor.extract(&page, text);
        self.apply_update(&page, targets)
    }

    /// Replace a page's outgoing references with an explicit target list.
    pub fn update_references(&self, page: &str, targets: &[String]) -> Result<()> {
        let page = self.resolver.resolve(page);
        self.apply_update(&page, targets.to_vec())
    }

    /// Convenience: re-read a page from the provider and update it.
    pub fn update_page(&self, page: &str) -> Result<()> {
        let page = self.resolver.resolve(page);
        let text = self.provider.page_text(&page)?;
        let targets = self.extractor.extract(&page, &text);
        self.apply_update(&page, targets)
    }

    fn apply_update(&self, page: &str, raw_targets: Vec<String>) -> Result<()> {
        let targets = self.canonical_targets(raw_targets);
        let mut graph = self.write_graph()?;
        graph.set_links(page, targets, |n| self.provider.page_exists(n))?;
        self.persist(&graph);
        Ok(())
    }

    /// A page was deleted: drop it from both indexes (incoming links to it
    /// stay visible as broken links), snapshot, and discard its attribute
    /// cache file.
    pub fn page_removed(&self, page: &str) -> Result<()> {
        let page = self.resolver.resolve(page);
        {
            let mut graph = self.write_graph()?;
            graph.remove_page(&page, |n| self.provider.page_exists(n))?;
            self.persist(&graph);
        }
        if let Err(e) = self.attributes.delete(&page) {
            tracing::warn!("failed to delete attribute cache for {}: {}", page, e);
        }
        Ok(())
    }

    /// Administrative removal from both indexes, skipping the usual
    /// garbage-collection rule. Does not persist.
    pub fn clear_page_entries(&self, page: &str) -> Result<()> {
        let page = self.resolver.resolve(page);
        let mut graph = self.write_graph()?;
        graph.clear_entries(&page);
        Ok(())
    }

    /// Pages linking to `name`, with the singular/plural variant unioned
    /// in when plural matching is on.
    ///
    /// `None` means "no referrers" - whether the page was never indexed or
    /// is indexed with zero referrers. Every read method follows this rule.
    pub fn find_referrers(&self, name: &str) -> Result<Option<BTreeSet<String>>> {
        let page = self.resolver.resolve(name);
        let graph = self.read_graph()?;
        let mut referrers: BTreeSet<String> =
            graph.referred_by(&page).cloned().unwrap_or_default();
        if self.match_plurals {
            if let Some(variant) = plural::plural_variant(&page) {
                if let Some(more) = graph.referred_by(&variant) {
                    referrers.extend(more.iter().cloned());
                }
            }
        }
        Ok(nonempty(referrers))
    }

    /// Pages linking to `name`, exact key only (no plural matching).
    /// `None` for absent or empty, like every read method.
    pub fn find_referred_by(&self, name: &str) -> Result<Option<BTreeSet<String>>> {
        let page = self.resolver.resolve(name);
        let graph = self.read_graph()?;
        Ok(nonempty(
            graph.referred_by(&page).cloned().unwrap_or_default(),
        ))
    }

    /// Current outgoing targets of `name`. `None` for unknown pages and
    /// for pages with no outgoing links.
    pub fn find_refers_to(&self, name: &str) -> Result<Option<BTreeSet<String>>> {
        let page = self.resolver.resolve(name);
        let graph = self.read_graph()?;
        Ok(nonempty(graph.refers_to(&page).cloned().unwrap_or_default()))
    }

    /// Orphan report: targets nothing currently links to.
    pub fn find_unreferenced(&self) -> Result<Vec<String>> {
        Ok(self.read_graph()?.unreferenced())
    }

    /// Broken-link report: every distinct target that is not a real page.
    pub fn find_uncreated(&self) -> Result<Vec<String>> {
        Ok(self
            .read_graph()?
            .uncreated(|n| self.provider.page_exists(n)))
    }

    /// Snapshot copy of the known-page set.
    pub fn find_created(&self) -> Result<BTreeSet<String>> {
        Ok(self.read_graph()?.created())
    }

    /// Cheap "did anything change" probe: structural hash over both
    /// indexes, maintained on every mutation.
    pub fn deep_hash(&self) -> Result<u64> {
        Ok(self.read_graph()?.deep_hash())
    }

    /// Returns graph statistics.
    pub fn stats(&self) -> Result<GraphStats> {
        Ok(self.read_graph()?.stats())
    }

    /// Set one attribute in a page's cache file.
    pub fn set_page_attribute(&self, page: &str, key: &str, value: &str) -> Result<()> {
        let page = self.resolver.resolve(page);
        let mut attrs = self.attributes.load(&page).unwrap_or_default();
        attrs.insert(key.to_string(), value.to_string());
        self.attributes.save(&page, &attrs)
    }

    /// One attribute from a page's cache file, if present.
    pub fn get_page_attribute(&self, page: &str, key: &str) -> Option<String> {
        let page = self.resolver.resolve(page);
        self.attributes.load(&page)?.remove(key)
    }

    /// A page's full attribute map (empty when no cache file survives).
    pub fn page_attributes(&self, page: &str) -> BTreeMap<String, String> {
        let page = self.resolver.resolve(page);
        self.attributes.load(&page).unwrap_or_default()
    }

    fn canonical_targets(&self, targets: impl IntoIterator<Item = String>) -> Vec<String> {
        targets
            .into_iter()
            .map(|t| self.resolver.resolve(&t))
            .filter(|t| !t.is_empty())
            .collect()
    }

    // Advisory cache write: log and swallow, the in-memory graph is
    // already correct.
    fn persist(&self, graph: &ReferenceGraph) {
        if let Err(e) = self.snapshots.save(graph) {
            tracing::warn!("failed to write graph snapshot: {}", e);
        }
    }

    fn read_graph(&self) -> Result<RwLockReadGuard<'_, ReferenceGraph>> {
        // poisoned on the read path: a writer died mid-mutation; retryable
        self.graph.read().map_err(|_| Error::ConcurrentMutation)
    }

    fn write_graph(&self) -> Result<RwLockWriteGuard<'_, ReferenceGraph>> {
        self.graph.write().map_err(|_| {
            Error::InternalInconsistency("graph lock poisoned by a failed mutation".to_string())
        })
    }
}

fn nonempty(set: BTreeSet<String>) -> Option<BTreeSet<String>> {
    if set.is_empty() { None } else { Some(set) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::WikiLinkExtractor;
    use crate::name::DefaultResolver;
    use crate::provider::MemoryPageProvider;
    use tempfile::{TempDir, tempdir};

    struct Fixture {
        provider: Arc<MemoryPageProvider>,
        engine: ReferenceEngine,
        _dir: TempDir,
    }

    fn fixture(match_plurals: bool) -> Fixture {
        let dir = tempdir().unwrap();
        let provider = Arc::new(MemoryPageProvider::new());
        let engine = ReferenceEngine::new(
            provider.clone(),
            Arc::new(WikiLinkExtractor::new()),
            Arc::new(DefaultResolver),
            EngineConfig {
                work_dir: dir.path().to_path_buf(),
                match_english_plurals: match_plurals,
            },
        );
        Fixture {
            provider,
            engine,
            _dir: dir,
        }
    }

    impl Fixture {
        fn save(&self, page: &str, text: &str) {
            self.provider.put_page(page, text);
            self.engine.page_saved(page, text).unwrap();
        }

        fn delete(&self, page: &str) {
            self.provider.remove_page(page);
            self.engine.page_removed(page).unwrap();
        }

        fn referrers(&self, page: &str) -> Option<Vec<String>> {
            self.engine
                .find_referrers(page)
                .unwrap()
                .map(|set| set.into_iter().collect())
        }
    }

    #[test]
    fn test_dangling_reference() {
        let fx = fixture(false);
        fx.save("X", "[Y]");

        assert_eq!(fx.referrers("Y"), Some(vec!["X".to_string()]));
        assert!(fx.engine.find_uncreated().unwrap().contains(&"Y".to_string()));
    }

    #[test]
    fn test_gc_when_only_referrer_dies() {
        let fx = fixture(false);
        fx.save("X", "[Y]");
        fx.delete("X");

        assert_eq!(fx.referrers("Y"), None);
        assert_eq!(fx.engine.find_referred_by("Y").unwrap(), None);
        assert!(!fx.engine.find_uncreated().unwrap().contains(&"Y".to_string()));
    }

    #[test]
    fn test_duplicate_links_collapse() {
        let fx = fixture(false);
        fx.save("A", "[B] [B] [C]");

        let targets: Vec<String> = fx
            .engine
            .find_refers_to("A")
            .unwrap()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(targets, vec!["B".to_string(), "C".to_string()]);
        assert_eq!(fx.referrers("B"), Some(vec!["A".to_string()]));
        assert_eq!(fx.referrers("C"), Some(vec!["A".to_string()]));
    }

    #[test]
    fn test_second_referrer_survives_delete() {
        let fx = fixture(false);
        fx.save("A", "[B]");
        fx.save("A2", "[B]");
        fx.delete("A");

        assert_eq!(fx.referrers("B"), Some(vec!["A2".to_string()]));
    }

    #[test]
    fn test_update_is_idempotent() {
        let fx = fixture(false);
        fx.save("A", "[B] [C]");
        let hash = fx.engine.deep_hash().unwrap();
        fx.engine.page_saved("A", "[B] [C]").unwrap();

        assert_eq!(fx.engine.deep_hash().unwrap(), hash);
        assert_eq!(
            fx.engine.find_refers_to("A").unwrap(),
            fx.engine.find_refers_to("A").unwrap()
        );
    }

    #[test]
    fn test_rename_composed_externally() {
        let fx = fixture(false);
        fx.save("A", "[Target]");
        fx.save("C", "[A]");
        let before = fx.referrers("A").unwrap();

        // an external renamer: delete A, save it under B, rewrite referrers
        let text = fx.provider.page_text("A").unwrap();
        fx.delete("A");
        fx.save("B", &text);
        fx.save("C", "[B]");

        assert_eq!(fx.referrers("A"), None);
        assert_eq!(fx.referrers("B"), Some(before));
    }

    #[test]
    fn test_plural_matching_unions_variants() {
        let fx = fixture(true);
        fx.save("Cats", "[Cat]");

        // referrers of "Cats" include referrers of "Cat"
        assert_eq!(fx.referrers("Cats"), Some(vec!["Cats".to_string()]));
        // and the union never double-counts a page linking to both
        fx.save("Both", "[Cat] [Cats]");
        assert_eq!(
            fx.referrers("Cat"),
            Some(vec!["Both".to_string(), "Cats".to_string()])
        );
    }

    #[test]
    fn test_plural_matching_off_by_default() {
        let fx = fixture(false);
        fx.save("Cats", "[Cat]");
        assert_eq!(fx.referrers("Cats"), None);
    }

    #[test]
    fn test_unreferenced_and_created() {
        let fx = fixture(false);
        fx.save("Lonely", "");
        fx.save("Fan", "[Popular]");
        fx.save("Popular", "");

        let orphans = fx.engine.find_unreferenced().unwrap();
        assert!(orphans.contains(&"Lonely".to_string()));
        assert!(!orphans.contains(&"Popular".to_string()));

        let created: Vec<String> = fx.engine.find_created().unwrap().into_iter().collect();
        assert_eq!(
            created,
            vec!["Fan".to_string(), "Lonely".to_string(), "Popular".to_string()]
        );
    }

    #[test]
    fn test_names_canonicalized_before_lookup() {
        let fx = fixture(false);
        fx.save("Main", "[sandbox   page]");

        assert_eq!(fx.referrers("  Sandbox page "), Some(vec!["Main".to_string()]));
    }

    #[test]
    fn test_update_page_convenience() {
        let fx = fixture(false);
        fx.provider.put_page("A", "[B]");
        fx.engine.update_page("A").unwrap();

        assert_eq!(fx.referrers("B"), Some(vec!["A".to_string()]));
    }

    #[test]
    fn test_clear_page_entries_skips_gc_and_persistence() {
        let fx = fixture(false);
        fx.save("A", "[Ghost]");
        let before = fx.engine.deep_hash().unwrap();

        fx.engine.clear_page_entries("A").unwrap();
        assert_eq!(fx.engine.find_refers_to("A").unwrap(), None);
        assert_eq!(fx.referrers("Ghost"), None);
        assert_ne!(fx.engine.deep_hash().unwrap(), before);
    }

    #[test]
    fn test_restart_restores_snapshot() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(MemoryPageProvider::new());
        let config = EngineConfig {
            work_dir: dir.path().to_path_buf(),
            match_english_plurals: false,
        };

        let engine = ReferenceEngine::new(
            provider.clone(),
            Arc::new(WikiLinkExtractor::new()),
            Arc::new(DefaultResolver),
            config.clone(),
        );
        provider.put_page("A", "[B]");
        provider.put_page("B", "");
        engine.initialize().unwrap();
        engine.page_saved("A", "[B]").unwrap();
        let hash = engine.deep_hash().unwrap();
        drop(engine);

        let restarted = ReferenceEngine::new(
            provider.clone(),
            Arc::new(WikiLinkExtractor::new()),
            Arc::new(DefaultResolver),
            config,
        );
        restarted.initialize().unwrap();

        assert_eq!(restarted.deep_hash().unwrap(), hash);
        assert_eq!(
            restarted.find_referrers("B").unwrap().map(|s| s.into_iter().collect::<Vec<_>>()),
            Some(vec!["A".to_string()])
        );
    }

    #[test]
    fn test_restart_heals_corrupt_snapshot() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(MemoryPageProvider::new());
        provider.put_page("A", "[B]");
        provider.put_page("B", "");

        std::fs::write(dir.path().join("linkgraph.snap"), b"garbage").unwrap();

        let engine = ReferenceEngine::new(
            provider.clone(),
            Arc::new(WikiLinkExtractor::new()),
            Arc::new(DefaultResolver),
            EngineConfig {
                work_dir: dir.path().to_path_buf(),
                match_english_plurals: false,
            },
        );
        engine.initialize().unwrap();

        assert_eq!(
            engine.find_referrers("B").unwrap().map(|s| s.into_iter().collect::<Vec<_>>()),
            Some(vec!["A".to_string()])
        );
    }

    #[test]
    fn test_restart_reconciles_offline_changes() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(MemoryPageProvider::new());
        let config = EngineConfig {
            work_dir: dir.path().to_path_buf(),
            match_english_plurals: false,
        };

        let engine = ReferenceEngine::new(
            provider.clone(),
            Arc::new(WikiLinkExtractor::new()),
            Arc::new(DefaultResolver),
            config.clone(),
        );
        provider.put_page("A", "[B]");
        provider.put_page("B", "[A]");
        engine.initialize().unwrap();
        drop(engine);

        // while the engine is down: A deleted, B rewritten, C created
        let late = crate::storage::now_millis() + 60_000;
        provider.remove_page("A");
        provider.put_page_at("B", "[C]", late);
        provider.put_page_at("C", "", late);

        let restarted = ReferenceEngine::new(
            provider.clone(),
            Arc::new(WikiLinkExtractor::new()),
            Arc::new(DefaultResolver),
            config,
        );
        restarted.initialize().unwrap();

        assert!(!restarted.find_created().unwrap().contains("A"));
        assert!(restarted.find_created().unwrap().contains("C"));
        assert_eq!(
            restarted.find_referrers("C").unwrap().map(|s| s.into_iter().collect::<Vec<_>>()),
            Some(vec!["B".to_string()])
        );
        assert_eq!(restarted.find_referrers("B").unwrap(), None);
    }

    #[test]
    fn test_rebuild_fails_on_unreadable_page() {
        // a provider whose page list names a page it cannot read
        struct LyingProvider(MemoryPageProvider);
        impl PageProvider for LyingProvider {
            fn all_pages(&self) -> crate::Result<Vec<crate::provider::PageInfo>> {
                let mut pages = self.0.all_pages()?;
                pages.push(crate::provider::PageInfo {
                    name: "Phantom".to_string(),
                    last_modified: 1,
                });
                Ok(pages)
            }
            fn page_text(&self, name: &str) -> crate::Result<String> {
                self.0.page_text(name)
            }
            fn page_exists(&self, name: &str) -> bool {
                self.0.page_exists(name)
            }
            fn last_modified(&self, name: &str) -> Option<u64> {
                self.0.last_modified(name)
            }
        }

        let dir = tempdir().unwrap();
        let inner = MemoryPageProvider::new();
        inner.put_page("A", "[B]");

        let engine = ReferenceEngine::new(
            Arc::new(LyingProvider(inner)),
            Arc::new(WikiLinkExtractor::new()),
            Arc::new(DefaultResolver),
            EngineConfig {
                work_dir: dir.path().to_path_buf(),
                match_english_plurals: false,
            },
        );
        assert!(matches!(engine.initialize(), Err(Error::Provider(_))));
    }

    #[test]
    fn test_page_attributes_lifecycle() {
        let fx = fixture(false);
        fx.save("Main", "[A]");

        fx.engine.set_page_attribute("Main", "author", "alice").unwrap();
        fx.engine.set_page_attribute("Main", "lock", "1").unwrap();
        assert_eq!(
            fx.engine.get_page_attribute("Main", "author").as_deref(),
            Some("alice")
        );
        assert_eq!(fx.engine.page_attributes("Main").len(), 2);

        fx.delete("Main");
        assert_eq!(fx.engine.get_page_attribute("Main", "author"), None);
    }
}

//! Event bridge - page store lifecycle notifications into the engine
//!
//! The page store announces `PageSaved`/`PageDeleted` on a channel; the
//! [`EventBridge`] drains it and drives the engine synchronously, one
//! event at a time. [`PageWatcher`] turns filesystem changes in a
//! file-backed page directory into those same events.

use crate::engine::ReferenceEngine;
use crossbeam::channel::{Receiver, Sender};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::channel;

/// A page store lifecycle notification.
#[derive(Debug, Clone)]
pub enum PageEvent {
    /// A page was created or its content replaced.
    Saved { name: String, text: String },
    /// A page was deleted.
    Deleted { name: String },
}

/// The channel page stores publish lifecycle events on.
pub fn event_channel() -> (Sender<PageEvent>, Receiver<PageEvent>) {
    crossbeam::channel::unbounded()
}

/// Drains page events into engine mutations.
pub struct EventBridge {
    engine: Arc<ReferenceEngine>,
    rx: Receiver<PageEvent>,
}

impl EventBridge {
    pub fn new(engine: Arc<ReferenceEngine>, rx: Receiver<PageEvent>) -> Self {
        Self { engine, rx }
    }

    /// Dispatch events until every sender is gone. Per-event failures are
    /// logged and skipped; the loop itself never dies.
    pub fn run(&self) {
        for event in &self.rx {
            self.dispatch(event);
        }
    }

    fn dispatch(&self, event: PageEvent) {
        let outcome = match &event {
            PageEvent::Saved { name, text } => self.engine.page_saved(name, text),
            PageEvent::Deleted { name } => self.engine.page_removed(name),
        };
        if let Err(e) = outcome {
            tracing::error!("failed to apply {:?}: {}", event, e);
        }
    }
}

/// Watches a file-backed page directory and reports page lifecycle events.
pub struct PageWatcher {
    root: PathBuf,
    tx: Sender<PageEvent>,
}

impl PageWatcher {
    pub fn new(root: PathBuf, tx: Sender<PageEvent>) -> Self {
        Self { root, tx }
    }

    pub fn run(&self) -> anyhow::Result<()> {
        let (fs_tx, fs_rx) = channel();

        let mut watcher = RecommendedWatcher::new(fs_tx, Config::default())?;

        watcher.watch(&self.root, RecursiveMode::NonRecursive)?;

        println!("👀 Watching for page changes in {:?}...", self.root);

        for res in fs_rx {
            match res {
                Ok(event) => self.handle_event(event),
                Err(e) => println!("watch error: {:?}", e),
            }
        }

        Ok(())
    }

    fn handle_event(&self, event: notify::Event) {
        use notify::EventKind;
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => {
                for path in event.paths {
                    if path.is_file() {
                        self.page_changed(&path);
                    }
                }
            }
            EventKind::Remove(_) => {
                for path in event.paths {
                    self.page_deleted(&path);
                }
            }
            _ => {}
        }
    }

    fn page_changed(&self, path: &Path) {
        let Some(name) = page_name_of(&self.root, path) else {
            return;
        };
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(_) => return,
        };
        println!("📝 Page saved: {}", name);
        self.tx.send(PageEvent::Saved { name, text }).ok();
    }

    fn page_deleted(&self, path: &Path) {
        let Some(name) = page_name_of(&self.root, path) else {
            return;
        };
        println!("🗑️  Page deleted: {}", name);
        self.tx.send(PageEvent::Deleted { name }).ok();
    }
}

// A direct child `<Name>.txt` of the page directory is a page; everything
// else (snapshots, attachments dirs, editor droppings) is not.
fn page_name_of(root: &Path, path: &Path) -> Option<String> {
    if path.parent() != Some(root) {
        return None;
    }
    if path.extension().and_then(|e| e.to_str()) != Some("txt") {
        return None;
    }
    path.file_stem().and_then(|s| s.to_str()).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::extract::WikiLinkExtractor;
    use crate::name::DefaultResolver;
    use crate::provider::MemoryPageProvider;
    use tempfile::tempdir;

    #[test]
    fn test_page_name_of() {
        let root = Path::new("/wiki/pages");
        assert_eq!(
            page_name_of(root, Path::new("/wiki/pages/Main.txt")).as_deref(),
            Some("Main")
        );
        assert_eq!(page_name_of(root, Path::new("/wiki/pages/notes.md")), None);
        assert_eq!(
            page_name_of(root, Path::new("/wiki/pages/Main-att/pic.txt")),
            None
        );
    }

    #[test]
    fn test_bridge_applies_events_in_order() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(MemoryPageProvider::new());
        let engine = Arc::new(ReferenceEngine::new(
            provider.clone(),
            Arc::new(WikiLinkExtractor::new()),
            Arc::new(DefaultResolver),
            EngineConfig {
                work_dir: dir.path().to_path_buf(),
                match_english_plurals: false,
            },
        ));

        let (tx, rx) = event_channel();
        provider.put_page("A", "[B]");
        tx.send(PageEvent::Saved {
            name: "A".to_string(),
            text: "[B]".to_string(),
        })
        .unwrap();
        provider.put_page("A2", "[B]");
        tx.send(PageEvent::Saved {
            name: "A2".to_string(),
            text: "[B]".to_string(),
        })
        .unwrap();
        provider.remove_page("A");
        tx.send(PageEvent::Deleted {
            name: "A".to_string(),
        })
        .unwrap();
        drop(tx);

        EventBridge::new(engine.clone(), rx).run();

        let referrers: Vec<String> = engine
            .find_referrers("B")
            .unwrap()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(referrers, vec!["A2".to_string()]);
    }

    #[test]
    fn test_bridge_survives_bad_events() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(MemoryPageProvider::new());
        let engine = Arc::new(ReferenceEngine::new(
            provider.clone(),
            Arc::new(WikiLinkExtractor::new()),
            Arc::new(DefaultResolver),
            EngineConfig {
                work_dir: dir.path().to_path_buf(),
                match_english_plurals: false,
            },
        ));

        let (tx, rx) = event_channel();
        // deleting a page the graph never saw must not derail the loop
        tx.send(PageEvent::Deleted {
            name: "Ghost".to_string(),
        })
        .unwrap();
        provider.put_page("A", "[B]");
        tx.send(PageEvent::Saved {
            name: "A".to_string(),
            text: "[B]".to_string(),
        })
        .unwrap();
        drop(tx);

        EventBridge::new(engine.clone(), rx).run();

        assert!(engine.find_referrers("B").unwrap().is_some());
    }
}

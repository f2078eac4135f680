//! # Wikigraph - Wiki Reference Graph Engine
//!
//! Tracks, for every wiki page, which other pages it links to and, as the
//! derived inverse, which pages link to it.
//!
//! Wikigraph provides:
//! - A dual-index reference graph (outgoing and incoming edges) kept in
//!   lockstep under interleaved page saves, deletes and renames
//! - Best-effort disk snapshots that self-heal by full rebuild on corruption
//! - Dangling-reference tracking for "broken link" and "orphan" reports
//! - Read-time English singular/plural matching that never touches storage
//! - An event bridge from page store lifecycle notifications

pub mod config;
pub mod engine;
pub mod extract;
pub mod graph;
pub mod name;
pub mod plural;
pub mod provider;
pub mod storage;
pub mod ui;
pub mod watcher;

// Re-exports for convenient access
pub use engine::{EngineConfig, ReferenceEngine};
pub use extract::{LinkExtractor, WikiLinkExtractor};
pub use graph::ReferenceGraph;
pub use name::{DefaultResolver, NameResolver};
pub use provider::{FilePageProvider, MemoryPageProvider, PageProvider};
pub use storage::{AttributeStore, SnapshotStore};

/// Result type alias for wikigraph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for wikigraph operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Page content could not be read or extracted while (re)building the
    /// graph. Propagates to the caller of `initialize`/`update_*`.
    #[error("Provider error: {0}")]
    Provider(String),

    /// A persisted file carries an unknown version tag. Recoverable: the
    /// engine treats the file as absent and rebuilds from the page store.
    #[error("Snapshot format mismatch: expected version {expected}, found {found}")]
    SnapshotFormat { expected: u64, found: u64 },

    /// An invariant of the dual index was violated. This is a programming
    /// defect, never repaired silently, and raised distinctly from I/O
    /// errors so callers can tell "disk cache corrupt" from "index broken".
    #[error("Reference index inconsistency: {0}")]
    InternalInconsistency(String),

    /// A read raced a mutation that died mid-flight. Recoverable: the
    /// caller may retry the read.
    #[error("Graph mutated during read")]
    ConcurrentMutation,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

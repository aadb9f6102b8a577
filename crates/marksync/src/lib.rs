//! # marksync - bookmark tree synchronization engine
//!
//! marksync keeps a browser's native bookmark tree synchronized with a single
//! remote JSON snapshot stored behind a key-value document API. The heart of
//! the crate is the reconciliation engine: canonicalizing two divergent tree
//! representations, deciding when to merge versus overwrite, guarding
//! against feedback loops caused by its own mutations re-triggering change
//! events, deduplicating on merge, and transparently layering encryption
//! over the wire payload.
//!
//! ## Features
//!
//! - **Browser-agnostic snapshots**: trees from Gecko-style and
//!   Chromium-style stores canonicalize to the same comparable form.
//! - **Additive merge or destructive replace**: inbound sync either reuses
//!   what is already present (idempotent merge) or clears and recreates,
//!   honoring the user's folder selection.
//! - **Feedback-loop suppression**: a single-holder operation guard keeps
//!   the engine's own writes from being mistaken for user edits.
//! - **Transparent encryption**: optional AES-256-GCM envelope with
//!   password-based key derivation; encrypted and plain documents are
//!   distinguished structurally.
//! - **Unattended operation**: interval-driven inbound sync, event-driven
//!   outbound sync, and a one-shot startup reconcile.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use marksync::{EngineConfig, StoreVariant, SyncEngine, SyncSettings};
//! use marksync::memory::{MemoryBookmarkStore, MemoryRemote};
//!
//! #[tokio::main]
//! async fn main() -> marksync::Result<()> {
//!     // Hosts plug in real implementations of the two ports; the in-memory
//!     // ones here are the crate's reference implementations.
//!     let store = Arc::new(MemoryBookmarkStore::new(StoreVariant::Gecko));
//!     let remote = Arc::new(MemoryRemote::new());
//!
//!     let settings = SyncSettings::new("credential", "document-id", "bookmarks.json")
//!         .with_auto_sync(true)
//!         .with_auto_sync_interval(10);
//!
//!     let engine = SyncEngine::init(EngineConfig::default(), settings, store, remote).await?;
//!
//!     // Manual operations return a human-readable outcome.
//!     let message = engine.upload(None).await?;
//!     println!("{message}");
//!
//!     // Badge/notification layers subscribe to the status signal.
//!     let status = engine.status();
//!     println!("{:?}", *status.borrow());
//!
//!     engine.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`engine`]: the [`SyncEngine`] coordinator and its operation surface
//! - [`tree`]: bookmark tree data model and wire snapshot
//! - [`canonical`]: canonicalization and store-variant detection
//! - [`envelope`]: the encryption envelope over the wire payload
//! - [`filter`]: folder-selection pruning
//! - [`reconcile`]: merge/create and clear/prune
//! - [`guard`]: the single-holder operation state guard
//! - [`history`]: bounded ring of operation outcomes
//! - [`store`]: collaborator ports (live store, remote documents)
//! - [`memory`]: in-memory reference implementations of the ports
//! - [`settings`], [`state`], [`error`]: configuration, persistence, errors
//!
//! ## Internal Modules
//!
//! The following modules are used internally and are not part of the stable API:
//!
//! - [`scheduler`]: the auto-sync timer loop
//! - [`startup`]: the one-shot startup reconciler

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]

// =============================================================================
// Public modules - stable API
// =============================================================================

pub mod canonical;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod filter;
pub mod guard;
pub mod history;
pub mod memory;
pub mod reconcile;
pub mod settings;
pub mod state;
pub mod store;
pub mod tree;

// =============================================================================
// Internal modules - not part of stable API
// =============================================================================

#[doc(hidden)]
pub mod scheduler;

#[doc(hidden)]
pub mod startup;

pub use canonical::{canonical_children, canonicalize, StoreVariant};
pub use engine::{SyncEngine, SyncSignal};
pub use error::{Error, Result};
pub use filter::{filter_tree, FolderSelection};
pub use guard::{OperationGuard, OperationState};
pub use history::{SyncHistory, SyncHistoryEntry, SyncKind, SyncOutcome};
pub use settings::{EngineConfig, SyncSettings};
pub use state::LocalState;
pub use store::{BookmarkEvent, BookmarkStore, RemoteDocuments};
pub use tree::{BookmarkNode, RootFolder, SyncSnapshot};

/// Maximum number of entries kept in the sync history ring.
pub const SYNC_HISTORY_LIMIT: usize = 10;

/// Default minutes between automatic inbound merge-downloads.
pub const DEFAULT_AUTO_SYNC_INTERVAL_MINUTES: u64 = 10;

/// Default fixed period of the auto-sync timer, in seconds.
///
/// Deliberately much finer-grained than the user-configured interval; each
/// tick only checks whether that interval has elapsed.
pub const DEFAULT_SCHEDULER_TICK_SECS: u64 = 30;

/// Default settling delay before the startup reconciler runs, in seconds.
pub const DEFAULT_STARTUP_DELAY_SECS: u64 = 10;

/// Minimum spacing between user-facing configuration/password notices.
pub(crate) const CONFIG_NOTICE_INTERVAL: std::time::Duration =
    std::time::Duration::from_secs(3600);

//! The sync engine coordinator.
//!
//! [`SyncEngine`] owns the operation guard, the persisted state and the
//! status signal, and exposes the operations the host UI calls:
//! [`upload`](SyncEngine::upload), [`download`](SyncEngine::download),
//! [`remove_all`](SyncEngine::remove_all),
//! [`export_snapshot`](SyncEngine::export_snapshot) and
//! [`import_nodes`](SyncEngine::import_nodes). It funnels every store change
//! event through the guard, drives the auto-sync scheduler and runs the
//! startup reconciler once after a settling delay.
//!
//! # Lifecycle
//!
//! 1. Create with [`SyncEngine::init()`] - loads persisted state, detects the
//!    store variant and starts the background tasks
//! 2. Subscribe to [`SyncEngine::status()`] for badge rendering and to
//!    [`SyncEngine::notices()`] for notifications
//! 3. Call operations; push settings changes with
//!    [`SyncEngine::update_settings()`]
//! 4. Shut down with [`SyncEngine::shutdown()`]
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use marksync::{EngineConfig, SyncEngine, SyncSettings};
//! use marksync::memory::{MemoryBookmarkStore, MemoryRemote};
//! use marksync::StoreVariant;
//!
//! # async fn example() -> marksync::Result<()> {
//! let store = Arc::new(MemoryBookmarkStore::new(StoreVariant::Gecko));
//! let remote = Arc::new(MemoryRemote::new());
//! let settings = SyncSettings::new("token", "doc-id", "bookmarks.json");
//!
//! let engine = SyncEngine::init(EngineConfig::default(), settings, store, remote).await?;
//! let message = engine.upload(None).await?;
//! println!("{message}");
//! engine.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::canonical::{canonical_children, serialize_structure, StoreVariant};
use crate::envelope;
use crate::error::{Error, Result};
use crate::filter::filter_tree;
use crate::guard::{OperationGuard, OperationState, OperationToken};
use crate::history::{SyncHistoryEntry, SyncKind, SyncOutcome};
use crate::reconcile;
use crate::settings::{EngineConfig, SyncSettings};
use crate::state::{LocalState, StateFile};
use crate::store::{BookmarkEvent, BookmarkStore, RemoteDocuments};
use crate::tree::{count_bookmarks, BookmarkNode, SyncSnapshot};
use crate::{scheduler, startup, CONFIG_NOTICE_INTERVAL};

/// Status consumed by the host's badge/notification rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncSignal {
    /// A sync operation is in flight.
    Syncing,
    /// The last operation completed.
    #[default]
    Success,
    /// The last operation failed.
    Error,
    /// The remote document needs a password (missing or wrong).
    PasswordRequired,
}

/// The bookmark synchronization engine.
///
/// Shared across tasks behind an `Arc`; all interior state is lock-protected.
/// Exactly one engine instance runs per browser profile, so no cross-process
/// coordination exists or is needed.
pub struct SyncEngine {
    config: EngineConfig,
    store: Arc<dyn BookmarkStore>,
    remote: Arc<dyn RemoteDocuments>,
    variant: StoreVariant,
    guard: OperationGuard,
    state: RwLock<LocalState>,
    state_file: StateFile,
    settings_tx: watch::Sender<SyncSettings>,
    status_tx: watch::Sender<SyncSignal>,
    notice_tx: watch::Sender<Option<String>>,
    last_rate_limited_notice: Mutex<Option<Instant>>,
    /// Outstanding change events expected from the engine's own writes.
    ///
    /// The store reports those writes back as change events, possibly after
    /// the guard is already released; each tracked write banks a credit here
    /// so the matching event is never mistaken for a user edit.
    self_write_credits: Arc<AtomicU64>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

/// Store adapter that banks a self-write credit before every mutation.
///
/// The credit is banked before the call so the resulting change event can
/// never outrun it, and is returned on failure since no event will come.
struct TrackedStore {
    inner: Arc<dyn BookmarkStore>,
    credits: Arc<AtomicU64>,
}

#[async_trait]
impl BookmarkStore for TrackedStore {
    async fn get_tree(&self) -> Result<BookmarkNode> {
        self.inner.get_tree().await
    }

    async fn get_children(&self, parent_id: &str) -> Result<Vec<BookmarkNode>> {
        self.inner.get_children(parent_id).await
    }

    async fn create(&self, parent_id: &str, title: &str, url: Option<&str>) -> Result<BookmarkNode> {
        self.credits.fetch_add(1, Ordering::SeqCst);
        let result = self.inner.create(parent_id, title, url).await;
        if result.is_err() {
            self.credits.fetch_sub(1, Ordering::SeqCst);
        }
        result
    }

    async fn remove_tree(&self, id: &str) -> Result<()> {
        self.credits.fetch_add(1, Ordering::SeqCst);
        let result = self.inner.remove_tree(id).await;
        if result.is_err() {
            self.credits.fetch_sub(1, Ordering::SeqCst);
        }
        result
    }

    fn subscribe(&self, events: mpsc::UnboundedSender<BookmarkEvent>) {
        self.inner.subscribe(events);
    }
}

impl SyncEngine {
    /// Initialize the engine.
    ///
    /// Loads persisted state, detects the store variant from the live tree's
    /// super-root, recomputes the folder selection's excluded complement
    /// (live ids are not stable across sessions) and starts the event intake
    /// loop, the auto-sync scheduler and the startup reconciler.
    pub async fn init(
        config: EngineConfig,
        settings: SyncSettings,
        store: Arc<dyn BookmarkStore>,
        remote: Arc<dyn RemoteDocuments>,
    ) -> Result<Arc<Self>> {
        info!("Initializing sync engine");

        let state_file = StateFile::new(config.state_file_path());
        let mut state = state_file.load().await;

        let tree = store.get_tree().await?;
        let variant = StoreVariant::detect(&tree);
        state.selection.recompute_excluded(&tree, variant);
        state.local_count = count_bookmarks(tree.children());
        debug!(variant = variant.source_name(), local_count = state.local_count, "Live tree inspected");

        let (settings_tx, settings_rx) = watch::channel(settings);
        let (status_tx, _) = watch::channel(SyncSignal::Success);
        let (notice_tx, _) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let engine = Arc::new(Self {
            config,
            store,
            remote,
            variant,
            guard: OperationGuard::new(),
            state: RwLock::new(state),
            state_file,
            settings_tx,
            status_tx,
            notice_tx,
            last_rate_limited_notice: Mutex::new(None),
            self_write_credits: Arc::new(AtomicU64::new(0)),
            tasks: Mutex::new(Vec::new()),
            shutdown_tx,
        });

        engine.persist_state().await?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        engine.store.subscribe(event_tx);

        let handles = vec![
            Self::start_event_loop(Arc::clone(&engine), event_rx, shutdown_rx.clone()),
            scheduler::start(Arc::clone(&engine), settings_rx, shutdown_rx.clone()),
            startup::start(Arc::clone(&engine), shutdown_rx),
        ];
        *engine.tasks.lock() = handles;

        info!("Sync engine initialized");
        Ok(engine)
    }

    /// Shut down the engine gracefully. Idempotent.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down sync engine");
        let _ = self.shutdown_tx.send(true);

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            match tokio::time::timeout(Duration::from_secs(5), handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Engine task panicked: {e}"),
                Err(_) => warn!("Engine task did not stop within timeout"),
            }
        }

        info!("Sync engine shut down");
        Ok(())
    }

    // =========================================================================
    // Surface for the host UI
    // =========================================================================

    /// Subscribe to the badge status signal.
    pub fn status(&self) -> watch::Receiver<SyncSignal> {
        self.status_tx.subscribe()
    }

    /// Subscribe to user-facing notification messages.
    ///
    /// Config and password errors appear here at most once per hour; every
    /// occurrence is still recorded in the history.
    pub fn notices(&self) -> watch::Receiver<Option<String>> {
        self.notice_tx.subscribe()
    }

    /// Current settings snapshot.
    #[must_use]
    pub fn settings(&self) -> SyncSettings {
        self.settings_tx.borrow().clone()
    }

    /// Push a settings change.
    ///
    /// The scheduler picks the new value up after the debounce window, so
    /// rapid consecutive writes coalesce.
    pub fn update_settings(&self, settings: SyncSettings) {
        debug!(
            auto_sync = settings.auto_sync_enabled,
            interval_minutes = settings.auto_sync_interval_minutes,
            "Settings updated"
        );
        let _ = self.settings_tx.send(settings);
    }

    /// Snapshot of the persisted engine state (counts, history, selection).
    #[must_use]
    pub fn local_state(&self) -> LocalState {
        self.state.read().clone()
    }

    /// Recent operation outcomes, most recent first.
    #[must_use]
    pub fn history(&self) -> Vec<SyncHistoryEntry> {
        self.state.read().sync_history.entries().to_vec()
    }

    /// Upload the local tree to the remote document.
    ///
    /// When `selected` is given it becomes the persisted folder selection;
    /// otherwise the stored selection applies. An empty selection uploads
    /// everything.
    pub async fn upload(&self, selected: Option<HashSet<String>>) -> Result<String> {
        self.run_upload(selected, SyncKind::Manual).await
    }

    /// Download the remote snapshot into the local tree.
    ///
    /// With `merge_local` the remote content is merged additively; without
    /// it the local tree is cleared first (subject to the folder selection)
    /// and recreated from the snapshot.
    pub async fn download(&self, merge_local: bool) -> Result<String> {
        self.run_download(merge_local, SyncKind::Manual).await
    }

    /// Remove local bookmarks under the root containers, subject to the
    /// folder selection's exclusion list.
    pub async fn remove_all(&self) -> Result<String> {
        let Some(token) = self.guard.try_acquire(OperationState::Clearing) else {
            debug!("Remove-all skipped, another operation holds the guard");
            return Err(Error::Busy);
        };
        self.begin_tracked_writes();
        self.set_status(SyncSignal::Syncing);

        let result = async {
            let removed = {
                let _phase = token.begin_clearing();
                let selection = self.state.read().selection.clone();
                reconcile::clear(&self.tracked_store(), self.variant, &selection).await?
            };
            self.refresh_local_count().await?;
            Ok(format!("removed {removed} bookmark subtrees"))
        }
        .await;

        drop(token);
        self.finish(SyncKind::Manual, result).await
    }

    /// Produce the snapshot an upload would send, without writing remotely.
    pub async fn export_snapshot(&self, selected: Option<HashSet<String>>) -> Result<SyncSnapshot> {
        let tree = self.store.get_tree().await?;
        let selection_ids =
            selected.unwrap_or_else(|| self.state.read().selection.selected_ids.clone());
        let filtered = filter_tree(&tree, &selection_ids, self.variant);
        let containers = canonical_children(&filtered, self.variant);
        Ok(SyncSnapshot::new(containers, self.variant.source_name()))
    }

    /// Merge externally supplied canonical root containers into the live
    /// tree, as a file import does.
    pub async fn import_nodes(&self, nodes: Vec<BookmarkNode>) -> Result<String> {
        let Some(token) = self.guard.try_acquire(OperationState::Syncing) else {
            debug!("Import skipped, another operation holds the guard");
            return Err(Error::Busy);
        };
        self.begin_tracked_writes();
        self.set_status(SyncSignal::Syncing);

        let result = async {
            let stats = reconcile::merge(&self.tracked_store(), self.variant, &nodes).await?;
            self.refresh_local_count().await?;
            Ok(format!("imported {} bookmarks", stats.created()))
        }
        .await;

        drop(token);
        self.finish(SyncKind::Manual, result).await
    }

    // =========================================================================
    // Operation internals
    // =========================================================================

    pub(crate) async fn run_upload(
        &self,
        selected: Option<HashSet<String>>,
        kind: SyncKind,
    ) -> Result<String> {
        let settings = self.settings();
        if let Err(e) = settings.validate() {
            return self.finish(kind, Err(e)).await;
        }

        let Some(token) = self.guard.try_acquire(OperationState::Syncing) else {
            debug!("Upload skipped, another operation holds the guard");
            return Err(Error::Busy);
        };
        self.begin_tracked_writes();
        self.set_status(SyncSignal::Syncing);

        let result = self.perform_upload(&settings, selected).await;
        drop(token);
        self.finish(kind, result).await
    }

    async fn perform_upload(
        &self,
        settings: &SyncSettings,
        selected: Option<HashSet<String>>,
    ) -> Result<String> {
        let tree = self.store.get_tree().await?;

        if let Some(selected) = &selected {
            let mut state = self.state.write();
            state.selection.selected_ids = selected.clone();
            state.selection.recompute_excluded(&tree, self.variant);
        }
        let selection_ids = self.state.read().selection.selected_ids.clone();

        let filtered = filter_tree(&tree, &selection_ids, self.variant);
        let containers = canonical_children(&filtered, self.variant);
        let snapshot = SyncSnapshot::new(containers, self.variant.source_name());
        let uploaded_count = snapshot.bookmark_count();

        let mut fell_back_to_plaintext = false;
        let body = match envelope::encode(&snapshot, settings.password()) {
            Ok(body) => body,
            Err(e) if settings.password().is_some() => {
                warn!(error = %e, "Encryption failed, uploading plaintext as a last resort");
                fell_back_to_plaintext = true;
                envelope::encode(&snapshot, None)?
            }
            Err(e) => return Err(e),
        };

        self.remote
            .update(&settings.document_id, &settings.file_name, &body)
            .await?;

        // Track the full (unfiltered) canonical structure so startup can
        // tell local edits apart from an already-synced tree.
        let structure = serialize_structure(&canonical_children(&tree, self.variant))?;
        {
            let mut state = self.state.write();
            state.local_count = count_bookmarks(tree.children());
            state.remote_count = uploaded_count;
            state.last_sync_time = Some(Utc::now());
            state.last_bookmark_structure = Some(structure);
        }

        if fell_back_to_plaintext {
            Ok(format!(
                "uploaded {uploaded_count} bookmarks (warning: encryption failed, stored as plaintext)"
            ))
        } else {
            Ok(format!("uploaded {uploaded_count} bookmarks"))
        }
    }

    pub(crate) async fn run_download(&self, merge_local: bool, kind: SyncKind) -> Result<String> {
        let settings = self.settings();
        if let Err(e) = settings.validate() {
            return self.finish(kind, Err(e)).await;
        }

        let Some(token) = self.guard.try_acquire(OperationState::Syncing) else {
            debug!("Download skipped, another operation holds the guard");
            return Err(Error::Busy);
        };
        self.begin_tracked_writes();
        self.set_status(SyncSignal::Syncing);

        let result = self.perform_download(&settings, merge_local, &token).await;
        drop(token);
        self.finish(kind, result).await
    }

    async fn perform_download(
        &self,
        settings: &SyncSettings,
        merge_local: bool,
        token: &OperationToken,
    ) -> Result<String> {
        let raw = self
            .remote
            .get(&settings.document_id, &settings.file_name)
            .await?
            .ok_or(Error::RemoteEmpty)?;

        let snapshot = envelope::decode(&raw, settings.password())?;
        let remote_count = snapshot.bookmark_count();

        if !merge_local {
            let _phase = token.begin_clearing();
            let selection = self.state.read().selection.clone();
            reconcile::clear(&self.tracked_store(), self.variant, &selection).await?;
        }

        let stats =
            reconcile::merge(&self.tracked_store(), self.variant, &snapshot.bookmarks).await?;

        let tree = self.store.get_tree().await?;
        let structure = serialize_structure(&canonical_children(&tree, self.variant))?;
        {
            let mut state = self.state.write();
            state.local_count = count_bookmarks(tree.children());
            state.remote_count = remote_count;
            state.last_sync_time = Some(Utc::now());
            state.last_bookmark_structure = Some(structure);
        }

        Ok(format!(
            "downloaded {remote_count} bookmarks ({} added locally)",
            stats.created()
        ))
    }

    /// Record the remote snapshot as already in sync, without mutating the
    /// tree. Used by the startup reconciler when local and remote match.
    pub(crate) async fn mark_in_sync(&self, snapshot: &SyncSnapshot) -> Result<()> {
        let structure = serialize_structure(&snapshot.bookmarks)?;
        {
            let mut state = self.state.write();
            state.remote_count = snapshot.bookmark_count();
            state.last_sync_time = DateTime::<Utc>::from_timestamp_millis(snapshot.create_date)
                .or_else(|| Some(Utc::now()));
            state.last_bookmark_structure = Some(structure);
        }
        self.persist_state().await
    }

    /// Whether the configured auto-sync interval has elapsed.
    pub(crate) fn auto_sync_due(&self, settings: &SyncSettings) -> bool {
        let interval = chrono::Duration::minutes(settings.auto_sync_interval_minutes as i64);
        match self.state.read().last_sync_time {
            Some(last) => Utc::now() - last >= interval,
            None => true,
        }
    }

    // =========================================================================
    // Event intake
    // =========================================================================

    fn start_event_loop(
        engine: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<BookmarkEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            debug!("Event intake loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        // An operation's own events may still be queued when
                        // the guard is released, so the guard alone cannot
                        // attribute them; the write credits can. The owning
                        // operation refreshes counts and persists once when
                        // it finishes, so its events need no bookkeeping
                        // either.
                        let own_write = matches!(
                            event,
                            BookmarkEvent::Created { .. } | BookmarkEvent::Removed { .. }
                        ) && engine.take_self_write_credit();
                        if own_write {
                            debug!(id = event.id(), "Ignoring the engine's own write event");
                            continue;
                        }
                        // Handling is spawned off so the loop never lags
                        // behind the channel.
                        let react = engine.guard.should_react_to_events();
                        let engine = Arc::clone(&engine);
                        tokio::spawn(async move {
                            engine.handle_store_event(event, react).await;
                        });
                    }
                }
            }
            debug!("Event intake loop stopped");
        })
    }

    async fn handle_store_event(&self, event: BookmarkEvent, react: bool) {
        // Count bookkeeping runs even while an operation holds the guard.
        if let Ok(tree) = self.store.get_tree().await {
            let count = count_bookmarks(tree.children());
            self.state.write().local_count = count;
            if let Err(e) = self.persist_state().await {
                debug!(error = %e, "Failed to persist local count");
            }
        }

        if !react {
            debug!(id = event.id(), "Ignoring change event while an operation is in flight");
            return;
        }

        let settings = self.settings();
        if !settings.auto_sync_enabled {
            return;
        }

        debug!(id = event.id(), "Local change detected, uploading");
        if let Err(e) = self.run_upload(None, SyncKind::Auto).await {
            debug!(error = %e, "Event-driven upload did not complete");
        }
    }

    // =========================================================================
    // Shared plumbing
    // =========================================================================

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &dyn BookmarkStore {
        self.store.as_ref()
    }

    pub(crate) fn remote(&self) -> &dyn RemoteDocuments {
        self.remote.as_ref()
    }

    /// The operation guard, for checking whether a sync is in flight.
    #[must_use]
    pub fn guard(&self) -> &OperationGuard {
        &self.guard
    }

    /// The store variant detected at init.
    #[must_use]
    pub fn variant(&self) -> StoreVariant {
        self.variant
    }

    fn set_status(&self, signal: SyncSignal) {
        let _ = self.status_tx.send(signal);
    }

    /// Store view whose mutations bank self-write credits.
    fn tracked_store(&self) -> TrackedStore {
        TrackedStore {
            inner: Arc::clone(&self.store),
            credits: Arc::clone(&self.self_write_credits),
        }
    }

    /// Forget stale credits from a previous operation before mutating again.
    ///
    /// Events of that operation still in flight are caught by the guard
    /// check instead, since the new operation holds the guard by now.
    fn begin_tracked_writes(&self) {
        self.self_write_credits.store(0, Ordering::SeqCst);
    }

    fn take_self_write_credit(&self) -> bool {
        self.self_write_credits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn refresh_local_count(&self) -> Result<()> {
        let tree = self.store.get_tree().await?;
        self.state.write().local_count = count_bookmarks(tree.children());
        Ok(())
    }

    async fn persist_state(&self) -> Result<()> {
        let snapshot = self.state.read().clone();
        self.state_file.save(&snapshot).await
    }

    /// Close out an operation: record history, persist state, publish the
    /// status and (rate-limited) notice. The guard token is already dropped
    /// by the caller, so the guard is idle whatever happened.
    async fn finish(&self, kind: SyncKind, result: Result<String>) -> Result<String> {
        match result {
            Ok(message) => {
                self.state
                    .write()
                    .sync_history
                    .record(kind, SyncOutcome::Success, &message);
                if let Err(e) = self.persist_state().await {
                    warn!(error = %e, "Failed to persist state after operation");
                }
                self.set_status(SyncSignal::Success);
                info!(message = %message, "Sync operation completed");
                Ok(message)
            }
            Err(e) => {
                self.state
                    .write()
                    .sync_history
                    .record(kind, SyncOutcome::Error, e.to_string());
                if let Err(persist_err) = self.persist_state().await {
                    warn!(error = %persist_err, "Failed to persist state after failure");
                }
                if e.is_password_error() {
                    self.set_status(SyncSignal::PasswordRequired);
                } else {
                    self.set_status(SyncSignal::Error);
                }
                self.publish_notice(&e);
                warn!(error = %e, "Sync operation failed");
                Err(e)
            }
        }
    }

    fn publish_notice(&self, e: &Error) {
        if !self.settings().notifications_enabled {
            return;
        }
        let rate_limited = matches!(e, Error::Config(_)) || e.is_password_error();
        if rate_limited {
            let mut last = self.last_rate_limited_notice.lock();
            if last.is_some_and(|at| at.elapsed() < CONFIG_NOTICE_INTERVAL) {
                debug!(error = %e, "Notice suppressed by rate limit");
                return;
            }
            *last = Some(Instant::now());
        }
        let _ = self.notice_tx.send(Some(e.to_string()));
    }
}

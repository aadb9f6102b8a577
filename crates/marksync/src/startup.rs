//! Startup reconciler.
//!
//! Runs once per process start, after a short settling delay, and decides
//! whether to pull the remote snapshot. It skips entirely when the remote is
//! not configured, initial setup has not been acknowledged, or the remote
//! document is empty. When local and remote already match it only records
//! the remote timestamp. When they differ, a destructive pull happens only
//! if the local tree has no unsynced changes since the previous session;
//! otherwise the event-driven upload path is left to win.
//!
//! This path runs unattended at launch, so every failure is swallowed after
//! logging.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::canonical::{canonical_children, serialize_structure};
use crate::engine::SyncEngine;
use crate::envelope;
use crate::error::Result;
use crate::history::SyncKind;

pub(crate) fn start(
    engine: Arc<SyncEngine>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let delay = Duration::from_secs(engine.config().startup_delay_secs);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return;
                }
            }
        }
        if let Err(e) = reconcile_at_startup(&engine).await {
            warn!(error = %e, "Startup reconcile did not complete");
        }
    })
}

async fn reconcile_at_startup(engine: &SyncEngine) -> Result<()> {
    let settings = engine.settings();
    if !settings.is_remote_configured() {
        debug!("Startup reconcile skipped: remote not configured");
        return Ok(());
    }
    if !settings.setup_complete {
        debug!("Startup reconcile skipped: initial setup not acknowledged");
        return Ok(());
    }

    let Some(raw) = engine
        .remote()
        .get(&settings.document_id, &settings.file_name)
        .await?
    else {
        debug!("Startup reconcile skipped: remote document is empty");
        return Ok(());
    };
    let snapshot = envelope::decode(&raw, settings.password())?;

    let tree = engine.store().get_tree().await?;
    let local = canonical_children(&tree, engine.variant());

    if local == snapshot.bookmarks {
        info!("Startup: local tree already matches the remote snapshot");
        return engine.mark_in_sync(&snapshot).await;
    }

    let current = serialize_structure(&local)?;
    let has_unsynced_changes = match &engine.local_state().last_bookmark_structure {
        Some(previous) => *previous != current,
        // Nothing recorded yet; never clobber local data on a first run.
        None => true,
    };
    if has_unsynced_changes {
        info!("Startup: local tree has unsynced changes, deferring to the upload path");
        return Ok(());
    }

    info!("Startup: replacing the unchanged local tree with the remote snapshot");
    engine.run_download(false, SyncKind::Auto).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBookmarkStore, MemoryRemote};
    use crate::settings::{EngineConfig, SyncSettings};
    use crate::store::{BookmarkStore, RemoteDocuments};
    use crate::tree::{count_bookmarks, BookmarkNode, SyncSnapshot};
    use crate::StoreVariant;
    use tempfile::TempDir;

    fn startup_config(dir: &TempDir) -> EngineConfig {
        EngineConfig::new(dir.path())
            .with_startup_delay(0)
            .with_scheduler_tick(3600)
            .with_settings_debounce(1)
    }

    fn startup_settings() -> SyncSettings {
        SyncSettings::new("token", "doc", "bookmarks.json").with_setup_complete(true)
    }

    async fn init_engine(
        dir: &TempDir,
        settings: SyncSettings,
        store: &Arc<MemoryBookmarkStore>,
        remote: &Arc<MemoryRemote>,
    ) -> Arc<SyncEngine> {
        SyncEngine::init(
            startup_config(dir),
            settings,
            Arc::clone(store) as Arc<dyn BookmarkStore>,
            Arc::clone(remote) as Arc<dyn RemoteDocuments>,
        )
        .await
        .unwrap()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    #[tokio::test]
    async fn test_skips_until_setup_acknowledged() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryBookmarkStore::new(StoreVariant::Gecko));
        let remote = Arc::new(MemoryRemote::new());
        let snapshot = SyncSnapshot::new(
            vec![BookmarkNode::folder(
                "ToolbarFolder",
                vec![BookmarkNode::bookmark("Rust", "https://www.rust-lang.org/")],
            )],
            "gecko",
        );
        remote
            .update("doc", "bookmarks.json", &serde_json::to_string(&snapshot).unwrap())
            .await
            .unwrap();

        let settings = startup_settings().with_setup_complete(false);
        let engine = init_engine(&dir, settings, &store, &remote).await;
        settle().await;

        let tree = store.get_tree().await.unwrap();
        assert_eq!(count_bookmarks(tree.children()), 0, "no pull before setup");
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_skips_when_remote_empty() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryBookmarkStore::new(StoreVariant::Gecko));
        let remote = Arc::new(MemoryRemote::new());
        store.seed("toolbar_____", "kept", Some("https://keep.example/")).unwrap();

        let engine = init_engine(&dir, startup_settings(), &store, &remote).await;
        settle().await;

        let tree = store.get_tree().await.unwrap();
        assert_eq!(count_bookmarks(tree.children()), 1, "local tree untouched");
        assert!(engine.local_state().last_sync_time.is_none());
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_identical_trees_only_record_timestamp() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryBookmarkStore::new(StoreVariant::Gecko));
        let remote = Arc::new(MemoryRemote::new());
        store.seed("toolbar_____", "Rust", Some("https://www.rust-lang.org/")).unwrap();

        // First session uploads, so the remote matches the local tree.
        let engine = init_engine(&dir, startup_settings(), &store, &remote).await;
        settle().await;
        engine.upload(None).await.unwrap();
        engine.shutdown().await.unwrap();

        let restarted = init_engine(&dir, startup_settings(), &store, &remote).await;
        settle().await;

        let tree = store.get_tree().await.unwrap();
        assert_eq!(count_bookmarks(tree.children()), 1, "no mutation on match");
        let state = restarted.local_state();
        assert!(state.last_sync_time.is_some(), "remote timestamp recorded");
        assert_eq!(state.remote_count, 1);
        assert_eq!(
            restarted.history().len(),
            1,
            "only the first session's upload is recorded; a no-op startup adds nothing"
        );
        restarted.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_defers_when_local_has_unsynced_changes() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryBookmarkStore::new(StoreVariant::Gecko));
        let remote = Arc::new(MemoryRemote::new());

        // Session one records the structure of a one-bookmark tree.
        store.seed("toolbar_____", "Rust", Some("https://www.rust-lang.org/")).unwrap();
        let engine = init_engine(&dir, startup_settings(), &store, &remote).await;
        settle().await;
        engine.upload(None).await.unwrap();
        engine.shutdown().await.unwrap();

        // The user edits locally while the engine is down, and the remote
        // moves on independently.
        store.seed("toolbar_____", "Local edit", Some("https://local.example/")).unwrap();
        let foreign = SyncSnapshot::new(
            vec![BookmarkNode::folder(
                "ToolbarFolder",
                vec![BookmarkNode::bookmark("Remote only", "https://remote.example/")],
            )],
            "gecko",
        );
        remote
            .update("doc", "bookmarks.json", &serde_json::to_string(&foreign).unwrap())
            .await
            .unwrap();

        let restarted = init_engine(&dir, startup_settings(), &store, &remote).await;
        settle().await;

        let tree = store.get_tree().await.unwrap();
        assert_eq!(
            count_bookmarks(tree.children()),
            2,
            "local edits must not be clobbered"
        );
        restarted.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_pulls_when_local_unchanged_and_remote_diverged() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryBookmarkStore::new(StoreVariant::Gecko));
        let remote = Arc::new(MemoryRemote::new());

        store.seed("toolbar_____", "Old", Some("https://old.example/")).unwrap();
        let engine = init_engine(&dir, startup_settings(), &store, &remote).await;
        settle().await;
        engine.upload(None).await.unwrap();
        engine.shutdown().await.unwrap();

        // Remote replaced by another device; local tree untouched.
        let foreign = SyncSnapshot::new(
            vec![BookmarkNode::folder(
                "ToolbarFolder",
                vec![BookmarkNode::bookmark("New", "https://new.example/")],
            )],
            "gecko",
        );
        remote
            .update("doc", "bookmarks.json", &serde_json::to_string(&foreign).unwrap())
            .await
            .unwrap();

        let restarted = init_engine(&dir, startup_settings(), &store, &remote).await;
        settle().await;

        let children = store.get_children("toolbar_____").await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].title, "New", "tree recreated from remote");
        restarted.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryBookmarkStore::new(StoreVariant::Gecko));
        let remote = Arc::new(MemoryRemote::new());
        remote.set_offline(true);

        let engine = init_engine(&dir, startup_settings(), &store, &remote).await;
        settle().await;

        // The engine stays usable and idle after the swallowed failure.
        assert!(engine.guard().is_idle());
        remote.set_offline(false);
        engine.shutdown().await.unwrap();
    }
}

//! Integration tests for the full sync engine.
//!
//! These tests drive a [`SyncEngine`] against the in-memory bookmark store
//! and remote, covering:
//! 1. Remote-to-empty-profile merge, including idempotence of a second pass
//! 2. Cross-variant sync between Gecko-style and Chromium-style stores
//! 3. Folder-selection uploads end to end
//! 4. Encrypted round trips and the wrong-password surface
//!
//! Run: `cargo test -p marksync --test engine_sync`

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use marksync::memory::{MemoryBookmarkStore, MemoryRemote};
use marksync::tree::count_bookmarks;
use marksync::{
    BookmarkStore, EngineConfig, Error, RemoteDocuments, StoreVariant, SyncEngine, SyncSettings,
    SyncSignal,
};

fn quiet_config(dir: &TempDir) -> EngineConfig {
    EngineConfig::new(dir.path())
        .with_startup_delay(3600)
        .with_scheduler_tick(3600)
        .with_settings_debounce(1)
}

fn settings() -> SyncSettings {
    SyncSettings::new("token", "doc", "bookmarks.json")
}

async fn engine_for(
    dir: &TempDir,
    variant: StoreVariant,
    settings: SyncSettings,
    remote: &Arc<MemoryRemote>,
) -> (Arc<SyncEngine>, Arc<MemoryBookmarkStore>) {
    let store = Arc::new(MemoryBookmarkStore::new(variant));
    let engine = SyncEngine::init(
        quiet_config(dir),
        settings,
        Arc::clone(&store) as Arc<dyn BookmarkStore>,
        Arc::clone(remote) as Arc<dyn RemoteDocuments>,
    )
    .await
    .expect("engine init failed");
    (engine, store)
}

/// A remote snapshot with one toolbar folder holding two links lands on an
/// empty profile with exactly those two links, and a second merge changes
/// nothing.
#[tokio::test]
async fn test_remote_folder_merges_onto_empty_profile_without_duplicates() {
    let remote = Arc::new(MemoryRemote::new());

    // A first profile publishes the snapshot.
    let dir1 = TempDir::new().unwrap();
    let (publisher, source) = engine_for(&dir1, StoreVariant::Gecko, settings(), &remote).await;
    let folder = source.seed("toolbar_____", "Toolbar", None).unwrap();
    source.seed(&folder, "Rust", Some("https://www.rust-lang.org/")).unwrap();
    source.seed(&folder, "Crates", Some("https://crates.io/")).unwrap();
    publisher.upload(None).await.unwrap();
    publisher.shutdown().await.unwrap();

    // A fresh, empty profile pulls it.
    let dir2 = TempDir::new().unwrap();
    let (engine, store) = engine_for(&dir2, StoreVariant::Gecko, settings(), &remote).await;

    let message = engine.download(true).await.unwrap();
    assert!(message.contains("2 added locally"), "{message}");

    let toolbar = store.get_children("toolbar_____").await.unwrap();
    assert_eq!(toolbar.len(), 1);
    assert_eq!(toolbar[0].title, "Toolbar");
    let links = store
        .get_children(toolbar[0].id.as_deref().unwrap())
        .await
        .unwrap();
    assert_eq!(links.len(), 2);

    // Second merge adds nothing.
    let message = engine.download(true).await.unwrap();
    assert!(message.contains("0 added locally"), "{message}");
    let tree = store.get_tree().await.unwrap();
    assert_eq!(count_bookmarks(tree.children()), 2);

    engine.shutdown().await.unwrap();
}

/// A snapshot uploaded from a Gecko-style store lands in the right containers
/// of a Chromium-style store.
#[tokio::test]
async fn test_cross_variant_sync() {
    let remote = Arc::new(MemoryRemote::new());

    let dir1 = TempDir::new().unwrap();
    let (gecko_engine, gecko_store) =
        engine_for(&dir1, StoreVariant::Gecko, settings(), &remote).await;
    gecko_store
        .seed("toolbar_____", "Rust", Some("https://www.rust-lang.org/"))
        .unwrap();
    gecko_store
        .seed("menu________", "Crates", Some("https://crates.io/"))
        .unwrap();
    gecko_engine.upload(None).await.unwrap();
    gecko_engine.shutdown().await.unwrap();

    let dir2 = TempDir::new().unwrap();
    let (chromium_engine, chromium_store) =
        engine_for(&dir2, StoreVariant::Chromium, settings(), &remote).await;
    chromium_engine.download(true).await.unwrap();

    let bar = chromium_store.get_children("1").await.unwrap();
    assert_eq!(bar.len(), 1);
    assert_eq!(bar[0].title, "Rust");
    let other = chromium_store.get_children("2").await.unwrap();
    assert_eq!(other.len(), 1);
    assert_eq!(other[0].title, "Crates");

    chromium_engine.shutdown().await.unwrap();
}

/// Uploading with a folder selection publishes only the selected subtree;
/// a fresh profile downloading it sees nothing else.
#[tokio::test]
async fn test_folder_selection_limits_what_is_published() {
    let remote = Arc::new(MemoryRemote::new());

    let dir1 = TempDir::new().unwrap();
    let (publisher, source) = engine_for(&dir1, StoreVariant::Gecko, settings(), &remote).await;
    let work = source.seed("toolbar_____", "Work", None).unwrap();
    source.seed(&work, "Tracker", Some("https://tracker.example/")).unwrap();
    let private = source.seed("toolbar_____", "Private", None).unwrap();
    source.seed(&private, "Diary", Some("https://diary.example/")).unwrap();

    let selected: HashSet<String> = [work].into();
    let message = publisher.upload(Some(selected)).await.unwrap();
    assert!(message.contains("uploaded 1"), "{message}");
    publisher.shutdown().await.unwrap();

    let dir2 = TempDir::new().unwrap();
    let (subscriber, target) = engine_for(&dir2, StoreVariant::Gecko, settings(), &remote).await;
    subscriber.download(true).await.unwrap();

    let toolbar = target.get_children("toolbar_____").await.unwrap();
    let titles: Vec<&str> = toolbar.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, vec!["Work"], "unselected folders never left the source");

    subscriber.shutdown().await.unwrap();
}

/// Encrypted upload/download round trip, and the wrong password surfacing as
/// a password-required status with the guard back to idle.
#[tokio::test]
async fn test_encrypted_sync_and_wrong_password_surface() {
    let remote = Arc::new(MemoryRemote::new());

    let dir1 = TempDir::new().unwrap();
    let (publisher, source) = engine_for(
        &dir1,
        StoreVariant::Gecko,
        settings().with_encryption("p1"),
        &remote,
    )
    .await;
    source.seed("toolbar_____", "Rust", Some("https://www.rust-lang.org/")).unwrap();
    publisher.upload(None).await.unwrap();
    publisher.shutdown().await.unwrap();

    // The stored body is an envelope, not plaintext.
    let raw = remote.raw("doc", "bookmarks.json").unwrap();
    assert!(raw.contains("\"ciphertext\""));
    assert!(!raw.contains("rust-lang.org"));

    // Right password decrypts.
    let dir2 = TempDir::new().unwrap();
    let (subscriber, target) = engine_for(
        &dir2,
        StoreVariant::Gecko,
        settings().with_encryption("p1"),
        &remote,
    )
    .await;
    subscriber.download(true).await.unwrap();
    let tree = target.get_tree().await.unwrap();
    assert_eq!(count_bookmarks(tree.children()), 1);
    subscriber.shutdown().await.unwrap();

    // Wrong password fails, flags the status, and releases the guard.
    let dir3 = TempDir::new().unwrap();
    let (wrong, _store) = engine_for(
        &dir3,
        StoreVariant::Gecko,
        settings().with_encryption("p2"),
        &remote,
    )
    .await;
    let err = wrong.download(true).await.unwrap_err();
    assert!(matches!(err, Error::WrongPassword));
    assert_eq!(*wrong.status().borrow(), SyncSignal::PasswordRequired);
    assert!(wrong.guard().is_idle());

    // A corrected password works without restarting the engine.
    wrong.update_settings(settings().with_encryption("p1"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    wrong.download(true).await.unwrap();
    assert_eq!(*wrong.status().borrow(), SyncSignal::Success);

    wrong.shutdown().await.unwrap();
}

/// The status signal walks Syncing -> Success over a manual operation.
#[tokio::test]
async fn test_status_signal_transitions() {
    let remote = Arc::new(MemoryRemote::new());
    let dir = TempDir::new().unwrap();
    let (engine, store) = engine_for(&dir, StoreVariant::Gecko, settings(), &remote).await;
    let mut status = engine.status();

    store.seed("toolbar_____", "Rust", Some("https://www.rust-lang.org/")).unwrap();
    // Widen the in-flight window so the transition is observable.
    remote.set_latency(Duration::from_millis(200));

    let uploader = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.upload(None).await })
    };

    // Observe the transition to Syncing, then the settled Success.
    let saw_syncing = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if *status.borrow_and_update() == SyncSignal::Syncing {
                return true;
            }
            if status.changed().await.is_err() {
                return false;
            }
        }
    })
    .await
    .unwrap_or(false);

    uploader.await.unwrap().unwrap();
    assert!(saw_syncing, "status must pass through Syncing");
    assert_eq!(*engine.status().borrow(), SyncSignal::Success);

    engine.shutdown().await.unwrap();
}

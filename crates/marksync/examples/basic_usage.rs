//! Basic usage example for marksync.
//!
//! This example demonstrates the core API for embedding the sync engine:
//! - Initializing the engine against the two collaborator ports
//! - Uploading and downloading snapshots
//! - Folder-selection uploads
//! - Watching the status signal
//! - Graceful shutdown
//!
//! The in-memory store and remote stand in for a real browser bookmark store
//! and document service; hosts swap in their own implementations of the
//! [`marksync::BookmarkStore`] and [`marksync::RemoteDocuments`] traits.
//!
//! Run with: cargo run --example basic_usage

use std::collections::HashSet;
use std::sync::Arc;

use marksync::memory::{MemoryBookmarkStore, MemoryRemote};
use marksync::{EngineConfig, StoreVariant, SyncEngine, SyncSettings};

#[tokio::main]
async fn main() -> marksync::Result<()> {
    // Initialize logging for visibility
    tracing_subscriber::fmt::init();

    println!("=== marksync Basic Usage Example ===\n");

    // -------------------------------------------------------------------------
    // Step 1: Initialize the engine
    // -------------------------------------------------------------------------
    println!("1. Initializing sync engine...");

    let store = Arc::new(MemoryBookmarkStore::new(StoreVariant::Gecko));
    let remote = Arc::new(MemoryRemote::new());

    // In a real host, use a persistent path like "~/.myapp/marksync"
    let state_dir = std::env::temp_dir().join("marksync-example");
    println!("   State path: {}", state_dir.display());

    let settings = SyncSettings::new("api-token", "document-id", "bookmarks.json")
        .with_auto_sync(true)
        .with_auto_sync_interval(10);

    let config = EngineConfig::new(&state_dir);
    let engine = SyncEngine::init(
        config,
        settings,
        Arc::clone(&store) as Arc<dyn marksync::BookmarkStore>,
        Arc::clone(&remote) as Arc<dyn marksync::RemoteDocuments>,
    )
    .await?;

    println!("   Detected store variant: {}", engine.variant().source_name());
    println!("   Engine initialized successfully!\n");

    // -------------------------------------------------------------------------
    // Step 2: Upload the local tree
    // -------------------------------------------------------------------------
    println!("2. Uploading the local tree...");

    // Seed some bookmarks, as if the user had created them earlier
    let dev = store.seed("toolbar_____", "Dev", None)?;
    store.seed(&dev, "Rust", Some("https://www.rust-lang.org/"))?;
    store.seed(&dev, "Crates", Some("https://crates.io/"))?;
    let private = store.seed("menu________", "Private", None)?;
    store.seed(&private, "Diary", Some("https://diary.example/"))?;

    let message = engine.upload(None).await?;
    println!("   {message}");

    let state = engine.local_state();
    println!("   Local count: {}", state.local_count);
    println!("   Remote count: {}\n", state.remote_count);

    // -------------------------------------------------------------------------
    // Step 3: Merge the remote snapshot back
    // -------------------------------------------------------------------------
    println!("3. Merging the remote snapshot...");

    // A second merge of identical content reuses everything it finds
    let message = engine.download(true).await?;
    println!("   {message}\n");

    // -------------------------------------------------------------------------
    // Step 4: Folder-selection upload
    // -------------------------------------------------------------------------
    println!("4. Uploading only a selected folder...");

    let selected: HashSet<String> = [dev].into();
    let message = engine.upload(Some(selected)).await?;
    println!("   {message}");
    println!(
        "   Excluded folder ids: {:?}\n",
        engine.local_state().selection.excluded_ids
    );

    // -------------------------------------------------------------------------
    // Step 5: Export without touching the remote
    // -------------------------------------------------------------------------
    println!("5. Exporting a snapshot...");

    let snapshot = engine.export_snapshot(None).await?;
    println!(
        "   Exported {} bookmarks from {}\n",
        snapshot.bookmark_count(),
        snapshot.source_browser
    );

    // -------------------------------------------------------------------------
    // Step 6: Status signal and history
    // -------------------------------------------------------------------------
    println!("6. Status and history...");

    let status = engine.status();
    println!("   Current status: {:?}", *status.borrow());

    for entry in engine.history() {
        println!(
            "   [{}] {:?}/{:?}: {}",
            entry.timestamp.format("%H:%M:%S"),
            entry.kind,
            entry.outcome,
            entry.message
        );
    }
    println!();

    // -------------------------------------------------------------------------
    // Step 7: Graceful shutdown
    // -------------------------------------------------------------------------
    println!("7. Shutting down...");
    engine.shutdown().await?;
    println!("   Done!");

    Ok(())
}

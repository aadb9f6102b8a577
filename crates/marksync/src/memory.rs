//! In-memory implementations of the collaborator ports.
//!
//! [`MemoryBookmarkStore`] behaves like a live bookmark store for a chosen
//! [`StoreVariant`]: it assigns transient ids, maintains parent/index fields
//! and delivers change events, including for the engine's own writes, which
//! is exactly the feedback the operation guard exists to suppress.
//! [`MemoryRemote`] is a map-backed document API with a switchable offline
//! mode for failure-path testing.
//!
//! Both are used by the integration tests; hosts embedding the engine
//! outside a browser can use them as references for real implementations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::canonical::StoreVariant;
use crate::error::{Error, Result};
use crate::store::{BookmarkEvent, BookmarkStore, RemoteDocuments};
use crate::tree::{BookmarkNode, RootFolder};

/// An in-memory bookmark tree with native root ids for a store variant.
pub struct MemoryBookmarkStore {
    root: Mutex<BookmarkNode>,
    next_id: AtomicU64,
    events: Mutex<Option<mpsc::UnboundedSender<BookmarkEvent>>>,
    variant: StoreVariant,
}

impl MemoryBookmarkStore {
    /// Create an empty tree for the given variant.
    #[must_use]
    pub fn new(variant: StoreVariant) -> Self {
        let containers = RootFolder::ALL
            .into_iter()
            .filter_map(|root| {
                variant.native_root_id(root).map(|id| {
                    let mut node = BookmarkNode::folder(native_title(root), vec![]);
                    node.id = Some(id.to_string());
                    node.parent_id = Some(variant.super_root_id().to_string());
                    node
                })
            })
            .collect();

        let mut root = BookmarkNode::folder("", containers);
        root.id = Some(variant.super_root_id().to_string());

        Self {
            root: Mutex::new(root),
            next_id: AtomicU64::new(100),
            events: Mutex::new(None),
            variant,
        }
    }

    /// The variant this store mimics.
    #[must_use]
    pub fn variant(&self) -> StoreVariant {
        self.variant
    }

    /// Seed a node without firing a change event, as if it predated the
    /// engine. Returns the assigned id.
    pub fn seed(&self, parent_id: &str, title: &str, url: Option<&str>) -> Result<String> {
        let node = self.insert(parent_id, title, url)?;
        Ok(node.id.unwrap_or_default())
    }

    fn insert(&self, parent_id: &str, title: &str, url: Option<&str>) -> Result<BookmarkNode> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let mut root = self.root.lock();
        let parent = find_mut(&mut root, parent_id)
            .ok_or_else(|| Error::store(format!("unknown parent id {parent_id}")))?;
        if !parent.is_folder() {
            return Err(Error::store(format!("parent {parent_id} is not a folder")));
        }

        let children = parent.children.get_or_insert_with(Vec::new);
        let node = BookmarkNode {
            id: Some(id),
            title: title.to_string(),
            url: url.map(str::to_string),
            children: if url.is_none() { Some(vec![]) } else { None },
            parent_id: Some(parent_id.to_string()),
            index: Some(children.len() as u32),
            date_added: Some(chrono::Utc::now().timestamp_millis()),
        };
        children.push(node.clone());
        Ok(node)
    }

    fn emit(&self, event: BookmarkEvent) {
        if let Some(tx) = self.events.lock().as_ref() {
            let _ = tx.send(event);
        }
    }
}

#[async_trait]
impl BookmarkStore for MemoryBookmarkStore {
    async fn get_tree(&self) -> Result<BookmarkNode> {
        Ok(self.root.lock().clone())
    }

    async fn get_children(&self, parent_id: &str) -> Result<Vec<BookmarkNode>> {
        let mut root = self.root.lock();
        let parent = find_mut(&mut root, parent_id)
            .ok_or_else(|| Error::store(format!("unknown parent id {parent_id}")))?;
        Ok(parent.children().to_vec())
    }

    async fn create(&self, parent_id: &str, title: &str, url: Option<&str>) -> Result<BookmarkNode> {
        let node = self.insert(parent_id, title, url)?;
        self.emit(BookmarkEvent::Created {
            id: node.id.clone().unwrap_or_default(),
        });
        Ok(node)
    }

    async fn remove_tree(&self, id: &str) -> Result<()> {
        if self.variant.is_protected_id(id) {
            return Err(Error::store(format!("cannot remove root node {id}")));
        }

        let removed = {
            let mut root = self.root.lock();
            remove_from(&mut root, id)
        };
        if !removed {
            return Err(Error::store_consistency(format!("no node with id {id}")));
        }

        self.emit(BookmarkEvent::Removed { id: id.to_string() });
        Ok(())
    }

    fn subscribe(&self, events: mpsc::UnboundedSender<BookmarkEvent>) {
        *self.events.lock() = Some(events);
    }
}

fn native_title(root: RootFolder) -> &'static str {
    match root {
        RootFolder::Toolbar => "Bookmarks Toolbar",
        RootFolder::Menu => "Bookmarks Menu",
        RootFolder::Unfiled => "Other Bookmarks",
        RootFolder::Mobile => "Mobile Bookmarks",
    }
}

fn find_mut<'a>(node: &'a mut BookmarkNode, id: &str) -> Option<&'a mut BookmarkNode> {
    if node.id.as_deref() == Some(id) {
        return Some(node);
    }
    node.children
        .as_mut()?
        .iter_mut()
        .find_map(|child| find_mut(child, id))
}

fn remove_from(node: &mut BookmarkNode, id: &str) -> bool {
    let Some(children) = node.children.as_mut() else {
        return false;
    };
    if let Some(pos) = children.iter().position(|c| c.id.as_deref() == Some(id)) {
        children.remove(pos);
        for (index, child) in children.iter_mut().enumerate() {
            child.index = Some(index as u32);
        }
        return true;
    }
    children.iter_mut().any(|child| remove_from(child, id))
}

/// A map-backed remote document API.
#[derive(Default)]
pub struct MemoryRemote {
    docs: Mutex<HashMap<String, HashMap<String, String>>>,
    offline: AtomicBool,
    latency: Mutex<std::time::Duration>,
}

impl MemoryRemote {
    /// Create an empty remote.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the remote being unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Add artificial latency to every call, for observing in-flight states.
    pub fn set_latency(&self, latency: std::time::Duration) {
        *self.latency.lock() = latency;
    }

    async fn simulate_latency(&self) {
        let delay = *self.latency.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Read a stored body directly, bypassing the offline switch.
    #[must_use]
    pub fn raw(&self, document_id: &str, file_name: &str) -> Option<String> {
        self.docs
            .lock()
            .get(document_id)
            .and_then(|files| files.get(file_name))
            .cloned()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::network("remote unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteDocuments for MemoryRemote {
    async fn get(&self, document_id: &str, file_name: &str) -> Result<Option<String>> {
        self.simulate_latency().await;
        self.check_online()?;
        Ok(self
            .raw(document_id, file_name)
            .filter(|body| !body.is_empty()))
    }

    async fn update(&self, document_id: &str, file_name: &str, content: &str) -> Result<()> {
        self.simulate_latency().await;
        self.check_online()?;
        self.docs
            .lock()
            .entry(document_id.to_string())
            .or_default()
            .insert(file_name.to_string(), content.to_string());
        Ok(())
    }
}

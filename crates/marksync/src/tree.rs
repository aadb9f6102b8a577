//! Bookmark tree data model.
//!
//! This module defines [`BookmarkNode`] (the recursive tree element shared by
//! the live store and the wire format), the four portable [`RootFolder`]
//! labels, and the [`SyncSnapshot`] payload persisted remotely.
//!
//! A node is a *leaf bookmark* iff `url` is set and `children` is absent; a
//! *folder* otherwise. The `id`, `parent_id`, `index` and `date_added` fields
//! are transient: they are assigned by the live tree store, differ between
//! browsers and sessions, and are erased during canonicalization.

use serde::{Deserialize, Serialize};

/// A single element of a bookmark tree.
///
/// Serialized with camelCase field names so snapshots are interchangeable
/// with the documents other clients of the same remote format produce.
/// Transient fields are omitted from serialization when unset, which is what
/// makes a canonicalized tree comparable by deep value equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkNode {
    /// Store-assigned node id (transient).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Display title.
    pub title: String,

    /// Target URL. Absent for folders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Ordered children. Present only for folders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<BookmarkNode>>,

    /// Store-assigned parent id (transient).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Position among siblings (transient).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,

    /// Creation time in epoch milliseconds (transient).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_added: Option<i64>,
}

impl BookmarkNode {
    /// Create a folder node with the given children.
    #[must_use]
    pub fn folder(title: impl Into<String>, children: Vec<BookmarkNode>) -> Self {
        Self {
            id: None,
            title: title.into(),
            url: None,
            children: Some(children),
            parent_id: None,
            index: None,
            date_added: None,
        }
    }

    /// Create a leaf bookmark node.
    #[must_use]
    pub fn bookmark(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            url: Some(url.into()),
            children: None,
            parent_id: None,
            index: None,
            date_added: None,
        }
    }

    /// Whether this node is a folder (no URL).
    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.url.is_none()
    }

    /// The node's children, or an empty slice for leaves.
    #[must_use]
    pub fn children(&self) -> &[BookmarkNode] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Count the leaf bookmarks in this subtree.
    #[must_use]
    pub fn bookmark_count(&self) -> usize {
        if self.is_folder() {
            self.children().iter().map(BookmarkNode::bookmark_count).sum()
        } else {
            1
        }
    }
}

/// Count the leaf bookmarks across a forest of nodes.
#[must_use]
pub fn count_bookmarks(nodes: &[BookmarkNode]) -> usize {
    nodes.iter().map(BookmarkNode::bookmark_count).sum()
}

/// The four portable root container labels.
///
/// Every bookmark store exposes the same four top-level containers under
/// different native identifiers. Canonical snapshots carry these labels as
/// the container titles so trees from different stores compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootFolder {
    /// The toolbar container.
    Toolbar,
    /// The bookmarks-menu container.
    Menu,
    /// The unfiled ("other bookmarks") container.
    Unfiled,
    /// The mobile-device container.
    Mobile,
}

impl RootFolder {
    /// All four containers, in canonical order.
    pub const ALL: [RootFolder; 4] = [
        RootFolder::Toolbar,
        RootFolder::Menu,
        RootFolder::Unfiled,
        RootFolder::Mobile,
    ];

    /// The portable label used as the container title in canonical snapshots.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            RootFolder::Toolbar => "ToolbarFolder",
            RootFolder::Menu => "MenuFolder",
            RootFolder::Unfiled => "UnfiledFolder",
            RootFolder::Mobile => "MobileFolder",
        }
    }

    /// Parse a portable label back into a container.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "ToolbarFolder" => Some(RootFolder::Toolbar),
            "MenuFolder" => Some(RootFolder::Menu),
            "UnfiledFolder" => Some(RootFolder::Unfiled),
            "MobileFolder" => Some(RootFolder::Mobile),
            _ => None,
        }
    }
}

/// The wire payload persisted as the remote document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    /// Version of the client that produced the snapshot.
    pub version: String,
    /// Creation time in epoch milliseconds.
    pub create_date: i64,
    /// Children of the canonical super-root: the four labelled containers.
    pub bookmarks: Vec<BookmarkNode>,
    /// Which browser family produced the snapshot.
    pub source_browser: String,
}

impl SyncSnapshot {
    /// Build a snapshot around canonical root containers, stamped now.
    #[must_use]
    pub fn new(bookmarks: Vec<BookmarkNode>, source_browser: impl Into<String>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            create_date: chrono::Utc::now().timestamp_millis(),
            bookmarks,
            source_browser: source_browser.into(),
        }
    }

    /// Count the leaf bookmarks in the snapshot.
    #[must_use]
    pub fn bookmark_count(&self) -> usize {
        count_bookmarks(&self.bookmarks)
    }
}

//! Collaborator ports: the live bookmark store and the remote document API.
//!
//! The engine never talks to a browser or a network directly; it drives these
//! two traits. Hosts provide implementations backed by the real bookmark
//! store and the real document service, and [`crate::memory`] provides
//! in-memory reference implementations.
//!
//! Store change events flow through a single unbounded channel installed
//! with [`BookmarkStore::subscribe`]; the engine funnels every event through
//! the operation guard before reacting, and no other component listens.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::tree::BookmarkNode;

/// A change observed in the live bookmark store.
///
/// Carries the id of the affected node; the engine re-reads whatever else it
/// needs, so no further payload is required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookmarkEvent {
    /// A node was created.
    Created {
        /// Id of the new node.
        id: String,
    },
    /// A node's title or url changed.
    Changed {
        /// Id of the changed node.
        id: String,
    },
    /// A node moved to a new parent or position.
    Moved {
        /// Id of the moved node.
        id: String,
    },
    /// A node was removed.
    Removed {
        /// Id of the removed node.
        id: String,
    },
}

impl BookmarkEvent {
    /// Id of the affected node.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Created { id } | Self::Changed { id } | Self::Moved { id } | Self::Removed { id } => id,
        }
    }
}

/// The live bookmark tree store.
#[async_trait]
pub trait BookmarkStore: Send + Sync {
    /// Read the whole tree, rooted at the store's super-root.
    async fn get_tree(&self) -> Result<BookmarkNode>;

    /// Read the direct children of a node.
    async fn get_children(&self, parent_id: &str) -> Result<Vec<BookmarkNode>>;

    /// Create a node under a parent. A `url` of `None` creates a folder.
    ///
    /// Returns the created node with its store-assigned id.
    async fn create(&self, parent_id: &str, title: &str, url: Option<&str>) -> Result<BookmarkNode>;

    /// Remove a node and its entire subtree.
    ///
    /// Fails with [`crate::Error::StoreConsistency`] when the id is unknown,
    /// which callers removing overlapping sets must tolerate.
    async fn remove_tree(&self, id: &str) -> Result<()>;

    /// Install the change-event channel.
    ///
    /// The store delivers every subsequent create/change/move/remove on this
    /// sender. Installing a new sender replaces the previous one.
    fn subscribe(&self, events: mpsc::UnboundedSender<BookmarkEvent>);
}

/// The remote key-value document API holding the sync snapshot.
///
/// One logical file per sync target; transport details are the host's
/// concern.
#[async_trait]
pub trait RemoteDocuments: Send + Sync {
    /// Fetch the raw body of the named file, or `None` when absent/empty.
    async fn get(&self, document_id: &str, file_name: &str) -> Result<Option<String>>;

    /// Write the raw body of the named file.
    async fn update(&self, document_id: &str, file_name: &str, content: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_accessor() {
        let ev = BookmarkEvent::Created { id: "42".to_string() };
        assert_eq!(ev.id(), "42");
        let ev = BookmarkEvent::Removed { id: "7".to_string() };
        assert_eq!(ev.id(), "7");
    }
}

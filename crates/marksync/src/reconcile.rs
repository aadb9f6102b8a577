//! Reconciliation: applying a canonical snapshot onto a live tree.
//!
//! Two modes exist. [`merge`] is additive: remote nodes are created top-down
//! under the matching native root containers, reusing nodes that are already
//! present so a repeated merge creates no duplicates. [`clear`] is
//! destructive: it removes local content under the root containers, subject
//! to the folder selection's exclusion list, so a recreate can follow.
//!
//! Both operate through the [`BookmarkStore`] port only. Tree inspection is
//! done on owned snapshots of the tree; the store is mutated through
//! explicit create/remove calls, never through shared references.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use tracing::{debug, warn};

use crate::canonical::StoreVariant;
use crate::error::{Error, Result};
use crate::filter::FolderSelection;
use crate::store::BookmarkStore;
use crate::tree::{BookmarkNode, RootFolder};

/// Counters from a merge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Folders created.
    pub created_folders: usize,
    /// Bookmarks created.
    pub created_bookmarks: usize,
    /// Nodes that were already present and reused.
    pub reused: usize,
}

impl MergeStats {
    /// Total nodes created.
    #[must_use]
    pub fn created(&self) -> usize {
        self.created_folders + self.created_bookmarks
    }
}

impl std::ops::AddAssign for MergeStats {
    fn add_assign(&mut self, other: Self) {
        self.created_folders += other.created_folders;
        self.created_bookmarks += other.created_bookmarks;
        self.reused += other.reused;
    }
}

/// Merge canonical root containers onto the live tree.
///
/// Containers whose label the detected variant cannot address (a remote
/// unfiled subtree on a Chromium-style store) are skipped with a warning;
/// the rest of the merge proceeds.
pub async fn merge(
    store: &dyn BookmarkStore,
    variant: StoreVariant,
    remote_roots: &[BookmarkNode],
) -> Result<MergeStats> {
    let mut stats = MergeStats::default();
    for container in remote_roots {
        let Some(root) = RootFolder::from_label(&container.title) else {
            warn!(title = %container.title, "Skipping unrecognized root container");
            continue;
        };
        let Some(native_id) = variant.native_root_id(root) else {
            warn!(
                container = root.label(),
                "Store variant has no matching native container, skipping subtree"
            );
            continue;
        };
        stats += merge_children(store, native_id.to_string(), container.children()).await?;
    }
    debug!(
        created_folders = stats.created_folders,
        created_bookmarks = stats.created_bookmarks,
        reused = stats.reused,
        "Merge completed"
    );
    Ok(stats)
}

/// Merge nodes under one parent, recursing into folders.
///
/// A folder is already-present when a direct child folder shares its title;
/// a bookmark when a direct child shares both URL and title. Only truly new
/// nodes are created, which makes the merge idempotent.
fn merge_children<'a>(
    store: &'a dyn BookmarkStore,
    parent_id: String,
    nodes: &'a [BookmarkNode],
) -> Pin<Box<dyn Future<Output = Result<MergeStats>> + Send + 'a>> {
    Box::pin(async move {
        let mut stats = MergeStats::default();
        if nodes.is_empty() {
            return Ok(stats);
        }

        // Known direct children: (title, url, id). Extended as we create so
        // duplicates within the remote payload itself collapse too.
        let mut present: Vec<(String, Option<String>, Option<String>)> = store
            .get_children(&parent_id)
            .await?
            .into_iter()
            .map(|child| (child.title, child.url, child.id))
            .collect();

        for node in nodes {
            if node.is_folder() {
                let existing_id = present
                    .iter()
                    .find(|(title, url, _)| url.is_none() && *title == node.title)
                    .and_then(|(_, _, id)| id.clone());

                let target_id = match existing_id {
                    Some(id) => {
                        stats.reused += 1;
                        id
                    }
                    None => {
                        let created = store.create(&parent_id, &node.title, None).await?;
                        let id = created
                            .id
                            .ok_or_else(|| Error::store("store returned a folder without an id"))?;
                        present.push((node.title.clone(), None, Some(id.clone())));
                        stats.created_folders += 1;
                        id
                    }
                };

                stats += merge_children(store, target_id, node.children()).await?;
            } else {
                let already = present.iter().any(|(title, url, _)| {
                    url.as_deref() == node.url.as_deref() && *title == node.title
                });
                if already {
                    stats.reused += 1;
                    continue;
                }
                let created = store
                    .create(&parent_id, &node.title, node.url.as_deref())
                    .await?;
                present.push((node.title.clone(), node.url.clone(), created.id));
                stats.created_bookmarks += 1;
            }
        }

        Ok(stats)
    })
}

/// Remove local content under the root containers.
///
/// With a configured selection, everything not protected by the exclusion
/// list is removed while excluded folders keep their entire subtrees. With
/// no selection at all, every child of every root container is removed.
/// The super-root and the root containers themselves are never deleted.
///
/// Returns the number of subtrees removed.
pub async fn clear(
    store: &dyn BookmarkStore,
    variant: StoreVariant,
    selection: &FolderSelection,
) -> Result<usize> {
    let tree = store.get_tree().await?;

    let mut targets = Vec::new();
    if selection.is_configured() {
        for container in tree.children() {
            collect_unprotected(container, &selection.excluded_ids, &mut targets);
        }
    } else {
        for container in tree.children() {
            for child in container.children() {
                if let Some(id) = &child.id {
                    targets.push(id.clone());
                }
            }
        }
    }

    // Deleting a subtree root already removes its descendants.
    let targets = drop_nested_targets(&tree, targets);

    let mut removed = 0;
    for id in targets {
        if variant.is_protected_id(&id) {
            warn!(id = %id, "Refusing to remove a root node");
            continue;
        }
        match store.remove_tree(&id).await {
            Ok(()) => removed += 1,
            Err(Error::StoreConsistency(msg)) => {
                debug!(id = %id, reason = %msg, "Removal target already gone, skipping");
            }
            Err(e) => return Err(e),
        }
    }

    debug!(removed, "Clear completed");
    Ok(removed)
}

/// Collect removal targets under `node`, leaving excluded subtrees alone.
///
/// A folder that contains an excluded descendant cannot be removed wholesale;
/// its shell is kept and only its unprotected children become targets.
fn collect_unprotected(node: &BookmarkNode, excluded: &HashSet<String>, out: &mut Vec<String>) {
    for child in node.children() {
        let Some(id) = &child.id else { continue };
        if excluded.contains(id) {
            continue;
        }
        if child.is_folder() && subtree_has_excluded(child, excluded) {
            collect_unprotected(child, excluded, out);
        } else {
            out.push(id.clone());
        }
    }
}

fn subtree_has_excluded(node: &BookmarkNode, excluded: &HashSet<String>) -> bool {
    node.children().iter().any(|child| {
        child.id.as_ref().is_some_and(|id| excluded.contains(id))
            || subtree_has_excluded(child, excluded)
    })
}

/// Drop targets whose ancestor is also slated for removal, preserving order.
fn drop_nested_targets(tree: &BookmarkNode, targets: Vec<String>) -> Vec<String> {
    let target_set: HashSet<&str> = targets.iter().map(String::as_str).collect();
    let mut redundant = HashSet::new();
    mark_redundant(tree, &target_set, false, &mut redundant);
    targets
        .into_iter()
        .filter(|id| !redundant.contains(id))
        .collect()
}

fn mark_redundant(
    node: &BookmarkNode,
    targets: &HashSet<&str>,
    ancestor_targeted: bool,
    redundant: &mut HashSet<String>,
) {
    for child in node.children() {
        let targeted = child.id.as_ref().is_some_and(|id| targets.contains(id.as_str()));
        if targeted && ancestor_targeted {
            if let Some(id) = &child.id {
                redundant.insert(id.clone());
            }
        }
        mark_redundant(child, targets, ancestor_targeted || targeted, redundant);
    }
}

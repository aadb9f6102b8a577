//! Folder selection filtering.
//!
//! Users can limit sync to a chosen subset of folders. The selection is kept
//! as a set of live-tree folder ids; since those ids are not stable across
//! destroy/recreate cycles, the excluded complement is recomputed from the
//! current tree on every load rather than trusted from disk.
//!
//! An empty selection means "no filtering": everything is uploaded. This is a
//! deliberate safety default so an empty or corrupted selection can never
//! silently empty an upload.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::canonical::StoreVariant;
use crate::tree::BookmarkNode;

/// The user's folder selection, persisted across sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderSelection {
    /// Folder ids the user wants included.
    #[serde(rename = "selectedFolderIds", default)]
    pub selected_ids: HashSet<String>,
    /// Complement of the selection over the current tree, recomputed on load.
    #[serde(rename = "excludedFolderIds", default)]
    pub excluded_ids: HashSet<String>,
}

impl FolderSelection {
    /// Whether any selection is configured at all.
    ///
    /// An unconfigured selection makes filtering a no-op and makes
    /// clear/prune fall back to a full clear.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.selected_ids.is_empty() || !self.excluded_ids.is_empty()
    }

    /// Recompute the excluded set against the current live tree.
    ///
    /// Selecting a folder implies all of its descendant folders; the excluded
    /// set is every other non-root folder id in the tree. With nothing
    /// selected the excluded set is empty.
    pub fn recompute_excluded(&mut self, super_root: &BookmarkNode, variant: StoreVariant) {
        self.excluded_ids = if self.selected_ids.is_empty() {
            HashSet::new()
        } else {
            let included = expand_selection(super_root, &self.selected_ids);
            let mut excluded = collect_folder_ids(super_root, variant);
            excluded.retain(|id| !included.contains(id));
            excluded
        };
    }
}

/// All filterable folder ids in the tree: every folder except the super-root
/// and the root containers.
#[must_use]
pub fn collect_folder_ids(super_root: &BookmarkNode, variant: StoreVariant) -> HashSet<String> {
    let mut ids = HashSet::new();
    walk_folders(super_root, &mut |node| {
        if let Some(id) = &node.id {
            if !variant.is_protected_id(id) {
                ids.insert(id.clone());
            }
        }
    });
    ids
}

/// Prune a live tree to the selected folders.
///
/// The super-root and the root containers are always included. Any folder in
/// the excluded complement is dropped along with its entire subtree; other
/// folders are kept with their children recursively re-filtered, preserving
/// sibling order. Leaf bookmarks are only removed as part of a dropped
/// folder's subtree.
#[must_use]
pub fn filter_tree(
    super_root: &BookmarkNode,
    selected_ids: &HashSet<String>,
    variant: StoreVariant,
) -> BookmarkNode {
    if selected_ids.is_empty() {
        return super_root.clone();
    }

    let included = expand_selection(super_root, selected_ids);
    let mut excluded = collect_folder_ids(super_root, variant);
    excluded.retain(|id| !included.contains(id));

    // The super-root is protected, so it can never be in the excluded set.
    retain_node(super_root, &excluded).unwrap_or_else(|| super_root.clone())
}

/// Expand a selection downward: a selected folder includes every descendant
/// folder.
fn expand_selection(super_root: &BookmarkNode, selected_ids: &HashSet<String>) -> HashSet<String> {
    let mut included = HashSet::new();
    expand_into(super_root, selected_ids, false, &mut included);
    included
}

fn expand_into(
    node: &BookmarkNode,
    selected_ids: &HashSet<String>,
    under_selected: bool,
    included: &mut HashSet<String>,
) {
    for child in node.children() {
        if !child.is_folder() {
            continue;
        }
        let hit = under_selected
            || child
                .id
                .as_ref()
                .is_some_and(|id| selected_ids.contains(id));
        if hit {
            if let Some(id) = &child.id {
                included.insert(id.clone());
            }
        }
        expand_into(child, selected_ids, hit, included);
    }
}

fn retain_node(node: &BookmarkNode, excluded: &HashSet<String>) -> Option<BookmarkNode> {
    if node.is_folder() {
        if node.id.as_ref().is_some_and(|id| excluded.contains(id)) {
            return None;
        }
        let mut kept = node.clone();
        kept.children = node.children.as_ref().map(|children| {
            children
                .iter()
                .filter_map(|child| retain_node(child, excluded))
                .collect()
        });
        Some(kept)
    } else {
        Some(node.clone())
    }
}

fn walk_folders(node: &BookmarkNode, visit: &mut impl FnMut(&BookmarkNode)) {
    if node.is_folder() {
        visit(node);
        for child in node.children() {
            walk_folders(child, visit);
        }
    }
}

//! Tree canonicalization.
//!
//! A live bookmark tree is full of store-assigned identifiers that differ
//! between browser families and between sessions of the same browser. The
//! canonicalizer turns such a tree into a browser-agnostic snapshot that can
//! be compared by deep value equality:
//!
//! - all transient fields (`id`, `parent_id`, `index`, `date_added`) are
//!   erased recursively,
//! - the immediate children of the super-root are renamed to the four
//!   portable [`RootFolder`] labels and emitted in canonical order.
//!
//! Native root identifiers are not portable (Gecko-style stores use fixed
//! string ids, Chromium-style stores use small numeric ids), so the mapping
//! lives in an explicit per-variant lookup table here and nowhere else.
//!
//! [`canonicalize`] is a pure function: no I/O, deterministic, and idempotent
//! (an already-canonical tree maps to itself).

use crate::error::{Error, Result};
use crate::tree::{BookmarkNode, RootFolder};

/// Gecko-style fixed super-root id.
const GECKO_SUPER_ROOT_ID: &str = "root________";
/// Chromium-style numeric super-root id.
const CHROMIUM_SUPER_ROOT_ID: &str = "0";

/// Which family of bookmark store produced a tree.
///
/// Detected once per session by inspecting the super-root's own id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreVariant {
    /// Fixed string root ids (`toolbar_____`, `menu________`, ...).
    Gecko,
    /// Small numeric root ids (`"1"`, `"2"`, `"3"`), no unfiled container.
    Chromium,
}

impl StoreVariant {
    /// Detect the variant from the super-root node of a live tree.
    ///
    /// An unrecognized super-root id falls back to [`StoreVariant::Chromium`],
    /// which is the scheme used by every store without fixed string ids.
    #[must_use]
    pub fn detect(super_root: &BookmarkNode) -> Self {
        match super_root.id.as_deref() {
            Some(GECKO_SUPER_ROOT_ID) => StoreVariant::Gecko,
            _ => StoreVariant::Chromium,
        }
    }

    /// Short name recorded in the wire payload's `sourceBrowser` field.
    #[must_use]
    pub fn source_name(self) -> &'static str {
        match self {
            StoreVariant::Gecko => "gecko",
            StoreVariant::Chromium => "chromium",
        }
    }

    /// The super-root's own native id for this variant.
    #[must_use]
    pub fn super_root_id(self) -> &'static str {
        match self {
            StoreVariant::Gecko => GECKO_SUPER_ROOT_ID,
            StoreVariant::Chromium => CHROMIUM_SUPER_ROOT_ID,
        }
    }

    /// Native id of a root container, or `None` when the variant lacks it.
    ///
    /// Chromium-style stores have no unfiled container.
    #[must_use]
    pub fn native_root_id(self, root: RootFolder) -> Option<&'static str> {
        match (self, root) {
            (StoreVariant::Gecko, RootFolder::Toolbar) => Some("toolbar_____"),
            (StoreVariant::Gecko, RootFolder::Menu) => Some("menu________"),
            (StoreVariant::Gecko, RootFolder::Unfiled) => Some("unfiled_____"),
            (StoreVariant::Gecko, RootFolder::Mobile) => Some("mobile______"),
            (StoreVariant::Chromium, RootFolder::Toolbar) => Some("1"),
            (StoreVariant::Chromium, RootFolder::Menu) => Some("2"),
            (StoreVariant::Chromium, RootFolder::Unfiled) => None,
            (StoreVariant::Chromium, RootFolder::Mobile) => Some("3"),
        }
    }

    /// Reverse lookup: which container does a native id belong to.
    #[must_use]
    pub fn root_from_native_id(self, id: &str) -> Option<RootFolder> {
        RootFolder::ALL
            .into_iter()
            .find(|root| self.native_root_id(*root) == Some(id))
    }

    /// Whether an id names the super-root or one of the root containers.
    ///
    /// These nodes must never be deleted.
    #[must_use]
    pub fn is_protected_id(self, id: &str) -> bool {
        id == self.super_root_id() || self.root_from_native_id(id).is_some()
    }
}

/// Canonicalize a live tree rooted at the store's super-root.
///
/// The result is a folder whose children are the recognized root containers,
/// renamed to their portable labels and ordered canonically. Children of the
/// super-root that match neither a native root id nor a portable label are
/// dropped; real stores never produce them and they cannot be addressed on
/// another store.
#[must_use]
pub fn canonicalize(super_root: &BookmarkNode, variant: StoreVariant) -> BookmarkNode {
    BookmarkNode::folder("root", canonical_children(super_root, variant))
}

/// The canonical root containers of a live tree, in canonical order.
///
/// This is the `bookmarks` field of a wire snapshot.
#[must_use]
pub fn canonical_children(super_root: &BookmarkNode, variant: StoreVariant) -> Vec<BookmarkNode> {
    let mut containers = Vec::with_capacity(RootFolder::ALL.len());
    for root in RootFolder::ALL {
        if let Some(container) = find_container(super_root, variant, root) {
            let mut stripped = strip(container);
            stripped.title = root.label().to_string();
            containers.push(stripped);
        }
    }
    containers
}

/// Serialize canonical containers for structural comparison and tracking.
///
/// Two trees are structurally equal iff their serialized forms are equal.
pub fn serialize_structure(containers: &[BookmarkNode]) -> Result<String> {
    serde_json::to_string(containers)
        .map_err(|e| Error::serialization(format!("structure encode failed: {e}")))
}

fn find_container<'a>(
    super_root: &'a BookmarkNode,
    variant: StoreVariant,
    root: RootFolder,
) -> Option<&'a BookmarkNode> {
    super_root.children().iter().find(|child| {
        match child.id.as_deref() {
            Some(id) => variant.root_from_native_id(id) == Some(root),
            // Already-canonical trees carry no ids; match on the label.
            None => RootFolder::from_label(&child.title) == Some(root),
        }
    })
}

/// Erase transient fields recursively, preserving sibling order.
fn strip(node: &BookmarkNode) -> BookmarkNode {
    BookmarkNode {
        id: None,
        title: node.title.clone(),
        url: node.url.clone(),
        children: node
            .children
            .as_ref()
            .map(|children| children.iter().map(strip).collect()),
        parent_id: None,
        index: None,
        date_added: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_node(id: &str, title: &str, url: Option<&str>, children: Option<Vec<BookmarkNode>>) -> BookmarkNode {
        BookmarkNode {
            id: Some(id.to_string()),
            title: title.to_string(),
            url: url.map(str::to_string),
            children,
            parent_id: Some("parent".to_string()),
            index: Some(0),
            date_added: Some(1_700_000_000_000),
        }
    }

    fn gecko_tree() -> BookmarkNode {
        live_node(
            "root________",
            "",
            None,
            Some(vec![
                live_node(
                    "menu________",
                    "Bookmarks Menu",
                    None,
                    Some(vec![live_node("11", "Docs", Some("https://doc.rust-lang.org/"), None)]),
                ),
                live_node(
                    "toolbar_____",
                    "Bookmarks Toolbar",
                    None,
                    Some(vec![live_node("12", "Crates", Some("https://crates.io/"), None)]),
                ),
                live_node("unfiled_____", "Other Bookmarks", None, Some(vec![])),
                live_node("mobile______", "Mobile Bookmarks", None, Some(vec![])),
            ]),
        )
    }

    fn chromium_tree() -> BookmarkNode {
        live_node(
            "0",
            "",
            None,
            Some(vec![
                live_node(
                    "1",
                    "Bookmarks bar",
                    None,
                    Some(vec![live_node("21", "Crates", Some("https://crates.io/"), None)]),
                ),
                live_node(
                    "2",
                    "Other bookmarks",
                    None,
                    Some(vec![live_node("22", "Docs", Some("https://doc.rust-lang.org/"), None)]),
                ),
                live_node("3", "Mobile bookmarks", None, Some(vec![])),
            ]),
        )
    }

    #[test]
    fn test_variant_detection() {
        assert_eq!(StoreVariant::detect(&gecko_tree()), StoreVariant::Gecko);
        assert_eq!(StoreVariant::detect(&chromium_tree()), StoreVariant::Chromium);
    }

    #[test]
    fn test_canonicalize_strips_transient_fields() {
        let canonical = canonicalize(&gecko_tree(), StoreVariant::Gecko);
        fn assert_stripped(node: &BookmarkNode) {
            assert!(node.id.is_none());
            assert!(node.parent_id.is_none());
            assert!(node.index.is_none());
            assert!(node.date_added.is_none());
            for child in node.children() {
                assert_stripped(child);
            }
        }
        assert_stripped(&canonical);
    }

    #[test]
    fn test_canonicalize_renames_and_orders_roots() {
        let containers = canonical_children(&gecko_tree(), StoreVariant::Gecko);
        let titles: Vec<&str> = containers.iter().map(|c| c.title.as_str()).collect();
        // Gecko enumerates menu before toolbar; canonical order fixes it.
        assert_eq!(
            titles,
            vec!["ToolbarFolder", "MenuFolder", "UnfiledFolder", "MobileFolder"]
        );
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        let once = canonicalize(&gecko_tree(), StoreVariant::Gecko);
        let twice = canonicalize(&once, StoreVariant::Gecko);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_same_content_from_different_stores_compares_equal() {
        let gecko = canonical_children(&gecko_tree(), StoreVariant::Gecko);
        let chromium = canonical_children(&chromium_tree(), StoreVariant::Chromium);

        // Same toolbar and menu content; Chromium has no unfiled/mobile is empty.
        assert_eq!(gecko[0], chromium[0]);
        assert_eq!(gecko[1], chromium[1]);
    }

    #[test]
    fn test_structure_serialization_is_order_sensitive() {
        let a = vec![BookmarkNode::folder(
            "ToolbarFolder",
            vec![
                BookmarkNode::bookmark("a", "https://a.example/"),
                BookmarkNode::bookmark("b", "https://b.example/"),
            ],
        )];
        let mut b = a.clone();
        b[0].children.as_mut().unwrap().reverse();

        assert_ne!(
            serialize_structure(&a).unwrap(),
            serialize_structure(&b).unwrap()
        );
    }

    #[test]
    fn test_protected_ids() {
        assert!(StoreVariant::Gecko.is_protected_id("root________"));
        assert!(StoreVariant::Gecko.is_protected_id("toolbar_____"));
        assert!(!StoreVariant::Gecko.is_protected_id("42"));
        assert!(StoreVariant::Chromium.is_protected_id("0"));
        assert!(StoreVariant::Chromium.is_protected_id("2"));
        assert!(!StoreVariant::Chromium.is_protected_id("99"));
    }
}

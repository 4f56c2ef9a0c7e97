//! Client-side view state: current folder, listings and breadcrumbs.

use drivegate_common::{FileEntry, FolderListing, FolderNode};

/// Label of the root folder when it has no name.
pub const ROOT_LABEL: &str = "Main folder";
/// Label of any other folder without a name.
pub const UNTITLED_LABEL: &str = "Untitled";

/// One visited folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breadcrumb {
    pub id: String,
    pub name: String,
}

/// Folders in the order they were visited.
///
/// The trail follows navigation, not the real folder hierarchy. Revisiting
/// a folder cuts everything after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreadcrumbTrail {
    entries: Vec<Breadcrumb>,
}

impl BreadcrumbTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a visit to folder `id`.
    ///
    /// # Postconditions
    /// - The last entry is `id` with label `name`
    /// - No entry after a previous occurrence of `id` survives
    pub fn visit(&mut self, id: &str, name: &str) {
        match self.entries.iter().position(|crumb| crumb.id == id) {
            Some(index) => {
                self.entries.truncate(index + 1);
                self.entries[index].name = name.to_string();
            }
            None => self.entries.push(Breadcrumb {
                id: id.to_string(),
                name: name.to_string(),
            }),
        }
    }

    pub fn entries(&self) -> &[Breadcrumb] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&Breadcrumb> {
        self.entries.get(index)
    }

    pub fn last(&self) -> Option<&Breadcrumb> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Names joined for display.
    pub fn path(&self) -> String {
        self.entries
            .iter()
            .map(|crumb| crumb.name.as_str())
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

/// Display label of a folder in the breadcrumb trail.
pub fn breadcrumb_label(folder: &FolderNode, root_folder_id: &str) -> String {
    if !folder.name.is_empty() {
        folder.name.clone()
    } else if folder.id == root_folder_id {
        ROOT_LABEL.to_string()
    } else {
        UNTITLED_LABEL.to_string()
    }
}

/// Everything shown for the current folder.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub current_folder: Option<FolderNode>,
    pub root_folder_id: Option<String>,
    pub folders: Vec<FolderNode>,
    pub files: Vec<FileEntry>,
    pub breadcrumbs: BreadcrumbTrail,
}

impl ViewState {
    /// Id of the folder on display.
    pub fn current_id(&self) -> Option<&str> {
        self.current_folder.as_ref().map(|f| f.id.as_str())
    }

    /// Replace the view with a freshly loaded folder.
    pub fn commit(&mut self, listing: FolderListing, files: Vec<FileEntry>) {
        let label = breadcrumb_label(&listing.current_folder, &listing.root_folder_id);
        self.breadcrumbs.visit(&listing.current_folder.id, &label);

        self.current_folder = Some(listing.current_folder);
        self.root_folder_id = Some(listing.root_folder_id);
        self.folders = listing.folders;
        self.files = files;
    }

    /// Put an uploaded file at the front of the listing if it went into
    /// the folder on display. Returns whether it was added.
    pub fn splice_upload(&mut self, folder_id: Option<&str>, file: FileEntry) -> bool {
        match (folder_id, self.current_id()) {
            (Some(target), Some(current)) if target == current => {
                self.files.insert(0, file);
                true
            }
            _ => false,
        }
    }

    /// Folder in the current listing matching an id or a name.
    pub fn find_folder(&self, key: &str) -> Option<&FolderNode> {
        self.folders
            .iter()
            .find(|f| f.id == key)
            .or_else(|| self.folders.iter().find(|f| f.name == key))
    }

    /// File in the current listing matching an id or a name.
    pub fn find_file(&self, key: &str) -> Option<&FileEntry> {
        self.files
            .iter()
            .find(|f| f.id == key)
            .or_else(|| self.files.iter().find(|f| f.name == key))
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn trail(ids: &[&str]) -> BreadcrumbTrail {
        let mut trail = BreadcrumbTrail::new();
        for id in ids {
            trail.visit(id, &id.to_uppercase());
        }
        trail
    }

    fn ids(trail: &BreadcrumbTrail) -> Vec<&str> {
        trail.entries().iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_truncate_on_revisit() {
        let mut t = trail(&["root", "a", "b"]);
        t.visit("a", "A renamed");

        assert_eq!(ids(&t), vec!["root", "a"]);
        assert_eq!(t.last().unwrap().name, "A renamed");
    }

    #[test]
    fn test_grow_on_new_folder() {
        let mut t = trail(&["root", "a"]);
        t.visit("c", "C");
        assert_eq!(ids(&t), vec!["root", "a", "c"]);
    }

    #[test]
    fn test_revisit_current_only_relabels() {
        let mut t = trail(&["root", "a"]);
        t.visit("a", "Again");
        assert_eq!(ids(&t), vec!["root", "a"]);
        assert_eq!(t.path(), "ROOT / Again");
    }

    #[test]
    fn test_labels() {
        let named = FolderNode::new("x", "Docs");
        let nameless_root = FolderNode::new("root", "");
        let nameless = FolderNode::new("y", "");

        assert_eq!(breadcrumb_label(&named, "root"), "Docs");
        assert_eq!(breadcrumb_label(&nameless_root, "root"), ROOT_LABEL);
        assert_eq!(breadcrumb_label(&nameless, "root"), UNTITLED_LABEL);
    }

    #[test]
    fn test_commit_and_splice() {
        let mut view = ViewState::default();
        view.commit(
            FolderListing {
                current_folder: FolderNode::new("root", ""),
                folders: vec![FolderNode::new("a", "A")],
                root_folder_id: "root".to_string(),
            },
            Vec::new(),
        );
        assert_eq!(view.breadcrumbs.last().unwrap().name, ROOT_LABEL);
        assert_eq!(view.find_folder("A").unwrap().id, "a");

        let file: FileEntry = serde_json::from_str(r#"{"id": "f", "name": "new.txt"}"#).unwrap();
        assert!(!view.splice_upload(Some("elsewhere"), file.clone()));
        assert!(!view.splice_upload(None, file.clone()));
        assert!(view.splice_upload(Some("root"), file));
        assert_eq!(view.files[0].id, "f");

        view.reset();
        assert!(view.current_id().is_none());
        assert!(view.breadcrumbs.is_empty());
    }

    proptest! {
        #[test]
        fn test_trail_invariants(visits in proptest::collection::vec(0u8..6, 1..40)) {
            let mut t = BreadcrumbTrail::new();
            for v in &visits {
                let id = format!("f{}", v);
                t.visit(&id, &id);

                // Last entry is the folder just visited
                prop_assert_eq!(&t.last().unwrap().id, &id);
            }

            // No duplicates
            let mut seen = std::collections::HashSet::new();
            for crumb in t.entries() {
                prop_assert!(seen.insert(crumb.id.clone()));
            }
        }

        #[test]
        fn test_revisit_is_prefix(visits in proptest::collection::vec(0u8..6, 1..30), pick in any::<prop::sample::Index>()) {
            let mut t = BreadcrumbTrail::new();
            for v in &visits {
                let id = format!("f{}", v);
                t.visit(&id, &id);
            }

            let before = t.clone();
            let index = pick.index(before.len());
            let target = before.get(index).unwrap().id.clone();
            t.visit(&target, "label");

            prop_assert_eq!(t.len(), index + 1);
            prop_assert_eq!(&t.entries()[..index], &before.entries()[..index]);
        }
    }
}

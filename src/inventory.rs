//! # Inventory Module
//!
//! Foresta in memoria delle root trascinate dall'utente, con rollup sempre consistenti.
//!
//! ## Responsabilità:
//! - Inserimento idempotente di nuove root (dedup per path)
//! - Rimozione di qualsiasi nodo per identità con ricalcolo incrementale degli antenati
//! - Pruning ricorsivo delle cartelle rimaste senza figli
//! - Derivazione della lista piatta di task `{path, root}` da inviare all'engine
//!
//! ## Strutture dati:
//! - Arena di nodi (`NodeId` → slot) con indice del padre per ogni nodo
//! - Indice `path → NodeId`: il path è l'identità, unica in tutta la foresta
//! - Sequenza ordinata delle root (l'ordine di inserimento è l'unico ordine significativo)
//!
//! ## Esempio:
//! ```ignore
//! let mut inventory = Inventory::new();
//! inventory.add_roots(outcome.roots);
//! inventory.remove_by_id(Path::new("/photos/sub/b.png"));
//! let tasks = inventory.flatten_to_tasks();
//! ```

use crate::{job::payload::FileTask, tree::Entry};
use std::collections::{HashMap, HashSet};
use std::ops::{Index, IndexMut};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Slot index of a node inside the inventory arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A file or folder held by the inventory
#[derive(Debug, Clone)]
pub struct InventoryNode {
    path: PathBuf,
    name: String,
    size: u64,
    file_count: u64,
    is_dir: bool,
    expanded: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl InventoryNode {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn file_count(&self) -> u64 {
        self.file_count
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }
}

/// Node storage with reusable slots
#[derive(Debug, Default)]
struct Arena {
    slots: Vec<Option<InventoryNode>>,
    free: Vec<NodeId>,
}

impl Arena {
    fn insert(&mut self, node: InventoryNode) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.slots[id.index()] = Some(node);
                id
            }
            None => {
                self.slots.push(Some(node));
                NodeId((self.slots.len() - 1) as u32)
            }
        }
    }

    fn release(&mut self, id: NodeId) -> Option<InventoryNode> {
        let node = self.slots.get_mut(id.index())?.take();
        if node.is_some() {
            self.free.push(id);
        }
        node
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}

impl Index<NodeId> for Arena {
    type Output = InventoryNode;

    fn index(&self, id: NodeId) -> &InventoryNode {
        match self.slots.get(id.index()) {
            Some(Some(node)) => node,
            _ => panic!("inventory node {:?} is not live", id),
        }
    }
}

impl IndexMut<NodeId> for Arena {
    fn index_mut(&mut self, id: NodeId) -> &mut InventoryNode {
        match self.slots.get_mut(id.index()) {
            Some(Some(node)) => node,
            _ => panic!("inventory node {:?} is not live", id),
        }
    }
}

/// Deduplicated forest of scanned roots
#[derive(Debug, Default)]
pub struct Inventory {
    arena: Arena,
    index: HashMap<PathBuf, NodeId>,
    roots: Vec<NodeId>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append new roots, skipping paths already present. Returns how many roots were added.
    ///
    /// A new root whose subtree contains existing roots replaces them, so every path
    /// stays unique across the forest.
    pub fn add_roots<I: IntoIterator<Item = Entry>>(&mut self, new_roots: I) -> usize {
        let mut added = 0;

        for root in new_roots {
            if let Some(&existing) = self.index.get(root.path()) {
                if self.arena[existing].parent.is_none() {
                    debug!("Root already present, skipping: {}", root.path().display());
                } else {
                    debug!("Path already inside another root, skipping: {}", root.path().display());
                }
                continue;
            }

            let mut new_paths = HashSet::new();
            root.walk(&mut |entry| {
                new_paths.insert(entry.path().to_path_buf());
            });

            let mut absorbed = Vec::new();
            let mut conflict = false;
            for path in &new_paths {
                if let Some(&id) = self.index.get(path) {
                    let top = self.top_root(id);
                    if new_paths.contains(&self.arena[top].path) {
                        if !absorbed.contains(&top) {
                            absorbed.push(top);
                        }
                    } else {
                        conflict = true;
                        break;
                    }
                }
            }

            if conflict {
                warn!(
                    "Root {} overlaps an existing root that it does not contain, skipping",
                    root.path().display()
                );
                continue;
            }

            for top in absorbed {
                debug!("Root {} absorbed by {}", self.arena[top].path.display(), root.path().display());
                self.detach(top);
                self.release_subtree(top);
            }

            let id = self.insert_entry(root, None);
            self.roots.push(id);
            added += 1;
        }

        added
    }

    /// Remove any node by path. Empty ancestors are pruned, the remaining ones re-aggregated.
    /// Returns false when the path is unknown.
    pub fn remove_by_id(&mut self, id: &Path) -> bool {
        let Some(&target) = self.index.get(id) else {
            return false;
        };

        let parent = self.arena[target].parent;
        self.detach(target);
        self.release_subtree(target);

        let Some(mut current) = parent else {
            return true;
        };

        // Prune ancestors left without children
        while self.arena[current].children.is_empty() {
            let up = self.arena[current].parent;
            self.detach(current);
            self.release_subtree(current);
            match up {
                Some(next) => current = next,
                None => return true,
            }
        }

        let mut cursor = Some(current);
        while let Some(id) = cursor {
            self.recompute(id);
            cursor = self.arena[id].parent;
        }

        true
    }

    pub fn clear(&mut self) {
        self.arena.clear();
        self.index.clear();
        self.roots.clear();
    }

    /// One task per file, depth-first in storage order, tagged with its topmost ancestor
    pub fn flatten_to_tasks(&self) -> Vec<FileTask> {
        let mut tasks = Vec::new();
        for &root in &self.roots {
            let root_path = &self.arena[root].path;
            self.collect_tasks(root, root_path, &mut tasks);
        }
        tasks
    }

    fn collect_tasks(&self, id: NodeId, root_path: &Path, tasks: &mut Vec<FileTask>) {
        let node = &self.arena[id];
        if node.is_dir {
            for &child in &node.children {
                self.collect_tasks(child, root_path, tasks);
            }
        } else {
            tasks.push(FileTask {
                path: node.path.clone(),
                root_path: root_path.to_path_buf(),
            });
        }
    }

    pub fn total_size(&self) -> u64 {
        self.roots.iter().map(|&id| self.arena[id].size).sum()
    }

    pub fn total_files(&self) -> u64 {
        self.roots.iter().map(|&id| self.arena[id].file_count).sum()
    }

    /// Number of roots
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.index.contains_key(path)
    }

    pub fn get(&self, path: &Path) -> Option<&InventoryNode> {
        self.index.get(path).map(|&id| &self.arena[id])
    }

    pub fn roots(&self) -> impl Iterator<Item = &InventoryNode> + '_ {
        self.roots.iter().map(move |&id| &self.arena[id])
    }

    pub fn children<'a>(&'a self, node: &'a InventoryNode) -> impl Iterator<Item = &'a InventoryNode> + 'a {
        node.children.iter().map(move |&id| &self.arena[id])
    }

    pub fn parent(&self, node: &InventoryNode) -> Option<&InventoryNode> {
        node.parent.map(|id| &self.arena[id])
    }

    /// Toggle the display flag of a folder. Returns false for unknown paths and files.
    pub fn set_expanded(&mut self, path: &Path, expanded: bool) -> bool {
        match self.index.get(path) {
            Some(&id) if self.arena[id].is_dir => {
                self.arena[id].expanded = expanded;
                true
            }
            _ => false,
        }
    }

    /// Owned copy of the forest
    pub fn snapshot(&self) -> Vec<Entry> {
        self.roots.iter().map(|&id| self.to_entry(id)).collect()
    }

    fn to_entry(&self, id: NodeId) -> Entry {
        let node = &self.arena[id];
        if node.is_dir {
            let children = node.children.iter().map(|&child| self.to_entry(child)).collect();
            let mut entry = Entry::folder(node.path.clone(), node.name.clone(), children);
            if let Entry::Folder(folder) = &mut entry {
                folder.expanded = node.expanded;
            }
            entry
        } else {
            Entry::file(node.path.clone(), node.name.clone(), node.size)
        }
    }

    fn insert_entry(&mut self, entry: Entry, parent: Option<NodeId>) -> NodeId {
        let (path, name, size, file_count, is_dir, expanded, children) = match entry {
            Entry::File(file) => (file.path, file.name, file.size, 1, false, false, Vec::new()),
            Entry::Folder(folder) => (
                folder.path,
                folder.name,
                folder.size,
                folder.file_count,
                true,
                folder.expanded,
                folder.children,
            ),
        };

        let id = self.arena.insert(InventoryNode {
            path: path.clone(),
            name,
            size,
            file_count,
            is_dir,
            expanded,
            parent,
            children: Vec::with_capacity(children.len()),
        });
        self.index.insert(path, id);

        for child in children {
            let child_id = self.insert_entry(child, Some(id));
            self.arena[id].children.push(child_id);
        }

        id
    }

    fn top_root(&self, mut id: NodeId) -> NodeId {
        while let Some(parent) = self.arena[id].parent {
            id = parent;
        }
        id
    }

    /// Unlink a node from its parent's children, or from the root list
    fn detach(&mut self, id: NodeId) {
        match self.arena[id].parent {
            Some(parent) => self.arena[parent].children.retain(|&child| child != id),
            None => self.roots.retain(|&root| root != id),
        }
    }

    fn release_subtree(&mut self, id: NodeId) {
        if let Some(node) = self.arena.release(id) {
            self.index.remove(&node.path);
            for child in node.children {
                self.release_subtree(child);
            }
        }
    }

    fn recompute(&mut self, id: NodeId) {
        let (size, file_count) = self.arena[id]
            .children
            .iter()
            .fold((0, 0), |(size, count), &child| {
                let child = &self.arena[child];
                (size + child.size, count + child.file_count)
            });
        let node = &mut self.arena[id];
        node.size = size;
        node.file_count = file_count;
    }
}

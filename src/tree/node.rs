//! # Tree Node Module
//!
//! Nodi dell'albero prodotto dallo scan.
//!
//! ## Responsabilità:
//! - `FileNode`: un file supportato, conta sempre come un file
//! - `FolderNode`: una cartella con almeno un file supportato nel sottoalbero
//! - `Entry`: unione serializzabile (tag `type`) con accessor comuni
//!
//! ## Invarianti:
//! - `size` e `file_count` di una cartella sono la somma dei figli

use serde::Serialize;
use std::path::{Path, PathBuf};

/// A supported media file. Always counts as one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileNode {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

/// A folder holding at least one supported file somewhere below it.
/// `size` and `file_count` are rollups of `children`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderNode {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub file_count: u64,
    pub children: Vec<Entry>,
    #[serde(skip)]
    pub expanded: bool,
}

impl FolderNode {
    /// Build a folder with rollups computed from `children`
    pub fn new(path: PathBuf, name: String, children: Vec<Entry>) -> Self {
        let mut folder = Self {
            path,
            name,
            size: 0,
            file_count: 0,
            children,
            expanded: false,
        };
        folder.recompute();
        folder
    }

    /// Recompute size and file count from the direct children
    pub fn recompute(&mut self) {
        self.size = self.children.iter().map(Entry::size).sum();
        self.file_count = self.children.iter().map(Entry::file_count).sum();
    }
}

/// Node of a scanned tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Entry {
    File(FileNode),
    Folder(FolderNode),
}

impl Entry {
    pub fn file(path: PathBuf, name: String, size: u64) -> Self {
        Entry::File(FileNode { path, name, size })
    }

    pub fn folder(path: PathBuf, name: String, children: Vec<Entry>) -> Self {
        Entry::Folder(FolderNode::new(path, name, children))
    }

    /// Identity of the node inside a forest
    pub fn path(&self) -> &Path {
        match self {
            Entry::File(file) => &file.path,
            Entry::Folder(folder) => &folder.path,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entry::File(file) => &file.name,
            Entry::Folder(folder) => &folder.name,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Entry::File(file) => file.size,
            Entry::Folder(folder) => folder.size,
        }
    }

    pub fn file_count(&self) -> u64 {
        match self {
            Entry::File(_) => 1,
            Entry::Folder(folder) => folder.file_count,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Entry::Folder(_))
    }

    pub fn children(&self) -> &[Entry] {
        match self {
            Entry::File(_) => &[],
            Entry::Folder(folder) => &folder.children,
        }
    }

    /// Depth-first visit of this node and every descendant
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Entry)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }
}

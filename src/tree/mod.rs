//! # Tree Module
//!
//! Modello ad albero dei file scansionati e costruzione ricorsiva:
//! - `node`: `Entry` / `FileNode` / `FolderNode` con rollup di size e file count
//! - `builder`: `TreeBuilder` che percorre i path di input e scarta le cartelle vuote

pub mod builder;
pub mod node;

pub use builder::{ScanOutcome, TreeBuilder, TreeScan};
pub use node::{Entry, FileNode, FolderNode};

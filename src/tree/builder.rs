//! # Tree Builder Module
//!
//! Percorre ricorsivamente i path di input e li trasforma in alberi di `Entry`.
//!
//! ## Responsabilità:
//! - Tiene solo i file supportati; le cartelle senza file supportati vengono scartate
//! - Localizza i fallimenti: una root illeggibile non produce nulla, un errore annidato
//!   scarta solo il proprio sottoalbero
//! - Interrompe i cicli di symlink tramite lo stack dei path canonici
//! - Raccoglie opzionalmente i path scartati (`with_skip_reporting`)
//!
//! ## Entry point:
//! - `build_tree`: una singola root, con errori annidati e path scartati
//! - `build_forest`: tutte le root in ordine di input, aggregate in `ScanOutcome`

use crate::{
    classifier::PathClassifier,
    error::ScanError,
    file_manager::{FileManager, FileSystem},
    tree::node::Entry,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of scanning a batch of input paths
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// One entry per input path that contained supported files, in input order
    pub roots: Vec<Entry>,
    /// Every failure met while scanning, root-level and nested
    pub errors: Vec<ScanError>,
    /// Unsupported files and empty folders, only filled when skip reporting is enabled
    pub skipped: Vec<PathBuf>,
}

impl ScanOutcome {
    pub fn total_files(&self) -> u64 {
        self.roots.iter().map(Entry::file_count).sum()
    }

    pub fn total_size(&self) -> u64 {
        self.roots.iter().map(Entry::size).sum()
    }
}

/// Result of scanning one root that could be read
#[derive(Debug, Default)]
pub struct TreeScan {
    /// `None` when the root holds no supported file
    pub entry: Option<Entry>,
    /// Nested failures, each of which dropped only its own subtree
    pub errors: Vec<ScanError>,
    /// Unsupported files and empty folders, only filled when skip reporting is enabled
    pub skipped: Vec<PathBuf>,
}

/// Builds trees of supported media files
pub struct TreeBuilder<F: FileSystem> {
    fs: F,
    classifier: PathClassifier,
    report_skipped: bool,
}

/// Per-root walk state
#[derive(Default)]
struct Walk {
    errors: Vec<ScanError>,
    skipped: Vec<PathBuf>,
    /// Canonical paths of the directories currently being descended
    ancestors: Vec<PathBuf>,
}

impl<F: FileSystem> TreeBuilder<F> {
    pub fn new(fs: F, classifier: PathClassifier) -> Self {
        Self {
            fs,
            classifier,
            report_skipped: false,
        }
    }

    /// Record unsupported files and empty folders in `ScanOutcome::skipped`
    pub fn with_skip_reporting(mut self, report_skipped: bool) -> Self {
        self.report_skipped = report_skipped;
        self
    }

    /// Scan a single root. `Err` means the root itself could not be read.
    pub fn build_tree(&self, path: &Path) -> Result<TreeScan, ScanError> {
        let mut walk = Walk::default();
        let entry = self.visit(path, &mut walk)?;
        Ok(TreeScan {
            entry,
            errors: walk.errors,
            skipped: walk.skipped,
        })
    }

    /// Scan every path independently, in input order
    pub fn build_forest<P: AsRef<Path>>(&self, paths: &[P]) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();

        for path in paths {
            let path = path.as_ref();

            match self.build_tree(path) {
                Ok(mut scan) => {
                    match scan.entry {
                        Some(entry) => {
                            debug!(
                                "Root {}: {} files, {}",
                                path.display(),
                                entry.file_count(),
                                FileManager::format_size(entry.size())
                            );
                            outcome.roots.push(entry);
                        }
                        None => debug!("Root {} contains no supported files", path.display()),
                    }
                    outcome.errors.append(&mut scan.errors);
                    outcome.skipped.append(&mut scan.skipped);
                }
                Err(e) => {
                    warn!("Scan of {} produced nothing: {}", path.display(), e);
                    outcome.errors.push(e);
                }
            }
        }

        info!(
            "Scanned {} paths: {} roots, {} files, {}",
            paths.len(),
            outcome.roots.len(),
            outcome.total_files(),
            FileManager::format_size(outcome.total_size())
        );

        outcome
    }

    fn visit(&self, path: &Path, walk: &mut Walk) -> Result<Option<Entry>, ScanError> {
        let stat = self.fs.stat(path).map_err(|source| ScanError::Stat {
            path: path.to_path_buf(),
            source,
        })?;
        let name = FileManager::display_name(path);

        if !stat.is_dir {
            if self.classifier.is_supported(&name) {
                return Ok(Some(Entry::file(path.to_path_buf(), name, stat.size)));
            }
            self.skip(path, walk);
            return Ok(None);
        }

        let canonical = self
            .fs
            .canonical(path)
            .unwrap_or_else(|_| path.to_path_buf());
        if walk.ancestors.contains(&canonical) {
            return Err(ScanError::Cycle(path.to_path_buf()));
        }

        let listing = self
            .fs
            .list_directory(path)
            .map_err(|source| ScanError::ReadDir {
                path: path.to_path_buf(),
                source,
            })?;

        walk.ancestors.push(canonical);
        let mut children = Vec::new();

        for entry in listing {
            let child_path = self.fs.join_path(path, &entry.name);

            // Unsupported plain files never need a stat
            if !entry.is_dir && !self.classifier.is_supported(&entry.name) {
                self.skip(&child_path, walk);
                continue;
            }

            match self.visit(&child_path, walk) {
                Ok(Some(child)) => children.push(child),
                Ok(None) => {}
                Err(e) => {
                    warn!("Skipping {}: {}", e.path().display(), e);
                    walk.errors.push(e);
                }
            }
        }

        walk.ancestors.pop();

        if children.is_empty() {
            self.skip(path, walk);
            return Ok(None);
        }

        Ok(Some(Entry::folder(path.to_path_buf(), name, children)))
    }

    fn skip(&self, path: &Path, walk: &mut Walk) {
        if self.report_skipped {
            walk.skipped.push(path.to_path_buf());
        }
    }
}

//! # File Management Module
//!
//! Questo modulo gestisce l'accesso al filesystem usato dallo scan e le utilità sui file.
//!
//! ## Responsabilità:
//! - Definisce il trait `FileSystem` (stat, list_directory, join_path) consumato dal TreeBuilder
//! - Fornisce `LocalFileSystem`, implementazione basata su `std::fs`
//! - Utilità per calcoli dimensioni e percentuali
//! - Formattazione human-readable delle dimensioni
//!
//! ## Failure locali:
//! Ogni chiamata può fallire singolarmente; il chiamante decide come localizzare
//! l'errore (per lo scan: "questo sottoalbero non produce nulla").
//!
//! ## Esempio:
//! ```ignore
//! let fs = LocalFileSystem;
//! let stat = fs.stat(Path::new("/path/to/media"))?;
//! if stat.is_dir {
//!     for entry in fs.list_directory(Path::new("/path/to/media"))? {
//!         println!("{} ({})", entry.name, FileManager::format_size(stat.size));
//!     }
//! }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Result of a stat call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub is_dir: bool,
    pub size: u64,
}

/// One direct entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub is_dir: bool,
}

/// Filesystem accessor consumed by the tree builder
pub trait FileSystem: Send + Sync {
    fn stat(&self, path: &Path) -> io::Result<FileStat>;

    /// Direct entries of a directory. Children of a folder keep this order in the tree.
    fn list_directory(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>>;

    fn join_path(&self, base: &Path, name: &str) -> PathBuf {
        base.join(name)
    }

    /// Resolved location of a directory, used to detect symbolic link cycles
    fn canonical(&self, path: &Path) -> io::Result<PathBuf> {
        Ok(path.to_path_buf())
    }
}

/// `std::fs` backed accessor. Symbolic links are followed.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let metadata = fs::metadata(path)?;
        Ok(FileStat {
            is_dir: metadata.is_dir(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
        })
    }

    fn list_directory(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>> {
        let mut entries = Vec::new();

        for entry in fs::read_dir(path)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry in {}: {}", path.display(), e);
                    continue;
                }
            };

            let is_dir = match entry.file_type() {
                Ok(file_type) if file_type.is_symlink() => entry.path().is_dir(),
                Ok(file_type) => file_type.is_dir(),
                Err(_) => false,
            };

            entries.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn canonical(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path)
    }
}

/// File utilities shared by the CLI and the local engine
pub struct FileManager;

impl FileManager {
    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }

    /// Last path component as a display name (falls back to the full path for `/`)
    pub fn display_name(path: &Path) -> String {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_size() {
        assert_eq!(FileManager::format_size(0), "0 B");
        assert_eq!(FileManager::format_size(1023), "1023 B");
        assert_eq!(FileManager::format_size(1536), "1.50 KB");
        assert_eq!(FileManager::format_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_calculate_reduction() {
        assert_eq!(FileManager::calculate_reduction(0, 10), 0.0);
        assert_eq!(FileManager::calculate_reduction(200, 50), 75.0);
    }

    #[test]
    fn test_local_file_system_stat_and_list() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::write(root.join("a.jpg"), vec![0u8; 42]).unwrap();
        std::fs::create_dir(root.join("nested")).unwrap();

        let fs = LocalFileSystem;
        let stat = fs.stat(&root.join("a.jpg")).unwrap();
        assert_eq!(stat, FileStat { is_dir: false, size: 42 });
        assert!(fs.stat(root).unwrap().is_dir);

        let mut names: Vec<_> = fs
            .list_directory(root)
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.is_dir))
            .collect();
        names.sort();
        assert_eq!(names, vec![("a.jpg".to_string(), false), ("nested".to_string(), true)]);

        assert!(fs.stat(&root.join("missing.png")).is_err());
    }

    #[test]
    fn test_display_name() {
        assert_eq!(FileManager::display_name(Path::new("/photos/a.jpg")), "a.jpg");
        assert_eq!(FileManager::display_name(Path::new("/")), "/");
    }
}

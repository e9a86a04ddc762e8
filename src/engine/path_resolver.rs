//! # Path Resolution Module
//!
//! Centralizza tutta la logica di calcolo dei path di output.
//! - Directory di output: `out/<nome root>/<path relativo>` per root cartella, `out/<nome file>` per root file
//! - Overwrite: il file originale stesso
//! - Rename: `<stem>__optimized.<ext>` accanto all'originale

use crate::job::payload::DestinationMode;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Marker that identifies files produced by a previous rename run
pub const OPTIMIZED_MARKER: &str = "__optimized";

/// Utility per calcolare i path di output in modo centralizzato
pub struct PathResolver;

impl PathResolver {
    /// Calcola il path di output per un file dato
    pub fn get_output_path(source: &Path, root: &Path, destination: &DestinationMode) -> PathBuf {
        match destination {
            DestinationMode::Directory(output_dir) => {
                Self::resolve_output_directory_path(source, root, output_dir)
            }
            DestinationMode::OverwriteInPlace => source.to_path_buf(),
            DestinationMode::BesideOriginal => Self::renamed_sibling(source),
        }
    }

    /// Whether a path was produced by a rename run and must not be optimized again
    pub fn is_optimized_output(path: &Path) -> bool {
        path.to_string_lossy().contains(OPTIMIZED_MARKER)
    }

    /// Path of a format sidecar (`photo.jpg` → `photo.webp`) next to the output
    pub fn sidecar_path(output: &Path, extension: &str) -> PathBuf {
        output.with_extension(extension)
    }

    fn resolve_output_directory_path(source: &Path, root: &Path, output_dir: &Path) -> PathBuf {
        let result = if root.is_dir() {
            let relative = source.strip_prefix(root).unwrap_or_else(|_| {
                debug!("[ERROR] {} is not under root {}", source.display(), root.display());
                Path::new(source.file_name().unwrap_or_default())
            });
            let root_name = root.file_name().unwrap_or_default();
            output_dir.join(root_name).join(relative)
        } else {
            output_dir.join(source.file_name().unwrap_or_default())
        };

        debug!("Resolved output path: {} -> {}", source.display(), result.display());
        result
    }

    fn renamed_sibling(source: &Path) -> PathBuf {
        let stem = source.file_stem().unwrap_or_default().to_string_lossy();
        let file_name = match source.extension() {
            Some(ext) => format!("{}{}.{}", stem, OPTIMIZED_MARKER, ext.to_string_lossy()),
            None => format!("{}{}", stem, OPTIMIZED_MARKER),
        };
        source.parent().unwrap_or(Path::new(".")).join(file_name)
    }

    /// Crea le directory parent se necessario
    pub fn ensure_parent_dirs(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!("Failed to create parent directories for {}: {}", path.display(), e)
            })?;
        }
        Ok(())
    }
}

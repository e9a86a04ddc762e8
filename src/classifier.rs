//! # Path Classifier Module
//!
//! Decide se un entry del filesystem è un file media supportato.
//!
//! ## Regole:
//! - Estrae il suffisso dopo l'ultimo '.' e lo porta in lowercase
//! - Nome vuoto o senza suffisso → non supportato
//! - Altrimenti test di appartenenza all'allow-list configurata
//!
//! Funzione pura, senza side effects e senza failure modes.

use std::collections::HashSet;

/// Extensions accepted by the optimization engine
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Extension allow-list lookup
#[derive(Debug, Clone)]
pub struct PathClassifier {
    extensions: HashSet<String>,
}

impl Default for PathClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS.iter().copied())
    }
}

impl PathClassifier {
    /// Build a classifier from an allow-list. Entries are lowercased and leading dots are dropped.
    pub fn new<T, I>(extensions: I) -> Self
    where
        T: AsRef<str>,
        I: IntoIterator<Item = T>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        Self { extensions }
    }

    /// Check whether a file name carries a supported extension
    pub fn is_supported(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }

        match name.rsplit_once('.') {
            Some((_, suffix)) if !suffix.is_empty() => {
                self.extensions.contains(&suffix.to_lowercase())
            }
            _ => false,
        }
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_extensions_case_insensitive() {
        let classifier = PathClassifier::default();
        assert!(classifier.is_supported("photo.jpg"));
        assert!(classifier.is_supported("PHOTO.JPEG"));
        assert!(classifier.is_supported("scan.Png"));
        assert!(classifier.is_supported("archive.tar.png"));
    }

    #[test]
    fn test_rejects_missing_or_unknown_suffix() {
        let classifier = PathClassifier::default();
        assert!(!classifier.is_supported(""));
        assert!(!classifier.is_supported("README"));
        assert!(!classifier.is_supported("trailing."));
        assert!(!classifier.is_supported("notes.txt"));
        assert!(!classifier.is_supported("photo.jpg.bak"));
    }

    #[test]
    fn test_custom_allow_list_normalised() {
        let classifier = PathClassifier::new([".WebP", " gif "]);
        assert!(classifier.is_supported("a.webp"));
        assert!(classifier.is_supported("b.GIF"));
        assert!(!classifier.is_supported("c.jpg"));
    }
}

//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il feedback visivo del run e il riepilogo finale.
//!
//! ## Responsabilità:
//! - Progress bar visual con `indicatif` alimentata dal `Progress` del job
//! - Spinner per operazioni indeterminate (scan delle root)
//! - Report finale con statistiche aggregate da `FinalResult`
//!
//! ## Progress tracking:
//! - Barra di progresso con percentuale derivata da done/total
//! - Tempo elapsed
//! - Nome del file corrente come messaggio
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] [========================>---------------] 60/100 (60%) photo.jpg
//! ```
//!
//! ## Esempio:
//! ```ignore
//! let progress = ProgressManager::new();
//! progress.set_progress(orchestrator.progress());
//! progress.finish(&RunSummary::new(&result).format_summary());
//! ```

use crate::{engine::FinalResult, file_manager::FileManager, job::state::Progress};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Manages progress reporting for an optimization run
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressManager {
    /// Create a progress bar. Its length follows the first progress update.
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Mirror the job's progress
    pub fn set_progress(&self, progress: &Progress) {
        if self.bar.length() != Some(progress.total) {
            self.bar.set_length(progress.total);
        }
        self.bar.set_position(progress.done);
        self.bar.set_message(progress.current_label.clone());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Stop and clear the bar, e.g. before printing an error
    pub fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }

    /// Create a spinner for indeterminate progress
    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();

        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        spinner
    }
}

/// Human-readable view of a finished run
#[derive(Debug)]
pub struct RunSummary<'a> {
    result: &'a FinalResult,
}

impl<'a> RunSummary<'a> {
    pub fn new(result: &'a FinalResult) -> Self {
        Self { result }
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        let original = self.result.total_size_original;
        FileManager::calculate_reduction(original, original.saturating_sub(self.result.total_size_saved))
    }

    pub fn format_summary(&self) -> String {
        let result = self.result;
        let mut summary = format!(
            "{}: {}/{} files | Total saved: {} ({:.2}%) | {:.1}s",
            if result.is_canceled { "Cancelled" } else { "Completed" },
            result.processed_files,
            result.total_files,
            FileManager::format_size(result.total_size_saved),
            self.overall_reduction_percent(),
            result.duration_total
        );

        if result.total_size_webp > 0 {
            summary.push_str(&format!(
                " | WebP: {}",
                FileManager::format_size(result.total_size_webp)
            ));
        }
        if result.total_size_avif > 0 {
            summary.push_str(&format!(
                " | AVIF: {}",
                FileManager::format_size(result.total_size_avif)
            ));
        }
        summary
    }
}

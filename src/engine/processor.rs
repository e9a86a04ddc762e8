//! # File Processor Module
//!
//! Lavoro per singolo file eseguito dall'engine locale.
//!
//! ## Responsabilità:
//! - Copia dell'originale verso la destinazione (se diversa dalla sorgente)
//! - Ricodifica JPEG (qualità) e PNG (compressione massima) tramite il crate `image`
//! - Generazione di sidecar WebP lossless
//! - Misura di dimensioni e tempi per le statistiche finali
//!
//! ## Sicurezza operazioni:
//! - La ricodifica scrive su un file temporaneo nella stessa directory
//! - Il file viene sostituito solo se il risultato è più piccolo
//!
//! ## Formati:
//! - AVIF non fa parte dei codec inclusi: la richiesta viene loggata e ignorata

use crate::{engine::path_resolver::PathResolver, job::payload::OptimizePayload};
use anyhow::Result;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::DynamicImage;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Source file and where its optimized version goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileJob {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Encoding settings shared by every file of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSettings {
    pub jpg_q: u8,
    pub png_min: u8,
    pub png_max: u8,
    pub webp: bool,
    pub avif: bool,
    pub optimize_original: bool,
}

impl From<&OptimizePayload> for ProcessSettings {
    fn from(payload: &OptimizePayload) -> Self {
        Self {
            jpg_q: payload.jpg_q,
            png_min: payload.png_min,
            png_max: payload.png_max,
            webp: payload.webp,
            avif: payload.avif,
            optimize_original: payload.optimize_original,
        }
    }
}

/// Per-file measurements
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileStats {
    /// False when cancellation interrupted the file
    pub completed: bool,
    pub bytes_saved: u64,
    pub original_size: u64,
    pub optimized_size: u64,
    pub webp_size: u64,
    pub avif_size: u64,
    pub duration_opt: f64,
    pub duration_webp: f64,
    pub duration_avif: f64,
}

/// Byte-level work on one file. Called from blocking worker threads.
pub trait FileProcessor: Send + Sync + 'static {
    fn process(&self, job: &FileJob, settings: &ProcessSettings, cancel: &AtomicBool) -> FileStats;
}

/// Processor backed by the `image` crate codecs
#[derive(Debug, Default)]
pub struct ImageCodecProcessor {
    avif_warned: AtomicBool,
}

impl ImageCodecProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_webp(image: &DynamicImage, output: &Path) -> Result<u64> {
        let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
        Self::write_atomically(output, |writer| {
            rgba.write_with_encoder(WebPEncoder::new_lossless(writer))?;
            Ok(())
        })
    }

    /// Re-encode `path` in place, keeping whichever version is smaller. Returns the final size.
    fn reencode(path: &Path, extension: &str, settings: &ProcessSettings) -> Result<u64> {
        let original_size = fs::metadata(path)?.len();
        let image = image::open(path)?;

        let parent = path.parent().unwrap_or(Path::new("."));
        let mut temp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            if extension == "png" {
                let encoder = PngEncoder::new_with_quality(&mut writer, CompressionType::Best, FilterType::Adaptive);
                image.write_with_encoder(encoder)?;
            } else {
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, settings.jpg_q))?;
            }
            writer.flush()?;
        }

        let new_size = temp.as_file().metadata()?.len();
        if new_size < original_size {
            temp.persist(path)?;
            Ok(new_size)
        } else {
            debug!("Re-encoded {} is not smaller, keeping original", path.display());
            Ok(original_size)
        }
    }

    fn write_atomically<F>(output: &Path, write: F) -> Result<u64>
    where
        F: FnOnce(&mut BufWriter<&mut fs::File>) -> Result<()>,
    {
        let parent = output.parent().unwrap_or(Path::new("."));
        let mut temp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            write(&mut writer)?;
            writer.flush()?;
        }
        let size = temp.as_file().metadata()?.len();
        temp.persist(output)?;
        Ok(size)
    }
}

impl FileProcessor for ImageCodecProcessor {
    fn process(&self, job: &FileJob, settings: &ProcessSettings, cancel: &AtomicBool) -> FileStats {
        let started = Instant::now();
        let (src, dest) = (job.source.as_path(), job.destination.as_path());

        if cancel.load(Ordering::Relaxed) {
            return FileStats::default();
        }

        if src != dest {
            if let Err(e) = PathResolver::ensure_parent_dirs(dest) {
                warn!("{}", e);
                return FileStats::default();
            }
            if settings.optimize_original {
                if let Err(e) = fs::copy(src, dest) {
                    warn!("Cannot copy {} to {}: {}", src.display(), dest.display(), e);
                    return FileStats::default();
                }
            }
        }

        let original_size = fs::metadata(src).map(|m| m.len()).unwrap_or(0);
        let mut stats = FileStats {
            original_size,
            optimized_size: original_size,
            ..FileStats::default()
        };

        if settings.webp || settings.avif {
            match image::open(src) {
                Ok(image) => {
                    if settings.webp && !cancel.load(Ordering::Relaxed) {
                        let t = Instant::now();
                        let sidecar = PathResolver::sidecar_path(dest, "webp");
                        stats.webp_size = Self::write_webp(&image, &sidecar).unwrap_or_else(|e| {
                            warn!("WebP encoding failed for {}: {}", src.display(), e);
                            0
                        });
                        stats.duration_webp = t.elapsed().as_secs_f64();
                    }

                    if settings.avif && !self.avif_warned.swap(true, Ordering::Relaxed) {
                        warn!("AVIF output is not available with the bundled codecs, skipping");
                    }
                }
                Err(e) => warn!("Cannot decode {}: {}", src.display(), e),
            }
        }

        if cancel.load(Ordering::Relaxed) {
            return stats;
        }

        let opt_started = Instant::now();
        if settings.optimize_original {
            let extension = dest
                .extension()
                .unwrap_or_default()
                .to_string_lossy()
                .to_lowercase();

            if src != dest && !dest.exists() {
                stats.optimized_size = 0;
            } else if matches!(extension.as_str(), "png" | "jpg" | "jpeg") {
                let size = Self::reencode(dest, &extension, settings).unwrap_or_else(|e| {
                    warn!("Optimization failed for {}: {}", dest.display(), e);
                    fs::metadata(dest).map(|m| m.len()).unwrap_or(original_size)
                });
                stats.optimized_size = size;
                stats.bytes_saved = original_size.saturating_sub(size);
            }
        }
        let duration_opt = opt_started.elapsed().as_secs_f64();

        let total = started.elapsed().as_secs_f64();
        let overhead = (total - duration_opt - stats.duration_webp - stats.duration_avif).max(0.0);
        if settings.optimize_original {
            stats.duration_opt = duration_opt + overhead;
        }

        stats.completed = true;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn settings() -> ProcessSettings {
        ProcessSettings {
            jpg_q: 40,
            png_min: 25,
            png_max: 40,
            webp: false,
            avif: false,
            optimize_original: true,
        }
    }

    fn gradient(path: &Path) {
        let image = RgbImage::from_fn(96, 96, |x, y| Rgb([(x * 2) as u8, (y * 2) as u8, ((x + y) % 255) as u8]));
        image.save(path).unwrap();
    }

    #[test]
    fn test_jpeg_copied_and_reencoded_beside_original() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("a.jpg");
        gradient(&source);
        let destination = temp_dir.path().join("a__optimized.jpg");

        let processor = ImageCodecProcessor::new();
        let job = FileJob { source: source.clone(), destination: destination.clone() };
        let stats = processor.process(&job, &settings(), &AtomicBool::new(false));

        assert!(stats.completed);
        assert!(destination.exists());
        assert_eq!(stats.original_size, fs::metadata(&source).unwrap().len());
        assert_eq!(stats.optimized_size, fs::metadata(&destination).unwrap().len());
        assert!(stats.optimized_size <= stats.original_size);
        assert_eq!(stats.bytes_saved, stats.original_size - stats.optimized_size);
    }

    #[test]
    fn test_webp_sidecar_without_touching_original() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("b.png");
        gradient(&source);
        let before = fs::read(&source).unwrap();

        let processor = ImageCodecProcessor::new();
        let job = FileJob { source: source.clone(), destination: source.clone() };
        let settings = ProcessSettings { webp: true, optimize_original: false, ..settings() };
        let stats = processor.process(&job, &settings, &AtomicBool::new(false));

        assert!(stats.completed);
        assert!(stats.webp_size > 0);
        assert!(temp_dir.path().join("b.webp").exists());
        assert_eq!(fs::read(&source).unwrap(), before);
        assert_eq!(stats.bytes_saved, 0);
    }

    #[test]
    fn test_cancelled_before_start_does_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("c.png");
        gradient(&source);
        let destination = temp_dir.path().join("out/c.png");

        let processor = ImageCodecProcessor::new();
        let job = FileJob { source, destination: destination.clone() };
        let stats = processor.process(&job, &settings(), &AtomicBool::new(true));

        assert!(!stats.completed);
        assert!(!destination.exists());
    }
}

//! Submission payload sent to the optimization engine.
//!
//! Field names follow the engine's wire contract and must not change.

use crate::{config::{Destination, OptimizeOptions, SaveMethod}, error::SubmissionError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lowest quality the engine accepts
pub const MIN_QUALITY: u8 = 10;
pub const MAX_QUALITY: u8 = 100;
/// Distance between the PNG quantization ceiling and floor
const PNG_QUALITY_SPREAD: u8 = 15;

/// One file to optimize, tagged with the root it was dropped under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTask {
    pub path: PathBuf,
    #[serde(rename = "root")]
    pub root_path: PathBuf,
}

/// Where optimized files end up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationMode {
    OverwriteInPlace,
    /// `<stem>__optimized.<ext>` next to the original
    BesideOriginal,
    Directory(PathBuf),
}

impl DestinationMode {
    /// Resolve the caller's choice. `downloads_dir` is only consulted for the downloads destination.
    pub fn resolve<F>(options: &OptimizeOptions, downloads_dir: F) -> Result<Self, SubmissionError>
    where
        F: FnOnce() -> Option<PathBuf>,
    {
        match options.destination {
            Destination::Same => Ok(match options.save_method {
                SaveMethod::Overwrite => Self::OverwriteInPlace,
                SaveMethod::Rename => Self::BesideOriginal,
            }),
            Destination::Downloads => downloads_dir().map(Self::Directory).ok_or_else(|| {
                SubmissionError::Destination("downloads directory is not available".to_string())
            }),
            Destination::Custom => match &options.custom_path {
                Some(path) if !path.as_os_str().is_empty() => Ok(Self::Directory(path.clone())),
                _ => Err(SubmissionError::Destination(
                    "custom destination requires an output directory".to_string(),
                )),
            },
        }
    }
}

fn default_true() -> bool {
    true
}

/// Full job description handed to `OptimizationEngine::submit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizePayload {
    pub tasks: Vec<FileTask>,
    /// JPEG quality
    pub jpg_q: u8,
    /// PNG quantization floor
    pub png_min: u8,
    /// PNG quantization ceiling
    pub png_max: u8,
    pub webp: bool,
    pub avif: bool,
    #[serde(default = "default_true")]
    pub optimize_original: bool,
    /// Overwrite originals in place
    pub replace: bool,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl OptimizePayload {
    pub fn new(tasks: Vec<FileTask>, options: &OptimizeOptions, destination: DestinationMode) -> Self {
        let quality = options.quality.clamp(MIN_QUALITY, MAX_QUALITY);
        let (replace, output_dir) = match destination {
            DestinationMode::OverwriteInPlace => (true, None),
            DestinationMode::BesideOriginal => (false, None),
            DestinationMode::Directory(dir) => (false, Some(dir)),
        };

        Self {
            tasks,
            jpg_q: quality,
            png_min: quality.saturating_sub(PNG_QUALITY_SPREAD).max(MIN_QUALITY),
            png_max: quality,
            webp: options.webp,
            avif: options.avif,
            optimize_original: options.compress,
            replace,
            output_dir,
        }
    }

    pub fn destination(&self) -> DestinationMode {
        match (&self.output_dir, self.replace) {
            (Some(dir), _) => DestinationMode::Directory(dir.clone()),
            (None, true) => DestinationMode::OverwriteInPlace,
            (None, false) => DestinationMode::BesideOriginal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(destination: Destination, save_method: SaveMethod) -> OptimizeOptions {
        OptimizeOptions {
            destination,
            save_method,
            ..OptimizeOptions::default()
        }
    }

    #[test]
    fn test_destination_resolution() {
        let same_overwrite = options(Destination::Same, SaveMethod::Overwrite);
        assert_eq!(DestinationMode::resolve(&same_overwrite, || None), Ok(DestinationMode::OverwriteInPlace));

        let same_rename = options(Destination::Same, SaveMethod::Rename);
        assert_eq!(DestinationMode::resolve(&same_rename, || None), Ok(DestinationMode::BesideOriginal));

        // Save method only matters for the same-folder destination
        let downloads = options(Destination::Downloads, SaveMethod::Overwrite);
        assert_eq!(
            DestinationMode::resolve(&downloads, || Some(PathBuf::from("/home/u/Downloads"))),
            Ok(DestinationMode::Directory(PathBuf::from("/home/u/Downloads")))
        );
        assert!(matches!(
            DestinationMode::resolve(&downloads, || None),
            Err(SubmissionError::Destination(_))
        ));

        let mut custom = options(Destination::Custom, SaveMethod::Rename);
        assert!(DestinationMode::resolve(&custom, || None).is_err());
        custom.custom_path = Some(PathBuf::from("/out"));
        assert_eq!(DestinationMode::resolve(&custom, || None), Ok(DestinationMode::Directory(PathBuf::from("/out"))));
    }

    #[test]
    fn test_quality_mapping() {
        let mut opts = OptimizeOptions::default();
        opts.quality = 80;
        let payload = OptimizePayload::new(Vec::new(), &opts, DestinationMode::BesideOriginal);
        assert_eq!((payload.jpg_q, payload.png_min, payload.png_max), (80, 65, 80));

        opts.quality = 12;
        let payload = OptimizePayload::new(Vec::new(), &opts, DestinationMode::BesideOriginal);
        assert_eq!((payload.jpg_q, payload.png_min, payload.png_max), (12, 10, 12));

        opts.quality = 3;
        let payload = OptimizePayload::new(Vec::new(), &opts, DestinationMode::BesideOriginal);
        assert_eq!(payload.jpg_q, 10);
    }

    #[test]
    fn test_wire_format() {
        let opts = OptimizeOptions {
            webp: true,
            ..OptimizeOptions::default()
        };
        let tasks = vec![FileTask {
            path: PathBuf::from("/r/a.jpg"),
            root_path: PathBuf::from("/r"),
        }];
        let payload = OptimizePayload::new(tasks, &opts, DestinationMode::Directory(PathBuf::from("/out")));

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "tasks": [{"path": "/r/a.jpg", "root": "/r"}],
                "jpg_q": 80,
                "png_min": 65,
                "png_max": 80,
                "webp": true,
                "avif": false,
                "optimize_original": true,
                "replace": false,
                "output_dir": "/out"
            })
        );

        let legacy: OptimizePayload = serde_json::from_value(serde_json::json!({
            "tasks": [], "jpg_q": 70, "png_min": 55, "png_max": 70,
            "webp": false, "avif": false, "replace": true, "output_dir": null
        }))
        .unwrap();
        assert!(legacy.optimize_original);
        assert_eq!(legacy.destination(), DestinationMode::OverwriteInPlace);
    }
}

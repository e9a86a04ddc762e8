//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce `OptimizeOptions` (scelte dell'utente per un run) e `Config`
//! - Fornisce validazione robusta dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `quality`: Qualità di compressione (10-100, default: 80)
//! - `compress`: Ottimizza il file originale (default: true)
//! - `webp` / `avif`: Genera sidecar nei formati moderni (default: false)
//! - `destination`: `same`, `downloads` o `custom` (default: same)
//! - `save_method`: `rename` o `overwrite`, solo per `same` (default: rename)
//! - `custom_path`: Directory di output per `custom`
//! - `supported_extensions`: Estensioni accettate (default: jpg, jpeg, png)
//! - `report_skipped`: Riporta i file ignorati durante lo scan (default: false)
//! - `workers`: Numero di worker paralleli (default: 4)
//! - `json_output`: Output JSON per uso programmatico (default: false)
//! - `profile`: Nome del profilo per il flag persistente (default: "default")
//!
//! ## Validazione:
//! - Controlla che quality sia 10-100
//! - Controlla che workers sia > 0
//! - Controlla che `custom` abbia una directory non vuota
//! - Controlla che almeno un formato di output sia attivo
//!
//! ## Esempio:
//! ```ignore
//! let config = Config {
//!     workers: 8,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::{
    classifier::DEFAULT_EXTENSIONS,
    job::payload::{MAX_QUALITY, MIN_QUALITY},
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the optimized files are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// Next to the originals
    #[default]
    Same,
    /// The user's downloads folder
    Downloads,
    /// An explicit output directory
    Custom,
}

/// How files are saved when the destination is the original folder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SaveMethod {
    #[default]
    Rename,
    Overwrite,
}

/// User choices for one optimization run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeOptions {
    pub quality: u8,
    /// Optimize the original format
    pub compress: bool,
    pub webp: bool,
    pub avif: bool,
    pub destination: Destination,
    pub save_method: SaveMethod,
    pub custom_path: Option<PathBuf>,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            quality: 80,
            compress: true,
            webp: false,
            avif: false,
            destination: Destination::Same,
            save_method: SaveMethod::Rename,
            custom_path: None,
        }
    }
}

/// Configuration for the drop-zone and its optimization runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(flatten)]
    pub options: OptimizeOptions,
    /// Extensions accepted by the scanner
    pub supported_extensions: Vec<String>,
    /// Report unsupported files skipped during the scan
    pub report_skipped: bool,
    /// Number of parallel workers
    pub workers: usize,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
    /// Name used to key the persisted result flag
    pub profile: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            options: OptimizeOptions::default(),
            supported_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            report_skipped: false,
            workers: 4,
            json_output: false,
            profile: "default".to_string(),
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        let quality = self.options.quality;
        if !(MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
            return Err(anyhow::anyhow!(
                "Quality must be between {} and {}",
                MIN_QUALITY,
                MAX_QUALITY
            ));
        }

        if self.workers == 0 {
            return Err(anyhow::anyhow!("Number of workers must be greater than 0"));
        }

        if self.supported_extensions.is_empty() {
            return Err(anyhow::anyhow!("At least one supported extension is required"));
        }

        if !self.options.compress && !self.options.webp && !self.options.avif {
            return Err(anyhow::anyhow!(
                "Nothing to do: enable compression, WebP or AVIF output"
            ));
        }

        if self.options.destination == Destination::Custom {
            match &self.options.custom_path {
                Some(path) if !path.as_os_str().is_empty() => {
                    if path.exists() && !path.is_dir() {
                        return Err(anyhow::anyhow!(
                            "Output path is not a directory: {}",
                            path.display()
                        ));
                    }
                }
                _ => {
                    return Err(anyhow::anyhow!(
                        "Custom destination requires an output directory"
                    ))
                }
            }
        }

        Ok(())
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom dell'applicazione.
//!
//! ## Responsabilità:
//! - Categorizza gli errori secondo il punto in cui nascono (scan, submit, engine, attach)
//! - Fornisce messaggi di errore descrittivi e strutturati
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `ScanError`: stat / lettura directory / ciclo di symlink durante lo scan di una root
//! - `EngineError`: errori riportati dall'engine di ottimizzazione esterno
//! - `SubmissionError`: errori sincroni durante la costruzione o l'invio del payload
//! - `ReconciliationError`: impossibile recuperare l'ultimo risultato all'attach
//! - `JobError`: valore terminale `Failed` del job
//! - `StateError`: errori del flag persistito su disco
//!
//! ## Politica di propagazione:
//! - `ScanError` e `ReconciliationError` vengono recuperati localmente (log + degrade)
//! - `SubmissionError` ed `EngineError` diventano il valore `Failed` del job
//!
//! ## Esempio:
//! ```ignore
//! if tasks.is_empty() {
//!     return Err(EngineError::Rejected("No supported files found.".to_string()));
//! }
//! ```

use std::path::PathBuf;

/// Failure while scanning one input root (or a subtree of it)
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    #[error("Cannot stat {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Symbolic link cycle detected at {0}")]
    Cycle(PathBuf),
}

impl ScanError {
    /// Path that produced the failure
    pub fn path(&self) -> &std::path::Path {
        match self {
            ScanError::Stat { path, .. } | ScanError::ReadDir { path, .. } => path,
            ScanError::Cycle(path) => path,
        }
    }
}

/// Errors surfaced by the external optimization engine
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Engine rejected the request: {0}")]
    Rejected(String),

    #[error("Engine transport error: {0}")]
    Transport(String),

    #[error("Optimization failed: {0}")]
    Failed(String),
}

/// Errors raised synchronously while building or sending a submission
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SubmissionError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Cannot resolve destination: {0}")]
    Destination(String),
}

/// Failure to recover the last result while attaching to the engine
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ReconciliationError {
    #[error("Cannot query engine state: {0}")]
    Query(EngineError),

    #[error("Cannot fetch last result: {0}")]
    Fetch(EngineError),
}

/// Terminal failure value of a job, also returned by `start` when rejected
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("An optimization run is already in progress")]
    AlreadyRunning,

    #[error("Submission failed: {0}")]
    Submission(#[from] SubmissionError),

    #[error("{0}")]
    Engine(#[from] EngineError),
}

/// Errors of the persisted "unseen result" flag
#[derive(thiserror::Error, Debug)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Could not find home directory")]
    NoHomeDirectory,
}

//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per comunicazione con un frontend.
//!
//! ## Responsabilità:
//! - Emette un oggetto JSON per riga su stdout per ogni evento rilevante
//! - Riusa `FinalResult`, `Progress` e le statistiche dello scan
//! - Fornisce interfaccia standardizzata per comunicazione inter-processo
//!
//! ## Tipi di messaggi:
//! - `scan`: Esito dello scan delle root (file, dimensione, errori)
//! - `start`: Inizio processo di ottimizzazione
//! - `progress`: Progresso corrente (done/total, percentuale, file corrente)
//! - `complete`: Fine processo con statistiche finali
//! - `cancelled`: Run interrotto, con le statistiche parziali
//! - `error`: Errore durante elaborazione

use crate::{config::OptimizeOptions, engine::FinalResult, job::state::Progress};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JsonMessage {
    /// Esito dello scan delle root
    Scan {
        roots: usize,
        total_files: u64,
        total_size: u64,
        errors: Vec<String>,
        skipped: Vec<PathBuf>,
    },

    /// Inizio del processo di ottimizzazione
    Start {
        total_files: u64,
        options: OptimizeOptions,
    },

    /// Progresso corrente
    Progress {
        done: u64,
        total: u64,
        percentage: u8,
        current_file: String,
    },

    /// Processo completato
    Complete { result: FinalResult },

    /// Run interrotto dall'utente
    Cancelled { result: FinalResult },

    /// Errore generale
    Error {
        message: String,
        details: Option<String>,
    },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    /// Crea un messaggio di progresso
    pub fn progress(progress: &Progress) -> Self {
        Self::Progress {
            done: progress.done,
            total: progress.total,
            percentage: progress.percentage(),
            current_file: progress.current_label.clone(),
        }
    }

    /// Crea il messaggio terminale per un risultato
    pub fn finished(result: &FinalResult) -> Self {
        if result.is_canceled {
            Self::Cancelled {
                result: result.clone(),
            }
        } else {
            Self::Complete {
                result: result.clone(),
            }
        }
    }

    /// Crea un messaggio di errore
    pub fn error(message: impl Into<String>, details: Option<String>) -> Self {
        Self::Error {
            message: message.into(),
            details,
        }
    }
}

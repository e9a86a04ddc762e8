//! # State Management Module
//!
//! Questo modulo gestisce il flag persistente "risultato non ancora visto".
//!
//! ## Responsabilità:
//! - Ricorda che un run è terminato mentre nessun osservatore era presente
//! - Persiste il flag in file JSON per profilo (basato su hash del nome)
//! - Tollera file mancanti o corrotti leggendo `false`
//!
//! ## Strategia di persistence:
//! - Salvataggio in `~/.media-optimizer/result_flag_<hash>.json`
//! - Hash SHA-256 del nome profilo, primi 16 caratteri esadecimali
//! - Scrittura asincrona con `tokio::fs`, directory creata se necessario
//!
//! ## Esempio struttura state file:
//! ```json
//! {
//!   "has_unviewed_result": true
//! }
//! ```

use crate::error::StateError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

#[derive(Debug, Default, Serialize, Deserialize)]
struct FlagFile {
    has_unviewed_result: bool,
}

/// Durable boolean: a finished result exists that nobody has looked at yet
#[derive(Debug, Clone)]
pub struct UnseenResultFlag {
    path: PathBuf,
}

impl UnseenResultFlag {
    /// Flag stored under the user's home directory for a profile name
    pub fn for_profile(profile: &str) -> Result<Self, StateError> {
        let state_dir = dirs::home_dir()
            .ok_or(StateError::NoHomeDirectory)?
            .join(".media-optimizer");

        let mut hasher = Sha256::new();
        hasher.update(profile.as_bytes());
        let hash = hex::encode(hasher.finalize())[..16].to_string();

        Ok(Self::at(state_dir.join(format!("result_flag_{}.json", hash))))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable state reads as `false`
    pub async fn load(&self) -> bool {
        match fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str::<FlagFile>(&content)
                .map(|flag| flag.has_unviewed_result)
                .unwrap_or_else(|e| {
                    debug!("Ignoring unreadable flag file {}: {}", self.path.display(), e);
                    false
                }),
            Err(_) => false,
        }
    }

    pub async fn store(&self, value: bool) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(&FlagFile {
            has_unviewed_result: value,
        })?;
        fs::write(&self.path, content).await?;
        Ok(())
    }
}

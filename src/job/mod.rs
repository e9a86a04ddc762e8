//! # Job Module
//!
//! Ciclo di vita del run di ottimizzazione:
//! - `state`: `JobState`, `Progress` e percentuale derivata
//! - `payload`: contratto di submission verso l'engine e risoluzione della destinazione
//! - `orchestrator`: `JobOrchestrator`, unico lettore degli eventi dell'engine

pub mod orchestrator;
pub mod payload;
pub mod state;

pub use orchestrator::{CancelHandle, JobOrchestrator};
pub use payload::{DestinationMode, FileTask, OptimizePayload};
pub use state::{Job, JobState, Progress};

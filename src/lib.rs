//! # Media Batch Optimizer Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `classifier`: Allow-list delle estensioni supportate
//! - `file_manager`: Accesso al filesystem (trait `FileSystem`) e formattazione
//! - `tree`: Albero dei file scansionati e `TreeBuilder`
//! - `inventory`: Foresta di root senza duplicati con rollup incrementali
//! - `job`: Stato del job, payload di submission e `JobOrchestrator`
//! - `engine`: Confine verso l'engine di ottimizzazione ed engine locale
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore custom per diverse operazioni
//! - `state`: Flag persistente "risultato non visto"
//! - `progress` / `json_output`: Feedback per terminale o frontend
//!
//! ## Utilizzo:
//! ```ignore
//! use media_batch_optimizer::{Inventory, JobOrchestrator, LocalFileSystem, TreeBuilder};
//!
//! let outcome = TreeBuilder::new(LocalFileSystem, classifier).build_forest(&paths);
//! let mut inventory = Inventory::new();
//! inventory.add_roots(outcome.roots);
//!
//! let mut events = orchestrator.attach(&mut inventory).await;
//! orchestrator.start(&inventory, &config.options).await?;
//! orchestrator.drive(&mut events, &mut inventory, |_| {}).await;
//! ```

pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod file_manager;
pub mod inventory;
pub mod job;
pub mod json_output;
pub mod progress;
pub mod state;
pub mod tree;

pub use classifier::PathClassifier;
pub use config::{Config, Destination, OptimizeOptions, SaveMethod};
pub use engine::{EngineEvent, EventSubscription, FinalResult, LocalEngine, OptimizationEngine, RunEvent, RunId};
pub use error::{EngineError, JobError, ScanError, SubmissionError};
pub use file_manager::{FileSystem, LocalFileSystem};
pub use inventory::{Inventory, InventoryNode};
pub use job::{JobOrchestrator, JobState, Progress};
pub use state::UnseenResultFlag;
pub use tree::{Entry, TreeBuilder};

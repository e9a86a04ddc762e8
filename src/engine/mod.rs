//! # Engine Boundary Module
//!
//! Confine verso il motore di ottimizzazione esterno.
//!
//! ## Responsabilità:
//! - `OptimizationEngine`: comandi (query stato, ultimo risultato, submit, cancel)
//! - `EngineEvent`: eventi consumati dall'orchestratore (stato, progress, esito)
//! - `RunId` / `RunEvent`: ogni evento porta l'id del run che lo ha prodotto
//! - `EventSubscription` / `EventHub`: sottoscrizioni cancellabili, ordinate e senza limite
//! - `FinalResult`: statistiche finali di un run
//!
//! ## Sottomoduli:
//! - `local`: engine in-process che esegue i task su thread bloccanti
//! - `path_resolver`: calcolo dei path di output per ogni task
//! - `processor`: lavoro per singolo file (trait `FileProcessor`)

pub mod local;
pub mod path_resolver;
pub mod processor;

use crate::{error::EngineError, job::payload::OptimizePayload, job::state::Progress};
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

pub use local::LocalEngine;
pub use path_resolver::PathResolver;
pub use processor::{FileProcessor, ImageCodecProcessor};

/// Aggregated statistics of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub total_files: u64,
    pub processed_files: u64,
    pub is_canceled: bool,
    pub total_size_saved: u64,
    pub duration_total: f64,
    pub duration_opt: f64,
    pub duration_webp: f64,
    pub duration_avif: f64,
    pub total_size_original: u64,
    pub total_size_optimized: u64,
    pub total_size_webp: u64,
    pub total_size_avif: u64,
}

/// Identifier of one accepted submission, returned by `submit`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub u64);

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Notifications emitted by an engine, in emission order
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    RunningStateChanged(bool),
    Progress(Progress),
    /// Terminal event of a run; `is_canceled` tags a cancelled run
    Finished(FinalResult),
    /// Terminal event of a run that could not complete
    Failed(String),
}

/// An event tagged with the run that emitted it
#[derive(Debug, Clone, PartialEq)]
pub struct RunEvent {
    pub run: RunId,
    pub event: EngineEvent,
}

impl RunEvent {
    pub fn new(run: RunId, event: EngineEvent) -> Self {
        Self { run, event }
    }
}

/// Commands the orchestrator issues to the engine
#[async_trait]
pub trait OptimizationEngine: Send + Sync {
    /// Authoritative, process-wide running flag
    async fn query_running_state(&self) -> Result<bool, EngineError>;

    /// Last result of a finished run. Returns `None` while a run is in progress.
    async fn fetch_last_result(&self) -> Result<Option<FinalResult>, EngineError>;

    /// Accept or reject a job. Progress and the outcome arrive as events tagged with the
    /// returned id.
    async fn submit(&self, payload: OptimizePayload) -> Result<RunId, EngineError>;

    /// Best-effort cancellation request; returns once the request is dispatched
    async fn request_cancel(&self) -> Result<(), EngineError>;

    fn subscribe(&self) -> EventSubscription;
}

/// Cancellable handle over an unbounded, ordered event stream
#[derive(Debug)]
pub struct EventSubscription {
    receiver: mpsc::UnboundedReceiver<RunEvent>,
}

impl EventSubscription {
    pub fn new(receiver: mpsc::UnboundedReceiver<RunEvent>) -> Self {
        Self { receiver }
    }

    /// Stop receiving. Events already queued can still be drained.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

impl Stream for EventSubscription {
    type Item = RunEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Fan-out of engine events to every live subscription
#[derive(Debug, Default)]
pub struct EventHub {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<RunEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> EventSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sender);
        EventSubscription::new(receiver)
    }

    /// Deliver to every subscriber, dropping the closed ones
    pub fn emit(&self, run: RunId, event: EngineEvent) {
        let event = RunEvent::new(run, event);
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

//! # Job Orchestrator Module
//!
//! Gestisce il ciclo di vita dell'unico run di ottimizzazione.
//!
//! ## Responsabilità:
//! - Costruisce il payload dai task dell'inventario e dalle opzioni utente
//! - Invia il job all'engine e traccia Running / Completed / Failed / Cancelled
//! - Applica gli eventi dell'engine uno alla volta, nell'ordine di arrivo
//! - Scarta gli eventi di run diversi da quello corrente (code residue sulla stessa sottoscrizione)
//! - Riconcilia lo stato all'attach usando il flag persistente "risultato non visto"
//!
//! ## Transizioni:
//! - `start`: Idle o terminale → Running, rifiutato se già Running
//! - `Progress`: sostituisce il progress corrente (last value wins)
//! - `Finished`: Completed (inventario svuotato) oppure Cancelled se marcato come tale
//! - `Failed` o errore di submission: Failed, progress preservato
//! - `cancel`: solo richiesta all'engine, non modifica mai lo stato

use crate::{
    config::OptimizeOptions,
    engine::{EngineEvent, EventSubscription, FinalResult, OptimizationEngine, RunEvent, RunId},
    error::{EngineError, JobError, ReconciliationError, SubmissionError},
    inventory::Inventory,
    job::payload::{DestinationMode, OptimizePayload},
    job::state::{Job, JobState, Progress, CANCELLED_LABEL, COMPLETED_LABEL, STARTING_LABEL},
    state::UnseenResultFlag,
};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owns the process-wide job and talks to the engine on its behalf
pub struct JobOrchestrator {
    engine: Arc<dyn OptimizationEngine>,
    flag: UnseenResultFlag,
    job: Job,
    /// Run whose events are applied. `None` until a submission is accepted or a running
    /// engine's run is adopted from its first event.
    run: Option<RunId>,
    downloads_dir: fn() -> Option<PathBuf>,
}

/// Cancellation requests that can be issued while the orchestrator is busy driving events
#[derive(Clone)]
pub struct CancelHandle {
    engine: Arc<dyn OptimizationEngine>,
}

impl CancelHandle {
    pub async fn cancel(&self) {
        request_cancel(self.engine.as_ref()).await;
    }
}

async fn request_cancel(engine: &dyn OptimizationEngine) {
    if let Err(e) = engine.request_cancel().await {
        warn!("Cancellation request failed: {}", e);
    }
}

impl JobOrchestrator {
    pub fn new(engine: Arc<dyn OptimizationEngine>, flag: UnseenResultFlag) -> Self {
        Self {
            engine,
            flag,
            job: Job::default(),
            run: None,
            downloads_dir: dirs::download_dir,
        }
    }

    /// Override how the downloads destination is located
    pub fn with_downloads_dir(mut self, downloads_dir: fn() -> Option<PathBuf>) -> Self {
        self.downloads_dir = downloads_dir;
        self
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn state(&self) -> &JobState {
        &self.job.state
    }

    pub fn progress(&self) -> &Progress {
        &self.job.progress
    }

    pub fn run(&self) -> Option<RunId> {
        self.run
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            engine: Arc::clone(&self.engine),
        }
    }

    /// Subscribe to the engine and recover the state it already holds.
    ///
    /// The subscription is opened before querying so no transition between the query and the
    /// first read is lost. Reconciliation failures are logged and leave the job Idle.
    pub async fn attach(&mut self, inventory: &mut Inventory) -> EventSubscription {
        let subscription = self.engine.subscribe();

        match self.engine.query_running_state().await {
            Err(e) => warn!("{}", ReconciliationError::Query(e)),
            Ok(true) => {
                info!("Engine is already running, resuming progress tracking");
                self.job.state = JobState::Running;
                self.run = None;
            }
            Ok(false) if self.job.state.is_running() => self.reconcile_stopped(inventory).await,
            Ok(false) => {
                if self.flag.load().await {
                    match self.engine.fetch_last_result().await {
                        Ok(Some(result)) => {
                            info!("Recovered unseen result from a previous run");
                            self.finish(result, inventory).await;
                        }
                        Ok(None) => warn!("Unseen result flag is set but the engine holds no result"),
                        Err(e) => warn!("{}", ReconciliationError::Fetch(e)),
                    }
                }
            }
        }

        subscription
    }

    /// Submit the inventory's tasks. Submission failures become the job's `Failed` value.
    pub async fn start(&mut self, inventory: &Inventory, options: &OptimizeOptions) -> Result<(), JobError> {
        if self.job.state.is_running() {
            return Err(JobError::AlreadyRunning);
        }

        self.job.state = JobState::Running;
        self.job.progress = Progress::default();
        self.run = None;
        if let Err(e) = self.flag.store(false).await {
            warn!("Cannot reset unseen result flag: {}", e);
        }

        let submission = async {
            let destination = DestinationMode::resolve(options, self.downloads_dir)?;
            let payload = OptimizePayload::new(inventory.flatten_to_tasks(), options, destination);
            debug!("Submitting {} tasks", payload.tasks.len());
            let run = self.engine.submit(payload).await?;
            Ok::<RunId, SubmissionError>(run)
        };

        match submission.await {
            Ok(run) => {
                debug!("Run {} accepted", run);
                self.run = Some(run);
                Ok(())
            }
            Err(e) => {
                let error = JobError::Submission(e);
                warn!("{}", error);
                self.job.state = JobState::Failed(error.clone());
                Err(error)
            }
        }
    }

    /// Ask the engine to stop. The outcome arrives later as a terminal event.
    pub async fn cancel(&self) {
        request_cancel(self.engine.as_ref()).await;
    }

    /// Clear the unseen result flag once the result has been shown
    pub async fn mark_seen(&self) {
        if let Err(e) = self.flag.store(false).await {
            warn!("Cannot clear unseen result flag: {}", e);
        }
    }

    /// Apply a single engine event to the job. Events of any run other than the current one
    /// are dropped and `false` is returned.
    pub async fn apply(&mut self, tagged: RunEvent, inventory: &mut Inventory) -> bool {
        let RunEvent { run, event } = tagged;
        match self.run {
            Some(current) if current != run => {
                debug!("Ignoring {:?} from run {} while following run {}", event, run, current);
                return false;
            }
            Some(_) => {}
            None if self.job.state.is_running() || event == EngineEvent::RunningStateChanged(true) => {
                debug!("Following run {}", run);
                self.run = Some(run);
            }
            None => return false,
        }

        match event {
            EngineEvent::RunningStateChanged(true) => {
                self.job.state = JobState::Running;
                self.job.progress = Progress::new(0, 0, STARTING_LABEL);
            }
            EngineEvent::RunningStateChanged(false) => {
                if self.job.state.is_running() {
                    self.reconcile_stopped(inventory).await;
                }
            }
            EngineEvent::Progress(progress) => {
                if self.job.state.is_running() {
                    self.job.progress = progress;
                }
            }
            EngineEvent::Finished(result) => {
                if self.job.state.is_running() {
                    self.finish(result, inventory).await;
                } else {
                    debug!("Ignoring result delivered outside a run");
                }
            }
            EngineEvent::Failed(message) => {
                if self.job.state.is_running() {
                    warn!("Optimization failed: {}", message);
                    self.job.state = JobState::Failed(JobError::Engine(EngineError::Failed(message)));
                }
            }
        }
        true
    }

    /// Read events until the current run reaches a terminal state
    pub async fn drive<F>(
        &mut self,
        events: &mut EventSubscription,
        inventory: &mut Inventory,
        mut observe: F,
    ) -> &JobState
    where
        F: FnMut(&Job),
    {
        while self.job.state.is_running() {
            match events.next().await {
                Some(event) => {
                    if self.apply(event, inventory).await {
                        observe(&self.job);
                    }
                }
                None => {
                    let error = EngineError::Transport("event stream closed".to_string());
                    warn!("{}", error);
                    self.job.state = JobState::Failed(JobError::Engine(error));
                    observe(&self.job);
                }
            }
        }
        &self.job.state
    }

    /// Terminal transition from a result. A completed run reports `{total, total}`, so a run
    /// that reported no files at all completes at 0%.
    async fn finish(&mut self, result: FinalResult, inventory: &mut Inventory) {
        if result.is_canceled {
            info!("Run cancelled after {} of {} files", result.processed_files, result.total_files);
            self.job.progress = Progress::new(result.total_files, result.processed_files, CANCELLED_LABEL);
            self.job.state = JobState::Cancelled(result);
        } else {
            let total = if result.total_files > 0 {
                result.total_files
            } else {
                self.job.progress.total
            };
            inventory.clear();
            self.job.progress = Progress::new(total, total, COMPLETED_LABEL);
            self.job.state = JobState::Completed(result);
        }

        if let Err(e) = self.flag.store(true).await {
            warn!("Cannot persist unseen result flag: {}", e);
        }
    }

    /// The engine reports not-running while the job still believes it is running
    /// and no terminal event was seen.
    async fn reconcile_stopped(&mut self, inventory: &mut Inventory) {
        match self.engine.query_running_state().await {
            Ok(true) => {
                debug!("Stale stop notification, engine is running");
                return;
            }
            Ok(false) => {}
            Err(e) => warn!("{}", ReconciliationError::Query(e)),
        }

        match self.engine.fetch_last_result().await {
            Ok(Some(result)) => self.finish(result, inventory).await,
            Ok(None) => {
                let error = EngineError::Failed("engine stopped without reporting a result".to_string());
                warn!("{}", error);
                self.job.state = JobState::Failed(JobError::Engine(error));
            }
            Err(e) => {
                warn!("{}", ReconciliationError::Fetch(e.clone()));
                self.job.state = JobState::Failed(JobError::Engine(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EventHub;
    use crate::tree::{Entry, FileNode};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeEngine {
        running: Mutex<bool>,
        last_result: Mutex<Option<FinalResult>>,
        reject: Mutex<Option<EngineError>>,
        fail_fetch: bool,
        cancels: Mutex<usize>,
        submitted: Mutex<Vec<OptimizePayload>>,
        hub: EventHub,
    }

    impl FakeEngine {
        fn emit(&self, run: u64, event: EngineEvent) {
            self.hub.emit(RunId(run), event);
        }
    }

    #[async_trait]
    impl OptimizationEngine for FakeEngine {
        async fn query_running_state(&self) -> Result<bool, EngineError> {
            Ok(*self.running.lock().unwrap())
        }

        async fn fetch_last_result(&self) -> Result<Option<FinalResult>, EngineError> {
            if self.fail_fetch {
                return Err(EngineError::Transport("offline".to_string()));
            }
            Ok(self.last_result.lock().unwrap().clone())
        }

        async fn submit(&self, payload: OptimizePayload) -> Result<RunId, EngineError> {
            if let Some(e) = self.reject.lock().unwrap().clone() {
                return Err(e);
            }
            let mut submitted = self.submitted.lock().unwrap();
            submitted.push(payload);
            *self.running.lock().unwrap() = true;
            Ok(RunId(submitted.len() as u64))
        }

        async fn request_cancel(&self) -> Result<(), EngineError> {
            *self.cancels.lock().unwrap() += 1;
            Err(EngineError::Transport("unreachable".to_string()))
        }

        fn subscribe(&self) -> EventSubscription {
            self.hub.subscribe()
        }
    }

    fn inventory() -> Inventory {
        let mut inventory = Inventory::new();
        inventory.add_roots([Entry::File(FileNode {
            path: PathBuf::from("/r/a.jpg"),
            name: "a.jpg".to_string(),
            size: 10,
        })]);
        inventory
    }

    fn orchestrator(engine: Arc<FakeEngine>, temp_dir: &TempDir) -> JobOrchestrator {
        let flag = UnseenResultFlag::at(temp_dir.path().join("flag.json"));
        JobOrchestrator::new(engine, flag).with_downloads_dir(|| None)
    }

    fn result(total: u64, is_canceled: bool) -> FinalResult {
        FinalResult {
            total_files: total,
            processed_files: if is_canceled { total / 2 } else { total },
            is_canceled,
            ..FinalResult::default()
        }
    }

    #[tokio::test]
    async fn test_start_rejected_while_running() {
        let temp_dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let mut orchestrator = orchestrator(Arc::clone(&engine), &temp_dir);
        let inventory = inventory();

        orchestrator.start(&inventory, &OptimizeOptions::default()).await.unwrap();
        assert!(orchestrator.state().is_running());

        let second = orchestrator.start(&inventory, &OptimizeOptions::default()).await;
        assert_eq!(second, Err(JobError::AlreadyRunning));
        assert!(orchestrator.state().is_running());
        assert_eq!(engine.submitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_submission_error_fails_without_running() {
        let temp_dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        *engine.reject.lock().unwrap() = Some(EngineError::Rejected("No supported files found.".to_string()));
        let mut orchestrator = orchestrator(Arc::clone(&engine), &temp_dir);

        let outcome = orchestrator.start(&inventory(), &OptimizeOptions::default()).await;
        assert!(matches!(outcome, Err(JobError::Submission(_))));
        assert!(matches!(orchestrator.state(), JobState::Failed(JobError::Submission(_))));
    }

    #[tokio::test]
    async fn test_unresolvable_destination_fails() {
        let temp_dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let mut orchestrator = orchestrator(Arc::clone(&engine), &temp_dir);
        let options = OptimizeOptions {
            destination: crate::config::Destination::Downloads,
            ..OptimizeOptions::default()
        };

        assert!(orchestrator.start(&inventory(), &options).await.is_err());
        assert!(engine.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_event_preserves_progress() {
        let temp_dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let mut orchestrator = orchestrator(engine, &temp_dir);
        let mut inventory = inventory();

        orchestrator.start(&inventory, &OptimizeOptions::default()).await.unwrap();
        let run = orchestrator.run().unwrap();
        orchestrator
            .apply(RunEvent::new(run, EngineEvent::Progress(Progress::new(4, 3, "c.jpg"))), &mut inventory)
            .await;
        orchestrator
            .apply(RunEvent::new(run, EngineEvent::Failed("disk full".to_string())), &mut inventory)
            .await;

        assert_eq!(
            orchestrator.state(),
            &JobState::Failed(JobError::Engine(EngineError::Failed("disk full".to_string())))
        );
        assert_eq!(orchestrator.progress(), &Progress::new(4, 3, "c.jpg"));
        assert!(!inventory.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_never_changes_state() {
        let temp_dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let mut orchestrator = orchestrator(Arc::clone(&engine), &temp_dir);

        orchestrator.start(&inventory(), &OptimizeOptions::default()).await.unwrap();
        orchestrator.cancel().await;
        orchestrator.cancel_handle().cancel().await;

        assert!(orchestrator.state().is_running());
        assert_eq!(*engine.cancels.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_stop_without_result_fails() {
        let temp_dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let mut orchestrator = orchestrator(Arc::clone(&engine), &temp_dir);
        let mut inventory = inventory();

        orchestrator.start(&inventory, &OptimizeOptions::default()).await.unwrap();
        let stopped = RunEvent::new(RunId(1), EngineEvent::RunningStateChanged(false));

        // Engine still running: the notification is stale
        orchestrator.apply(stopped.clone(), &mut inventory).await;
        assert!(orchestrator.state().is_running());

        *engine.running.lock().unwrap() = false;
        orchestrator.apply(stopped, &mut inventory).await;
        assert!(matches!(orchestrator.state(), JobState::Failed(JobError::Engine(_))));
    }

    #[tokio::test]
    async fn test_stop_with_stored_result_completes() {
        let temp_dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let mut orchestrator = orchestrator(Arc::clone(&engine), &temp_dir);
        let mut inventory = inventory();

        orchestrator.start(&inventory, &OptimizeOptions::default()).await.unwrap();
        *engine.running.lock().unwrap() = false;
        *engine.last_result.lock().unwrap() = Some(result(1, false));

        orchestrator
            .apply(RunEvent::new(RunId(1), EngineEvent::RunningStateChanged(false)), &mut inventory)
            .await;
        assert_eq!(orchestrator.state(), &JobState::Completed(result(1, false)));
        assert!(inventory.is_empty());
    }

    #[tokio::test]
    async fn test_attach_fetch_failure_stays_idle_and_keeps_flag() {
        let temp_dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine {
            fail_fetch: true,
            ..FakeEngine::default()
        });
        let flag = UnseenResultFlag::at(temp_dir.path().join("flag.json"));
        flag.store(true).await.unwrap();

        let mut orchestrator = orchestrator(engine, &temp_dir);
        let mut inventory = inventory();
        let _events = orchestrator.attach(&mut inventory).await;

        assert_eq!(orchestrator.state(), &JobState::Idle);
        assert!(flag.load().await);
        assert!(!inventory.is_empty());
    }

    #[tokio::test]
    async fn test_attach_without_flag_does_not_fetch() {
        let temp_dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        *engine.last_result.lock().unwrap() = Some(result(3, false));

        let mut orchestrator = orchestrator(engine, &temp_dir);
        let mut inventory = inventory();
        let _events = orchestrator.attach(&mut inventory).await;

        assert_eq!(orchestrator.state(), &JobState::Idle);
        assert!(!inventory.is_empty());
    }

    #[tokio::test]
    async fn test_attach_while_engine_running() {
        let temp_dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        *engine.running.lock().unwrap() = true;

        let mut orchestrator = orchestrator(Arc::clone(&engine), &temp_dir);
        let mut inventory = inventory();
        let mut events = orchestrator.attach(&mut inventory).await;
        assert!(orchestrator.state().is_running());

        engine.emit(40, EngineEvent::Progress(Progress::new(2, 1, "a.jpg")));
        engine.emit(40, EngineEvent::Finished(result(2, true)));

        let mut seen = Vec::new();
        let state = orchestrator
            .drive(&mut events, &mut inventory, |job| seen.push(job.progress.clone()))
            .await;
        assert_eq!(state, &JobState::Cancelled(result(2, true)));
        assert_eq!(seen.last(), Some(&Progress::new(2, 1, CANCELLED_LABEL)));
        assert!(!inventory.is_empty());
        assert_eq!(orchestrator.run(), Some(RunId(40)));
    }

    #[tokio::test]
    async fn test_closed_stream_fails_the_run() {
        let temp_dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let mut orchestrator = orchestrator(Arc::clone(&engine), &temp_dir);
        let mut inventory = inventory();

        let mut events = orchestrator.attach(&mut inventory).await;
        orchestrator.start(&inventory, &OptimizeOptions::default()).await.unwrap();
        events.close();

        let state = orchestrator.drive(&mut events, &mut inventory, |_| {}).await;
        assert!(matches!(state, JobState::Failed(JobError::Engine(EngineError::Transport(_)))));
    }

    #[tokio::test]
    async fn test_leftover_events_of_earlier_runs_are_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let mut orchestrator = orchestrator(Arc::clone(&engine), &temp_dir);
        let mut inventory = inventory();
        let mut events = orchestrator.attach(&mut inventory).await;

        orchestrator.start(&inventory, &OptimizeOptions::default()).await.unwrap();
        engine.emit(1, EngineEvent::RunningStateChanged(true));
        engine.emit(1, EngineEvent::Finished(result(1, false)));
        engine.emit(1, EngineEvent::RunningStateChanged(false));
        let state = orchestrator.drive(&mut events, &mut inventory, |_| {}).await;
        assert_eq!(state, &JobState::Completed(result(1, false)));

        // Run 2 already finished and the engine holds its result, but run 1's stop
        // notification is still queued ahead of run 2's events
        let mut inventory = self::inventory();
        *engine.running.lock().unwrap() = false;
        *engine.last_result.lock().unwrap() = Some(result(9, false));
        orchestrator.start(&inventory, &OptimizeOptions::default()).await.unwrap();
        engine.emit(2, EngineEvent::RunningStateChanged(true));
        engine.emit(2, EngineEvent::Progress(Progress::new(2, 1, "a.jpg")));
        engine.emit(2, EngineEvent::Finished(result(2, false)));
        engine.emit(2, EngineEvent::RunningStateChanged(false));

        let mut seen = Vec::new();
        let state = orchestrator
            .drive(&mut events, &mut inventory, |job| seen.push(job.progress.done))
            .await;
        assert_eq!(state, &JobState::Completed(result(2, false)));
        assert_eq!(seen, vec![0, 1, 2]);

        // Events of run 2 left on the queue do not touch run 3
        let mut inventory = self::inventory();
        orchestrator.start(&inventory, &OptimizeOptions::default()).await.unwrap();
        engine.emit(2, EngineEvent::Finished(result(2, false)));
        engine.emit(3, EngineEvent::Progress(Progress::new(5, 4, "d.jpg")));
        while let Ok(Some(event)) = tokio::time::timeout(std::time::Duration::from_millis(20), events.next()).await {
            orchestrator.apply(event, &mut inventory).await;
        }
        assert!(orchestrator.state().is_running());
        assert_eq!(orchestrator.progress(), &Progress::new(5, 4, "d.jpg"));
        assert!(!inventory.is_empty());
    }

    #[tokio::test]
    async fn test_completed_without_files_reports_zero_percent() {
        let temp_dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let mut orchestrator = orchestrator(Arc::clone(&engine), &temp_dir);
        let mut inventory = inventory();

        orchestrator.start(&inventory, &OptimizeOptions::default()).await.unwrap();
        orchestrator
            .apply(RunEvent::new(RunId(1), EngineEvent::Finished(result(0, false))), &mut inventory)
            .await;

        assert_eq!(orchestrator.state(), &JobState::Completed(result(0, false)));
        assert_eq!(orchestrator.progress(), &Progress::new(0, 0, COMPLETED_LABEL));
        assert_eq!(orchestrator.progress().percentage(), 0);
    }
}

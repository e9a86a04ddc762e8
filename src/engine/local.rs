//! # Local Engine Module
//!
//! Engine in-process che implementa `OptimizationEngine`.
//!
//! ## Responsabilità:
//! - Stato condiviso del processo: flag di esecuzione, flag di cancellazione, ultimo risultato
//! - Espansione dei task (cartelle e file) in una lista ordinata senza duplicati
//! - Esecuzione concorrente su thread bloccanti con limite di worker
//! - Emissione di eventi di stato, progress ed esito verso tutti i sottoscrittori
//!
//! ## Regole di raccolta:
//! - I file con marker `__optimized` non vengono mai riprocessati
//! - I path inesistenti e le estensioni non supportate vengono ignorati

use crate::{
    classifier::PathClassifier,
    engine::{
        path_resolver::PathResolver,
        processor::{FileJob, FileProcessor, FileStats, ImageCodecProcessor, ProcessSettings},
        EngineEvent, EventHub, EventSubscription, FinalResult, OptimizationEngine, RunId,
    },
    error::EngineError,
    job::{payload::OptimizePayload, state::Progress, state::STARTING_LABEL},
};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

struct Shared<P> {
    is_processing: Mutex<bool>,
    last_run: AtomicU64,
    should_cancel: Arc<AtomicBool>,
    last_result: Mutex<Option<FinalResult>>,
    events: EventHub,
    processor: Arc<P>,
    classifier: PathClassifier,
    workers: usize,
}

/// Engine that optimizes files on this machine
pub struct LocalEngine<P: FileProcessor = ImageCodecProcessor> {
    shared: Arc<Shared<P>>,
}

impl LocalEngine<ImageCodecProcessor> {
    pub fn with_image_codecs(classifier: PathClassifier, workers: usize) -> Self {
        Self::new(ImageCodecProcessor::new(), classifier, workers)
    }
}

impl<P: FileProcessor> LocalEngine<P> {
    pub fn new(processor: P, classifier: PathClassifier, workers: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                is_processing: Mutex::new(false),
                last_run: AtomicU64::new(0),
                should_cancel: Arc::new(AtomicBool::new(false)),
                last_result: Mutex::new(None),
                events: EventHub::new(),
                processor: Arc::new(processor),
                classifier,
                workers: workers.max(1),
            }),
        }
    }
}

/// Expand payload tasks into sorted, de-duplicated per-file jobs
fn collect_file_jobs(payload: &OptimizePayload, classifier: &PathClassifier) -> Vec<FileJob> {
    let destination = payload.destination();
    let mut jobs = Vec::new();

    let mut push = |source: &Path, root: &Path| {
        jobs.push(FileJob {
            source: source.to_path_buf(),
            destination: PathResolver::get_output_path(source, root, &destination),
        });
    };

    for task in &payload.tasks {
        let source = task.path.as_path();
        if PathResolver::is_optimized_output(source) {
            continue;
        }
        if !source.exists() {
            debug!("Skipping missing path: {}", source.display());
            continue;
        }

        if source.is_dir() {
            for entry in WalkDir::new(source).into_iter().filter_map(|e| e.ok()) {
                let path = entry.path();
                if entry.file_type().is_file()
                    && classifier.is_supported(&entry.file_name().to_string_lossy())
                    && !PathResolver::is_optimized_output(path)
                {
                    push(path, &task.root_path);
                }
            }
        } else {
            let name = source.file_name().unwrap_or_default().to_string_lossy();
            if classifier.is_supported(&name) {
                push(source, &task.root_path);
            }
        }
    }

    jobs.sort_by(|a, b| a.source.cmp(&b.source));
    jobs.dedup_by(|a, b| a.source == b.source);
    jobs
}

impl<P: FileProcessor> Shared<P> {
    fn set_processing(&self, value: bool) {
        *self.is_processing.lock().unwrap_or_else(|e| e.into_inner()) = value;
    }

    async fn run(self: Arc<Self>, run: RunId, jobs: Vec<FileJob>, settings: ProcessSettings) {
        let started = Instant::now();
        let total = jobs.len() as u64;
        let done = Arc::new(AtomicU64::new(0));

        self.events
            .emit(run, EngineEvent::Progress(Progress::new(total, 0, STARTING_LABEL)));

        // Process files with controlled concurrency
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = Vec::with_capacity(jobs.len());

        for job in jobs {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let shared = Arc::clone(&self);
            let settings = settings.clone();
            let done = Arc::clone(&done);

            tasks.push(tokio::task::spawn_blocking(move || {
                let _permit = permit; // Keep permit alive
                let stats = shared.processor.process(&job, &settings, &shared.should_cancel);
                if stats.completed {
                    let count = done.fetch_add(1, Ordering::SeqCst) + 1;
                    let label = job.source.file_name().unwrap_or_default().to_string_lossy();
                    shared
                        .events
                        .emit(run, EngineEvent::Progress(Progress::new(total, count, label)));
                }
                stats
            }));
        }

        // Wait for all tasks and collect results. A failed worker stops the remaining files,
        // but the run only ends once every worker has returned.
        let mut stats = Vec::with_capacity(tasks.len());
        let mut failure = None;
        for task in tasks {
            match task.await {
                Ok(file_stats) => stats.push(file_stats),
                Err(e) => {
                    warn!("Worker failed: {}", e);
                    self.should_cancel.store(true, Ordering::SeqCst);
                    failure.get_or_insert_with(|| format!("Worker failed: {}", e));
                }
            }
        }

        if let Some(message) = failure {
            self.set_processing(false);
            self.events.emit(run, EngineEvent::Failed(message));
            self.events.emit(run, EngineEvent::RunningStateChanged(false));
            return;
        }

        let result = aggregate(
            total,
            done.load(Ordering::SeqCst),
            self.should_cancel.load(Ordering::SeqCst),
            started.elapsed().as_secs_f64(),
            &stats,
        );
        info!(
            "Run {} finished: {}/{} files, {} bytes saved{}",
            run,
            result.processed_files,
            result.total_files,
            result.total_size_saved,
            if result.is_canceled { " (cancelled)" } else { "" }
        );

        *self.last_result.lock().unwrap_or_else(|e| e.into_inner()) = Some(result.clone());
        self.set_processing(false);
        self.events.emit(run, EngineEvent::Finished(result));
        self.events.emit(run, EngineEvent::RunningStateChanged(false));
    }
}

/// Sum per-file stats. Per-phase durations are summed CPU time across workers, so they are
/// scaled to wall-clock time to stay comparable with `duration_total`.
fn aggregate(total: u64, processed: u64, is_canceled: bool, wall_time: f64, stats: &[FileStats]) -> FinalResult {
    let mut result = FinalResult {
        total_files: total,
        processed_files: processed,
        is_canceled,
        duration_total: wall_time,
        ..FinalResult::default()
    };

    for file in stats {
        result.total_size_saved += file.bytes_saved;
        result.total_size_original += file.original_size;
        result.total_size_optimized += file.optimized_size;
        result.total_size_webp += file.webp_size;
        result.total_size_avif += file.avif_size;
        result.duration_opt += file.duration_opt;
        result.duration_webp += file.duration_webp;
        result.duration_avif += file.duration_avif;
    }

    let busy = result.duration_opt + result.duration_webp + result.duration_avif;
    if busy > 0.0 {
        let factor = wall_time / busy;
        result.duration_opt *= factor;
        result.duration_webp *= factor;
        result.duration_avif *= factor;
    }
    result
}

#[async_trait]
impl<P: FileProcessor> OptimizationEngine for LocalEngine<P> {
    async fn query_running_state(&self) -> Result<bool, EngineError> {
        Ok(*self.shared.is_processing.lock().unwrap_or_else(|e| e.into_inner()))
    }

    async fn fetch_last_result(&self) -> Result<Option<FinalResult>, EngineError> {
        if self.query_running_state().await? {
            return Ok(None);
        }
        Ok(self
            .shared
            .last_result
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    async fn submit(&self, payload: OptimizePayload) -> Result<RunId, EngineError> {
        {
            let mut processing = self.shared.is_processing.lock().unwrap_or_else(|e| e.into_inner());
            if *processing {
                return Err(EngineError::Rejected("Optimization is already in progress.".to_string()));
            }
            *processing = true;
        }

        let jobs = collect_file_jobs(&payload, &self.shared.classifier);
        if jobs.is_empty() {
            self.shared.set_processing(false);
            return Err(EngineError::Rejected("No supported files found.".to_string()));
        }

        self.shared.should_cancel.store(false, Ordering::SeqCst);
        *self.shared.last_result.lock().unwrap_or_else(|e| e.into_inner()) = None;

        let run = RunId(self.shared.last_run.fetch_add(1, Ordering::SeqCst) + 1);
        info!(
            "Starting run {}: {} files with {} workers",
            run,
            jobs.len(),
            self.shared.workers
        );
        self.shared.events.emit(run, EngineEvent::RunningStateChanged(true));

        let settings = ProcessSettings::from(&payload);
        tokio::spawn(Arc::clone(&self.shared).run(run, jobs, settings));
        Ok(run)
    }

    async fn request_cancel(&self) -> Result<(), EngineError> {
        debug!("Cancellation requested");
        self.shared.should_cancel.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self) -> EventSubscription {
        self.shared.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::payload::FileTask;
    use futures::StreamExt;
    use std::fs;
    use std::sync::mpsc;
    use tempfile::TempDir;

    /// Records jobs and optionally waits for a permit before each file
    #[derive(Default)]
    struct FakeProcessor {
        seen: Mutex<Vec<FileJob>>,
        gate: Option<Mutex<mpsc::Receiver<()>>>,
    }

    impl FakeProcessor {
        fn gated() -> (Self, mpsc::Sender<()>) {
            let (sender, receiver) = mpsc::channel();
            let processor = Self {
                gate: Some(Mutex::new(receiver)),
                ..Self::default()
            };
            (processor, sender)
        }
    }

    impl FileProcessor for FakeProcessor {
        fn process(&self, job: &FileJob, _: &ProcessSettings, cancel: &AtomicBool) -> FileStats {
            if cancel.load(Ordering::SeqCst) {
                return FileStats::default();
            }
            if let Some(gate) = &self.gate {
                let _ = gate.lock().unwrap().recv();
            }
            self.seen.lock().unwrap().push(job.clone());
            FileStats {
                completed: true,
                bytes_saved: 10,
                original_size: 100,
                optimized_size: 90,
                duration_opt: 0.5,
                ..FileStats::default()
            }
        }
    }

    fn payload(tasks: Vec<FileTask>) -> OptimizePayload {
        OptimizePayload {
            tasks,
            jpg_q: 80,
            png_min: 65,
            png_max: 80,
            webp: false,
            avif: false,
            optimize_original: true,
            replace: false,
            output_dir: None,
        }
    }

    fn task(path: &Path, root: &Path) -> FileTask {
        FileTask {
            path: path.to_path_buf(),
            root_path: root.to_path_buf(),
        }
    }

    fn fixture() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("r");
        fs::create_dir_all(root.join("s")).unwrap();
        fs::write(root.join("a.jpg"), b"a").unwrap();
        fs::write(root.join("s/b.png"), b"b").unwrap();
        fs::write(root.join("s/c.txt"), b"c").unwrap();
        fs::write(root.join("a__optimized.jpg"), b"x").unwrap();
        temp_dir
    }

    /// Events of `run` up to its final `RunningStateChanged(false)`
    async fn drain(subscription: &mut EventSubscription, run: RunId) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Some(tagged) = subscription.next().await {
            assert_eq!(tagged.run, run);
            let stop = tagged.event == EngineEvent::RunningStateChanged(false);
            events.push(tagged.event);
            if stop {
                break;
            }
        }
        events
    }

    /// Panics on `a.jpg`, succeeds slowly on everything else
    struct PanickingProcessor;

    impl FileProcessor for PanickingProcessor {
        fn process(&self, job: &FileJob, _: &ProcessSettings, cancel: &AtomicBool) -> FileStats {
            if job.source.ends_with("a.jpg") {
                panic!("decoder crashed");
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
            FileStats {
                completed: !cancel.load(Ordering::SeqCst),
                ..FileStats::default()
            }
        }
    }

    #[test]
    fn test_collect_expands_dedups_and_skips_outputs() {
        let temp_dir = fixture();
        let root = temp_dir.path().join("r");
        let payload = payload(vec![
            task(&root, &root),
            task(&root.join("a.jpg"), &root),
            task(&root.join("missing.jpg"), &root),
            task(&root.join("a__optimized.jpg"), &root),
        ]);

        let jobs = collect_file_jobs(&payload, &PathClassifier::default());
        let sources: Vec<_> = jobs.iter().map(|j| j.source.clone()).collect();
        assert_eq!(sources, vec![root.join("a.jpg"), root.join("s/b.png")]);
        assert_eq!(jobs[0].destination, root.join("a__optimized.jpg"));
    }

    #[test]
    fn test_aggregate_scales_phase_durations() {
        let stats = vec![
            FileStats { completed: true, duration_opt: 2.0, duration_webp: 2.0, ..FileStats::default() },
            FileStats { completed: true, duration_opt: 4.0, ..FileStats::default() },
        ];
        let result = aggregate(2, 2, false, 4.0, &stats);
        assert!((result.duration_opt - 3.0).abs() < 1e-9);
        assert!((result.duration_webp - 1.0).abs() < 1e-9);
        assert_eq!(result.duration_total, 4.0);
    }

    #[tokio::test]
    async fn test_run_emits_ordered_events_and_stores_result() {
        let temp_dir = fixture();
        let root = temp_dir.path().join("r");
        let engine = LocalEngine::new(FakeProcessor::default(), PathClassifier::default(), 1);
        let mut events = engine.subscribe();

        let run = engine.submit(payload(vec![task(&root, &root)])).await.unwrap();
        let received = drain(&mut events, run).await;

        assert_eq!(received[0], EngineEvent::RunningStateChanged(true));
        assert_eq!(received[1], EngineEvent::Progress(Progress::new(2, 0, STARTING_LABEL)));
        assert_eq!(received[2], EngineEvent::Progress(Progress::new(2, 1, "a.jpg")));
        assert_eq!(received[3], EngineEvent::Progress(Progress::new(2, 2, "b.png")));
        let EngineEvent::Finished(result) = &received[4] else {
            panic!("expected Finished, got {:?}", received[4]);
        };
        assert_eq!((result.total_files, result.processed_files), (2, 2));
        assert_eq!(result.total_size_saved, 20);
        assert!(!result.is_canceled);
        assert_eq!(received.len(), 6);

        assert!(!engine.query_running_state().await.unwrap());
        assert_eq!(engine.fetch_last_result().await.unwrap(), Some(result.clone()));
    }

    #[tokio::test]
    async fn test_submit_rejects_empty_and_busy() {
        let temp_dir = fixture();
        let root = temp_dir.path().join("r");
        let (processor, permits) = FakeProcessor::gated();
        let engine = LocalEngine::new(processor, PathClassifier::default(), 1);
        let mut events = engine.subscribe();

        let empty = engine.submit(payload(vec![task(&root.join("s/c.txt"), &root)])).await;
        assert!(matches!(empty, Err(EngineError::Rejected(_))));
        assert!(!engine.query_running_state().await.unwrap());

        let run = engine.submit(payload(vec![task(&root, &root)])).await.unwrap();
        assert!(engine.query_running_state().await.unwrap());
        assert_eq!(engine.fetch_last_result().await.unwrap(), None);

        let busy = engine.submit(payload(vec![task(&root, &root)])).await;
        assert_eq!(busy, Err(EngineError::Rejected("Optimization is already in progress.".to_string())));

        permits.send(()).unwrap();
        permits.send(()).unwrap();
        drain(&mut events, run).await;
        assert!(!engine.query_running_state().await.unwrap());

        let next = engine.submit(payload(vec![task(&root.join("a.jpg"), &root)])).await;
        assert_eq!(next, Ok(RunId(run.0 + 1)));
        permits.send(()).unwrap();
        drain(&mut events, RunId(run.0 + 1)).await;
    }

    #[tokio::test]
    async fn test_cancel_stops_remaining_files() {
        let temp_dir = fixture();
        let root = temp_dir.path().join("r");
        let (processor, permits) = FakeProcessor::gated();
        let engine = LocalEngine::new(processor, PathClassifier::default(), 1);
        let mut events = engine.subscribe();

        let run = engine.submit(payload(vec![task(&root, &root)])).await.unwrap();
        engine.request_cancel().await.unwrap();
        permits.send(()).unwrap();

        let received = drain(&mut events, run).await;
        let finished = received
            .iter()
            .find_map(|e| match e {
                EngineEvent::Finished(result) => Some(result.clone()),
                _ => None,
            })
            .unwrap();
        assert!(finished.is_canceled);
        assert_eq!(finished.total_files, 2);
        assert!(finished.processed_files <= 1);
    }

    #[tokio::test]
    async fn test_worker_panic_ends_run_after_every_worker() {
        let temp_dir = fixture();
        let root = temp_dir.path().join("r");
        let engine = LocalEngine::new(PanickingProcessor, PathClassifier::default(), 2);
        let mut events = engine.subscribe();

        let run = engine.submit(payload(vec![task(&root, &root)])).await.unwrap();
        let received = drain(&mut events, run).await;

        let failed_at = received
            .iter()
            .position(|e| matches!(e, EngineEvent::Failed(_)))
            .unwrap();
        assert_eq!(failed_at, received.len() - 2);
        assert_eq!(received.last(), Some(&EngineEvent::RunningStateChanged(false)));
        assert!(!received.iter().any(|e| matches!(e, EngineEvent::Finished(_))));

        assert!(!engine.query_running_state().await.unwrap());
        assert_eq!(engine.fetch_last_result().await.unwrap(), None);
    }
}

//! # Media Batch Optimizer - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Merge di file di configurazione e flag CLI, con validazione
//! - Scan delle root, avvio del job e rendering del progress
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (path, qualità, formati, destinazione, workers, etc.)
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose)
//! 3. Attach all'engine: un risultato non ancora visto viene mostrato subito
//! 4. Costruisce la foresta dai path di input e popola l'inventario
//! 5. Avvia il job e segue gli eventi fino allo stato terminale (Ctrl-C = cancel)
//!
//! ## Esempio di utilizzo:
//! ```bash
//! media-batch ~/Pictures/trip photo.png --quality 75 --webp --destination downloads
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use media_batch_optimizer::{
    config::{Config, Destination, SaveMethod},
    file_manager::FileManager,
    json_output::JsonMessage,
    progress::{ProgressManager, RunSummary},
    Inventory, InventoryNode, JobOrchestrator, JobState, LocalEngine, LocalFileSystem, PathClassifier,
    TreeBuilder, UnseenResultFlag,
};

#[derive(Parser)]
#[command(name = "media-batch")]
#[command(about = "Collect dropped files and folders and optimize the images they contain")]
struct Args {
    /// Files or folders to optimize
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Compression quality (10-100)
    #[arg(short, long)]
    quality: Option<u8>,

    /// Also write a WebP version of each image
    #[arg(long)]
    webp: bool,

    /// Also write an AVIF version of each image
    #[arg(long)]
    avif: bool,

    /// Do not optimize the original format
    #[arg(long)]
    no_compress: bool,

    /// Where optimized files are written
    #[arg(short, long, value_enum)]
    destination: Option<Destination>,

    /// Output directory (implies --destination custom)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overwrite originals instead of writing `<name>__optimized.<ext>`
    #[arg(long)]
    overwrite: bool,

    /// Number of parallel workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Report unsupported files skipped during the scan
    #[arg(long)]
    report_skipped: bool,

    /// Output progress and status as JSON lines
    #[arg(long)]
    json: bool,

    /// Print the scanned tree
    #[arg(long)]
    tree: bool,

    /// Only list the files that would be optimized
    #[arg(long)]
    dry_list: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply_to(&self, config: &mut Config) {
        let options = &mut config.options;
        if let Some(quality) = self.quality {
            options.quality = quality;
        }
        options.webp |= self.webp;
        options.avif |= self.avif;
        if self.no_compress {
            options.compress = false;
        }
        if let Some(output) = &self.output {
            options.custom_path = Some(output.clone());
            options.destination = Destination::Custom;
        }
        if let Some(destination) = self.destination {
            options.destination = destination;
        }
        if self.overwrite {
            options.save_method = SaveMethod::Overwrite;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        config.report_skipped |= self.report_skipped;
        config.json_output |= self.json;
    }
}

fn print_node(inventory: &Inventory, node: &InventoryNode, depth: usize) {
    let indent = "  ".repeat(depth);
    if node.is_dir() {
        println!(
            "{}{}/ ({} files, {})",
            indent,
            node.name(),
            node.file_count(),
            FileManager::format_size(node.size())
        );
        for child in inventory.children(node) {
            print_node(inventory, child, depth + 1);
        }
    } else {
        println!("{}{} ({})", indent, node.name(), FileManager::format_size(node.size()));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => Config::from_file(path).await?,
        None => Config::default(),
    };
    args.apply_to(&mut config);
    config.validate()?;
    let json = config.json_output;

    let classifier = PathClassifier::new(config.supported_extensions.iter());
    let engine = Arc::new(LocalEngine::with_image_codecs(classifier.clone(), config.workers));
    let flag = UnseenResultFlag::for_profile(&config.profile)?;
    let mut orchestrator = JobOrchestrator::new(engine, flag);

    // Attach before scanning: a recovered result consumes the inventory it belongs to
    let mut inventory = Inventory::new();
    let mut events = orchestrator.attach(&mut inventory).await;
    if let Some(previous) = orchestrator.state().result() {
        if json {
            JsonMessage::finished(previous).emit();
        } else {
            println!("Previous run: {}", RunSummary::new(previous).format_summary());
        }
        orchestrator.mark_seen().await;
    }

    let spinner = (!json).then(|| ProgressManager::spinner("Scanning..."));
    let outcome = TreeBuilder::new(LocalFileSystem, classifier)
        .with_skip_reporting(config.report_skipped)
        .build_forest(&args.paths);
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    if json {
        JsonMessage::Scan {
            roots: outcome.roots.len(),
            total_files: outcome.total_files(),
            total_size: outcome.total_size(),
            errors: outcome.errors.iter().map(|e| e.to_string()).collect(),
            skipped: outcome.skipped.clone(),
        }
        .emit();
    } else {
        for error in &outcome.errors {
            eprintln!("Skipped {}: {}", error.path().display(), error);
        }
        for skipped in &outcome.skipped {
            eprintln!("Unsupported: {}", skipped.display());
        }
    }

    inventory.add_roots(outcome.roots);
    if inventory.is_empty() {
        let message = "No supported files found.";
        if json {
            JsonMessage::error(message, None).emit();
        }
        return Err(anyhow::anyhow!(message));
    }

    if !json {
        println!(
            "{} items, {} files, {}",
            inventory.len(),
            inventory.total_files(),
            FileManager::format_size(inventory.total_size())
        );
        if args.tree {
            for root in inventory.roots() {
                print_node(&inventory, root, 0);
            }
        }
    }

    if args.dry_list {
        for task in inventory.flatten_to_tasks() {
            println!("{}", task.path.display());
        }
        return Ok(());
    }

    if json {
        JsonMessage::Start {
            total_files: inventory.total_files(),
            options: config.options.clone(),
        }
        .emit();
    }

    if let Err(e) = orchestrator.start(&inventory, &config.options).await {
        if json {
            JsonMessage::error(e.to_string(), None).emit();
        }
        return Err(e.into());
    }

    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling");
            cancel.cancel().await;
        }
    });

    let bar = (!json).then(ProgressManager::new);
    let state = orchestrator
        .drive(&mut events, &mut inventory, |job| {
            if json {
                JsonMessage::progress(&job.progress).emit();
            } else if let Some(bar) = &bar {
                bar.set_progress(&job.progress);
            }
        })
        .await
        .clone();

    match state {
        JobState::Completed(result) | JobState::Cancelled(result) => {
            if json {
                JsonMessage::finished(&result).emit();
            } else if let Some(bar) = &bar {
                bar.finish(&RunSummary::new(&result).format_summary());
            }
            orchestrator.mark_seen().await;
            Ok(())
        }
        JobState::Failed(e) => {
            if json {
                JsonMessage::error(e.to_string(), None).emit();
            } else if let Some(bar) = &bar {
                bar.abandon("Failed");
            }
            Err(e.into())
        }
        JobState::Idle | JobState::Running => {
            warn!("Event loop ended before the run reached a terminal state");
            Ok(())
        }
    }
}

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use deltasnap::config::DEFAULT_DELETION_PAGE_SIZE;
use deltasnap::{
    CacheDatabase, DatabaseSnapshot, DatasetId, EmptyDatasetGuard, EngineConfig, InMemoryRunTracker, JsonEquality,
    JsonField, NdjsonSource, RetentionPolicy, RunTracker, SnapshotFile, StorageStrategy, Subscriber,
};
use serde_json::{Value as JsonValue, json};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "deltasnap")]
#[command(about = "Detect ADD/UPDATE/DELETE deltas between successive pulls of a dataset")]
pub struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pull a dataset from NDJSON and print its delta events
    Run(RunArgs),
    /// List recorded runs
    Runs {
        #[arg(long)]
        state: PathBuf,
        #[arg(long)]
        dataset: Option<i64>,
    },
    /// Print the latest cache row of every identifier
    Show {
        #[arg(long)]
        state: PathBuf,
        #[arg(long)]
        dataset: i64,
    },
    /// Delete every cache row of a dataset
    Reset {
        #[arg(long)]
        state: PathBuf,
        #[arg(long)]
        dataset: i64,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Snapshot file holding the cache and run history
    #[arg(long)]
    state: PathBuf,
    #[arg(long)]
    dataset: i64,
    /// NDJSON file with one entity per line, or `-` for stdin
    #[arg(long)]
    source: String,
    /// Top-level field identifying an entity
    #[arg(long)]
    id_field: String,
    /// What an empty pull means: delete-all or bypass
    #[arg(long)]
    guard: EmptyDatasetGuard,
    #[arg(long, default_value_t = StorageStrategy::AppendOnly)]
    storage: StorageStrategy,
    /// Also print NONE events
    #[arg(long)]
    emit_unchanged: bool,
    /// Field ignored when comparing entities (repeatable)
    #[arg(long)]
    ignore_field: Vec<String>,
    /// Skip retention pruning after the run
    #[arg(long)]
    no_prune: bool,
    #[arg(long, default_value_t = DEFAULT_DELETION_PAGE_SIZE)]
    page_size: usize,
}

pub async fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome = match cli.command {
        Command::Run(args) => run_dataset(args).await,
        Command::Runs { state, dataset } => list_runs(&state, dataset).await,
        Command::Show { state, dataset } => show_dataset(&state, dataset).await,
        Command::Reset { state, dataset } => reset_dataset(&state, dataset).await,
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("deltasnap: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn load_state(path: &Path) -> Result<(CacheDatabase<JsonValue>, InMemoryRunTracker)> {
    let snapshot = SnapshotFile::new(path)
        .load::<JsonValue>()
        .with_context(|| format!("Failed to load state from '{}'", path.display()))?;
    match snapshot {
        Some(snapshot) => Ok(snapshot.restore()?),
        None => Ok((CacheDatabase::new(), InMemoryRunTracker::new())),
    }
}

async fn save_state(path: &Path, db: &CacheDatabase<JsonValue>, tracker: &InMemoryRunTracker) -> Result<()> {
    let snapshot = DatabaseSnapshot::capture(db, tracker).await;
    SnapshotFile::new(path)
        .save(&snapshot)
        .with_context(|| format!("Failed to save state to '{}'", path.display()))
}

async fn run_dataset(args: RunArgs) -> Result<ExitCode> {
    let (db, tracker) = load_state(&args.state)?;

    let mut config = EngineConfig::new()
        .storage(args.storage)
        .empty_guard(args.guard)
        .emit_unchanged(args.emit_unchanged)
        .deletion_page_size(args.page_size);
    if args.no_prune {
        config = config.retention(RetentionPolicy::disabled());
    }

    let source = if args.source == "-" {
        NdjsonSource::stdin()
    } else {
        NdjsonSource::file(&args.source)
    };
    let identity = JsonField::new(args.id_field);
    let predicate = args
        .ignore_field
        .into_iter()
        .fold(JsonEquality::new(), |eq, field| eq.ignore_field(field));

    let subscriber = Subscriber::new(db.clone(), Arc::new(tracker.clone()), config);
    let outcome = subscriber
        .run(DatasetId(args.dataset), &source, &identity, &predicate)
        .await?;

    {
        let mut out = io::stdout().lock();
        for event in &outcome.result.events {
            serde_json::to_writer(&mut out, event)?;
            writeln!(out)?;
        }
        out.flush()?;
    }

    let result = &outcome.result;
    eprintln!(
        "{} dataset {}: {} ({} entities, {} changes{})",
        result.run_id,
        args.dataset,
        outcome.run.status,
        result.dataset_count,
        result.delta_count,
        if result.bypassed { ", deletes bypassed" } else { "" }
    );
    for error in &result.errors {
        eprintln!("  error: {}", error);
    }
    if let Some(e) = &outcome.prune_error {
        eprintln!("  retention pruning failed: {}", e);
    } else if outcome.pruned > 0 {
        eprintln!("  pruned {} rows", outcome.pruned);
    }

    save_state(&args.state, &db, &tracker).await?;
    Ok(if result.success { ExitCode::SUCCESS } else { ExitCode::from(1) })
}

async fn list_runs(state: &Path, dataset: Option<i64>) -> Result<ExitCode> {
    let (_, tracker) = load_state(state)?;
    let runs = match dataset {
        Some(id) => tracker.runs_for_dataset(DatasetId(id)).await?,
        None => tracker.all_runs().await,
    };
    for run in runs {
        println!(
            "{}\tdataset={}\t{}\t{}\tentities={}\tchanges={}\tstarted={}{}",
            run.run_id,
            run.dataset,
            run.mode,
            run.status,
            run.dataset_count,
            run.delta_count,
            run.start_time.to_rfc3339(),
            run.status_message
                .as_deref()
                .map(|m| format!("\t{}", m))
                .unwrap_or_default()
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn show_dataset(state: &Path, dataset: i64) -> Result<ExitCode> {
    let (db, _) = load_state(state)?;
    let rows = db.latest_rows(DatasetId(dataset)).await;
    let mut out = io::stdout().lock();
    for row in rows {
        let line = json!({
            "identifier": row.identifier,
            "code": row.code,
            "run_id": row.run_id.as_i64(),
            "delta_date": row.delta_date,
            "current": row.current,
        });
        writeln!(out, "{}", line)?;
    }
    Ok(ExitCode::SUCCESS)
}

async fn reset_dataset(state: &Path, dataset: i64) -> Result<ExitCode> {
    let (db, tracker) = load_state(state)?;
    let subscriber = Subscriber::new(db.clone(), Arc::new(tracker.clone()), EngineConfig::new());
    let removed = subscriber.reset_dataset(DatasetId(dataset)).await?;
    save_state(state, &db, &tracker).await?;
    eprintln!("dataset {}: removed {} cache rows", dataset, removed);
    Ok(ExitCode::SUCCESS)
}

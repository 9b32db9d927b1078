//! importer - content import command line
//!
//! Subcommands:
//! - `import <file.json>`: save every unit in the file, in order
//! - `resolve <external_id>`: print the internal id of an imported record
//! - `inspect <external_id>`: print the held snapshot of a rejected unit

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use importer::config::ImporterConfig;
use importer::types::ImportPayload;
use importer::store::SqliteStore;
use importer::{sqlite_engine, ImportError, UpsertEngine};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "importer")]
#[command(about = "Reconcile external content records with the content store")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to the platform config location)
    #[arg(short, long, env = "IMPORTER_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Database file (overrides the root folder default)
    #[arg(short, long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import units from a JSON file (one object or an array)
    Import { file: PathBuf },
    /// Print the internal id for an external id
    Resolve { external_id: String },
    /// Print the held snapshot of a rejected unit
    Inspect { external_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ImporterConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let root_folder = config.resolve_root_folder(args.root_folder.as_deref());
    let db_path = config.resolve_database_path(args.database.as_deref(), &root_folder);
    info!("Database: {}", db_path.display());

    let pool = importer_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;
    let engine = sqlite_engine(pool, &config.engine);

    match args.command {
        Command::Import { file } => import_file(&engine, &file).await,
        Command::Resolve { external_id } => {
            match engine.resolve(&external_id).await? {
                Some(record_id) => println!("{}", record_id),
                None => bail!("No record imported for '{}'", external_id),
            }
            Ok(())
        }
        Command::Inspect { external_id } => {
            match engine.held_snapshot(&external_id).await? {
                Some(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
                None => bail!("No held snapshot for '{}'", external_id),
            }
            Ok(())
        }
    }
}

async fn import_file(
    engine: &UpsertEngine<SqliteStore>,
    file: &Path,
) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", file.display()))?;

    let payloads: Vec<ImportPayload> = match value {
        serde_json::Value::Array(_) => serde_json::from_value(value)?,
        other => vec![serde_json::from_value(other)?],
    };

    let total = payloads.len();
    let mut failed = 0usize;

    for payload in payloads {
        let (line, saved) = import_payload(engine, payload).await;
        if !saved {
            failed += 1;
        }
        println!("{}", line);
    }

    info!(total, failed, "Import finished");
    if failed > 0 {
        bail!("{} of {} units were not saved", failed, total);
    }
    Ok(())
}

/// Stage and save one payload; returns its output line and whether it was saved
async fn import_payload(
    engine: &UpsertEngine<SqliteStore>,
    payload: ImportPayload,
) -> (serde_json::Value, bool) {
    let external_id = payload.external_id.clone();

    let result = match engine.stage_payload(payload).await {
        Ok(unit) => engine.save(unit).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(outcome) => (
            json!({
                "external_id": external_id,
                "status": "saved",
                "outcome": outcome,
            }),
            true,
        ),
        Err(ImportError::Validation(errors)) => (
            json!({
                "external_id": external_id,
                "status": "rejected",
                "errors": errors,
            }),
            false,
        ),
        Err(e) => {
            warn!(external_id = %external_id, error = %e, "Import failed");
            (
                json!({
                    "external_id": external_id,
                    "status": "failed",
                    "error": e.to_string(),
                }),
                false,
            )
        }
    }
}

//! pgroll-rs CLI
//!
//! Thin entry point: decodes a migration document, validates it, and runs
//! one phase against in-memory stand-ins for the database connection,
//! state store, backfiller and view manager. Real file/config discovery
//! and the Postgres connection itself are external collaborators (§1) —
//! this binary only exercises the engine end to end for local inspection.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Parser;

use pgroll_rs::config::Config;
use pgroll_rs::engine::{self, Engine};
use pgroll_rs::migration;
use pgroll_rs::operation::OperationTag;
use pgroll_rs::schema::Schema;
use pgroll_rs::testutil::{InMemoryStateStore, NoopBackfiller, NoopViewManager, RecordingConnection};

#[derive(Parser, Debug)]
#[command(name = "pgroll-rs")]
#[command(
    about = "Zero-downtime schema migration engine for PostgreSQL-compatible databases",
    long_about = None
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "pgroll-rs.toml")]
    config: PathBuf,

    /// Path to a migration document (JSON or YAML)
    #[arg(long)]
    migration: Option<PathBuf>,

    /// Phase to run against the in-memory dry-run collaborators
    #[arg(long, value_enum, default_value = "start")]
    phase: Phase,

    /// Explain a specific operation tag (e.g. --explain create_index)
    #[arg(long)]
    explain: Option<String>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum Phase {
    Start,
    Complete,
    Rollback,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::try_init().ok();
    let args = Args::parse();

    if let Some(tag) = args.explain {
        return explain_operation(&tag);
    }

    let migration_path = args
        .migration
        .as_ref()
        .context("--migration is required unless --explain is given")?;

    let config = if args.config.exists() {
        Config::from_file(&args.config).context("failed to load configuration")?
    } else {
        eprintln!(
            "config file {} not found, using defaults",
            args.config.display()
        );
        Config::default()
    };

    let migration = load_migration(migration_path)?;

    let mut schema = Schema::new(config.schema.name.clone());
    engine::validate(&migration, &mut schema).context("validation failed")?;

    let mut conn = RecordingConnection::new();
    let mut state_store = InMemoryStateStore::new();
    let mut backfiller = NoopBackfiller::new();
    let mut view_manager = NoopViewManager::new();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async {
        let mut dry_run = Engine::new(
            config.schema.name.clone(),
            &mut conn,
            &mut state_store,
            &mut backfiller,
            &mut view_manager,
        );
        match args.phase {
            Phase::Start => dry_run.start(&migration, &mut schema).await,
            Phase::Complete => dry_run.complete(&migration, &mut schema).await,
            Phase::Rollback => dry_run.rollback(&migration, &mut schema).await,
        }
    })
    .with_context(|| format!("{:?} phase failed", args.phase))?;

    println!(
        "migration {:?}: {:?} phase ran against in-memory collaborators",
        migration.name, args.phase
    );
    for sql in &conn.executed {
        println!("  {sql}");
    }

    Ok(())
}

fn load_migration(path: &PathBuf) -> Result<migration::Migration> {
    let bytes = std::fs::read(path).context("failed to read migration document")?;
    let default_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("migration")
        .to_string();
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml") | Some("yaml")
    );
    let result = if is_yaml {
        migration::decode_yaml(&bytes, &default_name)
    } else {
        migration::decode_json(&bytes, &default_name)
    };
    result.context("failed to decode migration document")
}

fn explain_operation(tag: &str) -> Result<()> {
    let tag = OperationTag::from_str(tag)
        .map_err(|_| anyhow::anyhow!("unknown operation tag: {tag}"))?;
    println!("{}: {}", tag.as_str(), tag.describe());
    Ok(())
}

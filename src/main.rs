use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use codesync_core::bootstrap::{build_service, load_config};
use codesync_core::{CodeSearchService, Config};
use codesync_embed::Embedder;
use codesync_index::{ChangeWatcher, WsConnector, spawn_reindexer};
use codesync_store::{PayloadFilter, QueryHit, QueryOptions};

#[derive(Debug, Parser)]
#[command(
    name = "codesync",
    version,
    about = "Keep a vector index in sync with a live source tree"
)]
struct Cli {
    /// Config file (default: $CODESYNC_CONFIG or config/default.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Collection to operate on (default: qdrant.collection from config)
    #[arg(long, short, global = true)]
    collection: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the collection and its file path index
    CreateCollection,
    /// Hybrid search over indexed code
    Query {
        text: String,
        #[arg(long, default_value_t = 10)]
        limit: u64,
        #[arg(long, default_value_t = 0.0)]
        score_threshold: f32,
        /// Only return fragments of this file
        #[arg(long)]
        file: Option<String>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Re-index a file, or every indexable file under a directory
    Reconcile { path: PathBuf },
    /// Follow the change notification socket and re-index changed files
    Watch,
    /// Delete and recreate the collection
    Clear {
        /// Confirm dropping every record
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let collection = cli
        .collection
        .clone()
        .unwrap_or_else(|| config.qdrant.collection.clone());
    let service = build_service(&config)?;

    match cli.command {
        Command::CreateCollection => {
            service.create_collection(&collection).await?;
            println!("created collection {collection}");
        }
        Command::Query {
            text,
            limit,
            score_threshold,
            file,
            json,
        } => {
            let options = QueryOptions {
                limit,
                score_threshold,
                filter: file.map(PayloadFilter::for_file),
                ..QueryOptions::default()
            };
            let hits = service.query_collection(&collection, &text, options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits_to_json(&hits))?);
            } else {
                for line in format_hits(&hits) {
                    println!("{line}");
                }
            }
        }
        Command::Reconcile { path } => reconcile(&service, &collection, &path).await?,
        Command::Watch => watch(&config, service, collection).await?,
        Command::Clear { yes } => {
            if !yes {
                bail!("refusing to clear {collection} without --yes");
            }
            service.clear_collection(&collection).await?;
            println!("cleared collection {collection}");
        }
    }
    Ok(())
}

async fn reconcile<E: Embedder>(
    service: &CodeSearchService<E>,
    collection: &str,
    path: &Path,
) -> anyhow::Result<()> {
    if path.is_dir() {
        let report = service.reconcile_tree(collection, path).await?;
        println!(
            "{} files scanned, {} indexed, {} fragments, {} removed in {} ms",
            report.files_scanned,
            report.files_indexed,
            report.fragments,
            report.removed,
            report.duration_ms
        );
        for error in &report.errors {
            eprintln!("error: {error}");
        }
    } else {
        let report = service
            .reconcile_file(collection, path)
            .await
            .with_context(|| format!("failed to reconcile {}", path.display()))?;
        if report.skipped_empty {
            println!("{} is empty, existing records kept", path.display());
        } else {
            println!(
                "{}: {} fragments stored, {} removed",
                path.display(),
                report.fragments,
                report.removed
            );
        }
    }
    Ok(())
}

async fn watch<E: Embedder + 'static>(
    config: &Config,
    service: CodeSearchService<E>,
    collection: String,
) -> anyhow::Result<()> {
    let (handler, reindexer) = spawn_reindexer(Arc::clone(service.indexer()), collection);
    let watcher = ChangeWatcher::new(config.watcher_config(), Arc::new(WsConnector), handler);
    watcher.connect();
    tracing::info!(url = %config.watch.url, "watching for file changes, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    watcher.destroy();
    drop(watcher);
    reindexer.abort();
    tracing::info!("watcher stopped");
    Ok(())
}

fn format_hits(hits: &[QueryHit]) -> Vec<String> {
    hits.iter()
        .map(|hit| match &hit.payload {
            Some(payload) => format!(
                "{:.4}  {}:{}-{}",
                hit.score,
                payload.metadata.file_path,
                payload.metadata.start_line,
                payload.metadata.end_line
            ),
            None => format!("{:.4}  {}", hit.score, hit.id),
        })
        .collect()
}

fn hits_to_json(hits: &[QueryHit]) -> serde_json::Value {
    serde_json::Value::Array(
        hits.iter()
            .map(|hit| {
                serde_json::json!({
                    "id": hit.id,
                    "score": hit.score,
                    "payload": hit.payload.as_ref().and_then(|p| p.to_json().ok()),
                })
            })
            .collect(),
    )
}

mod mapping;
mod sources;

use anyhow::{Context, Result};
use cardex_core::{DocId, Document, NewDocument, Store, DEFAULT_SEARCH_LIMIT};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "cardex-import")]
#[command(about = "Import records into a cardex store and query it", long_about = None)]
struct Cli {
    /// Store directory
    #[arg(long, env = "CARDEX_DB", default_value = "./cardex.db", global = true)]
    db: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import participant records from .json/.jsonl or .txt files
    Participants {
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
    },
    /// Import generic JSON items and text files as JSON/TXT documents
    Files {
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
    },
    /// Keyword search (all terms must match)
    Search {
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
        /// Restrict to one document type
        #[arg(long)]
        doc_type: Option<String>,
    },
    /// Print one document
    Get {
        #[arg(long)]
        id: DocId,
    },
    /// List document summaries, most recently updated first
    List,
    /// Replace the title and/or body of a document
    Update {
        #[arg(long)]
        id: DocId,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        body: Option<String>,
    },
    Delete {
        #[arg(long)]
        id: DocId,
    },
    Stats,
    /// Rebuild every document's postings from its stored body
    Reindex,
    /// Write search hits to a JSON file
    Export {
        #[arg(long)]
        query: String,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
}

#[derive(Serialize)]
struct ExportFile<'a> {
    query: &'a str,
    exported_at: String,
    total_hits: usize,
    results: &'a [Document],
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let store = Store::open(&cli.db).with_context(|| format!("failed to open store at {}", cli.db.display()))?;

    match cli.command {
        Commands::Participants { input } => import_with(&store, &input, sources::participants_from_file)?,
        Commands::Files { input } => import_with(&store, &input, sources::documents_from_file)?,
        Commands::Search { query, limit, doc_type } => {
            let hits = match doc_type {
                Some(doc_type) => store.search_by_type(&doc_type, &query, limit)?,
                None => store.search(&query, limit)?,
            };
            print_json(&hits)?;
        }
        Commands::Get { id } => match store.get_document(id)? {
            Some(doc) => print_json(&doc)?,
            None => tracing::warn!(doc_id = id, "document not found"),
        },
        Commands::List => print_json(&store.list_documents()?)?,
        Commands::Update { id, title, body } => {
            let updated = store.update_document(id, title.as_deref(), body.as_deref())?;
            tracing::info!(doc_id = id, updated, "update finished");
        }
        Commands::Delete { id } => {
            let deleted = store.delete_document(id)?;
            tracing::info!(doc_id = id, deleted, "delete finished");
        }
        Commands::Stats => print_json(&store.get_stats()?)?,
        Commands::Reindex => {
            let documents = store.reindex_all()?;
            tracing::info!(documents, "reindex complete");
        }
        Commands::Export { query, output, limit } => export(&store, &query, &output, limit)?,
    }

    store.flush()?;
    Ok(())
}

fn import_with(store: &Store, input: &Path, read: fn(&Path) -> Result<Vec<NewDocument>>) -> Result<()> {
    let files = sources::collect_files(input);
    if files.is_empty() {
        tracing::warn!(input = %input.display(), "no importable files found");
        return Ok(());
    }

    let (mut imported, mut failed) = (0usize, 0usize);
    for file in files {
        let docs = match read(&file) {
            Ok(docs) => docs,
            Err(e) => {
                tracing::error!(file = %file.display(), error = %e, "failed to read import file");
                failed += 1;
                continue;
            }
        };
        for doc in docs {
            let title = doc.title.clone();
            match store.add_document(doc) {
                Ok(doc_id) => {
                    tracing::debug!(doc_id, %title, "imported");
                    imported += 1;
                }
                Err(e) => {
                    tracing::error!(%title, error = %e, "failed to import record");
                    failed += 1;
                }
            }
        }
    }

    let stats = store.get_stats()?;
    tracing::info!(
        imported,
        failed,
        total_documents = stats.total_documents,
        total_postings = stats.total_postings,
        by_type = ?stats.counts_by_type,
        "import complete"
    );
    Ok(())
}

fn export(store: &Store, query: &str, output: &Path, limit: usize) -> Result<()> {
    let hits = store.search(query, limit)?;
    let file = ExportFile {
        query,
        exported_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "".into()),
        total_hits: hits.len(),
        results: &hits,
    };
    fs::write(output, serde_json::to_string_pretty(&file)?)
        .with_context(|| format!("failed to write {}", output.display()))?;
    tracing::info!(output = %output.display(), hits = hits.len(), "results exported");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

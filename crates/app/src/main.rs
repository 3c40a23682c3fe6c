mod http;
mod state;

use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_vector_core::{
    discover_pdf_files, ChunkFailurePolicy, ChunkingConfig, PipelineConfig, ProgressEvent,
    ProgressSink, QueryResponse, Upload,
};
use state::AppState;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-vector", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Embedding service base URL
    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Vector store base URL
    #[arg(long, env = "CHROMA_URL", default_value = "http://localhost:8000")]
    chroma_url: String,

    /// Vector store tenant
    #[arg(long, env = "CHROMA_TENANT", default_value = "default_tenant")]
    chroma_tenant: String,

    /// Vector store database
    #[arg(long, env = "CHROMA_DATABASE", default_value = "default_database")]
    chroma_database: String,

    /// Embedding model name
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "embeddinggemma:300m")]
    embedding_model: String,

    /// Collection that holds the chunks
    #[arg(long, env = "COLLECTION_NAME", default_value = "documents")]
    collection: String,

    /// Seconds to wait for one page's text before skipping it
    #[arg(long, env = "PAGE_TIMEOUT_SECS", default_value = "10")]
    page_timeout_secs: u64,

    /// Number of nearest chunks returned by a search
    #[arg(long, env = "SEARCH_TOP_K", default_value = "5")]
    top_k: usize,

    /// Seconds to wait for abandoned page extractions when shutting down
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value = "5")]
    shutdown_timeout_secs: u64,
}

impl Cli {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            embedding_url: self.ollama_url.clone(),
            vector_store_url: self.chroma_url.clone(),
            tenant: self.chroma_tenant.clone(),
            database: self.chroma_database.clone(),
            embedding_model: self.embedding_model.clone(),
            collection: self.collection.clone(),
            page_timeout: Duration::from_secs(self.page_timeout_secs),
            top_k: self.top_k,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve {
        #[arg(long, env = "PORT", default_value = "8080")]
        port: u16,
        /// Largest accepted upload body, in MiB.
        #[arg(long, env = "MAX_UPLOAD_MB", default_value = "1024")]
        max_upload_mb: usize,
    },
    /// Ingest one PDF or every PDF under a folder.
    Ingest {
        /// Folder that contains PDFs recursively.
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        folder: Option<PathBuf>,
        /// A single PDF file.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Words per chunk.
        #[arg(long)]
        chunk_size: Option<i64>,
        /// Words between chunk starts.
        #[arg(long)]
        chunk_stride: Option<i64>,
        /// Stop a document at its first failed chunk instead of skipping it.
        #[arg(long, default_value_t = false)]
        abort_on_chunk_failure: bool,
    },
    /// Return the chunks nearest to a query.
    Search {
        #[arg(long)]
        query: String,
    },
    /// Print chunk and file counts for the collection.
    Stats,
    /// Delete every chunk of a file.
    Delete {
        #[arg(long)]
        filename: String,
    },
    /// Drop the whole collection.
    Reset,
}

/// Writes ingestion progress to the log.
struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::ReadingPage { .. } => debug!(progress = %event.to_json(), "ingest"),
            _ => info!(progress = %event.to_json(), "ingest"),
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let grace = Duration::from_secs(cli.shutdown_timeout_secs);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    block_on_with_grace(runtime, run(cli), grace)
}

/// Drives `future` to completion, then gives blocking work that is still
/// running at most `grace` before the runtime is dropped.
fn block_on_with_grace<F: Future>(runtime: Runtime, future: F, grace: Duration) -> F::Output {
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(grace);
    output
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    let config = cli.pipeline_config();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        ollama_url = %config.embedding_url,
        chroma_url = %config.vector_store_url,
        model = %config.embedding_model,
        collection = %config.collection,
        "pdf-vector boot"
    );

    let state = AppState::new(config)?;

    match cli.command {
        Command::Serve {
            port,
            max_upload_mb,
        } => {
            let state = state.with_max_upload_bytes(max_upload_mb.saturating_mul(1024 * 1024));
            http::serve(Arc::new(state), port).await?;
        }
        Command::Ingest {
            folder,
            file,
            chunk_size,
            chunk_stride,
            abort_on_chunk_failure,
        } => {
            let paths = match (folder, file) {
                (Some(folder), _) => {
                    let paths = discover_pdf_files(&folder);
                    info!(folder = %folder.display(), pdf_count = paths.len(), "discovered pdfs");
                    paths
                }
                (None, Some(file)) => vec![file],
                (None, None) => Vec::new(),
            };

            let policy = if abort_on_chunk_failure {
                ChunkFailurePolicy::Abort
            } else {
                ChunkFailurePolicy::Continue
            };
            let state = state.with_failure_policy(policy);
            let chunking = ChunkingConfig::from_requested(chunk_size, chunk_stride);

            let mut ingested = 0;
            let mut failed = 0;
            for path in paths {
                let upload = match Upload::from_path(&path, chunking).await {
                    Ok(upload) => upload,
                    Err(error) => {
                        failed += 1;
                        warn!(path = %path.display(), %error, "skipped pdf");
                        continue;
                    }
                };

                match state.ingestion.ingest(upload, &LogProgress).await {
                    Ok(summary) => {
                        ingested += 1;
                        println!(
                            "{}: {}/{} chunks stored",
                            summary.filename, summary.chunks_stored, summary.chunks_total
                        );
                    }
                    Err(error) => {
                        failed += 1;
                        warn!(path = %path.display(), %error, "skipped pdf");
                    }
                }
            }

            println!(
                "{ingested} files ingested, {failed} skipped at {}",
                Utc::now().to_rfc3339()
            );
        }
        Command::Search { query } => {
            let response = state.search.search(&query).await?;
            print_hits(&query, &response);
        }
        Command::Stats => {
            let stats = state.stats.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Delete { filename } => {
            let deleted = state.files.delete_file(&filename).await?;
            println!("{}", serde_json::to_string(&deleted)?);
        }
        Command::Reset => {
            state.reset.reset().await?;
            println!("collection {} reset", state.reset.collection());
        }
    }

    Ok(())
}

fn print_hits(query: &str, response: &QueryResponse) {
    println!("query: {query}");

    let ids = response.ids.first().map(Vec::as_slice).unwrap_or_default();
    for (rank, id) in ids.iter().enumerate() {
        let distance = response
            .distances
            .first()
            .and_then(|row| row.get(rank).copied().flatten());
        let metadata = response
            .metadatas
            .first()
            .and_then(|row| row.get(rank).cloned().flatten())
            .unwrap_or_default();
        let filename = metadata
            .get("filename")
            .and_then(|value| value.as_str())
            .unwrap_or("?");
        let chunk = metadata
            .get("chunk_num")
            .map(|value| value.to_string())
            .unwrap_or_else(|| "?".to_string());

        match distance {
            Some(distance) => println!(
                "[{}] distance={distance:.4} file={filename} chunk={chunk} id={id}",
                rank + 1
            ),
            None => println!("[{}] file={filename} chunk={chunk} id={id}", rank + 1),
        }

        if let Some(text) = response
            .documents
            .first()
            .and_then(|row| row.get(rank))
            .and_then(|text| text.as_deref())
        {
            println!("  chunk_text:\n{text}");
        }
    }

    if ids.is_empty() {
        println!("no matching chunks");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn shutdown_does_not_wait_for_stuck_blocking_work() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        let started = Instant::now();

        let output = block_on_with_grace(
            runtime,
            async {
                tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_secs(10)));
                7
            },
            Duration::from_millis(50),
        );

        assert_eq!(output, 7);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn cli_flags_build_the_pipeline_config() {
        let cli = Cli::try_parse_from([
            "pdf-vector",
            "--collection",
            "manuals",
            "--page-timeout-secs",
            "3",
            "stats",
        ])
        .unwrap();

        let config = cli.pipeline_config();
        assert_eq!(config.collection, "manuals");
        assert_eq!(config.page_timeout, Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }
}

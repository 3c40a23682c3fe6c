use crate::chunking::{build_chunks, ChunkingConfig};
use crate::collection::CollectionResolver;
use crate::config::PipelineConfig;
use crate::embeddings::Embedder;
use crate::error::{BackendError, IngestError};
use crate::extractor::{LopdfSource, PageExtractor, PageSource};
use crate::models::{Chunk, ChunkFailurePolicy, IngestionSummary, NewRecord};
use crate::progress::{IngestionStage, ProgressEvent, ProgressSink};
use crate::traits::VectorStore;
use chrono::Utc;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// A document handed to the pipeline: its name and raw PDF bytes.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub chunking: ChunkingConfig,
}

impl Upload {
    pub async fn from_path(path: &Path, chunking: ChunkingConfig) -> Result<Self, IngestError> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
            .to_string();
        let bytes = tokio::fs::read(path).await?;

        Ok(Self {
            filename,
            bytes,
            chunking,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum ChunkStep {
    Embedding,
    Storage,
}

impl fmt::Display for ChunkStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embedding => f.write_str("embedding"),
            Self::Storage => f.write_str("storage"),
        }
    }
}

/// Tracks the stage of one run and reports each transition.
struct IngestionRun<'a> {
    filename: String,
    stage: IngestionStage,
    progress: &'a dyn ProgressSink,
}

impl<'a> IngestionRun<'a> {
    fn new(filename: String, progress: &'a dyn ProgressSink) -> Self {
        Self {
            filename,
            stage: IngestionStage::Received,
            progress,
        }
    }

    fn advance(&mut self, next: IngestionStage) {
        debug!(filename = %self.filename, from = ?self.stage, to = ?next, "ingestion stage");
        self.stage = next.clone();
        self.progress.report(ProgressEvent::Stage(next));
    }

    fn finish(
        &mut self,
        outcome: Result<IngestionSummary, IngestError>,
    ) -> Result<IngestionSummary, IngestError> {
        match outcome {
            Ok(summary) => {
                info!(
                    filename = %summary.filename,
                    chunks_total = summary.chunks_total,
                    chunks_stored = summary.chunks_stored,
                    chunks_failed = summary.chunks_failed,
                    "pdf processing complete"
                );
                self.advance(IngestionStage::Completed(summary.clone()));
                Ok(summary)
            }
            Err(error) => {
                warn!(filename = %self.filename, stage = ?self.stage, %error, "pdf processing failed");
                self.advance(IngestionStage::Failed {
                    message: error.to_string(),
                });
                Err(error)
            }
        }
    }
}

/// Extracts, chunks, embeds, and stores one document at a time.
pub struct IngestionOrchestrator<E, S> {
    embedder: Arc<E>,
    store: Arc<S>,
    resolver: CollectionResolver<S>,
    extractor: PageExtractor,
    collection: String,
    policy: ChunkFailurePolicy,
}

impl<E, S> IngestionOrchestrator<E, S>
where
    E: Embedder,
    S: VectorStore,
{
    pub fn new(embedder: Arc<E>, store: Arc<S>, config: &PipelineConfig) -> Self {
        Self {
            embedder,
            resolver: CollectionResolver::new(Arc::clone(&store)),
            store,
            extractor: PageExtractor::new(config.page_timeout),
            collection: config.collection.clone(),
            policy: ChunkFailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: ChunkFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Runs the whole pipeline for an uploaded PDF. Exactly one terminal
    /// event (completed or failed) is reported before returning.
    pub async fn ingest(
        &self,
        upload: Upload,
        progress: &dyn ProgressSink,
    ) -> Result<IngestionSummary, IngestError> {
        let Upload {
            filename,
            bytes,
            chunking,
        } = upload;

        info!(
            %filename,
            size_bytes = bytes.len(),
            chunk_size = chunking.size(),
            chunk_stride = chunking.stride(),
            overlap = chunking.overlap(),
            "pdf processing start"
        );

        let mut run = IngestionRun::new(filename, progress);
        run.advance(IngestionStage::Extracting);

        let outcome = match tokio::task::spawn_blocking(move || LopdfSource::from_bytes(&bytes)).await
        {
            Ok(Ok(source)) => self.process(&mut run, Arc::new(source), chunking).await,
            Ok(Err(error)) => Err(error),
            Err(error) => Err(IngestError::Task(error.to_string())),
        };

        run.finish(outcome)
    }

    /// Same as [`IngestionOrchestrator::ingest`] for an already opened
    /// document.
    pub async fn ingest_source<P>(
        &self,
        filename: &str,
        source: Arc<P>,
        chunking: ChunkingConfig,
        progress: &dyn ProgressSink,
    ) -> Result<IngestionSummary, IngestError>
    where
        P: PageSource + ?Sized,
    {
        let mut run = IngestionRun::new(filename.to_string(), progress);
        run.advance(IngestionStage::Extracting);
        let outcome = self.process(&mut run, source, chunking).await;
        run.finish(outcome)
    }

    async fn process<P>(
        &self,
        run: &mut IngestionRun<'_>,
        source: Arc<P>,
        chunking: ChunkingConfig,
    ) -> Result<IngestionSummary, IngestError>
    where
        P: PageSource + ?Sized,
    {
        let extracted = self
            .extractor
            .extract(source, &run.filename, run.progress)
            .await?;

        run.advance(IngestionStage::Extracted {
            length: extracted.text.len(),
        });
        if extracted.text.trim().is_empty() {
            return Err(IngestError::EmptyContent);
        }

        run.advance(IngestionStage::Chunking);
        let chunks = build_chunks(&run.filename, &extracted.text, chunking, Utc::now());
        info!(
            filename = %run.filename,
            total_chunks = chunks.len(),
            chunk_size = chunking.size(),
            chunk_stride = chunking.stride(),
            "pdf chunking"
        );
        if chunks.is_empty() {
            return Err(IngestError::NoChunks);
        }
        run.advance(IngestionStage::Chunked {
            count: chunks.len(),
        });

        let collection_id = self.resolver.resolve(&self.collection).await?;

        let total = chunks.len();
        let mut stored = 0;
        let mut failed = 0;

        for chunk in &chunks {
            run.advance(IngestionStage::Embedding {
                chunk: chunk.sequence_number,
                total,
            });

            match self.store_chunk(&collection_id, chunk).await {
                Ok(()) => {
                    stored += 1;
                    debug!(filename = %run.filename, chunk = chunk.sequence_number, total, "stored chunk");
                }
                Err((step, error)) => {
                    failed += 1;
                    warn!(
                        filename = %run.filename,
                        chunk = chunk.sequence_number,
                        total,
                        %step,
                        %error,
                        "chunk skipped"
                    );
                    if self.policy == ChunkFailurePolicy::Abort {
                        return Err(IngestError::ChunkFailed {
                            chunk: chunk.sequence_number,
                            total,
                            reason: format!("{step} failed: {error}"),
                        });
                    }
                }
            }
        }

        Ok(IngestionSummary {
            filename: run.filename.clone(),
            chunk_size: chunking.size(),
            chunk_stride: chunking.stride(),
            chunks_total: total,
            chunks_stored: stored,
            chunks_failed: failed,
        })
    }

    async fn store_chunk(
        &self,
        collection_id: &str,
        chunk: &Chunk,
    ) -> Result<(), (ChunkStep, BackendError)> {
        let embedding = self
            .embedder
            .embed(&chunk.text)
            .await
            .map_err(|error| (ChunkStep::Embedding, error))?;

        let record = NewRecord::from_chunk(chunk, embedding);
        self.store
            .add(collection_id, std::slice::from_ref(&record))
            .await
            .map_err(|error| (ChunkStep::Storage, error))
    }
}

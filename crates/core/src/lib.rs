pub mod chunking;
pub mod collection;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod files;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod stats;
pub mod stores;
pub mod traits;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use chunking::{
    build_chunks, chunk_words, ChunkingConfig, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_STRIDE,
};
pub use collection::CollectionResolver;
pub use config::{base_url, PipelineConfig};
pub use embeddings::{Embedder, OllamaEmbedder};
pub use error::{BackendError, IngestError};
pub use extractor::{
    ExtractedText, LopdfSource, PageExtractor, PageSkipReason, PageSource, SkippedPage,
};
pub use files::{CollectionReset, FileDeleter};
pub use ingest::{discover_pdf_files, IngestionOrchestrator, Upload};
pub use models::{
    Chunk, ChunkFailurePolicy, ChunkMetadata, CollectionStats, DeletedFile, IngestionSummary,
    NewRecord, QueryResponse,
};
pub use orchestrator::SearchCoordinator;
pub use progress::{IngestionStage, ProgressEvent, ProgressSink};
pub use stats::StatsAggregator;
pub use stores::ChromaStore;
pub use traits::VectorStore;

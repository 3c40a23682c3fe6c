use pdf_vector_core::{
    BackendError, ChromaStore, ChunkFailurePolicy, CollectionReset, Embedder, FileDeleter,
    IngestionOrchestrator, OllamaEmbedder, PipelineConfig, SearchCoordinator, StatsAggregator,
    VectorStore,
};
use std::sync::Arc;

/// Upload bodies above this size are refused with 413.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

/// Pipeline components shared by the HTTP handlers and the CLI commands.
pub struct AppState<E = OllamaEmbedder, S = ChromaStore> {
    pub config: PipelineConfig,
    pub max_upload_bytes: usize,
    pub ingestion: IngestionOrchestrator<E, S>,
    pub search: SearchCoordinator<E, S>,
    pub stats: StatsAggregator<S>,
    pub files: FileDeleter<S>,
    pub reset: CollectionReset<S>,
}

impl AppState {
    /// Connects to the configured Ollama and Chroma endpoints.
    pub fn new(config: PipelineConfig) -> Result<Self, BackendError> {
        config.validate()?;

        let embedder = Arc::new(OllamaEmbedder::new(
            &config.embedding_url,
            config.embedding_model.clone(),
        )?);
        let store = Arc::new(ChromaStore::new(
            &config.vector_store_url,
            &config.tenant,
            &config.database,
        )?);

        Ok(Self::with_backends(embedder, store, config))
    }
}

impl<E, S> AppState<E, S>
where
    E: Embedder,
    S: VectorStore,
{
    pub fn with_backends(embedder: Arc<E>, store: Arc<S>, config: PipelineConfig) -> Self {
        Self {
            ingestion: IngestionOrchestrator::new(Arc::clone(&embedder), Arc::clone(&store), &config),
            search: SearchCoordinator::new(embedder, Arc::clone(&store), &config),
            stats: StatsAggregator::new(Arc::clone(&store), &config),
            files: FileDeleter::new(Arc::clone(&store), &config),
            reset: CollectionReset::new(store, &config),
            config,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_failure_policy(mut self, policy: ChunkFailurePolicy) -> Self {
        self.ingestion = self.ingestion.with_failure_policy(policy);
        self
    }

    pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }
}

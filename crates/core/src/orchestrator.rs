use crate::collection::CollectionResolver;
use crate::config::PipelineConfig;
use crate::embeddings::Embedder;
use crate::models::QueryResponse;
use crate::traits::VectorStore;
use crate::BackendError;
use std::sync::Arc;
use tracing::info;

/// Embeds a free-text query and returns the store's nearest chunks as-is.
pub struct SearchCoordinator<E, S> {
    embedder: Arc<E>,
    store: Arc<S>,
    resolver: CollectionResolver<S>,
    collection: String,
    top_k: usize,
}

impl<E, S> SearchCoordinator<E, S>
where
    E: Embedder,
    S: VectorStore,
{
    pub fn new(embedder: Arc<E>, store: Arc<S>, config: &PipelineConfig) -> Self {
        Self {
            embedder,
            resolver: CollectionResolver::new(Arc::clone(&store)),
            store,
            collection: config.collection.clone(),
            top_k: config.top_k.max(1),
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub async fn search(&self, query: &str) -> Result<QueryResponse, BackendError> {
        if query.trim().is_empty() {
            return Err(BackendError::EmptyQuery);
        }

        info!(query, top_k = self.top_k, "searching");

        let query_vector = self.embedder.embed(query).await?;
        let collection_id = self.resolver.resolve(&self.collection).await?;
        let response = self
            .store
            .query(&collection_id, &query_vector, self.top_k)
            .await?;

        info!(query, hits = response.hit_count(), "search complete");
        Ok(response)
    }
}

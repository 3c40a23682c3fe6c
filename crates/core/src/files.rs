use crate::collection::CollectionResolver;
use crate::config::PipelineConfig;
use crate::models::DeletedFile;
use crate::traits::VectorStore;
use crate::BackendError;
use std::sync::Arc;
use tracing::info;

const FILENAME_FIELD: &str = "filename";

/// Removes every chunk that was ingested under a given filename.
pub struct FileDeleter<S> {
    store: Arc<S>,
    resolver: CollectionResolver<S>,
    collection: String,
}

impl<S> FileDeleter<S>
where
    S: VectorStore,
{
    pub fn new(store: Arc<S>, config: &PipelineConfig) -> Self {
        Self {
            resolver: CollectionResolver::new(Arc::clone(&store)),
            store,
            collection: config.collection.clone(),
        }
    }

    /// Succeeds whether or not any record matched.
    pub async fn delete_file(&self, filename: &str) -> Result<DeletedFile, BackendError> {
        if filename.is_empty() {
            return Err(BackendError::InvalidArgument("filename required".to_string()));
        }

        info!(filename, collection = %self.collection, "deleting file");
        let collection_id = self.resolver.resolve(&self.collection).await?;
        self.store
            .delete_where(&collection_id, FILENAME_FIELD, filename)
            .await?;

        info!(filename, "file deleted");
        Ok(DeletedFile::new(filename))
    }
}

/// Drops the whole collection; the next operation recreates it.
pub struct CollectionReset<S> {
    store: Arc<S>,
    collection: String,
}

impl<S> CollectionReset<S>
where
    S: VectorStore,
{
    pub fn new(store: Arc<S>, config: &PipelineConfig) -> Self {
        Self {
            store,
            collection: config.collection.clone(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn reset(&self) -> Result<(), BackendError> {
        info!(collection = %self.collection, "resetting collection");
        self.store.delete_collection(&self.collection).await?;
        info!(collection = %self.collection, "collection reset");
        Ok(())
    }
}

use crate::error::BackendError;
use crate::models::{NewRecord, QueryResponse};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Operations the pipeline needs from the external vector store.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Looks up a collection by name and returns its id.
    async fn get_collection(&self, name: &str) -> Result<String, BackendError>;

    /// Creates a collection (idempotent on the store side) and returns its id.
    async fn create_collection(&self, name: &str) -> Result<String, BackendError>;

    /// Drops a collection by name. A missing collection is not an error.
    async fn delete_collection(&self, name: &str) -> Result<(), BackendError>;

    async fn add(&self, collection_id: &str, records: &[NewRecord]) -> Result<(), BackendError>;

    async fn query(
        &self,
        collection_id: &str,
        embedding: &[f32],
        n_results: usize,
    ) -> Result<QueryResponse, BackendError>;

    async fn count(&self, collection_id: &str) -> Result<usize, BackendError>;

    /// Bulk read of record metadata. Entries may be `None` for records
    /// stored without metadata.
    async fn get_metadatas(
        &self,
        collection_id: &str,
        limit: usize,
    ) -> Result<Vec<Option<Map<String, Value>>>, BackendError>;

    /// Deletes every record whose metadata `field` equals `value`.
    async fn delete_where(
        &self,
        collection_id: &str,
        field: &str,
        value: &str,
    ) -> Result<(), BackendError>;
}

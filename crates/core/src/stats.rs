use crate::collection::CollectionResolver;
use crate::config::PipelineConfig;
use crate::models::CollectionStats;
use crate::traits::VectorStore;
use crate::BackendError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

pub struct StatsAggregator<S> {
    store: Arc<S>,
    resolver: CollectionResolver<S>,
    collection: String,
}

impl<S> StatsAggregator<S>
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

    /// Chunk and file totals for the collection. A collection that cannot
    /// be resolved reports empty stats.
    pub async fn stats(&self) -> Result<CollectionStats, BackendError> {
        let collection_id = match self.resolver.resolve(&self.collection).await {
            Ok(id) => id,
            Err(error) => {
                warn!(collection = %self.collection, %error, "collection unavailable, reporting empty stats");
                return Ok(CollectionStats::default());
            }
        };

        let total_chunks = self.store.count(&collection_id).await?;
        let mut stats = CollectionStats {
            total_chunks,
            ..CollectionStats::default()
        };

        if total_chunks > 0 {
            match self.store.get_metadatas(&collection_id, total_chunks).await {
                Ok(metadatas) => {
                    let counts = count_by_filename(&metadatas);
                    stats.files = counts.keys().cloned().collect();
                    stats.total_files = stats.files.len();
                    stats.file_chunk_counts = counts;
                }
                Err(error) => {
                    warn!(collection = %self.collection, %error, "bulk metadata read failed");
                }
            }
        }

        info!(
            collection = %self.collection,
            chunks = stats.total_chunks,
            files = stats.total_files,
            "collection stats"
        );
        Ok(stats)
    }
}

/// Counts records per `filename`; records without a string filename are
/// left out.
pub fn count_by_filename(metadatas: &[Option<Map<String, Value>>]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for filename in metadatas
        .iter()
        .flatten()
        .filter_map(|metadata| metadata.get("filename").and_then(Value::as_str))
    {
        *counts.entry(filename.to_string()).or_insert(0) += 1;
    }
    counts
}

use crate::error::BackendError;
use crate::traits::VectorStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolves a logical collection name to the store's collection id,
/// creating the collection when the lookup fails. Nothing is cached.
pub struct CollectionResolver<S> {
    store: Arc<S>,
}

impl<S> Clone for CollectionResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> CollectionResolver<S>
where
    S: VectorStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, name: &str) -> Result<String, BackendError> {
        match self.store.get_collection(name).await {
            Ok(id) if !id.is_empty() => return Ok(id),
            Ok(_) => debug!(collection = name, "lookup returned empty id, creating"),
            Err(error) => debug!(collection = name, %error, "lookup failed, creating"),
        }

        let id = self.store.create_collection(name).await.map_err(|error| {
            warn!(collection = name, %error, "collection creation failed");
            error
        })?;

        if id.is_empty() {
            return Err(BackendError::EmptyCollectionId(name.to_string()));
        }

        Ok(id)
    }
}

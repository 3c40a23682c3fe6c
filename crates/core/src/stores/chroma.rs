use crate::config::base_url;
use crate::models::{NewRecord, QueryResponse};
use crate::traits::VectorStore;
use crate::BackendError;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};

const BACKEND: &str = "chroma";

#[derive(Debug, Deserialize)]
struct CollectionRecord {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(default)]
    metadatas: Vec<Option<Map<String, Value>>>,
}

/// Chroma v2 REST client scoped to one tenant and database.
pub struct ChromaStore {
    client: Client,
    collections_url: String,
}

impl ChromaStore {
    pub fn new(
        endpoint: &str,
        tenant: impl AsRef<str>,
        database: impl AsRef<str>,
    ) -> Result<Self, BackendError> {
        let endpoint = base_url(endpoint)?;
        Ok(Self {
            client: Client::new(),
            collections_url: format!(
                "{}/api/v2/tenants/{}/databases/{}/collections",
                endpoint,
                tenant.as_ref(),
                database.as_ref()
            ),
        })
    }

    fn collection_url(&self, name_or_id: &str) -> String {
        format!("{}/{}", self.collections_url, name_or_id)
    }

    fn operation_url(&self, collection_id: &str, operation: &str) -> String {
        format!("{}/{}/{}", self.collections_url, collection_id, operation)
    }
}

async fn status_error(response: Response) -> BackendError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    BackendError::Status {
        backend: BACKEND.to_string(),
        status,
        body,
    }
}

async fn ensure_success(response: Response) -> Result<Response, BackendError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(status_error(response).await)
    }
}

fn add_payload(records: &[NewRecord]) -> Value {
    json!({
        "ids": records.iter().map(|record| record.id.as_str()).collect::<Vec<_>>(),
        "documents": records.iter().map(|record| record.document.as_str()).collect::<Vec<_>>(),
        "metadatas": records.iter().map(|record| &record.metadata).collect::<Vec<_>>(),
        "embeddings": records.iter().map(|record| &record.embedding).collect::<Vec<_>>(),
    })
}

fn query_payload(embedding: &[f32], n_results: usize) -> Value {
    json!({
        "query_embeddings": [embedding],
        "n_results": n_results,
    })
}

fn delete_payload(field: &str, value: &str) -> Value {
    let mut filter = Map::new();
    filter.insert(field.to_string(), Value::String(value.to_string()));
    json!({ "where": filter })
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn get_collection(&self, name: &str) -> Result<String, BackendError> {
        let response = self.client.get(self.collection_url(name)).send().await?;
        if response.status() != StatusCode::OK {
            return Err(status_error(response).await);
        }

        let record: CollectionRecord = response.json().await?;
        Ok(record.id)
    }

    async fn create_collection(&self, name: &str) -> Result<String, BackendError> {
        let response = self
            .client
            .post(&self.collections_url)
            .json(&json!({ "name": name }))
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(status_error(response).await);
        }

        let body = response.text().await?;
        let record: CollectionRecord = serde_json::from_str(&body)?;
        Ok(record.id)
    }

    async fn delete_collection(&self, name: &str) -> Result<(), BackendError> {
        let response = self.client.delete(self.collection_url(name)).send().await?;
        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::NOT_FOUND {
            return Err(status_error(response).await);
        }
        Ok(())
    }

    async fn add(&self, collection_id: &str, records: &[NewRecord]) -> Result<(), BackendError> {
        if records.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .post(self.operation_url(collection_id, "add"))
            .json(&add_payload(records))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn query(
        &self,
        collection_id: &str,
        embedding: &[f32],
        n_results: usize,
    ) -> Result<QueryResponse, BackendError> {
        let response = self
            .client
            .post(self.operation_url(collection_id, "query"))
            .json(&query_payload(embedding, n_results))
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn count(&self, collection_id: &str) -> Result<usize, BackendError> {
        let response = self
            .client
            .get(self.operation_url(collection_id, "count"))
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(status_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn get_metadatas(
        &self,
        collection_id: &str,
        limit: usize,
    ) -> Result<Vec<Option<Map<String, Value>>>, BackendError> {
        let response = self
            .client
            .post(self.operation_url(collection_id, "get"))
            .json(&json!({
                "limit": limit,
                "include": ["metadatas"],
            }))
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(status_error(response).await);
        }

        let parsed: GetResponse = response.json().await?;
        Ok(parsed.metadatas)
    }

    async fn delete_where(
        &self,
        collection_id: &str,
        field: &str,
        value: &str,
    ) -> Result<(), BackendError> {
        let response = self
            .client
            .post(self.operation_url(collection_id, "delete"))
            .json(&delete_payload(field, value))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn store() -> ChromaStore {
        ChromaStore::new("http://localhost:8000/", "default_tenant", "default_database").unwrap()
    }

    #[test]
    fn urls_follow_the_v2_layout() {
        let store = store();
        assert_eq!(
            store.collection_url("documents"),
            "http://localhost:8000/api/v2/tenants/default_tenant/databases/default_database/collections/documents"
        );
        assert_eq!(
            store.operation_url("abc-123", "count"),
            "http://localhost:8000/api/v2/tenants/default_tenant/databases/default_database/collections/abc-123/count"
        );
    }

    #[test]
    fn add_payload_keeps_arrays_parallel() {
        let record = NewRecord {
            id: "id-1".to_string(),
            document: "pump pressure".to_string(),
            embedding: vec![0.25, 0.5],
            metadata: ChunkMetadata {
                source: "pdf".to_string(),
                filename: "pump.pdf".to_string(),
                chunk_num: 1,
                uploaded_at: "2024-05-01T12:00:00Z".to_string(),
            },
        };

        let payload = add_payload(&[record]);
        assert_eq!(payload["ids"], json!(["id-1"]));
        assert_eq!(payload["documents"], json!(["pump pressure"]));
        assert_eq!(payload["embeddings"], json!([[0.25, 0.5]]));
        assert_eq!(payload["metadatas"][0]["filename"], json!("pump.pdf"));
        assert_eq!(payload["metadatas"][0]["chunk_num"], json!(1));
        assert_eq!(payload["metadatas"][0]["source"], json!("pdf"));
    }

    #[test]
    fn query_and_delete_payloads() {
        assert_eq!(
            query_payload(&[1.0, 2.0], 5),
            json!({"query_embeddings": [[1.0, 2.0]], "n_results": 5})
        );
        assert_eq!(
            delete_payload("filename", "a b.pdf"),
            json!({"where": {"filename": "a b.pdf"}})
        );
    }

    #[test]
    fn get_response_accepts_null_metadata_entries() {
        let parsed: GetResponse =
            serde_json::from_str(r#"{"ids": ["a", "b"], "metadatas": [{"filename": "x.pdf"}, null]}"#)
                .unwrap();
        assert_eq!(parsed.metadatas.len(), 2);
        assert!(parsed.metadatas[1].is_none());
    }
}

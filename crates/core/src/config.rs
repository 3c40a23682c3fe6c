use crate::error::BackendError;
use std::time::Duration;
use url::Url;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_CHROMA_URL: &str = "http://localhost:8000";
pub const DEFAULT_CHROMA_TENANT: &str = "default_tenant";
pub const DEFAULT_CHROMA_DATABASE: &str = "default_database";
pub const DEFAULT_EMBEDDING_MODEL: &str = "embeddinggemma:300m";
pub const DEFAULT_COLLECTION: &str = "documents";
pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_TOP_K: usize = 5;

/// Settings shared by every pipeline component. Built once at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub embedding_url: String,
    pub vector_store_url: String,
    pub tenant: String,
    pub database: String,
    pub embedding_model: String,
    pub collection: String,
    pub page_timeout: Duration,
    pub top_k: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            embedding_url: DEFAULT_OLLAMA_URL.to_string(),
            vector_store_url: DEFAULT_CHROMA_URL.to_string(),
            tenant: DEFAULT_CHROMA_TENANT.to_string(),
            database: DEFAULT_CHROMA_DATABASE.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            page_timeout: DEFAULT_PAGE_TIMEOUT,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), BackendError> {
        base_url(&self.embedding_url)?;
        base_url(&self.vector_store_url)?;

        for (name, value) in [
            ("collection", &self.collection),
            ("embedding model", &self.embedding_model),
            ("tenant", &self.tenant),
            ("database", &self.database),
        ] {
            if value.trim().is_empty() {
                return Err(BackendError::InvalidArgument(format!("{name} must not be empty")));
            }
        }

        if self.top_k == 0 {
            return Err(BackendError::InvalidArgument(
                "top_k must be at least 1".to_string(),
            ));
        }
        if self.page_timeout.is_zero() {
            return Err(BackendError::InvalidArgument(
                "page timeout must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parses an http(s) base URL and returns it without a trailing slash.
pub fn base_url(raw: &str) -> Result<String, BackendError> {
    let parsed = Url::parse(raw.trim())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(BackendError::InvalidArgument(format!(
            "unsupported url scheme in {raw}"
        )));
    }
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

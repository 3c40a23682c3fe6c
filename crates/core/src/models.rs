use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const METADATA_SOURCE_PDF: &str = "pdf";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub sequence_number: usize,
    pub source_filename: String,
    pub ingested_at: DateTime<Utc>,
}

impl Chunk {
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            source: METADATA_SOURCE_PDF.to_string(),
            filename: self.source_filename.clone(),
            chunk_num: self.sequence_number,
            uploaded_at: self.ingested_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Metadata stored next to every chunk record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub filename: String,
    pub chunk_num: usize,
    pub uploaded_at: String,
}

/// One record handed to the vector store's `add` call.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub id: String,
    pub document: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl NewRecord {
    pub fn from_chunk(chunk: &Chunk, embedding: Vec<f32>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            document: chunk.text.clone(),
            embedding,
            metadata: chunk.metadata(),
        }
    }
}

/// Nearest-neighbor result in the vector store's parallel-array layout,
/// one inner list per query embedding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub ids: Vec<Vec<String>>,
    #[serde(default)]
    pub documents: Vec<Vec<Option<String>>>,
    #[serde(default)]
    pub metadatas: Vec<Vec<Option<Map<String, Value>>>>,
    #[serde(default)]
    pub distances: Vec<Vec<Option<f32>>>,
}

impl QueryResponse {
    pub fn hit_count(&self) -> usize {
        self.ids.iter().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub total_chunks: usize,
    pub total_files: usize,
    pub files: Vec<String>,
    pub file_chunk_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedFile {
    pub status: String,
    pub filename: String,
}

impl DeletedFile {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            status: "deleted".to_string(),
            filename: filename.into(),
        }
    }
}

/// What the ingestion loop does when embedding or storing one chunk fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChunkFailurePolicy {
    /// Log the failure, drop the chunk, and keep going.
    #[default]
    Continue,
    /// Stop the run on the first failed chunk.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionSummary {
    pub filename: String,
    pub chunk_size: usize,
    pub chunk_stride: usize,
    pub chunks_total: usize,
    pub chunks_stored: usize,
    pub chunks_failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn chunk_metadata_carries_filename_and_sequence() {
        let chunk = Chunk {
            text: "alpha beta".to_string(),
            sequence_number: 3,
            source_filename: "manual.pdf".to_string(),
            ingested_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        };

        let metadata = chunk.metadata();
        assert_eq!(metadata.source, "pdf");
        assert_eq!(metadata.filename, "manual.pdf");
        assert_eq!(metadata.chunk_num, 3);
        assert_eq!(metadata.uploaded_at, "2024-05-01T12:00:00Z");
    }

    #[test]
    fn new_records_get_distinct_ids() {
        let chunk = Chunk {
            text: "alpha".to_string(),
            sequence_number: 1,
            source_filename: "a.pdf".to_string(),
            ingested_at: Utc::now(),
        };
        let first = NewRecord::from_chunk(&chunk, vec![0.1]);
        let second = NewRecord::from_chunk(&chunk, vec![0.1]);
        assert_ne!(first.id, second.id);
        assert_eq!(first.metadata, second.metadata);
    }

    #[test]
    fn query_response_tolerates_extra_and_null_fields() {
        let raw = r#"{
            "ids": [["a", "b"]],
            "documents": [["first", null]],
            "metadatas": [[{"filename": "x.pdf", "chunk_num": 1}, null]],
            "distances": [[0.12, 0.5]],
            "embeddings": null,
            "include": ["documents", "metadatas", "distances"]
        }"#;

        let parsed: QueryResponse = serde_json::from_str(raw).expect("valid query response");
        assert_eq!(parsed.hit_count(), 2);
        assert_eq!(parsed.documents[0][1], None);
        let nearest = parsed.distances[0][0].expect("distance present");
        assert!((nearest - 0.12).abs() < 1e-6);
    }
}

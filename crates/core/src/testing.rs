//! In-memory doubles for the embedding service and the vector store, plus a
//! generated PDF for end-to-end tests. Enabled by the `testing` feature.

use crate::embeddings::Embedder;
use crate::error::{BackendError, IngestError};
use crate::extractor::PageSource;
use crate::models::{NewRecord, QueryResponse};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::traits::VectorStore;
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

fn server_error(details: &str) -> BackendError {
    BackendError::Status {
        backend: "fake".to_string(),
        status: 500,
        body: details.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub id: String,
    pub document: String,
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Default)]
pub struct InMemoryStore {
    collections: Mutex<HashMap<String, String>>,
    records: Mutex<HashMap<String, Vec<StoredEntry>>>,
    fail_lookups: AtomicBool,
    fail_creates: AtomicBool,
    empty_ids: AtomicBool,
    fail_counts: AtomicBool,
    fail_bulk_reads: AtomicBool,
    fail_add_calls: Mutex<Vec<usize>>,
    add_calls: AtomicUsize,
    create_calls: AtomicUsize,
    backend_calls: AtomicUsize,
}

impl InMemoryStore {
    pub fn fail_lookups(&self, value: bool) {
        self.fail_lookups.store(value, Ordering::SeqCst);
    }

    pub fn fail_creates(&self, value: bool) {
        self.fail_creates.store(value, Ordering::SeqCst);
    }

    pub fn return_empty_ids(&self, value: bool) {
        self.empty_ids.store(value, Ordering::SeqCst);
    }

    pub fn fail_counts(&self, value: bool) {
        self.fail_counts.store(value, Ordering::SeqCst);
    }

    pub fn fail_bulk_reads(&self, value: bool) {
        self.fail_bulk_reads.store(value, Ordering::SeqCst);
    }

    /// Makes the n-th `add` call (1-based) fail.
    pub fn fail_add_call(&self, call: usize) {
        self.fail_add_calls.lock().unwrap().push(call);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn backend_calls(&self) -> usize {
        self.backend_calls.load(Ordering::SeqCst)
    }

    pub fn entries(&self, collection: &str) -> Vec<StoredEntry> {
        let id = self.collections.lock().unwrap().get(collection).cloned();
        id.and_then(|id| self.records.lock().unwrap().get(&id).cloned())
            .unwrap_or_default()
    }

    /// Inserts a raw record, creating the collection if needed.
    pub fn insert_raw(&self, collection: &str, document: &str, metadata: Option<Value>) {
        let id = self.ensure(collection);
        let metadata = metadata.and_then(|value| value.as_object().cloned());
        let mut records = self.records.lock().unwrap();
        let entries = records.entry(id).or_default();
        let next = entries.len() + 1;
        entries.push(StoredEntry {
            id: format!("raw-{next}"),
            document: document.to_string(),
            metadata,
        });
    }

    fn ensure(&self, name: &str) -> String {
        let mut collections = self.collections.lock().unwrap();
        let next = collections.len() + 1;
        collections
            .entry(name.to_string())
            .or_insert_with(|| format!("col-{next}"))
            .clone()
    }

    fn touch(&self) {
        self.backend_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn get_collection(&self, name: &str) -> Result<String, BackendError> {
        self.touch();
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(server_error("lookup failed"));
        }
        self.collections
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::Status {
                backend: "fake".to_string(),
                status: 404,
                body: format!("collection {name} not found"),
            })
    }

    async fn create_collection(&self, name: &str) -> Result<String, BackendError> {
        self.touch();
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(server_error("create failed"));
        }
        if self.empty_ids.load(Ordering::SeqCst) {
            return Ok(String::new());
        }
        Ok(self.ensure(name))
    }

    async fn delete_collection(&self, name: &str) -> Result<(), BackendError> {
        self.touch();
        if let Some(id) = self.collections.lock().unwrap().remove(name) {
            self.records.lock().unwrap().remove(&id);
        }
        Ok(())
    }

    async fn add(&self, collection_id: &str, records: &[NewRecord]) -> Result<(), BackendError> {
        self.touch();
        let call = self.add_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_add_calls.lock().unwrap().contains(&call) {
            return Err(server_error("add failed"));
        }

        let mut stored = self.records.lock().unwrap();
        let entries = stored.entry(collection_id.to_string()).or_default();
        for record in records {
            let metadata = serde_json::to_value(&record.metadata)?
                .as_object()
                .cloned();
            entries.push(StoredEntry {
                id: record.id.clone(),
                document: record.document.clone(),
                metadata,
            });
        }
        Ok(())
    }

    async fn query(
        &self,
        collection_id: &str,
        _embedding: &[f32],
        n_results: usize,
    ) -> Result<QueryResponse, BackendError> {
        self.touch();
        let records = self.records.lock().unwrap();
        let hits = records
            .get(collection_id)
            .map(|entries| entries.iter().take(n_results).cloned().collect::<Vec<_>>())
            .unwrap_or_default();

        Ok(QueryResponse {
            ids: vec![hits.iter().map(|hit| hit.id.clone()).collect()],
            documents: vec![hits.iter().map(|hit| Some(hit.document.clone())).collect()],
            metadatas: vec![hits.iter().map(|hit| hit.metadata.clone()).collect()],
            distances: vec![(0..hits.len()).map(|rank| Some(rank as f32 * 0.1)).collect()],
        })
    }

    async fn count(&self, collection_id: &str) -> Result<usize, BackendError> {
        self.touch();
        if self.fail_counts.load(Ordering::SeqCst) {
            return Err(server_error("count failed"));
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(collection_id)
            .map(Vec::len)
            .unwrap_or(0))
    }

    async fn get_metadatas(
        &self,
        collection_id: &str,
        limit: usize,
    ) -> Result<Vec<Option<Map<String, Value>>>, BackendError> {
        self.touch();
        if self.fail_bulk_reads.load(Ordering::SeqCst) {
            return Err(server_error("get failed"));
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(collection_id)
            .map(|entries| {
                entries
                    .iter()
                    .take(limit)
                    .map(|entry| entry.metadata.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_where(
        &self,
        collection_id: &str,
        field: &str,
        value: &str,
    ) -> Result<(), BackendError> {
        self.touch();
        if let Some(entries) = self.records.lock().unwrap().get_mut(collection_id) {
            entries.retain(|entry| {
                entry
                    .metadata
                    .as_ref()
                    .and_then(|metadata| metadata.get(field))
                    .and_then(Value::as_str)
                    != Some(value)
            });
        }
        Ok(())
    }
}

/// Deterministic embedder that can be told to fail on given calls.
#[derive(Default)]
pub struct ScriptedEmbedder {
    fail_calls: Vec<usize>,
    calls: AtomicUsize,
    texts: Mutex<Vec<String>>,
}

impl ScriptedEmbedder {
    /// Fails the listed calls (1-based).
    pub fn failing_on(calls: &[usize]) -> Self {
        Self {
            fail_calls: calls.to_vec(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Embedder for ScriptedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.texts.lock().unwrap().push(text.to_string());
        if self.fail_calls.contains(&call) {
            return Err(server_error("embedding failed"));
        }
        Ok(vec![text.len() as f32, call as f32])
    }
}

/// Collects every reported progress event in order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<serde_json::Value> {
        self.events().iter().map(ProgressEvent::to_json).collect()
    }
}

impl ProgressSink for RecordingSink {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Page source backed by fixed page texts.
pub struct StaticPages {
    pages: Vec<String>,
}

impl StaticPages {
    pub fn new(pages: &[&str]) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            pages: pages.iter().map(|page| page.to_string()).collect(),
        })
    }
}

impl PageSource for StaticPages {
    fn page_numbers(&self) -> Vec<u32> {
        (1..=self.pages.len() as u32).collect()
    }

    fn is_null_page(&self, page: u32) -> bool {
        page == 0 || page as usize > self.pages.len()
    }

    fn extract_page(&self, page: u32) -> Result<String, IngestError> {
        Ok(self.pages[page as usize - 1].clone())
    }
}

/// A minimal one-page PDF whose page shows `text` in Courier.
pub fn single_page_pdf(text: &str) -> Vec<u8> {
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = document.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![100.into(), 600.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id =
        document.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = document.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    document.save_to(&mut bytes).unwrap();
    bytes
}

use crate::models::IngestionSummary;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;

/// States of one ingestion run. Every transition after `Received` is
/// reported to the caller as a progress event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionStage {
    Received,
    Extracting,
    /// `length` is the UTF-8 byte length of the joined page text.
    Extracted { length: usize },
    Chunking,
    Chunked { count: usize },
    Embedding { chunk: usize, total: usize },
    Completed(IngestionSummary),
    Failed { message: String },
}

impl IngestionStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Stage(IngestionStage),
    ReadingPage { page: u32, total: u32 },
    PageTimedOut { page: u32 },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stage(stage) if stage.is_terminal())
    }

    /// Wire form: `{"status": ...}` for progress, the completion object, or
    /// `{"error": ...}`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::ReadingPage { page, total } => status(format!("Reading PDF page {page}/{total}")),
            Self::PageTimedOut { page } => status(format!("Skipped page {page} (timeout)")),
            Self::Stage(stage) => match stage {
                IngestionStage::Received => status("Upload received".to_string()),
                IngestionStage::Extracting => status("Reading PDF file...".to_string()),
                IngestionStage::Extracted { length } => {
                    status(format!("Extracted {length} characters from PDF"))
                }
                IngestionStage::Chunking => status("Splitting text into chunks...".to_string()),
                IngestionStage::Chunked { count } => {
                    status(format!("Created {count} chunks - Starting embedding..."))
                }
                IngestionStage::Embedding { chunk, total } => {
                    status(format!("Processing chunk {chunk}/{total}"))
                }
                IngestionStage::Completed(summary) => json!({
                    "status": "completed",
                    "filename": summary.filename,
                    "chunkSize": summary.chunk_size,
                    "chunkStride": summary.chunk_stride,
                }),
                IngestionStage::Failed { message } => json!({ "error": message }),
            },
        }
    }

    /// One newline-terminated JSON object.
    pub fn to_ndjson_line(&self) -> String {
        let mut line = self.to_json().to_string();
        line.push('\n');
        line
    }
}

fn status(message: String) -> Value {
    json!({ "status": message })
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

impl ProgressSink for () {
    fn report(&self, _event: ProgressEvent) {}
}

impl ProgressSink for UnboundedSender<ProgressEvent> {
    fn report(&self, event: ProgressEvent) {
        // A closed receiver means the client went away; the run carries on.
        let _ = self.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_lines_are_single_json_objects() {
        let line = ProgressEvent::Stage(IngestionStage::Embedding { chunk: 2, total: 9 })
            .to_ndjson_line();
        assert_eq!(line, "{\"status\":\"Processing chunk 2/9\"}\n");
    }

    #[test]
    fn completion_reports_only_request_parameters() {
        let event = ProgressEvent::Stage(IngestionStage::Completed(IngestionSummary {
            filename: "a.pdf".to_string(),
            chunk_size: 100,
            chunk_stride: 80,
            chunks_total: 4,
            chunks_stored: 3,
            chunks_failed: 1,
        }));

        assert!(event.is_terminal());
        assert_eq!(
            event.to_json(),
            json!({"status": "completed", "filename": "a.pdf", "chunkSize": 100, "chunkStride": 80})
        );
    }

    #[test]
    fn failure_uses_error_key() {
        let event = ProgressEvent::Stage(IngestionStage::Failed {
            message: "boom".to_string(),
        });
        assert_eq!(event.to_json(), json!({"error": "boom"}));
        assert!(!ProgressEvent::PageTimedOut { page: 3 }.is_terminal());
    }

    #[test]
    fn channel_sink_ignores_closed_receiver() {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        drop(receiver);
        sender.report(ProgressEvent::ReadingPage { page: 1, total: 1 });
    }
}
